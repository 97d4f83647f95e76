// lib/src/services/beds.rs
// Ward beds. The unique bed number is enforced at the storage layer and
// surfaces as a constraint error rather than a validation one.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use models::errors::{CareError, CareResult};
use models::{Bed, Principal, Role};

use crate::scope::ensure_role;
use crate::store::MemoryStore;

#[derive(Debug, Clone)]
pub struct BedService {
    store: Arc<MemoryStore>,
}

impl BedService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        BedService { store }
    }

    /// Adds a bed to the ward map.
    ///
    /// # Errors
    ///
    /// `Constraint` when the bed number is already taken, `Validation` for a
    /// blank number.
    pub async fn create_bed(
        &self,
        number: String,
        ward: Option<String>,
        principal: &Principal,
    ) -> CareResult<Bed> {
        ensure_role(principal, &[Role::Administrator])?;
        let number = number.trim().to_string();
        if number.is_empty() {
            return Err(CareError::validation("Bed number must not be blank"));
        }
        let bed = self
            .store
            .write(move |tables| tables.insert_bed(Bed::new(number, ward)))?;
        info!(bed = %bed.id, number = %bed.number, "bed created");
        Ok(bed)
    }

    /// Puts a patient in a bed. A patient occupies at most one bed.
    pub async fn occupy_bed(
        &self,
        bed_id: Uuid,
        patient_id: Uuid,
        principal: &Principal,
    ) -> CareResult<Bed> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let bed = self.store.write(move |tables| {
            let patient = tables.require_patient(patient_id)?;
            if let Some(current) = patient.bed_id {
                return Err(CareError::conflict(format!(
                    "Patient already occupies bed {}",
                    current
                )));
            }
            let bed = tables.bed_mut(bed_id)?;
            bed.occupy(patient_id)?;
            let bed = bed.clone();
            tables.patient_mut(patient_id)?.bed_id = Some(bed_id);
            Ok(bed)
        })?;
        info!(bed = %bed.id, patient = %patient_id, "bed occupied");
        Ok(bed)
    }

    /// Frees a bed and detaches its occupant.
    pub async fn free_bed(&self, bed_id: Uuid, principal: &Principal) -> CareResult<Bed> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        let bed = self.store.write(move |tables| {
            let occupant = tables.require_bed(bed_id)?.patient_id;
            let bed = tables.bed_mut(bed_id)?;
            bed.free()?;
            let bed = bed.clone();
            if let Some(patient_id) = occupant {
                if let Ok(patient) = tables.patient_mut(patient_id) {
                    patient.bed_id = None;
                }
            }
            Ok(bed)
        })?;
        info!(bed = %bed.id, "bed freed");
        Ok(bed)
    }

    pub async fn list_beds(
        &self,
        available_only: bool,
        principal: &Principal,
    ) -> CareResult<Vec<Bed>> {
        ensure_role(principal, &[Role::Reception, Role::Administrator])?;
        self.store.read(move |tables| {
            let mut beds: Vec<Bed> = tables
                .beds
                .values()
                .filter(|b| !available_only || !b.occupied)
                .cloned()
                .collect();
            beds.sort_by(|a, b| a.number.cmp(&b.number));
            Ok(beds)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::harness::TestContext;

    #[tokio::test]
    async fn should_enforce_unique_bed_numbers() {
        let cx = TestContext::new();
        cx.services
            .beds
            .create_bed("B-12".into(), Some("Maternity".into()), &cx.admin)
            .await
            .unwrap();
        let err = cx
            .services
            .beds
            .create_bed("B-12".into(), None, &cx.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Constraint(_)));
        assert_eq!(err.kind(), "constraint");
    }

    #[tokio::test]
    async fn should_occupy_and_free_round_trip() {
        let cx = TestContext::new();
        let bed = cx
            .services
            .beds
            .create_bed("C-01".into(), None, &cx.admin)
            .await
            .unwrap();

        let occupied = cx
            .services
            .beds
            .occupy_bed(bed.id, cx.patient_id, &cx.reception)
            .await
            .unwrap();
        assert!(occupied.occupied);
        assert_eq!(occupied.patient_id, Some(cx.patient_id));

        // Same patient cannot take a second bed.
        let second = cx
            .services
            .beds
            .create_bed("C-02".into(), None, &cx.admin)
            .await
            .unwrap();
        let err = cx
            .services
            .beds
            .occupy_bed(second.id, cx.patient_id, &cx.reception)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));

        let freed = cx
            .services
            .beds
            .free_bed(bed.id, &cx.reception)
            .await
            .unwrap();
        assert!(!freed.occupied);
        let patient = cx
            .store
            .read(|tables| tables.require_patient(cx.patient_id))
            .unwrap();
        assert!(patient.bed_id.is_none());

        let err = cx
            .services
            .beds
            .free_bed(bed.id, &cx.reception)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Conflict(_)));
    }

    #[tokio::test]
    async fn should_filter_available_beds() {
        let cx = TestContext::new();
        let bed = cx
            .services
            .beds
            .create_bed("D-01".into(), None, &cx.admin)
            .await
            .unwrap();
        cx.services
            .beds
            .create_bed("D-02".into(), None, &cx.admin)
            .await
            .unwrap();
        cx.services
            .beds
            .occupy_bed(bed.id, cx.patient_id, &cx.reception)
            .await
            .unwrap();

        let available = cx
            .services
            .beds
            .list_beds(true, &cx.reception)
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].number, "D-02");
    }
}
