// models/src/pricing.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

/// One version of the consultation fee. Rows are never deleted; at most one
/// is active at a time, which the pricing service enforces in the same
/// transaction that activates a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationPrice {
    pub id: Uuid,
    pub price: i64,
    pub is_active: bool,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConsultationPrice {
    pub fn new(price: i64, created_by: Uuid) -> CareResult<Self> {
        Self::check_price(price)?;
        let now = Utc::now();
        Ok(ConsultationPrice {
            id: Uuid::new_v4(),
            price,
            is_active: true,
            created_by,
            updated_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn check_price(price: i64) -> CareResult<()> {
        if price <= 0 {
            return Err(CareError::validation(
                "Consultation price must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn reprice(&mut self, price: i64, updated_by: Uuid) -> CareResult<()> {
        Self::check_price(price)?;
        self.price = price;
        self.is_active = true;
        self.updated_by = Some(updated_by);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn deactivate(&mut self, updated_by: Uuid) {
        self.is_active = false;
        self.updated_by = Some(updated_by);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_reject_non_positive_price() {
        assert!(ConsultationPrice::new(0, Uuid::new_v4()).is_err());
        assert!(ConsultationPrice::new(-500, Uuid::new_v4()).is_err());
        assert!(ConsultationPrice::new(10_000, Uuid::new_v4()).is_ok());
    }

    #[test]
    fn should_track_who_deactivated() {
        let admin = Uuid::new_v4();
        let mut price = ConsultationPrice::new(10_000, Uuid::new_v4()).unwrap();
        price.deactivate(admin);
        assert!(!price.is_active);
        assert_eq!(price.updated_by, Some(admin));
    }
}
