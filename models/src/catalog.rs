// models/src/catalog.rs
// Reference data the core reads but does not orchestrate: exam catalogs,
// pharmacy stock, beds. Lab and imaging exams share one shape and live in
// separate tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CareError, CareResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogExam {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogExam {
    pub fn new(name: impl Into<String>, price: i64) -> Self {
        let now = Utc::now();
        CatalogExam {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyProduct {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PharmacyProduct {
    pub fn new(name: impl Into<String>, price: i64, stock: u32) -> Self {
        let now = Utc::now();
        PharmacyProduct {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            stock,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decrements stock, failing without mutation when quantity exceeds what
    /// is on the shelf.
    pub fn take_stock(&mut self, quantity: u32) -> CareResult<()> {
        if quantity == 0 {
            return Err(CareError::validation(format!(
                "Quantity for product '{}' must be at least 1",
                self.name
            )));
        }
        if self.stock < quantity {
            return Err(CareError::validation(format!(
                "Insufficient stock for product '{}': {} requested, {} available",
                self.name, quantity, self.stock
            )));
        }
        self.stock -= quantity;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// A ward bed. `number` is unique hospital-wide; the store rejects
/// duplicates with a constraint error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub id: Uuid,
    pub number: String,
    pub ward: Option<String>,
    pub occupied: bool,
    pub patient_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bed {
    pub fn new(number: impl Into<String>, ward: Option<String>) -> Self {
        let now = Utc::now();
        Bed {
            id: Uuid::new_v4(),
            number: number.into(),
            ward,
            occupied: false,
            patient_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn occupy(&mut self, patient_id: Uuid) -> CareResult<()> {
        if self.occupied {
            return Err(CareError::conflict(format!(
                "Bed {} is already occupied",
                self.number
            )));
        }
        self.occupied = true;
        self.patient_id = Some(patient_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn free(&mut self) -> CareResult<()> {
        if !self.occupied {
            return Err(CareError::conflict(format!("Bed {} is not occupied", self.number)));
        }
        self.occupied = false;
        self.patient_id = None;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_fail_stock_take_without_mutating() {
        let mut product = PharmacyProduct::new("Paracetamol 500mg", 500, 4);
        assert!(product.take_stock(5).is_err());
        assert_eq!(product.stock, 4);
        product.take_stock(4).unwrap();
        assert_eq!(product.stock, 0);
    }

    #[test]
    fn should_not_double_occupy_bed() {
        let mut bed = Bed::new("A-12", Some("Ward A".into()));
        bed.occupy(Uuid::new_v4()).unwrap();
        assert!(matches!(bed.occupy(Uuid::new_v4()), Err(CareError::Conflict(_))));
        bed.free().unwrap();
        assert!(bed.patient_id.is_none());
    }
}
