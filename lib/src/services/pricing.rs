// lib/src/services/pricing.rs
// The standing consultation fee. At most one price row is active at a time;
// registration reads it when the desk does not quote an explicit amount.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use models::errors::CareResult;
use models::{ConsultationPrice, Principal, Role};

use crate::scope::ensure_role;
use crate::store::{MemoryStore, Tables};

/// Holds the single-active invariant after an insert or a reactivation.
pub(crate) fn deactivate_other_prices(tables: &mut Tables, keep_id: Uuid, updated_by: Uuid) {
    for price in tables.consultation_prices.values_mut() {
        if price.id != keep_id && price.is_active {
            price.deactivate(updated_by);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingRegistry {
    store: Arc<MemoryStore>,
}

impl PricingRegistry {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        PricingRegistry { store }
    }

    /// Sets the fee every new registration will pick up. Repricing edits the
    /// active row in place; when none is active a fresh row is opened and
    /// everything older is deactivated.
    pub async fn set_active_price(
        &self,
        price: i64,
        principal: &Principal,
    ) -> CareResult<ConsultationPrice> {
        ensure_role(principal, &[Role::Administrator])?;
        let updated_by = principal.id;
        let row = self.store.write(move |tables| {
            ConsultationPrice::check_price(price)?;
            match tables.active_price() {
                Some(active) => {
                    let row = tables.price_mut(active.id)?;
                    row.reprice(price, updated_by)?;
                    Ok(row.clone())
                }
                None => {
                    let row = ConsultationPrice::new(price, updated_by)?;
                    tables.consultation_prices.insert(row.id, row.clone());
                    deactivate_other_prices(tables, row.id, updated_by);
                    Ok(row)
                }
            }
        })?;
        info!(price = row.price, "consultation price set");
        Ok(row)
    }

    /// The current fee, if one has ever been configured. Read by every role
    /// during registration, so it carries no role gate.
    pub async fn active_price(&self) -> CareResult<Option<ConsultationPrice>> {
        self.store.read(|tables| Ok(tables.active_price()))
    }

    /// Retires the current fee without replacing it. Registrations then
    /// require an explicit amount until a new fee is set.
    pub async fn deactivate_price(&self, principal: &Principal) -> CareResult<Option<ConsultationPrice>> {
        ensure_role(principal, &[Role::Administrator])?;
        let updated_by = principal.id;
        let row = self.store.write(move |tables| {
            match tables.active_price() {
                Some(active) => {
                    let row = tables.price_mut(active.id)?;
                    row.deactivate(updated_by);
                    Ok(Some(row.clone()))
                }
                None => Ok(None),
            }
        })?;
        if let Some(ref row) = row {
            info!(price = row.price, "consultation price deactivated");
        }
        Ok(row)
    }

    /// Most recently touched rows first, active or not.
    pub async fn price_history(
        &self,
        limit: Option<usize>,
        principal: &Principal,
    ) -> CareResult<Vec<ConsultationPrice>> {
        ensure_role(principal, &[Role::Administrator, Role::Reception])?;
        let limit = limit.unwrap_or(10);
        self.store.read(move |tables| {
            let mut rows: Vec<ConsultationPrice> =
                tables.consultation_prices.values().cloned().collect();
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            rows.truncate(limit);
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::services::harness::TestContext;
    use models::errors::CareError;

    #[tokio::test]
    async fn should_keep_a_single_active_price() {
        let cx = TestContext::new();
        let first = cx
            .services
            .pricing
            .set_active_price(10_000, &cx.admin)
            .await
            .unwrap();
        let second = cx
            .services
            .pricing
            .set_active_price(12_500, &cx.admin)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.price, 12_500);

        let active_count = cx
            .store
            .read(|tables| {
                Ok(tables
                    .consultation_prices
                    .values()
                    .filter(|p| p.is_active)
                    .count())
            })
            .unwrap();
        assert_eq!(active_count, 1);
    }

    #[tokio::test]
    async fn should_open_fresh_row_after_deactivation() {
        let cx = TestContext::new();
        let first = cx
            .services
            .pricing
            .set_active_price(10_000, &cx.admin)
            .await
            .unwrap();
        cx.services.pricing.deactivate_price(&cx.admin).await.unwrap();
        assert!(cx.services.pricing.active_price().await.unwrap().is_none());

        let replacement = cx
            .services
            .pricing
            .set_active_price(15_000, &cx.admin)
            .await
            .unwrap();
        assert_ne!(replacement.id, first.id);

        let history = cx
            .services
            .pricing
            .price_history(None, &cx.reception)
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, replacement.id);
    }

    #[tokio::test]
    async fn should_reject_non_positive_price() {
        let cx = TestContext::new();
        let err = cx
            .services
            .pricing
            .set_active_price(0, &cx.admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Validation(_)));
        let err = cx
            .services
            .pricing
            .set_active_price(10_000, &cx.reception)
            .await
            .unwrap_err();
        assert!(matches!(err, CareError::Forbidden(_)));
    }
}
