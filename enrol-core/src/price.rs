use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A price option configured on a registration. Mutable by event setup,
/// which is why signups never reference it directly (see
/// [`PriceGroupSnapshot`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceGroup {
    pub id: Uuid,
    pub label: String,
    /// Gross price in cents, VAT included. Zero means free of charge.
    pub price_cents: i64,
    /// VAT rate as a percentage, e.g. 25.5.
    pub vat_rate: f64,
}

impl PriceGroup {
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }

    /// Freeze the current price into an immutable snapshot. Later price
    /// changes on the registration must not alter already-admitted signups.
    pub fn snapshot(&self) -> PriceGroupSnapshot {
        let price_without_vat_cents =
            (self.price_cents as f64 / (1.0 + self.vat_rate / 100.0)).round() as i64;

        PriceGroupSnapshot {
            price_group_id: self.id,
            label: self.label.clone(),
            price_cents: self.price_cents,
            vat_rate: self.vat_rate,
            price_without_vat_cents,
            vat_cents: self.price_cents - price_without_vat_cents,
        }
    }
}

/// Immutable price attached to a signup at admission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceGroupSnapshot {
    pub price_group_id: Uuid,
    pub label: String,
    pub price_cents: i64,
    pub vat_rate: f64,
    pub price_without_vat_cents: i64,
    pub vat_cents: i64,
}

impl PriceGroupSnapshot {
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_splits_vat() {
        let group = PriceGroup {
            id: Uuid::new_v4(),
            label: "Adult".to_string(),
            price_cents: 2550,
            vat_rate: 25.5,
        };

        let snapshot = group.snapshot();
        assert_eq!(snapshot.price_cents, 2550);
        assert_eq!(snapshot.price_without_vat_cents, 2032);
        assert_eq!(snapshot.vat_cents, 518);
        assert!(!snapshot.is_free());
    }

    #[test]
    fn zero_price_is_free() {
        let group = PriceGroup {
            id: Uuid::new_v4(),
            label: "Free".to_string(),
            price_cents: 0,
            vat_rate: 0.0,
        };

        assert!(group.is_free());
        assert!(group.snapshot().is_free());
        assert_eq!(group.snapshot().vat_cents, 0);
    }
}
