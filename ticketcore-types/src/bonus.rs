//! Tiered bonus accrual.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Share of a ticket price credited back as bonus points, in percent.
#[nutype(
    validate(less_or_equal = 100),
    default = 0,
    derive(
        Debug,
        Clone,
        Copy,
        Default,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Display,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct AccrualPercent(u8);

impl AccrualPercent {
    /// Bonus points earned on `price`, rounded down.
    pub fn accrue(self, price: i64) -> i64 {
        price * i64::from(self.into_inner()) / 100
    }
}

/// One step of the accrual schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTier {
    /// Cumulative purchases needed to reach this tier.
    pub min_purchases: i64,
    /// Accrual applied once the threshold is reached.
    pub percent: AccrualPercent,
}

/// Accrual percent as a step function of cumulative purchases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusSchedule {
    tiers: Vec<BonusTier>,
}

impl BonusSchedule {
    /// Build a schedule; tiers may be given in any order.
    pub fn new(tiers: impl IntoIterator<Item = BonusTier>) -> Self {
        let mut tiers: Vec<BonusTier> = tiers.into_iter().collect();
        tiers.sort_by_key(|tier| tier.min_purchases);
        Self { tiers }
    }

    /// Percent of the highest tier reached by `purchases`; zero below every tier.
    pub fn percent_for(&self, purchases: i64) -> AccrualPercent {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.min_purchases <= purchases)
            .map(|tier| tier.percent)
            .unwrap_or_default()
    }

    /// Tiers sorted by threshold.
    pub fn tiers(&self) -> &[BonusTier] {
        &self.tiers
    }
}

impl Default for BonusSchedule {
    fn default() -> Self {
        let tier = |min_purchases, percent| BonusTier {
            min_purchases,
            percent: AccrualPercent::try_new(percent).expect("standard tier percent is valid"),
        };

        Self::new([
            tier(0, 3),
            tier(50_000, 5),
            tier(150_000, 7),
            tier(500_000, 10),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn percent(value: u8) -> AccrualPercent {
        AccrualPercent::try_new(value).expect("valid percent")
    }

    #[test]
    fn standard_schedule_steps_at_tier_thresholds() {
        let schedule = BonusSchedule::default();

        assert_eq!(schedule.percent_for(0), percent(3));
        assert_eq!(schedule.percent_for(49_999), percent(3));
        assert_eq!(schedule.percent_for(50_000), percent(5));
        assert_eq!(schedule.percent_for(150_000), percent(7));
        assert_eq!(schedule.percent_for(10_000_000), percent(10));
    }

    #[test]
    fn purchases_below_every_tier_accrue_nothing() {
        let schedule = BonusSchedule::new([BonusTier {
            min_purchases: 1_000,
            percent: percent(5),
        }]);

        assert_eq!(schedule.percent_for(999), AccrualPercent::default());
    }

    #[test]
    fn tiers_are_kept_in_threshold_order() {
        let schedule = BonusSchedule::new([
            BonusTier {
                min_purchases: 10_000,
                percent: percent(8),
            },
            BonusTier {
                min_purchases: 0,
                percent: percent(2),
            },
        ]);

        let thresholds: Vec<i64> = schedule
            .tiers()
            .iter()
            .map(|tier| tier.min_purchases)
            .collect();
        assert_eq!(thresholds, vec![0, 10_000]);
        assert_eq!(schedule.percent_for(10_000), percent(8));
    }

    #[test]
    fn accrual_rounds_down() {
        assert_eq!(percent(3).accrue(1_050), 31);
        assert_eq!(percent(0).accrue(1_050), 0);
    }

    #[test]
    fn percent_above_one_hundred_is_rejected() {
        assert!(AccrualPercent::try_new(101).is_err());
    }

    proptest! {
        #[test]
        fn accrual_never_exceeds_price(price in 0_i64..10_000_000, value in 0_u8..=100) {
            let accrued = percent(value).accrue(price);
            prop_assert!(accrued >= 0);
            prop_assert!(accrued <= price);
        }
    }
}
