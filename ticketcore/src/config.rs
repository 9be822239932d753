//! Lifecycle window configuration with type-safe validation.
//!
//! Every window is a `nutype` so an out-of-range value is rejected when the
//! configuration is built, not when a request trips over it.

use chrono::TimeDelta;
use nutype::nutype;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a lifecycle window in whole minutes.
///
/// Validated to be between one minute and one week.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 10_080),
    derive(
        Debug,
        Clone,
        Copy,
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
pub struct WindowMinutes(u32);

impl WindowMinutes {
    /// Convert to a `TimeDelta` for arithmetic against request timestamps.
    pub fn as_duration(self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.into_inner()))
    }
}

/// Largest share of a ticket price payable with bonus points, in percent.
#[nutype(
    validate(less_or_equal = 100),
    derive(
        Debug,
        Clone,
        Copy,
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
pub struct BonusSharePercent(u8);

impl BonusSharePercent {
    /// Most bonus points accepted for `price`, rounded down.
    pub fn cap(self, price: i64) -> i64 {
        price * i64::from(self.into_inner()) / 100
    }
}

/// Rejected lifecycle configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The variable is not an integer.
    #[error("{variable} is not a valid number: {value}")]
    Malformed {
        /// Environment variable name.
        variable: &'static str,
        /// Raw value found.
        value: String,
    },

    /// The value parses but falls outside the allowed range.
    #[error("{variable} is out of range: {value}")]
    OutOfRange {
        /// Environment variable name.
        variable: &'static str,
        /// Raw value found.
        value: String,
    },

    /// Check-in would close before it opens.
    #[error(
        "check-in must close before it opens: closes {closes} minutes before departure, opens {opens}"
    )]
    InvertedCheckInWindow {
        /// Minutes before departure check-in opens.
        opens: u32,
        /// Minutes before departure check-in closes.
        closes: u32,
    },
}

/// Temporal eligibility windows and the bonus payment cap.
///
/// All offsets are measured against the flight's departure, except the
/// payment window which runs from the ticket's creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Sales close this long before departure.
    pub sale_closes_before_departure: WindowMinutes,
    /// Time allowed between booking and payment.
    pub payment_window: WindowMinutes,
    /// Refunds close this long before departure.
    pub refund_closes_before_departure: WindowMinutes,
    /// Check-in opens this long before departure.
    pub check_in_opens_before_departure: WindowMinutes,
    /// Check-in closes this long before departure.
    pub check_in_closes_before_departure: WindowMinutes,
    /// Cap on bonus points per payment as a share of the price.
    pub max_bonus_share: BonusSharePercent,
}

impl LifecycleConfig {
    /// Overrides `sale_closes_before_departure`.
    pub const SALE_CLOSES_VAR: &'static str = "TICKETCORE_SALE_CLOSES_MINUTES";
    /// Overrides `payment_window`.
    pub const PAYMENT_WINDOW_VAR: &'static str = "TICKETCORE_PAYMENT_WINDOW_MINUTES";
    /// Overrides `refund_closes_before_departure`.
    pub const REFUND_CLOSES_VAR: &'static str = "TICKETCORE_REFUND_CLOSES_MINUTES";
    /// Overrides `check_in_opens_before_departure`.
    pub const CHECK_IN_OPENS_VAR: &'static str = "TICKETCORE_CHECK_IN_OPENS_MINUTES";
    /// Overrides `check_in_closes_before_departure`.
    pub const CHECK_IN_CLOSES_VAR: &'static str = "TICKETCORE_CHECK_IN_CLOSES_MINUTES";
    /// Overrides `max_bonus_share`.
    pub const MAX_BONUS_SHARE_VAR: &'static str = "TICKETCORE_MAX_BONUS_SHARE_PERCENT";

    /// Create the standard configuration: sales close 2 hours out, 15 minutes
    /// to pay, refunds close 24 hours out, check-in runs from 24 hours to 1
    /// hour before departure, at most half the price in bonuses.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            sale_closes_before_departure: window("sale_closes_before_departure", 120)?,
            payment_window: window("payment_window", 15)?,
            refund_closes_before_departure: window("refund_closes_before_departure", 1_440)?,
            check_in_opens_before_departure: window("check_in_opens_before_departure", 1_440)?,
            check_in_closes_before_departure: window("check_in_closes_before_departure", 60)?,
            max_bonus_share: bonus_share("max_bonus_share", 50)?,
        })
    }

    /// Read overrides from `TICKETCORE_*` environment variables.
    ///
    /// Unset variables keep their standard value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::new()?;

        let window_var = |variable: &'static str, default: WindowMinutes| match lookup(variable) {
            Some(raw) => window(variable, parse(variable, &raw)?),
            None => Ok(default),
        };

        let config = Self {
            sale_closes_before_departure: window_var(
                Self::SALE_CLOSES_VAR,
                defaults.sale_closes_before_departure,
            )?,
            payment_window: window_var(Self::PAYMENT_WINDOW_VAR, defaults.payment_window)?,
            refund_closes_before_departure: window_var(
                Self::REFUND_CLOSES_VAR,
                defaults.refund_closes_before_departure,
            )?,
            check_in_opens_before_departure: window_var(
                Self::CHECK_IN_OPENS_VAR,
                defaults.check_in_opens_before_departure,
            )?,
            check_in_closes_before_departure: window_var(
                Self::CHECK_IN_CLOSES_VAR,
                defaults.check_in_closes_before_departure,
            )?,
            max_bonus_share: match lookup(Self::MAX_BONUS_SHARE_VAR) {
                Some(raw) => bonus_share(
                    Self::MAX_BONUS_SHARE_VAR,
                    parse(Self::MAX_BONUS_SHARE_VAR, &raw)?,
                )?,
                None => defaults.max_bonus_share,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the individual types cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let opens = self.check_in_opens_before_departure.into_inner();
        let closes = self.check_in_closes_before_departure.into_inner();

        if closes >= opens {
            return Err(ConfigError::InvertedCheckInWindow { opens, closes });
        }

        Ok(())
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self::new().expect("Default lifecycle configuration should always be valid")
    }
}

fn parse<T: std::str::FromStr>(variable: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Malformed {
        variable,
        value: raw.to_string(),
    })
}

fn window(variable: &'static str, minutes: u32) -> Result<WindowMinutes, ConfigError> {
    WindowMinutes::try_new(minutes).map_err(|_| ConfigError::OutOfRange {
        variable,
        value: minutes.to_string(),
    })
}

fn bonus_share(variable: &'static str, percent: u8) -> Result<BonusSharePercent, ConfigError> {
    BonusSharePercent::try_new(percent).map_err(|_| ConfigError::OutOfRange {
        variable,
        value: percent.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn default_windows_match_standard_policy() {
        let config = LifecycleConfig::default();

        assert_eq!(
            config.sale_closes_before_departure.as_duration(),
            TimeDelta::hours(2)
        );
        assert_eq!(config.payment_window.as_duration(), TimeDelta::minutes(15));
        assert_eq!(
            config.refund_closes_before_departure.as_duration(),
            TimeDelta::hours(24)
        );
        assert_eq!(
            config.check_in_opens_before_departure.as_duration(),
            TimeDelta::hours(24)
        );
        assert_eq!(
            config.check_in_closes_before_departure.as_duration(),
            TimeDelta::hours(1)
        );
        assert_eq!(config.max_bonus_share.cap(1_001), 500);
    }

    #[test]
    fn missing_variables_keep_defaults() {
        let config = LifecycleConfig::from_lookup(lookup_from(&[]))
            .expect("empty environment should yield defaults");

        assert_eq!(config.payment_window.into_inner(), 15);
    }

    #[test]
    fn variables_override_windows() {
        let config = LifecycleConfig::from_lookup(lookup_from(&[
            (LifecycleConfig::PAYMENT_WINDOW_VAR, "30"),
            (LifecycleConfig::MAX_BONUS_SHARE_VAR, " 25 "),
        ]))
        .expect("overrides should be accepted");

        assert_eq!(config.payment_window.into_inner(), 30);
        assert_eq!(config.max_bonus_share.into_inner(), 25);
    }

    #[test]
    fn malformed_variable_is_rejected() {
        let error = LifecycleConfig::from_lookup(lookup_from(&[(
            LifecycleConfig::SALE_CLOSES_VAR,
            "two hours",
        )]))
        .expect_err("non-numeric window should fail");

        assert!(matches!(
            error,
            ConfigError::Malformed {
                variable: LifecycleConfig::SALE_CLOSES_VAR,
                ..
            }
        ));
    }

    #[test]
    fn zero_length_window_is_out_of_range() {
        let error = LifecycleConfig::from_lookup(lookup_from(&[(
            LifecycleConfig::PAYMENT_WINDOW_VAR,
            "0",
        )]))
        .expect_err("zero minute window should fail");

        assert!(matches!(error, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn check_in_closing_after_opening_is_rejected() {
        let error = LifecycleConfig::from_lookup(lookup_from(&[
            (LifecycleConfig::CHECK_IN_OPENS_VAR, "60"),
            (LifecycleConfig::CHECK_IN_CLOSES_VAR, "120"),
        ]))
        .expect_err("inverted check-in window should fail");

        assert!(matches!(
            error,
            ConfigError::InvertedCheckInWindow {
                opens: 60,
                closes: 120
            }
        ));
    }

    #[test]
    fn config_file_values_are_validated_on_deserialize() {
        let json = r#"{
            "sale_closes_before_departure": 180,
            "payment_window": 20,
            "refund_closes_before_departure": 1440,
            "check_in_opens_before_departure": 2880,
            "check_in_closes_before_departure": 45,
            "max_bonus_share": 30
        }"#;

        let config: LifecycleConfig =
            serde_json::from_str(json).expect("valid config file should parse");

        assert_eq!(config.payment_window.into_inner(), 20);
        assert_eq!(config.max_bonus_share.cap(1_000), 300);

        let out_of_range = json.replace("\"max_bonus_share\": 30", "\"max_bonus_share\": 130");
        assert!(serde_json::from_str::<LifecycleConfig>(&out_of_range).is_err());
    }
}
