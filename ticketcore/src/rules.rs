//! Pure temporal and pricing rules.
//!
//! Window boundaries are inclusive: a request landing exactly on a boundary
//! is still inside the window.

use chrono::{DateTime, Utc};
use ticketcore_types::{Fare, Flight, UserBalance};

use crate::config::LifecycleConfig;

/// Where a request timestamp falls relative to the check-in window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInWindow {
    /// Too early.
    NotStarted,
    /// Check-in is allowed.
    Open,
    /// Too late.
    Closed,
}

/// Tickets are sold until the sale cutoff before departure.
pub fn sale_is_open(config: &LifecycleConfig, departure: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    departure - now >= config.sale_closes_before_departure.as_duration()
}

/// A ticket can be paid until the payment window after its creation lapses.
pub fn payment_is_open(
    config: &LifecycleConfig,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    now - created_at <= config.payment_window.as_duration()
}

/// Refunds are accepted until the refund cutoff before departure.
pub fn refund_is_open(
    config: &LifecycleConfig,
    departure: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    departure - now >= config.refund_closes_before_departure.as_duration()
}

/// Classify `now` against the check-in window, both ends inclusive.
pub fn check_in_window(
    config: &LifecycleConfig,
    departure: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CheckInWindow {
    let remaining = departure - now;

    if remaining > config.check_in_opens_before_departure.as_duration() {
        CheckInWindow::NotStarted
    } else if remaining < config.check_in_closes_before_departure.as_duration() {
        CheckInWindow::Closed
    } else {
        CheckInWindow::Open
    }
}

/// Fare price plus baggage surcharges plus the seat-selection surcharge when a seat was chosen.
pub fn ticket_price(flight: &Flight, fare: &Fare, baggage_count: u32, seat_selected: bool) -> i64 {
    let baggage = i64::from(baggage_count) * flight.baggage_price;
    let seat_selection = if seat_selected {
        flight.seat_selection_price
    } else {
        0
    };

    fare.price + baggage + seat_selection
}

/// Check a bonus payment against the user's balance and the per-ticket cap.
///
/// Returns the rejection reason on failure.
pub fn check_bonus_payment(
    config: &LifecycleConfig,
    bonuses: i64,
    price: i64,
    balance: Option<UserBalance>,
) -> Result<(), &'static str> {
    if bonuses < 0 {
        return Err("sum of bonuses can't be negative");
    }

    if bonuses == 0 {
        return Ok(());
    }

    let available = balance.map_or(0, |balance| balance.bonuses);
    if available < bonuses {
        return Err("user doesn't have enough bonuses");
    }

    if bonuses > config.max_bonus_share.cap(price) {
        return Err("sum of bonuses exceeds the allowed share of the ticket price");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use ticketcore_types::{FareClass, FareClassId, FlightId};
    use uuid::Uuid;

    fn departure() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn flight() -> (Flight, Fare) {
        let fare = Fare {
            fare_class: FareClass {
                id: FareClassId::new(Uuid::now_v7()),
                name: "Economy".to_string(),
                seat_count: 10,
            },
            price: 1_000,
        };
        let flight = Flight {
            id: FlightId::new(Uuid::now_v7()),
            name: "TC101".to_string(),
            departure: departure(),
            fares: vec![fare.clone()],
            baggage_price: 150,
            seat_selection_price: 75,
        };
        (flight, fare)
    }

    #[test]
    fn sale_closes_exactly_two_hours_out() {
        let config = LifecycleConfig::default();

        assert!(sale_is_open(&config, departure(), departure() - TimeDelta::hours(2)));
        assert!(!sale_is_open(
            &config,
            departure(),
            departure() - TimeDelta::hours(2) + TimeDelta::seconds(1)
        ));
    }

    #[test]
    fn check_in_window_boundaries_are_inclusive() {
        let config = LifecycleConfig::default();
        let at = |offset: TimeDelta| check_in_window(&config, departure(), departure() - offset);

        assert_eq!(at(TimeDelta::hours(24)), CheckInWindow::Open);
        assert_eq!(at(TimeDelta::hours(1)), CheckInWindow::Open);
        assert_eq!(
            at(TimeDelta::hours(24) + TimeDelta::seconds(1)),
            CheckInWindow::NotStarted
        );
        assert_eq!(
            at(TimeDelta::hours(1) - TimeDelta::seconds(1)),
            CheckInWindow::Closed
        );
    }

    #[test]
    fn price_adds_baggage_and_seat_selection() {
        let (flight, fare) = flight();

        assert_eq!(ticket_price(&flight, &fare, 0, false), 1_000);
        assert_eq!(ticket_price(&flight, &fare, 2, true), 1_375);
    }

    #[test]
    fn zero_bonus_payment_needs_no_balance() {
        let config = LifecycleConfig::default();

        assert_eq!(check_bonus_payment(&config, 0, 1_000, None), Ok(()));
    }

    #[test]
    fn bonus_payment_without_ledger_is_rejected() {
        let config = LifecycleConfig::default();

        assert!(check_bonus_payment(&config, 1, 1_000, None).is_err());
    }

    #[test]
    fn negative_bonus_payment_is_rejected() {
        let config = LifecycleConfig::default();
        let balance = Some(UserBalance {
            purchases: 0,
            bonuses: 100,
        });

        assert_eq!(
            check_bonus_payment(&config, -1, 1_000, balance),
            Err("sum of bonuses can't be negative")
        );
    }
}
