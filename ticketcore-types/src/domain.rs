//! Read snapshots of flights, users, passengers and tickets.

use chrono::{DateTime, Utc};
use nutype::nutype;
use serde::{Deserialize, Serialize};

use crate::command::LedgerDelta;
use crate::ids::{FareClassId, FlightId, PassengerId, SeatId, TicketId, UserId};

/// Position of a ticket in its lifecycle.
///
/// Tickets move `Created → Paid → {Refunded | Registered}`. An unpaid ticket
/// whose payment window lapsed is swept to `Canceled`. The numeric codes are
/// the persisted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Booked, awaiting payment.
    Created,
    /// Paid, eligible for refund or check-in.
    Paid,
    /// Never paid within the payment window.
    Canceled,
    /// Refunded to the user as bonus points.
    Refunded,
    /// Checked in for the flight.
    Registered,
}

impl TicketStatus {
    /// Persisted status code.
    pub const fn code(self) -> i16 {
        match self {
            Self::Created => 1,
            Self::Paid => 2,
            Self::Canceled => 3,
            Self::Refunded => 4,
            Self::Registered => 5,
        }
    }

    /// Inverse of [`TicketStatus::code`].
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Created),
            2 => Some(Self::Paid),
            3 => Some(Self::Canceled),
            4 => Some(Self::Refunded),
            5 => Some(Self::Registered),
            _ => None,
        }
    }

    /// Human-readable name, also used by `Display`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Paid => "Paid",
            Self::Canceled => "Canceled",
            Self::Refunded => "Refunded",
            Self::Registered => "Registered",
        }
    }

    /// Whether a ticket in this status occupies a seat and a fare-class slot.
    pub const fn holds_inventory(self) -> bool {
        !matches!(self, Self::Canceled | Self::Refunded)
    }

    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Refunded | Self::Registered)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A named seating tier with its own seat pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareClass {
    /// Catalog id.
    pub id: FareClassId,
    /// Display name such as `Economy`.
    pub name: String,
    /// Total seats of this class on the aircraft.
    pub seat_count: u32,
}

/// Unit ticket price of one fare class on one flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    /// The class this price applies to.
    pub fare_class: FareClass,
    /// Price per ticket before surcharges.
    pub price: i64,
}

/// Flight snapshot consumed by pricing and the temporal windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    /// Catalog id.
    pub id: FlightId,
    /// Flight number.
    pub name: String,
    /// Scheduled departure; anchors every window.
    pub departure: DateTime<Utc>,
    /// Fare classes offered on the flight.
    pub fares: Vec<Fare>,
    /// Surcharge per additional bag.
    pub baggage_price: i64,
    /// Surcharge for choosing a seat at booking.
    pub seat_selection_price: i64,
}

impl Flight {
    /// The fare for a class, if the flight offers it.
    pub fn fare(&self, fare_class_id: FareClassId) -> Option<&Fare> {
        self.fares
            .iter()
            .find(|fare| fare.fare_class.id == fare_class_id)
    }
}

/// A physical seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    /// Catalog id.
    pub id: SeatId,
    /// Fare class the seat belongs to.
    pub fare_class_id: FareClassId,
    /// Cabin label such as `12C`.
    pub number: String,
}

/// Point-in-time view of unassigned seats for one flight and fare class.
///
/// This is not a reservation. `vacant_count` counts free fare-class slots,
/// which can exceed `seats.len()` because tickets booked without a seat use
/// a slot but no seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacantSeats {
    /// The class the view covers.
    pub fare_class_id: FareClassId,
    /// Display name of the class.
    pub fare_class_name: String,
    /// Free fare-class slots.
    pub vacant_count: u32,
    /// Seats not held by a live ticket.
    pub seats: Vec<Seat>,
}

impl VacantSeats {
    /// Whether `seat_id` is among the vacant seats.
    pub fn contains(&self, seat_id: SeatId) -> bool {
        self.seats.iter().any(|seat| seat.id == seat_id)
    }
}

/// Running totals of a user's purchases and bonus points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBalance {
    /// Sum of paid ticket prices.
    pub purchases: i64,
    /// Spendable bonus points.
    pub bonuses: i64,
}

impl UserBalance {
    /// Apply a relative change, refusing one that would leave bonuses negative.
    pub fn checked_apply(self, delta: LedgerDelta) -> Option<Self> {
        let purchases = self.purchases.checked_add(delta.purchases)?;
        let bonuses = self.bonuses.checked_add(delta.bonuses)?;

        (bonuses >= 0).then_some(Self {
            purchases,
            bonuses,
        })
    }
}

/// User directory entry.
///
/// `balance` is `None` until the first payment opens the ledger, which is
/// distinct from an explicit zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Directory id.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Contact address.
    pub email: String,
    /// Ledger, once opened.
    pub balance: Option<UserBalance>,
}

#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
/// Full passenger name as printed on the ticket.
pub struct PassengerName(String);

/// Passport or other identity document number.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct IdentityDocument(String);

/// A traveller owned by a user; reusable across that user's tickets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    /// Directory id.
    pub id: PassengerId,
    /// Owner of the passenger.
    pub user_id: UserId,
    /// Traveller name.
    pub name: PassengerName,
    /// Document presented at check-in.
    pub identity_document: IdentityDocument,
}

/// Denormalized ticket view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket id.
    pub id: TicketId,
    /// Current lifecycle status.
    pub status: TicketStatus,
    /// When the ticket entered `status`.
    pub status_at: DateTime<Utc>,
    /// The flight the ticket is for.
    pub flight: Flight,
    /// Owner of the ticket.
    pub user_id: UserId,
    /// The traveller.
    pub passenger: Passenger,
    /// The fare class the ticket occupies.
    pub fare_class: FareClass,
    /// Assigned seat; may be empty until check-in.
    pub seat: Option<Seat>,
    /// Extra bags.
    pub baggage_count: u32,
    /// Fixed at creation.
    pub price: i64,
    /// Bonus points spent at payment.
    pub paid_with_bonuses: i64,
    /// Bonus points credited at check-in.
    pub accrued_bonuses: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_through_persisted_representation() {
        for status in [
            TicketStatus::Created,
            TicketStatus::Paid,
            TicketStatus::Canceled,
            TicketStatus::Refunded,
            TicketStatus::Registered,
        ] {
            assert_eq!(TicketStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(TicketStatus::from_code(0), None);
    }

    #[test]
    fn released_statuses_do_not_hold_inventory() {
        assert!(TicketStatus::Created.holds_inventory());
        assert!(TicketStatus::Paid.holds_inventory());
        assert!(TicketStatus::Registered.holds_inventory());
        assert!(!TicketStatus::Canceled.holds_inventory());
        assert!(!TicketStatus::Refunded.holds_inventory());
    }

    #[test]
    fn only_unfinished_statuses_accept_transitions() {
        assert!(!TicketStatus::Created.is_terminal());
        assert!(!TicketStatus::Paid.is_terminal());
        assert!(TicketStatus::Canceled.is_terminal());
        assert!(TicketStatus::Refunded.is_terminal());
        assert!(TicketStatus::Registered.is_terminal());
    }

    #[test]
    fn balance_refuses_negative_bonuses() {
        let balance = UserBalance {
            purchases: 1_000,
            bonuses: 300,
        };

        let overdrawn = balance.checked_apply(LedgerDelta::purchase(500, 400));

        assert_eq!(overdrawn, None);
    }

    #[test]
    fn balance_applies_relative_purchase() {
        let balance = UserBalance {
            purchases: 1_000,
            bonuses: 600,
        };

        let updated = balance
            .checked_apply(LedgerDelta::purchase(1_000, 400))
            .expect("balance should cover the spent bonuses");

        assert_eq!(
            updated,
            UserBalance {
                purchases: 2_000,
                bonuses: 200,
            }
        );
    }

    #[test]
    fn passenger_name_is_trimmed_and_required() {
        let name = PassengerName::try_new("  Ada Lovelace ").expect("valid name");

        assert_eq!(name.as_ref(), "Ada Lovelace");
        assert!(PassengerName::try_new("   ").is_err());
    }
}
