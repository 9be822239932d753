//! Fully validated persistence commands.
//!
//! The lifecycle service builds one command per transition describing every
//! row change it requires. A backend applies a command as a single atomic
//! unit and performs no business validation beyond the commit-time
//! consistency checks documented on each repository method.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Passenger;
use crate::ids::{FareClassId, FlightId, PassengerId, SeatId, TicketId, UserId};

/// Passenger travelling on a new ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PassengerAssignment {
    /// Reuse a passenger the user already owns.
    Existing(PassengerId),
    /// Insert this passenger in the same commit as the ticket.
    New(Passenger),
}

impl PassengerAssignment {
    /// Id the ticket will reference, whether reused or new.
    pub const fn passenger_id(&self) -> PassengerId {
        match self {
            Self::Existing(id) => *id,
            Self::New(passenger) => passenger.id,
        }
    }
}

/// Relative change to a user's ledger, applied by the backend at commit time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    /// Change to cumulative purchases.
    pub purchases: i64,
    /// Change to the bonus balance.
    pub bonuses: i64,
}

impl LedgerDelta {
    /// A paid ticket: purchases grow by the price, spent bonuses are withdrawn.
    pub const fn purchase(price: i64, bonuses_spent: i64) -> Self {
        Self {
            purchases: price,
            bonuses: -bonuses_spent,
        }
    }

    /// A refunded ticket: the price leaves purchases and returns as bonus points.
    pub const fn refund(price: i64) -> Self {
        Self {
            purchases: -price,
            bonuses: price,
        }
    }

    /// Deferred accrual credited at check-in.
    pub const fn credit(bonuses: i64) -> Self {
        Self {
            purchases: 0,
            bonuses,
        }
    }
}

/// Ledger side of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerUpdate {
    /// First payment of the user: open the ledger with `purchases` and zero bonuses.
    ///
    /// Backends upsert, so a concurrent first payment that opened the ledger
    /// in the meantime is added to rather than overwritten.
    Open {
        /// Price of the first paid ticket.
        purchases: i64,
    },
    /// Adjust an existing ledger.
    Adjust(LedgerDelta),
}

impl LedgerUpdate {
    /// The change this update makes relative to an existing ledger.
    pub const fn as_delta(self) -> LedgerDelta {
        match self {
            Self::Open { purchases } => LedgerDelta::purchase(purchases, 0),
            Self::Adjust(delta) => delta,
        }
    }
}

/// Insert a ticket in `Created`, with its passenger when new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    /// Id of the ticket to insert.
    pub ticket_id: TicketId,
    /// Request time; starts the payment window.
    pub created_at: DateTime<Utc>,
    /// Flight the ticket is sold on.
    pub flight_id: FlightId,
    /// Owner of the ticket.
    pub user_id: UserId,
    /// Passenger travelling on the ticket.
    pub passenger: PassengerAssignment,
    /// Fare class the ticket occupies.
    pub fare_class_id: FareClassId,
    /// Seat chosen at booking, if any.
    pub seat_id: Option<SeatId>,
    /// Extra bags on top of the fare.
    pub baggage_count: u32,
    /// Final price including surcharges.
    pub price: i64,
}

/// Move a ticket `Created → Paid` and charge the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketPayment {
    /// Ticket to pay for.
    pub ticket_id: TicketId,
    /// Owner whose ledger is charged.
    pub user_id: UserId,
    /// Request time; becomes the status timestamp.
    pub paid_at: DateTime<Utc>,
    /// Bonus points spent on this ticket.
    pub paid_with_bonuses: i64,
    /// Bonus points credited later, at check-in.
    pub accrued_bonuses: i64,
    /// Ledger side of the payment.
    pub ledger: LedgerUpdate,
}

/// Move a ticket `Paid → Refunded` and credit the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRefund {
    /// Ticket to refund.
    pub ticket_id: TicketId,
    /// Owner whose ledger is credited.
    pub user_id: UserId,
    /// Request time; becomes the status timestamp.
    pub refunded_at: DateTime<Utc>,
    /// Price back out of purchases and into bonuses.
    pub ledger: LedgerDelta,
}

/// Move a ticket `Paid → Registered`, assigning a seat when it has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRegistration {
    /// Ticket to check in.
    pub ticket_id: TicketId,
    /// Owner whose ledger receives the accrued bonuses.
    pub user_id: UserId,
    /// Request time; becomes the status timestamp.
    pub registered_at: DateTime<Utc>,
    /// Seat chosen at check-in; `None` when the ticket already holds one.
    pub seat_id: Option<SeatId>,
    /// Deferred accrual credited to the ledger.
    pub ledger: LedgerDelta,
}

/// Cancel every `Created` ticket whose status timestamp is older than `created_before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSweep {
    /// Exclusive cutoff on the `Created` timestamp.
    pub created_before: DateTime<Utc>,
    /// Status timestamp given to every canceled ticket.
    pub canceled_at: DateTime<Utc>,
}
