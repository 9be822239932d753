//! Storage capability traits and their error vocabulary.
//!
//! Each trait is one capability the lifecycle service consumes. A backend
//! implements all of them (see [`TicketStore`]) but the service only depends
//! on the capability it needs, so tests can swap a single collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bonus::AccrualPercent;
use crate::command::{NewTicket, TicketPayment, TicketRefund, TicketRegistration, TicketSweep};
use crate::domain::{Flight, Passenger, Seat, Ticket, TicketStatus, User, VacantSeats};
use crate::ids::{FareClassId, FlightId, PassengerId, SeatId, TicketId, UserId};

/// Identifies the storage operation that failed.
///
/// Used by `StoreError::StoreFailure` to name which step hit an
/// infrastructure failure without leaking backend details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reading a flight snapshot.
    GetFlight,
    /// Reading the vacant seats of a fare class.
    GetVacantSeats,
    /// Reading a user and their ledger.
    GetUser,
    /// Resolving the accrual tier of a user.
    GetBonusAccrualPercent,
    /// Reading a passenger.
    GetPassenger,
    /// Reading a ticket.
    GetTicket,
    /// Committing a new ticket.
    CreateTicket,
    /// Committing a payment.
    PayForTicket,
    /// Committing a refund.
    RefundTicket,
    /// Committing a check-in.
    RegisterTicket,
    /// Canceling lapsed unpaid tickets.
    CancelExpiredTickets,
    /// Loading catalog data.
    ImportFlight,
    /// Loading directory data.
    ImportUser,
    /// Beginning a database transaction.
    BeginTransaction,
    /// Committing a database transaction.
    CommitTransaction,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetFlight => write!(f, "get_flight"),
            Self::GetVacantSeats => write!(f, "get_vacant_seats"),
            Self::GetUser => write!(f, "get_user"),
            Self::GetBonusAccrualPercent => write!(f, "get_bonus_accrual_percent"),
            Self::GetPassenger => write!(f, "get_passenger"),
            Self::GetTicket => write!(f, "get_ticket"),
            Self::CreateTicket => write!(f, "create_ticket"),
            Self::PayForTicket => write!(f, "pay_for_ticket"),
            Self::RefundTicket => write!(f, "refund_ticket"),
            Self::RegisterTicket => write!(f, "register_ticket"),
            Self::CancelExpiredTickets => write!(f, "cancel_expired_tickets"),
            Self::ImportFlight => write!(f, "import_flight"),
            Self::ImportUser => write!(f, "import_user"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::CommitTransaction => write!(f, "commit_transaction"),
        }
    }
}

/// Error type returned by storage backends.
///
/// The first group of variants are commit-time consistency rejections: the
/// command was rolled back because committed state no longer matched the
/// snapshot it was validated against. Callers treat them as business
/// conditions. `StoreFailure` and `CorruptRecord` are outages.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The seat is held by another live ticket on the same flight.
    #[error("seat {seat_id} on flight {flight_id} is already held by another ticket")]
    SeatTaken {
        /// Flight of the contested seat.
        flight_id: FlightId,
        /// The contested seat.
        seat_id: SeatId,
    },

    /// Every slot of the fare class is held by live tickets.
    #[error("fare class {fare_class_id} on flight {flight_id} has no free capacity")]
    FareClassFull {
        /// Flight that is sold out in this class.
        flight_id: FlightId,
        /// The exhausted fare class.
        fare_class_id: FareClassId,
    },

    /// The ticket left the status the command was validated against.
    #[error("ticket {ticket_id} is {actual}, expected {expected}")]
    StatusConflict {
        /// The ticket the command targeted.
        ticket_id: TicketId,
        /// Status the command was validated against.
        expected: TicketStatus,
        /// Status found at commit time.
        actual: TicketStatus,
    },

    /// The command references a ticket that does not exist.
    #[error("ticket {ticket_id} does not exist")]
    TicketNotFound {
        /// The missing ticket.
        ticket_id: TicketId,
    },

    /// A ledger adjustment targeted a user without a ledger.
    #[error("user {user_id} has no balance ledger")]
    MissingLedger {
        /// User without a ledger row.
        user_id: UserId,
    },

    /// A ledger adjustment would leave the bonus balance negative.
    #[error("user {user_id} has insufficient bonuses")]
    InsufficientBonuses {
        /// User whose bonuses would go negative.
        user_id: UserId,
    },

    /// The command references catalog or directory data the backend does not hold.
    #[error("{entity} referenced by the command does not exist")]
    MissingReference {
        /// Kind of record that is missing.
        entity: &'static str,
    },

    /// A stored row could not be mapped back to the domain.
    #[error("stored {entity} is corrupt: {detail}")]
    CorruptRecord {
        /// Kind of record that failed to map.
        entity: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// Represents infrastructure failures surfaced by the backing store (e.g., connection drops).
    #[error("{operation} operation failed")]
    StoreFailure {
        /// The step that failed.
        operation: Operation,
    },
}

/// Catalog data loaded into a backend: the flight and its physical seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightRecord {
    /// Flight with its fares.
    pub flight: Flight,
    /// Physical seats across all fare classes.
    pub seats: Vec<Seat>,
}

/// Read access to the flight catalog.
#[async_trait]
pub trait FlightCatalog: Send + Sync {
    /// The flight with its fares, or `None` when unknown.
    async fn get_flight(&self, flight_id: FlightId) -> Result<Option<Flight>, StoreError>;

    /// Vacant seats of one fare class, counted from committed live tickets.
    ///
    /// Returns `None` when the flight does not exist or does not offer the
    /// fare class. Canceled and refunded tickets do not occupy anything.
    async fn get_vacant_seats(
        &self,
        flight_id: FlightId,
        fare_class_id: FareClassId,
    ) -> Result<Option<VacantSeats>, StoreError>;
}

/// Read access to users and their balance ledgers.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The user with `balance: None` when no ledger row exists yet.
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    /// Accrual percent for the user's cumulative purchases; zero without a ledger.
    async fn get_bonus_accrual_percent(
        &self,
        user_id: UserId,
    ) -> Result<AccrualPercent, StoreError>;
}

/// Read access to passengers.
#[async_trait]
pub trait PassengerDirectory: Send + Sync {
    /// The passenger, or `None` when unknown.
    async fn get_passenger(
        &self,
        passenger_id: PassengerId,
    ) -> Result<Option<Passenger>, StoreError>;
}

/// Atomic ticket transitions.
///
/// Every write applies all of its row changes or none of them. Backends
/// re-check inventory and status inside the commit:
///
/// - a seat already held by a live ticket fails with [`StoreError::SeatTaken`]
/// - a full fare class fails with [`StoreError::FareClassFull`]
/// - a ticket no longer in the expected status fails with [`StoreError::StatusConflict`]
/// - a ledger change that would overdraw bonuses fails with [`StoreError::InsufficientBonuses`]
///
/// Ledger arithmetic happens inside the commit; callers never write absolute balances.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// The ticket snapshot with its flight, passenger and seat resolved.
    async fn get_ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Insert a `Created` ticket, holding its seat and fare class slot.
    async fn create_ticket(&self, command: NewTicket) -> Result<TicketId, StoreError>;

    /// Mark the ticket paid and charge the ledger.
    async fn pay_for_ticket(&self, command: TicketPayment) -> Result<TicketId, StoreError>;

    /// Mark the ticket refunded and credit the ledger.
    async fn refund_ticket(&self, command: TicketRefund) -> Result<TicketId, StoreError>;

    /// Check the ticket in and credit deferred accrual.
    async fn register_ticket(&self, command: TicketRegistration)
        -> Result<TicketId, StoreError>;

    /// Cancel lapsed unpaid tickets in one batch, returning their ids.
    async fn cancel_expired_tickets(
        &self,
        sweep: TicketSweep,
    ) -> Result<Vec<TicketId>, StoreError>;
}

/// Loading of catalog and directory data owned by external collaborators.
#[async_trait]
pub trait CatalogImport: Send + Sync {
    /// Insert or replace a flight with its fares and seats.
    async fn import_flight(&self, record: FlightRecord) -> Result<(), StoreError>;

    /// Insert or replace a user, including their ledger when present.
    async fn import_user(&self, user: User) -> Result<(), StoreError>;
}

/// Every capability the lifecycle service consumes, in one bound.
pub trait TicketStore:
    FlightCatalog + UserDirectory + PassengerDirectory + TicketRepository
{
}

impl<T> TicketStore for T where
    T: FlightCatalog + UserDirectory + PassengerDirectory + TicketRepository
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_display_is_snake_case() {
        assert_eq!(
            Operation::CancelExpiredTickets.to_string(),
            "cancel_expired_tickets"
        );
        assert_eq!(
            StoreError::StoreFailure {
                operation: Operation::PayForTicket
            }
            .to_string(),
            "pay_for_ticket operation failed"
        );
    }
}
