//! Error types surfaced by the lifecycle service.
//!
//! Every failure carries a machine-readable code and a human message.
//! Callers branch on [`TicketError::kind`]: business-rule rejections are
//! caller-correctable, storage failures are outages and deliberately opaque.

use thiserror::Error;
use ticketcore_types::{
    FareClassId, FlightId, PassengerId, SeatId, StoreError, TicketId, TicketStatus, UserId,
};

/// Coarse classification of a [`TicketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// A lifecycle rule rejected the request. Never retried automatically.
    BusinessRule,
    /// The backing store failed.
    Storage,
}

/// The entity a lookup did not find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    /// A flight.
    Flight(FlightId),
    /// A user.
    User(UserId),
    /// A passenger.
    Passenger(PassengerId),
    /// A ticket.
    Ticket(TicketId),
    /// A fare class the flight does not offer.
    FareClass {
        /// Flight that was searched.
        flight_id: FlightId,
        /// Fare class that was asked for.
        fare_class_id: FareClassId,
    },
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flight(id) => write!(f, "flight (id {id})"),
            Self::User(id) => write!(f, "user (id {id})"),
            Self::Passenger(id) => write!(f, "passenger (id {id})"),
            Self::Ticket(id) => write!(f, "ticket (id {id})"),
            Self::FareClass {
                flight_id,
                fare_class_id,
            } => write!(f, "fare class (id {fare_class_id}) on flight (id {flight_id})"),
        }
    }
}

/// Failure of a lifecycle operation.
#[derive(Debug, Error)]
pub enum TicketError {
    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(Entity),

    /// The request itself is malformed.
    #[error("bad request: {reason}")]
    BadRequest {
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Sales closed before departure.
    #[error("sale of tickets for flight (id {flight_id}) is closed")]
    FlightAlreadyClosed {
        /// The flight.
        flight_id: FlightId,
    },

    /// The passenger belongs to another user.
    #[error("the passenger's user (id {owner_id}) doesn't match the user of the ticket (id {user_id})")]
    InvalidPassenger {
        /// The passenger.
        passenger_id: PassengerId,
        /// Owner of the passenger.
        owner_id: UserId,
        /// User making the request.
        user_id: UserId,
    },

    /// The fare class is sold out.
    #[error("no vacant seats with fare class (id {fare_class_id})")]
    NoVacantSeat {
        /// The sold out class.
        fare_class_id: FareClassId,
    },

    /// The seat is held or belongs to another class.
    #[error("seat (id {seat_id}) isn't in the list of vacant seats")]
    SeatNotVacant {
        /// The requested seat.
        seat_id: SeatId,
    },

    /// The ticket is not in the status the operation needs.
    #[error("ticket (id {ticket_id}) has wrong status ({status})")]
    InvalidTicketStatus {
        /// The ticket.
        ticket_id: TicketId,
        /// Its current status.
        status: TicketStatus,
    },

    /// The payment window lapsed.
    #[error("time to pay for ticket (id {ticket_id}) is over")]
    TicketAlreadyCanceled {
        /// The unpaid ticket.
        ticket_id: TicketId,
    },

    /// The requester may not act on the ticket.
    #[error("invalid user (id {user_id}): {reason}")]
    InvalidUser {
        /// User making the request.
        user_id: UserId,
        /// Why it was refused.
        reason: &'static str,
    },

    /// The bonus amount breaks the cap or the ledger balance.
    #[error("invalid bonus amount: {reason}")]
    InvalidBonusAmount {
        /// Why it was refused.
        reason: &'static str,
    },

    /// Refunds closed before departure.
    #[error("refund of ticket (id {ticket_id}) is no longer possible")]
    RefundAlreadyClosed {
        /// The ticket.
        ticket_id: TicketId,
    },

    /// Too close to departure to check in.
    #[error("check-in for ticket (id {ticket_id}) is already closed")]
    CheckInAlreadyClosed {
        /// The ticket.
        ticket_id: TicketId,
    },

    /// Too early to check in.
    #[error("check-in for ticket (id {ticket_id}) hasn't started yet")]
    CheckInNotStarted {
        /// The ticket.
        ticket_id: TicketId,
    },

    /// Check-in needs a seat and none was given.
    #[error("ticket (id {ticket_id}) has no seat; a seat has to be assigned")]
    SeatNotAssigned {
        /// The seatless ticket.
        ticket_id: TicketId,
    },

    /// Opaque infrastructure failure; the cause stays available via `source()`.
    #[error("internal storage failure")]
    Storage(#[source] StoreError),
}

impl TicketError {
    /// Machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::FlightAlreadyClosed { .. } => "FLIGHT_ALREADY_CLOSED",
            Self::InvalidPassenger { .. } => "INVALID_PASSENGER",
            Self::NoVacantSeat { .. } => "NO_VACANT_SEAT",
            Self::SeatNotVacant { .. } => "SEAT_DOESNT_VACANT",
            Self::InvalidTicketStatus { .. } => "INVALID_STATUS_TICKET",
            Self::TicketAlreadyCanceled { .. } => "TICKET_ALREADY_CANCELED",
            Self::InvalidUser { .. } => "INVALID_USER",
            Self::InvalidBonusAmount { .. } => "INVALID_SUM_BONUSES",
            Self::RefundAlreadyClosed { .. } => "REFUND_ALREADY_CLOSED",
            Self::CheckInAlreadyClosed { .. } => "CHECK_IN_ALREADY_CLOSED",
            Self::CheckInNotStarted { .. } => "CHECK_IN_DOESNT_START",
            Self::SeatNotAssigned { .. } => "SEAT_DOESNT_ASSIGNED",
            Self::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// Coarse category used to pick a transport status.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(_) => ErrorKind::Storage,
            _ => ErrorKind::BusinessRule,
        }
    }
}

/// Commit-time consistency rejections surface as the business rule they
/// protect, so a caller that lost a race sees the same code a fresh check
/// would produce.
impl From<StoreError> for TicketError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::SeatTaken { seat_id, .. } => Self::SeatNotVacant { seat_id },
            StoreError::FareClassFull { fare_class_id, .. } => Self::NoVacantSeat { fare_class_id },
            StoreError::StatusConflict {
                ticket_id, actual, ..
            } => Self::InvalidTicketStatus {
                ticket_id,
                status: actual,
            },
            StoreError::TicketNotFound { ticket_id } => Self::NotFound(Entity::Ticket(ticket_id)),
            StoreError::MissingLedger { user_id } => Self::InvalidUser {
                user_id,
                reason: "no information about the user's balance",
            },
            StoreError::InsufficientBonuses { .. } => Self::InvalidBonusAmount {
                reason: "user doesn't have enough bonuses",
            },
            other @ (StoreError::MissingReference { .. }
            | StoreError::CorruptRecord { .. }
            | StoreError::StoreFailure { .. }) => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ticketcore_types::Operation;
    use uuid::Uuid;

    #[test]
    fn lost_seat_race_maps_to_seat_not_vacant() {
        let seat_id = SeatId::new(Uuid::nil());
        let error = TicketError::from(StoreError::SeatTaken {
            flight_id: FlightId::new(Uuid::nil()),
            seat_id,
        });

        assert_eq!(error.code(), "SEAT_DOESNT_VACANT");
        assert_eq!(error.kind(), ErrorKind::BusinessRule);
    }

    #[test]
    fn lost_status_race_maps_to_invalid_status() {
        let error = TicketError::from(StoreError::StatusConflict {
            ticket_id: TicketId::new(Uuid::nil()),
            expected: TicketStatus::Paid,
            actual: TicketStatus::Registered,
        });

        assert_eq!(error.code(), "INVALID_STATUS_TICKET");
    }

    #[test]
    fn infrastructure_failure_stays_opaque() {
        let error = TicketError::from(StoreError::StoreFailure {
            operation: Operation::CommitTransaction,
        });

        assert_eq!(error.code(), "STORAGE_FAILURE");
        assert_eq!(error.kind(), ErrorKind::Storage);
        assert_eq!(error.to_string(), "internal storage failure");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn missing_entities_are_not_found() {
        let error = TicketError::NotFound(Entity::Flight(FlightId::new(Uuid::nil())));

        assert_eq!(error.kind(), ErrorKind::NotFound);
        insta::assert_snapshot!(
            error.to_string(),
            @"flight (id 00000000-0000-0000-0000-000000000000) not found"
        );
    }
}
