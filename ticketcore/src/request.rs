//! Strongly-typed lifecycle requests handed over by the transport layer.

use serde::{Deserialize, Serialize};
use ticketcore_types::{FareClassId, FlightId, PassengerId, SeatId, TicketId, UserId};

/// Passenger for a new ticket: one the user already owns, or a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerRef {
    /// A passenger already owned by the requesting user.
    Existing(PassengerId),
    /// A passenger created together with the ticket.
    New {
        /// Full name; validated by the service.
        name: String,
        /// Passport or other document number.
        identity_document: String,
    },
}

/// Book a ticket on a flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTicket {
    /// Flight to book.
    pub flight_id: FlightId,
    /// Buyer of the ticket.
    pub user_id: UserId,
    /// Who travels.
    pub passenger: PassengerRef,
    /// Requested fare class.
    pub fare_class_id: FareClassId,
    /// Seat chosen at booking; costs the seat-selection surcharge.
    pub seat_id: Option<SeatId>,
    /// Extra bags; each costs the baggage surcharge.
    pub baggage_count: u32,
}

/// Pay for a `Created` ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayForTicket {
    /// Ticket to pay for.
    pub ticket_id: TicketId,
    /// Must own the ticket.
    pub user_id: UserId,
    /// Bonus points applied towards the price.
    pub bonuses: i64,
}

/// Refund a `Paid` ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTicket {
    /// Ticket to refund.
    pub ticket_id: TicketId,
    /// Must own the ticket.
    pub user_id: UserId,
}

/// Check in a `Paid` ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterTicket {
    /// Ticket to check in.
    pub ticket_id: TicketId,
    /// Must own the ticket.
    pub user_id: UserId,
    /// Only consulted when the ticket has no seat yet.
    pub seat_id: Option<SeatId>,
}
