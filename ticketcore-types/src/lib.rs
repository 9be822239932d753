//! Shared vocabulary for the `TicketCore` ticket lifecycle engine.
//!
//! This crate holds everything the lifecycle service and its storage
//! backends must agree on: identifiers, read snapshots, persistence
//! commands and the capability traits a backend implements. It carries no
//! business rules of its own.

pub mod bonus;
pub mod command;
pub mod domain;
pub mod ids;
pub mod store;

pub use bonus::{AccrualPercent, BonusSchedule, BonusTier};
pub use command::{
    LedgerDelta, LedgerUpdate, NewTicket, PassengerAssignment, TicketPayment, TicketRefund,
    TicketRegistration, TicketSweep,
};
pub use domain::{
    Fare, FareClass, Flight, IdentityDocument, Passenger, PassengerName, Seat, Ticket,
    TicketStatus, User, UserBalance, VacantSeats,
};
pub use ids::{FareClassId, FlightId, PassengerId, SeatId, TicketId, UserId};
pub use store::{
    CatalogImport, FlightCatalog, FlightRecord, Operation, PassengerDirectory, StoreError,
    TicketRepository, TicketStore, UserDirectory,
};
