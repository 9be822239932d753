//! # TicketCore
//!
//! Lifecycle engine for travel tickets: booking, payment, refund and
//! check-in, keeping seat inventory, ticket status and per-user bonus
//! ledgers consistent under concurrent requests.
//!
//! The engine is split the same way at runtime as in this crate:
//!
//! - [`TicketService`] validates a request against read snapshots and builds
//!   exactly one persistence command.
//! - A storage backend implementing [`TicketStore`] applies that command
//!   atomically and re-checks inventory and status inside the commit.
//!
//! ```ignore
//! use std::sync::Arc;
//! use ticketcore::{LifecycleConfig, TicketService};
//! use ticketcore_memory::InMemoryTicketStore;
//!
//! let store = Arc::new(InMemoryTicketStore::new());
//! let service = TicketService::new(store, LifecycleConfig::from_env()?);
//!
//! let ticket_id = service.create_ticket(request, chrono::Utc::now()).await?;
//! ```

pub mod config;
pub mod errors;
pub mod request;
pub mod rules;
mod service;

pub use config::{BonusSharePercent, ConfigError, LifecycleConfig, WindowMinutes};
pub use errors::{Entity, ErrorKind, TicketError};
pub use request::{CreateTicket, PassengerRef, PayForTicket, RefundTicket, RegisterTicket};
pub use service::TicketService;
pub use ticketcore_types::*;
