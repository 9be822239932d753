//! Shared test support for `TicketCore` storage backends.
//!
//! - [`contract`] holds the behavioral scenarios every backend must pass,
//!   wired up per backend with [`ticket_store_contract_tests!`].
//! - [`fixtures`] builds flights, seats and users with fresh identifiers.
//! - [`chaos`] wraps a backend and injects storage failures.

#![forbid(unsafe_code, unreachable_pub)]
#![deny(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_imports,
    unused_must_use,
    unused_qualifications,
    unused_results
)]
#![allow(missing_docs)]

pub mod chaos;
pub mod contract;
pub mod fixtures;

pub use chaos::*;
