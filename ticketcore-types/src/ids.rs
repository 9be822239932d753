//! Strongly-typed identifiers.
//!
//! Every entity is keyed by a UUID, wrapped so a seat id can never be passed
//! where a fare class id is expected.

use nutype::nutype;
use uuid::Uuid;

/// Identifier of a ticket. New tickets get a time-ordered UUIDv7.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct TicketId(Uuid);

impl TicketId {
    /// Generate a fresh identifier for a ticket about to be created.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of a passenger. New passengers get a time-ordered UUIDv7.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct PassengerId(Uuid);

impl PassengerId {
    /// Generate a fresh identifier for a passenger about to be created.
    pub fn generate() -> Self {
        Self::new(Uuid::now_v7())
    }
}

/// Identifier of a flight, owned by the flight catalog.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct FlightId(Uuid);

/// Identifier of a user, owned by the user directory.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct UserId(Uuid);

/// Identifier of a fare class (seating tier).
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct FareClassId(Uuid);

/// Identifier of a physical seat.
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    AsRef,
    Display,
    Into,
    Serialize,
    Deserialize
))]
pub struct SeatId(Uuid);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ticket_ids_are_uuid_v7() {
        let id = TicketId::generate();

        assert_eq!(
            id.into_inner().get_version(),
            Some(uuid::Version::SortRand)
        );
    }

    #[test]
    fn identifiers_display_as_hyphenated_uuid() {
        let raw = Uuid::nil();
        let id = SeatId::new(raw);

        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }
}
