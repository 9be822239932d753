//! Catalog and directory fixtures.
//!
//! Every fixture uses fresh UUIDv7 identifiers so scenarios can run in
//! parallel against a shared database without seeing each other's rows.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use ticketcore_types::{
    CatalogImport, Fare, FareClass, FareClassId, Flight, FlightId, FlightRecord, Seat, SeatId,
    StoreError, User, UserBalance, UserId,
};

pub const BAGGAGE_PRICE: i64 = 150;
pub const SEAT_SELECTION_PRICE: i64 = 75;

/// Fixed reference instant; whole seconds so every backend stores it exactly.
pub fn reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0)
        .single()
        .expect("reference time is unambiguous")
}

/// Builds a flight with its fare classes and physical seats.
#[derive(Debug, Clone)]
pub struct FlightBuilder {
    departure: DateTime<Utc>,
    classes: Vec<(String, i64, u32)>,
}

impl FlightBuilder {
    pub fn departing_at(departure: DateTime<Utc>) -> Self {
        Self {
            departure,
            classes: Vec::new(),
        }
    }

    /// Add a fare class with `seat_count` seats, each backed by a physical seat.
    #[must_use]
    pub fn fare_class(mut self, name: &str, price: i64, seat_count: u32) -> Self {
        self.classes.push((name.to_string(), price, seat_count));
        self
    }

    pub fn build(self) -> FlightFixture {
        let flight_id = FlightId::new(Uuid::now_v7());
        let mut fares = Vec::with_capacity(self.classes.len());
        let mut seats = Vec::new();

        for (row, (name, price, seat_count)) in self.classes.into_iter().enumerate() {
            let fare_class = FareClass {
                id: FareClassId::new(Uuid::now_v7()),
                name,
                seat_count,
            };
            seats.extend((0..seat_count).map(|index| Seat {
                id: SeatId::new(Uuid::now_v7()),
                fare_class_id: fare_class.id,
                number: seat_number(row, index),
            }));
            fares.push(Fare { fare_class, price });
        }

        FlightFixture {
            record: FlightRecord {
                flight: Flight {
                    id: flight_id,
                    name: format!("TC{}", &flight_id.to_string()[..4]),
                    departure: self.departure,
                    fares,
                    baggage_price: BAGGAGE_PRICE,
                    seat_selection_price: SEAT_SELECTION_PRICE,
                },
                seats,
            },
        }
    }
}

fn seat_number(row: usize, index: u32) -> String {
    let letter = char::from(b'A' + u8::try_from(index % 6).unwrap_or(0));
    format!("{}{letter}", row * 10 + usize::try_from(index / 6).unwrap_or(0) + 1)
}

/// A built flight, with lookups used by scenarios.
#[derive(Debug, Clone)]
pub struct FlightFixture {
    pub record: FlightRecord,
}

impl FlightFixture {
    pub const fn flight_id(&self) -> FlightId {
        self.record.flight.id
    }

    /// The `index`-th fare class in declaration order.
    pub fn fare_class(&self, index: usize) -> &FareClass {
        &self.record.flight.fares[index].fare_class
    }

    /// Physical seats of a fare class in seat order.
    pub fn seats(&self, fare_class_id: FareClassId) -> Vec<SeatId> {
        self.record
            .seats
            .iter()
            .filter(|seat| seat.fare_class_id == fare_class_id)
            .map(|seat| seat.id)
            .collect()
    }
}

/// A user with an optional opened ledger.
pub fn user(balance: Option<UserBalance>) -> User {
    let id = UserId::new(Uuid::now_v7());
    User {
        id,
        name: format!("user-{id}"),
        email: format!("{id}@example.test"),
        balance,
    }
}

pub const fn balance(purchases: i64, bonuses: i64) -> UserBalance {
    UserBalance { purchases, bonuses }
}

/// Load a flight and users into a backend.
pub async fn seed<S>(store: &S, flight: &FlightFixture, users: &[&User]) -> Result<(), StoreError>
where
    S: CatalogImport + ?Sized,
{
    store.import_flight(flight.record.clone()).await?;
    for user in users {
        store.import_user((*user).clone()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_creates_one_physical_seat_per_slot() {
        let fixture = FlightBuilder::departing_at(reference_time())
            .fare_class("Economy", 1_000, 3)
            .fare_class("Business", 4_000, 2)
            .build();

        let economy = fixture.fare_class(0).id;
        let business = fixture.fare_class(1).id;

        assert_eq!(fixture.seats(economy).len(), 3);
        assert_eq!(fixture.seats(business).len(), 2);
        assert_eq!(fixture.record.seats[0].number, "1A");
        assert_eq!(fixture.record.seats[3].number, "11A");
    }
}
