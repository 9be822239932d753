//! Shared harness for lifecycle integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use ticketcore::{
    CreateTicket, LifecycleConfig, PassengerRef, PayForTicket, TicketId, TicketService, User,
    UserBalance, UserDirectory,
};
use ticketcore_memory::InMemoryTicketStore;
use ticketcore_testing::fixtures::{self, FlightBuilder, FlightFixture};

pub const ECONOMY_PRICE: i64 = 1_000;
pub const BUSINESS_PRICE: i64 = 4_000;

/// One flight three days out with three economy seats and one business seat.
pub struct World {
    pub store: Arc<InMemoryTicketStore>,
    pub service: TicketService,
    pub flight: FlightFixture,
}

impl World {
    pub async fn new(users: &[&User]) -> Self {
        let store = Arc::new(InMemoryTicketStore::new());
        let flight = FlightBuilder::departing_at(booking_time() + TimeDelta::days(3))
            .fare_class("Economy", ECONOMY_PRICE, 3)
            .fare_class("Business", BUSINESS_PRICE, 1)
            .build();
        fixtures::seed(store.as_ref(), &flight, users)
            .await
            .expect("seeding should succeed");
        let service = TicketService::new(
            Arc::clone(&store),
            LifecycleConfig::new().expect("default config is valid"),
        );

        Self {
            store,
            service,
            flight,
        }
    }

    pub fn departure(&self) -> DateTime<Utc> {
        self.flight.record.flight.departure
    }

    pub fn economy(&self) -> ticketcore::FareClassId {
        self.flight.fare_class(0).id
    }

    pub fn business(&self) -> ticketcore::FareClassId {
        self.flight.fare_class(1).id
    }

    pub fn booking(&self, user: &User) -> CreateTicket {
        CreateTicket {
            flight_id: self.flight.flight_id(),
            user_id: user.id,
            passenger: new_passenger(),
            fare_class_id: self.economy(),
            seat_id: None,
            baggage_count: 0,
        }
    }

    /// Book a plain economy ticket at [`booking_time`].
    pub async fn book(&self, user: &User) -> TicketId {
        self.service
            .create_ticket(self.booking(user), booking_time())
            .await
            .expect("booking should succeed")
    }

    /// Book and pay a plain economy ticket without bonuses.
    pub async fn book_and_pay(&self, user: &User) -> TicketId {
        let ticket_id = self.book(user).await;
        self.service
            .pay_for_ticket(payment(ticket_id, user, 0), booking_time() + TimeDelta::minutes(5))
            .await
            .expect("payment should succeed")
    }

    pub async fn balance(&self, user: &User) -> Option<UserBalance> {
        self.store
            .get_user(user.id)
            .await
            .expect("user read should succeed")
            .expect("user should exist")
            .balance
    }

    pub async fn vacant_economy(&self) -> u32 {
        ticketcore::FlightCatalog::get_vacant_seats(
            self.store.as_ref(),
            self.flight.flight_id(),
            self.economy(),
        )
        .await
        .expect("vacancy read should succeed")
        .expect("economy is offered")
        .vacant_count
    }

    /// A moment inside the check-in window.
    pub fn check_in_time(&self) -> DateTime<Utc> {
        self.departure() - TimeDelta::hours(3)
    }
}

pub fn booking_time() -> DateTime<Utc> {
    fixtures::reference_time()
}

pub fn new_passenger() -> PassengerRef {
    PassengerRef::New {
        name: "Grace Hopper".to_string(),
        identity_document: "4510 654321".to_string(),
    }
}

pub fn payment(ticket_id: TicketId, user: &User, bonuses: i64) -> PayForTicket {
    PayForTicket {
        ticket_id,
        user_id: user.id,
        bonuses,
    }
}
