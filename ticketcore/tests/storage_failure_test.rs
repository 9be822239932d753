//! Storage failures surface as opaque STORAGE_FAILURE errors.

use std::error::Error as _;
use std::sync::Arc;

use chrono::TimeDelta;
use ticketcore::{
    CreateTicket, ErrorKind, FlightCatalog, LifecycleConfig, Operation, PassengerRef, StoreError,
    TicketService,
};
use ticketcore_memory::InMemoryTicketStore;
use ticketcore_testing::chaos::{ChaosConfig, ChaosTicketStoreExt};
use ticketcore_testing::fixtures::{self, FlightBuilder};

#[tokio::test]
async fn developer_observes_storage_failure_on_failed_commit() {
    // Given: a seeded store whose writes always fail
    let base_store = InMemoryTicketStore::new();
    let flight = FlightBuilder::departing_at(fixtures::reference_time() + TimeDelta::days(3))
        .fare_class("Economy", 1_000, 2)
        .build();
    let user = fixtures::user(None);
    fixtures::seed(&base_store, &flight, &[&user])
        .await
        .expect("seeding should succeed");
    let store = base_store.with_chaos(ChaosConfig::deterministic().with_write_failure_probability(1.0));
    let service = TicketService::new(
        Arc::new(store),
        LifecycleConfig::new().expect("default config is valid"),
    );

    // When: booking a ticket
    let error = service
        .create_ticket(
            CreateTicket {
                flight_id: flight.flight_id(),
                user_id: user.id,
                passenger: PassengerRef::New {
                    name: "Katherine Johnson".to_string(),
                    identity_document: "4510 111111".to_string(),
                },
                fare_class_id: flight.fare_class(0).id,
                seat_id: None,
                baggage_count: 0,
            },
            fixtures::reference_time(),
        )
        .await
        .expect_err("failed commit should surface");

    // Then: the failure is opaque but keeps its cause
    assert_eq!(error.code(), "STORAGE_FAILURE");
    assert_eq!(error.kind(), ErrorKind::Storage);
    let source = error
        .source()
        .and_then(|source| source.downcast_ref::<StoreError>())
        .expect("cause should be the store error");
    assert_eq!(
        source,
        &StoreError::StoreFailure {
            operation: Operation::CreateTicket
        }
    );
}

#[tokio::test]
async fn developer_observes_storage_failure_on_failed_read() {
    // Given: a store whose reads always fail
    let store = InMemoryTicketStore::new()
        .with_chaos(ChaosConfig::deterministic().with_read_failure_probability(1.0));
    let service = TicketService::new(
        Arc::new(store),
        LifecycleConfig::new().expect("default config is valid"),
    );

    // When: reading a ticket and sweeping
    let read = service
        .get_ticket(ticketcore::TicketId::generate())
        .await
        .expect_err("failed read should surface");
    let sweep = service
        .cancel_expired_tickets(fixtures::reference_time())
        .await;

    // Then: the read fails opaquely while the write path is untouched
    assert_eq!(read.code(), "STORAGE_FAILURE");
    assert!(sweep.is_ok());
}

#[tokio::test]
async fn developer_swaps_in_a_failing_repository_over_healthy_readers() {
    // Given: healthy catalog and directories with a ticket repository whose writes fail
    let store = InMemoryTicketStore::new();
    let flight = FlightBuilder::departing_at(fixtures::reference_time() + TimeDelta::days(3))
        .fare_class("Economy", 1_000, 2)
        .build();
    let user = fixtures::user(None);
    fixtures::seed(&store, &flight, &[&user])
        .await
        .expect("seeding should succeed");
    let tickets = Arc::new(
        store
            .clone()
            .with_chaos(ChaosConfig::deterministic().with_write_failure_probability(1.0)),
    );
    let service = TicketService::with_components(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        tickets.clone(),
        LifecycleConfig::new().expect("default config is valid"),
    );

    // When: booking a ticket
    let error = service
        .create_ticket(
            CreateTicket {
                flight_id: flight.flight_id(),
                user_id: user.id,
                passenger: PassengerRef::New {
                    name: "Mary Jackson".to_string(),
                    identity_document: "4510 333333".to_string(),
                },
                fare_class_id: flight.fare_class(0).id,
                seat_id: None,
                baggage_count: 0,
            },
            fixtures::reference_time(),
        )
        .await
        .expect_err("repository failure should surface");

    // Then: validation ran against the healthy readers and only the commit failed
    assert_eq!(error.code(), "STORAGE_FAILURE");
    assert_eq!(service.config().payment_window.into_inner(), 15);
    let vacant = tickets
        .inner()
        .get_vacant_seats(flight.flight_id(), flight.fare_class(0).id)
        .await
        .expect("read should succeed")
        .expect("fare class should exist");
    assert_eq!(vacant.vacant_count, 2);
}
