use chrono::TimeDelta;
use ticketcore_memory::InMemoryTicketStore;
use ticketcore_testing::chaos::{ChaosConfig, ChaosTicketStoreExt};
use ticketcore_testing::fixtures::{self, FlightBuilder};
use ticketcore_types::{
    CatalogImport, FlightCatalog, Operation, StoreError, TicketRepository, TicketSweep,
};

#[tokio::test]
async fn chaos_mode_can_force_read_failure() {
    // Given: deterministic chaos forcing all read operations to fail
    let chaos_store = InMemoryTicketStore::new()
        .with_chaos(ChaosConfig::deterministic().with_read_failure_probability(1.0));
    let flight = FlightBuilder::departing_at(fixtures::reference_time())
        .fare_class("Economy", 1_000, 2)
        .build();

    // When: reading a flight through the chaos-enabled store
    let error = match chaos_store.get_flight(flight.flight_id()).await {
        Ok(_) => panic!("expected chaos-enabled read to fail"),
        Err(err) => err,
    };

    // Then: the failure reason surfaces as a generic store failure
    assert_eq!(
        error,
        StoreError::StoreFailure {
            operation: Operation::GetFlight,
        }
    );
}

#[tokio::test]
async fn chaos_mode_can_force_sweep_failure() {
    // Given: a seeded store whose writes always fail
    let base_store = InMemoryTicketStore::new();
    let flight = FlightBuilder::departing_at(fixtures::reference_time())
        .fare_class("Economy", 1_000, 2)
        .build();
    fixtures::seed(&base_store, &flight, &[])
        .await
        .expect("seeding should succeed");
    let chaos_store =
        base_store.with_chaos(ChaosConfig::deterministic().with_write_failure_probability(1.0));

    // When: running the expiry sweep
    let result = chaos_store
        .cancel_expired_tickets(TicketSweep {
            created_before: fixtures::reference_time(),
            canceled_at: fixtures::reference_time() + TimeDelta::minutes(15),
        })
        .await;

    // Then: the sweep reports a store failure tagged with its operation
    assert_eq!(
        result,
        Err(StoreError::StoreFailure {
            operation: Operation::CancelExpiredTickets,
        })
    );
}

#[tokio::test]
async fn chaos_mode_with_zero_probability_delegates_to_inner_store() {
    // Given: chaos configured to never inject
    let chaos_store = InMemoryTicketStore::new().with_chaos(ChaosConfig::deterministic());
    let flight = FlightBuilder::departing_at(fixtures::reference_time())
        .fare_class("Economy", 1_000, 2)
        .build();

    // When: importing and reading back the flight
    chaos_store
        .import_flight(flight.record.clone())
        .await
        .expect("import should pass through");
    let stored = chaos_store
        .get_flight(flight.flight_id())
        .await
        .expect("read should pass through");

    // Then: the inner store saw the import
    assert_eq!(stored, Some(flight.record.flight.clone()));
}
