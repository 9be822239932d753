//! Behavioral contract every storage backend must satisfy.
//!
//! Each scenario seeds its own flight and users, drives the backend through
//! repository commands directly, and reports the first broken expectation
//! as a [`ContractTestFailure`]. Use [`ticket_store_contract_tests!`] to run
//! the whole suite against a backend.

use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use futures::future::join_all;

use ticketcore_types::{
    CatalogImport, FareClassId, IdentityDocument, LedgerDelta, LedgerUpdate, NewTicket,
    Passenger, PassengerAssignment, PassengerId, PassengerName, SeatId, StoreError, Ticket,
    TicketId, TicketPayment, TicketRefund, TicketRegistration, TicketStatus, TicketStore,
    TicketSweep, User, UserBalance, UserId,
};

use crate::fixtures::{self, FlightBuilder, FlightFixture};

#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(scenario: &'static str, operation: &'static str, error: StoreError) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }

    fn assertion(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self::new(scenario, detail)
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

pub type ContractTestResult = Result<(), ContractTestFailure>;

const TICKET_PRICE: i64 = 1_000;

fn step<T>(
    scenario: &'static str,
    operation: &'static str,
    result: Result<T, StoreError>,
) -> Result<T, ContractTestFailure> {
    result.map_err(|error| ContractTestFailure::store_error(scenario, operation, error))
}

fn ensure(scenario: &'static str, condition: bool, detail: impl Into<String>) -> ContractTestResult {
    if condition {
        Ok(())
    } else {
        Err(ContractTestFailure::assertion(scenario, detail))
    }
}

fn expect_rejection<T: fmt::Debug>(
    scenario: &'static str,
    operation: &'static str,
    result: Result<T, StoreError>,
    matches: impl Fn(&StoreError) -> bool,
) -> ContractTestResult {
    match result {
        Err(error) if matches(&error) => Ok(()),
        Err(error) => Err(ContractTestFailure::store_error(scenario, operation, error)),
        Ok(value) => Err(ContractTestFailure::assertion(
            scenario,
            format!("expected {operation} to be rejected but it succeeded with {value:?}"),
        )),
    }
}

fn contract_passenger(user_id: UserId) -> Passenger {
    Passenger {
        id: PassengerId::generate(),
        user_id,
        name: PassengerName::try_new("Ada Lovelace").expect("valid passenger name"),
        identity_document: IdentityDocument::try_new("4510 123456")
            .expect("valid identity document"),
    }
}

fn booking(
    flight: &FlightFixture,
    user: &User,
    fare_class_id: FareClassId,
    seat_id: Option<SeatId>,
) -> NewTicket {
    NewTicket {
        ticket_id: TicketId::generate(),
        created_at: fixtures::reference_time(),
        flight_id: flight.flight_id(),
        user_id: user.id,
        passenger: PassengerAssignment::New(contract_passenger(user.id)),
        fare_class_id,
        seat_id,
        baggage_count: 0,
        price: TICKET_PRICE,
    }
}

fn payment(ticket_id: TicketId, user: &User, ledger: LedgerUpdate) -> TicketPayment {
    TicketPayment {
        ticket_id,
        user_id: user.id,
        paid_at: fixtures::reference_time() + TimeDelta::minutes(5),
        paid_with_bonuses: 0,
        accrued_bonuses: 30,
        ledger,
    }
}

async fn read_ticket<S>(
    scenario: &'static str,
    store: &S,
    ticket_id: TicketId,
) -> Result<Ticket, ContractTestFailure>
where
    S: TicketStore + ?Sized,
{
    step(scenario, "get_ticket", store.get_ticket(ticket_id).await)?.ok_or_else(|| {
        ContractTestFailure::assertion(scenario, format!("ticket {ticket_id} was not persisted"))
    })
}

async fn read_balance<S>(
    scenario: &'static str,
    store: &S,
    user_id: UserId,
) -> Result<Option<UserBalance>, ContractTestFailure>
where
    S: TicketStore + ?Sized,
{
    let user = step(scenario, "get_user", store.get_user(user_id).await)?.ok_or_else(|| {
        ContractTestFailure::assertion(scenario, format!("user {user_id} disappeared"))
    })?;
    Ok(user.balance)
}

async fn seed<S>(
    scenario: &'static str,
    store: &S,
    flight: &FlightFixture,
    users: &[&User],
) -> ContractTestResult
where
    S: CatalogImport + ?Sized,
{
    step(scenario, "seed", fixtures::seed(store, flight, users).await)
}

fn one_class_flight(seat_count: u32) -> FlightFixture {
    FlightBuilder::departing_at(fixtures::reference_time() + TimeDelta::days(3))
        .fare_class("Economy", TICKET_PRICE, seat_count)
        .build()
}

pub async fn test_create_and_read_ticket<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "create_and_read_ticket";

    let store = make_store();
    let flight = one_class_flight(3);
    let user = fixtures::user(None);
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).clone();
    let seat_id = flight.seats(economy.id)[1];
    let command = booking(&flight, &user, economy.id, Some(seat_id));
    let passenger_id = command.passenger.passenger_id();

    let ticket_id = step(SCENARIO, "create_ticket", store.create_ticket(command.clone()).await)?;
    ensure(
        SCENARIO,
        ticket_id == command.ticket_id,
        "create_ticket should return the command's ticket id",
    )?;

    let ticket = read_ticket(SCENARIO, &store, ticket_id).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Created && ticket.status_at == command.created_at,
        format!("expected Created at creation time, observed {ticket:?}"),
    )?;
    ensure(
        SCENARIO,
        ticket.seat.as_ref().map(|seat| seat.id) == Some(seat_id)
            && ticket.fare_class == economy
            && ticket.price == TICKET_PRICE
            && ticket.passenger.id == passenger_id
            && ticket.flight == flight.record.flight,
        format!("ticket view does not reflect the command: {ticket:?}"),
    )?;

    let passenger = step(
        SCENARIO,
        "get_passenger",
        store.get_passenger(passenger_id).await,
    )?;
    ensure(
        SCENARIO,
        passenger.is_some_and(|passenger| passenger.user_id == user.id),
        "new passenger should be persisted with the ticket",
    )?;

    let vacant = step(
        SCENARIO,
        "get_vacant_seats",
        store.get_vacant_seats(flight.flight_id(), economy.id).await,
    )?
    .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "fare class should be offered"))?;

    ensure(
        SCENARIO,
        vacant.vacant_count == 2 && vacant.seats.len() == 2 && !vacant.contains(seat_id),
        format!("booked seat should leave the vacant snapshot, observed {vacant:?}"),
    )
}

pub async fn test_seat_cannot_be_double_booked<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "seat_cannot_be_double_booked";

    let store = make_store();
    let flight = one_class_flight(3);
    let user = fixtures::user(None);
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;
    let seat_id = flight.seats(economy)[0];

    let _ = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, Some(seat_id)))
            .await,
    )?;

    let losing = booking(&flight, &user, economy, Some(seat_id));
    let losing_passenger = losing.passenger.passenger_id();
    let losing_ticket = losing.ticket_id;

    expect_rejection(
        SCENARIO,
        "create_ticket",
        store.create_ticket(losing).await,
        |error| matches!(error, StoreError::SeatTaken { seat_id: taken, .. } if *taken == seat_id),
    )?;

    let ticket = step(SCENARIO, "get_ticket", store.get_ticket(losing_ticket).await)?;
    let passenger = step(
        SCENARIO,
        "get_passenger",
        store.get_passenger(losing_passenger).await,
    )?;

    ensure(
        SCENARIO,
        ticket.is_none() && passenger.is_none(),
        "rejected booking must not persist its ticket or passenger",
    )
}

pub async fn test_fare_class_capacity_is_enforced<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "fare_class_capacity_is_enforced";

    let store = make_store();
    let flight = one_class_flight(1);
    let user = fixtures::user(None);
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;

    let _ = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
    )?;

    expect_rejection(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
        |error| matches!(error, StoreError::FareClassFull { .. }),
    )?;

    let vacant = step(
        SCENARIO,
        "get_vacant_seats",
        store.get_vacant_seats(flight.flight_id(), economy).await,
    )?;

    ensure(
        SCENARIO,
        vacant.is_some_and(|vacant| vacant.vacant_count == 0 && vacant.seats.len() == 1),
        "seatless booking should use the slot but leave the physical seat vacant",
    )
}

pub async fn test_payment_opens_then_adjusts_ledger<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "payment_opens_then_adjusts_ledger";

    let store = make_store();
    let flight = one_class_flight(5);
    let user = fixtures::user(None);
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;

    let percent = step(
        SCENARIO,
        "get_bonus_accrual_percent",
        store.get_bonus_accrual_percent(user.id).await,
    )?;
    ensure(
        SCENARIO,
        percent.into_inner() == 0,
        format!("user without ledger should accrue nothing, observed {percent}%"),
    )?;

    let first = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
    )?;
    let second = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
    )?;

    let command = payment(
        first,
        &user,
        LedgerUpdate::Open {
            purchases: TICKET_PRICE,
        },
    );
    let _ = step(SCENARIO, "pay_for_ticket", store.pay_for_ticket(command.clone()).await)?;

    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await? == Some(fixtures::balance(TICKET_PRICE, 0)),
        "first payment should open the ledger with the price",
    )?;

    let ticket = read_ticket(SCENARIO, &store, first).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Paid
            && ticket.status_at == command.paid_at
            && ticket.accrued_bonuses == command.accrued_bonuses
            && ticket.paid_with_bonuses == 0,
        format!("paid ticket should carry payment details, observed {ticket:?}"),
    )?;

    let _ = step(
        SCENARIO,
        "pay_for_ticket",
        store
            .pay_for_ticket(payment(
                second,
                &user,
                LedgerUpdate::Adjust(LedgerDelta::purchase(TICKET_PRICE, 0)),
            ))
            .await,
    )?;

    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await?
            == Some(fixtures::balance(2 * TICKET_PRICE, 0)),
        "second payment should add to purchases",
    )?;

    let percent = step(
        SCENARIO,
        "get_bonus_accrual_percent",
        store.get_bonus_accrual_percent(user.id).await,
    )?;
    ensure(
        SCENARIO,
        percent.into_inner() > 0,
        "opened ledger should reach the first accrual tier",
    )
}

pub async fn test_status_change_is_compare_and_set<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "status_change_is_compare_and_set";

    let store = make_store();
    let flight = one_class_flight(2);
    let user = fixtures::user(Some(fixtures::balance(0, 0)));
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;
    let ticket_id = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
    )?;
    let charge = LedgerUpdate::Adjust(LedgerDelta::purchase(TICKET_PRICE, 0));

    let _ = step(
        SCENARIO,
        "pay_for_ticket",
        store.pay_for_ticket(payment(ticket_id, &user, charge)).await,
    )?;

    expect_rejection(
        SCENARIO,
        "pay_for_ticket",
        store.pay_for_ticket(payment(ticket_id, &user, charge)).await,
        |error| {
            matches!(
                error,
                StoreError::StatusConflict {
                    expected: TicketStatus::Created,
                    actual: TicketStatus::Paid,
                    ..
                }
            )
        },
    )?;

    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await? == Some(fixtures::balance(TICKET_PRICE, 0)),
        "rejected second payment must not charge the ledger again",
    )?;

    expect_rejection(
        SCENARIO,
        "pay_for_ticket",
        store
            .pay_for_ticket(payment(TicketId::generate(), &user, charge))
            .await,
        |error| matches!(error, StoreError::TicketNotFound { .. }),
    )
}

pub async fn test_overdrawn_bonuses_roll_back<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "overdrawn_bonuses_roll_back";

    let store = make_store();
    let flight = one_class_flight(2);
    let user = fixtures::user(Some(fixtures::balance(0, 100)));
    let newcomer = fixtures::user(None);
    seed(SCENARIO, &store, &flight, &[&user, &newcomer]).await?;

    let economy = flight.fare_class(0).id;
    let ticket_id = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
    )?;

    expect_rejection(
        SCENARIO,
        "pay_for_ticket",
        store
            .pay_for_ticket(payment(
                ticket_id,
                &user,
                LedgerUpdate::Adjust(LedgerDelta::purchase(TICKET_PRICE, 200)),
            ))
            .await,
        |error| matches!(error, StoreError::InsufficientBonuses { .. }),
    )?;

    let ticket = read_ticket(SCENARIO, &store, ticket_id).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Created,
        "ticket must stay Created when the ledger change is rejected",
    )?;
    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await? == Some(fixtures::balance(0, 100)),
        "rejected payment must not touch the ledger",
    )?;

    let newcomer_ticket = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &newcomer, economy, None))
            .await,
    )?;

    expect_rejection(
        SCENARIO,
        "pay_for_ticket",
        store
            .pay_for_ticket(payment(
                newcomer_ticket,
                &newcomer,
                LedgerUpdate::Adjust(LedgerDelta::purchase(TICKET_PRICE, 0)),
            ))
            .await,
        |error| matches!(error, StoreError::MissingLedger { .. }),
    )?;

    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, newcomer.id).await?.is_none(),
        "adjusting a missing ledger must not create one",
    )
}

pub async fn test_refund_releases_inventory<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "refund_releases_inventory";

    let store = make_store();
    let flight = one_class_flight(1);
    let user = fixtures::user(Some(fixtures::balance(5_000, 400)));
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;
    let seat_id = flight.seats(economy)[0];

    let ticket_id = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, Some(seat_id)))
            .await,
    )?;
    let _ = step(
        SCENARIO,
        "pay_for_ticket",
        store
            .pay_for_ticket(payment(
                ticket_id,
                &user,
                LedgerUpdate::Adjust(LedgerDelta::purchase(TICKET_PRICE, 400)),
            ))
            .await,
    )?;

    let refunded_at = fixtures::reference_time() + TimeDelta::hours(1);
    let _ = step(
        SCENARIO,
        "refund_ticket",
        store
            .refund_ticket(TicketRefund {
                ticket_id,
                user_id: user.id,
                refunded_at,
                ledger: LedgerDelta::refund(TICKET_PRICE),
            })
            .await,
    )?;

    let ticket = read_ticket(SCENARIO, &store, ticket_id).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Refunded && ticket.status_at == refunded_at,
        format!("expected Refunded ticket, observed {ticket:?}"),
    )?;
    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await? == Some(fixtures::balance(5_000, 1_000)),
        "refund should move the price from purchases to bonuses",
    )?;

    let vacant = step(
        SCENARIO,
        "get_vacant_seats",
        store.get_vacant_seats(flight.flight_id(), economy).await,
    )?;
    ensure(
        SCENARIO,
        vacant.is_some_and(|vacant| vacant.vacant_count == 1 && vacant.contains(seat_id)),
        "refunded ticket should release its seat and slot",
    )?;

    let _ = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, Some(seat_id)))
            .await,
    )?;

    Ok(())
}

pub async fn test_registration_assigns_seat_and_credits_bonus<F, S>(
    make_store: F,
) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "registration_assigns_seat_and_credits_bonus";

    let store = make_store();
    let flight = one_class_flight(2);
    let user = fixtures::user(Some(fixtures::balance(0, 0)));
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;
    let seats = flight.seats(economy);
    let charge = LedgerUpdate::Adjust(LedgerDelta::purchase(TICKET_PRICE, 0));

    let seated = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, Some(seats[0])))
            .await,
    )?;
    let seatless = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, None))
            .await,
    )?;
    for ticket_id in [seated, seatless] {
        let _ = step(
            SCENARIO,
            "pay_for_ticket",
            store.pay_for_ticket(payment(ticket_id, &user, charge)).await,
        )?;
    }

    let registration = |ticket_id, seat_id| TicketRegistration {
        ticket_id,
        user_id: user.id,
        registered_at: fixtures::reference_time() + TimeDelta::days(2),
        seat_id,
        ledger: LedgerDelta::credit(30),
    };

    expect_rejection(
        SCENARIO,
        "register_ticket",
        store
            .register_ticket(registration(seatless, Some(seats[0])))
            .await,
        |error| matches!(error, StoreError::SeatTaken { .. }),
    )?;

    let ticket = read_ticket(SCENARIO, &store, seatless).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Paid && ticket.seat.is_none(),
        "registration onto a held seat must change nothing",
    )?;

    let _ = step(
        SCENARIO,
        "register_ticket",
        store
            .register_ticket(registration(seatless, Some(seats[1])))
            .await,
    )?;

    let ticket = read_ticket(SCENARIO, &store, seatless).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Registered
            && ticket.seat.as_ref().map(|seat| seat.id) == Some(seats[1]),
        format!("registration should assign the chosen seat, observed {ticket:?}"),
    )?;
    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await?
            == Some(fixtures::balance(2 * TICKET_PRICE, 30)),
        "registration should credit the accrued bonus",
    )?;

    expect_rejection(
        SCENARIO,
        "register_ticket",
        store.register_ticket(registration(seatless, None)).await,
        |error| {
            matches!(
                error,
                StoreError::StatusConflict {
                    actual: TicketStatus::Registered,
                    ..
                }
            )
        },
    )?;

    ensure(
        SCENARIO,
        read_balance(SCENARIO, &store, user.id).await?
            == Some(fixtures::balance(2 * TICKET_PRICE, 30)),
        "repeated registration must not credit twice",
    )
}

pub async fn test_expired_tickets_are_swept<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "expired_tickets_are_swept";

    let store = make_store();
    let flight = one_class_flight(1);
    let user = fixtures::user(None);
    seed(SCENARIO, &store, &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;
    let seat_id = flight.seats(economy)[0];
    let created_at = fixtures::reference_time();

    let ticket_id = step(
        SCENARIO,
        "create_ticket",
        store
            .create_ticket(booking(&flight, &user, economy, Some(seat_id)))
            .await,
    )?;

    let on_boundary = TicketSweep {
        created_before: created_at,
        canceled_at: created_at + TimeDelta::minutes(15),
    };
    let untouched = step(
        SCENARIO,
        "cancel_expired_tickets",
        store.cancel_expired_tickets(on_boundary).await,
    )?;
    ensure(
        SCENARIO,
        !untouched.contains(&ticket_id),
        "a ticket created exactly at the cutoff is still payable",
    )?;

    let canceled_at = created_at + TimeDelta::minutes(16);
    let canceled = step(
        SCENARIO,
        "cancel_expired_tickets",
        store
            .cancel_expired_tickets(TicketSweep {
                created_before: created_at + TimeDelta::minutes(1),
                canceled_at,
            })
            .await,
    )?;
    ensure(
        SCENARIO,
        canceled.contains(&ticket_id),
        "lapsed ticket should be canceled by the sweep",
    )?;

    let ticket = read_ticket(SCENARIO, &store, ticket_id).await?;
    ensure(
        SCENARIO,
        ticket.status == TicketStatus::Canceled && ticket.status_at == canceled_at,
        format!("expected Canceled ticket, observed {ticket:?}"),
    )?;

    let vacant = step(
        SCENARIO,
        "get_vacant_seats",
        store.get_vacant_seats(flight.flight_id(), economy).await,
    )?;
    ensure(
        SCENARIO,
        vacant.is_some_and(|vacant| vacant.vacant_count == 1 && vacant.contains(seat_id)),
        "canceled ticket should release its seat and slot",
    )?;

    expect_rejection(
        SCENARIO,
        "pay_for_ticket",
        store
            .pay_for_ticket(payment(
                ticket_id,
                &user,
                LedgerUpdate::Open {
                    purchases: TICKET_PRICE,
                },
            ))
            .await,
        |error| {
            matches!(
                error,
                StoreError::StatusConflict {
                    actual: TicketStatus::Canceled,
                    ..
                }
            )
        },
    )
}

pub async fn test_concurrent_seat_claims_have_one_winner<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: TicketStore + CatalogImport + 'static,
{
    const SCENARIO: &str = "concurrent_seat_claims_have_one_winner";
    const CONTENDERS: u32 = 8;

    let store = Arc::new(make_store());
    let flight = one_class_flight(CONTENDERS);
    let user = fixtures::user(None);
    seed(SCENARIO, store.as_ref(), &flight, &[&user]).await?;

    let economy = flight.fare_class(0).id;
    let seat_id = flight.seats(economy)[0];

    let claims = (0..CONTENDERS).map(|_| {
        let store = Arc::clone(&store);
        let command = booking(&flight, &user, economy, Some(seat_id));
        tokio::spawn(async move { store.create_ticket(command).await })
    });

    let mut winners = 0;
    for outcome in join_all(claims).await {
        match outcome {
            Ok(Ok(_)) => winners += 1,
            Ok(Err(StoreError::SeatTaken { .. })) => {}
            Ok(Err(error)) => {
                return Err(ContractTestFailure::store_error(
                    SCENARIO,
                    "create_ticket",
                    error,
                ))
            }
            Err(join_error) => {
                return Err(ContractTestFailure::assertion(
                    SCENARIO,
                    format!("claim task panicked: {join_error}"),
                ))
            }
        }
    }

    ensure(
        SCENARIO,
        winners == 1,
        format!("exactly one claim should win the seat, observed {winners}"),
    )
}

/// Generate one test per contract scenario for a backend.
///
/// Attributes written before `suite` are applied to every generated test,
/// e.g. `#[ignore = "requires a docker daemon"]`.
#[macro_export]
macro_rules! ticket_store_contract_tests {
    ($(#[$meta:meta])* suite = $suite:ident, make_store = $make_store:expr $(,)?) => {
        #[allow(non_snake_case)]
        mod $suite {
            use $crate::contract::{
                test_concurrent_seat_claims_have_one_winner, test_create_and_read_ticket,
                test_expired_tickets_are_swept, test_fare_class_capacity_is_enforced,
                test_overdrawn_bonuses_roll_back, test_payment_opens_then_adjusts_ledger,
                test_refund_releases_inventory, test_registration_assigns_seat_and_credits_bonus,
                test_seat_cannot_be_double_booked, test_status_change_is_compare_and_set,
            };

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn create_and_read_ticket_contract() {
                test_create_and_read_ticket($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn seat_cannot_be_double_booked_contract() {
                test_seat_cannot_be_double_booked($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn fare_class_capacity_is_enforced_contract() {
                test_fare_class_capacity_is_enforced($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn payment_opens_then_adjusts_ledger_contract() {
                test_payment_opens_then_adjusts_ledger($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn status_change_is_compare_and_set_contract() {
                test_status_change_is_compare_and_set($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn overdrawn_bonuses_roll_back_contract() {
                test_overdrawn_bonuses_roll_back($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn refund_releases_inventory_contract() {
                test_refund_releases_inventory($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn registration_assigns_seat_and_credits_bonus_contract() {
                test_registration_assigns_seat_and_credits_bonus($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn expired_tickets_are_swept_contract() {
                test_expired_tickets_are_swept($make_store)
                    .await
                    .expect("ticket store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[$meta])*
            async fn concurrent_seat_claims_have_one_winner_contract() {
                test_concurrent_seat_claims_have_one_winner($make_store)
                    .await
                    .expect("ticket store contract failed");
            }
        }
    };
}

pub use ticket_store_contract_tests;
