//! Racing requests through the service against one shared store.

mod common;

use chrono::TimeDelta;
use common::{booking_time, payment, World, ECONOMY_PRICE};
use futures::future::join_all;
use tokio::task::JoinError;
use ticketcore::{TicketError, TicketId};
use ticketcore_testing::fixtures;

const RACERS: usize = 8;

type RaceOutcome = Result<Result<TicketId, TicketError>, JoinError>;

fn tally(outcomes: Vec<RaceOutcome>) -> (usize, Vec<&'static str>) {
    let mut winners = 0;
    let mut codes = Vec::new();
    for outcome in outcomes {
        match outcome.expect("racer should not panic") {
            Ok(_) => winners += 1,
            Err(error) => codes.push(error.code()),
        }
    }
    (winners, codes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_seat_have_one_winner() {
    // Given: many users racing for the same seat
    let users: Vec<_> = (0..RACERS).map(|_| fixtures::user(None)).collect();
    let world = World::new(&users.iter().collect::<Vec<_>>()).await;
    let seat_id = world.flight.seats(world.economy())[0];

    // When: every booking is submitted at once
    let racers = users.iter().map(|user| {
        let service = world.service.clone();
        let mut request = world.booking(user);
        request.seat_id = Some(seat_id);
        tokio::spawn(async move { service.create_ticket(request, booking_time()).await })
    });
    let (winners, codes) = tally(join_all(racers).await);

    // Then: exactly one holds the seat and the rest lost on the seat rule
    assert_eq!(winners, 1);
    assert!(codes.iter().all(|code| *code == "SEAT_DOESNT_VACANT"));
    assert_eq!(world.vacant_economy().await, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_never_oversell_a_fare_class() {
    // Given: more seatless bookings than the three economy slots
    let user = fixtures::user(None);
    let world = World::new(&[&user]).await;

    // When: they all race
    let racers = (0..RACERS).map(|_| {
        let service = world.service.clone();
        let request = world.booking(&user);
        tokio::spawn(async move { service.create_ticket(request, booking_time()).await })
    });
    let (winners, codes) = tally(join_all(racers).await);

    // Then: capacity holds
    assert_eq!(winners, 3);
    assert!(codes.iter().all(|code| *code == "NO_VACANT_SEAT"));
    assert_eq!(world.vacant_economy().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_payments_charge_the_ledger_once() {
    // Given: one unpaid ticket
    let user = fixtures::user(Some(fixtures::balance(0, 0)));
    let world = World::new(&[&user]).await;
    let ticket_id = world.book(&user).await;

    // When: the same payment is submitted many times at once
    let racers = (0..RACERS).map(|_| {
        let service = world.service.clone();
        let request = payment(ticket_id, &user, 0);
        tokio::spawn(async move {
            service
                .pay_for_ticket(request, booking_time() + TimeDelta::minutes(1))
                .await
        })
    });
    let (winners, codes) = tally(join_all(racers).await);

    // Then: one transition wins and purchases grow by one price
    assert_eq!(winners, 1);
    assert!(codes.iter().all(|code| *code == "INVALID_STATUS_TICKET"));
    assert_eq!(
        world.balance(&user).await,
        Some(fixtures::balance(ECONOMY_PRICE, 0))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bonus_payments_never_overdraw() {
    // Given: 500 bonuses and two tickets each wanting to spend 400
    let user = fixtures::user(Some(fixtures::balance(0, 500)));
    let world = World::new(&[&user]).await;
    let first = world.book(&user).await;
    let second = world.book(&user).await;

    // When: both payments race
    let racers = [first, second].into_iter().map(|ticket_id| {
        let service = world.service.clone();
        let request = payment(ticket_id, &user, 400);
        tokio::spawn(async move { service.pay_for_ticket(request, booking_time()).await })
    });
    let (winners, codes) = tally(join_all(racers).await);

    // Then: only one spend fits and the balance never goes negative
    assert_eq!(winners, 1);
    assert_eq!(codes, vec!["INVALID_SUM_BONUSES"]);
    assert_eq!(
        world.balance(&user).await,
        Some(fixtures::balance(ECONOMY_PRICE, 100))
    );
}
