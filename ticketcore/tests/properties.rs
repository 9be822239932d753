//! Property-based checks of inventory and ledger invariants.

mod common;

use chrono::TimeDelta;
use common::{booking_time, payment, World, ECONOMY_PRICE};
use proptest::prelude::*;
use ticketcore::RefundTicket;
use ticketcore_testing::fixtures;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sold_tickets_never_exceed_fare_class_capacity(attempts in 1usize..10) {
        let sold = runtime().block_on(async {
            let user = fixtures::user(None);
            let world = World::new(&[&user]).await;

            let mut sold = 0usize;
            for _ in 0..attempts {
                if world
                    .service
                    .create_ticket(world.booking(&user), booking_time())
                    .await
                    .is_ok()
                {
                    sold += 1;
                }
            }
            sold
        });

        prop_assert_eq!(sold, attempts.min(3));
    }

    #[test]
    fn pay_then_refund_returns_price_as_bonuses(
        purchases in 0i64..400_000,
        bonuses in 0i64..2_000,
        spent_share in 0i64..=100,
    ) {
        let spent = (bonuses.min(ECONOMY_PRICE / 2) * spent_share) / 100;

        let (after_pay, after_refund) = runtime().block_on(async {
            let user = fixtures::user(Some(fixtures::balance(purchases, bonuses)));
            let world = World::new(&[&user]).await;
            let ticket_id = world.book(&user).await;

            let _ = world
                .service
                .pay_for_ticket(payment(ticket_id, &user, spent), booking_time())
                .await
                .expect("payment should succeed");
            let after_pay = world.balance(&user).await;

            let _ = world
                .service
                .refund_ticket(
                    RefundTicket { ticket_id, user_id: user.id },
                    booking_time() + TimeDelta::hours(1),
                )
                .await
                .expect("refund should succeed");
            (after_pay, world.balance(&user).await)
        });

        prop_assert_eq!(
            after_pay,
            Some(fixtures::balance(purchases + ECONOMY_PRICE, bonuses - spent))
        );
        prop_assert_eq!(
            after_refund,
            Some(fixtures::balance(purchases, bonuses - spent + ECONOMY_PRICE))
        );
    }
}
