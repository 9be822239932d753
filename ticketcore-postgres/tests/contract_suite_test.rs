mod common;

mod postgres_contract_suite {
    use ticketcore_testing::contract::ticket_store_contract_tests;

    ticket_store_contract_tests! {
        #[ignore = "requires a docker daemon"]
        suite = postgres_contract,
        make_store = || {
            crate::common::make_store()
        },
    }
}
