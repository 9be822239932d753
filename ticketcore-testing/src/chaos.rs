use async_trait::async_trait;
use nutype::nutype;
use parking_lot::Mutex;
use rand::{random, rngs::StdRng, Rng, SeedableRng};

use ticketcore_types::{
    AccrualPercent, CatalogImport, FareClassId, Flight, FlightCatalog, FlightId, FlightRecord,
    NewTicket, Operation, Passenger, PassengerDirectory, PassengerId, StoreError, Ticket,
    TicketId, TicketPayment, TicketRefund, TicketRegistration, TicketRepository, TicketSweep,
    User, UserDirectory, UserId, VacantSeats,
};

/// Probability value for failure injection rates.
///
/// Probability represents a value in the range [0.0, 1.0] where 0.0 means
/// never inject failures and 1.0 means always inject failures.
///
/// ```ignore
/// use ticketcore_testing::chaos::Probability;
///
/// assert!(Probability::try_new(0.5).is_ok());
/// assert!(Probability::try_new(1.5).is_err());
/// ```
#[nutype(
    validate(greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into)
)]
pub struct Probability(f32);

fn clamped(probability: f32) -> Probability {
    Probability::try_new(probability.clamp(0.0, 1.0)).expect("clamped value is always valid")
}

#[derive(Debug, Clone)]
pub struct ChaosConfig {
    deterministic_seed: Option<u64>,
    read_failure_probability: Probability,
    write_failure_probability: Probability,
}

impl ChaosConfig {
    pub fn deterministic() -> Self {
        Self {
            deterministic_seed: Some(0),
            ..Self::default()
        }
    }

    /// Fail reads and writes alike.
    #[must_use]
    pub fn with_failure_probability(self, probability: f32) -> Self {
        self.with_read_failure_probability(probability)
            .with_write_failure_probability(probability)
    }

    #[must_use]
    pub fn with_read_failure_probability(mut self, probability: f32) -> Self {
        self.read_failure_probability = clamped(probability);
        self
    }

    /// Fail commands and imports before they reach the wrapped store.
    #[must_use]
    pub fn with_write_failure_probability(mut self, probability: f32) -> Self {
        self.write_failure_probability = clamped(probability);
        self
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            read_failure_probability: clamped(0.0),
            write_failure_probability: clamped(0.0),
        }
    }
}

pub trait ChaosTicketStoreExt: Sized {
    fn with_chaos(self, config: ChaosConfig) -> ChaosTicketStore<Self>;
}

/// Wraps a backend and fails a configurable share of its calls with
/// [`StoreError::StoreFailure`] before delegating.
pub struct ChaosTicketStore<S> {
    store: S,
    config: ChaosConfig,
    rng: Mutex<StdRng>,
}

impl<S> ChaosTicketStore<S> {
    pub fn new(store: S, config: ChaosConfig) -> Self {
        let rng = match config.deterministic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(random()),
        };

        Self {
            store,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub const fn inner(&self) -> &S {
        &self.store
    }

    fn should_inject(&self, probability: Probability) -> bool {
        let probability: f32 = probability.into();

        if probability <= 0.0 {
            return false;
        }

        if probability >= 1.0 {
            return true;
        }

        self.rng.lock().random_bool(f64::from(probability))
    }

    fn read(&self, operation: Operation) -> Result<(), StoreError> {
        if self.should_inject(self.config.read_failure_probability) {
            return Err(StoreError::StoreFailure { operation });
        }
        Ok(())
    }

    fn write(&self, operation: Operation) -> Result<(), StoreError> {
        if self.should_inject(self.config.write_failure_probability) {
            return Err(StoreError::StoreFailure { operation });
        }
        Ok(())
    }
}

#[async_trait]
impl<S> FlightCatalog for ChaosTicketStore<S>
where
    S: FlightCatalog,
{
    async fn get_flight(&self, flight_id: FlightId) -> Result<Option<Flight>, StoreError> {
        self.read(Operation::GetFlight)?;
        self.store.get_flight(flight_id).await
    }

    async fn get_vacant_seats(
        &self,
        flight_id: FlightId,
        fare_class_id: FareClassId,
    ) -> Result<Option<VacantSeats>, StoreError> {
        self.read(Operation::GetVacantSeats)?;
        self.store.get_vacant_seats(flight_id, fare_class_id).await
    }
}

#[async_trait]
impl<S> UserDirectory for ChaosTicketStore<S>
where
    S: UserDirectory,
{
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.read(Operation::GetUser)?;
        self.store.get_user(user_id).await
    }

    async fn get_bonus_accrual_percent(
        &self,
        user_id: UserId,
    ) -> Result<AccrualPercent, StoreError> {
        self.read(Operation::GetBonusAccrualPercent)?;
        self.store.get_bonus_accrual_percent(user_id).await
    }
}

#[async_trait]
impl<S> PassengerDirectory for ChaosTicketStore<S>
where
    S: PassengerDirectory,
{
    async fn get_passenger(
        &self,
        passenger_id: PassengerId,
    ) -> Result<Option<Passenger>, StoreError> {
        self.read(Operation::GetPassenger)?;
        self.store.get_passenger(passenger_id).await
    }
}

#[async_trait]
impl<S> TicketRepository for ChaosTicketStore<S>
where
    S: TicketRepository,
{
    async fn get_ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError> {
        self.read(Operation::GetTicket)?;
        self.store.get_ticket(ticket_id).await
    }

    async fn create_ticket(&self, command: NewTicket) -> Result<TicketId, StoreError> {
        self.write(Operation::CreateTicket)?;
        self.store.create_ticket(command).await
    }

    async fn pay_for_ticket(&self, command: TicketPayment) -> Result<TicketId, StoreError> {
        self.write(Operation::PayForTicket)?;
        self.store.pay_for_ticket(command).await
    }

    async fn refund_ticket(&self, command: TicketRefund) -> Result<TicketId, StoreError> {
        self.write(Operation::RefundTicket)?;
        self.store.refund_ticket(command).await
    }

    async fn register_ticket(&self, command: TicketRegistration) -> Result<TicketId, StoreError> {
        self.write(Operation::RegisterTicket)?;
        self.store.register_ticket(command).await
    }

    async fn cancel_expired_tickets(&self, sweep: TicketSweep) -> Result<Vec<TicketId>, StoreError> {
        self.write(Operation::CancelExpiredTickets)?;
        self.store.cancel_expired_tickets(sweep).await
    }
}

#[async_trait]
impl<S> CatalogImport for ChaosTicketStore<S>
where
    S: CatalogImport,
{
    async fn import_flight(&self, record: FlightRecord) -> Result<(), StoreError> {
        self.write(Operation::ImportFlight)?;
        self.store.import_flight(record).await
    }

    async fn import_user(&self, user: User) -> Result<(), StoreError> {
        self.write(Operation::ImportUser)?;
        self.store.import_user(user).await
    }
}

impl<S> ChaosTicketStoreExt for S
where
    S: Send + Sync,
{
    fn with_chaos(self, config: ChaosConfig) -> ChaosTicketStore<Self> {
        ChaosTicketStore::new(self, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use ticketcore_memory::InMemoryTicketStore;

    #[test]
    fn deterministic_config_sets_seed() {
        let default_is_none = ChaosConfig::default().deterministic_seed.is_none();
        let deterministic_is_some = ChaosConfig::deterministic().deterministic_seed.is_some();

        assert!(default_is_none && deterministic_is_some);
    }

    #[test]
    fn probabilities_outside_unit_range_are_clamped() {
        let config = ChaosConfig::default()
            .with_read_failure_probability(-3.0)
            .with_write_failure_probability(7.5);

        assert_eq!(f32::from(config.read_failure_probability), 0.0);
        assert_eq!(f32::from(config.write_failure_probability), 1.0);
    }

    #[tokio::test]
    async fn zero_probability_passthrough_allows_normal_operations() {
        let store = InMemoryTicketStore::new().with_chaos(ChaosConfig::default());
        let user = fixtures::user(None);

        let import = store.import_user(user.clone()).await;
        let read = store.get_user(user.id).await;

        assert!(import.is_ok() && read.is_ok_and(|found| found.is_some()));
    }

    #[tokio::test]
    async fn certain_write_failure_leaves_reads_untouched() {
        let store = InMemoryTicketStore::new()
            .with_chaos(ChaosConfig::deterministic().with_write_failure_probability(1.0));
        let user = fixtures::user(None);

        let import = store.import_user(user.clone()).await;
        let read = store.get_user(user.id).await;

        assert_eq!(
            import,
            Err(StoreError::StoreFailure {
                operation: Operation::ImportUser
            })
        );
        assert_eq!(read, Ok(None));
    }
}
