//! PostgreSQL backend for the `TicketCore` ticket lifecycle engine.
//!
//! Inventory and ledger consistency is enforced inside the database: row
//! locks order concurrent claims, a partial unique index keeps one live
//! ticket per seat and a check constraint keeps bonuses non-negative.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use nutype::nutype;
use sqlx::postgres::PgPoolOptions;
use sqlx::{query, Pool, Postgres, Transaction};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use ticketcore_types::{
    AccrualPercent, CatalogImport, Fare, FareClassId, Flight, FlightCatalog, FlightId,
    FlightRecord, LedgerDelta, LedgerUpdate, NewTicket, Operation, Passenger, PassengerAssignment,
    PassengerDirectory, PassengerId, Seat, SeatId, StoreError, Ticket, TicketId, TicketPayment,
    TicketRefund, TicketRegistration, TicketRepository, TicketStatus, TicketSweep, User,
    UserBalance, UserDirectory, UserId, VacantSeats,
};

mod rows;

use rows::{column, corrupt, decode_fare, decode_passenger, decode_seat, decode_status, to_i32};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

// Live tickets are filtered with the literal `status_id NOT IN (3, 4)` so the
// planner can match the partial index predicates of the migration. The codes
// are the statuses for which `TicketStatus::holds_inventory` is false.

/// Failures while setting up the store, before any ticket operation runs.
#[derive(Debug, Error)]
pub enum PostgresTicketStoreError {
    /// The pool could not connect.
    #[error("failed to create postgres connection pool")]
    ConnectionFailed(#[source] sqlx::Error),
    /// The health check query failed.
    #[error("postgres ping failed")]
    PingFailed(#[source] sqlx::Error),
    /// A bundled migration could not be applied.
    #[error("postgres migration failed")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// Maximum number of database connections in the pool.
///
/// Must be at least 1, enforced by using `NonZeroU32` as the underlying type.
///
/// ```ignore
/// use std::num::NonZeroU32;
/// use ticketcore_postgres::MaxConnections;
///
/// let pool_size = MaxConnections::new(NonZeroU32::new(20).expect("20 is non-zero"));
/// ```
#[nutype(derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRef, Into))]
pub struct MaxConnections(NonZeroU32);

/// Configuration for the `PostgresTicketStore` connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: MaxConnections,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        const DEFAULT_MAX_CONNECTIONS: NonZeroU32 = match NonZeroU32::new(10) {
            Some(v) => v,
            None => unreachable!(),
        };

        Self {
            max_connections: MaxConnections::new(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Ticket store backed by PostgreSQL.
///
/// Every write runs in one transaction. Creation and seat assignment lock
/// the fare-class row of the flight, so concurrent claims on the same class
/// serialize and re-count inventory after the lock is granted. Status
/// transitions lock the ticket row and compare its status before writing.
#[derive(Debug, Clone)]
pub struct PostgresTicketStore {
    pool: Pool<Postgres>,
}

impl PostgresTicketStore {
    /// Create a new store with default pool configuration.
    pub async fn new<S: Into<String>>(
        connection_string: S,
    ) -> Result<Self, PostgresTicketStoreError> {
        Self::with_config(connection_string, PostgresConfig::default()).await
    }

    /// Connect with explicit pool sizing and timeouts.
    pub async fn with_config<S: Into<String>>(
        connection_string: S,
        config: PostgresConfig,
    ) -> Result<Self, PostgresTicketStoreError> {
        let connection_string = connection_string.into();
        let max_connections: NonZeroU32 = config.max_connections.into();
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.get())
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&connection_string)
            .await
            .map_err(PostgresTicketStoreError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    /// Create a store from an existing connection pool.
    ///
    /// Use this to share a pool with other components of the host service.
    pub const fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Round-trip a trivial query to check connectivity.
    pub async fn ping(&self) -> Result<(), PostgresTicketStoreError> {
        let _ = query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PostgresTicketStoreError::PingFailed)?;
        Ok(())
    }

    /// Apply the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), PostgresTicketStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresTicketStoreError::MigrationFailed)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))
    }

    async fn load_flight(
        &self,
        flight_id: FlightId,
        operation: Operation,
    ) -> Result<Option<Flight>, StoreError> {
        let Some(row) = query(
            "SELECT name, departure, baggage_price, seat_selection_price FROM flights WHERE id = $1",
        )
        .bind(flight_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        else {
            return Ok(None);
        };

        let fares = query(
            "SELECT fc.id, fc.name, ff.seat_count, ff.price
             FROM flight_fares ff
                 INNER JOIN fare_classes fc ON fc.id = ff.fare_class_id
             WHERE ff.flight_id = $1
             ORDER BY ff.position",
        )
        .bind(flight_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        .iter()
        .map(|row| decode_fare(row, operation))
        .collect::<Result<Vec<Fare>, StoreError>>()?;

        Ok(Some(Flight {
            id: flight_id,
            name: column(&row, "name", operation)?,
            departure: column(&row, "departure", operation)?,
            fares,
            baggage_price: column(&row, "baggage_price", operation)?,
            seat_selection_price: column(&row, "seat_selection_price", operation)?,
        }))
    }

    async fn load_passenger(
        &self,
        passenger_id: PassengerId,
        operation: Operation,
    ) -> Result<Option<Passenger>, StoreError> {
        query("SELECT id, user_id, name, identity_document FROM passengers WHERE id = $1")
            .bind(passenger_id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?
            .map(|row| decode_passenger(&row, operation))
            .transpose()
    }
}

#[async_trait]
impl FlightCatalog for PostgresTicketStore {
    #[instrument(name = "postgres.get_flight", skip(self))]
    async fn get_flight(&self, flight_id: FlightId) -> Result<Option<Flight>, StoreError> {
        self.load_flight(flight_id, Operation::GetFlight).await
    }

    #[instrument(name = "postgres.get_vacant_seats", skip(self))]
    async fn get_vacant_seats(
        &self,
        flight_id: FlightId,
        fare_class_id: FareClassId,
    ) -> Result<Option<VacantSeats>, StoreError> {
        let operation = Operation::GetVacantSeats;

        let Some(row) = query(
            "SELECT fc.name, ff.seat_count,
                    (SELECT COUNT(*) FROM tickets t
                     WHERE t.flight_id = ff.flight_id
                       AND t.fare_class_id = ff.fare_class_id
                       AND t.status_id NOT IN (3, 4)) AS occupied
             FROM flight_fares ff
                 INNER JOIN fare_classes fc ON fc.id = ff.fare_class_id
             WHERE ff.flight_id = $1 AND ff.fare_class_id = $2",
        )
        .bind(flight_id.into_inner())
        .bind(fare_class_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        else {
            return Ok(None);
        };

        let seat_count: i32 = column(&row, "seat_count", operation)?;
        let occupied: i64 = column(&row, "occupied", operation)?;
        let vacant_count = u32::try_from(i64::from(seat_count).saturating_sub(occupied).max(0))
            .map_err(|_| corrupt("fare class", "vacant count out of range"))?;

        let seats = query(
            "SELECT s.id, s.fare_class_id, s.number
             FROM seats s
             WHERE s.flight_id = $1 AND s.fare_class_id = $2
               AND NOT EXISTS (
                   SELECT 1 FROM tickets t
                   WHERE t.flight_id = s.flight_id
                     AND t.seat_id = s.id
                     AND t.status_id NOT IN (3, 4))
             ORDER BY s.number",
        )
        .bind(flight_id.into_inner())
        .bind(fare_class_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        .iter()
        .map(|row| decode_seat(row, operation))
        .collect::<Result<Vec<Seat>, StoreError>>()?;

        Ok(Some(VacantSeats {
            fare_class_id,
            fare_class_name: column(&row, "name", operation)?,
            vacant_count,
            seats,
        }))
    }
}

#[async_trait]
impl UserDirectory for PostgresTicketStore {
    #[instrument(name = "postgres.get_user", skip(self))]
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let operation = Operation::GetUser;

        let Some(row) = query(
            "SELECT u.name, u.email, b.purchases, b.bonuses
             FROM users u
                 LEFT JOIN users_balance b ON b.user_id = u.id
             WHERE u.id = $1",
        )
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        else {
            return Ok(None);
        };

        let purchases: Option<i64> = column(&row, "purchases", operation)?;
        let bonuses: Option<i64> = column(&row, "bonuses", operation)?;

        Ok(Some(User {
            id: user_id,
            name: column(&row, "name", operation)?,
            email: column(&row, "email", operation)?,
            balance: purchases
                .zip(bonuses)
                .map(|(purchases, bonuses)| UserBalance { purchases, bonuses }),
        }))
    }

    #[instrument(name = "postgres.get_bonus_accrual_percent", skip(self))]
    async fn get_bonus_accrual_percent(
        &self,
        user_id: UserId,
    ) -> Result<AccrualPercent, StoreError> {
        let operation = Operation::GetBonusAccrualPercent;

        let Some(row) = query(
            "SELECT t.percent
             FROM users_balance b
                 INNER JOIN bonus_tiers t ON t.min_purchases <= b.purchases
             WHERE b.user_id = $1
             ORDER BY t.min_purchases DESC
             LIMIT 1",
        )
        .bind(user_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        else {
            return Ok(AccrualPercent::default());
        };

        let percent: i16 = column(&row, "percent", operation)?;
        u8::try_from(percent)
            .ok()
            .and_then(|percent| AccrualPercent::try_new(percent).ok())
            .ok_or_else(|| corrupt("bonus tier", format!("percent {percent} out of range")))
    }
}

#[async_trait]
impl PassengerDirectory for PostgresTicketStore {
    #[instrument(name = "postgres.get_passenger", skip(self))]
    async fn get_passenger(
        &self,
        passenger_id: PassengerId,
    ) -> Result<Option<Passenger>, StoreError> {
        self.load_passenger(passenger_id, Operation::GetPassenger)
            .await
    }
}

// Ticket columns a transition needs after locking the row.
struct LockedTicket {
    flight_id: FlightId,
    fare_class_id: FareClassId,
    seat_id: Option<SeatId>,
}

async fn lock_ticket(
    tx: &mut Transaction<'static, Postgres>,
    ticket_id: TicketId,
    expected: TicketStatus,
    operation: Operation,
) -> Result<LockedTicket, StoreError> {
    let row = query(
        "SELECT status_id, flight_id, fare_class_id, seat_id FROM tickets WHERE id = $1 FOR UPDATE",
    )
    .bind(ticket_id.into_inner())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|error| map_sqlx_error(error, operation))?
    .ok_or(StoreError::TicketNotFound { ticket_id })?;

    let actual = decode_status(&row, operation)?;
    if actual != expected {
        warn!(
            ticket_id = %ticket_id,
            expected = %expected,
            actual = %actual,
            "[postgres.status_conflict] ticket left the expected status"
        );
        return Err(StoreError::StatusConflict {
            ticket_id,
            expected,
            actual,
        });
    }

    Ok(LockedTicket {
        flight_id: FlightId::new(column(&row, "flight_id", operation)?),
        fare_class_id: FareClassId::new(column(&row, "fare_class_id", operation)?),
        seat_id: column::<Option<uuid::Uuid>>(&row, "seat_id", operation)?.map(SeatId::new),
    })
}

// Serializes every inventory change of one fare class on one flight.
async fn lock_fare_class(
    tx: &mut Transaction<'static, Postgres>,
    flight_id: FlightId,
    fare_class_id: FareClassId,
    operation: Operation,
) -> Result<u32, StoreError> {
    let row = query(
        "SELECT seat_count FROM flight_fares WHERE flight_id = $1 AND fare_class_id = $2 FOR UPDATE",
    )
    .bind(flight_id.into_inner())
    .bind(fare_class_id.into_inner())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|error| map_sqlx_error(error, operation))?
    .ok_or(StoreError::MissingReference {
        entity: "fare class",
    })?;

    let seat_count: i32 = column(&row, "seat_count", operation)?;
    u32::try_from(seat_count).map_err(|_| corrupt("fare class", "negative seat count"))
}

async fn ensure_seat_free(
    tx: &mut Transaction<'static, Postgres>,
    flight_id: FlightId,
    fare_class_id: FareClassId,
    seat_id: SeatId,
    operation: Operation,
) -> Result<(), StoreError> {
    let known = query("SELECT 1 FROM seats WHERE id = $1 AND flight_id = $2 AND fare_class_id = $3")
        .bind(seat_id.into_inner())
        .bind(flight_id.into_inner())
        .bind(fare_class_id.into_inner())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        .is_some();
    if !known {
        return Err(StoreError::MissingReference { entity: "seat" });
    }

    let held = query(
        "SELECT 1 FROM tickets WHERE flight_id = $1 AND seat_id = $2 AND status_id NOT IN (3, 4)",
    )
    .bind(flight_id.into_inner())
    .bind(seat_id.into_inner())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|error| map_sqlx_error(error, operation))?
    .is_some();
    if held {
        warn!(
            flight_id = %flight_id,
            seat_id = %seat_id,
            "[postgres.seat_taken] seat already held by a live ticket"
        );
        return Err(StoreError::SeatTaken { flight_id, seat_id });
    }

    Ok(())
}

async fn adjust_ledger(
    tx: &mut Transaction<'static, Postgres>,
    user_id: UserId,
    delta: LedgerDelta,
    operation: Operation,
) -> Result<(), StoreError> {
    let updated = query(
        "UPDATE users_balance
         SET purchases = purchases + $2, bonuses = bonuses + $3
         WHERE user_id = $1",
    )
    .bind(user_id.into_inner())
    .bind(delta.purchases)
    .bind(delta.bonuses)
    .execute(&mut **tx)
    .await
    .map_err(|error| {
        if has_code(&error, CHECK_VIOLATION) {
            warn!(
                user_id = %user_id,
                "[postgres.insufficient_bonuses] ledger change would overdraw bonuses"
            );
            return StoreError::InsufficientBonuses { user_id };
        }
        map_sqlx_error(error, operation)
    })?
    .rows_affected();

    if updated == 0 {
        return Err(StoreError::MissingLedger { user_id });
    }
    Ok(())
}

async fn open_ledger(
    tx: &mut Transaction<'static, Postgres>,
    user_id: UserId,
    purchases: i64,
    operation: Operation,
) -> Result<(), StoreError> {
    let _ = query(
        "INSERT INTO users_balance (user_id, purchases, bonuses)
         VALUES ($1, $2, 0)
         ON CONFLICT (user_id) DO UPDATE SET purchases = users_balance.purchases + EXCLUDED.purchases",
    )
    .bind(user_id.into_inner())
    .bind(purchases)
    .execute(&mut **tx)
    .await
    .map_err(|error| {
        if has_code(&error, FOREIGN_KEY_VIOLATION) {
            return StoreError::MissingReference { entity: "user" };
        }
        map_sqlx_error(error, operation)
    })?;
    Ok(())
}

// Locks the fare class, then checks references and remaining capacity.
async fn ensure_bookable(
    tx: &mut Transaction<'static, Postgres>,
    command: &NewTicket,
    operation: Operation,
) -> Result<(), StoreError> {
    let seat_count =
        lock_fare_class(tx, command.flight_id, command.fare_class_id, operation).await?;

    let user_known = query("SELECT 1 FROM users WHERE id = $1")
        .bind(command.user_id.into_inner())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        .is_some();
    if !user_known {
        return Err(StoreError::MissingReference { entity: "user" });
    }

    if let PassengerAssignment::Existing(passenger_id) = &command.passenger {
        let passenger_known = query("SELECT 1 FROM passengers WHERE id = $1")
            .bind(passenger_id.into_inner())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?
            .is_some();
        if !passenger_known {
            return Err(StoreError::MissingReference { entity: "passenger" });
        }
    }

    let occupied: i64 = column(
        &query(
            "SELECT COUNT(*) AS occupied FROM tickets
             WHERE flight_id = $1 AND fare_class_id = $2 AND status_id NOT IN (3, 4)",
        )
        .bind(command.flight_id.into_inner())
        .bind(command.fare_class_id.into_inner())
        .fetch_one(&mut **tx)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?,
        "occupied",
        operation,
    )?;
    if occupied >= i64::from(seat_count) {
        warn!(
            flight_id = %command.flight_id,
            fare_class_id = %command.fare_class_id,
            "[postgres.fare_class_full] no capacity left at commit"
        );
        return Err(StoreError::FareClassFull {
            flight_id: command.flight_id,
            fare_class_id: command.fare_class_id,
        });
    }

    Ok(())
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))
}

#[async_trait]
impl TicketRepository for PostgresTicketStore {
    #[instrument(name = "postgres.get_ticket", skip(self))]
    async fn get_ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError> {
        let operation = Operation::GetTicket;

        let Some(row) = query(
            "SELECT status_id, status_at, flight_id, user_id, passenger_id, fare_class_id, seat_id,
                    baggage_count, price, paid_with_bonuses, accrued_bonuses
             FROM tickets WHERE id = $1",
        )
        .bind(ticket_id.into_inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        else {
            return Ok(None);
        };

        let broken = |detail: &str| corrupt("ticket", format!("ticket {ticket_id}: {detail}"));

        let flight = self
            .load_flight(FlightId::new(column(&row, "flight_id", operation)?), operation)
            .await?
            .ok_or_else(|| broken("unknown flight"))?;
        let fare_class_id = FareClassId::new(column(&row, "fare_class_id", operation)?);
        let fare_class = flight
            .fare(fare_class_id)
            .map(|fare| fare.fare_class.clone())
            .ok_or_else(|| broken("unknown fare class"))?;
        let passenger = self
            .load_passenger(PassengerId::new(column(&row, "passenger_id", operation)?), operation)
            .await?
            .ok_or_else(|| broken("unknown passenger"))?;

        let seat = match column::<Option<uuid::Uuid>>(&row, "seat_id", operation)? {
            Some(seat_id) => Some(
                query("SELECT id, fare_class_id, number FROM seats WHERE id = $1")
                    .bind(seat_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|error| map_sqlx_error(error, operation))?
                    .map(|seat| decode_seat(&seat, operation))
                    .transpose()?
                    .ok_or_else(|| broken("unknown seat"))?,
            ),
            None => None,
        };

        let baggage_count: i32 = column(&row, "baggage_count", operation)?;

        Ok(Some(Ticket {
            id: ticket_id,
            status: decode_status(&row, operation)?,
            status_at: column(&row, "status_at", operation)?,
            flight,
            user_id: UserId::new(column(&row, "user_id", operation)?),
            passenger,
            fare_class,
            seat,
            baggage_count: u32::try_from(baggage_count)
                .map_err(|_| broken("negative baggage count"))?,
            price: column(&row, "price", operation)?,
            paid_with_bonuses: column(&row, "paid_with_bonuses", operation)?,
            accrued_bonuses: column(&row, "accrued_bonuses", operation)?,
        }))
    }

    #[instrument(name = "postgres.create_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn create_ticket(&self, command: NewTicket) -> Result<TicketId, StoreError> {
        let operation = Operation::CreateTicket;
        let mut tx = self.begin().await?;

        ensure_bookable(&mut tx, &command, operation).await?;

        if let Some(seat_id) = command.seat_id {
            ensure_seat_free(
                &mut tx,
                command.flight_id,
                command.fare_class_id,
                seat_id,
                operation,
            )
            .await?;
        }

        let passenger_id = command.passenger.passenger_id();
        if let PassengerAssignment::New(passenger) = &command.passenger {
            let _ = query(
                "INSERT INTO passengers (id, user_id, name, identity_document) VALUES ($1, $2, $3, $4)",
            )
            .bind(passenger.id.into_inner())
            .bind(passenger.user_id.into_inner())
            .bind(passenger.name.as_str())
            .bind(passenger.identity_document.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;
        }

        let _ = query(
            "INSERT INTO tickets (id, status_id, status_at, flight_id, user_id, passenger_id,
                                  fare_class_id, seat_id, baggage_count, price)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(command.ticket_id.into_inner())
        .bind(TicketStatus::Created.code())
        .bind(command.created_at)
        .bind(command.flight_id.into_inner())
        .bind(command.user_id.into_inner())
        .bind(passenger_id.into_inner())
        .bind(command.fare_class_id.into_inner())
        .bind(command.seat_id.map(SeatId::into_inner))
        .bind(to_i32(command.baggage_count, "baggage count")?)
        .bind(command.price)
        .execute(&mut *tx)
        .await
        .map_err(|error| match command.seat_id {
            Some(seat_id) if has_code(&error, UNIQUE_VIOLATION) => {
                seat_taken(&error, command.flight_id, seat_id)
            }
            _ => map_sqlx_error(error, operation),
        })?;

        commit(tx).await?;

        info!(
            ticket_id = %command.ticket_id,
            "[postgres.create_ticket] ticket inserted"
        );
        Ok(command.ticket_id)
    }

    #[instrument(name = "postgres.pay_for_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn pay_for_ticket(&self, command: TicketPayment) -> Result<TicketId, StoreError> {
        let operation = Operation::PayForTicket;
        let mut tx = self.begin().await?;

        let _ = lock_ticket(&mut tx, command.ticket_id, TicketStatus::Created, operation).await?;

        match command.ledger {
            LedgerUpdate::Open { purchases } => {
                open_ledger(&mut tx, command.user_id, purchases, operation).await?;
            }
            LedgerUpdate::Adjust(delta) => {
                adjust_ledger(&mut tx, command.user_id, delta, operation).await?;
            }
        }

        let _ = query(
            "UPDATE tickets
             SET status_id = $2, status_at = $3, paid_with_bonuses = $4, accrued_bonuses = $5
             WHERE id = $1",
        )
        .bind(command.ticket_id.into_inner())
        .bind(TicketStatus::Paid.code())
        .bind(command.paid_at)
        .bind(command.paid_with_bonuses)
        .bind(command.accrued_bonuses)
        .execute(&mut *tx)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?;

        commit(tx).await?;

        info!(
            ticket_id = %command.ticket_id,
            "[postgres.pay_for_ticket] ticket paid"
        );
        Ok(command.ticket_id)
    }

    #[instrument(name = "postgres.refund_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn refund_ticket(&self, command: TicketRefund) -> Result<TicketId, StoreError> {
        let operation = Operation::RefundTicket;
        let mut tx = self.begin().await?;

        let _ = lock_ticket(&mut tx, command.ticket_id, TicketStatus::Paid, operation).await?;
        adjust_ledger(&mut tx, command.user_id, command.ledger, operation).await?;

        let _ = query("UPDATE tickets SET status_id = $2, status_at = $3 WHERE id = $1")
            .bind(command.ticket_id.into_inner())
            .bind(TicketStatus::Refunded.code())
            .bind(command.refunded_at)
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;

        commit(tx).await?;

        info!(
            ticket_id = %command.ticket_id,
            "[postgres.refund_ticket] ticket refunded"
        );
        Ok(command.ticket_id)
    }

    #[instrument(name = "postgres.register_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn register_ticket(&self, command: TicketRegistration) -> Result<TicketId, StoreError> {
        let operation = Operation::RegisterTicket;
        let mut tx = self.begin().await?;

        let ticket = lock_ticket(&mut tx, command.ticket_id, TicketStatus::Paid, operation).await?;

        let assigned_seat = match (ticket.seat_id, command.seat_id) {
            (None, Some(seat_id)) => {
                let _ =
                    lock_fare_class(&mut tx, ticket.flight_id, ticket.fare_class_id, operation)
                        .await?;
                ensure_seat_free(
                    &mut tx,
                    ticket.flight_id,
                    ticket.fare_class_id,
                    seat_id,
                    operation,
                )
                .await?;
                Some(seat_id)
            }
            _ => None,
        };

        adjust_ledger(&mut tx, command.user_id, command.ledger, operation).await?;

        let _ = query(
            "UPDATE tickets
             SET status_id = $2, status_at = $3, seat_id = COALESCE(seat_id, $4)
             WHERE id = $1",
        )
        .bind(command.ticket_id.into_inner())
        .bind(TicketStatus::Registered.code())
        .bind(command.registered_at)
        .bind(assigned_seat.map(SeatId::into_inner))
        .execute(&mut *tx)
        .await
        .map_err(|error| match assigned_seat {
            Some(seat_id) if has_code(&error, UNIQUE_VIOLATION) => {
                seat_taken(&error, ticket.flight_id, seat_id)
            }
            _ => map_sqlx_error(error, operation),
        })?;

        commit(tx).await?;

        info!(
            ticket_id = %command.ticket_id,
            "[postgres.register_ticket] ticket registered"
        );
        Ok(command.ticket_id)
    }

    #[instrument(name = "postgres.cancel_expired_tickets", skip(self))]
    async fn cancel_expired_tickets(
        &self,
        sweep: TicketSweep,
    ) -> Result<Vec<TicketId>, StoreError> {
        let operation = Operation::CancelExpiredTickets;

        let mut canceled = query(
            "UPDATE tickets SET status_id = $1, status_at = $2
             WHERE status_id = $3 AND status_at < $4
             RETURNING id",
        )
        .bind(TicketStatus::Canceled.code())
        .bind(sweep.canceled_at)
        .bind(TicketStatus::Created.code())
        .bind(sweep.created_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?
        .iter()
        .map(|row| column(row, "id", operation).map(TicketId::new))
        .collect::<Result<Vec<TicketId>, StoreError>>()?;
        canceled.sort();

        info!(
            canceled_count = canceled.len(),
            "[postgres.cancel_expired_tickets] canceled lapsed unpaid tickets"
        );
        Ok(canceled)
    }
}

#[async_trait]
impl CatalogImport for PostgresTicketStore {
    #[instrument(name = "postgres.import_flight", skip(self, record), fields(flight_id = %record.flight.id))]
    async fn import_flight(&self, record: FlightRecord) -> Result<(), StoreError> {
        let operation = Operation::ImportFlight;
        let FlightRecord { flight, seats } = record;
        let mut tx = self.begin().await?;

        let _ = query(
            "INSERT INTO flights (id, name, departure, baggage_price, seat_selection_price)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 departure = EXCLUDED.departure,
                 baggage_price = EXCLUDED.baggage_price,
                 seat_selection_price = EXCLUDED.seat_selection_price",
        )
        .bind(flight.id.into_inner())
        .bind(&flight.name)
        .bind(flight.departure)
        .bind(flight.baggage_price)
        .bind(flight.seat_selection_price)
        .execute(&mut *tx)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?;

        for (position, fare) in flight.fares.iter().enumerate() {
            let _ = query(
                "INSERT INTO fare_classes (id, name) VALUES ($1, $2)
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(fare.fare_class.id.into_inner())
            .bind(&fare.fare_class.name)
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;

            let position = i32::try_from(position)
                .map_err(|_| corrupt("flight", "too many fare classes"))?;
            let _ = query(
                "INSERT INTO flight_fares (flight_id, fare_class_id, position, seat_count, price)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (flight_id, fare_class_id) DO UPDATE SET
                     position = EXCLUDED.position,
                     seat_count = EXCLUDED.seat_count,
                     price = EXCLUDED.price",
            )
            .bind(flight.id.into_inner())
            .bind(fare.fare_class.id.into_inner())
            .bind(position)
            .bind(to_i32(fare.fare_class.seat_count, "seat count")?)
            .bind(fare.price)
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;
        }

        for seat in &seats {
            let _ = query(
                "INSERT INTO seats (id, flight_id, fare_class_id, number) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE SET number = EXCLUDED.number",
            )
            .bind(seat.id.into_inner())
            .bind(flight.id.into_inner())
            .bind(seat.fare_class_id.into_inner())
            .bind(&seat.number)
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;
        }

        commit(tx).await
    }

    #[instrument(name = "postgres.import_user", skip(self, user), fields(user_id = %user.id))]
    async fn import_user(&self, user: User) -> Result<(), StoreError> {
        let operation = Operation::ImportUser;
        let mut tx = self.begin().await?;

        let _ = query(
            "INSERT INTO users (id, name, email) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email",
        )
        .bind(user.id.into_inner())
        .bind(&user.name)
        .bind(&user.email)
        .execute(&mut *tx)
        .await
        .map_err(|error| map_sqlx_error(error, operation))?;

        if let Some(balance) = user.balance {
            let _ = query(
                "INSERT INTO users_balance (user_id, purchases, bonuses) VALUES ($1, $2, $3)
                 ON CONFLICT (user_id) DO UPDATE SET
                     purchases = EXCLUDED.purchases,
                     bonuses = EXCLUDED.bonuses",
            )
            .bind(user.id.into_inner())
            .bind(balance.purchases)
            .bind(balance.bonuses)
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, operation))?;
        }

        commit(tx).await
    }
}

fn has_code(error: &sqlx::Error, code: &str) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some(code))
}

fn seat_taken(error: &sqlx::Error, flight_id: FlightId, seat_id: SeatId) -> StoreError {
    warn!(
        error = %error,
        "[postgres.seat_taken] live seat index rejected a second holder"
    );
    StoreError::SeatTaken { flight_id, seat_id }
}

fn map_sqlx_error(error: sqlx::Error, operation: Operation) -> StoreError {
    error!(
        error = %error,
        operation = %operation,
        "[postgres.database_error] database operation failed"
    );
    StoreError::StoreFailure { operation }
}
