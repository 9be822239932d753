//! In-memory storage backend for `TicketCore`
//!
//! This crate provides an in-memory implementation of every storage
//! capability the lifecycle service consumes, useful for testing and
//! development scenarios where persistence is not required.
//!
//! All state sits behind one lock. Every write command takes the write lock
//! for its whole duration, validates against committed state, and only then
//! mutates, so a rejected command leaves nothing behind.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{instrument, warn};

use ticketcore_types::{
    AccrualPercent, BonusSchedule, CatalogImport, FareClassId, Flight, FlightCatalog, FlightId,
    FlightRecord, LedgerDelta, LedgerUpdate, NewTicket, Passenger, PassengerAssignment,
    PassengerDirectory, PassengerId, SeatId, StoreError, Ticket, TicketId, TicketPayment,
    TicketRefund, TicketRegistration, TicketRepository, TicketStatus, TicketSweep, User,
    UserBalance, UserDirectory, UserId, VacantSeats,
};

// Normalized ticket row; the denormalized view is assembled on read.
#[derive(Debug, Clone)]
struct TicketRow {
    id: TicketId,
    status: TicketStatus,
    status_at: DateTime<Utc>,
    flight_id: FlightId,
    user_id: UserId,
    passenger_id: PassengerId,
    fare_class_id: FareClassId,
    seat_id: Option<SeatId>,
    baggage_count: u32,
    price: i64,
    paid_with_bonuses: i64,
    accrued_bonuses: i64,
}

#[derive(Debug, Default)]
struct State {
    flights: HashMap<FlightId, FlightRecord>,
    users: HashMap<UserId, User>,
    passengers: HashMap<PassengerId, Passenger>,
    tickets: HashMap<TicketId, TicketRow>,
}

impl State {
    fn live_tickets(&self, flight_id: FlightId) -> impl Iterator<Item = &TicketRow> {
        self.tickets
            .values()
            .filter(move |row| row.flight_id == flight_id && row.status.holds_inventory())
    }

    fn occupied_slots(&self, flight_id: FlightId, fare_class_id: FareClassId) -> usize {
        self.live_tickets(flight_id)
            .filter(|row| row.fare_class_id == fare_class_id)
            .count()
    }

    fn held_seats(&self, flight_id: FlightId) -> HashSet<SeatId> {
        self.live_tickets(flight_id)
            .filter_map(|row| row.seat_id)
            .collect()
    }

    fn flight(&self, flight_id: FlightId) -> Result<&FlightRecord, StoreError> {
        self.flights
            .get(&flight_id)
            .ok_or(StoreError::MissingReference { entity: "flight" })
    }

    fn ensure_seat_free(
        &self,
        flight_id: FlightId,
        fare_class_id: FareClassId,
        seat_id: SeatId,
    ) -> Result<(), StoreError> {
        let record = self.flight(flight_id)?;
        let known = record
            .seats
            .iter()
            .any(|seat| seat.id == seat_id && seat.fare_class_id == fare_class_id);
        if !known {
            return Err(StoreError::MissingReference { entity: "seat" });
        }

        if self.held_seats(flight_id).contains(&seat_id) {
            warn!(
                flight_id = %flight_id,
                seat_id = %seat_id,
                "[memory.seat_taken] seat already held by a live ticket"
            );
            return Err(StoreError::SeatTaken { flight_id, seat_id });
        }

        Ok(())
    }

    fn ticket(
        &self,
        ticket_id: TicketId,
        expected: TicketStatus,
    ) -> Result<&TicketRow, StoreError> {
        let row = self
            .tickets
            .get(&ticket_id)
            .ok_or(StoreError::TicketNotFound { ticket_id })?;

        if row.status != expected {
            warn!(
                ticket_id = %ticket_id,
                expected = %expected,
                actual = %row.status,
                "[memory.status_conflict] ticket left the expected status"
            );
            return Err(StoreError::StatusConflict {
                ticket_id,
                expected,
                actual: row.status,
            });
        }

        Ok(row)
    }

    // Balance after `delta`; the caller commits it only once every check passed.
    fn adjusted_balance(
        &self,
        user_id: UserId,
        delta: LedgerDelta,
    ) -> Result<UserBalance, StoreError> {
        let user = self
            .users
            .get(&user_id)
            .ok_or(StoreError::MissingReference { entity: "user" })?;
        let balance = user.balance.ok_or(StoreError::MissingLedger { user_id })?;

        balance
            .checked_apply(delta)
            .ok_or(StoreError::InsufficientBonuses { user_id })
    }

    fn opened_balance(&self, user_id: UserId, purchases: i64) -> Result<UserBalance, StoreError> {
        let user = self
            .users
            .get(&user_id)
            .ok_or(StoreError::MissingReference { entity: "user" })?;

        user.balance
            .unwrap_or_default()
            .checked_apply(LedgerDelta::purchase(purchases, 0))
            .ok_or(StoreError::InsufficientBonuses { user_id })
    }

    fn set_balance(&mut self, user_id: UserId, balance: UserBalance) {
        if let Some(user) = self.users.get_mut(&user_id) {
            user.balance = Some(balance);
        }
    }

    fn view(&self, row: &TicketRow) -> Result<Ticket, StoreError> {
        let corrupt = |detail: &str| StoreError::CorruptRecord {
            entity: "ticket",
            detail: format!("ticket {}: {detail}", row.id),
        };

        let record = self
            .flights
            .get(&row.flight_id)
            .ok_or_else(|| corrupt("unknown flight"))?;
        let fare = record
            .flight
            .fare(row.fare_class_id)
            .ok_or_else(|| corrupt("unknown fare class"))?;
        let passenger = self
            .passengers
            .get(&row.passenger_id)
            .ok_or_else(|| corrupt("unknown passenger"))?;
        let seat = match row.seat_id {
            Some(seat_id) => Some(
                record
                    .seats
                    .iter()
                    .find(|seat| seat.id == seat_id)
                    .cloned()
                    .ok_or_else(|| corrupt("unknown seat"))?,
            ),
            None => None,
        };

        Ok(Ticket {
            id: row.id,
            status: row.status,
            status_at: row.status_at,
            flight: record.flight.clone(),
            user_id: row.user_id,
            passenger: passenger.clone(),
            fare_class: fare.fare_class.clone(),
            seat,
            baggage_count: row.baggage_count,
            price: row.price,
            paid_with_bonuses: row.paid_with_bonuses,
            accrued_bonuses: row.accrued_bonuses,
        })
    }
}

/// Thread-safe in-memory ticket store for testing
#[derive(Clone)]
pub struct InMemoryTicketStore {
    state: Arc<RwLock<State>>,
    bonus_schedule: Arc<BonusSchedule>,
}

impl InMemoryTicketStore {
    /// Create a new empty store using the standard bonus schedule
    pub fn new() -> Self {
        Self::with_bonus_schedule(BonusSchedule::default())
    }

    /// Create a new empty store accruing bonuses by `schedule`
    pub fn with_bonus_schedule(schedule: BonusSchedule) -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            bonus_schedule: Arc::new(schedule),
        }
    }
}

impl Default for InMemoryTicketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlightCatalog for InMemoryTicketStore {
    async fn get_flight(&self, flight_id: FlightId) -> Result<Option<Flight>, StoreError> {
        let state = self.state.read();

        Ok(state
            .flights
            .get(&flight_id)
            .map(|record| record.flight.clone()))
    }

    async fn get_vacant_seats(
        &self,
        flight_id: FlightId,
        fare_class_id: FareClassId,
    ) -> Result<Option<VacantSeats>, StoreError> {
        let state = self.state.read();

        let Some(record) = state.flights.get(&flight_id) else {
            return Ok(None);
        };
        let Some(fare) = record.flight.fare(fare_class_id) else {
            return Ok(None);
        };

        let occupied = state.occupied_slots(flight_id, fare_class_id);
        let held = state.held_seats(flight_id);
        let seats = record
            .seats
            .iter()
            .filter(|seat| seat.fare_class_id == fare_class_id && !held.contains(&seat.id))
            .cloned()
            .collect();

        Ok(Some(VacantSeats {
            fare_class_id,
            fare_class_name: fare.fare_class.name.clone(),
            vacant_count: fare
                .fare_class
                .seat_count
                .saturating_sub(u32::try_from(occupied).unwrap_or(u32::MAX)),
            seats,
        }))
    }
}

#[async_trait]
impl UserDirectory for InMemoryTicketStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let state = self.state.read();

        Ok(state.users.get(&user_id).cloned())
    }

    async fn get_bonus_accrual_percent(
        &self,
        user_id: UserId,
    ) -> Result<AccrualPercent, StoreError> {
        let state = self.state.read();

        Ok(state
            .users
            .get(&user_id)
            .and_then(|user| user.balance)
            .map(|balance| self.bonus_schedule.percent_for(balance.purchases))
            .unwrap_or_default())
    }
}

#[async_trait]
impl PassengerDirectory for InMemoryTicketStore {
    async fn get_passenger(
        &self,
        passenger_id: PassengerId,
    ) -> Result<Option<Passenger>, StoreError> {
        let state = self.state.read();

        Ok(state.passengers.get(&passenger_id).cloned())
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketStore {
    async fn get_ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError> {
        let state = self.state.read();

        state
            .tickets
            .get(&ticket_id)
            .map(|row| state.view(row))
            .transpose()
    }

    #[instrument(name = "memory.create_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn create_ticket(&self, command: NewTicket) -> Result<TicketId, StoreError> {
        let mut state = self.state.write();

        let record = state.flight(command.flight_id)?;
        let fare = record
            .flight
            .fare(command.fare_class_id)
            .ok_or(StoreError::MissingReference {
                entity: "fare class",
            })?;
        let capacity = usize::try_from(fare.fare_class.seat_count).unwrap_or(usize::MAX);

        if !state.users.contains_key(&command.user_id) {
            return Err(StoreError::MissingReference { entity: "user" });
        }
        if let PassengerAssignment::Existing(passenger_id) = &command.passenger {
            if !state.passengers.contains_key(passenger_id) {
                return Err(StoreError::MissingReference { entity: "passenger" });
            }
        }

        if state.occupied_slots(command.flight_id, command.fare_class_id) >= capacity {
            warn!(
                flight_id = %command.flight_id,
                fare_class_id = %command.fare_class_id,
                "[memory.fare_class_full] no capacity left at commit"
            );
            return Err(StoreError::FareClassFull {
                flight_id: command.flight_id,
                fare_class_id: command.fare_class_id,
            });
        }
        if let Some(seat_id) = command.seat_id {
            state.ensure_seat_free(command.flight_id, command.fare_class_id, seat_id)?;
        }

        let passenger_id = command.passenger.passenger_id();
        if let PassengerAssignment::New(passenger) = command.passenger {
            state.passengers.insert(passenger.id, passenger);
        }

        state.tickets.insert(
            command.ticket_id,
            TicketRow {
                id: command.ticket_id,
                status: TicketStatus::Created,
                status_at: command.created_at,
                flight_id: command.flight_id,
                user_id: command.user_id,
                passenger_id,
                fare_class_id: command.fare_class_id,
                seat_id: command.seat_id,
                baggage_count: command.baggage_count,
                price: command.price,
                paid_with_bonuses: 0,
                accrued_bonuses: 0,
            },
        );

        Ok(command.ticket_id)
    }

    #[instrument(name = "memory.pay_for_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn pay_for_ticket(&self, command: TicketPayment) -> Result<TicketId, StoreError> {
        let mut state = self.state.write();

        state.ticket(command.ticket_id, TicketStatus::Created)?;
        let balance = match command.ledger {
            LedgerUpdate::Open { purchases } => state.opened_balance(command.user_id, purchases)?,
            LedgerUpdate::Adjust(delta) => state.adjusted_balance(command.user_id, delta)?,
        };

        state.set_balance(command.user_id, balance);
        if let Some(row) = state.tickets.get_mut(&command.ticket_id) {
            row.status = TicketStatus::Paid;
            row.status_at = command.paid_at;
            row.paid_with_bonuses = command.paid_with_bonuses;
            row.accrued_bonuses = command.accrued_bonuses;
        }

        Ok(command.ticket_id)
    }

    #[instrument(name = "memory.refund_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn refund_ticket(&self, command: TicketRefund) -> Result<TicketId, StoreError> {
        let mut state = self.state.write();

        state.ticket(command.ticket_id, TicketStatus::Paid)?;
        let balance = state.adjusted_balance(command.user_id, command.ledger)?;

        state.set_balance(command.user_id, balance);
        if let Some(row) = state.tickets.get_mut(&command.ticket_id) {
            row.status = TicketStatus::Refunded;
            row.status_at = command.refunded_at;
        }

        Ok(command.ticket_id)
    }

    #[instrument(name = "memory.register_ticket", skip(self, command), fields(ticket_id = %command.ticket_id))]
    async fn register_ticket(&self, command: TicketRegistration) -> Result<TicketId, StoreError> {
        let mut state = self.state.write();

        let row = state.ticket(command.ticket_id, TicketStatus::Paid)?;
        let assign_seat = match (row.seat_id, command.seat_id) {
            (None, Some(seat_id)) => {
                state.ensure_seat_free(row.flight_id, row.fare_class_id, seat_id)?;
                Some(seat_id)
            }
            _ => None,
        };
        let balance = state.adjusted_balance(command.user_id, command.ledger)?;

        state.set_balance(command.user_id, balance);
        if let Some(row) = state.tickets.get_mut(&command.ticket_id) {
            row.status = TicketStatus::Registered;
            row.status_at = command.registered_at;
            if assign_seat.is_some() {
                row.seat_id = assign_seat;
            }
        }

        Ok(command.ticket_id)
    }

    #[instrument(name = "memory.cancel_expired_tickets", skip(self))]
    async fn cancel_expired_tickets(
        &self,
        sweep: TicketSweep,
    ) -> Result<Vec<TicketId>, StoreError> {
        let mut state = self.state.write();

        let mut canceled: Vec<TicketId> = state
            .tickets
            .values_mut()
            .filter(|row| row.status == TicketStatus::Created && row.status_at < sweep.created_before)
            .map(|row| {
                row.status = TicketStatus::Canceled;
                row.status_at = sweep.canceled_at;
                row.id
            })
            .collect();
        canceled.sort();

        Ok(canceled)
    }
}

#[async_trait]
impl CatalogImport for InMemoryTicketStore {
    async fn import_flight(&self, record: FlightRecord) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.flights.insert(record.flight.id, record);
        Ok(())
    }

    async fn import_user(&self, user: User) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.users.insert(user.id, user);
        Ok(())
    }
}
