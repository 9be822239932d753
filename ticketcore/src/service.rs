//! The lifecycle service.
//!
//! `TicketService` is stateless between requests: it reads snapshots from
//! its collaborators, runs the rules in a fixed order and hands exactly one
//! persistence command to the repository. Any rejection happens before the
//! command is built, so a failed request never mutates anything.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use ticketcore_types::{
    FlightCatalog, IdentityDocument, LedgerDelta, LedgerUpdate, NewTicket, Passenger,
    PassengerAssignment, PassengerDirectory, PassengerId, PassengerName, Ticket, TicketId,
    TicketPayment, TicketRefund, TicketRegistration, TicketRepository, TicketStatus, TicketStore,
    TicketSweep, User, UserDirectory, UserId,
};

use crate::config::LifecycleConfig;
use crate::errors::{Entity, ErrorKind, TicketError};
use crate::request::{CreateTicket, PassengerRef, PayForTicket, RefundTicket, RegisterTicket};
use crate::rules::{self, CheckInWindow};

/// Ticket lifecycle engine.
///
/// Every operation takes the request timestamp explicitly; the service never
/// reads the clock. Construct once at startup and share by cloning.
#[derive(Clone)]
pub struct TicketService {
    flights: Arc<dyn FlightCatalog>,
    users: Arc<dyn UserDirectory>,
    passengers: Arc<dyn PassengerDirectory>,
    tickets: Arc<dyn TicketRepository>,
    config: LifecycleConfig,
}

impl TicketService {
    /// Create a service backed by one store providing every capability.
    pub fn new<S>(store: Arc<S>, config: LifecycleConfig) -> Self
    where
        S: TicketStore + 'static,
    {
        Self {
            flights: store.clone(),
            users: store.clone(),
            passengers: store.clone(),
            tickets: store,
            config,
        }
    }

    /// Create a service from individually supplied collaborators.
    pub fn with_components(
        flights: Arc<dyn FlightCatalog>,
        users: Arc<dyn UserDirectory>,
        passengers: Arc<dyn PassengerDirectory>,
        tickets: Arc<dyn TicketRepository>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            flights,
            users,
            passengers,
            tickets,
            config,
        }
    }

    /// Windows and caps this service enforces.
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Full denormalized view of a ticket. No side effects.
    #[instrument(name = "tickets.get_ticket", skip(self))]
    pub async fn get_ticket(&self, ticket_id: TicketId) -> Result<Ticket, TicketError> {
        let result = self.load_ticket(ticket_id).await;
        if let Err(error) = &result {
            report_failure("tickets.get_ticket", error);
        }
        result
    }

    /// Book a ticket in `Created`, creating the passenger when new.
    #[instrument(
        name = "tickets.create_ticket",
        skip(self, request),
        fields(flight_id = %request.flight_id, user_id = %request.user_id)
    )]
    pub async fn create_ticket(
        &self,
        request: CreateTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let result = self.try_create_ticket(request, now).await;
        report("tickets.create_ticket", result)
    }

    /// Pay for a `Created` ticket, optionally with bonus points.
    #[instrument(
        name = "tickets.pay_for_ticket",
        skip(self, request),
        fields(ticket_id = %request.ticket_id, user_id = %request.user_id)
    )]
    pub async fn pay_for_ticket(
        &self,
        request: PayForTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let result = self.try_pay_for_ticket(request, now).await;
        report("tickets.pay_for_ticket", result)
    }

    /// Refund a `Paid` ticket; the full price returns as bonus points.
    #[instrument(
        name = "tickets.refund_ticket",
        skip(self, request),
        fields(ticket_id = %request.ticket_id, user_id = %request.user_id)
    )]
    pub async fn refund_ticket(
        &self,
        request: RefundTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let result = self.try_refund_ticket(request, now).await;
        report("tickets.refund_ticket", result)
    }

    /// Check in a `Paid` ticket and credit the bonus accrued at payment.
    #[instrument(
        name = "tickets.register_ticket",
        skip(self, request),
        fields(ticket_id = %request.ticket_id, user_id = %request.user_id)
    )]
    pub async fn register_ticket(
        &self,
        request: RegisterTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let result = self.try_register_ticket(request, now).await;
        report("tickets.register_ticket", result)
    }

    /// Cancel every unpaid ticket whose payment window lapsed before `now`.
    #[instrument(name = "tickets.cancel_expired_tickets", skip(self))]
    pub async fn cancel_expired_tickets(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TicketId>, TicketError> {
        let sweep = TicketSweep {
            created_before: now - self.config.payment_window.as_duration(),
            canceled_at: now,
        };

        match self.tickets.cancel_expired_tickets(sweep).await {
            Ok(canceled) => {
                info!(
                    canceled_count = canceled.len(),
                    "[tickets.cancel_expired_tickets] released lapsed unpaid tickets"
                );
                Ok(canceled)
            }
            Err(store_error) => {
                let error = TicketError::from(store_error);
                report_failure("tickets.cancel_expired_tickets", &error);
                Err(error)
            }
        }
    }

    async fn try_create_ticket(
        &self,
        request: CreateTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let flight = self
            .flights
            .get_flight(request.flight_id)
            .await?
            .ok_or(TicketError::NotFound(Entity::Flight(request.flight_id)))?;

        if !rules::sale_is_open(&self.config, flight.departure, now) {
            return Err(TicketError::FlightAlreadyClosed {
                flight_id: flight.id,
            });
        }

        self.load_user(request.user_id).await?;

        let passenger = match request.passenger {
            PassengerRef::Existing(passenger_id) => {
                let passenger = self
                    .passengers
                    .get_passenger(passenger_id)
                    .await?
                    .ok_or(TicketError::NotFound(Entity::Passenger(passenger_id)))?;

                if passenger.user_id != request.user_id {
                    return Err(TicketError::InvalidPassenger {
                        passenger_id,
                        owner_id: passenger.user_id,
                        user_id: request.user_id,
                    });
                }

                PassengerAssignment::Existing(passenger_id)
            }
            PassengerRef::New {
                name,
                identity_document,
            } => PassengerAssignment::New(Passenger {
                id: PassengerId::generate(),
                user_id: request.user_id,
                name: PassengerName::try_new(name).map_err(|_| TicketError::BadRequest {
                    reason: "passenger name is required",
                })?,
                identity_document: IdentityDocument::try_new(identity_document).map_err(
                    |_| TicketError::BadRequest {
                        reason: "passenger identity document is required",
                    },
                )?,
            }),
        };

        let fare_class_missing = || {
            TicketError::NotFound(Entity::FareClass {
                flight_id: flight.id,
                fare_class_id: request.fare_class_id,
            })
        };

        let vacant = self
            .flights
            .get_vacant_seats(flight.id, request.fare_class_id)
            .await?
            .ok_or_else(fare_class_missing)?;

        if vacant.vacant_count == 0 {
            return Err(TicketError::NoVacantSeat {
                fare_class_id: request.fare_class_id,
            });
        }

        if let Some(seat_id) = request.seat_id {
            if !vacant.contains(seat_id) {
                return Err(TicketError::SeatNotVacant { seat_id });
            }
        }

        let fare = flight
            .fare(request.fare_class_id)
            .ok_or_else(fare_class_missing)?;
        let price = rules::ticket_price(
            &flight,
            fare,
            request.baggage_count,
            request.seat_id.is_some(),
        );

        let command = NewTicket {
            ticket_id: TicketId::generate(),
            created_at: now,
            flight_id: flight.id,
            user_id: request.user_id,
            passenger,
            fare_class_id: request.fare_class_id,
            seat_id: request.seat_id,
            baggage_count: request.baggage_count,
            price,
        };

        Ok(self.tickets.create_ticket(command).await?)
    }

    async fn try_pay_for_ticket(
        &self,
        request: PayForTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let ticket = self.load_ticket(request.ticket_id).await?;
        expect_status(&ticket, TicketStatus::Created)?;

        if !rules::payment_is_open(&self.config, ticket.status_at, now) {
            return Err(TicketError::TicketAlreadyCanceled {
                ticket_id: ticket.id,
            });
        }

        let user = self.load_user(request.user_id).await?;
        expect_owner(&ticket, &user)?;

        rules::check_bonus_payment(&self.config, request.bonuses, ticket.price, user.balance)
            .map_err(|reason| TicketError::InvalidBonusAmount { reason })?;

        let accrued_bonuses = self
            .users
            .get_bonus_accrual_percent(user.id)
            .await?
            .accrue(ticket.price);

        let ledger = match user.balance {
            None => LedgerUpdate::Open {
                purchases: ticket.price,
            },
            Some(_) => LedgerUpdate::Adjust(LedgerDelta::purchase(ticket.price, request.bonuses)),
        };

        let command = TicketPayment {
            ticket_id: ticket.id,
            user_id: user.id,
            paid_at: now,
            paid_with_bonuses: request.bonuses,
            accrued_bonuses,
            ledger,
        };

        Ok(self.tickets.pay_for_ticket(command).await?)
    }

    async fn try_refund_ticket(
        &self,
        request: RefundTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let ticket = self.load_ticket(request.ticket_id).await?;
        expect_status(&ticket, TicketStatus::Paid)?;

        if !rules::refund_is_open(&self.config, ticket.flight.departure, now) {
            return Err(TicketError::RefundAlreadyClosed {
                ticket_id: ticket.id,
            });
        }

        let user = self.load_user(request.user_id).await?;
        expect_owner(&ticket, &user)?;
        expect_ledger(&user)?;

        let command = TicketRefund {
            ticket_id: ticket.id,
            user_id: user.id,
            refunded_at: now,
            ledger: LedgerDelta::refund(ticket.price),
        };

        Ok(self.tickets.refund_ticket(command).await?)
    }

    async fn try_register_ticket(
        &self,
        request: RegisterTicket,
        now: DateTime<Utc>,
    ) -> Result<TicketId, TicketError> {
        let ticket = self.load_ticket(request.ticket_id).await?;
        expect_status(&ticket, TicketStatus::Paid)?;

        match rules::check_in_window(&self.config, ticket.flight.departure, now) {
            CheckInWindow::Open => {}
            CheckInWindow::NotStarted => {
                return Err(TicketError::CheckInNotStarted {
                    ticket_id: ticket.id,
                })
            }
            CheckInWindow::Closed => {
                return Err(TicketError::CheckInAlreadyClosed {
                    ticket_id: ticket.id,
                })
            }
        }

        let user = self.load_user(request.user_id).await?;
        expect_owner(&ticket, &user)?;
        expect_ledger(&user)?;

        let seat_id = if ticket.seat.is_some() {
            None
        } else {
            let seat_id = request.seat_id.ok_or(TicketError::SeatNotAssigned {
                ticket_id: ticket.id,
            })?;

            let vacant = self
                .flights
                .get_vacant_seats(ticket.flight.id, ticket.fare_class.id)
                .await?
                .ok_or(TicketError::NotFound(Entity::FareClass {
                    flight_id: ticket.flight.id,
                    fare_class_id: ticket.fare_class.id,
                }))?;

            if !vacant.contains(seat_id) {
                return Err(TicketError::SeatNotVacant { seat_id });
            }

            Some(seat_id)
        };

        let command = TicketRegistration {
            ticket_id: ticket.id,
            user_id: user.id,
            registered_at: now,
            seat_id,
            ledger: LedgerDelta::credit(ticket.accrued_bonuses),
        };

        Ok(self.tickets.register_ticket(command).await?)
    }

    async fn load_ticket(&self, ticket_id: TicketId) -> Result<Ticket, TicketError> {
        self.tickets
            .get_ticket(ticket_id)
            .await?
            .ok_or(TicketError::NotFound(Entity::Ticket(ticket_id)))
    }

    async fn load_user(&self, user_id: UserId) -> Result<User, TicketError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or(TicketError::NotFound(Entity::User(user_id)))
    }
}

fn expect_status(ticket: &Ticket, expected: TicketStatus) -> Result<(), TicketError> {
    if ticket.status == expected {
        Ok(())
    } else {
        Err(TicketError::InvalidTicketStatus {
            ticket_id: ticket.id,
            status: ticket.status,
        })
    }
}

fn expect_owner(ticket: &Ticket, user: &User) -> Result<(), TicketError> {
    if ticket.user_id == user.id {
        Ok(())
    } else {
        Err(TicketError::InvalidUser {
            user_id: user.id,
            reason: "the user doesn't match the user of the ticket",
        })
    }
}

// A paid ticket implies an open ledger; its absence means corrupted state.
fn expect_ledger(user: &User) -> Result<(), TicketError> {
    match user.balance {
        Some(_) => Ok(()),
        None => Err(TicketError::InvalidUser {
            user_id: user.id,
            reason: "no information about the user's balance",
        }),
    }
}

fn report(
    operation: &'static str,
    result: Result<TicketId, TicketError>,
) -> Result<TicketId, TicketError> {
    match &result {
        Ok(ticket_id) => info!(ticket_id = %ticket_id, "[{operation}] ticket committed"),
        Err(error) => report_failure(operation, error),
    }
    result
}

fn report_failure(operation: &'static str, error: &TicketError) {
    match error.kind() {
        ErrorKind::Storage => error!(
            code = error.code(),
            error = ?error,
            "[{operation}] storage failure"
        ),
        ErrorKind::NotFound | ErrorKind::BusinessRule => warn!(
            code = error.code(),
            reason = %error,
            "[{operation}] request rejected"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use ticketcore_memory::InMemoryTicketStore;
    use ticketcore_testing::fixtures::{self, FlightBuilder};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn rejected_request_is_logged_with_its_code() {
        let store = Arc::new(InMemoryTicketStore::new());
        let flight = FlightBuilder::departing_at(fixtures::reference_time() + TimeDelta::hours(1))
            .fare_class("Economy", 1_000, 1)
            .build();
        let user = fixtures::user(None);
        fixtures::seed(store.as_ref(), &flight, &[&user])
            .await
            .expect("seeding should succeed");
        let service = TicketService::new(store, LifecycleConfig::default());

        let error = service
            .create_ticket(
                CreateTicket {
                    flight_id: flight.flight_id(),
                    user_id: user.id,
                    passenger: PassengerRef::Existing(PassengerId::generate()),
                    fare_class_id: flight.fare_class(0).id,
                    seat_id: None,
                    baggage_count: 0,
                },
                fixtures::reference_time(),
            )
            .await
            .expect_err("sale should be closed an hour before departure");

        assert_eq!(error.code(), "FLIGHT_ALREADY_CLOSED");
        assert!(logs_contain("[tickets.create_ticket] request rejected"));
        assert!(logs_contain("FLIGHT_ALREADY_CLOSED"));
    }

    #[tokio::test]
    #[traced_test]
    async fn sweep_logs_released_ticket_count() {
        let service = TicketService::new(
            Arc::new(InMemoryTicketStore::new()),
            LifecycleConfig::default(),
        );

        let canceled = service
            .cancel_expired_tickets(fixtures::reference_time())
            .await
            .expect("empty sweep should succeed");

        assert!(canceled.is_empty());
        assert!(logs_contain("released lapsed unpaid tickets"));
    }
}
