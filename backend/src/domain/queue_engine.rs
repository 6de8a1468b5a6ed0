//! Store-backed queue state machine.
//!
//! Every mutation is a read-validate-write cycle against the ticket store:
//! load the current snapshot, plan the transition with
//! [`TicketAction::plan`], then compare-and-set. A lost race re-runs the
//! cycle under the [`Retrier`], so a concurrent writer is re-validated
//! rather than overwritten.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use serde_json::json;

use super::Error;
use super::ids::{PlaceId, QueueId, TicketId, UserId};
use super::place::Place;
use super::ports::{TicketAllocation, TicketStore, TicketStoreError};
use super::queue::{Queue, QueueTarget};
use super::retry::{AttemptOutcome, Retrier};
use super::state_machine::{TicketAction, TransitionError};
use super::store_access::{bounded, map_store_error};
use super::ticket::{Ticket, TicketStatus};

/// A ticket with the queue and place it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketContext {
    pub ticket: Ticket,
    pub queue: Queue,
    pub place: Place,
}

fn settle<T>(result: Result<T, TicketStoreError>) -> AttemptOutcome<T> {
    match result {
        Ok(value) => AttemptOutcome::Done(value),
        Err(error) if error.is_retryable() => AttemptOutcome::Contended(error.to_string()),
        Err(error) => AttemptOutcome::Failed(map_store_error(error)),
    }
}

fn transition_rejected(ticket: &Ticket, error: TransitionError) -> Error {
    let details = json!({ "ticket_id": ticket.id(), "status": ticket.status() });
    match error {
        TransitionError::Invalid { .. } => Error::invalid_transition(error.to_string()),
        TransitionError::AlreadyTerminal { .. } => Error::already_terminal(error.to_string()),
    }
    .with_details(details)
}

/// Executes ticket and queue transitions against the store.
#[derive(Clone)]
pub struct QueueEngine {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
    retrier: Retrier,
    call_timeout: Duration,
}

impl QueueEngine {
    /// Build an engine over `store`; every store call is bounded by `call_timeout`.
    pub fn new(
        store: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
        retrier: Retrier,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            retrier,
            call_timeout,
        }
    }

    /// Load a place or fail with `not_found`.
    pub async fn load_place(&self, place_id: &PlaceId) -> Result<Place, Error> {
        bounded(self.call_timeout, "find_place", self.store.find_place(place_id))
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| Error::not_found(format!("place {place_id} not found")))
    }

    /// Load a queue or fail with `not_found`.
    pub async fn load_queue(&self, queue_id: &QueueId) -> Result<Queue, Error> {
        bounded(self.call_timeout, "find_queue", self.store.find_queue(queue_id))
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| Error::not_found(format!("queue {queue_id} not found")))
    }

    /// Load a ticket or fail with `not_found`.
    pub async fn load_ticket(&self, ticket_id: &TicketId) -> Result<Ticket, Error> {
        bounded(self.call_timeout, "find_ticket", self.store.find_ticket(ticket_id))
            .await
            .map_err(map_store_error)?
            .ok_or_else(|| Error::not_found(format!("ticket {ticket_id} not found")))
    }

    /// Load a ticket plus the queue and place needed for authorisation.
    pub async fn load_ticket_context(&self, ticket_id: &TicketId) -> Result<TicketContext, Error> {
        let ticket = self.load_ticket(ticket_id).await?;
        let queue = self.load_queue(ticket.queue_id()).await?;
        let place = self.load_place(queue.place_id()).await?;
        Ok(TicketContext {
            ticket,
            queue,
            place,
        })
    }

    /// Resolve a queue target. Place targets pick the most recently created
    /// queue, restricted to open ones when `open_only` is set.
    pub async fn resolve_queue(&self, target: &QueueTarget, open_only: bool) -> Result<Queue, Error> {
        let place_id = match target {
            QueueTarget::Queue(queue_id) => return self.load_queue(queue_id).await,
            QueueTarget::Place(place_id) => place_id,
        };

        self.load_place(place_id).await?;
        let latest = bounded(
            self.call_timeout,
            "latest_queue_for_place",
            self.store.latest_queue_for_place(place_id, open_only),
        )
        .await
        .map_err(map_store_error)?;

        latest.ok_or_else(|| {
            if open_only {
                Error::no_open_queue(format!("place {place_id} has no open queue"))
            } else {
                Error::not_found(format!("place {place_id} has no queues"))
            }
        })
    }

    /// Active and called tickets of a queue, lowest number first.
    pub async fn list_outstanding(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, Error> {
        bounded(
            self.call_timeout,
            "list_outstanding_tickets",
            self.store.list_outstanding_tickets(queue_id),
        )
        .await
        .map_err(map_store_error)
    }

    /// Every queue of a place, oldest first.
    pub async fn list_queues(&self, place_id: &PlaceId) -> Result<Vec<Queue>, Error> {
        bounded(
            self.call_timeout,
            "list_queues_for_place",
            self.store.list_queues_for_place(place_id),
        )
        .await
        .map_err(map_store_error)
    }

    /// Every ticket a queue issued, lowest number first.
    pub async fn list_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, Error> {
        bounded(
            self.call_timeout,
            "list_queue_tickets",
            self.store.list_queue_tickets(queue_id),
        )
        .await
        .map_err(map_store_error)
    }

    /// Persist a place.
    pub async fn register_place(&self, place: &Place) -> Result<(), Error> {
        bounded(self.call_timeout, "insert_place", self.store.insert_place(place))
            .await
            .map_err(map_store_error)
    }

    /// Open a new queue at `place`, honouring its concurrent-queue limit.
    pub async fn create_queue(&self, place: &Place, name: &str) -> Result<Queue, Error> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_request("queue name must not be empty"));
        }
        let queue = Queue::open(QueueId::random(), *place.id(), name, self.clock.utc());
        let limit = place.max_concurrent_queues();
        let queue = &queue;

        self.retrier
            .run("create_queue", move || async move {
                settle(
                    bounded(self.call_timeout, "insert_queue", self.store.insert_queue(queue, limit))
                        .await
                        .map(|()| queue.clone()),
                )
            })
            .await
    }

    /// Issue the next ticket in `queue_id` to `user_id`.
    pub async fn join(&self, queue_id: &QueueId, user_id: &UserId) -> Result<Ticket, Error> {
        let ticket_id = TicketId::random();
        self.retrier
            .run("join", move || async move {
                let request = TicketAllocation {
                    ticket_id,
                    queue_id: *queue_id,
                    user_id: *user_id,
                    created_at: self.clock.utc(),
                };
                settle(
                    bounded(
                        self.call_timeout,
                        "allocate_ticket",
                        self.store.allocate_ticket(&request),
                    )
                    .await,
                )
            })
            .await
    }

    /// Apply `action` to a ticket, re-validating after every lost race.
    pub async fn transition(&self, ticket_id: &TicketId, action: &TicketAction) -> Result<Ticket, Error> {
        self.retrier
            .run(action.name(), move || async move {
                let ticket = match self.load_ticket(ticket_id).await {
                    Ok(ticket) => ticket,
                    Err(error) => return AttemptOutcome::Failed(error),
                };
                let plan = match action.plan(&ticket, self.clock.utc()) {
                    Ok(plan) => plan,
                    Err(error) => return AttemptOutcome::Failed(transition_rejected(&ticket, error)),
                };
                settle(
                    bounded(
                        self.call_timeout,
                        "compare_and_set_status",
                        self.store
                            .compare_and_set_status(ticket_id, plan.expected, &plan.change),
                    )
                    .await,
                )
            })
            .await
    }

    /// Call the lowest-numbered active ticket of a queue.
    pub async fn call_next(&self, queue_id: &QueueId) -> Result<Ticket, Error> {
        self.retrier
            .run("call_next", move || async move {
                let outstanding = match self.list_outstanding(queue_id).await {
                    Ok(tickets) => tickets,
                    Err(error) => return AttemptOutcome::Failed(error),
                };
                let Some(next) = outstanding
                    .iter()
                    .filter(|ticket| ticket.status() == TicketStatus::Active)
                    .min_by_key(|ticket| ticket.number())
                else {
                    return AttemptOutcome::Failed(Error::not_found(format!(
                        "queue {queue_id} has no waiting tickets"
                    )));
                };
                let plan = match TicketAction::Call.plan(next, self.clock.utc()) {
                    Ok(plan) => plan,
                    Err(error) => return AttemptOutcome::Failed(transition_rejected(next, error)),
                };
                settle(
                    bounded(
                        self.call_timeout,
                        "compare_and_set_status",
                        self.store
                            .compare_and_set_status(next.id(), plan.expected, &plan.change),
                    )
                    .await,
                )
            })
            .await
    }

    /// Flip a queue between open and closed. Opening is checked against
    /// the place's limit.
    pub async fn toggle_open(&self, queue_id: &QueueId, place: &Place) -> Result<Queue, Error> {
        let limit = place.max_concurrent_queues();
        self.retrier
            .run("toggle_open", move || async move {
                settle(
                    bounded(
                        self.call_timeout,
                        "toggle_queue_open",
                        self.store
                            .toggle_queue_open(queue_id, limit, self.clock.utc()),
                    )
                    .await,
                )
            })
            .await
    }
}

#[cfg(test)]
#[path = "queue_engine_tests.rs"]
mod tests;
