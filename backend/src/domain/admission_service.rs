//! Admission facade: the single entry point inbound adapters call.
//!
//! Each operation runs the same pipeline:
//! 1. resolve the resource and authorise the caller against the capability
//!    table (no state changes on denial);
//! 2. run the transition through the [`QueueEngine`];
//! 3. recompute the queue's statistics from its tickets;
//! 4. publish the event and send notifications.
//!
//! Steps 3 and 4 run after the store committed. Their failures are logged
//! and never undo the committed mutation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{info, instrument, warn};

use super::access::{AccessDenied, Caller, Capability, Resource, Role, authorize};
use super::analytics::{PlaceAnalytics, compute_place_analytics};
use super::events::{QueueEvent, QueueEventKind, QueueSnapshot, TicketSnapshot};
use super::fanout::EventFanout;
use super::ids::{PlaceId, QueueId, TicketId};
use super::notifications::Notification;
use super::place::{Place, PlaceDraft};
use super::ports::{
    EventPublisher, NotificationSink, QueueCommand, QueueQuery, QueueStatusView, TicketPositionView,
    TicketStore,
};
use super::queue::{Queue, QueueTarget};
use super::queue_engine::QueueEngine;
use super::retry::{Retrier, RetryPolicy};
use super::state_machine::TicketAction;
use super::statistics::StatisticsAggregator;
use super::ticket::{Ticket, TicketStatus};
use super::{EngineResult, Error};

/// Tunables for the facade's store interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSettings {
    pub retry: RetryPolicy,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            store_timeout: Duration::from_secs(5),
        }
    }
}

fn denied(error: AccessDenied) -> Error {
    Error::unauthorized(error.to_string())
}

/// Facade implementing [`QueueCommand`] and [`QueueQuery`].
#[derive(Clone)]
pub struct AdmissionService {
    engine: QueueEngine,
    statistics: StatisticsAggregator,
    fanout: EventFanout,
    clock: Arc<dyn Clock>,
}

impl AdmissionService {
    /// Wire the facade with Tokio-backed retry sleeping.
    pub fn new(
        store: Arc<dyn TicketStore>,
        publisher: Arc<dyn EventPublisher>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: AdmissionSettings,
    ) -> Self {
        let retrier = Retrier::with_policy(settings.retry, Arc::clone(&clock));
        Self::with_retrier(store, publisher, notifications, clock, retrier, settings.store_timeout)
    }

    /// Wire the facade with an explicit retrier.
    pub fn with_retrier(
        store: Arc<dyn TicketStore>,
        publisher: Arc<dyn EventPublisher>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        retrier: Retrier,
        store_timeout: Duration,
    ) -> Self {
        Self {
            engine: QueueEngine::new(Arc::clone(&store), Arc::clone(&clock), retrier, store_timeout),
            statistics: StatisticsAggregator::new(store, store_timeout),
            fanout: EventFanout::new(publisher, notifications),
            clock,
        }
    }

    async fn refresh_statistics(&self, queue_id: &QueueId) {
        if let Err(error) = self.statistics.recompute(queue_id).await {
            warn!(queue_id = %queue_id, error = %error, "statistics recompute failed");
        }
    }

    async fn after_ticket_change(&self, kind: QueueEventKind, ticket: &Ticket, queue: &Queue) {
        self.refresh_statistics(queue.id()).await;
        if let Some(event) = QueueEvent::for_ticket(kind, ticket, *queue.place_id()) {
            self.fanout.publish(&event).await;
        }
    }

    async fn load_queue_with_place(&self, queue_id: &QueueId) -> EngineResult<(Queue, Place)> {
        let queue = self.engine.load_queue(queue_id).await?;
        let place = self.engine.load_place(queue.place_id()).await?;
        Ok((queue, place))
    }

    async fn operate(
        &self,
        caller: &Caller,
        ticket_id: &TicketId,
        capability: Capability,
        action: TicketAction,
    ) -> EngineResult<Ticket> {
        let context = self.engine.load_ticket_context(ticket_id).await?;
        authorize(
            caller,
            capability,
            Resource::Ticket {
                holder: context.ticket.user_id(),
                place_owner: context.place.owner_id(),
            },
        )
        .map_err(denied)?;

        let ticket = self.engine.transition(ticket_id, &action).await?;
        info!(
            ticket_id = %ticket.id(),
            number = ticket.number(),
            status = %ticket.status(),
            action = action.name(),
            "ticket transitioned"
        );
        self.after_ticket_change(action.event_kind(), &ticket, &context.queue)
            .await;

        let notification = match action {
            TicketAction::Call => Some(Notification::turn_called(&ticket)),
            TicketAction::Cancel { .. } => Some(Notification::ticket_canceled(&ticket)),
            TicketAction::Requeue | TicketAction::Complete | TicketAction::Leave => None,
        };
        if let Some(notification) = notification {
            self.fanout.notify(&[notification]).await;
        }
        Ok(ticket)
    }
}

#[async_trait]
impl QueueCommand for AdmissionService {
    #[instrument(skip_all, fields(user_id = %caller.user_id(), role = %caller.role()))]
    async fn register_place(&self, caller: &Caller, mut draft: PlaceDraft) -> EngineResult<Place> {
        authorize(caller, Capability::RegisterPlace, Resource::Unscoped).map_err(denied)?;
        if caller.role() == Role::PlaceAdmin {
            draft.owner_id = *caller.user_id();
        }
        draft.created_at = self.clock.utc();

        let place = Place::new(draft).map_err(|err| Error::invalid_request(err.to_string()))?;
        self.engine.register_place(&place).await?;
        info!(place_id = %place.id(), owner_id = %place.owner_id(), "place registered");
        Ok(place)
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), place_id = %place_id))]
    async fn create_queue(&self, caller: &Caller, place_id: &PlaceId, name: &str) -> EngineResult<Queue> {
        let place = self.engine.load_place(place_id).await?;
        authorize(
            caller,
            Capability::OperateQueue,
            Resource::Place {
                owner: place.owner_id(),
            },
        )
        .map_err(denied)?;

        let queue = self.engine.create_queue(&place, name).await?;
        info!(queue_id = %queue.id(), "queue opened");
        self.fanout.publish(&QueueEvent::queue_status(&queue)).await;
        Ok(queue)
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), queue_target = ?target))]
    async fn join(&self, caller: &Caller, target: QueueTarget) -> EngineResult<Ticket> {
        authorize(caller, Capability::JoinQueue, Resource::Unscoped).map_err(denied)?;

        let queue = self.engine.resolve_queue(&target, true).await?;
        let ticket = self.engine.join(queue.id(), caller.user_id()).await?;
        info!(
            ticket_id = %ticket.id(),
            queue_id = %queue.id(),
            number = ticket.number(),
            "ticket issued"
        );
        self.after_ticket_change(QueueEventKind::TicketCreated, &ticket, &queue)
            .await;
        Ok(ticket)
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), ticket_id = %ticket_id))]
    async fn leave(&self, caller: &Caller, ticket_id: &TicketId) -> EngineResult<Ticket> {
        self.operate(caller, ticket_id, Capability::LeaveOwnTicket, TicketAction::Leave)
            .await
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), ticket_id = %ticket_id))]
    async fn call(&self, caller: &Caller, ticket_id: &TicketId) -> EngineResult<Ticket> {
        self.operate(caller, ticket_id, Capability::OperateQueue, TicketAction::Call)
            .await
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), queue_id = %queue_id))]
    async fn call_next(&self, caller: &Caller, queue_id: &QueueId) -> EngineResult<Ticket> {
        let (queue, place) = self.load_queue_with_place(queue_id).await?;
        authorize(
            caller,
            Capability::OperateQueue,
            Resource::Place {
                owner: place.owner_id(),
            },
        )
        .map_err(denied)?;

        let ticket = self.engine.call_next(queue_id).await?;
        info!(ticket_id = %ticket.id(), number = ticket.number(), "next ticket called");
        self.after_ticket_change(QueueEventKind::TicketCalled, &ticket, &queue)
            .await;
        self.fanout.notify(&[Notification::turn_called(&ticket)]).await;
        Ok(ticket)
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), ticket_id = %ticket_id))]
    async fn requeue(&self, caller: &Caller, ticket_id: &TicketId) -> EngineResult<Ticket> {
        self.operate(caller, ticket_id, Capability::OperateQueue, TicketAction::Requeue)
            .await
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), ticket_id = %ticket_id))]
    async fn cancel(&self, caller: &Caller, ticket_id: &TicketId, reason: &str) -> EngineResult<Ticket> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::invalid_request("cancel reason must not be empty"));
        }
        let action = TicketAction::Cancel {
            reason: reason.to_owned(),
        };
        self.operate(caller, ticket_id, Capability::OperateQueue, action)
            .await
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), ticket_id = %ticket_id))]
    async fn complete(&self, caller: &Caller, ticket_id: &TicketId) -> EngineResult<Ticket> {
        self.operate(caller, ticket_id, Capability::OperateQueue, TicketAction::Complete)
            .await
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), queue_id = %queue_id))]
    async fn toggle_open(&self, caller: &Caller, queue_id: &QueueId) -> EngineResult<Queue> {
        let (queue, place) = self.load_queue_with_place(queue_id).await?;
        authorize(
            caller,
            Capability::OperateQueue,
            Resource::Place {
                owner: place.owner_id(),
            },
        )
        .map_err(denied)?;

        let updated = self.engine.toggle_open(queue.id(), &place).await?;
        info!(is_open = updated.is_open(), "queue toggled");
        self.fanout.publish(&QueueEvent::queue_status(&updated)).await;

        match self.engine.list_outstanding(queue_id).await {
            Ok(holders) => {
                let notifications: Vec<Notification> = holders
                    .iter()
                    .map(|ticket| Notification::queue_toggled(&updated, *ticket.user_id()))
                    .collect();
                self.fanout.notify(&notifications).await;
            }
            Err(error) => warn!(error = %error, "could not list ticket holders to notify"),
        }
        Ok(updated)
    }
}

#[async_trait]
impl QueueQuery for AdmissionService {
    #[instrument(skip_all, fields(user_id = %caller.user_id(), queue_target = ?target))]
    async fn queue_status(&self, caller: &Caller, target: QueueTarget) -> EngineResult<QueueStatusView> {
        authorize(caller, Capability::ViewQueue, Resource::Unscoped).map_err(denied)?;

        let queue = self.engine.resolve_queue(&target, false).await?;
        let outstanding = self.engine.list_outstanding(queue.id()).await?;
        let place_id = *queue.place_id();
        let (waiting, serving): (Vec<TicketSnapshot>, Vec<TicketSnapshot>) = outstanding
            .iter()
            .map(|ticket| TicketSnapshot::capture(ticket, place_id))
            .partition(|snapshot| snapshot.status == TicketStatus::Active);

        Ok(QueueStatusView {
            queue: QueueSnapshot::from(&queue),
            next_to_serve: waiting.first().cloned(),
            waiting,
            serving,
        })
    }

    #[instrument(skip_all, fields(queue_id = %queue_id))]
    async fn queue_statistics(&self, caller: &Caller, queue_id: &QueueId) -> EngineResult<QueueSnapshot> {
        authorize(caller, Capability::ViewQueue, Resource::Unscoped).map_err(denied)?;
        let queue = self.engine.load_queue(queue_id).await?;
        Ok(QueueSnapshot::from(&queue))
    }

    #[instrument(skip_all, fields(ticket_id = %ticket_id))]
    async fn ticket_position(&self, caller: &Caller, ticket_id: &TicketId) -> EngineResult<TicketPositionView> {
        authorize(caller, Capability::ViewQueue, Resource::Unscoped).map_err(denied)?;

        let ticket = self.engine.load_ticket(ticket_id).await?;
        let queue = self.engine.load_queue(ticket.queue_id()).await?;
        let ahead = if ticket.status() == TicketStatus::Active {
            let outstanding = self.engine.list_outstanding(ticket.queue_id()).await?;
            let count = outstanding
                .iter()
                .filter(|other| other.status() == TicketStatus::Active && other.number() < ticket.number())
                .count();
            Some(u32::try_from(count).unwrap_or(u32::MAX))
        } else {
            None
        };

        Ok(TicketPositionView {
            ticket: TicketSnapshot::capture(&ticket, *queue.place_id()),
            ahead,
        })
    }

    #[instrument(skip_all, fields(user_id = %caller.user_id(), place_id = %place_id))]
    async fn place_analytics(&self, caller: &Caller, place_id: &PlaceId) -> EngineResult<PlaceAnalytics> {
        let place = self.engine.load_place(place_id).await?;
        authorize(
            caller,
            Capability::ViewAnalytics,
            Resource::Place {
                owner: place.owner_id(),
            },
        )
        .map_err(denied)?;

        let mut tickets = Vec::new();
        for queue in self.engine.list_queues(place_id).await? {
            tickets.extend(self.engine.list_tickets(queue.id()).await?);
        }
        Ok(compute_place_analytics(*place_id, &tickets))
    }
}

#[cfg(test)]
#[path = "admission_service_tests.rs"]
mod tests;
