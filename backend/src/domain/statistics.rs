//! Queue statistics recomputed from the ticket set.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tracing::debug;

use super::Error;
use super::ids::QueueId;
use super::ports::TicketStore;
use super::queue::{Queue, QueueStatistics};
use super::store_access::{bounded, map_store_error};
use super::ticket::{Ticket, TicketStatus};

/// Derive a queue's statistics from every ticket it issued.
///
/// A wait sample is `called_at - created_at` of a used ticket. Negative
/// samples are skipped rather than clamped.
///
/// # Examples
/// ```
/// use smartqueue::domain::{QueueStatistics, compute_statistics};
///
/// assert_eq!(compute_statistics(&[]), QueueStatistics::default());
/// ```
pub fn compute_statistics(tickets: &[Ticket]) -> QueueStatistics {
    let total_tickets = u32::try_from(tickets.len()).unwrap_or(u32::MAX);
    let used = tickets
        .iter()
        .filter(|ticket| ticket.status() == TicketStatus::Used);

    let mut processed_count = 0_u32;
    let mut samples = 0_i32;
    let mut total_wait = TimeDelta::zero();
    for ticket in used {
        processed_count = processed_count.saturating_add(1);
        let Some(called_at) = ticket.called_at() else {
            continue;
        };
        let wait = called_at - ticket.created_at();
        if wait < TimeDelta::zero() {
            continue;
        }
        if let Some(sum) = total_wait.checked_add(&wait) {
            total_wait = sum;
            samples = samples.saturating_add(1);
        }
    }

    let average_wait_time = if samples == 0 {
        TimeDelta::zero()
    } else {
        total_wait / samples
    };

    QueueStatistics {
        processed_count,
        total_tickets,
        average_wait_time,
    }
}

/// Refreshes a queue's persisted statistics after each ticket mutation.
///
/// The store computes and writes under the queue's critical section, so
/// concurrent refreshes cannot overwrite each other with stale counts.
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: Arc<dyn TicketStore>,
    call_timeout: Duration,
}

impl StatisticsAggregator {
    /// Build an aggregator whose store calls are bounded by `call_timeout`.
    pub fn new(store: Arc<dyn TicketStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Recompute from the queue's current tickets and return the stored queue.
    pub async fn recompute(&self, queue_id: &QueueId) -> Result<Queue, Error> {
        let queue = bounded(
            self.call_timeout,
            "refresh_queue_statistics",
            self.store.refresh_queue_statistics(queue_id),
        )
        .await
        .map_err(map_store_error)?;

        let statistics = queue.statistics();
        debug!(
            queue_id = %queue_id,
            processed = statistics.processed_count,
            total = statistics.total_tickets,
            "queue statistics refreshed"
        );
        Ok(queue)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ids::{PlaceId, QueueId, TicketId, UserId};
    use crate::domain::ports::{MockTicketStore, TicketStoreError};
    use crate::domain::ticket::TicketDraft;
    use crate::domain::ErrorCode;

    #[fixture]
    fn opened() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 9, 0, 0).single().expect("valid time")
    }

    fn ticket(
        queue_id: QueueId,
        number: u32,
        status: TicketStatus,
        created_at: DateTime<Utc>,
        called_at: Option<DateTime<Utc>>,
    ) -> Ticket {
        let completed_at = status
            .is_terminal()
            .then(|| called_at.unwrap_or(created_at) + TimeDelta::minutes(1));
        Ticket::new(TicketDraft {
            id: TicketId::random(),
            queue_id,
            user_id: UserId::random(),
            number,
            status,
            cancel_reason: None,
            created_at,
            called_at,
            completed_at,
        })
        .expect("valid ticket")
    }

    #[rstest]
    fn averages_used_ticket_waits(opened: DateTime<Utc>) {
        let queue_id = QueueId::random();
        let tickets = vec![
            ticket(queue_id, 1, TicketStatus::Used, opened, Some(opened + TimeDelta::minutes(4))),
            ticket(queue_id, 2, TicketStatus::Used, opened, Some(opened + TimeDelta::minutes(8))),
            ticket(queue_id, 3, TicketStatus::Canceled, opened, Some(opened + TimeDelta::minutes(1))),
            ticket(queue_id, 5, TicketStatus::Used, opened, None),
            ticket(queue_id, 4, TicketStatus::Active, opened, None),
        ];

        let stats = compute_statistics(&tickets);
        assert_eq!(stats.processed_count, 3);
        assert_eq!(stats.total_tickets, 5);
        assert_eq!(stats.average_wait_time, TimeDelta::minutes(6));
    }

    #[rstest]
    fn negative_waits_are_excluded_from_mean(opened: DateTime<Utc>) {
        let queue_id = QueueId::random();
        let tickets = vec![
            ticket(queue_id, 1, TicketStatus::Used, opened, Some(opened - TimeDelta::minutes(30))),
            ticket(queue_id, 2, TicketStatus::Used, opened, Some(opened + TimeDelta::minutes(2))),
        ];

        let stats = compute_statistics(&tickets);
        assert_eq!(stats.processed_count, 2);
        assert_eq!(stats.average_wait_time, TimeDelta::minutes(2));
    }

    #[rstest]
    fn no_used_tickets_means_zero_average(opened: DateTime<Utc>) {
        let queue_id = QueueId::random();
        let tickets = vec![ticket(queue_id, 1, TicketStatus::Active, opened, None)];
        let stats = compute_statistics(&tickets);
        assert_eq!(stats.processed_count, 0);
        assert_eq!(stats.average_wait_time, TimeDelta::zero());
    }

    #[rstest]
    #[tokio::test]
    async fn recompute_returns_the_refreshed_queue(opened: DateTime<Utc>) {
        let queue_id = QueueId::random();
        let listed = vec![ticket(queue_id, 1, TicketStatus::Active, opened, None)];
        let refreshed = Queue::open(queue_id, PlaceId::random(), "Main", opened)
            .with_statistics(compute_statistics(&listed));
        let expected = refreshed.clone();

        let mut store = MockTicketStore::new();
        store
            .expect_refresh_queue_statistics()
            .withf(move |id| id == &queue_id)
            .times(1)
            .return_once(move |_| Ok(refreshed));
        store.expect_list_queue_tickets().never();

        let aggregator = StatisticsAggregator::new(Arc::new(store), Duration::from_secs(1));
        let updated = aggregator.recompute(&queue_id).await.expect("recompute succeeds");
        assert_eq!(updated, expected);
        assert_eq!(updated.statistics().total_tickets, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn recompute_surfaces_store_outage() {
        let mut store = MockTicketStore::new();
        store
            .expect_refresh_queue_statistics()
            .return_once(|_| Err(TicketStoreError::connection("pool exhausted")));

        let aggregator = StatisticsAggregator::new(Arc::new(store), Duration::from_secs(1));
        let err = aggregator
            .recompute(&QueueId::random())
            .await
            .expect_err("outage surfaces");
        assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    }
}
