//! In-process `TicketStore` for single-node deployments and tests.
//!
//! Each queue lives in its own shard behind an async mutex, so numbering,
//! duplicate detection and status changes for one queue are serialised while
//! different queues proceed in parallel.
//!
//! Lock order: `queues_by_place`, then a shard, then `ticket_index`. Map
//! guards over `shards` are dropped before a shard mutex is awaited.
//!
//! Writers acquire every lock they need before the first mutation, so a
//! future dropped mid-call leaves no partial state behind.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::domain::ports::{TicketAllocation, TicketStore, TicketStoreError};
use crate::domain::{
    Place, PlaceId, Queue, QueueId, Ticket, TicketChange, TicketId, TicketStatus,
    compute_statistics,
};

#[derive(Debug)]
struct QueueShard {
    queue: Queue,
    tickets: BTreeMap<u32, Ticket>,
    numbers: HashMap<TicketId, u32>,
}

impl QueueShard {
    fn new(queue: Queue) -> Self {
        Self {
            queue,
            tickets: BTreeMap::new(),
            numbers: HashMap::new(),
        }
    }
}

type SharedShard = Arc<Mutex<QueueShard>>;

/// Ticket store holding all state in memory.
#[derive(Debug, Default)]
pub struct InMemoryTicketStore {
    places: RwLock<HashMap<PlaceId, Place>>,
    queues_by_place: RwLock<HashMap<PlaceId, Vec<QueueId>>>,
    shards: RwLock<HashMap<QueueId, SharedShard>>,
    ticket_index: RwLock<HashMap<TicketId, QueueId>>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn shard(&self, queue_id: &QueueId) -> Result<SharedShard, TicketStoreError> {
        self.shards
            .read()
            .await
            .get(queue_id)
            .cloned()
            .ok_or_else(|| TicketStoreError::queue_not_found(*queue_id))
    }

    async fn shard_for_ticket(&self, ticket_id: &TicketId) -> Option<SharedShard> {
        let queue_id = self.ticket_index.read().await.get(ticket_id).copied()?;
        self.shard(&queue_id).await.ok()
    }

    /// Open queues among `queue_ids`, skipping `exclude`.
    async fn count_open(&self, queue_ids: &[QueueId], exclude: Option<&QueueId>) -> u32 {
        let mut open = 0;
        for queue_id in queue_ids.iter().filter(|id| Some(*id) != exclude) {
            if let Ok(shard) = self.shard(queue_id).await
                && shard.lock().await.queue.is_open()
            {
                open += 1;
            }
        }
        open
    }

    async fn queues_of(&self, queue_ids: &[QueueId]) -> Vec<Queue> {
        let mut queues = Vec::with_capacity(queue_ids.len());
        for queue_id in queue_ids {
            if let Ok(shard) = self.shard(queue_id).await {
                queues.push(shard.lock().await.queue.clone());
            }
        }
        queues
    }

    async fn tickets_where(
        &self,
        queue_id: &QueueId,
        keep: impl Fn(&Ticket) -> bool,
    ) -> Result<Vec<Ticket>, TicketStoreError> {
        let shard = self.shard(queue_id).await?;
        let guard = shard.lock().await;
        Ok(guard
            .tickets
            .values()
            .filter(|ticket| keep(ticket))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert_place(&self, place: &Place) -> Result<(), TicketStoreError> {
        let mut places = self.places.write().await;
        if places.contains_key(place.id()) {
            return Err(TicketStoreError::query(format!(
                "place {} already exists",
                place.id()
            )));
        }
        places.insert(*place.id(), place.clone());
        Ok(())
    }

    async fn find_place(&self, place_id: &PlaceId) -> Result<Option<Place>, TicketStoreError> {
        Ok(self.places.read().await.get(place_id).cloned())
    }

    async fn insert_queue(&self, queue: &Queue, max_open_queues: u32) -> Result<(), TicketStoreError> {
        let place_id = *queue.place_id();
        if !self.places.read().await.contains_key(&place_id) {
            return Err(TicketStoreError::place_not_found(place_id));
        }

        let mut by_place = self.queues_by_place.write().await;
        let siblings = by_place.entry(place_id).or_default();
        if queue.is_open() && self.count_open(siblings, None).await >= max_open_queues {
            return Err(TicketStoreError::queue_limit_reached(place_id, max_open_queues));
        }

        let shard = Arc::new(Mutex::new(QueueShard::new(queue.clone())));
        self.shards.write().await.insert(*queue.id(), shard);
        siblings.push(*queue.id());
        Ok(())
    }

    async fn find_queue(&self, queue_id: &QueueId) -> Result<Option<Queue>, TicketStoreError> {
        match self.shard(queue_id).await {
            Ok(shard) => Ok(Some(shard.lock().await.queue.clone())),
            Err(_) => Ok(None),
        }
    }

    async fn latest_queue_for_place(
        &self,
        place_id: &PlaceId,
        open_only: bool,
    ) -> Result<Option<Queue>, TicketStoreError> {
        let by_place = self.queues_by_place.read().await;
        let Some(queue_ids) = by_place.get(place_id) else {
            return Ok(None);
        };
        Ok(self
            .queues_of(queue_ids)
            .await
            .into_iter()
            .rev()
            .find(|queue| !open_only || queue.is_open()))
    }

    async fn list_queues_for_place(&self, place_id: &PlaceId) -> Result<Vec<Queue>, TicketStoreError> {
        let by_place = self.queues_by_place.read().await;
        match by_place.get(place_id) {
            Some(queue_ids) => Ok(self.queues_of(queue_ids).await),
            None => Ok(Vec::new()),
        }
    }

    async fn toggle_queue_open(
        &self,
        queue_id: &QueueId,
        max_open_queues: u32,
        now: DateTime<Utc>,
    ) -> Result<Queue, TicketStoreError> {
        let shard = self.shard(queue_id).await?;
        let place_id = *shard.lock().await.queue.place_id();

        // Open flags only change under this write guard.
        let by_place = self.queues_by_place.write().await;
        let siblings = by_place.get(&place_id).map(Vec::as_slice).unwrap_or_default();
        let others_open = self.count_open(siblings, Some(queue_id)).await;

        let mut guard = shard.lock().await;
        let opening = !guard.queue.is_open();
        if opening && others_open >= max_open_queues {
            return Err(TicketStoreError::queue_limit_reached(place_id, max_open_queues));
        }
        guard.queue = guard.queue.clone().with_open_flag(opening, now);
        Ok(guard.queue.clone())
    }

    async fn refresh_queue_statistics(&self, queue_id: &QueueId) -> Result<Queue, TicketStoreError> {
        let shard = self.shard(queue_id).await?;
        let mut guard = shard.lock().await;
        let tickets: Vec<Ticket> = guard.tickets.values().cloned().collect();
        let statistics = compute_statistics(&tickets);
        guard.queue = guard.queue.clone().with_statistics(statistics);
        Ok(guard.queue.clone())
    }

    async fn allocate_ticket(&self, request: &TicketAllocation) -> Result<Ticket, TicketStoreError> {
        let shard = self.shard(&request.queue_id).await?;
        let mut guard = shard.lock().await;

        if !guard.queue.is_open() {
            return Err(TicketStoreError::queue_closed(request.queue_id));
        }
        let holds_ticket = guard
            .tickets
            .values()
            .any(|ticket| ticket.user_id() == &request.user_id && ticket.status().is_outstanding());
        if holds_ticket {
            return Err(TicketStoreError::duplicate_active_ticket(
                request.queue_id,
                request.user_id,
            ));
        }

        let number = guard
            .queue
            .last_ticket_number()
            .checked_add(1)
            .ok_or_else(|| TicketStoreError::query("ticket numbers exhausted"))?;
        let ticket = Ticket::issue(
            request.ticket_id,
            request.queue_id,
            request.user_id,
            number,
            request.created_at,
        )
        .map_err(|err| TicketStoreError::query(err.to_string()))?;

        // Last await point: nothing below may suspend.
        let mut index = self.ticket_index.write().await;
        guard.queue = guard.queue.clone().with_issued_number(number);
        guard.tickets.insert(number, ticket.clone());
        guard.numbers.insert(request.ticket_id, number);
        index.insert(request.ticket_id, request.queue_id);
        Ok(ticket)
    }

    async fn compare_and_set_status(
        &self,
        ticket_id: &TicketId,
        expected: &[TicketStatus],
        change: &TicketChange,
    ) -> Result<Ticket, TicketStoreError> {
        let not_found = || TicketStoreError::ticket_not_found(*ticket_id);
        let shard = self.shard_for_ticket(ticket_id).await.ok_or_else(not_found)?;
        let mut guard = shard.lock().await;
        let number = guard.numbers.get(ticket_id).copied().ok_or_else(not_found)?;
        let current = guard.tickets.get(&number).ok_or_else(not_found)?;

        if !expected.contains(&current.status()) {
            return Err(TicketStoreError::stale_state(*ticket_id, current.status()));
        }
        let updated = current.apply(change);
        guard.tickets.insert(number, updated.clone());
        Ok(updated)
    }

    async fn find_ticket(&self, ticket_id: &TicketId) -> Result<Option<Ticket>, TicketStoreError> {
        let Some(shard) = self.shard_for_ticket(ticket_id).await else {
            return Ok(None);
        };
        let guard = shard.lock().await;
        Ok(guard
            .numbers
            .get(ticket_id)
            .and_then(|number| guard.tickets.get(number))
            .cloned())
    }

    async fn list_outstanding_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, TicketStoreError> {
        self.tickets_where(queue_id, |ticket| ticket.status().is_outstanding())
            .await
    }

    async fn list_queue_tickets(&self, queue_id: &QueueId) -> Result<Vec<Ticket>, TicketStoreError> {
        self.tickets_where(queue_id, |_| true).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::{PlaceDraft, UserId};

    fn place(limit: u32) -> Place {
        Place::new(PlaceDraft {
            id: PlaceId::random(),
            owner_id: UserId::random(),
            name: "Clinic".to_owned(),
            address: "1 High Street".to_owned(),
            latitude: 51.5,
            longitude: -0.1,
            opening_time: None,
            closing_time: None,
            max_concurrent_queues: limit,
            created_at: Utc::now(),
        })
        .expect("valid place")
    }

    fn allocation(queue_id: QueueId, user_id: UserId) -> TicketAllocation {
        TicketAllocation {
            ticket_id: TicketId::random(),
            queue_id,
            user_id,
            created_at: Utc::now(),
        }
    }

    struct Seeded {
        store: Arc<InMemoryTicketStore>,
        place: Place,
        queue: Queue,
    }

    #[fixture]
    async fn seeded() -> Seeded {
        let store = Arc::new(InMemoryTicketStore::new());
        let place = place(1);
        store.insert_place(&place).await.expect("place stored");
        let queue = Queue::open(QueueId::random(), *place.id(), "Main", Utc::now());
        store.insert_queue(&queue, 1).await.expect("queue stored");
        Seeded { store, place, queue }
    }

    #[rstest]
    #[tokio::test]
    async fn numbers_are_sequential_per_queue(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        for expected in 1..=3 {
            let ticket = store
                .allocate_ticket(&allocation(*queue.id(), UserId::random()))
                .await
                .expect("allocated");
            assert_eq!(ticket.number(), expected);
        }
        let stored = store.find_queue(queue.id()).await.expect("read").expect("exists");
        assert_eq!(stored.last_ticket_number(), 3);
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_never_share_a_number(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let joins = 64_u32;
        let handles: Vec<_> = (0..joins)
            .map(|_| {
                let store = Arc::clone(&store);
                let queue_id = *queue.id();
                tokio::spawn(async move {
                    store
                        .allocate_ticket(&allocation(queue_id, UserId::random()))
                        .await
                        .map(|ticket| ticket.number())
                })
            })
            .collect();

        let mut numbers = BTreeSet::new();
        for handle in handles {
            let number = handle.await.expect("task joined").expect("allocated");
            assert!(numbers.insert(number), "number {number} issued twice");
        }
        assert_eq!(numbers, (1..=joins).collect::<BTreeSet<_>>());
    }

    #[rstest]
    #[tokio::test]
    async fn second_outstanding_ticket_is_rejected(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let user = UserId::random();
        store
            .allocate_ticket(&allocation(*queue.id(), user))
            .await
            .expect("first ticket");

        let err = store
            .allocate_ticket(&allocation(*queue.id(), user))
            .await
            .expect_err("duplicate");
        assert_eq!(err.kind(), "duplicate_active_ticket");
    }

    #[rstest]
    #[tokio::test]
    async fn user_may_rejoin_after_leaving(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let user = UserId::random();
        let first = store
            .allocate_ticket(&allocation(*queue.id(), user))
            .await
            .expect("first ticket");
        let change = TicketChange {
            completed_at: crate::domain::FieldUpdate::Set(Utc::now()),
            ..TicketChange::status_only(TicketStatus::Canceled)
        };
        store
            .compare_and_set_status(first.id(), &TicketStatus::OUTSTANDING, &change)
            .await
            .expect("canceled");

        let second = store
            .allocate_ticket(&allocation(*queue.id(), user))
            .await
            .expect("second ticket");
        assert_eq!(second.number(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn closed_queue_rejects_joins(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        store
            .toggle_queue_open(queue.id(), 1, Utc::now())
            .await
            .expect("closed");

        let err = store
            .allocate_ticket(&allocation(*queue.id(), UserId::random()))
            .await
            .expect_err("closed queue");
        assert_eq!(err.kind(), "queue_closed");
    }

    #[rstest]
    #[tokio::test]
    async fn compare_and_set_reports_actual_status(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let ticket = store
            .allocate_ticket(&allocation(*queue.id(), UserId::random()))
            .await
            .expect("allocated");

        let err = store
            .compare_and_set_status(
                ticket.id(),
                &[TicketStatus::Called],
                &TicketChange::status_only(TicketStatus::Used),
            )
            .await
            .expect_err("status moved");
        assert!(matches!(
            err,
            TicketStoreError::StaleState { actual: TicketStatus::Active, .. }
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn open_queue_limit_is_enforced(#[future] seeded: Seeded) {
        let Seeded { store, place, queue } = seeded.await;
        let second = Queue::open(QueueId::random(), *place.id(), "Overflow", Utc::now());
        let err = store.insert_queue(&second, 1).await.expect_err("limit");
        assert_eq!(err.kind(), "queue_limit_reached");

        store
            .toggle_queue_open(queue.id(), 1, Utc::now())
            .await
            .expect("closed");
        store.insert_queue(&second, 1).await.expect("room after closing");

        let err = store
            .toggle_queue_open(queue.id(), 1, Utc::now())
            .await
            .expect_err("reopening exceeds limit");
        assert_eq!(err.kind(), "queue_limit_reached");
    }

    #[rstest]
    #[tokio::test]
    async fn latest_queue_prefers_newest(#[future] seeded: Seeded) {
        let Seeded { store, place, queue } = seeded.await;
        store
            .toggle_queue_open(queue.id(), 2, Utc::now())
            .await
            .expect("closed");
        let newer = Queue::open(QueueId::random(), *place.id(), "Afternoon", Utc::now())
            .with_open_flag(false, Utc::now());
        store.insert_queue(&newer, 2).await.expect("stored");

        let latest = store
            .latest_queue_for_place(place.id(), false)
            .await
            .expect("read");
        assert_eq!(latest.map(|q| *q.id()), Some(*newer.id()));

        let open = store
            .latest_queue_for_place(place.id(), true)
            .await
            .expect("read");
        assert!(open.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_ticket_is_reported_missing(#[future] seeded: Seeded) {
        let Seeded { store, .. } = seeded.await;
        let ticket_id = TicketId::random();
        assert!(store.find_ticket(&ticket_id).await.expect("read").is_none());
        let err = store
            .compare_and_set_status(
                &ticket_id,
                &TicketStatus::OUTSTANDING,
                &TicketChange::status_only(TicketStatus::Called),
            )
            .await
            .expect_err("missing");
        assert_eq!(err.kind(), "ticket_not_found");
    }

    #[rstest]
    #[tokio::test]
    async fn dropped_allocation_leaves_no_trace(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let user = UserId::random();
        let request = allocation(*queue.id(), user);

        let reader = store.ticket_index.read().await;
        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            store.allocate_ticket(&request),
        )
        .await;
        assert!(outcome.is_err(), "allocation should still be parked");
        drop(reader);

        assert!(store.find_ticket(&request.ticket_id).await.expect("read").is_none());
        let stored = store.find_queue(queue.id()).await.expect("read").expect("exists");
        assert_eq!(stored.last_ticket_number(), 0);
        assert!(store.list_queue_tickets(queue.id()).await.expect("read").is_empty());

        let ticket = store
            .allocate_ticket(&allocation(*queue.id(), user))
            .await
            .expect("rejoin succeeds");
        assert_eq!(ticket.number(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn refresh_reads_tickets_under_the_shard_lock(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let used = TicketChange {
            completed_at: crate::domain::FieldUpdate::Set(Utc::now()),
            ..TicketChange::status_only(TicketStatus::Used)
        };
        for _ in 0..2 {
            let ticket = store
                .allocate_ticket(&allocation(*queue.id(), UserId::random()))
                .await
                .expect("allocated");
            store
                .compare_and_set_status(ticket.id(), &TicketStatus::OUTSTANDING, &used)
                .await
                .expect("used");
        }
        store
            .allocate_ticket(&allocation(*queue.id(), UserId::random()))
            .await
            .expect("allocated");

        let refreshed = store.refresh_queue_statistics(queue.id()).await.expect("refreshed");
        assert_eq!(refreshed.statistics().processed_count, 2);
        assert_eq!(refreshed.statistics().total_tickets, 3);
        let stored = store.find_queue(queue.id()).await.expect("read").expect("exists");
        assert_eq!(stored.statistics(), refreshed.statistics());
    }

    #[rstest]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_each_flip_once(#[future] seeded: Seeded) {
        let Seeded { store, queue, .. } = seeded.await;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let queue_id = *queue.id();
                tokio::spawn(async move {
                    store
                        .toggle_queue_open(&queue_id, 1, Utc::now())
                        .await
                        .map(|queue| queue.is_open())
                })
            })
            .collect();

        let mut opened = 0;
        for handle in handles {
            if handle.await.expect("task joined").expect("toggled") {
                opened += 1;
            }
        }
        assert_eq!(opened, 2);
        let stored = store.find_queue(queue.id()).await.expect("read").expect("exists");
        assert!(stored.is_open());
    }
}
