//! Concurrency properties of the admission facade on the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use rstest::{fixture, rstest};

use smartqueue::domain::ports::{FixtureEventPublisher, FixtureNotificationSink, QueueCommand, QueueQuery};
use smartqueue::domain::{
    AdmissionService, AdmissionSettings, Caller, PlaceDraft, PlaceId, QueueId, QueueTarget,
    RetryPolicy, TicketStatus, UserId,
};
use smartqueue::outbound::InMemoryTicketStore;

struct Desk {
    service: Arc<AdmissionService>,
    admin: Caller,
    queue_id: QueueId,
}

#[fixture]
async fn desk() -> Desk {
    let settings = AdmissionSettings {
        retry: RetryPolicy {
            max_attempts: 16,
            ..RetryPolicy::default()
        },
        ..AdmissionSettings::default()
    };
    let service = AdmissionService::new(
        Arc::new(InMemoryTicketStore::new()),
        Arc::new(FixtureEventPublisher),
        Arc::new(FixtureNotificationSink),
        Arc::new(mockable::DefaultClock),
        settings,
    );
    let owner = UserId::random();
    let admin = Caller::place_admin(owner);
    let place = service
        .register_place(
            &admin,
            PlaceDraft {
                id: PlaceId::random(),
                owner_id: owner,
                name: "Bank".to_owned(),
                address: "5 Quay Street".to_owned(),
                latitude: 53.3,
                longitude: -6.2,
                opening_time: None,
                closing_time: None,
                max_concurrent_queues: 1,
                created_at: Utc::now(),
            },
        )
        .await
        .expect("place registered");
    let queue = service
        .create_queue(&admin, place.id(), "Tellers")
        .await
        .expect("queue created");
    Desk {
        service: Arc::new(service),
        admin,
        queue_id: *queue.id(),
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_get_contiguous_numbers(#[future] desk: Desk) {
    let desk = desk.await;
    let joins = 100_u32;
    let handles: Vec<_> = (0..joins)
        .map(|_| {
            let service = Arc::clone(&desk.service);
            let target = QueueTarget::Queue(desk.queue_id);
            tokio::spawn(async move {
                service
                    .join(&Caller::customer(UserId::random()), target)
                    .await
                    .map(|ticket| ticket.number())
            })
        })
        .collect();

    let mut numbers = BTreeSet::new();
    for handle in handles {
        let number = handle.await.expect("task joined").expect("join succeeds");
        assert!(numbers.insert(number), "number {number} issued twice");
    }
    assert_eq!(numbers, (1..=joins).collect::<BTreeSet<_>>());

    let stats = desk
        .service
        .queue_statistics(&desk.admin, &desk.queue_id)
        .await
        .expect("statistics");
    assert_eq!(stats.last_ticket_number, joins);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_operators_call_distinct_tickets(#[future] desk: Desk) {
    let desk = desk.await;
    for _ in 0..6 {
        desk.service
            .join(&Caller::customer(UserId::random()), QueueTarget::Queue(desk.queue_id))
            .await
            .expect("join succeeds");
    }

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let service = Arc::clone(&desk.service);
            let admin = desk.admin;
            let queue_id = desk.queue_id;
            tokio::spawn(async move {
                service
                    .call_next(&admin, &queue_id)
                    .await
                    .map(|ticket| ticket.number())
            })
        })
        .collect();

    let mut called = BTreeSet::new();
    for handle in handles {
        let number = handle.await.expect("task joined").expect("call succeeds");
        assert!(called.insert(number), "ticket {number} called twice");
    }
    assert_eq!(called.len(), 6);

    let status = desk
        .service
        .queue_status(&desk.admin, QueueTarget::Queue(desk.queue_id))
        .await
        .expect("status");
    assert!(status.waiting.is_empty());
    assert!(status.serving.iter().all(|t| t.status == TicketStatus::Called));
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_user_racing_joins_holds_one_ticket(#[future] desk: Desk) {
    let desk = desk.await;
    let user = UserId::random();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&desk.service);
            let target = QueueTarget::Queue(desk.queue_id);
            tokio::spawn(async move { service.join(&Caller::customer(user), target).await })
        })
        .collect();

    let mut issued = 0;
    for handle in handles {
        match handle.await.expect("task joined") {
            Ok(_) => issued += 1,
            Err(error) => assert_eq!(error.code().as_str(), "duplicate_active_ticket"),
        }
    }
    assert_eq!(issued, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_all_count(#[future] desk: Desk) {
    let desk = desk.await;
    let served = 12_u32;
    let mut called = Vec::new();
    for _ in 0..served {
        desk.service
            .join(&Caller::customer(UserId::random()), QueueTarget::Queue(desk.queue_id))
            .await
            .expect("join succeeds");
        let ticket = desk
            .service
            .call_next(&desk.admin, &desk.queue_id)
            .await
            .expect("call succeeds");
        called.push(*ticket.id());
    }

    let handles: Vec<_> = called
        .into_iter()
        .map(|ticket_id| {
            let service = Arc::clone(&desk.service);
            let admin = desk.admin;
            tokio::spawn(async move { service.complete(&admin, &ticket_id).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("task joined").expect("complete succeeds");
    }

    let stats = desk
        .service
        .queue_statistics(&desk.admin, &desk.queue_id)
        .await
        .expect("statistics");
    assert_eq!(stats.processed_count, served);
    assert_eq!(stats.total_tickets, served);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_toggles_flip_once_each(#[future] desk: Desk) {
    let desk = desk.await;
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let service = Arc::clone(&desk.service);
            let admin = desk.admin;
            let queue_id = desk.queue_id;
            tokio::spawn(async move {
                service
                    .toggle_open(&admin, &queue_id)
                    .await
                    .map(|queue| queue.is_open())
            })
        })
        .collect();

    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.expect("task joined").expect("toggle succeeds"));
    }
    assert_eq!(states.iter().filter(|open| **open).count(), 2);

    let status = desk
        .service
        .queue_status(&desk.admin, QueueTarget::Queue(desk.queue_id))
        .await
        .expect("status");
    assert!(status.queue.is_open);
}
