//! Per-place analytics aggregated across all of a place's queues.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::Serialize;

use super::ids::PlaceId;
use super::statistics::compute_statistics;
use super::ticket::{Ticket, TicketStatus};

/// Headline counters for a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    /// Tickets issued across every queue.
    pub total_customers: u32,
    pub served: u32,
    pub canceled: u32,
    /// Tickets still active or called.
    pub waiting: u32,
    pub average_wait_seconds: i64,
}

/// Tickets issued during one clock hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hour: DateTime<Utc>,
    pub tickets: u32,
}

/// Summary plus an hourly timeline of ticket issuance, oldest hour first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceAnalytics {
    pub place_id: PlaceId,
    pub summary: AnalyticsSummary,
    pub timeline: Vec<HourlyBucket>,
}

fn count(tickets: &[Ticket], predicate: impl Fn(TicketStatus) -> bool) -> u32 {
    let n = tickets.iter().filter(|t| predicate(t.status())).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn hour_of(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at)
}

/// Aggregate analytics from every ticket issued by a place's queues.
pub fn compute_place_analytics(place_id: PlaceId, tickets: &[Ticket]) -> PlaceAnalytics {
    let stats = compute_statistics(tickets);
    let summary = AnalyticsSummary {
        total_customers: stats.total_tickets,
        served: stats.processed_count,
        canceled: count(tickets, |s| s == TicketStatus::Canceled),
        waiting: count(tickets, TicketStatus::is_outstanding),
        average_wait_seconds: stats.average_wait_time.num_seconds(),
    };

    let mut hours: Vec<DateTime<Utc>> = tickets.iter().map(|t| hour_of(t.created_at())).collect();
    hours.sort_unstable();
    let mut timeline: Vec<HourlyBucket> = Vec::new();
    for hour in hours {
        match timeline.last_mut() {
            Some(bucket) if bucket.hour == hour => bucket.tickets = bucket.tickets.saturating_add(1),
            _ => timeline.push(HourlyBucket { hour, tickets: 1 }),
        }
    }

    PlaceAnalytics {
        place_id,
        summary,
        timeline,
    }
}
