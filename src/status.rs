use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use uuid::Uuid;

use crate::models::Job;
use crate::store::JobStore;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum StatusEvent {
    Snapshot(Job),
    NotFound,
}

impl StatusEvent {
    /// Renders the event as one server-sent-events frame.
    pub fn to_sse(&self) -> String {
        match self {
            StatusEvent::Snapshot(job) => {
                let data = serde_json::to_string(job).unwrap_or_else(|_| "{}".to_owned());
                format!("data: {data}\n\n")
            }
            StatusEvent::NotFound => "event: error\ndata: Job not found\n\n".to_owned(),
        }
    }
}

struct Poll {
    store: JobStore,
    id: Option<Uuid>,
    ticker: Interval,
}

/// Snapshots the job every `every` until it is terminal or unknown.
///
/// Dropping the stream stops the polling; the job itself is never touched.
pub fn status_stream(
    store: JobStore,
    id: &str,
    every: Duration,
) -> impl Stream<Item = StatusEvent> {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let poll = Poll {
        store,
        id: Uuid::parse_str(id).ok(),
        ticker,
    };

    stream::unfold(Some(poll), |poll| async move {
        let Some(mut poll) = poll else {
            return None;
        };
        poll.ticker.tick().await;

        let Some(job) = poll.id.and_then(|id| poll.store.get(id)) else {
            return Some((StatusEvent::NotFound, None));
        };

        let next = if job.state.is_terminal() { None } else { Some(poll) };
        Some((StatusEvent::Snapshot(job), next))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::State;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn unknown_job_yields_one_not_found() {
        let store = JobStore::new();

        let events: Vec<_> = status_stream(store, &Uuid::new_v4().to_string(), POLL_INTERVAL)
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StatusEvent::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_id_yields_one_not_found() {
        let events: Vec<_> = status_stream(JobStore::new(), "../etc", POLL_INTERVAL)
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StatusEvent::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_job_yields_final_snapshot_only() {
        let store = JobStore::new();
        let job = Job::new("dQw4w9WgXcQ".to_owned());
        let id = job.id;
        store.insert(job);
        store.mark_failed(id, "Server busy".to_owned());

        let events: Vec<_> = status_stream(store, &id.to_string(), POLL_INTERVAL)
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            StatusEvent::Snapshot(job) => assert_eq!(job.state, State::Failed),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn follows_job_until_ready() {
        let store = JobStore::new();
        let job = Job::new("dQw4w9WgXcQ".to_owned());
        let id = job.id;
        store.insert(job);

        let writer = store.clone();
        tokio::spawn(async move {
            writer.mark_processing(id);
            tokio::time::sleep(Duration::from_millis(700)).await;
            writer.report_progress(id, 42.0);
            tokio::time::sleep(Duration::from_millis(700)).await;
            writer.mark_ready(id);
        });

        let events: Vec<_> = status_stream(store, &id.to_string(), POLL_INTERVAL)
            .collect()
            .await;

        let snapshots: Vec<Job> = events
            .into_iter()
            .map(|event| match event {
                StatusEvent::Snapshot(job) => job,
                StatusEvent::NotFound => panic!("job vanished"),
            })
            .collect();

        assert!(snapshots.len() >= 2);
        assert!(snapshots
            .windows(2)
            .all(|pair| pair[0].percentage <= pair[1].percentage));

        let last = snapshots.last().unwrap();
        assert_eq!(last.state, State::Ready);
        assert_eq!(last.percentage, 100.0);
    }

    #[test]
    fn sse_frames() {
        assert_eq!(
            StatusEvent::NotFound.to_sse(),
            "event: error\ndata: Job not found\n\n"
        );

        let frame = StatusEvent::Snapshot(Job::new("dQw4w9WgXcQ".to_owned())).to_sse();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        assert!(frame.contains(r#""status":"pending""#));
    }
}
