use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};

use crate::aggregate::JobSource;
use crate::dispatch::Dispatcher;
use crate::error::DispatchError;
use crate::store::SettingsStore;
use crate::telegram::Notifier;

/// Drives one poll cycle over every configured subscriber. Ticks overlap-skip
/// via a single-flight guard owned by this instance; subscribers within one
/// tick run strictly one at a time.
pub struct PollScheduler<J, N> {
    dispatcher: Dispatcher<J, N>,
    store: SettingsStore,
    tick_running: AtomicBool,
}

impl<J: JobSource, N: Notifier> PollScheduler<J, N> {
    pub fn new(dispatcher: Dispatcher<J, N>, store: SettingsStore) -> Self {
        Self { dispatcher, store, tick_running: AtomicBool::new(false) }
    }

    /// One scheduled cycle. If the previous tick is still running this one is
    /// skipped outright, never queued.
    pub async fn tick(&self) {
        if self
            .tick_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("poll tick skipped: previous cycle is still running");
            return;
        }

        self.run_cycle().await;
        self.tick_running.store(false, Ordering::SeqCst);
    }

    async fn run_cycle(&self) {
        let subscribers = match self.store.list_configured().await {
            Ok(subscribers) => subscribers,
            Err(err) => {
                error!("poll tick aborted: cannot list subscribers: {err}");
                return;
            }
        };

        info!("poll tick started: subscribers={}", subscribers.len());
        for subscriber in subscribers {
            // One subscriber's failure never blocks the rest of the tick.
            if let Err(err) = self.dispatcher.run(subscriber.chat_id).await {
                error!("polling failed for chat {}: {err}", subscriber.chat_id);
            }
        }
        info!("poll tick finished");
    }

    /// On-demand check for one subscriber, outside the single-flight guard.
    pub async fn poll_now(&self, chat_id: i64) -> Result<usize, DispatchError> {
        self.dispatcher.run(chat_id).await
    }

    /// See `Dispatcher::prime`.
    pub async fn prime(&self, chat_id: i64) {
        self.dispatcher.prime(chat_id).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::dispatch::tests::{StubNotifier, item};
    use crate::error::FeedError;
    use crate::models::JobItem;

    /// Snapshot per category; "broken" fails, everything else sleeps briefly
    /// then returns a fixed feed, counting fetches.
    struct SlowSource {
        fetches: Mutex<usize>,
    }

    impl JobSource for SlowSource {
        async fn fetch_merged(&self, categories: &[String], _e: &[String]) -> Result<Vec<JobItem>, FeedError> {
            *self.fetches.lock().unwrap() += 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
            if categories.iter().any(|c| c == "broken") {
                return Err(FeedError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(vec![item("https://e.com/jobs/200"), item("https://e.com/jobs/123")])
        }
    }

    async fn scheduler_with(
        subscribers: &[(i64, &str, Option<&str>)],
        notifier: StubNotifier,
    ) -> (PollScheduler<SlowSource, StubNotifier>, SettingsStore) {
        let store = SettingsStore::open_in_memory().await.unwrap();
        for (chat_id, category, watermark) in subscribers {
            store.save_categories(*chat_id, &[category.to_string()]).await.unwrap();
            store.set_watermark(*chat_id, *watermark).await.unwrap();
        }
        let dispatcher = Dispatcher::new(
            SlowSource { fetches: Mutex::new(0) },
            notifier,
            store.clone(),
        );
        (PollScheduler::new(dispatcher, store.clone()), store)
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped_not_queued() {
        let (scheduler, _store) =
            scheduler_with(&[(1, "Rust", Some("https://e.com/jobs/123"))], StubNotifier::ok()).await;

        tokio::join!(scheduler.tick(), scheduler.tick());

        // Only one of the two concurrent ticks dispatched.
        assert_eq!(*scheduler.dispatcher.source().fetches.lock().unwrap(), 1);
        assert_eq!(scheduler.dispatcher.notifier().sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn a_second_tick_runs_after_the_first_finishes() {
        let (scheduler, _store) =
            scheduler_with(&[(1, "Rust", Some("https://e.com/jobs/123"))], StubNotifier::ok()).await;

        scheduler.tick().await;
        scheduler.tick().await;
        assert_eq!(*scheduler.dispatcher.source().fetches.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn one_failing_subscriber_does_not_block_the_rest() {
        let (scheduler, store) = scheduler_with(
            &[
                (1, "broken", Some("https://e.com/jobs/123")),
                (2, "Rust", Some("https://e.com/jobs/123")),
            ],
            StubNotifier::ok(),
        )
        .await;

        scheduler.tick().await;

        let deliveries = scheduler.dispatcher.notifier().sent.lock().unwrap().clone();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, 2);
        // The failing subscriber keeps its watermark for the next tick.
        let sub = store.get(1).await.unwrap().unwrap();
        assert_eq!(sub.last_job_link.as_deref(), Some("https://e.com/jobs/123"));
        assert!(sub.is_active);
    }

    #[tokio::test]
    async fn unreachable_subscriber_is_deactivated_and_others_still_run() {
        // First send (chat 1) fails permanently; chat 2's send succeeds.
        let (scheduler, store) = scheduler_with(
            &[
                (1, "Rust", Some("https://e.com/jobs/123")),
                (2, "Rust", Some("https://e.com/jobs/123")),
            ],
            StubNotifier::unreachable_for(1),
        )
        .await;

        scheduler.tick().await;

        let one = store.get(1).await.unwrap().unwrap();
        assert!(!one.is_active);
        assert_eq!(one.last_job_link.as_deref(), Some("https://e.com/jobs/123"));

        let two = store.get(2).await.unwrap().unwrap();
        assert!(two.is_active);
        assert_eq!(two.last_job_link.as_deref(), Some("https://e.com/jobs/200"));
    }

    #[tokio::test]
    async fn poll_now_bypasses_the_single_flight_guard() {
        let (scheduler, _store) =
            scheduler_with(&[(1, "Rust", Some("https://e.com/jobs/123"))], StubNotifier::ok()).await;

        // Manual poll while a tick is in flight still dispatches.
        let (_, sent) = tokio::join!(scheduler.tick(), scheduler.poll_now(1));
        assert_eq!(*scheduler.dispatcher.source().fetches.lock().unwrap(), 2);
        assert!(sent.is_ok());
    }
}
