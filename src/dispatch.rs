//! Per-subscriber delivery: aggregate, reconcile, send in order, then commit
//! the watermark.

use log::{error, info};

use crate::aggregate::JobSource;
use crate::error::{DispatchError, SendError};
use crate::reconcile::reconcile;
use crate::render;
use crate::store::SettingsStore;
use crate::telegram::Notifier;

pub struct Dispatcher<J, N> {
    source: J,
    notifier: N,
    store: SettingsStore,
}

#[cfg(test)]
impl<J, N> Dispatcher<J, N> {
    pub(crate) fn source(&self) -> &J {
        &self.source
    }

    pub(crate) fn notifier(&self) -> &N {
        &self.notifier
    }
}

impl<J: JobSource, N: Notifier> Dispatcher<J, N> {
    pub fn new(source: J, notifier: N, store: SettingsStore) -> Self {
        Self { source, notifier, store }
    }

    /// One dispatch cycle for one subscriber. Returns the number of items
    /// delivered. Inactive or unconfigured subscribers are a no-op.
    ///
    /// Deliveries are sequential and oldest-first so the message stream
    /// preserves publication order. The watermark advances exactly once,
    /// after the whole batch succeeded; an aborted batch leaves it at the
    /// pre-cycle value so the remaining items are retried next cycle
    /// (re-delivery of the already-sent prefix is accepted).
    pub async fn run(&self, chat_id: i64) -> Result<usize, DispatchError> {
        let Some(subscriber) = self.store.get(chat_id).await? else {
            return Ok(0);
        };
        if !subscriber.is_active || subscriber.categories.is_empty() {
            return Ok(0);
        }

        let items = self
            .source
            .fetch_merged(&subscriber.categories, &subscriber.exp_levels)
            .await?;
        let outcome = reconcile(&items, subscriber.last_job_link.as_deref());

        let mut sent = 0;
        for item in &outcome.to_deliver {
            let text = render::format_job_message(item);
            if let Err(err) = self.notifier.send_message(chat_id, &text).await {
                if matches!(err, SendError::Unreachable) {
                    self.store.set_active(chat_id, false).await?;
                    info!("poll chat={chat_id} deactivated: recipient unreachable");
                }
                return Err(err.into());
            }
            sent += 1;
        }

        if outcome.next_watermark != subscriber.last_job_link {
            self.store
                .set_watermark(chat_id, outcome.next_watermark.as_deref())
                .await?;
        }

        info!(
            "poll chat={chat_id} jobs={} new={} sent={sent} latest_link={}",
            items.len(),
            outcome.to_deliver.len(),
            outcome.next_watermark.as_deref().unwrap_or("none"),
        );
        Ok(sent)
    }

    /// Re-primes the watermark to the current freshest item so the next poll
    /// only reports listings published afterwards. Used after a subscriber
    /// saves filters; failures are logged and swallowed.
    pub async fn prime(&self, chat_id: i64) {
        if let Err(err) = self.try_prime(chat_id).await {
            error!("prime failed for chat {chat_id}: {err}");
        }
    }

    async fn try_prime(&self, chat_id: i64) -> Result<(), DispatchError> {
        let Some(subscriber) = self.store.get(chat_id).await? else {
            return Ok(());
        };
        if subscriber.categories.is_empty() {
            return Ok(());
        }

        let items = self
            .source
            .fetch_merged(&subscriber.categories, &subscriber.exp_levels)
            .await?;
        if let Some(first) = items.first() {
            let latest = first.normalized_link();
            self.store.set_watermark(chat_id, Some(&latest)).await?;
            info!("prime chat={chat_id} jobs={} latest_link={latest}", items.len());
        }
        Ok(())
    }
}
