//! Fan-out dispatcher — one trigger, many recipients, bounded concurrency.
//!
//! Every (recipient, channel) pair that survives the settings and
//! preference gates produces exactly one delivery log row: sent, failed,
//! or skipped with a reason. A provider that reports itself down closes
//! its lane for the remainder of the batch instead of timing out once per
//! recipient.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout};

use rollcall_channels::{Message, Provider, SendError};
use rollcall_core::config::DispatchConfig;
use rollcall_core::template::{TemplateKind, email_subject, render};
use rollcall_core::types::{ChannelKind, DeliveryStatus, TriggerKind};
use rollcall_core::{Result, RollcallError};
use rollcall_store::{DeliveryAttempt, Store};

use crate::dedup::DedupPolicy;
use crate::resolver::Resolver;

/// Outcome counts for one batch. `attempted` is always the sum of the
/// other three counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    /// One entry per FAILED delivery, for callers that surface reasons.
    pub errors: Vec<String>,
    /// True when the batch deadline expired before every send started.
    pub truncated: bool,
}

enum Outcome {
    Sent,
    Skipped,
    Failed(String),
    /// Never started: the batch deadline expired first. Not logged.
    Deferred,
}

pub struct Dispatcher {
    store: Arc<Store>,
    resolver: Resolver,
    dedup: DedupPolicy,
    providers: Vec<Arc<dyn Provider>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<Store>,
        resolver: Resolver,
        providers: Vec<Arc<dyn Provider>>,
        config: DispatchConfig,
    ) -> Self {
        let dedup = DedupPolicy::new(Arc::clone(&store));
        Self { store, resolver, dedup, providers, config }
    }

    /// Run one batch: resolve recipients for (owner, kind) as of `date`,
    /// fan out across every enabled channel, and log every attempt.
    pub async fn dispatch(
        &self,
        owner_id: i64,
        kind: TriggerKind,
        date: NaiveDate,
    ) -> Result<BatchSummary> {
        let Some(settings) = self.store.find_settings(owner_id)? else {
            tracing::debug!("Owner {owner_id} has no notification settings, skipping {kind}");
            return Ok(BatchSummary::default());
        };

        let recipients = self.resolver.resolve(&settings, kind, date)?;
        if recipients.is_empty() {
            tracing::debug!("No recipients for {kind} (owner {owner_id})");
            return Ok(BatchSummary::default());
        }

        // One lane per enabled provider: availability probed once up
        // front, template fetched once, the gate shared by every task.
        let mut lanes = Vec::new();
        for provider in &self.providers {
            let channel = provider.channel();
            if !settings.channel_enabled(channel) {
                continue;
            }
            let open = provider.available().await;
            if !open {
                tracing::warn!("⚠️ {} provider unavailable, lane closed for this batch", provider.name());
            }
            let template = self
                .store
                .template_for(TemplateKind::for_trigger(kind, channel), Some(owner_id))?;
            lanes.push(Lane {
                provider: Arc::clone(provider),
                open: Arc::new(AtomicBool::new(open)),
                template,
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let deadline = self
            .config
            .batch_deadline_secs
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        let send_timeout = Duration::from_secs(self.config.send_timeout_secs);

        let mut tasks: JoinSet<Result<Outcome>> = JoinSet::new();
        for recipient in &recipients {
            for lane in &lanes {
                let channel = lane.provider.channel();
                if !recipient.wants(channel) {
                    continue;
                }
                let Some(contact) = recipient.contact.contact_for(channel) else {
                    continue;
                };

                let message = Message {
                    subject: match channel {
                        ChannelKind::Email => email_subject(kind, &recipient.variables),
                        ChannelKind::Sms => String::new(),
                    },
                    body: render(&lane.template, &recipient.variables),
                };
                let mut attempt = DeliveryAttempt {
                    owner_id,
                    kind,
                    channel,
                    recipient_contact: contact.to_string(),
                    subject_id: recipient.subject_id,
                    status: DeliveryStatus::Skipped,
                    provider_ref: None,
                    error: None,
                };

                let provider = Arc::clone(&lane.provider);
                let open = Arc::clone(&lane.open);
                let store = Arc::clone(&self.store);
                let dedup = self.dedup.clone();
                let semaphore = Arc::clone(&semaphore);
                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return Ok(Outcome::Deferred);
                    };
                    if let Some(deadline) = deadline
                        && Instant::now() >= deadline
                    {
                        return Ok(Outcome::Deferred);
                    }
                    if !open.load(Ordering::Acquire) {
                        attempt.error = Some("provider unavailable".into());
                        store.record_delivery(&attempt)?;
                        return Ok(Outcome::Skipped);
                    }
                    if !dedup.may_notify(kind, attempt.subject_id, channel, Utc::now())? {
                        attempt.error = Some("suppressed by dedup window".into());
                        store.record_delivery(&attempt)?;
                        return Ok(Outcome::Skipped);
                    }

                    let sent = timeout(
                        send_timeout,
                        provider.send(&attempt.recipient_contact, &message),
                    )
                    .await;
                    let outcome = match sent {
                            Ok(Ok(provider_ref)) => {
                                attempt.status = DeliveryStatus::Sent;
                                attempt.provider_ref = Some(provider_ref);
                                Outcome::Sent
                            }
                            Ok(Err(SendError::Unavailable)) => {
                                open.store(false, Ordering::Release);
                                attempt.error = Some("provider unavailable".into());
                                Outcome::Skipped
                            }
                            Ok(Err(err @ SendError::Permanent(_))) => {
                                tracing::warn!(
                                    "⚠️ Permanent {channel} failure for {}: {err}",
                                    attempt.recipient_contact
                                );
                                attempt.status = DeliveryStatus::Failed;
                                attempt.error = Some(err.to_string());
                                Outcome::Failed(err.to_string())
                            }
                            Ok(Err(err @ SendError::Transient(_))) => {
                                attempt.status = DeliveryStatus::Failed;
                                attempt.error = Some(err.to_string());
                                Outcome::Failed(err.to_string())
                            }
                            Err(_) => {
                                attempt.status = DeliveryStatus::Failed;
                                attempt.error = Some("send timed out".into());
                                Outcome::Failed("send timed out".into())
                            }
                        };
                    store.record_delivery(&attempt)?;
                    Ok(outcome)
                });
            }
        }

        let mut summary = BatchSummary::default();
        let mut store_error: Option<RollcallError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Outcome::Sent)) => summary.sent += 1,
                Ok(Ok(Outcome::Skipped)) => summary.skipped += 1,
                Ok(Ok(Outcome::Failed(reason))) => {
                    summary.failed += 1;
                    summary.errors.push(reason);
                }
                Ok(Ok(Outcome::Deferred)) => summary.truncated = true,
                Ok(Err(e)) => {
                    tracing::error!("Delivery log write failed: {e}");
                    store_error.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Dispatch task panicked: {e}");
                    summary.failed += 1;
                    summary.errors.push(format!("dispatch task panicked: {e}"));
                }
            }
        }
        if let Some(e) = store_error {
            return Err(e);
        }

        summary.attempted = summary.sent + summary.skipped + summary.failed;
        tracing::info!(
            "📨 {kind} batch for owner {owner_id}: {} sent, {} skipped, {} failed{}",
            summary.sent,
            summary.skipped,
            summary.failed,
            if summary.truncated { " (truncated by deadline)" } else { "" }
        );
        Ok(summary)
    }
}

struct Lane {
    provider: Arc<dyn Provider>,
    open: Arc<AtomicBool>,
    template: String,
}
