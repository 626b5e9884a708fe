//! Outbound core events. The pipeline pushes one event per material step;
//! subscribers only read.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use crate::storage::models::AuditAction;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreEvent {
    pub action: AuditAction,
    pub account: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CoreEvent {
    pub fn new(action: AuditAction, account: Option<String>, details: serde_json::Value) -> Self {
        Self {
            action,
            account,
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Sending half handed to the pipeline. Once the subscriber is gone events are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<CoreEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CoreEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: CoreEvent) {
        if self.sender.send(event).is_err() {
            debug!("Event subscriber has gone away");
        }
    }
}

/// Drain events into the log until the channel closes or `cancel` fires
pub fn spawn_log_subscriber(
    mut receiver: mpsc::UnboundedReceiver<CoreEvent>,
    cancel: CancellationToken,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = receiver.recv() => match event {
                    Some(event) => {
                        seen += 1;
                        info!(
                            target: "rent_reclaim::events",
                            "{} {}",
                            event.action,
                            event.account.as_deref().unwrap_or("-")
                        );
                    }
                    None => break,
                },
            }
        }

        // Flush whatever was queued before shutdown
        while let Ok(event) = receiver.try_recv() {
            seen += 1;
            debug!(target: "rent_reclaim::events", "{} {}", event.action, event.account.as_deref().unwrap_or("-"));
        }
        seen
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_events_reach_subscriber_in_order() {
        let (sink, mut receiver) = EventSink::channel();
        sink.emit(CoreEvent::new(AuditAction::Analyzed, Some("a".into()), json!({})));
        sink.emit(CoreEvent::new(AuditAction::ReclaimDryRun, Some("a".into()), json!({})));

        assert_eq!(receiver.recv().await.unwrap().action, AuditAction::Analyzed);
        assert_eq!(receiver.recv().await.unwrap().action, AuditAction::ReclaimDryRun);
    }

    #[test]
    fn test_emit_after_subscriber_dropped_is_a_no_op() {
        let (sink, receiver) = EventSink::channel();
        drop(receiver);
        sink.emit(CoreEvent::new(AuditAction::Indexed, None, json!({})));
    }

    #[tokio::test]
    async fn test_log_subscriber_counts_and_stops() {
        let (sink, receiver) = EventSink::channel();
        let cancel = CancellationToken::new();
        let handle = spawn_log_subscriber(receiver, cancel.clone());

        for _ in 0..3 {
            sink.emit(CoreEvent::new(AuditAction::Indexed, None, json!({})));
        }
        drop(sink);

        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_log_subscriber_honours_cancellation() {
        let (_sink, receiver) = EventSink::channel();
        let cancel = CancellationToken::new();
        let handle = spawn_log_subscriber(receiver, cancel.clone());
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), 0);
    }
}
