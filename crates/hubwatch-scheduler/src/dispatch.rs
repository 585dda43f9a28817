//! Notification dispatch: formats an item per recipient and hands it to the transport.
//! A failure for one recipient is logged and never blocks the others.

use std::sync::Arc;

use futures::future::join_all;
use hubwatch_core::error::Result;
use hubwatch_core::traits::{Formatter, Transport};
use hubwatch_core::types::{Item, NotificationFormat, RecipientId};

use crate::tasks::Subscriber;

/// Delivery counts for one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for DispatchReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

pub struct NotificationDispatcher {
    formatter: Arc<dyn Formatter>,
    transport: Arc<dyn Transport>,
}

impl NotificationDispatcher {
    pub fn new(formatter: Arc<dyn Formatter>, transport: Arc<dyn Transport>) -> Self {
        Self {
            formatter,
            transport,
        }
    }

    /// Format `item` in `format` and send it to one recipient.
    pub async fn dispatch(
        &self,
        item: &Item,
        recipient_id: RecipientId,
        format: NotificationFormat,
        notice: &str,
    ) -> Result<()> {
        let message = self.formatter.format(item, format, notice)?;
        self.transport.send(recipient_id, &message).await
    }

    /// Deliver `item` to every subscriber concurrently.
    pub async fn fan_out(&self, item: &Item, subscribers: &[Subscriber], notice: &str) -> DispatchReport {
        let sends = subscribers.iter().map(|sub| async move {
            let result = self.dispatch(item, sub.recipient_id, sub.format, notice).await;
            (sub.recipient_id, result)
        });

        let mut report = DispatchReport::default();
        for (recipient_id, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        "⚠️ {} delivery of {} {} to {} failed: {e}",
                        self.transport.name(),
                        item.kind.noun(),
                        item.id,
                        recipient_id
                    );
                }
            }
        }
        tracing::debug!(
            "📨 {} {}: {} delivered, {} failed",
            notice,
            item.id,
            report.delivered,
            report.failed
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MessageFormatter;
    use crate::testing::{self, RecordingTransport};
    use chrono::Utc;
    use hubwatch_core::types::{FeedKind, MessageBody};

    fn dispatcher(transport: Arc<RecordingTransport>) -> NotificationDispatcher {
        NotificationDispatcher::new(Arc::new(MessageFormatter::new()), transport)
    }

    #[tokio::test]
    async fn test_each_recipient_gets_own_format() {
        let transport = RecordingTransport::new();
        let d = dispatcher(transport.clone());
        let subs = [
            Subscriber {
                recipient_id: 1,
                format: NotificationFormat::Text,
            },
            Subscriber {
                recipient_id: 2,
                format: NotificationFormat::Card,
            },
        ];
        let item = testing::item(FeedKind::Pulls, "5", Utc::now());
        let report = d.fan_out(&item, &subs, "repo-pull").await;
        assert_eq!(report, DispatchReport { delivered: 2, failed: 0 });

        let sent = transport.sent();
        let text = sent.iter().find(|(r, _)| *r == 1).unwrap();
        let card = sent.iter().find(|(r, _)| *r == 2).unwrap();
        assert!(matches!(text.1.body, MessageBody::Text(_)));
        assert!(matches!(card.1.body, MessageBody::Card { .. }));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let transport = RecordingTransport::new();
        transport.fail_for(2);
        let d = dispatcher(transport.clone());
        let subs: Vec<Subscriber> = (1..=3)
            .map(|recipient_id| Subscriber {
                recipient_id,
                format: NotificationFormat::Text,
            })
            .collect();
        let item = testing::item(FeedKind::Issues, "1", Utc::now());
        let report = d.fan_out(&item, &subs, "repo-issue").await;
        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });

        let mut recipients = transport.recipients();
        recipients.sort();
        assert_eq!(recipients, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_dispatch_single_surfaces_error() {
        let transport = RecordingTransport::new();
        transport.fail_for(9);
        let d = dispatcher(transport);
        let item = testing::item(FeedKind::Releases, "v1", Utc::now());
        assert!(d.dispatch(&item, 9, NotificationFormat::Json, "repo-release").await.is_err());
    }
}
