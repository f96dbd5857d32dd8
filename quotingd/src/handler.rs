//! Command batch handler.
//!
//! Bus-facing shell around the aggregate: keeps only COMMAND messages, times
//! the batch and records the outcome. An aggregate error is counted and then
//! returned unchanged; the daemon stops on it.

use quoting_aggregate::CommandProcessor;
use quoting_domain::{InboundMessage, MessageType, OutboundMessage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::error::DaemonResult;
use crate::metrics::BatchMetrics;

/// Filters, measures and forwards inbound batches.
pub struct BatchHandler {
    processor: Arc<dyn CommandProcessor>,
    metrics: Arc<BatchMetrics>,
}

impl BatchHandler {
    pub fn new(processor: Arc<dyn CommandProcessor>, metrics: Arc<BatchMetrics>) -> Self {
        Self { processor, metrics }
    }

    /// Process one inbound batch.
    pub async fn handle(&self, batch: Vec<InboundMessage>) -> DaemonResult<Vec<OutboundMessage>> {
        let received = batch.len();
        let commands: Vec<InboundMessage> =
            batch.into_iter().filter(|m| m.msg_type == MessageType::Command).collect();
        let filtered = received - commands.len();

        self.metrics.record_messages(commands.len(), filtered);
        if filtered > 0 {
            debug!(filtered, "Skipping non-command messages");
        }
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let forwarded = commands.len();
        let started = Instant::now();
        let result = self.processor.process_batch(commands).await;
        let elapsed = started.elapsed();

        match result {
            Ok(outbound) => {
                self.metrics.observe_batch(elapsed, true);
                info!(
                    forwarded,
                    produced = outbound.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Batch processed"
                );
                Ok(outbound)
            },
            Err(e) => {
                self.metrics.observe_batch(elapsed, false);
                self.metrics.record_failure();
                error!(forwarded, error = %e, "Batch failed");
                Err(e.into())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DaemonError;
    use async_trait::async_trait;
    use prometheus::Registry;
    use quoting_aggregate::{AggregateError, AggregateResult};
    use quoting_domain::{FspiopOpaqueState, QuotingError, QuotingErrorEvent, QuotingEvent};
    use quoting_store::StoreError;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records what it was given; optionally fails
    struct RecordingProcessor {
        seen: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl RecordingProcessor {
        fn new(fail: bool) -> Self {
            Self { seen: Mutex::new(Vec::new()), fail }
        }
    }

    #[async_trait]
    impl CommandProcessor for RecordingProcessor {
        async fn process_batch(
            &self,
            messages: Vec<InboundMessage>,
        ) -> AggregateResult<Vec<OutboundMessage>> {
            let ids = messages
                .iter()
                .map(|m| m.payload["quoteId"].as_str().unwrap_or_default().to_string())
                .collect();
            self.seen.lock().unwrap().push(ids);

            if self.fail {
                return Err(AggregateError::Store(StoreError::Connection("down".into())));
            }
            Ok(messages
                .iter()
                .map(|m| {
                    let event = QuotingErrorEvent::new(
                        QuotingError::from(quoting_domain::ErrorCode::QuoteNotFound),
                        m.msg_name.clone(),
                        None,
                        None,
                    );
                    OutboundMessage::new(QuotingEvent::Error(event), m.fspiop_opaque_state.clone())
                })
                .collect())
        }
    }

    fn message(id: &str, msg_type: MessageType) -> InboundMessage {
        let mut message = InboundMessage::command(
            "QuoteQueryReceivedEvt",
            json!({ "quoteId": id }),
            FspiopOpaqueState::new("payerfsp", "payeefsp"),
        );
        message.msg_type = msg_type;
        message
    }

    fn handler(processor: Arc<RecordingProcessor>) -> (BatchHandler, Arc<BatchMetrics>) {
        let metrics = Arc::new(BatchMetrics::new(&Registry::new()).unwrap());
        (BatchHandler::new(processor, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_forwards_only_commands_in_order() {
        let processor = Arc::new(RecordingProcessor::new(false));
        let (handler, metrics) = handler(processor.clone());

        let batch = vec![
            message("q1", MessageType::Command),
            message("evt", MessageType::DomainEvent),
            message("q2", MessageType::Command),
        ];
        let outbound = handler.handle(batch).await.unwrap();

        assert_eq!(*processor.seen.lock().unwrap(), vec![vec!["q1", "q2"]]);
        assert_eq!(outbound.len(), 2);
        assert_eq!(metrics.forwarded_total(), 2);
        assert_eq!(metrics.filtered_total(), 1);
        assert_eq!(metrics.batches_observed(true), 1);
    }

    #[tokio::test]
    async fn test_events_only_batch_skips_aggregate() {
        let processor = Arc::new(RecordingProcessor::new(false));
        let (handler, metrics) = handler(processor.clone());

        let outbound = handler.handle(vec![message("evt", MessageType::DomainEvent)]).await.unwrap();

        assert!(outbound.is_empty());
        assert!(processor.seen.lock().unwrap().is_empty());
        assert_eq!(metrics.batches_observed(true), 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_propagated() {
        let processor = Arc::new(RecordingProcessor::new(true));
        let (handler, metrics) = handler(processor);

        let result = handler.handle(vec![message("q1", MessageType::Command)]).await;

        assert!(matches!(
            result,
            Err(DaemonError::Aggregate(AggregateError::Store(StoreError::Connection(_))))
        ));
        assert_eq!(metrics.failures_total(), 1);
        assert_eq!(metrics.batches_observed(false), 1);
    }
}
