//! Webhook notification for high-risk outcomes
//!
//! Delivery is fire-and-forget: the pipeline spawns the dispatch and never
//! waits on it. Failures are logged.

use crate::types::{CheckResponse, Decision, EvaluationResult, Severity};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Notification payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event id, for receiver-side deduplication
    pub event_id: Uuid,
    /// Tenant to notify
    pub tenant_id: String,
    /// Check-transaction output
    pub payload: CheckResponse,
    /// When the event was raised
    pub created_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Wrap a response
    pub fn new(tenant_id: impl Into<String>, payload: CheckResponse) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Webhook delivery
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    /// Deliver one event
    async fn dispatch(&self, event: WebhookEvent) -> Result<()>;
}

/// Declines and any critical flag are notified
pub fn should_notify(result: &EvaluationResult) -> bool {
    result.decision == Decision::Decline || result.max_severity() == Some(Severity::Critical)
}

/// Hands events to an in-process delivery worker over a channel
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<WebhookEvent>,
}

impl ChannelDispatcher {
    /// Create dispatcher and the receiving end for the delivery worker
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WebhookEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WebhookDispatcher for ChannelDispatcher {
    async fn dispatch(&self, event: WebhookEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| Error::ChannelClosed("webhook delivery worker stopped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskScore, TriggeredRule};
    use std::collections::BTreeMap;

    fn result(decision: Decision, severity: Option<Severity>) -> EvaluationResult {
        EvaluationResult {
            input_hash: "h".to_string(),
            vertical: "lending".to_string(),
            final_score: RiskScore::new(10.0),
            rule_score: RiskScore::new(10.0),
            decision,
            triggered_rules: severity
                .map(|severity| {
                    vec![TriggeredRule {
                        rule_id: "CON-001".to_string(),
                        category: "consortium".to_string(),
                        severity,
                        score: 10.0,
                        base_score: 10.0,
                        weight: 1.0,
                        confidence: 1.0,
                        message: "x".to_string(),
                        metadata: BTreeMap::new(),
                    }]
                })
                .unwrap_or_default(),
            ml_component_used: false,
            ml_probability: None,
            aml_review: false,
            degraded: false,
            errored_rules: Vec::new(),
            explanation: String::new(),
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_should_notify() {
        assert!(should_notify(&result(Decision::Decline, None)));
        assert!(should_notify(&result(Decision::Approve, Some(Severity::Critical))));
        assert!(!should_notify(&result(Decision::Review, Some(Severity::High))));
        assert!(!should_notify(&result(Decision::Approve, None)));
    }

    #[tokio::test]
    async fn test_channel_dispatcher() {
        let (dispatcher, mut receiver) = ChannelDispatcher::new();
        let payload = CheckResponse {
            transaction_id: "tx-1".to_string(),
            result: result(Decision::Decline, None),
            cached: false,
            processing_time_ms: 3,
        };
        dispatcher.dispatch(WebhookEvent::new("t1", payload)).await.unwrap();
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.tenant_id, "t1");

        drop(receiver);
        let payload = event.payload.clone();
        assert!(dispatcher.dispatch(WebhookEvent::new("t1", payload)).await.is_err());
    }
}
