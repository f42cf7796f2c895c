//! Events delivered to project webhooks.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum EventType {
    #[serde(rename = "feedback.created")]
    FeedbackCreated,
    #[serde(rename = "feedback.status_changed")]
    FeedbackStatusChanged,
}

impl EventType {
    pub const ALL: [EventType; 2] = [EventType::FeedbackCreated, EventType::FeedbackStatusChanged];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FeedbackCreated => "feedback.created",
            EventType::FeedbackStatusChanged => "feedback.status_changed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == value)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    Feedback,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Feedback => "feedback",
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the outbox stores in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxPayload {
    pub project_id: Uuid,
    pub data: serde_json::Value,
}

/// One per feedback row whose status actually changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackStatusChangedPayload {
    pub id: Uuid,
    pub previous_status: String,
    pub status: String,
}

/// Body POSTed to a webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookEnvelope {
    #[schema(example = "feedback.created")]
    pub event: String,
    pub project_id: Uuid,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::FeedbackCreated.as_str(), "feedback.created");
        assert_eq!(
            EventType::parse("feedback.status_changed"),
            Some(EventType::FeedbackStatusChanged)
        );
        assert_eq!(EventType::parse("user.registered"), None);
    }

    #[test]
    fn test_event_type_serializes_as_wire_name() {
        let json = serde_json::to_value(EventType::FeedbackCreated).unwrap();
        assert_eq!(json, "feedback.created");
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = WebhookEnvelope {
            event: EventType::FeedbackCreated.to_string(),
            project_id: Uuid::nil(),
            data: serde_json::json!({"rating": 5}),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event"], "feedback.created");
        assert_eq!(json["data"]["rating"], 5);
        assert!(json["timestamp"].is_string());
    }
}
