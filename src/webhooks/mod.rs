//! Outbound webhooks: subscription validation, signing, and delivery.

pub mod dispatcher;
pub mod signature;

use thiserror::Error;

use crate::events::EventType;

pub use dispatcher::{DispatcherConfig, WebhookDispatcher};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook URL must be an absolute http(s) URL")]
    InvalidUrl,
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("at least one event is required")]
    NoEvents,
    #[error("invalid signing secret")]
    InvalidSecret,
    #[error("delivery failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint answered {0}")]
    Status(u16),
    #[error("database error: {0}")]
    Database(String),
    #[error("task error: {0}")]
    Task(String),
}

pub fn validate_url(raw: &str) -> Result<String, WebhookError> {
    let parsed = url::Url::parse(raw.trim()).map_err(|_| WebhookError::InvalidUrl)?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(WebhookError::InvalidUrl);
    }
    Ok(parsed.to_string())
}

/// Deduplicated, known event names in the order given.
pub fn validate_events(events: &[String]) -> Result<Vec<String>, WebhookError> {
    let mut out: Vec<String> = Vec::new();
    for event in events {
        let parsed =
            EventType::parse(event.trim()).ok_or_else(|| WebhookError::UnknownEvent(event.clone()))?;
        let name = parsed.as_str().to_string();
        if !out.contains(&name) {
            out.push(name);
        }
    }
    if out.is_empty() {
        return Err(WebhookError::NoEvents);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert_eq!(
            validate_url(" https://hooks.example.com/in ").unwrap(),
            "https://hooks.example.com/in"
        );
        assert!(matches!(validate_url("ftp://x.com"), Err(WebhookError::InvalidUrl)));
        assert!(matches!(validate_url("/relative"), Err(WebhookError::InvalidUrl)));
    }

    #[test]
    fn test_validate_events() {
        let events = vec![
            "feedback.created".to_string(),
            "feedback.created".to_string(),
            "feedback.status_changed".to_string(),
        ];
        assert_eq!(validate_events(&events).unwrap().len(), 2);
        assert!(matches!(validate_events(&[]), Err(WebhookError::NoEvents)));
        assert!(matches!(
            validate_events(&["user.created".to_string()]),
            Err(WebhookError::UnknownEvent(_))
        ));
    }
}
