//! Origin checks for the public widget endpoints.

use axum::http::{header, HeaderMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("origin '{0}' is not a valid URL")]
    InvalidOrigin(String),
    #[error("domain '{0}' is not allowed for this project")]
    NotAllowed(String),
    #[error("whitelist entry '{0}' has no valid host")]
    InvalidEntry(String),
}

/// The embedding page's origin: `Origin`, falling back to `Referer`.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    [header::ORIGIN, header::REFERER]
        .iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty() && !value.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn host_of(origin: &str) -> Option<String> {
    url::Url::parse(origin)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .filter(|h| !h.is_empty())
}

/// Exact host comparison against the whitelist; an empty whitelist or a
/// missing origin lets the request through.
pub fn check_origin(origin: Option<&str>, whitelist: &[String]) -> Result<(), DomainError> {
    if whitelist.is_empty() {
        return Ok(());
    }
    let Some(origin) = origin else {
        return Ok(());
    };

    let host = host_of(origin).ok_or_else(|| DomainError::InvalidOrigin(origin.to_string()))?;

    if whitelist.iter().any(|entry| entry.eq_ignore_ascii_case(&host)) {
        Ok(())
    } else {
        Err(DomainError::NotAllowed(host))
    }
}

/// Cleans owner input into a list of lowercase hostnames.
pub fn normalize_whitelist(entries: &[String]) -> Result<Vec<String>, DomainError> {
    let mut normalized: Vec<String> = Vec::with_capacity(entries.len());

    for raw in entries {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }
        // Matching is exact, so a wildcard entry could never match anything.
        if entry.contains('*') {
            return Err(DomainError::InvalidEntry(entry.to_string()));
        }

        let host = if entry.contains("://") {
            host_of(entry)
        } else {
            host_of(&format!("http://{entry}"))
        }
        .ok_or_else(|| DomainError::InvalidEntry(entry.to_string()))?;

        if !normalized.contains(&host) {
            normalized.push(host);
        }
    }

    Ok(normalized)
}
