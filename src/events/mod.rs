//! Feedback events and the outbox they are written to.

pub mod outbox;
pub mod types;

pub use outbox::OutboxService;
pub use types::*;
