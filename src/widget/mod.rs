//! Widget configuration, branching logic, and origin checks.

pub mod domain;
pub mod logic;

pub use domain::{check_origin, normalize_whitelist, request_origin, DomainError};
pub use logic::{select_step, LogicStep, ResolvedStep, WidgetConfig, WidgetConfigError, WidgetTheme};
