//! Rating-driven branching for the feedback widget.
//!
//! A widget config holds an ordered list of [`LogicStep`]s. After the visitor
//! picks a rating, the first step whose `rating_group` contains it decides the
//! follow-up question, suggested tags, and optional redirect.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;
pub const MAX_STEPS: usize = 5;
pub const MAX_TAGS_PER_STEP: usize = 20;
pub const MAX_TAG_LENGTH: usize = 50;

pub const FALLBACK_TITLE: &str = "Anything you'd like to add?";
pub const FALLBACK_PLACEHOLDER: &str = "Add a comment…";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WidgetTheme {
    #[serde(default = "default_primary_color")]
    #[schema(example = "#4f46e5")]
    pub primary_color: String,
    #[serde(default = "default_position")]
    #[schema(example = "bottom-right")]
    pub position: String,
    #[serde(default = "default_theme_title")]
    #[schema(example = "How was your experience?")]
    pub title: String,
}

fn default_primary_color() -> String {
    "#4f46e5".to_string()
}

fn default_position() -> String {
    "bottom-right".to_string()
}

fn default_theme_title() -> String {
    "How was your experience?".to_string()
}

impl Default for WidgetTheme {
    fn default() -> Self {
        Self {
            primary_color: default_primary_color(),
            position: default_position(),
            title: default_theme_title(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LogicStep {
    #[schema(example = json!([1, 2]))]
    pub rating_group: Vec<i16>,
    #[schema(example = "What went wrong?")]
    pub title: String,
    #[serde(default)]
    #[schema(example = json!(["Slow", "Confusing"]))]
    pub tags: Vec<String>,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    #[serde(default)]
    pub collect_email: bool,
    #[serde(default)]
    #[schema(example = "https://example.com/review")]
    pub cta_redirect: Option<String>,
}

fn default_placeholder() -> String {
    FALLBACK_PLACEHOLDER.to_string()
}

impl LogicStep {
    fn new(rating_group: &[i16], title: &str, tags: &[&str]) -> Self {
        Self {
            rating_group: rating_group.to_vec(),
            title: title.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            placeholder: default_placeholder(),
            collect_email: false,
            cta_redirect: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WidgetConfig {
    #[serde(default)]
    pub theme: WidgetTheme,
    #[serde(default)]
    pub logic: Vec<LogicStep>,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            theme: WidgetTheme::default(),
            logic: vec![
                LogicStep::new(&[1, 2], "What went wrong?", &["Bugs", "Slow", "Confusing"]),
                LogicStep::new(&[3], "How can we improve?", &["Features", "Design", "Speed"]),
                LogicStep::new(&[4, 5], "What did you like?", &["Easy to use", "Fast", "Design"]),
            ],
        }
    }
}

/// The step shown to a visitor for a given rating.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResolvedStep {
    pub title: String,
    pub tags: Vec<String>,
    pub placeholder: String,
    pub collect_email: bool,
    pub cta_redirect: Option<String>,
    /// True when no configured step matched and the generic prompt is used.
    pub fallback: bool,
}

impl ResolvedStep {
    pub fn fallback() -> Self {
        Self {
            title: FALLBACK_TITLE.to_string(),
            tags: Vec::new(),
            placeholder: FALLBACK_PLACEHOLDER.to_string(),
            collect_email: false,
            cta_redirect: None,
            fallback: true,
        }
    }
}

impl From<&LogicStep> for ResolvedStep {
    fn from(step: &LogicStep) -> Self {
        Self {
            title: step.title.clone(),
            tags: step.tags.clone(),
            placeholder: step.placeholder.clone(),
            collect_email: step.collect_email,
            cta_redirect: step.cta_redirect.clone(),
            fallback: false,
        }
    }
}

/// First step whose rating group contains `rating`, else the fallback prompt.
pub fn select_step(logic: &[LogicStep], rating: i16) -> ResolvedStep {
    logic
        .iter()
        .find(|step| step.rating_group.contains(&rating))
        .map(ResolvedStep::from)
        .unwrap_or_else(ResolvedStep::fallback)
}

#[derive(Debug, Error, PartialEq)]
pub enum WidgetConfigError {
    #[error("at most {MAX_STEPS} logic steps are allowed")]
    TooManySteps,
    #[error("step {step}: rating group is empty")]
    EmptyRatingGroup { step: usize },
    #[error("step {step}: rating {rating} is outside {MIN_RATING}..={MAX_RATING}")]
    RatingOutOfRange { step: usize, rating: i16 },
    #[error("step {step}: rating {rating} is already covered by step {previous}")]
    OverlappingRating {
        step: usize,
        previous: usize,
        rating: i16,
    },
    #[error("step {step}: title must not be blank")]
    BlankTitle { step: usize },
    #[error("step {step}: at most {MAX_TAGS_PER_STEP} tags are allowed")]
    TooManyTags { step: usize },
    #[error("step {step}: tags must be 1 to {MAX_TAG_LENGTH} characters")]
    InvalidTag { step: usize },
    #[error("step {step}: redirect must be an absolute http(s) URL")]
    InvalidRedirect { step: usize },
}

impl WidgetConfig {
    /// Parses a stored JSON config, falling back to the default on malformed data.
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn validate(&self) -> Result<(), WidgetConfigError> {
        if self.logic.len() > MAX_STEPS {
            return Err(WidgetConfigError::TooManySteps);
        }

        let mut owner: [Option<usize>; (MAX_RATING + 1) as usize] = [None; (MAX_RATING + 1) as usize];

        for (step, logic) in self.logic.iter().enumerate() {
            if logic.rating_group.is_empty() {
                return Err(WidgetConfigError::EmptyRatingGroup { step });
            }

            for &rating in &logic.rating_group {
                if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                    return Err(WidgetConfigError::RatingOutOfRange { step, rating });
                }
                match owner[rating as usize] {
                    Some(previous) if previous != step => {
                        return Err(WidgetConfigError::OverlappingRating {
                            step,
                            previous,
                            rating,
                        });
                    }
                    _ => owner[rating as usize] = Some(step),
                }
            }

            if logic.title.trim().is_empty() {
                return Err(WidgetConfigError::BlankTitle { step });
            }

            if logic.tags.len() > MAX_TAGS_PER_STEP {
                return Err(WidgetConfigError::TooManyTags { step });
            }
            if logic
                .tags
                .iter()
                .any(|t| t.trim().is_empty() || t.chars().count() > MAX_TAG_LENGTH)
            {
                return Err(WidgetConfigError::InvalidTag { step });
            }

            if let Some(redirect) = &logic.cta_redirect {
                let valid = url::Url::parse(redirect)
                    .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
                    .unwrap_or(false);
                if !valid {
                    return Err(WidgetConfigError::InvalidRedirect { step });
                }
            }
        }

        Ok(())
    }
}
