//! Feedback aggregation: NPS, rating distribution, tag frequency, daily trend.
//!
//! Everything here is a pure function over rows the handler has already
//! loaded, so the numbers can be tested without a database.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::FeedbackStatus;

pub const DEFAULT_RANGE_DAYS: i64 = 30;
pub const MAX_RANGE_DAYS: i64 = 365;
pub const TOP_TAGS_LIMIT: usize = 10;
/// Tags mentioned more often than this are labelled positive.
pub const POSITIVE_TAG_THRESHOLD: i64 = 10;

/// One feedback row as seen by the aggregator.
#[derive(Debug, Clone)]
pub struct FeedbackSample {
    pub rating: i16,
    pub status: String,
    pub answers: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RatingBucket {
    pub rating: i16,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
    #[schema(example = "neutral")]
    pub sentiment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub count: i64,
    pub average_rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AnalyticsSummary {
    pub total: i64,
    pub average_rating: f64,
    /// Percentage of 4-5 ratings minus percentage of 1-2 ratings.
    pub nps: i64,
    pub distribution: Vec<RatingBucket>,
    pub status_counts: Vec<StatusCount>,
    pub top_tags: Vec<TagCount>,
    pub daily: Vec<DailyPoint>,
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn average_rating(ratings: &[i16]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|&r| r as i64).sum();
    round_one_decimal(sum as f64 / ratings.len() as f64)
}

pub fn nps(ratings: &[i16]) -> i64 {
    if ratings.is_empty() {
        return 0;
    }
    let total = ratings.len() as f64;
    let promoters = ratings.iter().filter(|&&r| r >= 4).count() as f64;
    let detractors = ratings.iter().filter(|&&r| r <= 2).count() as f64;
    ((promoters / total * 100.0) - (detractors / total * 100.0)).round() as i64
}

fn tags_of(answers: &serde_json::Value) -> impl Iterator<Item = &str> {
    answers
        .get("tags")
        .and_then(|t| t.as_array())
        .into_iter()
        .flatten()
        .filter_map(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn top_tags(samples: &[FeedbackSample]) -> Vec<TagCount> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for sample in samples {
        for tag in tags_of(&sample.answers) {
            *counts.entry(tag).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, i64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    ranked
        .into_iter()
        .take(TOP_TAGS_LIMIT)
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
            sentiment: if count > POSITIVE_TAG_THRESHOLD {
                "positive"
            } else {
                "neutral"
            }
            .to_string(),
        })
        .collect()
}

pub fn summarize(samples: &[FeedbackSample]) -> AnalyticsSummary {
    let ratings: Vec<i16> = samples.iter().map(|s| s.rating).collect();

    let distribution = (1..=5)
        .map(|rating| RatingBucket {
            rating,
            count: ratings.iter().filter(|&&r| r == rating).count() as i64,
        })
        .collect();

    let status_counts = FeedbackStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: status.as_str().to_string(),
            count: samples
                .iter()
                .filter(|s| s.status == status.as_str())
                .count() as i64,
        })
        .collect();

    let mut by_day: BTreeMap<NaiveDate, Vec<i16>> = BTreeMap::new();
    for sample in samples {
        by_day
            .entry(sample.created_at.date())
            .or_default()
            .push(sample.rating);
    }
    let daily = by_day
        .into_iter()
        .map(|(date, ratings)| DailyPoint {
            date,
            count: ratings.len() as i64,
            average_rating: average_rating(&ratings),
        })
        .collect();

    AnalyticsSummary {
        total: samples.len() as i64,
        average_rating: average_rating(&ratings),
        nps: nps(&ratings),
        distribution,
        status_counts,
        top_tags: top_tags(samples),
        daily,
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("days must be between 1 and {MAX_RANGE_DAYS}")]
    DaysOutOfRange,
    #[error("'from' must not be after 'to'")]
    Inverted,
}

/// Half-open `[start, end)` window the analytics query runs over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    /// Explicit `from`/`to` dates win over `days`; `to` is inclusive.
    pub fn resolve(
        days: Option<i64>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        now: NaiveDateTime,
    ) -> Result<Self, RangeError> {
        let days = days.unwrap_or(DEFAULT_RANGE_DAYS);
        if !(1..=MAX_RANGE_DAYS).contains(&days) {
            return Err(RangeError::DaysOutOfRange);
        }

        let end = match to {
            Some(to) => start_of_day(to) + Duration::days(1),
            None => now,
        };
        let start = match from {
            Some(from) => start_of_day(from),
            None => end - Duration::days(days),
        };

        if start > end {
            return Err(RangeError::Inverted);
        }

        Ok(Self { start, end })
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}
