//! Periodic-window email sampling
//!
//! Given a benchmark's periodicity policy, selects the subset of stored
//! emails that belong to the benchmark: partition emails by period bucket,
//! rank ascending by timestamp within each bucket, keep rank <= cap, then
//! apply the day-of-week filter. Pure read, no side effects.

use crate::types::Email;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Time partition granularity for sampling
///
/// Each variant carries its own bucket-key derivation; `All` disables
/// bucketing entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
    All,
}

/// Ordered bucket key; the exact shape only matters within one period kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey(i32, u32, u32);

impl Period {
    /// Bucket key for a timestamp, None for the unbucketed `All` period
    pub fn bucket_key(&self, ts: DateTime<Utc>) -> Option<BucketKey> {
        match self {
            // Same hour within the same calendar day
            Period::Hour => Some(BucketKey(ts.year(), ts.ordinal(), ts.hour())),
            Period::Day => Some(BucketKey(ts.year(), ts.ordinal(), 0)),
            // ISO week-of-year, keyed by the ISO week's own year
            Period::Week => {
                let week = ts.iso_week();
                Some(BucketKey(week.year(), week.week(), 0))
            }
            Period::Month => Some(BucketKey(ts.year(), ts.month(), 0)),
            Period::All => None,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Period::Hour => "HOUR",
            Period::Day => "DAY",
            Period::Week => "WEEK",
            Period::Month => "MONTH",
            Period::All => "ALL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HOUR" => Ok(Period::Hour),
            "DAY" => Ok(Period::Day),
            "WEEK" => Ok(Period::Week),
            "MONTH" => Ok(Period::Month),
            "ALL" => Ok(Period::All),
            other => Err(format!("unknown period: {}", other)),
        }
    }
}

/// Day-of-week restriction applied after bucket selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
    All,
}

impl DayOfWeek {
    /// Pure predicate on the email timestamp
    pub fn matches(&self, ts: DateTime<Utc>) -> bool {
        let wanted = match self {
            DayOfWeek::Monday => Weekday::Mon,
            DayOfWeek::Tuesday => Weekday::Tue,
            DayOfWeek::Wednesday => Weekday::Wed,
            DayOfWeek::Thursday => Weekday::Thu,
            DayOfWeek::Friday => Weekday::Fri,
            DayOfWeek::Saturday => Weekday::Sat,
            DayOfWeek::Sunday => Weekday::Sun,
            DayOfWeek::All => return true,
        };
        ts.weekday() == wanted
    }
}

impl std::fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DayOfWeek::Monday => "MONDAY",
            DayOfWeek::Tuesday => "TUESDAY",
            DayOfWeek::Wednesday => "WEDNESDAY",
            DayOfWeek::Thursday => "THURSDAY",
            DayOfWeek::Friday => "FRIDAY",
            DayOfWeek::Saturday => "SATURDAY",
            DayOfWeek::Sunday => "SUNDAY",
            DayOfWeek::All => "ALL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MONDAY" => Ok(DayOfWeek::Monday),
            "TUESDAY" => Ok(DayOfWeek::Tuesday),
            "WEDNESDAY" => Ok(DayOfWeek::Wednesday),
            "THURSDAY" => Ok(DayOfWeek::Thursday),
            "FRIDAY" => Ok(DayOfWeek::Friday),
            "SATURDAY" => Ok(DayOfWeek::Saturday),
            "SUNDAY" => Ok(DayOfWeek::Sunday),
            "ALL" => Ok(DayOfWeek::All),
            other => Err(format!("unknown day of week: {}", other)),
        }
    }
}

/// Full sampling policy for a benchmark
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplePolicy {
    pub period: Period,

    /// Emails kept per bucket; None means unlimited (the CLI's `-1`)
    pub per_period: Option<usize>,

    pub weekday: DayOfWeek,
}

impl SamplePolicy {
    /// Build a policy from the CLI contract where a non-positive count
    /// means unlimited
    pub fn new(period: Period, num: i64, weekday: DayOfWeek) -> Self {
        let per_period = if num > 0 { Some(num as usize) } else { None };
        Self {
            period,
            per_period,
            weekday,
        }
    }

    /// Human-readable subset description stored on the benchmark row
    pub fn describe(&self) -> String {
        let num = self
            .per_period
            .map(|n| n.to_string())
            .unwrap_or_else(|| "ALL".to_string());
        format!("{} per {} ({})", num, self.period, self.weekday)
    }
}

/// Select the emails belonging to a benchmark's subset
///
/// Emails without a timestamp are excluded entirely. The result is grouped
/// by bucket in ascending key order and ranked ascending by timestamp within
/// each bucket; consumers needing a strict global order must sort explicitly.
pub fn sample(emails: Vec<Email>, policy: &SamplePolicy) -> Vec<Email> {
    let mut dated: Vec<Email> = emails.into_iter().filter(|e| e.date.is_some()).collect();

    let selected = match (policy.period, policy.per_period) {
        (Period::All, _) | (_, None) => {
            dated.sort_by_key(|e| e.date);
            dated
        }
        (period, Some(cap)) => {
            let mut buckets: BTreeMap<BucketKey, Vec<Email>> = BTreeMap::new();
            for email in dated {
                let Some(ts) = email.date else { continue };
                let Some(key) = period.bucket_key(ts) else {
                    continue;
                };
                buckets.entry(key).or_default().push(email);
            }

            let mut out = Vec::new();
            for (_, mut bucket) in buckets {
                bucket.sort_by_key(|e| e.date);
                bucket.truncate(cap);
                out.extend(bucket);
            }
            out
        }
    };

    selected
        .into_iter()
        .filter(|e| e.date.map(|ts| policy.weekday.matches(ts)).unwrap_or(false))
        .collect()
}
