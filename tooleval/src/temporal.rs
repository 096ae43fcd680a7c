//! Date and date-time normalization for temporal primitives

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const ZONED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M%:z", "%Y-%m-%d %H:%M%:z", "%Y-%m-%d %H:%M:%S%:z"];

/// A parsed temporal literal, keeping whether a time and an offset were given
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Temporal {
    Date(NaiveDate),
    Local(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

pub(crate) fn parse(text: &str) -> Option<Temporal> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Temporal::Zoned(dt));
    }
    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(Temporal::Zoned(dt));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Temporal::Local(dt));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Temporal::Date)
}

/// Compare two temporal strings after canonical normalization.
///
/// An expected date-only value matches any observed time on that date. An
/// expected date-time never matches an observed date-only value. Values that
/// do not parse fall back to exact string equality.
pub(crate) fn equivalent(expected: &str, observed: &str) -> bool {
    let (Some(expected_t), Some(observed_t)) = (parse(expected), parse(observed)) else {
        return expected == observed;
    };

    match (expected_t, observed_t) {
        (Temporal::Date(a), Temporal::Date(b)) => a == b,
        (Temporal::Date(a), Temporal::Local(b)) => a == b.date(),
        (Temporal::Date(a), Temporal::Zoned(b)) => a == b.naive_local().date(),
        (Temporal::Local(_) | Temporal::Zoned(_), Temporal::Date(_)) => false,
        (Temporal::Local(a), Temporal::Local(b)) => a == b,
        (Temporal::Zoned(a), Temporal::Zoned(b)) => a == b,
        (Temporal::Local(a), Temporal::Zoned(b)) => a == b.naive_local(),
        (Temporal::Zoned(a), Temporal::Local(b)) => a.naive_local() == b,
    }
}
