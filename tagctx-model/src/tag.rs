//! Tag definitions and time-bounded applicability.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tagctx_primitives::TagId;

use crate::error::{ModelError, ModelResult};
use crate::match_type::MatchType;

/// A day-of-week / time-of-day recurrence narrowing when a validity period
/// applies within its start/end window (e.g. "weekdays, 09:00-17:00").
///
/// An empty `days_of_week` means every day; `None` time bounds mean no
/// narrowing on that side of the day.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct DayTimeMask {
    /// Days of the week this period recurs on. Empty admits every day.
    #[serde(default)]
    pub days_of_week: Vec<Weekday>,
    /// Inclusive start of the daily window, or `None` for the start of day.
    pub time_start: Option<NaiveTime>,
    /// Exclusive end of the daily window, or `None` for the end of day.
    pub time_end: Option<NaiveTime>,
}

impl DayTimeMask {
    /// Returns `true` when `at` falls on an admitted day and within the
    /// admitted time-of-day window.
    #[must_use]
    pub fn admits(&self, at: DateTime<Utc>) -> bool {
        if !self.days_of_week.is_empty() && !self.days_of_week.contains(&at.weekday()) {
            return false;
        }
        let time = at.time();
        self.time_start.is_none_or(|start| time >= start) && self.time_end.is_none_or(|end| time < end)
    }
}

/// A time window (open on either end) during which a tag applies, optionally
/// further narrowed by a recurring day-of-week/time-of-day mask.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TagValidityPeriod {
    /// Inclusive start of the window, or `None` for "always valid from the start of time".
    pub start: Option<DateTime<Utc>>,
    /// Exclusive end of the window, or `None` for "valid indefinitely".
    pub end: Option<DateTime<Utc>>,
    /// Optional recurring day/time narrowing within the start/end window.
    #[serde(default)]
    pub recurrence: Option<DayTimeMask>,
}

impl TagValidityPeriod {
    /// Creates a validity period with no recurrence mask.
    #[must_use]
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            recurrence: None,
        }
    }

    /// Attaches a recurring day/time mask and returns the updated period.
    #[must_use]
    pub fn with_recurrence(mut self, mask: DayTimeMask) -> Self {
        self.recurrence = Some(mask);
        self
    }

    /// Returns `true` when `at` falls within this window and, if set, the
    /// recurrence mask.
    #[must_use]
    pub fn admits(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| at >= start)
            && self.end.is_none_or(|end| at < end)
            && self.recurrence.as_ref().is_none_or(|mask| mask.admits(at))
    }
}

/// An identified tag carrying attributes and optional validity periods.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    id: TagId,
    name: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    validity_periods: Vec<TagValidityPeriod>,
}

impl Tag {
    /// Builds a tag after validating that its name is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::EmptyField`] when `name` is empty or
    /// whitespace-only.
    pub fn new(id: TagId, name: impl Into<String>) -> ModelResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::EmptyField { field: "tag name" });
        }
        Ok(Self {
            id,
            name,
            attributes: BTreeMap::new(),
            validity_periods: Vec::new(),
        })
    }

    /// Attaches an attribute and returns the updated tag.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attaches a validity period and returns the updated tag.
    #[must_use]
    pub fn with_validity_period(mut self, period: TagValidityPeriod) -> Self {
        self.validity_periods.push(period);
        self
    }

    /// Returns the tag identifier.
    #[must_use]
    pub fn id(&self) -> TagId {
        self.id
    }

    /// Returns the tag name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attribute map.
    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns `true` when the tag applies at `at`. A tag with no declared
    /// validity periods is always applicable.
    #[must_use]
    pub fn is_applicable(&self, at: DateTime<Utc>) -> bool {
        self.validity_periods.is_empty()
            || self.validity_periods.iter().any(|period| period.admits(at))
    }
}

/// A tag paired with the match type observed for the request that surfaced
/// it.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TagForEval {
    tag: Tag,
    match_type: MatchType,
}

impl TagForEval {
    /// Pairs a tag with the observed match type.
    #[must_use]
    pub fn new(tag: Tag, match_type: MatchType) -> Self {
        Self { tag, match_type }
    }

    /// Returns the underlying tag.
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Returns the match type observed for this evaluation.
    #[must_use]
    pub fn match_type(&self) -> MatchType {
        self.match_type
    }
}
