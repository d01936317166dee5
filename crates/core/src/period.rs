//! Time period labels.
//!
//! A period is either a specific year (`2010`), a specific month (`2010-03`,
//! `03-2010`, `2010/03`, ...), or one of the generic literals `Year` and
//! `Month`. Generic periods stand for every specific period of the same
//! granularity and are expanded before solving.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The granularity shared by all periods of one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Year,
    Month,
}

/// A parsed time period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimePeriod {
    /// The generic `Year` literal.
    AnyYear,
    /// The generic `Month` literal.
    AnyMonth,
    Year(u16),
    Month { year: u16, month: u8 },
}

/// Errors that can occur when parsing or classifying periods.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("invalid time period label '{label}'")]
    Invalid { label: String },

    #[error("time periods mix granularities: '{first}' and '{offending}'")]
    MixedGranularity {
        first: TimePeriod,
        offending: TimePeriod,
    },

    #[error("no time periods to classify")]
    Empty,
}

impl TimePeriod {
    /// Returns the granularity of this period.
    #[must_use]
    pub fn granularity(self) -> Granularity {
        match self {
            Self::AnyYear | Self::Year(_) => Granularity::Year,
            Self::AnyMonth | Self::Month { .. } => Granularity::Month,
        }
    }

    /// Returns `true` for the generic `Year` and `Month` literals.
    #[must_use]
    pub fn is_generic(self) -> bool {
        matches!(self, Self::AnyYear | Self::AnyMonth)
    }

    /// Returns the generic literal with this period's granularity.
    #[must_use]
    pub fn generic(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Year => Self::AnyYear,
            Granularity::Month => Self::AnyMonth,
        }
    }

    /// Returns `true` if an observation labelled `self` applies to `period`.
    ///
    /// A period covers itself, and a generic literal covers every specific
    /// period of its granularity.
    #[must_use]
    pub fn covers(self, period: TimePeriod) -> bool {
        self == period || (self.is_generic() && self.granularity() == period.granularity())
    }
}

/// Determines the single granularity shared by `periods`.
///
/// # Errors
///
/// Returns [`PeriodError::MixedGranularity`] if years and months are mixed,
/// naming the first period and the first one that disagrees with it, or
/// [`PeriodError::Empty`] if there is nothing to classify.
///
/// # Examples
///
/// ```
/// use flowquant_core::period::{Granularity, TimePeriod, classify};
///
/// let periods: Vec<TimePeriod> = ["Year", "2010", "2011"]
///     .iter()
///     .map(|label| label.parse().unwrap())
///     .collect();
/// assert_eq!(classify(&periods), Ok(Granularity::Year));
/// ```
pub fn classify<'a>(
    periods: impl IntoIterator<Item = &'a TimePeriod>,
) -> Result<Granularity, PeriodError> {
    let mut periods = periods.into_iter();
    let first = *periods.next().ok_or(PeriodError::Empty)?;
    let granularity = first.granularity();

    match periods.find(|period| period.granularity() != granularity) {
        Some(offending) => Err(PeriodError::MixedGranularity {
            first,
            offending: *offending,
        }),
        None => Ok(granularity),
    }
}

/// Returns the periods a solve iterates over.
///
/// These are the specific periods among `periods`; generic labels add
/// nothing unless no specific period exists, in which case the generic label
/// itself is the single period solved.
///
/// # Errors
///
/// Fails like [`classify`] when the labels mix granularities or are empty.
///
/// # Examples
///
/// ```
/// use flowquant_core::period::{TimePeriod, expand_generic};
///
/// let labels: Vec<TimePeriod> = ["Year", "2011", "2010", "2011"]
///     .iter()
///     .map(|label| label.parse().unwrap())
///     .collect();
/// let periods: Vec<_> = expand_generic(&labels).unwrap().into_iter().collect();
/// assert_eq!(periods, vec![TimePeriod::Year(2010), TimePeriod::Year(2011)]);
/// ```
pub fn expand_generic<'a>(
    periods: impl IntoIterator<Item = &'a TimePeriod>,
) -> Result<BTreeSet<TimePeriod>, PeriodError> {
    let periods: Vec<TimePeriod> = periods.into_iter().copied().collect();
    let granularity = classify(&periods)?;

    let specific: BTreeSet<TimePeriod> = periods
        .into_iter()
        .filter(|period| !period.is_generic())
        .collect();

    if specific.is_empty() {
        Ok(BTreeSet::from([TimePeriod::generic(granularity)]))
    } else {
        Ok(specific)
    }
}

impl FromStr for TimePeriod {
    type Err = PeriodError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let label = label.trim();
        let invalid = || PeriodError::Invalid {
            label: label.to_string(),
        };

        if label.eq_ignore_ascii_case("year") {
            return Ok(Self::AnyYear);
        }
        if label.eq_ignore_ascii_case("month") {
            return Ok(Self::AnyMonth);
        }
        if let Some(year) = parse_year(label) {
            return Ok(Self::Year(year));
        }

        let (left, right) = label.split_once(['-', '/']).ok_or_else(invalid)?;
        let (year, month) = match (parse_year(left), parse_year(right)) {
            (Some(year), None) => (year, parse_month(right)),
            (None, Some(year)) => (year, parse_month(left)),
            _ => return Err(invalid()),
        };
        let month = month.ok_or_else(invalid)?;

        Ok(Self::Month { year, month })
    }
}

fn parse_year(text: &str) -> Option<u16> {
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

fn parse_month(text: &str) -> Option<u8> {
    if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|month| (1..=12).contains(month))
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyYear => f.write_str("Year"),
            Self::AnyMonth => f.write_str("Month"),
            Self::Year(year) => write!(f, "{year:04}"),
            Self::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl TryFrom<String> for TimePeriod {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimePeriod> for String {
    fn from(value: TimePeriod) -> Self {
        value.to_string()
    }
}
