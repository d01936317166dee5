use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}

/// What an [`Issue`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// A missing flow weight was inferred.
    WeightInferred,
    /// A missing flow weight could not be inferred.
    WeightInferenceWarning,
    /// A requested node could not be reached from any known value.
    UnresolvedDownstreamNode,
    /// A scale-chain node has no defined beginning upstream.
    UnsetScaleNode,
    /// An observation was not used by the solve.
    IgnoredObservation,
    /// Several observations of one interface were averaged.
    AveragedObservations,
    /// Two derivations of the same node disagree within one combination.
    InconsistentDerivation,
}

/// A structured report produced while solving.
///
/// Issues are returned to the caller instead of being printed; every issue
/// recorded through [`Issues`] is also emitted as a `tracing` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub description: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.description)
    }
}

/// An ordered collection of [`Issue`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Issues(Vec<Issue>);

impl Issues {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issue and logs it at the level matching its severity.
    pub fn push(&mut self, issue: Issue) {
        match issue.severity {
            Severity::Info => tracing::info!(kind = ?issue.kind, "{}", issue.description),
            Severity::Warning => tracing::warn!(kind = ?issue.kind, "{}", issue.description),
            Severity::Error => tracing::error!(kind = ?issue.kind, "{}", issue.description),
        }
        self.0.push(issue);
    }

    /// Records an `INFO` issue.
    pub fn info(&mut self, kind: IssueKind, description: impl Into<String>) {
        self.record(Severity::Info, kind, description);
    }

    /// Records a `WARNING` issue.
    pub fn warning(&mut self, kind: IssueKind, description: impl Into<String>) {
        self.record(Severity::Warning, kind, description);
    }

    /// Records an `ERROR` issue.
    pub fn error(&mut self, kind: IssueKind, description: impl Into<String>) {
        self.record(Severity::Error, kind, description);
    }

    /// Moves all issues of `other` into this collection, without logging them again.
    pub fn append(&mut self, other: Issues) {
        self.0.extend(other.0);
    }

    /// Returns `true` if any issue has [`Severity::Error`].
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|issue| issue.severity == Severity::Error)
    }

    /// Returns an iterator over the issues of the given kind.
    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.0.iter().filter(move |issue| issue.kind == kind)
    }

    /// Returns an iterator over all issues, in the order they were recorded.
    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn record(&mut self, severity: Severity, kind: IssueKind, description: impl Into<String>) {
        self.push(Issue {
            severity,
            kind,
            description: description.into(),
        });
    }
}

impl<'a> IntoIterator for &'a Issues {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Issues {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
