//! The ordered status enumeration shared by checks, events and reporters.

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    ops::AddAssign,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Severity of a log line, or a structural marker framing the event stream.
///
/// The derived order is the total order used both for filtering and for the
/// worst status of a check. Structural statuses sort below every log status
/// and are never check results.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// First event of a run, carries the execution order
    Start,
    /// Last event of a run, carries the aggregate counts
    End,
    StartSection,
    EndSection,
    StartCheck,
    /// Closes a check, carries its worst status
    EndCheck,
    /// Silent by default, not a valid check result on its own
    Debug,
    Info,
    Skip,
    Pass,
    Warn,
    Fail,
    /// Something a programmer must fix
    Error,
}

impl Status {
    /// Every status that may be yielded by a check, ascending.
    pub const LOG_STATUSES: [Status; 7] = [
        Status::Debug,
        Status::Info,
        Status::Skip,
        Status::Pass,
        Status::Warn,
        Status::Fail,
        Status::Error,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Status::Start => "START",
            Status::End => "END",
            Status::StartSection => "STARTSECTION",
            Status::EndSection => "ENDSECTION",
            Status::StartCheck => "STARTCHECK",
            Status::EndCheck => "ENDCHECK",
            Status::Debug => "DEBUG",
            Status::Info => "INFO",
            Status::Skip => "SKIP",
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
        }
    }

    /// Numeric weight; structural statuses are negative, log statuses start at 0.
    pub fn weight(&self) -> i8 {
        *self as i8 - Status::Debug as i8
    }

    pub fn is_structural(&self) -> bool {
        *self < Status::Debug
    }

    /// True for statuses that make a run fail by default.
    pub fn is_failing(&self) -> bool {
        *self >= Status::Fail
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Debug for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Status {}>", self.name())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        [
            Status::Start,
            Status::End,
            Status::StartSection,
            Status::EndSection,
            Status::StartCheck,
            Status::EndCheck,
        ]
        .into_iter()
        .chain(Status::LOG_STATUSES)
        .find(|status| status.name() == upper)
        .ok_or_else(|| Error::UnknownStatus(s.to_string()))
    }
}

/// Counts of check results by status.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCounts(BTreeMap<Status, usize>);

impl StatusCounts {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add(&mut self, status: Status) {
        *self.0.entry(status).or_default() += 1;
    }

    pub fn get(&self, status: Status) -> usize {
        self.0.get(&status).copied().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// The worst status counted at least once.
    pub fn worst(&self) -> Option<Status> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(status, _)| *status)
            .max()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Status, usize)> + '_ {
        self.0.iter().map(|(status, count)| (*status, *count))
    }
}

impl AddAssign<&StatusCounts> for StatusCounts {
    fn add_assign(&mut self, rhs: &StatusCounts) {
        for (status, count) in rhs.iter() {
            *self.0.entry(status).or_default() += count;
        }
    }
}

impl FromIterator<Status> for StatusCounts {
    fn from_iter<T: IntoIterator<Item = Status>>(iter: T) -> Self {
        let mut counts = StatusCounts::new();
        for status in iter {
            counts.add(status);
        }
        counts
    }
}
