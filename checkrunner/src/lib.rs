//! Dependency-driven execution of checks.
//!
//! A [`Profile`] registers conditions, checks and the iterated arguments they
//! range over. A [`CheckRunner`] expands the profile against a set of
//! [`Values`] into an [`ExecutionOrder`], resolves each check's arguments
//! through a memoizing condition cache and reports everything as a stream of
//! [`Event`]s.

pub mod cache;
mod check;
mod condition;
mod error;
pub mod event;
pub mod gather;
mod identity;
mod message;
pub mod order;
mod overrides;
pub mod parallel;
mod profile;
mod runner;
mod status;
#[cfg(test)]
mod test_util;
pub mod unwind;
mod value;

pub use cache::MissingValue;
pub use check::{Args, Check, CheckFn, CheckOutput, SubresultStream};
pub use condition::{Condition, ConditionExpr, ConditionFn};
pub use error::{CheckError, Error};
pub use event::{Collector, Event, ProtocolValidator, Reporter};
pub use gather::{gather_by, GatherBy, GroupKey};
pub use identity::{Identity, IterArgs};
pub use message::{Message, Subresult};
pub use order::ExecutionOrder;
pub use overrides::{Override, Overrides};
pub use parallel::{CheckReport, JobDescriptor, ParallelRunner};
pub use profile::{
    DerivedIterable, ExpectedValue, NameKind, Profile, ProfileBuilder, Section, PSEUDO_VALUES,
};
pub use runner::{
    CheckEvents, CheckRunner, Events, RunOptions, RunnerState, SkipFilter, FAILED_CHECK,
    FAILED_DEPENDENCIES, FILTERED, NO_RESULT, UNFULFILLED_CONDITIONS,
};
pub use status::{Status, StatusCounts};
pub use value::{Value, Values};
