//! The scheduler: expands, resolves, executes and reports checks.
//!
//! A [`CheckRunner`] walks its [`ExecutionOrder`] and turns every entry into
//! a contiguous run of events:
//!
//! ```text
//! START
//!   STARTSECTION
//!     STARTCHECK (log)* ENDCHECK
//!     ...
//!   ENDSECTION
//!   ...
//! END
//! ```
//!
//! Anything that goes wrong inside a condition or a check body is folded into
//! the stream as a SKIP or ERROR result; it never stops the run.

mod resolve;
mod session;

use std::{fmt::Debug, sync::Arc};

use indexmap::IndexMap;
use log::debug;
use smol_str::SmolStr;

use crate::{
    cache::ConditionCache, event::distribute, Args, Error, Event, ExecutionOrder, Identity,
    NameKind, Overrides, Profile, Reporter, StatusCounts, Value, Values,
};

pub use session::{CheckEvents, Events};

/// Code of the SKIP reported for a check whose conditions do not hold.
pub const UNFULFILLED_CONDITIONS: &str = "unfulfilled-conditions";
/// Code of the ERROR reported when a check's arguments can't be resolved.
pub const FAILED_DEPENDENCIES: &str = "failed-dependencies";
/// Code of the ERROR reported when a check body fails or panics.
pub const FAILED_CHECK: &str = "failed-check";
/// Code of the ERROR reported for a check that produced no valid result.
pub const NO_RESULT: &str = "no-valid-result";
/// Code of the SKIP reported for a check rejected by a skip filter.
pub const FILTERED: &str = "filtered";

/// Decides, per check id and iterated argument values, whether to skip.
///
/// Returns the reason to skip, or `None` to run the check.
pub type SkipFilter = dyn Fn(&str, &Args) -> Option<String> + Send + Sync;

#[derive(Clone)]
pub struct RunOptions {
    /// Order tokens replacing every section's default order
    pub custom_order: Option<Vec<SmolStr>>,
    /// Keep only checks whose id contains one of these
    pub explicit_checks: Vec<SmolStr>,
    /// Drop checks whose id contains one of these
    pub exclude_checks: Vec<SmolStr>,
    pub use_cache: bool,
    /// Whether values may shadow conditions and other profile names
    pub values_can_override_profile_names: bool,
    pub overrides: Overrides,
    pub skip_filter: Option<Arc<SkipFilter>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            custom_order: None,
            explicit_checks: Vec::new(),
            exclude_checks: Vec::new(),
            use_cache: true,
            values_can_override_profile_names: true,
            overrides: Overrides::default(),
            skip_filter: None,
        }
    }
}

impl Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("custom_order", &self.custom_order)
            .field("explicit_checks", &self.explicit_checks)
            .field("exclude_checks", &self.exclude_checks)
            .field("use_cache", &self.use_cache)
            .field(
                "values_can_override_profile_names",
                &self.values_can_override_profile_names,
            )
            .field("overrides", &self.overrides)
            .field("skip_filter", &self.skip_filter.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    NotStarted,
    Running,
    Done,
}

/// Runs the checks of one profile against one set of values.
///
/// Owns its condition cache; one runner is never used from two threads.
pub struct CheckRunner<'a> {
    profile: &'a Profile,
    values: Values,
    config: Value,
    options: RunOptions,
    lengths: IndexMap<SmolStr, usize>,
    order: Arc<ExecutionOrder>,
    cache: ConditionCache,
    state: RunnerState,
}

impl<'a> CheckRunner<'a> {
    pub fn new(profile: &'a Profile, values: Values, options: RunOptions) -> Result<Self, Error> {
        let mut lengths = IndexMap::new();
        for (singular, plural) in profile.iterargs() {
            let items = values
                .iterable(plural)
                .ok_or_else(|| Error::MissingIterable(plural.clone()))?;
            lengths.insert(singular.clone(), items.len());
        }

        if !options.values_can_override_profile_names {
            for name in values.names() {
                if matches!(profile.kind(name), Some(kind) if kind != NameKind::ExpectedValue) {
                    return Err(Error::ValueCollision(name.clone()));
                }
            }
        }
        profile.validate_values(&values)?;

        let order = profile.execution_order(
            &lengths,
            options.custom_order.as_deref(),
            &options.explicit_checks,
            &options.exclude_checks,
        )?;
        debug!(
            "Runner for '{}' over {:?}: {} check invocations",
            profile.name(),
            lengths,
            order.len()
        );

        Ok(CheckRunner {
            profile,
            config: Value::new(values.clone()),
            values,
            cache: ConditionCache::new(options.use_cache),
            options,
            lengths,
            order: Arc::new(order),
            state: RunnerState::NotStarted,
        })
    }

    pub fn profile(&self) -> &'a Profile {
        self.profile
    }

    pub fn values(&self) -> &Values {
        &self.values
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// The full order, fixed at construction.
    pub fn order(&self) -> &Arc<ExecutionOrder> {
        &self.order
    }

    /// Size of the input collection of each singular iterated argument.
    pub fn lengths(&self) -> &IndexMap<SmolStr, usize> {
        &self.lengths
    }

    pub fn cache(&self) -> &ConditionCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// The input element a singular iterated argument is bound to.
    pub fn iterarg_value(&self, name: &str, index: usize) -> Option<&Value> {
        let plural = self.profile.plural_of(name)?;
        self.values.iterable(plural)?.get(index)
    }

    /// The bound input elements of `identity`, by singular name.
    pub fn iterarg_values(&self, identity: &Identity) -> Args {
        let mut args = Args::new();
        for (name, index) in identity.iterargs.iter() {
            if let Some(value) = self.iterarg_value(name, index) {
                args.insert(name.clone(), value.clone());
            }
        }
        args
    }

    /// Pull style access to the whole session's events.
    pub fn events(&mut self) -> Events<'_, 'a> {
        let order = self.order.clone();
        Events::new(self, order)
    }

    /// Pull style access to a session over a subset of the order.
    pub fn events_for(&mut self, order: ExecutionOrder) -> Result<Events<'_, 'a>, Error> {
        for identity in order.iter() {
            self.check_in_order(identity)?;
        }
        Ok(Events::new(self, Arc::new(order)))
    }

    /// The events of a single check, STARTCHECK to ENDCHECK.
    pub fn check_events(&mut self, identity: &Identity) -> Result<CheckEvents<'_, 'a>, Error> {
        self.check_in_order(identity)?;
        let check = identity
            .check
            .as_deref()
            .and_then(|id| self.profile.get_check(id))
            .ok_or_else(|| Error::NotInOrder(identity.to_string()))?;
        Ok(CheckEvents::new(self, check, identity.clone()))
    }

    fn check_in_order(&self, identity: &Identity) -> Result<(), Error> {
        if !self.order.contains(identity) {
            return Err(Error::NotInOrder(identity.to_string()));
        }
        Ok(())
    }

    /// Run everything, handing every event to every reporter in turn.
    ///
    /// Returns the aggregate counts also carried by END.
    pub fn run(&mut self, reporters: &mut [&mut dyn Reporter]) -> StatusCounts {
        let mut counts = StatusCounts::new();
        for event in self.events() {
            if let Event::End { counts: end } = &event {
                counts = end.clone();
            }
            distribute(reporters, &event);
        }
        counts
    }
}

impl Debug for CheckRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRunner")
            .field("profile", self.profile.name())
            .field("lengths", &self.lengths)
            .field("state", &self.state)
            .field("order", &self.order.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use pretty_assertions::assert_eq;

    use crate::{
        test_util::{fonts, rendered, run_collect},
        Check, CheckError, CheckOutput, Collector, Condition, Message, Override, ProfileBuilder,
        ProtocolValidator, Section, Status, Subresult,
    };

    use super::*;

    fn pass(id: &str, args: &[&str]) -> Check {
        Check::new(id, id, args, |_| Ok(CheckOutput::single(Subresult::pass("ok"))))
    }

    #[test]
    fn condition_evaluated_once_per_binding() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("expensive", &["font"], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Value::from(true)))
            }))
            .section(
                Section::new("S")
                    .with_check(pass("a", &["expensive"]))
                    .with_check(pass("b", &["expensive"]).with_conditions(&["expensive"])),
            )
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(2), RunOptions::default()).unwrap();

        let font0: crate::IterArgs = [("font", 0)].into_iter().collect();
        assert!(runner.get("expensive", &font0).unwrap().is_truthy());
        assert!(runner.get("expensive", &font0).unwrap().is_truthy());
        assert_eq!(1, calls.load(Ordering::SeqCst));

        let events = run_collect(&mut runner);
        assert_eq!(2, calls.load(Ordering::SeqCst));
        assert!(runner.cache().hits() >= 4);
        assert_eq!(RunnerState::Done, runner.state());
        assert!(events.iter().all(|e| e.status() != Status::Error));
    }

    #[test]
    fn no_cache_reevaluates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("expensive", &["font"], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(Value::from(true)))
            }))
            .section(Section::new("S").with_check(pass("a", &["expensive"])))
            .build()
            .unwrap();
        let options = RunOptions {
            use_cache: false,
            ..Default::default()
        };
        let mut runner = CheckRunner::new(&profile, fonts(1), options).unwrap();
        let font0: crate::IterArgs = [("font", 0)].into_iter().collect();
        runner.get("expensive", &font0).unwrap();
        runner.get("expensive", &font0).unwrap();
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn unfulfilled_condition_skips_without_running_body() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("is_variable_font", &["font"], |_| {
                Ok(Some(Value::from(false)))
            }))
            .section(Section::new("S").with_check(
                Check::new("has_instances", "", &["font"], move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(CheckOutput::single(Subresult::pass("ok")))
                })
                .with_conditions(&["is_variable_font"]),
            ))
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(1), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(0, calls.load(Ordering::SeqCst));

        let logs: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Log { result, .. } => Some(result.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(1, logs.len());
        assert_eq!(Status::Skip, logs[0].status);
        assert_eq!(Some(UNFULFILLED_CONDITIONS), logs[0].message.code());
        assert!(logs[0].message.text().contains("is_variable_font"));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::EndCheck { status: Status::Skip, .. })));
    }

    #[test]
    fn negated_condition() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("is_cff", &["font"], |_| Ok(Some(Value::from(false)))))
            .condition(Condition::new("nothing", &["font"], |_| Ok(None)))
            .condition(Condition::new("broken", &["font"], |_| Err(CheckError::new("bad"))))
            .section(
                Section::new("S")
                    .with_check(pass("not_cff", &["font"]).with_conditions(&["not is_cff"]))
                    .with_check(pass("cff", &["font"]).with_conditions(&["is_cff"]))
                    .with_check(pass("not_nothing", &["font"]).with_conditions(&["!nothing"]))
                    .with_check(pass("not_broken", &["font"]).with_conditions(&["not broken"])),
            )
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(1), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(
            vec![
                "not_cff(font:0) PASS",
                "cff(font:0) SKIP",
                "not_nothing(font:0) PASS",
                "not_broken(font:0) SKIP",
            ],
            rendered(&events)
        );
        let broken_skip = events
            .iter()
            .find_map(|e| match e {
                Event::Log { identity, result } if identity.check.as_deref() == Some("not_broken") => {
                    Some(result.message.text().to_string())
                }
                _ => None,
            })
            .unwrap();
        assert!(broken_skip.contains("bad"), "{broken_skip}");
    }

    #[test]
    fn panic_mid_stream_becomes_error_and_run_continues() {
        let profile = ProfileBuilder::new("p")
            .section(
                Section::new("S")
                    .with_check(Check::new("divide", "", &[], |_| {
                        let zero = Arc::new(AtomicUsize::new(0));
                        Ok(CheckOutput::stream((0..3).map(move |i| {
                            if i == 2 {
                                let divisor = zero.load(Ordering::SeqCst);
                                let _ = 1 / divisor;
                            }
                            Ok(Subresult::pass(format!("step {i}")))
                        })))
                    }))
                    .with_check(pass("next", &[])),
            )
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, Values::new(), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        let statuses: Vec<_> = events.iter().map(Event::status).collect();
        assert_eq!(
            vec![
                Status::Start,
                Status::StartSection,
                Status::StartCheck,
                Status::Pass,
                Status::Pass,
                Status::Error,
                Status::EndCheck,
                Status::StartCheck,
                Status::Pass,
                Status::EndCheck,
                Status::EndSection,
                Status::End,
            ],
            statuses
        );
        let Event::Log { result, .. } = &events[5] else {
            panic!("expected a log, got {:?}", events[5]);
        };
        assert_eq!(Some(FAILED_CHECK), result.message.code());
        assert!(result.message.text().contains("divide by zero"));
        assert!(result.traceback.as_deref().unwrap_or_default().contains("runner.rs"));
        assert!(matches!(events[6], Event::EndCheck { status: Status::Error, .. }));
        assert!(matches!(events[9], Event::EndCheck { status: Status::Pass, .. }));
    }

    #[test]
    fn failing_body_and_err_items() {
        let profile = ProfileBuilder::new("p")
            .section(
                Section::new("S")
                    .with_check(Check::new("refuses", "", &[], |_| Err("no way".into())))
                    .with_check(Check::new("panics", "", &[], |_| panic!("eek")))
                    .with_check(Check::new("err_item", "", &[], |_| {
                        Ok(CheckOutput::stream(vec![
                            Ok(Subresult::warn("hmm")),
                            Err(CheckError::new("lost")),
                            Ok(Subresult::pass("never seen")),
                        ]))
                    })),
            )
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, Values::new(), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(
            vec![
                "refuses() ERROR",
                "panics() ERROR",
                "err_item() WARN",
                "err_item() ERROR",
            ],
            rendered(&events)
        );
    }

    #[test]
    fn empty_and_debug_only_results_are_errors() {
        let profile = ProfileBuilder::new("p")
            .section(
                Section::new("S")
                    .with_check(Check::new("silent", "", &[], |_| Ok(CheckOutput::results(vec![]))))
                    .with_check(Check::new("chatty", "", &[], |_| {
                        Ok(CheckOutput::single(Subresult::debug("just saying")))
                    }))
                    .with_check(Check::new("informative", "", &[], |_| {
                        Ok(CheckOutput::single(Subresult::info("fyi")))
                    })),
            )
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, Values::new(), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(
            vec![
                "silent() ERROR",
                "chatty() DEBUG",
                "chatty() ERROR",
                "informative() INFO",
            ],
            rendered(&events)
        );
        let ends: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::EndCheck { status, .. } => Some(*status),
                _ => None,
            })
            .collect();
        assert_eq!(vec![Status::Error, Status::Error, Status::Info], ends);
    }

    #[test]
    fn missing_argument_fails_dependencies() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("nothing", &["font"], |_| Ok(None)))
            .section(Section::new("S").with_check(pass("needs_nothing", &["nothing"])))
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(1), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        let log = events
            .iter()
            .find_map(|e| match e {
                Event::Log { result, .. } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(Status::Error, log.status);
        assert_eq!(Some(FAILED_DEPENDENCIES), log.message.code());
    }

    #[test]
    fn plural_once_singular_per_font_in_input_order() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .section(
                Section::new("S")
                    .with_check(pass("family", &["fonts"]))
                    .with_check(pass("single", &["font"])),
            )
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(3), RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(
            vec![
                "family() PASS",
                "single(font:0) PASS",
                "single(font:1) PASS",
                "single(font:2) PASS",
            ],
            rendered(&events)
        );
    }

    #[test]
    fn explicit_filter_totals_match() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .section(
                Section::new("S")
                    .with_check(pass("xavgcharwidth", &["font"]))
                    .with_check(pass("fstype", &["font"])),
            )
            .section(Section::new("T").with_check(pass("family/xavgcharwidth", &["fonts"])))
            .build()
            .unwrap();
        let options = RunOptions {
            explicit_checks: vec!["xavgcharwidth".into()],
            ..Default::default()
        };
        let mut runner = CheckRunner::new(&profile, fonts(2), options).unwrap();
        let events = run_collect(&mut runner);
        let Event::Start { order } = &events[0] else {
            panic!("no start");
        };
        assert_eq!(3, order.len());
        assert!(order
            .iter()
            .all(|id| id.check.as_deref().unwrap_or_default().contains("xavgcharwidth")));
        let Some(Event::End { counts }) = events.last() else {
            panic!("no end");
        };
        assert_eq!(3, counts.total());
        assert_eq!(3, counts.get(Status::Pass));
    }

    #[test]
    fn empty_order_is_start_then_end() {
        let profile = ProfileBuilder::new("p")
            .section(Section::new("S").with_check(pass("a", &[])))
            .build()
            .unwrap();
        let options = RunOptions {
            exclude_checks: vec!["a".into()],
            ..Default::default()
        };
        let mut runner = CheckRunner::new(&profile, Values::new(), options).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(2, events.len());
        assert!(matches!(&events[0], Event::Start { order } if order.is_empty()));
        assert!(matches!(&events[1], Event::End { counts } if counts.total() == 0));
    }

    #[test]
    fn overrides_restatus_with_debug_note() {
        let profile = ProfileBuilder::new("p")
            .section(Section::new("S").with_check(Check::new("fstype", "", &[], |_| {
                Ok(CheckOutput::single(Subresult::fail(Message::new("drm", "fsType is 2"))))
            })))
            .build()
            .unwrap();
        let options = RunOptions {
            overrides: Overrides::new().with("fstype", "drm", Override::status(Status::Warn)),
            ..Default::default()
        };
        let mut runner = CheckRunner::new(&profile, Values::new(), options).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(vec!["fstype() DEBUG", "fstype() WARN"], rendered(&events));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::EndCheck { status: Status::Warn, .. })));
    }

    #[test]
    fn skip_filter() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .section(Section::new("S").with_check(pass("a", &["font"])))
            .build()
            .unwrap();
        let filter: Arc<SkipFilter> = Arc::new(|_id: &str, args: &Args| {
            let font = args.get::<String>("font").ok()?;
            font.ends_with("1.ttf").then(|| "not this one".to_string())
        });
        let options = RunOptions {
            skip_filter: Some(filter),
            ..Default::default()
        };
        let mut runner = CheckRunner::new(&profile, fonts(2), options).unwrap();
        let events = run_collect(&mut runner);
        assert_eq!(vec!["a(font:0) PASS", "a(font:1) SKIP"], rendered(&events));
        let skipped = events
            .iter()
            .find_map(|e| match e {
                Event::Log { result, .. } if result.status == Status::Skip => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!("Filtered: not this one", skipped.message.text());
    }

    #[test]
    fn config_pseudo_value() {
        let profile = ProfileBuilder::new("p")
            .section(Section::new("S").with_check(Check::new("vendor", "", &["config"], |args| {
                let config = args.get::<Values>("config")?;
                let vendor = config
                    .get("vendor_id")
                    .and_then(Value::as_str)
                    .ok_or("no vendor")?
                    .to_string();
                Ok(CheckOutput::single(Subresult::pass(vendor)))
            })))
            .build()
            .unwrap();
        let values = Values::new().with("vendor_id", "GOOG");
        let mut runner = CheckRunner::new(&profile, values, RunOptions::default()).unwrap();
        let events = run_collect(&mut runner);
        let texts: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Log { result, .. } => Some(result.message.text().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(vec!["GOOG"], texts);
    }

    #[test]
    fn values_may_not_shadow_when_forbidden() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("is_ttf", &["font"], |_| Ok(Some(Value::from(true)))))
            .build()
            .unwrap();
        let options = RunOptions {
            values_can_override_profile_names: false,
            ..Default::default()
        };
        let values = fonts(1).with("is_ttf", false);
        let err = CheckRunner::new(&profile, values, options).unwrap_err();
        assert!(matches!(err, Error::ValueCollision(name) if name == "is_ttf"));
    }

    #[test]
    fn values_flag_conditions() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("is_ttf", &["font"], |_| Ok(Some(Value::from(true)))))
            .section(Section::new("S").with_check(pass("a", &["font"]).with_conditions(&["is_ttf"])))
            .build()
            .unwrap();
        let values = fonts(1).with("is_ttf", false);
        let mut runner = CheckRunner::new(&profile, values, RunOptions::default()).unwrap();
        assert_eq!(vec!["a(font:0) SKIP"], rendered(&run_collect(&mut runner)));
    }

    #[test]
    fn missing_iterable() {
        let profile = ProfileBuilder::new("p").iterarg("font", "fonts").build().unwrap();
        let err = CheckRunner::new(&profile, Values::new(), RunOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingIterable(name) if name == "fonts"));
    }

    #[test]
    fn derived_iterables() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .condition(Condition::new("upm", &["font"], |args| {
                let font = args.get::<String>("font")?;
                Ok(Some(Value::from(font.len())))
            }))
            .derived_iterable("upms", "upm", true)
            .derived_iterable("upm_pairs", "upm", false)
            .section(Section::new("S").with_check(Check::new(
                "equal",
                "",
                &["upms", "upm_pairs"],
                |args| {
                    let upms = args.list::<usize>("upms")?;
                    let pairs = args.pairs("upm_pairs")?;
                    assert_eq!(upms.len(), pairs.len());
                    assert_eq!(Some(1), pairs[1].0.get("font"));
                    Ok(CheckOutput::single(Subresult::pass(format!("{}", upms.len()))))
                },
            )))
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(3), RunOptions::default()).unwrap();
        assert_eq!(vec!["equal() PASS"], rendered(&run_collect(&mut runner)));
    }

    #[test]
    fn reporters_see_events_in_order() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .section(Section::new("S").with_check(pass("a", &["font"])))
            .section(Section::new("T").with_check(pass("b", &["fonts"])))
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(2), RunOptions::default()).unwrap();
        let mut validator = ProtocolValidator::default();
        let mut collector = Collector::default();
        let counts = runner.run(&mut [&mut validator, &mut collector]);
        assert!(validator.violations().is_empty(), "{:?}", validator.violations());
        assert_eq!(3, counts.total());
        // START, two sections with their framing, END
        assert_eq!(1 + (2 + 2 * 3) + (2 + 3) + 1, collector.events().len());
    }

    #[test]
    fn single_check_events() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .section(Section::new("S").with_check(pass("a", &["font"])))
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(2), RunOptions::default()).unwrap();
        let identity = runner.order().identities()[1].clone();
        let statuses: Vec<_> = runner
            .check_events(&identity)
            .unwrap()
            .map(|e| e.status())
            .collect();
        assert_eq!(vec![Status::StartCheck, Status::Pass, Status::EndCheck], statuses);

        let stranger = Identity::check("S", "a", [("font", 7)].into_iter().collect());
        assert!(matches!(runner.check_events(&stranger), Err(Error::NotInOrder(_))));
    }

    #[test]
    fn events_for_an_order_subset() {
        let profile = ProfileBuilder::new("p")
            .iterarg("font", "fonts")
            .section(Section::new("S").with_check(pass("a", &["font"])))
            .section(Section::new("T").with_check(pass("b", &["fonts"])))
            .build()
            .unwrap();
        let mut runner = CheckRunner::new(&profile, fonts(3), RunOptions::default()).unwrap();
        let subset = vec![
            runner.order().identities()[2].clone(),
            runner.order().identities()[3].clone(),
        ];
        let events: Vec<_> = runner
            .events_for(ExecutionOrder::new(subset.clone()))
            .unwrap()
            .collect();
        let mut validator = ProtocolValidator::default();
        for event in &events {
            validator.receive(event);
        }
        assert!(validator.finish().is_ok(), "{:?}", validator.violations());
        let ended: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::EndCheck { identity, .. } => Some(identity.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(subset, ended);
        let Some(Event::End { counts }) = events.last() else {
            panic!("no END");
        };
        assert_eq!(2, counts.total());

        let stranger = Identity::check("S", "a", [("font", 7)].into_iter().collect());
        let order = ExecutionOrder::new(vec![subset[0].clone(), stranger]);
        assert!(matches!(runner.events_for(order), Err(Error::NotInOrder(_))));
    }
}
