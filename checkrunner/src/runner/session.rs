//! Pull based event production for a whole session and for single checks.

use std::{collections::VecDeque, sync::Arc};

use log::{debug, warn};
use smol_str::SmolStr;

use crate::{
    cache::MissingValue, unwind, Check, Event, ExecutionOrder, Identity, Message, Status,
    StatusCounts, Subresult, SubresultStream,
};

use super::{
    CheckRunner, RunnerState, FAILED_CHECK, FAILED_DEPENDENCIES, FILTERED, NO_RESULT,
    UNFULFILLED_CONDITIONS,
};

/// What a check resolved to before any of its results are pulled.
enum Prepared {
    /// Results decided without running the body, or the body failed outright
    Results(Vec<Subresult>),
    Stream(SubresultStream),
}

fn failed_check(message: &str, traceback: Option<String>) -> Subresult {
    let result = Subresult::error(Message::new(FAILED_CHECK, format!("Failed with {message}")));
    match traceback {
        Some(traceback) => result.with_traceback(traceback),
        None => result,
    }
}

impl<'a> CheckRunner<'a> {
    fn prepare(&mut self, check: &'a Check, identity: &Identity) -> Prepared {
        if let Some(filter) = self.options.skip_filter.clone() {
            let iterargs = self.iterarg_values(identity);
            if let Some(reason) = filter(check.id(), &iterargs) {
                return Prepared::Results(vec![Subresult::skip(Message::new(
                    FILTERED,
                    format!("Filtered: {reason}"),
                ))]);
            }
        }

        let mut unfulfilled = Vec::new();
        for expr in check.conditions() {
            match self.get(&expr.name, &identity.iterargs) {
                Ok(value) if expr.is_met(value.is_truthy()) => (),
                Err(MissingValue::Undefined(_)) if expr.is_met(false) => (),
                Ok(_) | Err(MissingValue::Undefined(_)) => unfulfilled.push(expr.to_string()),
                Err(MissingValue::Failed { message, .. }) => {
                    unfulfilled.push(format!("{expr} ({message})"))
                }
            }
        }
        if !unfulfilled.is_empty() {
            return Prepared::Results(vec![Subresult::skip(Message::new(
                UNFULFILLED_CONDITIONS,
                format!("Unfulfilled Conditions: {}", unfulfilled.join(", ")),
            ))]);
        }

        let args = match self.resolve_args(check.args(), &identity.iterargs) {
            Ok(args) => args,
            Err(missing) => {
                return Prepared::Results(vec![Subresult::error(Message::new(
                    FAILED_DEPENDENCIES,
                    format!("The check {} could not be run: {missing}", check.id()),
                ))])
            }
        };

        debug!("Run {identity}");
        match unwind::catch(|| check.call(&args)) {
            Ok(Ok(output)) => Prepared::Stream(output.into_stream()),
            Ok(Err(e)) => Prepared::Results(vec![failed_check(e.message(), None)]),
            Err(panic) => {
                Prepared::Results(vec![failed_check(&panic.message, Some(panic.traceback))])
            }
        }
    }
}

enum Stage {
    Start,
    Resolve,
    Body(SubresultStream),
    Flush,
    Close,
    Done,
}

/// The state of one check invocation, independent of the runner it uses.
pub(crate) struct CheckExecution<'a> {
    check: &'a Check,
    identity: Identity,
    stage: Stage,
    worst: Option<Status>,
    pending: VecDeque<Subresult>,
}

impl<'a> CheckExecution<'a> {
    pub(crate) fn new(check: &'a Check, identity: Identity) -> Self {
        CheckExecution {
            check,
            identity,
            stage: Stage::Start,
            worst: None,
            pending: VecDeque::new(),
        }
    }

    fn log(&mut self, result: Subresult) -> Event {
        self.worst = self.worst.max(Some(result.status));
        Event::Log {
            identity: self.identity.clone(),
            result,
        }
    }

    fn accept(&mut self, runner: &CheckRunner<'a>, result: Subresult) {
        let (note, result) = runner.options.overrides.apply(self.check.id(), result);
        self.pending.extend(note);
        self.pending.push_back(result);
    }

    /// The ERROR owed by a check that produced no valid result.
    fn invalid_result(&self) -> Option<Subresult> {
        let text = match self.worst {
            None => format!("The check {} did not yield any status", self.check.id()),
            Some(worst) if worst < Status::Info => format!(
                "The most significant status of {} was only {worst} but the minimum is {}",
                self.check.id(),
                Status::Info
            ),
            Some(_) => return None,
        };
        Some(Subresult::error(Message::new(NO_RESULT, text)))
    }

    pub(crate) fn next_event(&mut self, runner: &mut CheckRunner<'a>) -> Option<Event> {
        loop {
            match std::mem::replace(&mut self.stage, Stage::Done) {
                Stage::Start => {
                    self.stage = Stage::Resolve;
                    return Some(Event::StartCheck {
                        identity: self.identity.clone(),
                    });
                }
                Stage::Resolve => {
                    self.stage = match runner.prepare(self.check, &self.identity) {
                        Prepared::Results(results) => {
                            self.pending.extend(results);
                            Stage::Flush
                        }
                        Prepared::Stream(stream) => Stage::Body(stream),
                    };
                }
                Stage::Body(mut stream) => {
                    if let Some(result) = self.pending.pop_front() {
                        self.stage = Stage::Body(stream);
                        return Some(self.log(result));
                    }
                    self.stage = match unwind::catch(|| stream.next()) {
                        Ok(Some(Ok(result))) => {
                            self.accept(runner, result);
                            Stage::Body(stream)
                        }
                        Ok(Some(Err(e))) => {
                            self.pending.push_back(failed_check(e.message(), None));
                            Stage::Flush
                        }
                        Ok(None) => Stage::Flush,
                        Err(panic) => {
                            self.pending
                                .push_back(failed_check(&panic.message, Some(panic.traceback)));
                            Stage::Flush
                        }
                    };
                }
                Stage::Flush => {
                    if let Some(result) = self.pending.pop_front() {
                        self.stage = Stage::Flush;
                        return Some(self.log(result));
                    }
                    self.stage = Stage::Close;
                }
                Stage::Close => {
                    if let Some(result) = self.invalid_result() {
                        self.stage = Stage::Close;
                        return Some(self.log(result));
                    }
                    let status = self.worst.unwrap_or(Status::Error);
                    debug!("{} {status}", self.identity);
                    return Some(Event::EndCheck {
                        identity: self.identity.clone(),
                        status,
                    });
                }
                Stage::Done => return None,
            }
        }
    }
}

/// The events of one check: STARTCHECK, its results, ENDCHECK.
pub struct CheckEvents<'r, 'a> {
    runner: &'r mut CheckRunner<'a>,
    execution: CheckExecution<'a>,
}

impl<'r, 'a> CheckEvents<'r, 'a> {
    pub(crate) fn new(runner: &'r mut CheckRunner<'a>, check: &'a Check, identity: Identity) -> Self {
        CheckEvents {
            runner,
            execution: CheckExecution::new(check, identity),
        }
    }
}

impl Iterator for CheckEvents<'_, '_> {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.execution.next_event(self.runner)
    }
}

/// Every event of a session, START to END.
///
/// Checks run as the iterator is pulled; dropping it part way leaves the
/// remaining checks unrun.
pub struct Events<'r, 'a> {
    runner: &'r mut CheckRunner<'a>,
    order: Arc<ExecutionOrder>,
    next: usize,
    started: bool,
    ended: bool,
    section: Option<(SmolStr, StatusCounts)>,
    total: StatusCounts,
    current: Option<CheckExecution<'a>>,
}

impl<'r, 'a> Events<'r, 'a> {
    pub(crate) fn new(runner: &'r mut CheckRunner<'a>, order: Arc<ExecutionOrder>) -> Self {
        Events {
            runner,
            order,
            next: 0,
            started: false,
            ended: false,
            section: None,
            total: StatusCounts::new(),
            current: None,
        }
    }

    fn end_section(&mut self) -> Option<Event> {
        let (name, summary) = self.section.take()?;
        self.total += &summary;
        Some(Event::EndSection {
            identity: Identity::section(name),
            summary,
        })
    }
}

impl Iterator for Events<'_, '_> {
    type Item = Event;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            self.runner.state = RunnerState::Running;
            return Some(Event::Start {
                order: self.order.clone(),
            });
        }
        loop {
            if let Some(execution) = self.current.as_mut() {
                let event = execution.next_event(self.runner);
                if let Some(Event::EndCheck { status, .. }) = &event {
                    if let Some((_, summary)) = self.section.as_mut() {
                        summary.add(*status);
                    }
                    self.current = None;
                }
                if event.is_some() {
                    return event;
                }
                self.current = None;
                continue;
            }

            let order = self.order.clone();
            let Some(identity) = order.identities().get(self.next) else {
                if let Some(event) = self.end_section() {
                    return Some(event);
                }
                if self.ended {
                    return None;
                }
                self.ended = true;
                self.runner.state = RunnerState::Done;
                return Some(Event::End {
                    counts: self.total.clone(),
                });
            };

            let section = identity.section.clone().unwrap_or_default();
            match &self.section {
                Some((open, _)) if *open != section => return self.end_section(),
                Some(_) => (),
                None => {
                    self.section = Some((section.clone(), StatusCounts::new()));
                    return Some(Event::StartSection {
                        identity: Identity::section(section),
                    });
                }
            }

            self.next += 1;
            let check = identity
                .check
                .as_deref()
                .and_then(|id| self.runner.profile.get_check(id));
            match check {
                Some(check) => self.current = Some(CheckExecution::new(check, identity.clone())),
                None => warn!("Nothing to run for {identity}"),
            }
        }
    }
}
