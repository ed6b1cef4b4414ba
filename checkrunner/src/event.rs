//! The event protocol and the sinks that consume it.

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Error, ExecutionOrder, Identity, Status, StatusCounts, Subresult};

/// One step of a run, as seen by reporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "UPPERCASE")]
pub enum Event {
    Start {
        order: Arc<ExecutionOrder>,
    },
    StartSection {
        identity: Identity,
    },
    StartCheck {
        identity: Identity,
    },
    Log {
        identity: Identity,
        result: Subresult,
    },
    EndCheck {
        identity: Identity,
        status: Status,
    },
    EndSection {
        identity: Identity,
        summary: StatusCounts,
    },
    End {
        counts: StatusCounts,
    },
}

impl Event {
    pub fn status(&self) -> Status {
        match self {
            Event::Start { .. } => Status::Start,
            Event::StartSection { .. } => Status::StartSection,
            Event::StartCheck { .. } => Status::StartCheck,
            Event::Log { result, .. } => result.status,
            Event::EndCheck { .. } => Status::EndCheck,
            Event::EndSection { .. } => Status::EndSection,
            Event::End { .. } => Status::End,
        }
    }

    /// `None` for the run scoped START and END.
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Event::Start { .. } | Event::End { .. } => None,
            Event::StartSection { identity }
            | Event::StartCheck { identity }
            | Event::Log { identity, .. }
            | Event::EndCheck { identity, .. }
            | Event::EndSection { identity, .. } => Some(identity),
        }
    }
}

/// Receives every event of a run, in order.
pub trait Reporter {
    fn receive(&mut self, event: &Event);
}

/// Hand `event` to each reporter in turn.
pub fn distribute(reporters: &mut [&mut dyn Reporter], event: &Event) {
    for reporter in reporters.iter_mut() {
        reporter.receive(event);
    }
}

/// Keeps every event it sees.
#[derive(Debug, Default)]
pub struct Collector {
    events: Vec<Event>,
}

impl Collector {
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

impl Reporter for Collector {
    fn receive(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

struct OpenCheck {
    identity: Identity,
    worst: Option<Status>,
}

/// Verifies the framing and bookkeeping of an event stream.
///
/// Several sections may be open at once, which parallel runs produce, but
/// checks never nest.
#[derive(Default)]
pub struct ProtocolValidator {
    expected: Option<usize>,
    ended: bool,
    sections: HashMap<SmolStr, StatusCounts>,
    check: Option<OpenCheck>,
    finished_checks: usize,
    total: StatusCounts,
    violations: Vec<String>,
}

impl ProtocolValidator {
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Ok if the stream seen so far was complete and well formed.
    pub fn finish(&self) -> Result<(), Error> {
        let mut violations = self.violations.clone();
        if !self.ended {
            violations.push("stream has no END".to_string());
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ProtocolViolation(violations.join("; ")))
        }
    }

    fn violation(&mut self, message: String) {
        self.violations.push(message);
    }

    fn section_of(identity: &Identity) -> SmolStr {
        identity.section.clone().unwrap_or_default()
    }
}

impl Reporter for ProtocolValidator {
    fn receive(&mut self, event: &Event) {
        if self.ended {
            self.violation(format!("{} after END", event.status()));
            return;
        }
        if self.expected.is_none() && !matches!(event, Event::Start { .. }) {
            self.violation(format!("{} before START", event.status()));
            return;
        }

        match event {
            Event::Start { order } => {
                if self.expected.is_some() {
                    self.violation("second START".to_string());
                }
                self.expected = Some(order.len());
            }
            Event::StartSection { identity } => {
                let section = Self::section_of(identity);
                if self.sections.insert(section.clone(), StatusCounts::new()).is_some() {
                    self.violation(format!("section {section} started twice"));
                }
            }
            Event::StartCheck { identity } => {
                if let Some(open) = &self.check {
                    let message = format!("{identity} started inside {}", open.identity);
                    self.violation(message);
                }
                if !self.sections.contains_key(&Self::section_of(identity)) {
                    self.violation(format!("{identity} started outside its section"));
                }
                self.check = Some(OpenCheck {
                    identity: identity.clone(),
                    worst: None,
                });
            }
            Event::Log { identity, result } => {
                if result.status.is_structural() {
                    self.violation(format!("{identity} logged {}", result.status));
                }
                match self.check.as_mut() {
                    Some(open) if open.identity == *identity => {
                        open.worst = open.worst.max(Some(result.status));
                    }
                    _ => self.violation(format!("log for {identity} outside of it")),
                }
            }
            Event::EndCheck { identity, status } => {
                let Some(open) = self.check.take() else {
                    self.violation(format!("{identity} ended but never started"));
                    return;
                };
                if open.identity != *identity {
                    self.violation(format!("{identity} ended while {} was open", open.identity));
                }
                if open.worst != Some(*status) {
                    self.violation(format!(
                        "{identity} ended with {status} but its worst result was {:?}",
                        open.worst
                    ));
                }
                if let Some(counts) = self.sections.get_mut(&Self::section_of(identity)) {
                    counts.add(*status);
                }
                self.finished_checks += 1;
            }
            Event::EndSection { identity, summary } => {
                let section = Self::section_of(identity);
                if let Some(open) = &self.check {
                    if open.identity.section.as_ref() == Some(&section) {
                        let message = format!("section {section} ended inside {}", open.identity);
                        self.violation(message);
                    }
                }
                match self.sections.remove(&section) {
                    Some(counts) if counts == *summary => self.total += &counts,
                    Some(counts) => {
                        self.violation(format!(
                            "section {section} summary {summary:?} but saw {counts:?}"
                        ));
                        self.total += &counts;
                    }
                    None => self.violation(format!("section {section} ended but never started")),
                }
            }
            Event::End { counts } => {
                self.ended = true;
                if let Some(open) = &self.check {
                    let message = format!("END inside {}", open.identity);
                    self.violation(message);
                }
                if !self.sections.is_empty() {
                    let mut open: Vec<_> = self.sections.keys().cloned().collect();
                    open.sort();
                    self.violation(format!("END with open sections {}", open.join(", ")));
                }
                if *counts != self.total {
                    let message = format!("END counts {counts:?} but sections saw {:?}", self.total);
                    self.violation(message);
                }
                if self.expected != Some(self.finished_checks) {
                    let message = format!(
                        "order has {:?} checks but {} ran",
                        self.expected, self.finished_checks
                    );
                    self.violation(message);
                }
            }
        }
    }
}
