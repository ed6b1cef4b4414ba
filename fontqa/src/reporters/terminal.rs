//! Human readable output.

use std::{collections::HashMap, io, io::Write};

use checkrunner::{gather_by, Event, GatherBy, GroupKey, Identity, Profile, Reporter, Status, StatusCounts};
use indexmap::IndexMap;
use smol_str::SmolStr;

use super::colored_status;

/// Prints checks whose result reaches `check_level`, with their log lines
/// at or above `log_level`, followed by section and run summaries.
///
/// Output for a check is held back until its result is known.
pub struct TerminalReporter<'a, W: Write> {
    out: W,
    profile: &'a Profile,
    check_level: Status,
    log_level: Status,
    gather: Option<GatherBy>,
    /// iterarg name -> how to show each index
    labels: HashMap<SmolStr, Vec<String>>,
    pending: Vec<String>,
    ends: Vec<Event>,
    error: Option<io::Error>,
}

impl<'a, W: Write> TerminalReporter<'a, W> {
    pub fn new(out: W, profile: &'a Profile, check_level: Status, log_level: Status) -> Self {
        TerminalReporter {
            out,
            profile,
            check_level,
            log_level,
            gather: None,
            labels: HashMap::new(),
            pending: Vec::new(),
            ends: Vec::new(),
            error: None,
        }
    }

    /// Summarize results per group at the end of the run.
    pub fn gather_by(mut self, gather: GatherBy) -> Self {
        self.gather = Some(gather);
        self
    }

    pub fn with_labels(mut self, iterarg: impl Into<SmolStr>, labels: Vec<String>) -> Self {
        self.labels.insert(iterarg.into(), labels);
        self
    }

    /// The writer, or the first error writing to it.
    pub fn finish(self) -> Result<W, io::Error> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.out),
        }
    }

    fn emit(&mut self, text: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = writeln!(self.out, "{text}") {
            self.error = Some(e);
        }
    }

    fn label(&self, name: &str, index: usize) -> String {
        self.labels
            .get(name)
            .and_then(|labels| labels.get(index))
            .cloned()
            .unwrap_or_else(|| format!("{name}[{index}]"))
    }

    fn check_header(&self, identity: &Identity) -> Vec<String> {
        let check = identity.check.clone().unwrap_or_default();
        let mut lines = vec![format!(" >> {check}")];
        if let Some(check) = self.profile.get_check(&check) {
            lines.push(format!("    {}", check.description()));
        }
        if let Some((name, index)) = identity.iterargs.iter().next() {
            lines.push(format!("    with {}", self.label(name, index)));
        }
        lines.push(String::new());
        lines
    }

    fn counts(&self, counts: &StatusCounts) -> Vec<String> {
        Status::LOG_STATUSES
            .iter()
            .rev()
            .filter(|status| **status != Status::Debug)
            .map(|status| format!("    {}: {}", colored_status(*status), counts.get(*status)))
            .collect()
    }

    fn gathered(&mut self) {
        let Some(gather) = self.gather.clone() else {
            return;
        };
        let by = match &gather {
            GatherBy::Iterarg(name) => name.to_string(),
            GatherBy::Check => "*check".to_string(),
        };
        self.emit(&format!("Collected results by {by}"));
        let groups: IndexMap<GroupKey, Vec<Event>> = gather_by(&self.ends, &gather);
        for (key, events) in groups {
            let counts: StatusCounts = events
                .iter()
                .filter_map(|e| match e {
                    Event::EndCheck { status, .. } => Some(*status),
                    _ => None,
                })
                .collect();
            let value = match (&key, &gather) {
                (GroupKey::Index(index), GatherBy::Iterarg(name)) => self.label(name, *index),
                (GroupKey::Check(check), _) => check.to_string(),
                _ => format!("(not using \"{by}\")"),
            };
            self.emit(&format!("{by}: {value}"));
            for line in self.counts(&counts) {
                self.emit(&line);
            }
            self.emit("");
        }
    }
}

impl<W: Write> Reporter for TerminalReporter<'_, W> {
    fn receive(&mut self, event: &Event) {
        match event {
            Event::Start { order } => {
                self.emit(&format!(
                    "Start ... running {} individual check executions.",
                    order.len()
                ));
                self.emit("");
            }
            Event::StartSection { .. } => (),
            Event::StartCheck { identity } => self.pending = self.check_header(identity),
            Event::Log { result, .. } => {
                if result.status < self.log_level {
                    return;
                }
                self.pending
                    .push(format!("    {} {}", colored_status(result.status), result.message));
                if let Some(traceback) = &result.traceback {
                    for line in traceback.lines() {
                        self.pending.push(format!("      \u{21b3} {line}"));
                    }
                }
            }
            Event::EndCheck { status, .. } => {
                let pending = std::mem::take(&mut self.pending);
                if *status >= self.check_level {
                    for line in pending {
                        self.emit(&line);
                    }
                    self.emit(&format!("    Result: {}", colored_status(*status)));
                    self.emit("");
                }
                if self.gather.is_some() {
                    self.ends.push(event.clone());
                }
            }
            Event::EndSection { identity, summary } => {
                let section = identity.section.clone().unwrap_or_default();
                self.emit(&format!("======== Section results: {section} ========"));
                let checks = summary.total();
                let noun = if checks == 1 { "check" } else { "checks" };
                self.emit(&format!("{checks} {noun} in section"));
                self.emit("");
                for line in self.counts(summary) {
                    self.emit(&line);
                }
                self.emit("");
            }
            Event::End { counts } => {
                self.gathered();
                self.emit("Total:");
                self.emit("");
                for line in self.counts(counts) {
                    self.emit(&line);
                }
                self.emit("");
                if let Err(e) = self.out.flush() {
                    self.error.get_or_insert(e);
                }
            }
        }
    }
}
