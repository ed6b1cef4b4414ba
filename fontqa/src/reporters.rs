//! Consumers of the event stream that fontqa ships with.

mod json;
mod terminal;

use checkrunner::{Event, Reporter, Status};
use colored::{ColoredString, Colorize};

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

/// Tracks the worst check result, to pick an exit code.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorstStatus(Option<Status>);

impl WorstStatus {
    pub fn worst(&self) -> Option<Status> {
        self.0
    }
}

impl Reporter for WorstStatus {
    fn receive(&mut self, event: &Event) {
        if let Event::EndCheck { status, .. } = event {
            self.0 = self.0.max(Some(*status));
        }
    }
}

fn colored_status(status: Status) -> ColoredString {
    let name = status.name();
    match status {
        Status::Error => name.bold().red(),
        Status::Fail => name.red(),
        Status::Warn => name.yellow(),
        Status::Pass => name.green(),
        Status::Skip => name.blue(),
        Status::Info => name.cyan(),
        _ => name.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use checkrunner::{Identity, IterArgs, StatusCounts};
    use pretty_assertions::assert_eq;

    use super::*;

    fn end_check(status: Status) -> Event {
        Event::EndCheck {
            identity: Identity::check("S", "c", IterArgs::new()),
            status,
        }
    }

    #[test]
    fn worst_of_end_checks() {
        let mut worst = WorstStatus::default();
        assert_eq!(None, worst.worst());
        for event in [
            end_check(Status::Pass),
            end_check(Status::Warn),
            end_check(Status::Info),
            Event::End {
                counts: StatusCounts::new(),
            },
        ] {
            worst.receive(&event);
        }
        assert_eq!(Some(Status::Warn), worst.worst());
    }
}
