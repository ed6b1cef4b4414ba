//! Command line arguments

use std::path::PathBuf;

use checkrunner::Status;
use clap::Parser;

/// Which fonts shall we check today?
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "fontqa", version)]
pub struct Args {
    /// Font files to check
    #[arg(required_unless_present = "list_checks")]
    pub fonts: Vec<PathBuf>,

    /// Only run checks whose id contains this text. May be repeated.
    #[arg(short = 'c', long = "checkid")]
    pub checkid: Vec<String>,

    /// Skip checks whose id contains this text. May be repeated.
    #[arg(short = 'x', long = "exclude-checkid")]
    pub exclude_checkid: Vec<String>,

    /// Comma separated order tokens, e.g. `*check,font` or `font,*iterargs`
    #[arg(short, long, value_delimiter = ',')]
    pub order: Vec<String>,

    /// Report checks whose result is this status or worse
    #[arg(short, long)]
    #[clap(default_value = "WARN")]
    pub loglevel: Status,

    /// Report log messages of this status or worse. Defaults to --loglevel.
    #[arg(short = 'm', long)]
    pub loglevel_messages: Option<Status>,

    /// Number of worker threads, 1 runs everything on the calling thread
    #[arg(short, long)]
    #[clap(default_value = "1")]
    pub jobs: usize,

    /// Write a JSON report to this file
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Cluster reported results by an iterated argument, e.g. `font`, or `*check`
    #[arg(long)]
    pub gather_by: Option<String>,

    /// Exit with an error code if any check result is this status or worse
    #[arg(long)]
    #[clap(default_value = "FAIL")]
    pub error_code_on: Status,

    /// A YAML file with check selection, status overrides and values for checks
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the checks of the profile and exit
    #[arg(long)]
    pub list_checks: bool,

    /// Evaluate conditions every time they're needed
    #[arg(long)]
    pub no_cache: bool,
}

impl Args {
    /// Threshold for individual log lines
    pub fn message_level(&self) -> Status {
        self.loglevel_messages.unwrap_or(self.loglevel)
    }

    #[cfg(test)]
    pub fn for_test(fonts: &[&std::path::Path]) -> Args {
        Args {
            fonts: fonts.iter().map(|p| p.to_path_buf()).collect(),
            checkid: Vec::new(),
            exclude_checkid: Vec::new(),
            order: Vec::new(),
            loglevel: Status::Warn,
            loglevel_messages: None,
            jobs: 1,
            json: None,
            gather_by: None,
            error_code_on: Status::Fail,
            config: None,
            list_checks: false,
            no_cache: false,
        }
    }
}
