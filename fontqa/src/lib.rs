//! Quality assurance checks for font files.

mod args;
mod config;
mod error;
pub mod font;
pub mod reporters;
#[cfg(test)]
mod test_util;
pub mod universal;

pub use args::Args;
pub use config::Config;
pub use error::Error;

use std::{io::Write, path::PathBuf};

use checkrunner::{
    CheckRunner, GatherBy, ParallelRunner, Profile, Reporter, Status, StatusCounts, Value,
};
use log::{debug, info};

use reporters::{JsonReporter, TerminalReporter, WorstStatus};

/// What a run found.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Outcome {
    pub counts: StatusCounts,
    pub worst: Option<Status>,
}

impl Outcome {
    /// Whether the worst result reached `threshold`.
    pub fn is_failure(&self, threshold: Status) -> bool {
        self.worst.is_some_and(|worst| worst >= threshold)
    }
}

fn list_checks(profile: &Profile, mut out: impl Write) -> Result<Outcome, Error> {
    for section in profile.sections() {
        writeln!(out, "{}", section.name()).map_err(Error::StdioWriteFail)?;
        for check in section.checks() {
            writeln!(out, "  {}: {}", check.id(), check.description())
                .map_err(Error::StdioWriteFail)?;
        }
    }
    Ok(Outcome::default())
}

fn gather_by(profile: &Profile, by: &str) -> Result<GatherBy, Error> {
    let gather: GatherBy = by.parse().unwrap_or_else(|never| match never {});
    match &gather {
        GatherBy::Iterarg(name) if !profile.iterargs().contains_key(name) => {
            Err(Error::UnknownGatherBy(by.to_string()))
        }
        _ => Ok(gather),
    }
}

/// Check `args.fonts` against the universal profile, reporting to `out`.
pub fn run(args: &Args, out: impl Write) -> Result<Outcome, Error> {
    let config = Config::from_args(args)?;
    let profile = universal::universal()?;
    if args.list_checks {
        return list_checks(&profile, out);
    }
    if args.fonts.is_empty() {
        return Err(Error::NoInput);
    }

    let mut values = config.values();
    values.insert_iterable(
        "fonts",
        args.fonts.iter().cloned().map(Value::new).collect(),
    );
    let options = config.run_options(!args.no_cache);
    debug!("{options:?}");

    let labels: Vec<_> = args
        .fonts
        .iter()
        .map(|font: &PathBuf| font.display().to_string())
        .collect();
    let gather = args
        .gather_by
        .as_deref()
        .map(|by| gather_by(&profile, by))
        .transpose()?;

    let mut terminal =
        TerminalReporter::new(out, &profile, args.loglevel, args.message_level())
            .with_labels("font", labels.clone());
    let mut json = args
        .json
        .as_ref()
        .map(|_| JsonReporter::new(&profile, labels));
    if let Some(gather) = gather {
        terminal = terminal.gather_by(gather.clone());
        json = json.map(|json| json.gather_by(gather));
    }
    let mut worst = WorstStatus::default();

    let counts = {
        let mut reporters: Vec<&mut dyn Reporter> = vec![&mut terminal, &mut worst];
        if let Some(json) = json.as_mut() {
            reporters.push(json);
        }
        if args.jobs > 1 {
            info!("Running on {} threads", args.jobs);
            ParallelRunner::new(&profile, values, options, args.jobs)?.run(&mut reporters)?
        } else {
            CheckRunner::new(&profile, values, options)?.run(&mut reporters)
        }
    };
    terminal.finish().map_err(Error::StdioWriteFail)?;
    if let (Some(json), Some(path)) = (json, &args.json) {
        json.write(path)?;
        info!("Wrote {path:?}");
    }

    Ok(Outcome {
        counts,
        worst: worst.worst(),
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    use crate::test_util::FontBuilder;

    use super::*;

    fn fonts(dir: &Path) -> Vec<PathBuf> {
        vec![
            FontBuilder::new().write(&dir.join("Family-Regular.ttf")),
            FontBuilder::new()
                .fs_type(0x0004)
                .write(&dir.join("Family-Bold.ttf")),
        ]
    }

    fn run_quietly(args: &Args) -> (Outcome, String) {
        colored::control::set_override(false);
        let mut out = Vec::new();
        let outcome = run(args, &mut out).unwrap();
        (outcome, String::from_utf8(out).unwrap())
    }

    #[test]
    fn reports_drm() {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp_dir = tempdir().unwrap();
        let fonts = fonts(temp_dir.path());
        let paths: Vec<_> = fonts.iter().map(PathBuf::as_path).collect();
        let args = Args::for_test(&paths);

        let (outcome, output) = run_quietly(&args);
        assert_eq!(Some(Status::Fail), outcome.worst);
        assert!(outcome.is_failure(Status::Fail));
        assert_eq!(10, outcome.counts.total());
        assert_eq!(1, outcome.counts.get(Status::Fail));
        assert!(output.contains(" >> fstype"), "{output}");
        assert!(output.contains("Family-Bold.ttf"), "{output}");
        assert!(output.contains("[code: drm]"), "{output}");
    }

    #[rstest]
    #[case::serial(1)]
    #[case::parallel(3)]
    fn jobs_do_not_change_results(#[case] jobs: usize) {
        let temp_dir = tempdir().unwrap();
        let fonts = fonts(temp_dir.path());
        let paths: Vec<_> = fonts.iter().map(PathBuf::as_path).collect();
        let mut args = Args::for_test(&paths);
        args.jobs = jobs;
        args.json = Some(temp_dir.path().join("report.json"));

        let (outcome, _) = run_quietly(&args);
        assert_eq!(1, outcome.counts.get(Status::Fail));
        assert_eq!(2, outcome.counts.get(Status::Skip));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(temp_dir.path().join("report.json")).unwrap())
                .unwrap();
        assert_eq!(1, json["result"]["FAIL"]);
        assert_eq!(2, json["sections"].as_array().unwrap().len());
    }

    #[test]
    fn overrides_from_config() {
        let temp_dir = tempdir().unwrap();
        let fonts = fonts(temp_dir.path());
        let config = temp_dir.path().join("fontqa.yml");
        fs::write(&config, "overrides:\n  fstype:\n    drm:\n      status: WARN\n").unwrap();
        let paths: Vec<_> = fonts.iter().map(PathBuf::as_path).collect();
        let mut args = Args::for_test(&paths);
        args.config = Some(config);

        let (outcome, _) = run_quietly(&args);
        assert_eq!(Some(Status::Warn), outcome.worst);
        assert!(!outcome.is_failure(Status::Fail));
    }

    #[test]
    fn explicit_checks_only() {
        let temp_dir = tempdir().unwrap();
        let fonts = fonts(temp_dir.path());
        let paths: Vec<_> = fonts.iter().map(PathBuf::as_path).collect();
        let mut args = Args::for_test(&paths);
        args.checkid = vec!["family/".to_string()];

        let (outcome, output) = run_quietly(&args);
        assert_eq!(2, outcome.counts.total());
        assert_eq!(Some(Status::Pass), outcome.worst);
        assert!(output.starts_with("Start ... running 2 individual check executions."));
    }

    #[test]
    fn lists_checks() {
        let mut args = Args::for_test(&[]);
        args.list_checks = true;
        let (outcome, output) = run_quietly(&args);
        assert_eq!(Outcome::default(), outcome);
        assert!(output.starts_with("Universal\n  file_size: "), "{output}");
        assert!(output.contains("Family\n  family/equal_upm: "), "{output}");
    }

    #[rstest]
    #[case::iterarg("font", true)]
    #[case::check("*check", true)]
    #[case::condition("ttFont", false)]
    #[case::typo("fnot", false)]
    fn gather_by_must_be_known(#[case] by: &str, #[case] known: bool) {
        let temp_dir = tempdir().unwrap();
        let fonts = fonts(temp_dir.path());
        let paths: Vec<_> = fonts.iter().map(PathBuf::as_path).collect();
        let mut args = Args::for_test(&paths);
        args.gather_by = Some(by.to_string());

        let mut out = Vec::new();
        match run(&args, &mut out) {
            Ok(_) => assert!(known, "{by} was accepted"),
            Err(Error::UnknownGatherBy(name)) => {
                assert!(!known, "{by} was rejected");
                assert_eq!(by, name);
                assert!(out.is_empty());
            }
            Err(e) => panic!("{e}"),
        }
    }

    #[test]
    fn needs_fonts() {
        assert!(matches!(
            run(&Args::for_test(&[]), Vec::new()),
            Err(Error::NoInput)
        ));
    }
}
