//! Only included in test

use crate::{CheckRunner, Collector, Event, ProtocolValidator, Value, Values};

/// `n` stand-in fonts, named `font0.ttf` onwards, under `fonts`.
pub(crate) fn fonts(n: usize) -> Values {
    let fonts = (0..n).map(|i| Value::from(format!("font{i}.ttf"))).collect();
    Values::new().with_iterable("fonts", fonts)
}

/// Run to completion, asserting the stream is well formed.
pub(crate) fn run_collect(runner: &mut CheckRunner) -> Vec<Event> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut validator = ProtocolValidator::default();
    let mut collector = Collector::default();
    runner.run(&mut [&mut validator, &mut collector]);
    if let Err(e) = validator.finish() {
        panic!("{e}");
    }
    collector.into_events()
}

/// `check(iterargs) STATUS` for every log line.
pub(crate) fn rendered(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Log { identity, result } => Some(format!(
                "{}{} {}",
                identity.check.as_deref().unwrap_or_default(),
                identity.iterargs,
                result.status
            )),
            _ => None,
        })
        .collect()
}
