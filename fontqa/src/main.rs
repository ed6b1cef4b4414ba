use std::{
    io::{self, Write},
    process::ExitCode,
};

use clap::Parser;
use fontqa::{Args, Error};
use log::debug;

fn main() -> Result<ExitCode, Error> {
    env_logger::builder()
        .format(|buf, record| {
            let ts = buf.timestamp_micros();
            writeln!(
                buf,
                "{}: {:?}: {}: {}",
                ts,
                std::thread::current().id(),
                buf.default_level_style(record.level())
                    .value(record.level()),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let outcome = fontqa::run(&args, io::stdout().lock())?;
    debug!("{outcome:?}");
    if outcome.is_failure(args.error_code_on) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
