use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io failed for '{path}': '{source}'")]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write to stdout or stderr: '{0}'")]
    StdioWriteFail(#[source] io::Error),
    #[error("Missing file '{0}'")]
    FileExpected(PathBuf),
    #[error("No fonts to check")]
    NoInput,
    #[error("Cannot gather results by '{0}', it is neither an iterated argument nor *check")]
    UnknownGatherBy(String),
    #[error("The run did not finish, there is nothing to report")]
    IncompleteRun,
    #[error(transparent)]
    YamlSerError(#[from] serde_yaml::Error),
    #[error(transparent)]
    JsonSerError(#[from] serde_json::Error),
    #[error(transparent)]
    Runner(#[from] checkrunner::Error),
}
