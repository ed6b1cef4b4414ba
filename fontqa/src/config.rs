//! Settings for one run: the optional YAML config file merged with the
//! command line.

use std::{fs, path::Path};

use checkrunner::{Overrides, RunOptions, Value, Values};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{Args, Error};

/// Contents of a config file.
///
/// Keys other than the ones named here are handed to checks as values, and
/// are visible as a whole through `config`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub explicit_checks: Vec<String>,
    pub exclude_checks: Vec<String>,
    pub custom_order: Option<Vec<String>>,
    /// check id -> message code -> replacement
    pub overrides: Overrides,
    #[serde(flatten)]
    pub values: IndexMap<String, serde_yaml::Value>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, Error> {
        if !path.is_file() {
            return Err(Error::FileExpected(path.to_path_buf()));
        }
        let yml = fs::read_to_string(path).map_err(|source| Error::FileIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&yml)?;
        debug!("Loaded {path:?}: {config:?}");
        Ok(config)
    }

    /// The config file named by `args`, if any, with command line selections
    /// taking precedence.
    pub fn from_args(args: &Args) -> Result<Config, Error> {
        let mut config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if !args.checkid.is_empty() {
            config.explicit_checks = args.checkid.clone();
        }
        if !args.exclude_checkid.is_empty() {
            config.exclude_checks = args.exclude_checkid.clone();
        }
        if !args.order.is_empty() {
            config.custom_order = Some(args.order.clone());
        }
        Ok(config)
    }

    pub fn run_options(&self, use_cache: bool) -> RunOptions {
        let tokens = |items: &[String]| items.iter().map(SmolStr::new).collect::<Vec<_>>();
        RunOptions {
            custom_order: self.custom_order.as_deref().map(tokens),
            explicit_checks: tokens(&self.explicit_checks),
            exclude_checks: tokens(&self.exclude_checks),
            use_cache,
            overrides: self.overrides.clone(),
            ..Default::default()
        }
    }

    /// Free-form entries as check values.
    pub fn values(&self) -> Values {
        let mut values = Values::new();
        for (name, value) in &self.values {
            values.insert(name.as_str(), to_value(value));
        }
        values
    }
}

/// Scalars become plain values checks can downcast to `bool`, `u64`, `i64`,
/// `f64` or `String`; sequences become lists; anything else stays YAML.
fn to_value(yaml: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match yaml {
        Yaml::Bool(b) => Value::from(*b),
        Yaml::Number(n) => {
            if let Some(n) = n.as_u64() {
                Value::from(n)
            } else if let Some(n) = n.as_i64() {
                Value::from(n)
            } else {
                Value::from(n.as_f64().unwrap_or_default())
            }
        }
        Yaml::String(s) => Value::from(s.as_str()),
        Yaml::Sequence(items) => Value::list(items.iter().map(to_value).collect()),
        Yaml::Tagged(tagged) => to_value(&tagged.value),
        Yaml::Null => Value::with_truth(yaml.clone(), false),
        Yaml::Mapping(map) => Value::with_truth(yaml.clone(), !map.is_empty()),
    }
}
