//! A JSON document of a finished run.

use std::{collections::HashMap, fs, path::Path};

use checkrunner::{
    gather_by, Event, GatherBy, GroupKey, Identity, Profile, Reporter, Status, StatusCounts,
};
use indexmap::IndexMap;
use serde::Serialize;
use smol_str::SmolStr;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub result: StatusCounts,
    pub sections: Vec<SectionDoc>,
    #[serde(rename = "clusteredBy", skip_serializing_if = "Option::is_none")]
    pub clustered_by: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<ClusterDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionDoc {
    pub key: String,
    pub result: StatusCounts,
    pub checks: Vec<CheckDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckDoc {
    pub key: String,
    pub check: SmolStr,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub result: Status,
    pub logs: Vec<LogDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogDoc {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Checks sharing a value of the gathered by argument, referenced by key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub result: StatusCounts,
    pub checks: Vec<String>,
}

/// Accumulates the whole run, the document is available once END arrived.
pub struct JsonReporter<'a> {
    profile: &'a Profile,
    /// Shown as the filename of checks bound to a font
    fonts: Vec<String>,
    gather: Option<GatherBy>,
    /// Everything but START and the log lines
    events: Vec<Event>,
    logs: HashMap<Identity, Vec<LogDoc>>,
    ended: bool,
}

impl<'a> JsonReporter<'a> {
    pub fn new(profile: &'a Profile, fonts: Vec<String>) -> Self {
        JsonReporter {
            profile,
            fonts,
            gather: None,
            events: Vec::new(),
            logs: HashMap::new(),
            ended: false,
        }
    }

    pub fn gather_by(mut self, gather: GatherBy) -> Self {
        self.gather = Some(gather);
        self
    }

    fn filename(&self, identity: &Identity) -> Option<String> {
        identity
            .iterargs
            .get("font")
            .and_then(|index| self.fonts.get(index))
            .cloned()
    }

    fn check_doc(&self, identity: &Identity, status: Status) -> CheckDoc {
        let id = identity.check.clone().unwrap_or_default();
        let check = self.profile.get_check(&id);
        let logs = self.logs.get(identity).cloned().unwrap_or_default();
        CheckDoc {
            key: identity.to_string(),
            description: check.map(|c| c.description().to_string()).unwrap_or_default(),
            rationale: check.and_then(|c| c.rationale()).map(str::to_string),
            filename: self.filename(identity),
            check: id,
            result: status,
            logs,
        }
    }

    fn clusters(&self, gather: &GatherBy) -> Vec<ClusterDoc> {
        gather_by(&self.events, gather)
            .into_iter()
            .filter_map(|(key, events)| {
                let ends: Vec<_> = events
                    .iter()
                    .filter_map(|e| match e {
                        Event::EndCheck { identity, status } => Some((identity, *status)),
                        _ => None,
                    })
                    .collect();
                if ends.is_empty() {
                    return None;
                }
                let (index, value) = match &key {
                    GroupKey::Index(index) => (
                        Some(*index),
                        match gather {
                            GatherBy::Iterarg(name) if name == "font" => {
                                self.fonts.get(*index).cloned()
                            }
                            _ => None,
                        },
                    ),
                    GroupKey::Check(check) => (None, Some(check.to_string())),
                    GroupKey::Ungrouped => (None, None),
                };
                Some(ClusterDoc {
                    index,
                    value,
                    result: ends.iter().map(|(_, status)| *status).collect(),
                    checks: ends.iter().map(|(identity, _)| identity.to_string()).collect(),
                })
            })
            .collect()
    }

    /// `None` until the run has ended.
    pub fn document(&self) -> Option<Document> {
        if !self.ended {
            return None;
        }
        let mut result = StatusCounts::new();
        let mut sections: IndexMap<SmolStr, SectionDoc> = IndexMap::new();
        for event in &self.events {
            match event {
                Event::StartSection { identity } => {
                    let name = identity.section.clone().unwrap_or_default();
                    sections.insert(
                        name.clone(),
                        SectionDoc {
                            key: name.to_string(),
                            result: StatusCounts::new(),
                            checks: Vec::new(),
                        },
                    );
                }
                Event::EndCheck { identity, status } => {
                    let doc = self.check_doc(identity, *status);
                    let section = identity.section.clone().unwrap_or_default();
                    if let Some(section) = sections.get_mut(&section) {
                        section.checks.push(doc);
                    }
                }
                Event::EndSection { identity, summary } => {
                    let section = identity.section.clone().unwrap_or_default();
                    if let Some(section) = sections.get_mut(&section) {
                        section.result = summary.clone();
                    }
                }
                Event::End { counts } => result = counts.clone(),
                _ => (),
            }
        }

        Some(Document {
            result,
            sections: sections.into_values().collect(),
            clustered_by: self.gather.as_ref().map(|gather| match gather {
                GatherBy::Iterarg(name) => name.to_string(),
                GatherBy::Check => "*check".to_string(),
            }),
            clusters: self
                .gather
                .as_ref()
                .map(|gather| self.clusters(gather))
                .unwrap_or_default(),
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), Error> {
        let Some(document) = self.document() else {
            return Err(Error::IncompleteRun);
        };
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(path, json).map_err(|source| Error::FileIo {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl Reporter for JsonReporter<'_> {
    fn receive(&mut self, event: &Event) {
        match event {
            Event::End { .. } => self.ended = true,
            // the order travels with the run and the document doesn't need it
            Event::Start { .. } => return,
            Event::Log { identity, result } => {
                self.logs.entry(identity.clone()).or_default().push(LogDoc {
                    status: result.status,
                    message: result.message.text().to_string(),
                    code: result.message.code().map(str::to_string),
                    traceback: result.traceback.clone(),
                });
                return;
            }
            _ => (),
        }
        self.events.push(event.clone());
    }
}
