//! Running checks on a pool of workers.
//!
//! Jobs are the serialized identities of the execution order. Each worker
//! owns a [`CheckRunner`], so condition caches are per worker. Reports come
//! back whole, one per check, and are replayed to reporters in arrival order
//! with section framing synthesized around them.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
    event::distribute, unwind, CheckRunner, Error, Event, ExecutionOrder, Identity, Profile,
    Reporter, RunOptions, Status, StatusCounts, Subresult, Values,
};

/// What a worker is asked to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Position in the execution order
    pub index: usize,
    pub identity: Identity,
}

/// Everything one check produced, as sent back by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub index: usize,
    pub identity: Identity,
    pub logs: Vec<Subresult>,
    pub status: Status,
}

impl CheckReport {
    /// Fold the STARTCHECK..ENDCHECK events of one check into a report.
    pub fn collect(index: usize, events: impl IntoIterator<Item = Event>) -> Result<Self, Error> {
        let mut identity = None;
        let mut logs = Vec::new();
        for event in events {
            match event {
                Event::StartCheck { identity: started } => identity = Some(started),
                Event::Log { result, .. } => logs.push(result),
                Event::EndCheck {
                    identity: ended,
                    status,
                } => {
                    if identity.as_ref() != Some(&ended) {
                        return Err(Error::ProtocolViolation(format!(
                            "{ended} ended without starting"
                        )));
                    }
                    return Ok(CheckReport {
                        index,
                        identity: ended,
                        logs,
                        status,
                    });
                }
                other => {
                    return Err(Error::ProtocolViolation(format!(
                        "{} inside a check",
                        other.status()
                    )))
                }
            }
        }
        Err(Error::ProtocolViolation(format!("check {index} never ended")))
    }

    /// The events this report stands for.
    pub fn events(&self) -> impl Iterator<Item = Event> + '_ {
        std::iter::once(Event::StartCheck {
            identity: self.identity.clone(),
        })
        .chain(self.logs.iter().map(|result| Event::Log {
            identity: self.identity.clone(),
            result: result.clone(),
        }))
        .chain(std::iter::once(Event::EndCheck {
            identity: self.identity.clone(),
            status: self.status,
        }))
    }
}

/// Runs the execution order of one profile on `jobs` workers.
pub struct ParallelRunner<'a> {
    profile: &'a Profile,
    values: Values,
    options: RunOptions,
    order: Arc<ExecutionOrder>,
    jobs: usize,
}

impl<'a> ParallelRunner<'a> {
    pub fn new(
        profile: &'a Profile,
        values: Values,
        options: RunOptions,
        jobs: usize,
    ) -> Result<Self, Error> {
        let order = CheckRunner::new(profile, values.clone(), options.clone())?
            .order()
            .clone();
        Ok(ParallelRunner {
            profile,
            values,
            options,
            order,
            jobs: jobs.max(1),
        })
    }

    pub fn order(&self) -> &Arc<ExecutionOrder> {
        &self.order
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Run every check, replaying reports to `reporters` as they arrive.
    ///
    /// A failing worker cancels the jobs nobody has picked up yet; the run
    /// then ends without END and the failure is returned.
    pub fn run(&self, reporters: &mut [&mut dyn Reporter]) -> Result<StatusCounts, Error> {
        let jobs = self
            .order
            .iter()
            .enumerate()
            .map(|(index, identity)| {
                serde_json::to_string(&JobDescriptor {
                    index,
                    identity: identity.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.run_jobs(jobs, reporters)
    }

    /// Queue serialized [`JobDescriptor`]s on a pool of at most `jobs` threads.
    fn run_jobs(
        &self,
        jobs: Vec<String>,
        reporters: &mut [&mut dyn Reporter],
    ) -> Result<StatusCounts, Error> {
        let expected = jobs.len();
        let (job_send, job_recv) = crossbeam_channel::unbounded::<String>();
        for job in jobs {
            job_send
                .send(job)
                .map_err(|e| Error::WorkerFailed(format!("Unable to queue a job: {e}")))?;
        }
        drop(job_send);

        let workers = self.jobs.min(expected).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::WorkerFailed(format!("Unable to start {workers} threads: {e}")))?;
        debug!("Running {expected} checks on {workers} workers");

        distribute(
            reporters,
            &Event::Start {
                order: self.order.clone(),
            },
        );

        let (send, recv) = crossbeam_channel::unbounded::<Result<CheckReport, Error>>();
        let mut remaining = self.order.section_sizes();
        let mut sections: IndexMap<SmolStr, StatusCounts> = IndexMap::new();
        let mut total = StatusCounts::new();
        let mut failure = None;

        pool.in_place_scope(|scope| {
            for worker in 0..workers {
                let send = send.clone();
                let jobs = job_recv.clone();
                let values = self.values.clone();
                let options = self.options.clone();
                let profile = self.profile;
                scope.spawn(move |_| work(worker, profile, values, options, jobs, send));
            }
            drop(send);

            let mut received = 0;
            while received < expected {
                let Ok(report) = recv.recv() else {
                    break;
                };
                received += 1;
                let report = match report {
                    Ok(report) => report,
                    Err(e) => {
                        error!("{e}");
                        failure.get_or_insert(e);
                        cancel(&job_recv);
                        continue;
                    }
                };
                if failure.is_some() {
                    continue;
                }

                let section = report.identity.section.clone().unwrap_or_default();
                if !sections.contains_key(&section) {
                    sections.insert(section.clone(), StatusCounts::new());
                    distribute(
                        reporters,
                        &Event::StartSection {
                            identity: Identity::section(section.clone()),
                        },
                    );
                }
                for event in report.events() {
                    distribute(reporters, &event);
                }
                if let Some(summary) = sections.get_mut(&section) {
                    summary.add(report.status);
                }

                let left = remaining.entry(section.clone()).or_default();
                *left = left.saturating_sub(1);
                if *left == 0 {
                    let summary = sections.get(&section).cloned().unwrap_or_default();
                    total += &summary;
                    distribute(
                        reporters,
                        &Event::EndSection {
                            identity: Identity::section(section),
                            summary,
                        },
                    );
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        distribute(
            reporters,
            &Event::End {
                counts: total.clone(),
            },
        );
        Ok(total)
    }
}

/// Drop the jobs nobody has started yet.
fn cancel(jobs: &Receiver<String>) {
    let mut dropped = 0;
    while jobs.try_recv().is_ok() {
        dropped += 1;
    }
    debug!("Cancelled {dropped} queued checks");
}

fn run_job(runner: &mut CheckRunner, job: &str) -> Result<CheckReport, Error> {
    let job: JobDescriptor = serde_json::from_str(job)?;
    let events = runner.check_events(&job.identity)?;
    CheckReport::collect(job.index, events)
}

fn work(
    worker: usize,
    profile: &Profile,
    values: Values,
    options: RunOptions,
    jobs: Receiver<String>,
    send: Sender<Result<CheckReport, Error>>,
) {
    let mut runner = match CheckRunner::new(profile, values, options) {
        Ok(runner) => runner,
        Err(e) => {
            let _ = send.send(Err(e));
            return;
        }
    };
    while let Ok(job) = jobs.recv() {
        trace!("Worker {worker} picked up {job}");
        let report = unwind::catch(|| run_job(&mut runner, &job))
            .unwrap_or_else(|panic| Err(Error::WorkerFailed(panic.message)));
        let failed = report.is_err();
        if let Err(e) = send.send(report) {
            error!("Worker {worker} unable to report: {e}");
            break;
        }
        if failed {
            break;
        }
    }
    debug!(
        "Worker {worker} done, {} condition cache hits",
        runner.cache().hits()
    );
}
