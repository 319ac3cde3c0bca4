//! Dependency-ordered stage execution with filesystem-backed completion.
//!
//! A [`Stage`] declares its outputs up front; the engine consults them
//! (through an injectable [`Probe`]) to decide whether the stage's work has
//! already been done. There is no separate run ledger: the filesystem is the
//! only completion record, so re-running a partially completed pipeline
//! skips whatever already exists and converges to the same end state.
//!
//! Two invocations must not run concurrently against one data directory:
//! the existence probe and the artifact write would race. Work functions
//! write atomically (stage to a temporary path, rename into place), so an
//! interrupted run never leaves a half artifact that a retry would mistake
//! for a completed one.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glob::glob;
use tracing::{debug, info};

use crate::error::Error;

pub mod stages;

/// A filesystem location that marks a stage as done. Descriptors carry no
/// data; they exist purely to answer "has this been produced yet".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputDescriptor {
    /// A single file or directory.
    Path(PathBuf),
    /// A glob pattern, satisfied by at least one match. An empty match set
    /// counts as unsatisfied, so a fresh data directory never looks
    /// complete.
    Matches(String),
    /// A glob pattern, satisfied only when nothing matches. Declared by
    /// stages whose work is removing files.
    Swept(String),
}

impl fmt::Display for OutputDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputDescriptor::Path(path) => write!(f, "{}", path.display()),
            OutputDescriptor::Matches(pattern) => write!(f, "a match of {pattern}"),
            OutputDescriptor::Swept(pattern) => write!(f, "an empty match of {pattern}"),
        }
    }
}

/// Answers whether an output descriptor is currently satisfied. Injectable
/// so the scheduling logic can be exercised without a real filesystem.
pub trait Probe {
    fn satisfied(&self, output: &OutputDescriptor) -> Result<bool>;
}

/// Probe backed by the real filesystem.
pub struct FsProbe;

impl Probe for FsProbe {
    fn satisfied(&self, output: &OutputDescriptor) -> Result<bool> {
        match output {
            OutputDescriptor::Path(path) => Ok(path.exists()),
            OutputDescriptor::Matches(pattern) => Ok(first_match(pattern)?.is_some()),
            OutputDescriptor::Swept(pattern) => Ok(first_match(pattern)?.is_none()),
        }
    }
}

fn first_match(pattern: &str) -> Result<Option<PathBuf>> {
    let mut paths =
        glob(pattern).with_context(|| format!("invalid glob pattern {pattern}"))?;
    match paths.next() {
        None => Ok(None),
        Some(Ok(path)) => Ok(Some(path)),
        Some(Err(e)) => Err(e).context("reading glob entry"),
    }
}

type Work = Box<dyn Fn() -> Result<()>>;

/// A named unit of pipeline work. Outputs are computed once, from the
/// pipeline parameters alone, when the stage is constructed.
pub struct Stage {
    name: String,
    deps: Vec<String>,
    outputs: Vec<OutputDescriptor>,
    work: Work,
}

impl Stage {
    pub fn new(name: impl Into<String>, work: impl Fn() -> Result<()> + 'static) -> Self {
        Stage {
            name: name.into(),
            deps: Vec::new(),
            outputs: Vec::new(),
            work: Box::new(work),
        }
    }

    /// Declare an upstream stage this one must wait for.
    pub fn after(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    /// Declare an output. A stage with no declared outputs is never
    /// considered already satisfied and would run on every invocation.
    pub fn output(mut self, output: OutputDescriptor) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Outputs already existed; the work function was not invoked.
    Satisfied,
    /// The work function ran and its outputs checked out.
    Ran,
}

/// Per-stage outcomes of a successful pipeline invocation.
#[derive(Debug)]
pub struct RunReport {
    pub stages: Vec<(String, StageStatus)>,
}

impl RunReport {
    pub fn status(&self, name: &str) -> Option<StageStatus> {
        self.stages
            .iter()
            .find(|(stage, _)| stage == name)
            .map(|(_, status)| *status)
    }
}

/// An explicit, in-memory dependency graph of stages. Stages must be added
/// after their dependencies, which keeps insertion order topological and
/// rules out cycles by construction.
pub struct Pipeline {
    stages: Vec<Stage>,
    probe: Box<dyn Probe>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_probe(FsProbe)
    }

    pub fn with_probe(probe: impl Probe + 'static) -> Self {
        Pipeline {
            stages: Vec::new(),
            probe: Box::new(probe),
        }
    }

    /// Register a stage. Every declared dependency must already be
    /// registered; names must be unique.
    pub fn add(&mut self, stage: Stage) -> Result<(), Error> {
        if self.index_of(&stage.name).is_some() {
            return Err(Error::DuplicateStage(stage.name.clone()));
        }
        for dep in &stage.deps {
            if self.index_of(dep).is_none() {
                return Err(Error::UnknownDependency {
                    stage: stage.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        self.stages.push(stage);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|stage| stage.name == name)
    }

    fn outputs_satisfied(&self, idx: usize) -> Result<bool> {
        let stage = &self.stages[idx];
        if stage.outputs.is_empty() {
            return Ok(false);
        }
        for output in &stage.outputs {
            if !self.probe.satisfied(output)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// True when every dependency of `name` currently has its outputs
    /// satisfied, i.e. the stage could run right now against the present
    /// state of the data directory.
    pub fn ready(&self, name: &str) -> Result<bool> {
        let idx = self
            .index_of(name)
            .with_context(|| format!("unknown stage `{name}`"))?;
        for dep in &self.stages[idx].deps {
            let dep_idx = self.index_of(dep).expect("dependencies validated on add");
            if !self.outputs_satisfied(dep_idx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Execute every stage in dependency order. A stage whose outputs all
    /// exist is skipped without invoking its work. The first failure halts
    /// the run, so dependents are never invoked, and the error names the
    /// failing stage; completed outputs stay on disk for an incremental
    /// retry. After a work function returns, its outputs are re-probed and
    /// any still-missing one is a contract violation.
    pub fn run(&mut self) -> Result<RunReport> {
        let mut report = RunReport { stages: Vec::with_capacity(self.stages.len()) };

        for idx in 0..self.stages.len() {
            let name = self.stages[idx].name.clone();

            if self.outputs_satisfied(idx)? {
                debug!(stage = %name, "outputs present, skipping");
                report.stages.push((name, StageStatus::Satisfied));
                continue;
            }

            info!(stage = %name, "running");
            (self.stages[idx].work)().with_context(|| format!("stage `{name}` failed"))?;

            for output in &self.stages[idx].outputs {
                if !self.probe.satisfied(output)? {
                    return Err(Error::StageContract {
                        stage: name.clone(),
                        output: output.to_string(),
                    }
                    .into());
                }
            }
            report.stages.push((name, StageStatus::Ran));
        }

        Ok(report)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
