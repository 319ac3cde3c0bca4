use std::path::PathBuf;
use thiserror::Error;

/// Conditions callers match on programmatically. Plumbing failures (network,
/// archive, filesystem) travel as `anyhow` errors with context instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The pruning target lacks a column from the fixed removal set. This
    /// means the upstream schema drifted, so it is surfaced rather than
    /// ignored.
    #[error("column `{}` is not present in {}", .column, .path.display())]
    MissingColumn { column: String, path: PathBuf },

    /// A stage's work function returned success without producing one of its
    /// declared outputs.
    #[error("stage `{stage}` ran but did not produce {output}")]
    StageContract { stage: String, output: String },

    /// A stage was registered before one of its dependencies.
    #[error("stage `{stage}` depends on unregistered stage `{dependency}`")]
    UnknownDependency { stage: String, dependency: String },

    /// Two stages were registered under the same name.
    #[error("a stage named `{0}` is already registered")]
    DuplicateStage(String),
}
