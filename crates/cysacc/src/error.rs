//! Error types for the accessibility workflow.
//!
//! Each workflow step has its own error so that callers can tell a bad
//! configuration (fatal, raised at construction) from a failed residue job
//! (local to that residue) or a missing result during aggregation.

use crate::tools::Compression;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors: malformed or missing parameters, unusable tools.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required argument absent
    #[error("Keyword argument '{0}' MUST be set to a sequence of resids")]
    MissingArgument(&'static str),

    /// A residue identifier is not integer-coercible
    #[error("argument '{argument}': {value:?} is not an integer resid")]
    InvalidResid { argument: &'static str, value: String },

    /// Cutoff is not a positive finite distance
    #[error("invalid cutoff {0} nm (must be a positive distance)")]
    InvalidCutoff(f64),

    /// Required path setting absent (structure, trajectory)
    #[error("missing required setting '{0}'")]
    MissingSetting(&'static str),

    /// External tool could not be resolved
    #[error("{tool} not found.\n{hint}")]
    ToolNotFound { tool: String, hint: String },

    /// Result files and the compression filter disagree on the format
    #[error("result files are configured as {configured:?} but the filter writes {tools:?}")]
    CompressionMismatch {
        configured: Compression,
        tools: Compression,
    },

    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Index-file generation and parsing errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Index tool could not be started
    #[error("failed to launch index tool {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Index tool exited non-zero
    #[error("index tool {program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    /// Reading or writing the index / structure file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed index or structure file
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Number of cysteine groups differs from the configured residues
    #[error("index holds {found} cysteine groups but {expected} resids are configured")]
    GroupCountMismatch { expected: usize, found: usize },

    /// Reference structure lists a different number of cysteines
    #[error("{path} lists {found} cysteine sulfur atoms but {expected} resids are configured")]
    StructureCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

/// Which part of a residue job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Distance tool (producer)
    Distance,
    /// Compression filter (consumer)
    Compress,
    /// Byte pump between the two processes
    Pump,
    /// Output file creation or finalisation
    Output,
    /// Supervision: timeout or cancellation
    Supervisor,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Distance => "distance tool",
            Stage::Compress => "compression filter",
            Stage::Pump => "pipe",
            Stage::Output => "output file",
            Stage::Supervisor => "supervisor",
        };
        f.write_str(name)
    }
}

/// Cause of a pipeline failure.
#[derive(Error, Debug)]
pub enum Failure {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: String },

    #[error("{0}")]
    Io(#[source] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// A failed two-stage pipeline, before it is attributed to a residue.
#[derive(Error, Debug)]
#[error("{stage} failed: {failure}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub failure: Failure,
    /// The producer had been started when the pipeline failed
    pub launched: bool,
}

impl PipelineError {
    pub fn new(stage: Stage, failure: Failure) -> Self {
        Self {
            stage,
            failure,
            launched: false,
        }
    }

    /// Mark a failure that happened after the producer was started.
    pub fn after_launch(mut self) -> Self {
        self.launched = true;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.failure, Failure::Cancelled)
    }
}

/// A residue job that did not produce its result file.
#[derive(Error, Debug)]
#[error("Cys{resid}: {source}")]
pub struct JobError {
    pub resid: i64,
    #[source]
    pub source: PipelineError,
}

impl JobError {
    pub fn stage(&self) -> Stage {
        self.source.stage
    }
}

/// A residue whose result file cannot be analysed.
#[derive(Error, Debug)]
#[error("Cys{resid}: cannot analyse {path}: {source}")]
pub struct AnalysisError {
    pub resid: i64,
    pub path: PathBuf,
    #[source]
    pub source: cysacc_mindist::MindistError,
}

/// Umbrella error for callers that drive the whole workflow.
#[derive(Error, Debug)]
pub enum CysAccError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),
}

/// Result alias for the workflow.
pub type Result<T> = std::result::Result<T, CysAccError>;
