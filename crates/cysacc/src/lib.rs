//! Cysteine accessibility from MD trajectories
//!
//! For each configured cysteine the closest approach of any water oxygen to
//! its sulfur atom is computed per trajectory frame with the GROMACS 4.x
//! tools, stored compressed, and analysed as a distance histogram.
//!
//! # Workflow
//!
//! 1. [`config::AccessibilityConfig`]: validated resids (sorted) and cutoff
//! 2. [`index::IndexBuilder`]: `make_ndx` script writing `cys.ndx`
//! 3. [`jobs::JobRunner`]: one `g_dist | gzip` [`pipeline::StreamingPipeline`] per residue
//! 4. [`analysis::Aggregator`]: `Cys<resid>` to [`cysacc_mindist::Mindist`]
//! 5. [`figures::plot_combined_histograms`]: `mindist_S_OW.svg`
//!
//! # CLI
//!
//! ```bash
//! cysacc run --structure md.tpr --trajectory md.xtc --cysteines 10,5,42 --cutoff 1.2
//! cysacc analyze --cysteines 10,5,42 --cutoff 1.2 --plot
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod figures;
pub mod index;
pub mod jobs;
pub mod layout;
pub mod pipeline;
pub mod tools;

pub use analysis::{Aggregator, AnalysisResults, ResidueSummary};
pub use config::{AccessibilityConfig, ResidueId, RunConfig, DEFAULT_CUTOFF};
pub use error::{AnalysisError, ConfigError, CysAccError, IndexError, JobError, PipelineError, Result, Stage};
pub use index::{IndexBuilder, SelectionNames};
pub use jobs::{JobOutcome, JobRecord, JobReport, JobRunner};
pub use layout::{group_label, RunLayout};
pub use pipeline::{CancellationToken, StreamingPipeline};
pub use tools::{Compression, ToolCommand, ToolEnvironment, ToolsConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
