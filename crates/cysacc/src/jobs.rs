//! Per-residue distance jobs
//!
//! For every configured residue, ascending, the runner streams
//!
//! ```text
//! g_dist -s <structure> -f <trajectory> -n cys.ndx -dist <cutoff>   (stdin: "Cys<resid>\nOW\n")
//!     | gzip -c > Cys<resid>_OW_dist.txt.gz
//! ```
//!
//! Existing result files are authoritative and never recomputed. A residue
//! whose job fails is reported and the loop moves on to the next one.

use crate::config::AccessibilityConfig;
use crate::error::{ConfigError, CysAccError, IndexError, JobError};
use crate::index::{check_group_count, read_index_groups, IndexBuilder, SelectionNames};
use crate::layout::group_label;
use crate::pipeline::{CancellationToken, PipelineStats, StreamingPipeline, DEFAULT_BUFFER_CHUNKS};
use crate::tools::ToolEnvironment;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// What happened to one residue.
#[derive(Debug)]
pub enum JobOutcome {
    /// Result file written
    Completed(PipelineStats),
    /// Result file already present; nothing was run
    Skipped,
    Failed(JobError),
    /// Not attempted, or interrupted, because the run was cancelled
    Cancelled,
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed(stats) => write!(f, "completed ({} bytes, {:.1}s)", stats.bytes, stats.elapsed.as_secs_f64()),
            JobOutcome::Skipped => f.write_str("skipped (result exists)"),
            JobOutcome::Failed(e) => write!(f, "FAILED: {} failed: {}", e.stage(), e.source.failure),
            JobOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Result of one residue job.
#[derive(Debug)]
pub struct JobRecord {
    pub resid: i64,
    pub output: PathBuf,
    pub outcome: JobOutcome,
}

impl JobRecord {
    pub fn label(&self) -> String {
        group_label(self.resid)
    }
}

/// Outcome of a whole run, one record per configured residue in order.
#[derive(Debug, Default)]
pub struct JobReport {
    pub index_built: bool,
    pub records: Vec<JobRecord>,
}

impl JobReport {
    pub fn completed(&self) -> impl Iterator<Item = &JobRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Completed(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &JobRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Skipped))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&JobRecord, &JobError)> {
        self.records.iter().filter_map(|r| match &r.outcome {
            JobOutcome::Failed(e) => Some((r, e)),
            _ => None,
        })
    }

    pub fn cancelled(&self) -> impl Iterator<Item = &JobRecord> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Cancelled))
    }

    /// Residues for which the distance tool was actually started.
    pub fn invocations(&self) -> usize {
        self.records
            .iter()
            .filter(|r| match &r.outcome {
                JobOutcome::Completed(_) => true,
                JobOutcome::Failed(e) => e.source.launched,
                _ => false,
            })
            .count()
    }

    /// True when every residue has a result file.
    pub fn is_success(&self) -> bool {
        self.records
            .iter()
            .all(|r| matches!(r.outcome, JobOutcome::Completed(_) | JobOutcome::Skipped))
    }

    fn log_summary(&self) {
        let failed = self.failed().count();
        let line = format!(
            "{} residues: {} completed, {} skipped, {} failed, {} cancelled",
            self.records.len(),
            self.completed().count(),
            self.skipped().count(),
            failed,
            self.cancelled().count()
        );
        if failed > 0 {
            log::warn!("{}", line);
        } else {
            log::info!("{}", line);
        }
    }
}

/// Runs the distance jobs of one configuration.
pub struct JobRunner {
    config: AccessibilityConfig,
    env: ToolEnvironment,
    structure: PathBuf,
    trajectory: PathBuf,
    selection: SelectionNames,
    extra_args: Vec<String>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    strict_group_count: bool,
    buffer_chunks: usize,
}

impl JobRunner {
    /// Fails when the compression filter does not write the format the
    /// result file names promise.
    pub fn new(
        config: AccessibilityConfig,
        env: ToolEnvironment,
        structure: impl Into<PathBuf>,
        trajectory: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let configured = config.layout().compression();
        if env.compression != configured {
            return Err(ConfigError::CompressionMismatch {
                configured,
                tools: env.compression,
            });
        }
        Ok(Self {
            config,
            env,
            structure: structure.into(),
            trajectory: trajectory.into(),
            selection: SelectionNames::default(),
            extra_args: Vec::new(),
            timeout: None,
            cancel: None,
            strict_group_count: false,
            buffer_chunks: DEFAULT_BUFFER_CHUNKS,
        })
    }

    /// Per-residue time limit.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Token checked between residues and while a job is running.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Turn an index group count mismatch into an error.
    pub fn strict_group_count(mut self, strict: bool) -> Self {
        self.strict_group_count = strict;
        self
    }

    pub fn selection(mut self, selection: SelectionNames) -> Self {
        self.selection = selection;
        self
    }

    /// Arguments appended to every distance tool command line.
    pub fn extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn buffer_chunks(mut self, chunks: usize) -> Self {
        self.buffer_chunks = chunks;
        self
    }

    pub fn config(&self) -> &AccessibilityConfig {
        &self.config
    }

    fn index_builder(&self) -> IndexBuilder {
        IndexBuilder::new(&self.env, &self.config).with_selection(self.selection.clone())
    }

    /// Rebuild the index file, overwriting any existing one.
    pub fn make_index(&self) -> Result<(), CysAccError> {
        self.index_builder()
            .build(&self.structure, &self.config.index_file())?;
        Ok(())
    }

    /// Build the index if it is missing, then check its group count.
    ///
    /// Returns whether the index tool was run.
    pub fn ensure_index(&self) -> Result<bool, CysAccError> {
        let ndx = self.config.index_file();
        let built = if ndx.exists() {
            false
        } else {
            log::warn!("Index file {} not found, creating it", ndx.display());
            self.make_index()?;
            true
        };

        let groups = read_index_groups(&ndx)?;
        check_group_count(
            &groups,
            self.config.cysteines().len(),
            &self.selection.water_oxygen_type,
            self.strict_group_count,
        )?;
        Ok(built)
    }

    /// Run every residue job.
    ///
    /// Only index problems are returned as errors; per-residue failures are
    /// recorded in the report.
    pub fn run(&self) -> Result<JobReport, CysAccError> {
        self.config
            .layout()
            .ensure_dirs()
            .map_err(|source| IndexError::Io {
                path: self.config.layout().plugin_dir(),
                source,
            })?;
        let index_built = self.ensure_index()?;

        let mut report = JobReport {
            index_built,
            records: Vec::with_capacity(self.config.cysteines().len()),
        };

        for (resid, output) in self.config.distance_files() {
            let outcome = if self.is_cancelled() {
                JobOutcome::Cancelled
            } else {
                self.run_residue(resid, &output)
            };
            report.records.push(JobRecord {
                resid,
                output,
                outcome,
            });
        }

        report.log_summary();
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, |c| c.is_cancelled())
    }

    fn run_residue(&self, resid: i64, output: &Path) -> JobOutcome {
        let label = group_label(resid);
        if output.exists() {
            log::warn!("{}: {} exists, skipping", label, output.display());
            return JobOutcome::Skipped;
        }

        log::info!("{}: computing S-{} distances -> {}", label, self.selection.water_oxygen_type, output.display());
        match self.pipeline(resid).run(output) {
            Ok(stats) => {
                log::info!("{}: done in {:.1}s", label, stats.elapsed.as_secs_f64());
                JobOutcome::Completed(stats)
            }
            Err(e) if e.is_cancelled() => {
                log::warn!("{}: cancelled", label);
                JobOutcome::Cancelled
            }
            Err(source) => {
                let err = JobError { resid, source };
                log::error!("{}", err);
                JobOutcome::Failed(err)
            }
        }
    }

    /// The distance command line for one residue, without stdin.
    pub fn distance_command(&self) -> Command {
        let mut cmd = self.env.distance.command();
        cmd.arg("-s")
            .arg(&self.structure)
            .arg("-f")
            .arg(&self.trajectory)
            .arg("-n")
            .arg(self.config.index_file())
            .arg("-dist")
            .arg(self.config.cutoff().to_string())
            .args(&self.extra_args);
        cmd
    }

    /// Group pair sent to the distance tool's stdin.
    pub fn group_script(&self, resid: i64) -> String {
        format!("{}\n{}\n", group_label(resid), self.selection.water_oxygen_type)
    }

    fn pipeline(&self, resid: i64) -> StreamingPipeline {
        let producer = self.distance_command();
        log::debug!("{:?}", producer);
        StreamingPipeline::new(producer, self.env.compressor.command())
            .producer_input(self.group_script(resid))
            .producer_stderr(self.config.layout().tool_log(resid))
            .buffer_chunks(self.buffer_chunks)
            .timeout(self.timeout)
            .cancellation(self.cancel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Failure, PipelineError, Stage};
    use crate::tools::{Compression, ToolCommand};

    fn runner() -> JobRunner {
        let config = AccessibilityConfig::from_resids(&[10, 5], Some(1.2), "/run").unwrap();
        let env = ToolEnvironment::new(
            ToolCommand::new("make_ndx"),
            ToolCommand::with_args("gmx", ["distance"]),
            ToolCommand::with_args("gzip", ["-c"]),
            Compression::Gzip,
        );
        JobRunner::new(config, env, "md.tpr", "md.xtc")
            .unwrap()
            .extra_args(vec!["-b".into(), "100".into()])
    }

    #[test]
    fn test_distance_command_line() {
        let cmd = runner().distance_command();
        assert_eq!(cmd.get_program(), "gmx");
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "distance", "-s", "md.tpr", "-f", "md.xtc", "-n", "/run/accessibility/cys.ndx", "-dist", "1.2", "-b",
                "100"
            ]
        );
    }

    #[test]
    fn test_group_script() {
        assert_eq!(runner().group_script(5), "Cys5\nOW\n");
    }

    #[test]
    fn test_compression_must_match_result_layout() {
        // Defaults to gzip result names; a plain `cat` filter would write text into them.
        let config = AccessibilityConfig::from_resids(&[10, 5], Some(1.2), "/run").unwrap();
        let env = ToolEnvironment::new(
            ToolCommand::new("make_ndx"),
            ToolCommand::new("g_dist"),
            ToolCommand::new("cat"),
            Compression::None,
        );
        match JobRunner::new(config, env, "md.tpr", "md.xtc") {
            Err(ConfigError::CompressionMismatch { configured, tools }) => {
                assert_eq!(configured, Compression::Gzip);
                assert_eq!(tools, Compression::None);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("mismatched compression accepted"),
        }
    }

    #[test]
    fn test_report_counts() {
        let stats = PipelineStats {
            bytes: 10,
            elapsed: Duration::from_millis(5),
        };
        let failure = JobError {
            resid: 3,
            source: PipelineError::new(
                Stage::Distance,
                Failure::Exit {
                    program: "g_dist".into(),
                    status: "exit status: 1".into(),
                },
            )
            .after_launch(),
        };
        let never_started = JobError {
            resid: 5,
            source: PipelineError::new(
                Stage::Distance,
                Failure::Launch {
                    program: "g_dist".into(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                },
            ),
        };
        let report = JobReport {
            index_built: false,
            records: vec![
                JobRecord { resid: 1, output: "a".into(), outcome: JobOutcome::Completed(stats) },
                JobRecord { resid: 2, output: "b".into(), outcome: JobOutcome::Skipped },
                JobRecord { resid: 3, output: "c".into(), outcome: JobOutcome::Failed(failure) },
                JobRecord { resid: 4, output: "d".into(), outcome: JobOutcome::Cancelled },
                JobRecord { resid: 5, output: "e".into(), outcome: JobOutcome::Failed(never_started) },
            ],
        };
        assert_eq!(report.completed().count(), 1);
        assert_eq!(report.skipped().count(), 1);
        assert_eq!(report.failed().count(), 2);
        assert_eq!(report.cancelled().count(), 1);
        assert_eq!(report.invocations(), 2);
        assert!(!report.is_success());
        let (rec, err) = report.failed().next().unwrap();
        assert_eq!(rec.label(), "Cys3");
        assert_eq!(err.stage(), Stage::Distance);
        assert!(err.to_string().starts_with("Cys3: distance tool failed"));
    }
}
