//! External tool environment
//!
//! Everything the workflow executes is described by a [`ToolEnvironment`]
//! built once, up front, and passed to the index builder and job runner.
//! Tool lookup on `PATH` happens only in [`ToolEnvironment::discover`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

/// An executable plus the leading arguments that select its mode,
/// e.g. `gmx` + `["make_ndx"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// A `Command` preloaded with the leading arguments.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Compression applied to per-residue result files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Gzip,
    Bzip2,
    None,
}

impl Compression {
    /// File-name suffix appended after `.txt`.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => ".gz",
            Compression::Bzip2 => ".bz2",
            Compression::None => "",
        }
    }

    /// Filter program and arguments that compress stdin to stdout.
    pub fn default_filter(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Compression::Gzip => ("gzip", &["-c"]),
            Compression::Bzip2 => ("bzip2", &["-c"]),
            Compression::None => ("cat", &[]),
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Compression::Gzip),
            "bzip2" | "bz2" => Ok(Compression::Bzip2),
            "none" | "plain" => Ok(Compression::None),
            other => Err(format!("unknown compression '{}' (gzip, bzip2, none)", other)),
        }
    }
}

/// Optional per-tool overrides, usually from the `[tools]` config table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub make_ndx: Option<ToolCommand>,
    #[serde(default)]
    pub distance: Option<ToolCommand>,
    #[serde(default)]
    pub compressor: Option<ToolCommand>,
}

/// Resolved tools used by one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEnvironment {
    /// Index generator (`make_ndx`)
    pub make_ndx: ToolCommand,
    /// Distance tool (`g_dist`)
    pub distance: ToolCommand,
    /// Compression filter reading stdin, writing stdout
    pub compressor: ToolCommand,
    /// Format produced by `compressor`
    pub compression: Compression,
}

impl ToolEnvironment {
    /// Environment from fully specified commands; nothing is looked up.
    pub fn new(
        make_ndx: ToolCommand,
        distance: ToolCommand,
        compressor: ToolCommand,
        compression: Compression,
    ) -> Self {
        Self {
            make_ndx,
            distance,
            compressor,
            compression,
        }
    }

    /// Resolve every tool, preferring explicit overrides over `PATH` lookup.
    pub fn discover(overrides: &ToolsConfig, compression: Compression) -> Result<Self, ConfigError> {
        let make_ndx = match &overrides.make_ndx {
            Some(cmd) => cmd.clone(),
            None => find_make_ndx().ok_or_else(|| not_found("make_ndx"))?,
        };
        let distance = match &overrides.distance {
            Some(cmd) => cmd.clone(),
            None => find_distance_tool().ok_or_else(|| not_found("g_dist"))?,
        };
        let compressor = match &overrides.compressor {
            Some(cmd) => cmd.clone(),
            None => find_compressor(compression).ok_or_else(|| not_found(compression.default_filter().0))?,
        };

        log::debug!("make_ndx:   {}", make_ndx);
        log::debug!("distance:   {}", distance);
        log::debug!("compressor: {}", compressor);

        Ok(Self::new(make_ndx, distance, compressor, compression))
    }
}

fn not_found(tool: &str) -> ConfigError {
    ConfigError::ToolNotFound {
        tool: tool.to_string(),
        hint: dependency_install_instructions(tool),
    }
}

/// Locate the index tool: `make_ndx` (GROMACS 4.x) or `gmx make_ndx`.
pub fn find_make_ndx() -> Option<ToolCommand> {
    if let Ok(path) = which::which("make_ndx") {
        return Some(ToolCommand::new(path));
    }
    which::which("gmx")
        .ok()
        .map(|path| ToolCommand::with_args(path, ["make_ndx"]))
}

/// Locate the distance tool (`g_dist` and its double-precision build).
pub fn find_distance_tool() -> Option<ToolCommand> {
    ["g_dist", "g_dist_d"]
        .iter()
        .find_map(|name| which::which(name).ok())
        .map(ToolCommand::new)
}

/// Locate the default filter program for `compression`.
pub fn find_compressor(compression: Compression) -> Option<ToolCommand> {
    let (program, args) = compression.default_filter();
    which::which(program)
        .ok()
        .map(|path| ToolCommand::with_args(path, args.iter().copied()))
}

/// Installation hints for a missing tool.
pub fn dependency_install_instructions(tool: &str) -> String {
    match tool {
        "make_ndx" | "g_dist" => r#"
GROMACS 4.x provides make_ndx and g_dist.

Installation options:
  Build from source: http://www.gromacs.org/Downloads
  Then source GMXRC:  source /usr/local/gromacs/bin/GMXRC

Or point the [tools] table of the run config at the binaries.
"#
        .to_string(),
        "gzip" | "bzip2" => format!(
            r#"
{0} is required to compress distance files.

Installation options:
  Ubuntu/Debian: sudo apt install {0}
  macOS:         brew install {0}

Or choose another compression with --compression.
"#,
            tool
        ),
        "cat" => "cat is required for uncompressed output (coreutils).".to_string(),
        _ => format!("Unknown dependency: {}", tool),
    }
}
