//! Configuration for the accessibility workflow
//!
//! [`AccessibilityConfig`] is the validated, immutable parameter set every
//! step works from. [`RunConfig`] is its serde-backed TOML form, which also
//! names the input files and tool overrides:
//!
//! ```toml
//! topdir = "analysis/run1"
//! structure = "md.tpr"
//! trajectory = "md.xtc"
//! cysteines = [10, 5, "Cys42"]
//! cutoff = 1.2
//! compression = "gzip"
//! timeout_secs = 3600
//!
//! [tools]
//! distance = { program = "/opt/gromacs-4.6/bin/g_dist" }
//!
//! [selection]
//! cysteine_resname = "CYSH"
//! ```

use crate::error::ConfigError;
use crate::index::SelectionNames;
use crate::layout::{group_label, RunLayout};
use crate::tools::{Compression, ToolsConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default S–OW cutoff (nm).
pub const DEFAULT_CUTOFF: f64 = 1.0;

/// A residue identifier as given by the user: an integer or a string.
///
/// Strings may be plain integers or canonical labels such as `Cys42`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResidueId {
    Int(i64),
    Text(String),
}

impl ResidueId {
    /// Coerce to an integer resid.
    pub fn to_resid(&self) -> Result<i64, ConfigError> {
        match self {
            ResidueId::Int(n) => Ok(*n),
            ResidueId::Text(s) => {
                let t = s.trim();
                let digits = match t.get(..3) {
                    Some(prefix) if prefix.eq_ignore_ascii_case("cys") => &t[3..],
                    _ => t,
                };
                digits.parse::<i64>().map_err(|_| ConfigError::InvalidResid {
                    argument: "cysteines",
                    value: s.clone(),
                })
            }
        }
    }
}

impl From<i64> for ResidueId {
    fn from(n: i64) -> Self {
        ResidueId::Int(n)
    }
}

impl From<&str> for ResidueId {
    fn from(s: &str) -> Self {
        ResidueId::Text(s.to_string())
    }
}

impl fmt::Display for ResidueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResidueId::Int(n) => write!(f, "{}", n),
            ResidueId::Text(s) => f.write_str(s),
        }
    }
}

/// Validated parameters of one accessibility analysis.
///
/// The resid list is sorted ascending: the index tool emits the per-residue
/// sulfur groups in structure order, and labels are bound to them by
/// position. Beyond integer coercion nothing is cross-checked here; in
/// particular the number of resids is not compared with the structure.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessibilityConfig {
    cysteines: Vec<i64>,
    cutoff: f64,
    layout: RunLayout,
}

impl AccessibilityConfig {
    /// Build from user input.
    ///
    /// `cysteines` is required; `cutoff` defaults to [`DEFAULT_CUTOFF`].
    pub fn new(
        cysteines: Option<&[ResidueId]>,
        cutoff: Option<f64>,
        topdir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        Self::with_compression(cysteines, cutoff, topdir, Compression::default())
    }

    /// As [`AccessibilityConfig::new`] with an explicit result compression.
    pub fn with_compression(
        cysteines: Option<&[ResidueId]>,
        cutoff: Option<f64>,
        topdir: impl Into<PathBuf>,
        compression: Compression,
    ) -> Result<Self, ConfigError> {
        let raw = cysteines.ok_or(ConfigError::MissingArgument("cysteines"))?;
        let mut resids = raw
            .iter()
            .map(ResidueId::to_resid)
            .collect::<Result<Vec<_>, _>>()?;
        resids.sort_unstable();

        let cutoff = cutoff.unwrap_or(DEFAULT_CUTOFF);
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(ConfigError::InvalidCutoff(cutoff));
        }

        Ok(Self {
            cysteines: resids,
            cutoff,
            layout: RunLayout::new(topdir, compression),
        })
    }

    /// Convenience constructor from integer resids.
    pub fn from_resids(resids: &[i64], cutoff: Option<f64>, topdir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let ids: Vec<ResidueId> = resids.iter().copied().map(ResidueId::from).collect();
        Self::new(Some(&ids), cutoff, topdir)
    }

    /// Copy of this configuration with another cutoff.
    pub fn with_cutoff(&self, cutoff: f64) -> Result<Self, ConfigError> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(ConfigError::InvalidCutoff(cutoff));
        }
        Ok(Self {
            cutoff,
            ..self.clone()
        })
    }

    /// Resids, ascending.
    pub fn cysteines(&self) -> &[i64] {
        &self.cysteines
    }

    /// Cutoff (nm).
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn index_file(&self) -> PathBuf {
        self.layout.index_file()
    }

    pub fn figure_path(&self) -> PathBuf {
        self.layout.figure_svg()
    }

    /// Result file of one residue.
    pub fn distance_file(&self, resid: i64) -> PathBuf {
        self.layout.distance_file(resid)
    }

    /// `(resid, result file)` in ascending resid order.
    pub fn distance_files(&self) -> Vec<(i64, PathBuf)> {
        self.cysteines
            .iter()
            .map(|&r| (r, self.layout.distance_file(r)))
            .collect()
    }

    /// Group labels in ascending resid order.
    pub fn labels(&self) -> Vec<String> {
        self.cysteines.iter().map(|&r| group_label(r)).collect()
    }
}

/// Run configuration as read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Top directory; artifacts go to `<topdir>/accessibility`
    #[serde(default = "default_topdir")]
    pub topdir: PathBuf,

    /// Run input (tpr) or any structure the tools accept
    #[serde(default)]
    pub structure: Option<PathBuf>,

    /// Trajectory (xtc/trr)
    #[serde(default)]
    pub trajectory: Option<PathBuf>,

    /// Cysteine resids (integers or `Cys<resid>` strings)
    #[serde(default)]
    pub cysteines: Option<Vec<ResidueId>>,

    /// S–OW cutoff (nm)
    #[serde(default)]
    pub cutoff: Option<f64>,

    /// Compression of the per-residue files
    #[serde(default)]
    pub compression: Compression,

    /// Per-residue job timeout in seconds (none by default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Fail instead of warn when the index group count does not match
    #[serde(default)]
    pub strict_group_count: bool,

    /// Extra arguments appended to the distance tool command line
    #[serde(default)]
    pub distance_args: Vec<String>,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub selection: SelectionNames,
}

fn default_topdir() -> PathBuf {
    PathBuf::from(".")
}

impl RunConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validated analysis parameters.
    pub fn accessibility(&self) -> Result<AccessibilityConfig, ConfigError> {
        AccessibilityConfig::with_compression(
            self.cysteines.as_deref(),
            self.cutoff,
            self.topdir.clone(),
            self.compression,
        )
    }

    pub fn structure(&self) -> Result<&Path, ConfigError> {
        self.structure
            .as_deref()
            .ok_or(ConfigError::MissingSetting("structure"))
    }

    pub fn trajectory(&self) -> Result<&Path, ConfigError> {
        self.trajectory
            .as_deref()
            .ok_or(ConfigError::MissingSetting("trajectory"))
    }
}
