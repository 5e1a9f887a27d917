//! Fake GROMACS tools for workflow tests.
//!
//! The scripts are run as `sh <script>` so nothing has to be executable.
//! Every invocation is appended to a log under `logs/` for counting.

#![allow(dead_code)]

use cysacc::{AccessibilityConfig, Compression, ResidueId, ToolCommand, ToolEnvironment};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAKE_MAKE_NDX: &str = r##"
echo "$@" >> "@LOG@/make_ndx.calls"
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
  esac
  shift
done
cat > "@LOG@/make_ndx.stdin"
: > "$out"
i=1
while read -r cmd num label; do
  if [ "$cmd" = "name" ]; then
    printf '[ %s ]\n%s\n' "$label" "$i" >> "$out"
    i=$((i+1))
  fi
done < "@LOG@/make_ndx.stdin"
printf '[ OW ]\n100 103 106\n' >> "$out"
"##;

const FAKE_G_DIST: &str = r##"
echo "$@" >> "@LOG@/g_dist.calls"
cutoff=""
while [ $# -gt 0 ]; do
  case "$1" in
    -dist) cutoff="$2"; shift ;;
  esac
  shift
done
read -r group
read -r water
echo "$group $water" >> "@LOG@/g_dist.groups"
echo "Selected groups $group and $water" >&2
if [ "$group" = "@FAIL@" ]; then
  echo "Fatal error: simulated failure for $group" >&2
  exit 1
fi
echo "# minimum distance $group - $water, cutoff $cutoff nm"
echo "t: 0  5103 SOL 15310 OW  0.432 (nm)"
echo "t: 0  6881 SOL 20644 OW  0.871 (nm)"
echo "t: 2  5103 SOL 15310 OW  0.395 (nm)"
echo "t: 4  5120 SOL 15361 OW  0.612 (nm)"
"##;

/// Scratch run directory with fake tools.
pub struct Sandbox {
    tmp: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("logs")).unwrap();
        fs::create_dir_all(tmp.path().join("bin")).unwrap();
        fs::write(tmp.path().join("md.tpr"), b"fake run input").unwrap();
        fs::write(tmp.path().join("md.xtc"), b"fake trajectory").unwrap();
        Self { tmp }
    }

    pub fn path(&self) -> &Path {
        self.tmp.path()
    }

    pub fn topdir(&self) -> PathBuf {
        self.path().join("run")
    }

    pub fn structure(&self) -> PathBuf {
        self.path().join("md.tpr")
    }

    pub fn trajectory(&self) -> PathBuf {
        self.path().join("md.xtc")
    }

    fn log_dir(&self) -> PathBuf {
        self.path().join("logs")
    }

    /// Configuration with plain-text result files.
    pub fn config(&self, resids: &[i64], cutoff: f64) -> AccessibilityConfig {
        self.config_with(resids, cutoff, Compression::None)
    }

    pub fn config_with(&self, resids: &[i64], cutoff: f64, compression: Compression) -> AccessibilityConfig {
        let ids: Vec<ResidueId> = resids.iter().map(|&r| ResidueId::Int(r)).collect();
        AccessibilityConfig::with_compression(Some(&ids), Some(cutoff), self.topdir(), compression).unwrap()
    }

    fn script(&self, name: &str, template: &str, fail_group: Option<&str>) -> ToolCommand {
        let body = template
            .replace("@LOG@", &self.log_dir().display().to_string())
            .replace("@FAIL@", fail_group.unwrap_or("__none__"));
        let path = self.path().join("bin").join(name);
        fs::write(&path, body).unwrap();
        ToolCommand::with_args("sh", [path.display().to_string()])
    }

    /// Fake tools with `cat` as the filter; `fail_group` makes g_dist fail for that label.
    pub fn env(&self, fail_group: Option<&str>) -> ToolEnvironment {
        self.env_with(fail_group, ToolCommand::new("cat"), Compression::None)
    }

    pub fn env_with(&self, fail_group: Option<&str>, compressor: ToolCommand, compression: Compression) -> ToolEnvironment {
        ToolEnvironment::new(
            self.script("make_ndx.sh", FAKE_MAKE_NDX, None),
            self.script("g_dist.sh", FAKE_G_DIST, fail_group),
            compressor,
            compression,
        )
    }

    fn log_lines(&self, name: &str) -> Vec<String> {
        match fs::read_to_string(self.log_dir().join(name)) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn make_ndx_calls(&self) -> usize {
        self.log_lines("make_ndx.calls").len()
    }

    /// Command-line arguments of every g_dist call.
    pub fn g_dist_calls(&self) -> Vec<String> {
        self.log_lines("g_dist.calls")
    }

    /// Group pair read by every g_dist call.
    pub fn g_dist_groups(&self) -> Vec<String> {
        self.log_lines("g_dist.groups")
    }

    /// Script the index tool received on stdin.
    pub fn make_ndx_script(&self) -> Vec<String> {
        self.log_lines("make_ndx.stdin")
    }
}
