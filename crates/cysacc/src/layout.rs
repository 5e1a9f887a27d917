//! On-disk layout of an accessibility run
//!
//! ```text
//! <topdir>/accessibility/
//!     cys.ndx                   index groups (Cys<resid>..., OW)
//!     Cys<resid>_OW_dist.txt.gz per-residue g_dist output, compressed
//!     Cys<resid>_OW_dist.log    stderr of the distance tool
//!     mindist_S_OW.svg          combined histogram figure
//!     summary.json              per-residue statistics
//! ```

use crate::tools::Compression;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory under the run's top directory that holds every artifact.
pub const PLUGIN_DIR: &str = "accessibility";

/// Label of the water-oxygen index group.
pub const WATER_GROUP: &str = "OW";

/// Canonical group label for a cysteine residue.
pub fn group_label(resid: i64) -> String {
    format!("Cys{}", resid)
}

/// Deterministic paths for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    topdir: PathBuf,
    compression: Compression,
}

impl RunLayout {
    pub fn new(topdir: impl Into<PathBuf>, compression: Compression) -> Self {
        Self {
            topdir: topdir.into(),
            compression,
        }
    }

    pub fn topdir(&self) -> &Path {
        &self.topdir
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.topdir.join(PLUGIN_DIR)
    }

    /// Create the plugin directory if needed.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.plugin_dir())
    }

    pub fn index_file(&self) -> PathBuf {
        self.plugin_dir().join("cys.ndx")
    }

    /// Per-residue distance series, e.g. `Cys42_OW_dist.txt.gz`.
    pub fn distance_file(&self, resid: i64) -> PathBuf {
        self.plugin_dir().join(format!(
            "{}_{}_dist.txt{}",
            group_label(resid),
            WATER_GROUP,
            self.compression.extension()
        ))
    }

    /// Captured stderr of the distance tool for one residue.
    pub fn tool_log(&self, resid: i64) -> PathBuf {
        self.plugin_dir()
            .join(format!("{}_{}_dist.log", group_label(resid), WATER_GROUP))
    }

    /// Combined figure, without extension.
    pub fn figure_base(&self) -> PathBuf {
        self.plugin_dir().join("mindist_S_OW")
    }

    pub fn figure_svg(&self) -> PathBuf {
        self.figure_base().with_extension("svg")
    }

    pub fn summary_json(&self) -> PathBuf {
        self.plugin_dir().join("summary.json")
    }
}

/// Temporary name a result is streamed into before it is moved into place.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = RunLayout::new("/data/run1", Compression::Gzip);
        assert_eq!(layout.plugin_dir(), PathBuf::from("/data/run1/accessibility"));
        assert_eq!(layout.index_file(), PathBuf::from("/data/run1/accessibility/cys.ndx"));
        assert_eq!(
            layout.distance_file(42),
            PathBuf::from("/data/run1/accessibility/Cys42_OW_dist.txt.gz")
        );
        assert_eq!(
            layout.tool_log(42),
            PathBuf::from("/data/run1/accessibility/Cys42_OW_dist.log")
        );
        assert_eq!(
            layout.figure_svg(),
            PathBuf::from("/data/run1/accessibility/mindist_S_OW.svg")
        );
    }

    #[test]
    fn test_extension_follows_compression() {
        let bz = RunLayout::new("r", Compression::Bzip2);
        assert!(bz.distance_file(5).ends_with("Cys5_OW_dist.txt.bz2"));
        let plain = RunLayout::new("r", Compression::None);
        assert!(plain.distance_file(5).ends_with("Cys5_OW_dist.txt"));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("a/Cys5_OW_dist.txt.gz")),
            PathBuf::from("a/Cys5_OW_dist.txt.gz.partial")
        );
    }
}
