//! Minimum-distance analysis of `g_dist -dist` output
//!
//! `g_dist -dist CUTOFF` reports, for every trajectory frame, each atom of the
//! second group that lies within `CUTOFF` of the first group:
//!
//! ```text
//! t: 0  5103 SOL 15310 OW  0.432 (nm)
//! t: 0  6881 SOL 20644 OW  0.871 (nm)
//! t: 2  5103 SOL 15310 OW  0.395 (nm)
//! ```
//!
//! [`Mindist`] reduces these records to a time series of the *closest*
//! approach per frame and offers summary statistics and histograms over it.
//! Frames where nothing came within the cutoff produce no record and are
//! therefore absent from the series.
//!
//! ```rust,no_run
//! use cysacc_mindist::Mindist;
//! use std::path::Path;
//!
//! let m = Mindist::from_path(Path::new("Cys42_OW_dist.txt.gz"), 1.0).unwrap();
//! println!("{} frames, closest approach {:?} nm", m.len(), m.min());
//! let h = m.histogram(None);
//! println!("most likely distance {:?} nm", h.mode());
//! ```

pub mod error;
pub mod histogram;
pub mod reader;

pub use error::{MindistError, Result};
pub use histogram::{Histogram, MAX_BINS};
pub use reader::{detect_encoding, open_distance_file, open_distance_file_with, Encoding, ReaderOptions};

use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// Default histogram bin width (nm).
pub const DEFAULT_BIN_WIDTH: f64 = 0.01;

/// Closest approach in one trajectory frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MindistFrame {
    /// Simulation time (ps)
    pub time: f64,
    /// Minimum distance within the cutoff (nm)
    pub distance: f64,
}

/// One parsed `t:` record.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceRecord {
    pub time: f64,
    pub resnr: i64,
    pub resname: String,
    pub atomnr: i64,
    pub atomname: String,
    pub distance: f64,
}

/// Parse a single `t:` line. Returns `Ok(None)` for lines that are not records.
pub fn parse_record(line: &str, line_no: usize) -> Result<Option<DistanceRecord>> {
    let trimmed = line.trim_start_matches('\r').trim();
    let Some(rest) = trimmed.strip_prefix("t:") else {
        return Ok(None);
    };
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 6 {
        return Err(MindistError::parse(
            line_no,
            format!("expected at least 6 fields after 't:', got {}", fields.len()),
        ));
    }

    let num = |idx: usize, what: &str| -> Result<f64> {
        fields[idx]
            .parse::<f64>()
            .map_err(|_| MindistError::parse(line_no, format!("invalid {} '{}'", what, fields[idx])))
    };
    let int = |idx: usize, what: &str| -> Result<i64> {
        fields[idx]
            .parse::<i64>()
            .map_err(|_| MindistError::parse(line_no, format!("invalid {} '{}'", what, fields[idx])))
    };

    Ok(Some(DistanceRecord {
        time: num(0, "time")?,
        resnr: int(1, "residue number")?,
        resname: fields[2].to_string(),
        atomnr: int(3, "atom number")?,
        atomname: fields[4].to_string(),
        distance: num(5, "distance")?,
    }))
}

/// Minimum-distance time series bound to a cutoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mindist {
    cutoff: f64,
    series: Vec<MindistFrame>,
}

impl Mindist {
    /// Read a (possibly compressed) distance file.
    pub fn from_path(path: &Path, cutoff: f64) -> Result<Self> {
        Self::from_path_with(path, cutoff, &ReaderOptions::default())
    }

    /// Read a distance file with explicit decoder settings.
    pub fn from_path_with(path: &Path, cutoff: f64, options: &ReaderOptions) -> Result<Self> {
        let reader = open_distance_file_with(path, options)?;
        Self::from_reader(reader, cutoff).map_err(|e| match e {
            MindistError::Io { source, .. } => MindistError::io(path, source),
            other => other,
        })
    }

    /// Parse `g_dist -dist` output from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R, cutoff: f64) -> Result<Self> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(MindistError::InvalidCutoff(cutoff));
        }

        let mut series: Vec<MindistFrame> = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| MindistError::io("<stream>", e))?;
            let Some(record) = parse_record(&line, idx + 1)? else {
                continue;
            };
            // Records of one frame are contiguous; keep the closest.
            match series.last_mut() {
                Some(last) if last.time == record.time => {
                    if record.distance < last.distance {
                        last.distance = record.distance;
                    }
                }
                _ => series.push(MindistFrame {
                    time: record.time,
                    distance: record.distance,
                }),
            }
        }

        log::debug!("parsed {} frames (cutoff {} nm)", series.len(), cutoff);
        Ok(Self { cutoff, series })
    }

    /// Build directly from a series (mostly for tests and re-analysis).
    pub fn from_series(series: Vec<MindistFrame>, cutoff: f64) -> Result<Self> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(MindistError::InvalidCutoff(cutoff));
        }
        Ok(Self { cutoff, series })
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn series(&self) -> &[MindistFrame] {
        &self.series
    }

    /// Per-frame minimum distances in time order.
    pub fn distances(&self) -> Vec<f64> {
        self.series.iter().map(|f| f.distance).collect()
    }

    /// Number of frames with a water within the cutoff.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn min(&self) -> Option<f64> {
        self.series.iter().map(|f| f.distance).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.series.iter().map(|f| f.distance).reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.series.is_empty() {
            return None;
        }
        Some(self.series.iter().map(|f| f.distance).sum::<f64>() / self.series.len() as f64)
    }

    /// Population standard deviation.
    pub fn std(&self) -> Option<f64> {
        let mean = self.mean()?;
        let var = self
            .series
            .iter()
            .map(|f| (f.distance - mean).powi(2))
            .sum::<f64>()
            / self.series.len() as f64;
        Some(var.sqrt())
    }

    pub fn median(&self) -> Option<f64> {
        if self.series.is_empty() {
            return None;
        }
        let mut d = self.distances();
        d.sort_by(|a, b| a.total_cmp(b));
        let n = d.len();
        Some(if n % 2 == 1 {
            d[n / 2]
        } else {
            0.5 * (d[n / 2 - 1] + d[n / 2])
        })
    }

    /// Fraction of recorded frames whose closest approach is below `d`.
    pub fn fraction_below(&self, d: f64) -> f64 {
        if self.series.is_empty() {
            return 0.0;
        }
        let n = self.series.iter().filter(|f| f.distance < d).count();
        n as f64 / self.series.len() as f64
    }

    /// Histogram over `[0, cutoff]`.
    ///
    /// Without an explicit bin count the bin width is [`DEFAULT_BIN_WIDTH`],
    /// widened when the cutoff would need more than [`MAX_BINS`] bins.
    pub fn histogram(&self, bins: Option<usize>) -> Histogram {
        let bins = bins.unwrap_or_else(|| {
            (self.cutoff / DEFAULT_BIN_WIDTH)
                .round()
                .clamp(1.0, MAX_BINS as f64) as usize
        });
        Histogram::new(&self.distances(), bins, 0.0, self.cutoff)
    }
}
