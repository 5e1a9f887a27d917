//! Aggregation of per-residue result files into minimum-distance analyses

use crate::config::AccessibilityConfig;
use crate::error::AnalysisError;
use crate::layout::group_label;
use anyhow::{Context, Result};
use cysacc_mindist::{Mindist, ReaderOptions};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Loads every residue's series bound to the configured cutoff.
pub struct Aggregator<'a> {
    config: &'a AccessibilityConfig,
    reader: ReaderOptions,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a AccessibilityConfig) -> Self {
        Self {
            config,
            reader: ReaderOptions::default(),
        }
    }

    /// Decoder settings for compressed result files.
    pub fn with_reader_options(mut self, reader: ReaderOptions) -> Self {
        self.reader = reader;
        self
    }

    /// Analyse one residue's result file.
    pub fn analyze_residue(&self, resid: i64) -> std::result::Result<Mindist, AnalysisError> {
        let path = self.config.distance_file(resid);
        Mindist::from_path_with(&path, self.config.cutoff(), &self.reader).map_err(|source| AnalysisError {
            resid,
            path,
            source,
        })
    }

    /// Analyse every configured residue, ascending; stops at the first failure.
    pub fn analyze(&self) -> std::result::Result<AnalysisResults, AnalysisError> {
        let mut entries = Vec::with_capacity(self.config.cysteines().len());
        for &resid in self.config.cysteines() {
            let label = group_label(resid);
            let mindist = self.analyze_residue(resid)?;
            log::info!("{}: {} frames within {} nm", label, mindist.len(), self.config.cutoff());
            entries.push((label, mindist));
        }
        Ok(AnalysisResults {
            cutoff: self.config.cutoff(),
            entries,
        })
    }
}

/// Label to analysis mapping, in ascending resid order.
#[derive(Debug, Clone)]
pub struct AnalysisResults {
    cutoff: f64,
    entries: Vec<(String, Mindist)>,
}

impl AnalysisResults {
    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn get(&self, label: &str) -> Option<&Mindist> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, m)| m)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mindist)> {
        self.entries.iter().map(|(l, m)| (l.as_str(), m))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> Vec<ResidueSummary> {
        self.iter()
            .map(|(label, m)| ResidueSummary {
                label: label.to_string(),
                frames: m.len(),
                min: m.min(),
                max: m.max(),
                mean: m.mean(),
                std: m.std(),
                median: m.median(),
                mode: m.histogram(None).mode(),
            })
            .collect()
    }

    /// Write `summary.json`.
    pub fn write_summary_json(&self, path: &Path) -> Result<()> {
        let summary = AnalysisSummary {
            generated_at: chrono::Utc::now().to_rfc3339(),
            version: crate::VERSION.to_string(),
            cutoff_nm: self.cutoff,
            residues: self.summaries(),
        };
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {}", path.display());
        Ok(())
    }
}

/// Summary statistics of one residue (distances in nm).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidueSummary {
    pub label: String,
    pub frames: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
    /// Centre of the most populated histogram bin
    pub mode: Option<f64>,
}

#[derive(Debug, Serialize)]
struct AnalysisSummary {
    generated_at: String,
    version: String,
    cutoff_nm: f64,
    residues: Vec<ResidueSummary>,
}
