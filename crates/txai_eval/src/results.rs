//! Append-only results table.
//!
//! Every evaluated (dataset, model type, explainer, masker) becomes one CSV
//! row. The header is written only when the file is created.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::drop::DropMetrics;
use crate::error::Result;
use crate::groundtruth::GroundTruthMetrics;

/// Timestamp format of the `date` column.
pub const DATE_FORMAT: &str = "%Y%m%d-%H%M";

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Dataset name.
    pub dataset: String,
    /// Model directory, e.g. `gru1layer`.
    pub model_type: String,
    /// Explainer name.
    pub explainer: String,
    /// Masker name, or `groundtruth_{agg}` for ground-truth rows.
    pub masker: String,
    /// Cross-validation fold.
    pub cv: usize,
    /// Time of the run.
    pub date: String,
    /// AUROC on masked series.
    pub auc: Option<f64>,
    /// AUROC drop.
    pub auc_drop: Option<f64>,
    /// Accuracy on masked series.
    pub acc: Option<f64>,
    /// Accuracy drop.
    pub acc_drop: Option<f64>,
    /// Cross-entropy on masked series.
    pub ce: Option<f64>,
    /// Cross-entropy increase.
    pub ce_increase: Option<f64>,
    /// Mean prediction change.
    pub avg_pred_diff: Option<f64>,
    /// Mean masked cells per series.
    pub avg_masked_count: Option<f64>,
    /// Ground-truth AUROC.
    pub gt_auroc: Option<f64>,
    /// Ground-truth AUPRC.
    pub gt_auprc: Option<f64>,
}

/// Identifies what a row was computed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    /// Dataset name.
    pub dataset: String,
    /// Model directory.
    pub model_type: String,
    /// Explainer name.
    pub explainer: String,
    /// Fold.
    pub cv: usize,
    /// Time of the run, formatted with [`DATE_FORMAT`].
    pub date: String,
}

impl RowKey {
    /// Key stamped with the current local time.
    pub fn now(
        dataset: impl Into<String>,
        model_type: impl Into<String>,
        explainer: impl Into<String>,
        cv: usize,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            model_type: model_type.into(),
            explainer: explainer.into(),
            cv,
            date: chrono::Local::now().format(DATE_FORMAT).to_string(),
        }
    }

    fn row(&self, masker: String) -> ResultRow {
        ResultRow {
            dataset: self.dataset.clone(),
            model_type: self.model_type.clone(),
            explainer: self.explainer.clone(),
            masker,
            cv: self.cv,
            date: self.date.clone(),
            auc: None,
            auc_drop: None,
            acc: None,
            acc_drop: None,
            ce: None,
            ce_increase: None,
            avg_pred_diff: None,
            avg_masked_count: None,
            gt_auroc: None,
            gt_auprc: None,
        }
    }

    /// Row for a masker's drop metrics.
    pub fn drop_row(&self, masker: impl Into<String>, metrics: &DropMetrics) -> ResultRow {
        ResultRow {
            auc: metrics.auc,
            auc_drop: metrics.auc_drop,
            acc: Some(metrics.acc),
            acc_drop: Some(metrics.acc_drop),
            ce: Some(metrics.ce),
            ce_increase: Some(metrics.ce_increase),
            avg_pred_diff: Some(metrics.avg_pred_diff),
            avg_masked_count: Some(metrics.avg_masked_count),
            ..self.row(masker.into())
        }
    }

    /// Row for ground-truth scores of one aggregation.
    pub fn ground_truth_row(&self, metrics: &GroundTruthMetrics) -> ResultRow {
        ResultRow {
            gt_auroc: metrics.auroc,
            gt_auprc: metrics.auprc,
            ..self.row(format!("groundtruth_{}", metrics.aggregation))
        }
    }
}

/// CSV results file.
#[derive(Debug, Clone)]
pub struct ResultsTable {
    path: PathBuf,
}

impl ResultsTable {
    /// Table at `path`; nothing is created until rows are appended.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file used when a run fails before rows are written.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".bak");
        self.path.with_file_name(name)
    }

    /// Append rows, creating the file and its header if needed.
    ///
    /// # Errors
    ///
    /// Propagates I/O and CSV errors.
    pub fn append(&self, rows: &[ResultRow]) -> Result<()> {
        append_rows(&self.path, rows)?;
        tracing::info!(path = %self.path.display(), rows = rows.len(), "results appended");
        Ok(())
    }

    /// Append rows to [`ResultsTable::backup_path`].
    ///
    /// # Errors
    ///
    /// Propagates I/O and CSV errors.
    pub fn append_backup(&self, rows: &[ResultRow]) -> Result<PathBuf> {
        let path = self.backup_path();
        append_rows(&path, rows)?;
        tracing::warn!(path = %path.display(), rows = rows.len(), "results saved to backup");
        Ok(path)
    }

    /// Read every row back.
    ///
    /// # Errors
    ///
    /// Propagates I/O and CSV errors.
    pub fn read(&self) -> Result<Vec<ResultRow>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader.deserialize().collect::<std::result::Result<Vec<ResultRow>, _>>()?;
        Ok(rows)
    }
}

fn append_rows(path: &Path, rows: &[ResultRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(is_new)
        .from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use txai_explain::Aggregation;

    fn metrics() -> DropMetrics {
        DropMetrics {
            auc: Some(0.8),
            auc_drop: Some(0.1),
            acc: 0.75,
            acc_drop: 0.05,
            ce: 0.6,
            ce_increase: 0.2,
            avg_pred_diff: 0.1,
            avg_masked_count: 3.0,
        }
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let table = ResultsTable::new(dir.path().join("gru1layer/spike/results.csv"));
        let key = RowKey::now("spike", "gru1layer", "winit_w10_pd", 0);

        table.append(&[key.drop_row("top5_std_mean", &metrics())]).unwrap();
        table
            .append(&[
                key.drop_row("top5_end_mean", &metrics()),
                key.ground_truth_row(&GroundTruthMetrics {
                    aggregation: Aggregation::Max,
                    auroc: Some(0.9),
                    auprc: None,
                }),
            ])
            .unwrap();

        let content = std::fs::read_to_string(table.path()).unwrap();
        assert_eq!(content.matches("dataset,model_type").count(), 1);

        let rows = table.read().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].masker, "top5_end_mean");
        assert_eq!(rows[2].masker, "groundtruth_max");
        assert_eq!(rows[2].gt_auroc, Some(0.9));
        assert_eq!(rows[2].acc, None);
        assert_eq!(rows[0].date.len(), 13);
    }

    #[test]
    fn test_backup_path() {
        let table = ResultsTable::new("out/results.csv");
        assert_eq!(table.backup_path(), PathBuf::from("out/results.csv.bak"));

        let dir = tempfile::tempdir().unwrap();
        let table = ResultsTable::new(dir.path().join("results.csv"));
        let key = RowKey::now("state", "lstm", "fo", 1);
        let path = table.append_backup(&[key.drop_row("bal5_std_mean", &metrics())]).unwrap();
        assert!(path.exists());
        assert!(!table.path().exists());
    }
}
