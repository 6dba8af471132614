//! Serializable report of a selection run and export of the computed scores
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::view::View;
use crate::scoring::{ScoreMatrix, SimilarityMeasure};
use crate::selection::{ScoreInfo, SelectionMethod, SelectionResult};

/// Descriptive statistics of a candidate view, as shown in reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSummary {
    /// Label of the view
    pub label: String,
    /// Number of process executions
    pub num_process_executions: usize,
    /// Number of distinct directly-follows edges
    pub num_edges: usize,
    /// Number of events across all process executions
    pub num_events: usize,
    /// Average number of events per process execution
    pub avg_events_per_trace: f64,
}

impl From<&View> for ViewSummary {
    fn from(view: &View) -> Self {
        Self {
            label: view.label.clone(),
            num_process_executions: view.num_process_executions(),
            num_edges: view.relation_index.num_edges(),
            num_events: view.num_events(),
            avg_events_per_trace: view.avg_events_per_trace(),
        }
    }
}

#[cfg(any(feature = "view-sqlite", feature = "view-duckdb"))]
impl ViewSummary {
    /// Summary of a persisted view, given its number of distinct edges
    pub fn from_meta(meta: &crate::db::ViewMeta, num_edges: usize) -> Self {
        Self {
            label: meta.label.clone(),
            num_process_executions: meta.num_process_executions,
            num_edges,
            num_events: meta.num_events,
            avg_events_per_trace: meta.avg_events_per_trace,
        }
    }
}

/// Durations (in seconds) of the phases of a selection run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Runtimes {
    /// Building (and storing) the relation indices
    pub index_computation: f64,
    /// Computing the score matrix
    pub score_computation: f64,
    /// Selecting the views
    pub view_selection: f64,
    /// The whole run
    pub run_time: f64,
}

/// A selected view with its statistics and the scores it was selected with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedViewReport {
    /// Position in the selection (starting at 1)
    pub position: usize,
    /// Index of the view
    pub view_index: usize,
    /// Label of the view
    pub label: String,
    /// Number of process executions
    pub num_process_executions: usize,
    /// Number of distinct directly-follows edges
    pub num_edges: usize,
    /// Number of events
    pub num_events: usize,
    /// Average number of events per process execution
    pub avg_events_per_trace: f64,
    /// Score the view was selected with
    pub score: f64,
    /// Selection diagnostics
    pub score_info: ScoreInfo,
    /// Seconds from the start of the selection until the view was selected
    pub elapsed: f64,
}

/// Report of a selection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Selection method
    pub method: SelectionMethod,
    /// Similarity measure
    pub measure: SimilarityMeasure,
    /// Input the views were read from
    pub input: String,
    /// Phase runtimes
    pub runtimes: Runtimes,
    /// Selected views in selection order
    pub selected_views: Vec<SelectedViewReport>,
}

impl SelectionReport {
    ///
    /// Assemble the report of a selection
    ///
    /// `views` holds the summaries of all scored views by view index;
    /// `selection_start` is when the selection phase began.
    ///
    pub fn new(
        method: SelectionMethod,
        measure: SimilarityMeasure,
        input: String,
        runtimes: Runtimes,
        result: &SelectionResult,
        views: &[ViewSummary],
        selection_start: DateTime<Utc>,
    ) -> Self {
        let selected_views = result
            .steps()
            .iter()
            .enumerate()
            .map(|(pos, step)| {
                let view = &views[step.view_index];
                SelectedViewReport {
                    position: pos + 1,
                    view_index: step.view_index,
                    label: view.label.clone(),
                    num_process_executions: view.num_process_executions,
                    num_edges: view.num_edges,
                    num_events: view.num_events,
                    avg_events_per_trace: view.avg_events_per_trace,
                    score: step.score,
                    score_info: step.score_info.clone(),
                    elapsed: (step.timestamp - selection_start)
                        .to_std()
                        .map(|d| d.as_secs_f64())
                        .unwrap_or_default(),
                }
            })
            .collect();
        Self {
            method,
            measure,
            input,
            runtimes,
            selected_views,
        }
    }
}

///
/// Export a [`SelectionReport`] as pretty-printed JSON to the specified path
///
pub fn export_report_json_path<P: AsRef<Path>>(
    report: &SelectionReport,
    path: P,
) -> Result<(), std::io::Error> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Overall score of every view by label
pub fn overall_scores_by_label(
    matrix: &ScoreMatrix,
    labels: &[String],
) -> serde_json::Map<String, serde_json::Value> {
    labels
        .iter()
        .zip(matrix.overall_scores())
        .map(|(label, score)| (label.clone(), serde_json::Value::from(*score)))
        .collect()
}

/// Pairwise scores of all ordered pairs of views as `(label_i, label_j, score)` triples
pub fn pairwise_scores_by_label(
    matrix: &ScoreMatrix,
    labels: &[String],
) -> Vec<(String, String, f64)> {
    let mut triples = Vec::with_capacity(matrix.len() * matrix.len());
    for (i, label_i) in labels.iter().enumerate().take(matrix.len()) {
        for (j, label_j) in labels.iter().enumerate().take(matrix.len()) {
            triples.push((label_i.clone(), label_j.clone(), matrix.score(i, j)));
        }
    }
    triples
}

///
/// Export the overall and pairwise scores as JSON files `<prefix>_overall.json` and `<prefix>_pairwise.json`
///
pub fn export_scores_json<P: AsRef<Path>>(
    matrix: &ScoreMatrix,
    labels: &[String],
    prefix: P,
) -> Result<(), std::io::Error> {
    let prefix = prefix.as_ref().to_string_lossy().to_string();
    let writer = BufWriter::new(File::create(format!("{prefix}_overall.json"))?);
    serde_json::to_writer_pretty(writer, &overall_scores_by_label(matrix, labels))?;
    let writer = BufWriter::new(File::create(format!("{prefix}_pairwise.json"))?);
    serde_json::to_writer(writer, &pairwise_scores_by_label(matrix, labels))?;
    Ok(())
}
