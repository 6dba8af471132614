#![warn(
    clippy::doc_markdown,
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs
)]
#![doc = include_str!("../README.md")]

///
/// Views, their relation indices and how they are built
///
pub mod core;

///
/// Similarity measures and the [`ScoreMatrix`] of all views
///
pub mod scoring;

///
/// Subset selection (MMR and exhaustive enumeration)
///
pub mod selection;

///
/// Persisted views in SQLite or DuckDB
///
#[cfg(any(feature = "view-sqlite", feature = "view-duckdb"))]
pub mod db;

///
/// Run reports and score export
///
pub mod report;

#[doc(inline)]
pub use crate::core::io::{
    export_view_json_path, import_view_json_from_path, import_view_set_json_from_path,
    import_view_set_json_from_slice, ViewInput, ViewSetInput,
};
#[doc(inline)]
pub use crate::core::{
    EdgeId, RelationIndex, RelationIndexBuilder, StagedView, StagingOptions, View,
    ViewCollection, ViewError,
};
#[doc(inline)]
pub use crate::scoring::{
    InMemoryScorer, PairwiseScorer, ScoreMatrix, ScoringError, ScoringOptions, SimilarityMeasure,
};
#[doc(inline)]
pub use crate::selection::{
    SelectionConfig, SelectionError, SelectionMethod, SelectionResult, SelectionStep,
    SubsetSelector,
};
#[doc(inline)]
pub use crate::report::{Runtimes, SelectionReport, ViewSummary};

#[doc(inline)]
#[cfg(any(feature = "view-sqlite", feature = "view-duckdb"))]
pub use crate::db::{
    DatabaseBackend, DatabaseConnection, DatabaseError, DatabaseOptions, DatabaseScorer,
};

use serde::{Deserialize, Serialize};

///
/// Configuration of a complete selection run
///
/// Can be loaded from JSON; missing fields fall back to their defaults.
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// How views are scored
    pub scoring: ScoringOptions,
    /// How views are selected
    pub selection: SelectionConfig,
    /// How relation indices are staged (persisted mode only)
    pub staging: StagingOptions,
    /// How the view database is accessed (persisted mode only)
    #[cfg(any(feature = "view-sqlite", feature = "view-duckdb"))]
    pub database: DatabaseOptions,
}

impl RunConfig {
    /// Load a [`RunConfig`] from a JSON file
    pub fn from_json_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ViewError> {
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
