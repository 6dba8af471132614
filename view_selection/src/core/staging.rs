//! Staging relation indices on disk before they are ingested into a view store
use std::fs::File;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::relation_index_builder::RelationSink;
use super::view::{EdgeId, InstanceIndex, RelationIndex, View, ViewError};

/// Options for staging relation indices on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingOptions {
    /// Number of `(edge, instance)` rows buffered in memory before they are appended to the staging file
    pub batch_size: usize,
    /// Upper bound for the size of a staging file (in bytes)
    ///
    /// Checked after every flushed batch; exceeding it aborts building the view.
    pub max_staging_bytes: u64,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            batch_size: 50_000,
            max_staging_bytes: 50_000_000_000,
        }
    }
}

///
/// [`RelationSink`] writing `(edge, instance)` rows as CSV into a temporary file
///
/// Rows are buffered and flushed in batches of [`StagingOptions::batch_size`].
///
#[derive(Debug)]
pub struct StagingWriter {
    label: String,
    file: NamedTempFile,
    writer: csv::Writer<File>,
    batch: Vec<(u64, InstanceIndex)>,
    options: StagingOptions,
    num_process_executions: usize,
    num_rows: u64,
}

impl StagingWriter {
    /// Create a staging writer backed by a fresh temporary file
    pub fn new(label: &str, options: &StagingOptions) -> Result<Self, ViewError> {
        let file = tempfile::Builder::new()
            .prefix("relation_index_")
            .suffix(".csv")
            .tempfile()?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file.as_file().try_clone()?);
        Ok(Self {
            label: label.to_string(),
            file,
            writer,
            batch: Vec::with_capacity(options.batch_size.max(1)),
            options: options.clone(),
            num_process_executions: 0,
            num_rows: 0,
        })
    }

    fn flush_batch(&mut self) -> Result<(), ViewError> {
        for row in self.batch.drain(..) {
            self.writer.serialize(row)?;
        }
        self.writer.flush()?;
        let size = self.file.as_file().metadata()?.len();
        if size > self.options.max_staging_bytes {
            return Err(ViewError::StagingLimitExceeded {
                label: self.label.clone(),
                limit: self.options.max_staging_bytes,
                size,
            });
        }
        Ok(())
    }
}

impl RelationSink for StagingWriter {
    type Output = StagedView;

    fn open_instance(&mut self) -> InstanceIndex {
        self.num_process_executions += 1;
        self.num_process_executions - 1
    }

    fn record(&mut self, edge: EdgeId, instance: InstanceIndex) -> Result<(), ViewError> {
        if instance >= self.num_process_executions {
            return Err(ViewError::InstanceOutOfRange {
                edge,
                instance,
                num_process_executions: self.num_process_executions,
            });
        }
        self.batch.push((edge.into_inner(), instance));
        self.num_rows += 1;
        if self.batch.len() >= self.options.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    fn finish(mut self, label: String, num_events: usize) -> Result<StagedView, ViewError> {
        if !self.batch.is_empty() {
            self.flush_batch()?;
        }
        log::info!(
            "Staged {} relation index rows for view '{}'",
            self.num_rows,
            label
        );
        Ok(StagedView {
            label,
            num_process_executions: self.num_process_executions,
            num_events,
            num_rows: self.num_rows,
            file: self.file,
        })
    }
}

///
/// A view whose relation index has been fully staged on disk
///
/// The staging file is removed when the [`StagedView`] is dropped.
///
#[derive(Debug)]
pub struct StagedView {
    /// Label of the view
    pub label: String,
    /// Number of process executions of the view
    pub num_process_executions: usize,
    /// Number of events across all process executions
    pub num_events: usize,
    /// Number of staged `(edge, instance)` rows
    pub num_rows: u64,
    file: NamedTempFile,
}

impl StagedView {
    /// Average number of events per process execution (`0` if there are none)
    pub fn avg_events_per_trace(&self) -> f64 {
        if self.num_process_executions == 0 {
            0.0
        } else {
            self.num_events as f64 / self.num_process_executions as f64
        }
    }

    /// Stream the staged `(edge, instance)` rows back from disk
    pub fn rows(
        &self,
    ) -> Result<impl Iterator<Item = Result<(EdgeId, InstanceIndex), ViewError>>, ViewError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(self.file.path())?;
        Ok(reader
            .into_deserialize::<(u64, InstanceIndex)>()
            .map(|row| {
                row.map(|(edge, instance)| (EdgeId::from(edge), instance))
                    .map_err(ViewError::from)
            }))
    }

    /// Load the staged relation index into memory
    pub fn load(&self) -> Result<View, ViewError> {
        let mut index = RelationIndex::new(self.num_process_executions);
        for row in self.rows()? {
            let (edge, instance) = row?;
            index.insert(edge, instance)?;
        }
        index.add_events(self.num_events);
        Ok(View::new(self.label.clone(), index))
    }
}
