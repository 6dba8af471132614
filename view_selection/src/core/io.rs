//! Import of candidate views from JSON

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::relation_index_builder::RelationIndexBuilder;
use super::staging::{StagedView, StagingOptions};
use super::view::{View, ViewCollection, ViewError};

/// A candidate view as provided by an extraction layer: its process executions as ordered event id sequences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewInput {
    /// Label of the view (e.g., the leading object type)
    pub label: String,
    /// Process executions of the view, each given as the ordered list of its event ids
    pub process_executions: Vec<Vec<String>>,
}

/// Set of candidate views to select from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewSetInput {
    /// Candidate views
    pub views: Vec<ViewInput>,
}

impl ViewSetInput {
    /// Build in-memory relation indices for all views, dropping empty ones
    pub fn build_views(&self, session: &mut RelationIndexBuilder) -> Result<ViewCollection, ViewError> {
        let views = self
            .views
            .iter()
            .map(|input| {
                log::info!("Building relation index for {}", input.label);
                let mut builder = session.view(input.label.as_str());
                for trace in &input.process_executions {
                    builder.add_trace(trace)?;
                }
                builder.finish()
            })
            .collect::<Result<Vec<View>, ViewError>>()?;
        Ok(ViewCollection::from_views(views))
    }

    /// Stage the relation indices of all views on disk
    ///
    /// Empty views are kept here; they are dropped when the staged views are stored.
    pub fn stage_views(
        &self,
        session: &mut RelationIndexBuilder,
        options: &StagingOptions,
    ) -> Result<Vec<StagedView>, ViewError> {
        self.views
            .iter()
            .map(|input| {
                log::info!("Staging relation index for {}", input.label);
                let mut builder = session.staged_view(input.label.as_str(), options)?;
                for trace in &input.process_executions {
                    builder.add_trace(trace)?;
                }
                builder.finish()
            })
            .collect()
    }
}

///
/// Import a [`ViewSetInput`] from a JSON file given by a filepath
///
/// See also [`import_view_set_json_from_slice`].
///
pub fn import_view_set_json_from_path<P: AsRef<Path>>(path: P) -> Result<ViewSetInput, ViewError> {
    let reader: BufReader<File> = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

///
/// Import a [`ViewSetInput`] from a JSON byte slice
///
pub fn import_view_set_json_from_slice(slice: &[u8]) -> Result<ViewSetInput, ViewError> {
    Ok(serde_json::from_slice(slice)?)
}

///
/// Import a [`View`] (label and relation index) from a JSON file
///
/// The relation index invariant is checked after parsing.
///
pub fn import_view_json_from_path<P: AsRef<Path>>(path: P) -> Result<View, ViewError> {
    let reader: BufReader<File> = BufReader::new(File::open(path)?);
    let view: View = serde_json::from_reader(reader)?;
    view.relation_index.validate()?;
    Ok(view)
}

///
/// Export a [`View`] to a JSON file at the specified path
///
pub fn export_view_json_path<P: AsRef<Path>>(view: &View, path: P) -> Result<(), ViewError> {
    let writer: BufWriter<File> = BufWriter::new(File::create(path)?);
    Ok(serde_json::to_writer(writer, view)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_VIEW_SET: &str = r#"
{
    "views": [
        {
            "label": "orders",
            "process_executions": [["place_o1", "pay_o1", "ship_o1"], ["place_o2", "pay_o2"]]
        },
        {
            "label": "customers",
            "process_executions": []
        },
        {
            "label": "items",
            "process_executions": [["place_o1", "pay_o1"], ["pick_i3", "ship_o1"]]
        }
    ]
}"#;

    #[test]
    fn import_and_build_views() {
        let input = import_view_set_json_from_slice(SAMPLE_VIEW_SET.as_bytes()).unwrap();
        assert_eq!(input.views.len(), 3);

        let mut session = RelationIndexBuilder::new();
        let views = input.build_views(&mut session).unwrap();
        assert_eq!(views.labels(), vec!["orders".to_string(), "items".to_string()]);
        assert_eq!(views[0].relation_index.num_edges(), 3);
        assert_eq!(views[1].relation_index.num_edges(), 2);
        assert_eq!(session.num_edges(), 4);
    }

    #[test]
    fn export_and_import_view() {
        let input = import_view_set_json_from_slice(SAMPLE_VIEW_SET.as_bytes()).unwrap();
        let mut session = RelationIndexBuilder::new();
        let views = input.build_views(&mut session).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        export_view_json_path(&views[0], &path).unwrap();
        let view = import_view_json_from_path(&path).unwrap();
        assert_eq!(&view, &views[0]);
    }

    #[test]
    fn import_rejects_instance_listed_twice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doubled.json");
        std::fs::write(
            &path,
            r#"{"label": "doubled", "relation_index": {"edges": [[1, [0, 0]]], "num_process_executions": 1, "num_events": 2}}"#,
        )
        .unwrap();
        assert!(matches!(
            import_view_json_from_path(&path),
            Err(ViewError::InstancesNotASet { .. })
        ));
    }
}
