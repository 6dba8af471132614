use serde::{Deserialize, Serialize};

use super::{DatabaseConnection, DatabaseError};
use crate::core::staging::StagedView;
use crate::core::view::{EdgeId, InstanceIndex, ViewCollection, ViewError};

pub(crate) const VIEW_META_TABLE: &str = "view_meta";

/// Name of the `(edge, instance)` table of a view
pub fn view_table(view_index: usize) -> String {
    format!("view_{view_index}")
}

/// Name of the `(instance, edge_count)` table of a view
pub fn counts_table(view_index: usize) -> String {
    format!("view_{view_index}_counts")
}

/// Metadata row of a persisted view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMeta {
    /// Contiguous, 0-based index of the view
    pub view_index: usize,
    /// Label of the view
    pub label: String,
    /// Number of process executions
    pub num_process_executions: usize,
    /// Number of events across all process executions
    pub num_events: usize,
    /// Average number of events per process execution
    pub avg_events_per_trace: f64,
}

///
/// Create the view metadata table
///
pub fn create_view_schema<'a, DC: Into<DatabaseConnection<'a>>>(
    con: DC,
) -> Result<(), DatabaseError> {
    let con = con.into();
    con.execute_no_params(&format!(
        r#"CREATE TABLE IF NOT EXISTS "{VIEW_META_TABLE}" (view_idx INTEGER PRIMARY KEY, label TEXT, num_process_executions INTEGER, num_events INTEGER, avg_events_per_trace DOUBLE)"#
    ))?;
    Ok(())
}

/// Forget previously stored views, so that a new set of views can be stored
fn clear_view_meta(con: &DatabaseConnection<'_>) -> Result<(), DatabaseError> {
    con.execute_no_params(&format!(r#"DELETE FROM "{VIEW_META_TABLE}""#))?;
    Ok(())
}

/// Store a single view with its rows in one transaction
fn store_view(
    con: &DatabaseConnection<'_>,
    meta: &ViewMeta,
    rows: impl Iterator<Item = Result<(EdgeId, InstanceIndex), ViewError>>,
) -> Result<(), DatabaseError> {
    let table = view_table(meta.view_index);
    let counts = counts_table(meta.view_index);
    let num_rows = con.in_transaction(|| {
        // Counts of a previous run belong to other rows
        con.execute_no_params(&format!(r#"DROP TABLE IF EXISTS "{counts}""#))?;
        con.execute_no_params(&format!(r#"DROP TABLE IF EXISTS "{table}""#))?;
        con.execute_no_params(&format!(
            r#"CREATE TABLE "{table}" (edge INTEGER, instance INTEGER)"#
        ))?;
        let num_rows = con.insert_edge_rows(&table, rows)?;
        con.execute_no_params(&format!(
            r#"CREATE INDEX IF NOT EXISTS "{table}_edge" ON "{table}" (edge)"#
        ))?;
        con.insert_view_meta(VIEW_META_TABLE, meta)?;
        Ok(num_rows)
    })?;
    log::info!(
        "Stored view {} ('{}') with {} rows",
        meta.view_index,
        meta.label,
        num_rows
    );
    Ok(())
}

///
/// Store staged views in the database
///
/// Views without process executions are skipped; the stored views get contiguous indices in input order.
/// Returns the metadata of all stored views.
///
pub fn store_staged_views<'a, DC: Into<DatabaseConnection<'a>>>(
    con: DC,
    views: &[StagedView],
) -> Result<Vec<ViewMeta>, DatabaseError> {
    let con = con.into();
    create_view_schema(&con)?;
    clear_view_meta(&con)?;
    let mut stored = Vec::new();
    for view in views {
        if view.num_process_executions == 0 {
            log::warn!(
                "Dropping view '{}' without process executions",
                view.label
            );
            continue;
        }
        let meta = ViewMeta {
            view_index: stored.len(),
            label: view.label.clone(),
            num_process_executions: view.num_process_executions,
            num_events: view.num_events,
            avg_events_per_trace: view.avg_events_per_trace(),
        };
        store_view(&con, &meta, view.rows()?)?;
        stored.push(meta);
    }
    Ok(stored)
}

///
/// Store in-memory views in the database, keeping their view indices
///
pub fn store_views<'a, DC: Into<DatabaseConnection<'a>>>(
    con: DC,
    views: &ViewCollection,
) -> Result<Vec<ViewMeta>, DatabaseError> {
    let con = con.into();
    create_view_schema(&con)?;
    clear_view_meta(&con)?;
    views
        .iter()
        .enumerate()
        .map(|(view_index, view)| {
            let meta = ViewMeta {
                view_index,
                label: view.label.clone(),
                num_process_executions: view.num_process_executions(),
                num_events: view.num_events(),
                avg_events_per_trace: view.avg_events_per_trace(),
            };
            let rows = view.relation_index.edges().flat_map(|(edge, instances)| {
                instances.iter().map(move |&instance| Ok((*edge, instance)))
            });
            store_view(&con, &meta, rows)?;
            Ok(meta)
        })
        .collect()
}

///
/// Precompute the number of distinct edges per instance for the first `num_views` views
///
/// With `reuse_existing`, views that already have a count table keep it.
/// All count tables are committed when this function returns.
/// Returns the number of count tables that were (re)computed.
///
pub fn precompute_counts<'a, DC: Into<DatabaseConnection<'a>>>(
    con: DC,
    num_views: usize,
    reuse_existing: bool,
) -> Result<usize, DatabaseError> {
    let con = con.into();
    let computed = con.in_transaction(|| {
        let mut computed = 0;
        for view_index in 0..num_views {
            let table = view_table(view_index);
            let counts = counts_table(view_index);
            if reuse_existing && con.table_exists(&counts)? {
                continue;
            }
            con.execute_no_params(&format!(r#"DROP TABLE IF EXISTS "{counts}""#))?;
            con.execute_no_params(&format!(
                r#"CREATE TABLE "{counts}" AS SELECT instance, COUNT(DISTINCT edge) AS edge_count FROM "{table}" GROUP BY instance"#
            ))?;
            con.execute_no_params(&format!(
                r#"CREATE INDEX IF NOT EXISTS "{counts}_instance" ON "{counts}" (instance)"#
            ))?;
            computed += 1;
        }
        Ok(computed)
    })?;
    log::info!(
        "Precomputed edge counts of {} views ({} reused)",
        computed,
        num_views - computed
    );
    Ok(computed)
}

///
/// Load the metadata of all stored views, ordered by view index
///
/// Fails if the stored indices are not contiguous starting at `0`.
///
pub fn load_view_meta<'a, DC: Into<DatabaseConnection<'a>>>(
    con: DC,
) -> Result<Vec<ViewMeta>, DatabaseError> {
    let con = con.into();
    let metas = con.query_view_meta(VIEW_META_TABLE)?;
    if let Some((pos, meta)) = metas
        .iter()
        .enumerate()
        .find(|(pos, meta)| *pos != meta.view_index)
    {
        return Err(DatabaseError::MissingMetadata(format!(
            "expected view {} but found view {} ('{}')",
            pos, meta.view_index, meta.label
        )));
    }
    Ok(metas)
}

///
/// Count the distinct edges of a stored view
///
pub fn count_distinct_edges<'a, DC: Into<DatabaseConnection<'a>>>(
    con: DC,
    view_index: usize,
) -> Result<u64, DatabaseError> {
    let con = con.into();
    let count = con.query_i64(&format!(
        r#"SELECT COUNT(DISTINCT edge) FROM "{}""#,
        view_table(view_index)
    ))?;
    Ok(count as u64)
}

#[cfg(all(test, feature = "view-sqlite"))]
mod tests {
    use super::*;
    use crate::core::relation_index_builder::RelationIndexBuilder;
    use crate::core::staging::StagingOptions;

    #[test]
    fn store_staged_views_skips_empty_views() {
        let mut session = RelationIndexBuilder::new();
        let options = StagingOptions::default();

        let mut orders = session.staged_view("orders", &options).unwrap();
        orders.add_trace(&["place", "pay", "ship"]).unwrap();
        orders.add_trace(&["place", "pay"]).unwrap();
        let orders = orders.finish().unwrap();
        let customers = session.staged_view("customers", &options).unwrap().finish().unwrap();
        let mut items = session.staged_view("items", &options).unwrap();
        items.add_trace(&["pick", "ship"]).unwrap();
        let items = items.finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let con = rusqlite::Connection::open(dir.path().join("views.sqlite")).unwrap();
        let stored = store_staged_views(&con, &[orders, customers, items]).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].label, "items");
        assert_eq!(stored[1].view_index, 1);

        let metas = load_view_meta(&con).unwrap();
        assert_eq!(metas, stored);
        assert_eq!(metas[0].num_process_executions, 2);
        assert_eq!(metas[0].num_events, 5);
        assert_eq!(metas[0].avg_events_per_trace, 2.5);
        assert_eq!(count_distinct_edges(&con, 0).unwrap(), 2);
        assert_eq!(count_distinct_edges(&con, 1).unwrap(), 1);
    }

    #[test]
    fn precomputed_counts() {
        let mut session = RelationIndexBuilder::new();
        let mut view = session.view("loop");
        view.add_trace(&["a", "b", "a", "b"]).unwrap();
        view.add_trace(&["a", "b"]).unwrap();
        let views = ViewCollection::from_views(vec![view.finish().unwrap()]);

        let dir = tempfile::tempdir().unwrap();
        let con = rusqlite::Connection::open(dir.path().join("views.sqlite")).unwrap();
        store_views(&con, &views).unwrap();
        assert_eq!(precompute_counts(&con, 1, true).unwrap(), 1);
        let con = DatabaseConnection::from(&con);
        assert_eq!(
            con.query_i64(r#"SELECT edge_count FROM "view_0_counts" WHERE instance = 0"#)
                .unwrap(),
            2
        );
        assert_eq!(
            con.query_i64(r#"SELECT edge_count FROM "view_0_counts" WHERE instance = 1"#)
                .unwrap(),
            1
        );
    }

    fn loop_views() -> ViewCollection {
        let mut session = RelationIndexBuilder::new();
        let mut view = session.view("loop");
        view.add_trace(&["a", "b", "a", "b"]).unwrap();
        view.add_trace(&["a", "b"]).unwrap();
        ViewCollection::from_views(vec![view.finish().unwrap()])
    }

    #[test]
    fn counts_are_reused_until_the_view_is_stored_again() {
        let views = loop_views();
        let dir = tempfile::tempdir().unwrap();
        let con = rusqlite::Connection::open(dir.path().join("views.sqlite")).unwrap();
        store_views(&con, &views).unwrap();
        assert_eq!(precompute_counts(&con, 1, false).unwrap(), 1);

        let db = DatabaseConnection::from(&con);
        db.execute_no_params(r#"UPDATE "view_0_counts" SET edge_count = 99"#)
            .unwrap();
        let count_of_first = r#"SELECT edge_count FROM "view_0_counts" WHERE instance = 0"#;

        assert_eq!(precompute_counts(&con, 1, true).unwrap(), 0);
        assert_eq!(db.query_i64(count_of_first).unwrap(), 99);

        assert_eq!(precompute_counts(&con, 1, false).unwrap(), 1);
        assert_eq!(db.query_i64(count_of_first).unwrap(), 2);

        // Storing the view again invalidates its counts
        store_views(&con, &views).unwrap();
        assert!(!db.table_exists("view_0_counts").unwrap());
        assert_eq!(precompute_counts(&con, 1, true).unwrap(), 1);
    }

    #[test]
    fn failed_store_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let con = rusqlite::Connection::open(dir.path().join("views.sqlite")).unwrap();
        let db = DatabaseConnection::from(&con);
        create_view_schema(&db).unwrap();
        let meta = ViewMeta {
            view_index: 0,
            label: "broken".to_string(),
            num_process_executions: 1,
            num_events: 2,
            avg_events_per_trace: 2.0,
        };
        let rows = vec![
            Ok((EdgeId::from(0), 0)),
            Err(ViewError::Io(std::io::Error::other("staging file vanished"))),
        ];
        assert!(matches!(
            store_view(&db, &meta, rows.into_iter()),
            Err(DatabaseError::View(ViewError::Io(_)))
        ));
        assert!(con.is_autocommit());
        assert!(!db.table_exists("view_0").unwrap());
        assert!(load_view_meta(&db).unwrap().is_empty());

        // The connection is usable for the next transaction
        let stored = store_views(&con, &loop_views()).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(db.table_exists("view_0").unwrap());
    }
}
