use std::path::{Path, PathBuf};

use super::store::{counts_table, load_view_meta, precompute_counts, view_table, ViewMeta};
use super::{DatabaseBackend, DatabaseConnection, DatabaseError, DatabaseOptions};
use crate::scoring::{PairwiseScorer, SimilarityMeasure};

///
/// Scores pairs of persisted views with SQL queries
///
/// Every pair is scored on its own read-only connection, so pairs can be scored concurrently.
/// The relation indices are never loaded into memory.
///
#[derive(Debug, Clone)]
pub struct DatabaseScorer {
    path: PathBuf,
    backend: DatabaseBackend,
    measure: SimilarityMeasure,
    options: DatabaseOptions,
    views: Vec<ViewMeta>,
}

impl DatabaseScorer {
    /// Open the views stored in the database at `path`
    pub fn open<P: AsRef<Path>>(
        path: P,
        backend: DatabaseBackend,
        measure: SimilarityMeasure,
    ) -> Result<Self, DatabaseError> {
        Self::open_with_options(path, backend, measure, DatabaseOptions::default())
    }

    /// Open the views stored in the database at `path`, connecting with the given options
    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        backend: DatabaseBackend,
        measure: SimilarityMeasure,
        options: DatabaseOptions,
    ) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let con = backend.open_with_options(&path, true, &options)?;
        let views = load_view_meta(&con)?;
        Ok(Self {
            path,
            backend,
            measure,
            options,
            views,
        })
    }

    /// Metadata of the stored views, ordered by view index
    pub fn views(&self) -> &[ViewMeta] {
        &self.views
    }

    fn view(&self, view_index: usize) -> Result<&ViewMeta, DatabaseError> {
        self.views
            .get(view_index)
            .ok_or(DatabaseError::UnknownView {
                view_index,
                num_views: self.views.len(),
            })
    }
}

/// Jaccard similarity of the distinct edge sets of two stored views
fn jaccard_similarity_sql(con: &DatabaseConnection<'_>, i: usize, j: usize) -> Result<f64, DatabaseError> {
    let (a, b) = (view_table(i), view_table(j));
    let shared = con.query_i64(&format!(
        r#"SELECT COUNT(*) FROM (SELECT DISTINCT edge FROM "{a}") AS ea JOIN (SELECT DISTINCT edge FROM "{b}") AS eb ON ea.edge = eb.edge"#
    ))?;
    if shared == 0 {
        return Ok(0.0);
    }
    let edges_a = con.query_i64(&format!(r#"SELECT COUNT(DISTINCT edge) FROM "{a}""#))?;
    let edges_b = con.query_i64(&format!(r#"SELECT COUNT(DISTINCT edge) FROM "{b}""#))?;
    Ok(shared as f64 / (edges_a + edges_b - shared) as f64)
}

///
/// Sum of the best instance matches of two stored views in both directions
///
/// Only instance pairs sharing at least one edge are joined; instances without any match contribute `0`.
///
fn matching_sum_sql(con: &DatabaseConnection<'_>, i: usize, j: usize) -> Result<f64, DatabaseError> {
    let (a, b) = (view_table(i), view_table(j));
    let (counts_a, counts_b) = (counts_table(i), counts_table(j));
    let sum = con.query_f64(&format!(
        r#"WITH shared AS (
    SELECT va.instance AS ia, vb.instance AS ib, COUNT(*) AS c
    FROM "{a}" AS va JOIN "{b}" AS vb ON va.edge = vb.edge
    GROUP BY va.instance, vb.instance
),
sims AS (
    SELECT s.ia AS ia, s.ib AS ib,
        CASE WHEN ca.edge_count + cb.edge_count - s.c > 0
            THEN CAST(s.c AS DOUBLE) / (ca.edge_count + cb.edge_count - s.c)
            ELSE 0.0 END AS sim
    FROM shared AS s
    JOIN "{counts_a}" AS ca ON ca.instance = s.ia
    JOIN "{counts_b}" AS cb ON cb.instance = s.ib
),
row_max AS (SELECT MAX(sim) AS m FROM sims GROUP BY ia),
col_max AS (SELECT MAX(sim) AS m FROM sims GROUP BY ib)
SELECT COALESCE((SELECT SUM(m) FROM row_max), 0.0) + COALESCE((SELECT SUM(m) FROM col_max), 0.0)"#
    ))?;
    Ok(sum.unwrap_or(0.0))
}

impl PairwiseScorer for DatabaseScorer {
    type Error = DatabaseError;

    fn num_views(&self) -> usize {
        self.views.len()
    }

    /// Precompute and commit the per-instance edge counts needed by the matching similarity
    fn prepare(&self) -> Result<(), DatabaseError> {
        if self.measure == SimilarityMeasure::Matching {
            let con = self
                .backend
                .open_with_options(&self.path, false, &self.options)?;
            precompute_counts(&con, self.views.len(), self.options.reuse_counts)?;
        }
        Ok(())
    }

    fn score_pair(&self, i: usize, j: usize) -> Result<f64, DatabaseError> {
        let (view_a, view_b) = (self.view(i)?, self.view(j)?);
        let con = self
            .backend
            .open_with_options(&self.path, true, &self.options)?;
        let con = DatabaseConnection::from(&con);
        match self.measure {
            SimilarityMeasure::Jaccard => jaccard_similarity_sql(&con, i, j),
            SimilarityMeasure::Matching => {
                // Denominator from the metadata, so instances without any shared edge still count
                let total = view_a.num_process_executions + view_b.num_process_executions;
                if total == 0 {
                    return Ok(0.0);
                }
                Ok(matching_sum_sql(&con, i, j)? / total as f64)
            }
        }
    }
}


#[cfg(all(test, feature = "view-duckdb"))]
mod duckdb_tests {
    use super::*;
    use crate::core::view::{RelationIndex, View, ViewCollection};
    use crate::db::store::store_views;
    use crate::scoring::{InMemoryScorer, ScoreMatrix};

    fn views() -> ViewCollection {
        ViewCollection::from_views(vec![
            View::new(
                "orders",
                RelationIndex::from_entries(3, vec![(0u64, vec![0, 1, 2]), (1, vec![0, 2]), (2, vec![1, 2])])
                    .unwrap(),
            ),
            View::new(
                "items",
                RelationIndex::from_entries(3, vec![(0u64, vec![0, 1, 2]), (3, vec![0, 2]), (2, vec![0])])
                    .unwrap(),
            ),
            View::new(
                "packages",
                RelationIndex::from_entries(2, vec![(4u64, vec![0]), (2, vec![1])]).unwrap(),
            ),
        ])
    }

    #[test]
    fn duckdb_scores_match_in_memory_scores() {
        let views = views();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("views.duckdb");
        {
            let con = ::duckdb::Connection::open(&path).unwrap();
            // Storing twice replaces the metadata rows instead of duplicating them
            store_views(&con, &views).unwrap();
            let stored = store_views(&con, &views).unwrap();
            assert_eq!(load_view_meta(&con).unwrap(), stored);
        }
        assert_eq!(DatabaseBackend::from_path(&path), DatabaseBackend::DuckDB);

        let options = DatabaseOptions {
            reuse_counts: true,
            memory_limit: Some("512MB".to_string()),
            threads: Some(2),
        };
        for measure in [SimilarityMeasure::Jaccard, SimilarityMeasure::Matching] {
            let scorer = DatabaseScorer::open_with_options(
                &path,
                DatabaseBackend::DuckDB,
                measure,
                options.clone(),
            )
            .unwrap();
            assert_eq!(scorer.views().len(), 3);
            let from_db = ScoreMatrix::compute(&scorer, 2).unwrap();
            let in_memory = ScoreMatrix::compute(&InMemoryScorer::new(&views, measure), 2).unwrap();
            for i in 0..3 {
                for j in 0..3 {
                    assert!((from_db.score(i, j) - in_memory.score(i, j)).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn duckdb_read_only_connections_reject_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("views.duckdb");
        {
            let con = ::duckdb::Connection::open(&path).unwrap();
            store_views(&con, &views()).unwrap();
        }
        let con = DatabaseBackend::DuckDB.open(&path, true).unwrap();
        let con = DatabaseConnection::from(&con);
        assert_eq!(load_view_meta(con).unwrap().len(), 3);
        assert!(con
            .execute_no_params(r#"DROP TABLE IF EXISTS "view_0""#)
            .is_err());
    }
}
