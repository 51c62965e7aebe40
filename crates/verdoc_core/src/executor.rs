//! Query execution over a collection's snapshot records.

use crate::config::Config;
use crate::error::CoreResult;
use crate::snapshots::SnapshotStore;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use verdoc_codec::{decode_record, fields, Projection, Record, Snapshot};
use verdoc_query::{NormalizedQuery, QueryError, QueryMode};

/// Outcome of a query.
///
/// Find queries fill `results`; count and aggregate queries leave it
/// empty and put their output in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    /// Matching snapshots, in cursor order.
    pub results: Vec<Snapshot>,
    /// Count or pipeline output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

/// Runs normalized queries.
pub struct QueryExecutor<'a> {
    snapshots: &'a SnapshotStore,
    config: &'a Config,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor reading from `snapshots`.
    pub fn new(snapshots: &'a SnapshotStore, config: &'a Config) -> Self {
        Self { snapshots, config }
    }

    /// Executes `query` against every record of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Disallowed`] (as [`crate::CoreError::Query`]) for an
    /// aggregate query when aggregation is disabled, and propagates backend
    /// and decoding failures.
    pub async fn execute(
        &self,
        collection: &str,
        query: &NormalizedQuery,
        projection: Option<&Projection>,
    ) -> CoreResult<QueryOutput> {
        if matches!(query.mode, QueryMode::Aggregate(_)) && !self.config.allow_aggregate_queries {
            return Err(QueryError::disallowed("$aggregate").into());
        }

        let candidates = self.snapshots.records(collection).await?;
        debug!(collection, candidates = candidates.len(), mode = mode_name(&query.mode), "executing query");

        match &query.mode {
            QueryMode::Count => {
                let count = candidates
                    .into_iter()
                    .map(split_metadata)
                    .filter(|(view, _)| query.predicate.matches(view))
                    .count();
                Ok(QueryOutput {
                    results: Vec::new(),
                    extra: Some(Value::from(count)),
                })
            }
            QueryMode::Aggregate(pipeline) => {
                let docs = candidates
                    .into_iter()
                    .map(|record| Value::Object(split_metadata(record).0))
                    .collect();
                Ok(QueryOutput {
                    results: Vec::new(),
                    extra: Some(Value::Array(pipeline.run(docs))),
                })
            }
            QueryMode::Find => {
                let mut matched: Vec<_> = candidates
                    .into_iter()
                    .map(split_metadata)
                    .filter(|(view, _)| query.predicate.matches(view))
                    .collect();
                if !query.plan.sort.is_empty() {
                    matched.sort_by(|(a, _), (b, _)| query.plan.sort.compare(a, b));
                }
                let mut page = query.plan.window(matched);
                if let Some(cap) = self.config.max_query_results {
                    page.truncate(cap);
                }

                let mut results = Vec::with_capacity(page.len());
                for (view, metadata) in page {
                    let snapshot = decode_record(&rejoin_metadata(view, metadata))?;
                    results.push(match projection {
                        Some(projection) => projection.apply(snapshot),
                        None => snapshot,
                    });
                }
                debug!(collection, results = results.len(), "find complete");
                Ok(QueryOutput {
                    results,
                    extra: None,
                })
            }
        }
    }

    /// Evaluates `query`'s filter against a single document.
    ///
    /// Returns the document when it exists and matches. Cursor directives
    /// and the query mode are ignored.
    pub async fn matches_document(
        &self,
        collection: &str,
        id: &str,
        query: &NormalizedQuery,
    ) -> CoreResult<Option<Snapshot>> {
        let Some(record) = self.snapshots.get_record(collection, id).await? else {
            return Ok(None);
        };
        let (view, metadata) = split_metadata(record);
        if !query.predicate.matches(&view) {
            return Ok(None);
        }
        Ok(Some(decode_record(&rejoin_metadata(view, metadata))?))
    }
}

/// Takes metadata out of a record. Filters, sort keys and pipelines only
/// ever see what is left.
fn split_metadata(mut record: Record) -> (Record, Option<Value>) {
    let metadata = record.remove(fields::METADATA);
    (record, metadata)
}

fn rejoin_metadata(mut view: Record, metadata: Option<Value>) -> Record {
    if let Some(metadata) = metadata {
        view.insert(fields::METADATA.to_string(), metadata);
    }
    view
}

fn mode_name(mode: &QueryMode) -> &'static str {
    match mode {
        QueryMode::Find => "find",
        QueryMode::Count => "count",
        QueryMode::Aggregate(_) => "aggregate",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use verdoc_codec::encode_snapshot;
    use verdoc_query::normalize;
    use verdoc_storage::InMemoryStore;

    async fn seeded() -> SnapshotStore {
        let snapshots = SnapshotStore::new(Arc::new(InMemoryStore::new()), "t");
        let docs = [
            ("a", Some("json"), json!({"n": 1, "tag": "x"})),
            ("b", Some("json"), json!({"n": 2, "tag": "y"})),
            ("c", Some("json"), json!({"n": 3, "tag": "x"})),
            ("d", None, json!({})),
        ];
        for (id, doc_type, data) in docs {
            let snapshot = match doc_type {
                Some(t) => Snapshot::new(id, 1, Some(t.to_string()), Some(data)),
                None => Snapshot::tombstone(id, 2),
            };
            snapshots
                .put("docs", id, &encode_snapshot(id, &snapshot, None))
                .await
                .unwrap();
        }
        snapshots
    }

    async fn run(snapshots: &SnapshotStore, config: &Config, query: Value) -> CoreResult<QueryOutput> {
        let query = normalize(&query)?;
        QueryExecutor::new(snapshots, config).execute("docs", &query, None).await
    }

    fn ids(out: &QueryOutput) -> Vec<&str> {
        out.results.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn find_skips_tombstones() {
        let snapshots = seeded().await;
        let out = run(&snapshots, &Config::default(), json!({})).await.unwrap();
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
        assert_eq!(out.extra, None);
    }

    #[tokio::test]
    async fn find_applies_cursor_then_cap() {
        let snapshots = seeded().await;
        let out = run(
            &snapshots,
            &Config::default(),
            json!({"$limit": 2, "$orderby": {"n": -1}}),
        )
        .await
        .unwrap();
        assert_eq!(ids(&out), vec!["c", "b"]);

        let capped = Config::new().max_query_results(Some(1));
        let out = run(&snapshots, &capped, json!({"$orderby": {"n": 1}})).await.unwrap();
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[tokio::test]
    async fn count_mode() {
        let snapshots = seeded().await;
        let out = run(&snapshots, &Config::default(), json!({"$count": true, "tag": "x"}))
            .await
            .unwrap();
        assert!(out.results.is_empty());
        assert_eq!(out.extra, Some(json!(2)));
    }

    #[tokio::test]
    async fn aggregate_sees_tombstones() {
        let snapshots = seeded().await;
        let out = run(
            &snapshots,
            &Config::default(),
            json!({"$aggregate": {"$group": {"_id": null, "docs": {"$sum": 1}}}}),
        )
        .await
        .unwrap();
        assert!(out.results.is_empty());
        // The tombstone is counted too
        assert_eq!(out.extra, Some(json!([{"_id": null, "docs": 4}])));

        let disabled = Config::new().allow_aggregate_queries(false);
        let err = run(&snapshots, &disabled, json!({"$aggregate": []})).await.unwrap_err();
        assert!(err.is_query_error());
    }

    #[tokio::test]
    async fn metadata_is_invisible_to_queries() {
        let snapshots = seeded().await;
        let owned = Snapshot::new("m", 1, Some("json".into()), Some(json!({"n": 9})))
            .with_metadata(json!({"owner": "eve"}));
        snapshots
            .put("docs", "m", &encode_snapshot("m", &owned, None))
            .await
            .unwrap();
        let config = Config::default();

        for filter in [
            json!({"_m.owner": "eve"}),
            json!({"_m": {"$exists": true}}),
            json!({"_m": {"owner": "eve"}}),
        ] {
            let out = run(&snapshots, &config, filter.clone()).await.unwrap();
            assert!(out.results.is_empty(), "{filter} matched");
        }
        let out = run(&snapshots, &config, json!({"$count": 1, "_m.owner": "eve"})).await.unwrap();
        assert_eq!(out.extra, Some(json!(0)));

        let query = normalize(&json!({"_m.owner": "eve"})).unwrap();
        let executor = QueryExecutor::new(&snapshots, &config);
        assert!(executor.matches_document("docs", "m", &query).await.unwrap().is_none());

        // Results still carry their metadata
        let out = run(&snapshots, &config, json!({"n": 9})).await.unwrap();
        assert_eq!(out.results, vec![owned]);
    }

    #[tokio::test]
    async fn projection_and_single_document() {
        let snapshots = seeded().await;
        let config = Config::default();
        let query = normalize(&json!({"tag": "x"})).unwrap();
        let executor = QueryExecutor::new(&snapshots, &config);

        let projection = Projection::new(["n"]);
        let out = executor.execute("docs", &query, Some(&projection)).await.unwrap();
        assert_eq!(out.results[0].data, Some(json!({"n": 1})));

        assert!(executor.matches_document("docs", "a", &query).await.unwrap().is_some());
        assert!(executor.matches_document("docs", "b", &query).await.unwrap().is_none());
        assert!(executor.matches_document("docs", "zz", &query).await.unwrap().is_none());
    }
}
