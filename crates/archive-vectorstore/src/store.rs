use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointId, PointStruct, Query, QueryPointsBuilder, Range as QdrantRange, ScrollPointsBuilder,
    SetPayloadPointsBuilder, SparseVectorParamsBuilder, SparseVectorsConfigBuilder,
    UpsertPointsBuilder, Value as QdrantValue, Vector, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info, warn};

use archive_core::error::Result;

use crate::error::from_qdrant;
use crate::payload::{ChunkPayload, ContentType, FilterValue, Predicate, SearchFilter};
use crate::rrf::{fuse, normalize};
use crate::sparse::SparseVector;

const DENSE_VECTOR: &str = "dense";
const SPARSE_VECTOR: &str = "sparse";

/// Adapter over a single Qdrant collection with two named vectors per point
/// (spec §4.4). Mirrors the connection/collection-bootstrap shape of
/// `QdrantMultiStore`, generalized from "one collection per embedding head"
/// to "one collection, two named vectors per point".
pub struct VectorStore {
    client: Qdrant,
    collection: String,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub total: u64,
    pub by_source: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub point_id: u64,
    pub score: f64,
    pub payload: ChunkPayload,
}

impl VectorStore {
    pub async fn connect(url: &str, collection: &str, dense_dim: u64) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(from_qdrant)?;
        let store = Self {
            client,
            collection: collection.to_string(),
        };
        store.ensure_collection(dense_dim).await?;
        Ok(store)
    }

    async fn ensure_collection(&self, dense_dim: u64) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(from_qdrant)?;
        if exists {
            return Ok(());
        }
        info!(collection = %self.collection, "creating vector store collection");
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(
                        VectorParamsBuilder::new(dense_dim, Distance::Cosine),
                    )
                    .sparse_vectors_config(
                        SparseVectorsConfigBuilder::default()
                            .add_sparse_vector_params(SPARSE_VECTOR, SparseVectorParamsBuilder::default()),
                    ),
            )
            .await;
        if let Err(e) = result {
            if e.to_string().contains("already exists") {
                debug!(collection = %self.collection, "collection created concurrently, ignoring");
            } else {
                return Err(from_qdrant(e));
            }
        }
        Ok(())
    }

    /// `point_id` is a deterministic hash of `source_id`, making `Upsert`
    /// idempotent (spec §4.4).
    pub fn point_id_for(source_id: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        source_id.hash(&mut hasher);
        hasher.finish()
    }

    pub async fn upsert(
        &self,
        dense: Vec<f32>,
        sparse: SparseVector,
        payload: ChunkPayload,
    ) -> Result<u64> {
        let point_id = Self::point_id_for(&payload.source_id);
        let payload_map = payload_to_qdrant(&payload);

        let mut vectors = std::collections::HashMap::new();
        vectors.insert(DENSE_VECTOR.to_string(), Vector::from(dense));
        vectors.insert(
            SPARSE_VECTOR.to_string(),
            Vector::new_sparse(sparse.indices, sparse.values),
        );

        let point = PointStruct::new(point_id, vectors, payload_map);
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(from_qdrant)?;
        Ok(point_id)
    }

    /// Dense + sparse search, fused via RRF (spec §4.4). The same `filter`
    /// is applied to both sub-queries before fusion so filter semantics
    /// survive the merge.
    pub async fn search(
        &self,
        dense_query: Vec<f32>,
        sparse_query: SparseVector,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredChunk>> {
        let qfilter = to_qdrant_filter(filter);
        // Over-fetch before fusion so RRF has enough candidates per list.
        let fetch_k = (k * 3).max(k);

        let dense_resp = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection)
                    .query(Query::new_nearest(dense_query))
                    .using(DENSE_VECTOR)
                    .filter(qfilter.clone())
                    .limit(fetch_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(from_qdrant)?;

        let sparse_resp = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection)
                    .query(Query::new_nearest(Vector::new_sparse(
                        sparse_query.indices,
                        sparse_query.values,
                    )))
                    .using(SPARSE_VECTOR)
                    .filter(qfilter)
                    .limit(fetch_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(from_qdrant)?;

        let mut payloads: HashMap<u64, ChunkPayload> = HashMap::new();
        let mut list_of = |points: Vec<qdrant_client::qdrant::ScoredPoint>| -> Vec<u64> {
            let mut ids = Vec::with_capacity(points.len());
            for point in points {
                if let Some(id) = extract_numeric_id(&point.id) {
                    if let Some(payload) = qdrant_to_payload(&point.payload) {
                        payloads.entry(id).or_insert(payload);
                    }
                    ids.push(id);
                }
            }
            ids
        };

        let dense_ids = list_of(dense_resp.result);
        let sparse_ids = list_of(sparse_resp.result);

        let fused = fuse(&[dense_ids, sparse_ids], k);
        Ok(fused
            .into_iter()
            .filter_map(|(id, score)| {
                payloads.remove(&id).map(|payload| ScoredChunk {
                    point_id: id,
                    // Normalized onto 0-1 so it's comparable to a user-facing
                    // `min_score` setting — the raw RRF sum tops out at
                    // `num_lists / 61`, far below any sane 0-1 cutoff.
                    score: normalize(score, 2),
                    payload,
                })
            })
            .collect())
    }

    /// Dedup check (spec §4.5 step 1): does a point with this `source_id`
    /// already exist? `point_id_for` is deterministic, so a direct
    /// point-id lookup is cheaper than a filtered scroll.
    pub async fn exists_source_id(&self, source_id: &str) -> Result<bool> {
        let point_id = Self::point_id_for(source_id);
        let response = self
            .client
            .get_points(qdrant_client::qdrant::GetPointsBuilder::new(
                &self.collection,
                vec![PointId::from(point_id)],
            ))
            .await
            .map_err(from_qdrant)?;
        Ok(!response.result.is_empty())
    }

    /// Bounded batch iteration for migrations (spec §4.4 `Scroll`).
    pub async fn scroll(
        &self,
        offset: Option<u64>,
        filter: Option<&SearchFilter>,
        limit: u32,
    ) -> Result<(Vec<ChunkPayload>, Option<u64>)> {
        let mut builder = ScrollPointsBuilder::new(&self.collection)
            .limit(limit)
            .with_payload(true)
            .with_vectors(false);
        if let Some(f) = filter {
            builder = builder.filter(to_qdrant_filter(f));
        }
        if let Some(off) = offset {
            builder = builder.offset(PointId::from(off));
        }
        let response = self.client.scroll(builder).await.map_err(from_qdrant)?;
        let next_offset = response.next_page_offset.as_ref().and_then(extract_numeric_id);
        let payloads = response
            .result
            .iter()
            .filter_map(|p| qdrant_to_payload(&p.payload))
            .collect();
        Ok((payloads, next_offset))
    }

    /// Atomic partial payload update (spec §4.4 `SetPayload`).
    pub async fn set_payload(
        &self,
        point_ids: &[u64],
        partial: serde_json::Value,
    ) -> Result<()> {
        let payload = json_to_qdrant_map(&partial);
        let ids: Vec<PointId> = point_ids.iter().map(|id| PointId::from(*id)).collect();
        self.client
            .set_payload(
                SetPayloadPointsBuilder::new(&self.collection, payload)
                    .points_selector(ids)
                    .wait(true),
            )
            .await
            .map_err(from_qdrant)?;
        Ok(())
    }

    pub async fn delete_by_filter(&self, filter: &SearchFilter) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(to_qdrant_filter(filter))
                    .wait(true),
            )
            .await
            .map_err(from_qdrant)?;
        Ok(())
    }

    pub async fn delete_by_ids(&self, point_ids: &[u64]) -> Result<()> {
        let ids: Vec<PointId> = point_ids.iter().map(|id| PointId::from(*id)).collect();
        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(ids).wait(true))
            .await
            .map_err(from_qdrant)?;
        Ok(())
    }

    pub async fn collection_stats(&self, known_sources: &[&str]) -> Result<CollectionStats> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(from_qdrant)?;
        let total = info.result.and_then(|r| r.points_count).unwrap_or(0);

        let mut by_source = HashMap::new();
        for source in known_sources {
            let count = self
                .client
                .count(
                    CountPointsBuilder::new(&self.collection)
                        .filter(Filter::must([Condition::matches(
                            "source",
                            source.to_string(),
                        )]))
                        .exact(true),
                )
                .await;
            match count {
                Ok(resp) => {
                    by_source.insert(source.to_string(), resp.result.map(|r| r.count).unwrap_or(0));
                }
                Err(e) => warn!(source = %source, error = %e, "failed to count source partition"),
            }
        }
        Ok(CollectionStats { total, by_source })
    }
}

fn extract_numeric_id(id: &Option<PointId>) -> Option<u64> {
    use qdrant_client::qdrant::point_id::PointIdOptions;
    match id.as_ref()?.point_id_options.as_ref()? {
        PointIdOptions::Num(n) => Some(*n),
        PointIdOptions::Uuid(_) => None,
    }
}

fn to_qdrant_filter(filter: &SearchFilter) -> Filter {
    let mut must = Vec::new();
    let mut must_not = Vec::new();
    for predicate in &filter.0 {
        match predicate_to_condition(predicate) {
            (cond, true) => must_not.push(cond),
            (cond, false) => must.push(cond),
        }
    }
    Filter {
        must,
        must_not,
        ..Default::default()
    }
}

fn predicate_to_condition(predicate: &Predicate) -> (Condition, bool) {
    match predicate {
        Predicate::Eq(field, value) => (Condition::matches(field, filter_value_to_match(value)), false),
        Predicate::In(field, values) => {
            let strings: Vec<String> = values
                .iter()
                .map(|v| match v {
                    FilterValue::Str(s) => s.clone(),
                    FilterValue::Int(i) => i.to_string(),
                    FilterValue::Bool(b) => b.to_string(),
                })
                .collect();
            (Condition::matches(field, strings), false)
        }
        Predicate::Range { field, gte, lte } => {
            let range = QdrantRange {
                gte: gte.map(|v| v as f64),
                lte: lte.map(|v| v as f64),
                ..Default::default()
            };
            (Condition::range(field, range), false)
        }
        Predicate::Not(inner) => {
            let (cond, negated) = predicate_to_condition(inner);
            (cond, !negated)
        }
    }
}

fn filter_value_to_match(value: &FilterValue) -> String {
    match value {
        FilterValue::Str(s) => s.clone(),
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Bool(b) => b.to_string(),
    }
}

fn payload_to_qdrant(payload: &ChunkPayload) -> HashMap<String, QdrantValue> {
    let json = serde_json::to_value(payload).expect("ChunkPayload always serializes");
    json_to_qdrant_map(&json)
}

fn json_to_qdrant_map(value: &serde_json::Value) -> HashMap<String, QdrantValue> {
    let mut map = HashMap::new();
    if let serde_json::Value::Object(obj) = value {
        for (k, v) in obj {
            if !v.is_null() {
                map.insert(k.clone(), json_to_qdrant_value(v));
            }
        }
    }
    map
}

fn json_to_qdrant_value(value: &serde_json::Value) -> QdrantValue {
    match value {
        serde_json::Value::String(s) => s.clone().into(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or(0.0).into()
            }
        }
        serde_json::Value::Bool(b) => (*b).into(),
        serde_json::Value::Array(arr) => {
            let strings: Vec<String> = arr.iter().map(|v| v.to_string()).collect();
            strings.join(",").into()
        }
        _ => String::new().into(),
    }
}

fn qdrant_to_payload(payload: &HashMap<String, QdrantValue>) -> Option<ChunkPayload> {
    let as_str = |k: &str| payload.get(k).and_then(|v| v.as_str()).map(String::from);
    let as_i64 = |k: &str| payload.get(k).and_then(|v| v.as_integer());
    let as_bool = |k: &str| payload.get(k).and_then(|v| v.as_bool()).unwrap_or(false);
    let as_ids = |k: &str| -> Vec<i64> {
        payload
            .get(k)
            .and_then(|v| v.as_str())
            .map(|s| s.split(',').filter_map(|x| x.parse().ok()).collect())
            .unwrap_or_default()
    };

    let content_type = match as_str("content_type")?.as_str() {
        "text" => ContentType::Text,
        "image" => ContentType::Image,
        "voice" => ContentType::Voice,
        "document" => ContentType::Document,
        "call_recording" => ContentType::CallRecording,
        "conversation_chunk" => ContentType::ConversationChunk,
        _ => ContentType::Text,
    };

    Some(ChunkPayload {
        source_id: as_str("source_id")?,
        source: as_str("source")?,
        content_type,
        text: as_str("text").unwrap_or_default(),
        sender: as_str("sender"),
        chat_id: as_str("chat_id"),
        chat_name: as_str("chat_name"),
        is_group: as_bool("is_group"),
        timestamp: as_i64("timestamp").unwrap_or(0),
        language: as_str("language"),
        has_media: as_bool("has_media"),
        media_type: as_str("media_type"),
        media_url: as_str("media_url"),
        media_path: as_str("media_path"),
        chunk_index: as_i64("chunk_index").map(|v| v as u32),
        chunk_total: as_i64("chunk_total").map(|v| v as u32),
        asset_id: as_str("asset_id").unwrap_or_default(),
        parent_asset_id: as_str("parent_asset_id"),
        thread_id: as_str("thread_id"),
        chunk_group_id: as_str("chunk_group_id"),
        person_ids: as_ids("person_ids"),
        mentioned_person_ids: as_ids("mentioned_person_ids"),
    })
}
