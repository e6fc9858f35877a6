//! Qdrant vector store backend.
//!
//! Each point carries `{"text": ..., "metadata": {...}}` as payload and is
//! keyed by the numeric record id of the chunk it embeds.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, vectors_config, CreateCollectionBuilder, Distance,
    ListValue, PointId, PointStruct, SearchPointsBuilder, Struct, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use ragline_config::{DistanceMethod, VectorDbConfig};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::retry::{with_retry, RetryPolicy};
use crate::{
    CollectionInfo, Metadata, ProviderError, RetrievedDocument, VectorRecord, VectorStoreProvider,
};

const PROVIDER_NAME: &str = "qdrant";

/// Qdrant-backed implementation of [`VectorStoreProvider`].
pub struct QdrantStore {
    url: String,
    api_key: Option<String>,
    distance: DistanceMethod,
    retry: RetryPolicy,
    client: RwLock<Option<Arc<Qdrant>>>,
}

impl QdrantStore {
    /// Create an unconnected store. No I/O happens until [`connect`].
    ///
    /// [`connect`]: VectorStoreProvider::connect
    pub fn new(config: &VectorDbConfig, retry: RetryPolicy) -> Self {
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            distance: config.distance,
            retry,
            client: RwLock::new(None),
        }
    }

    async fn client(&self) -> Result<Arc<Qdrant>, ProviderError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| ProviderError::NotConnected(PROVIDER_NAME.to_string()))
    }

    fn qdrant_distance(&self) -> Distance {
        match self.distance {
            DistanceMethod::Cosine => Distance::Cosine,
            DistanceMethod::Dot => Distance::Dot,
        }
    }

    async fn existing_dimensions(&self, name: &str) -> Result<usize, ProviderError> {
        Ok(self.collection_info(name).await?.dimensions)
    }
}

/// gRPC status codes Qdrant answers with.
mod grpc_code {
    pub const DEADLINE_EXCEEDED: i32 = 4;
    pub const RESOURCE_EXHAUSTED: i32 = 8;
    pub const UNAVAILABLE: i32 = 14;
    pub const INVALID_ARGUMENT: i32 = 3;
    pub const NOT_FOUND: i32 = 5;
    pub const PERMISSION_DENIED: i32 = 7;
    pub const UNAUTHENTICATED: i32 = 16;
}

fn qdrant_err(e: QdrantError) -> ProviderError {
    match &e {
        QdrantError::ResponseError { status } => {
            classify_status(status.code() as i32, status.message())
        }
        _ => ProviderError::transient(PROVIDER_NAME, e.to_string()),
    }
}

/// Only overload and availability failures are retried; a rejected
/// request (such as a vector of the wrong size) fails at once.
fn classify_status(code: i32, message: &str) -> ProviderError {
    use grpc_code::*;

    let status = match code {
        DEADLINE_EXCEEDED | RESOURCE_EXHAUSTED | UNAVAILABLE => {
            return ProviderError::transient(
                PROVIDER_NAME,
                format!("gRPC status {}: {}", code, message),
            );
        }
        INVALID_ARGUMENT => 400,
        UNAUTHENTICATED => 401,
        PERMISSION_DENIED => 403,
        NOT_FOUND => 404,
        _ => 400,
    };
    ProviderError::Rejected {
        provider: PROVIDER_NAME.to_string(),
        status,
        message: format!("gRPC status {}: {}", code, message),
    }
}

#[async_trait]
impl VectorStoreProvider for QdrantStore {
    async fn connect(&self) -> Result<(), ProviderError> {
        info!("Connecting to Qdrant at {}", self.url);

        let mut builder = Qdrant::from_url(&self.url).skip_compatibility_check();
        if let Some(ref api_key) = self.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to build Qdrant client: {}", e)))?;

        let probe = &client;
        with_retry(&self.retry, PROVIDER_NAME, "health_check", move || async move {
            probe.health_check().await.map_err(qdrant_err)
        })
        .await?;

        *self.client.write().await = Some(Arc::new(client));
        info!("Connected to Qdrant at {}", self.url);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        if self.client.write().await.take().is_some() {
            info!("Disconnected from Qdrant at {}", self.url);
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ProviderError> {
        let client = self.client().await?;
        let client = &client;
        with_retry(&self.retry, PROVIDER_NAME, "collection_exists", move || async move {
            client.collection_exists(name).await.map_err(qdrant_err)
        })
        .await
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        let client = self.client().await?;
        let client = &client;
        let response = with_retry(&self.retry, PROVIDER_NAME, "list_collections", move || async move {
            client.list_collections().await.map_err(qdrant_err)
        })
        .await?;

        Ok(response.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        reset: bool,
    ) -> Result<bool, ProviderError> {
        if reset {
            self.delete_collection(name).await?;
        }

        if self.collection_exists(name).await? {
            let existing = self.existing_dimensions(name).await?;
            if existing != dimensions {
                return Err(ProviderError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: existing,
                    actual: dimensions,
                });
            }
            debug!("Collection {} already exists", name);
            return Ok(false);
        }

        info!("Creating collection: {} with {} dimensions", name, dimensions);

        let client = self.client().await?;
        let client = &client;
        let distance = self.qdrant_distance();
        with_retry(&self.retry, PROVIDER_NAME, "create_collection", move || async move {
            client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(VectorParamsBuilder::new(dimensions as u64, distance)),
                )
                .await
                .map_err(qdrant_err)
        })
        .await?;

        info!("Collection {} created successfully", name);
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, ProviderError> {
        if !self.collection_exists(name).await? {
            return Ok(false);
        }

        info!("Deleting collection: {}", name);
        let client = self.client().await?;
        let client = &client;
        let response = with_retry(&self.retry, PROVIDER_NAME, "delete_collection", move || async move {
            client.delete_collection(name).await.map_err(qdrant_err)
        })
        .await?;

        Ok(response.result)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, ProviderError> {
        if !self.collection_exists(name).await? {
            return Err(ProviderError::CollectionNotFound(name.to_string()));
        }

        let client = self.client().await?;
        let client = &client;
        let response = with_retry(&self.retry, PROVIDER_NAME, "collection_info", move || async move {
            client.collection_info(name).await.map_err(qdrant_err)
        })
        .await?;

        let info = response
            .result
            .ok_or_else(|| ProviderError::invalid_response(PROVIDER_NAME, "Missing collection info"))?;

        let dimensions = info
            .config
            .as_ref()
            .and_then(|c| c.params.as_ref())
            .and_then(|p| p.vectors_config.as_ref())
            .and_then(|v| v.config.as_ref())
            .and_then(|c| match c {
                vectors_config::Config::Params(params) => Some(params.size as usize),
                vectors_config::Config::ParamsMap(_) => None,
            })
            .ok_or_else(|| {
                ProviderError::invalid_response(PROVIDER_NAME, "Collection has no single vector config")
            })?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimensions,
            points_count: info.points_count.unwrap_or(0),
            distance: format!("{:?}", self.distance).to_lowercase(),
        })
    }

    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> Result<bool, ProviderError> {
        if records.is_empty() {
            debug!("No points to upsert");
            return Ok(true);
        }

        debug!("Upserting {} points into {}", records.len(), name);

        let points: Vec<PointStruct> = records
            .into_iter()
            .map(|r| PointStruct::new(r.id, r.vector, record_payload(r.text, r.metadata)))
            .collect();

        let client = self.client().await?;
        let client = &client;
        with_retry(&self.retry, PROVIDER_NAME, "upsert", move || {
            let points = points.clone();
            async move {
                client
                    .upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
                    .await
                    .map_err(qdrant_err)
            }
        })
        .await?;

        Ok(true)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, ProviderError> {
        debug!("Searching {} for {} similar vectors", name, limit);

        let client = self.client().await?;
        let client = &client;
        let response = with_retry(&self.retry, PROVIDER_NAME, "search", move || async move {
            client
                .search_points(
                    SearchPointsBuilder::new(name, vector.to_vec(), limit as u64).with_payload(true),
                )
                .await
                .map_err(qdrant_err)
        })
        .await?;

        let hits: Vec<RetrievedDocument> = response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = numeric_id(p.id)?;
                let (text, metadata) = split_payload(p.payload);
                Some(RetrievedDocument {
                    id,
                    score: p.score,
                    text,
                    metadata,
                })
            })
            .collect();

        debug!("Found {} search hits", hits.len());
        Ok(hits)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

fn numeric_id(id: Option<PointId>) -> Option<u64> {
    match id.and_then(|id| id.point_id_options) {
        Some(PointIdOptions::Num(n)) => Some(n),
        Some(PointIdOptions::Uuid(u)) => {
            warn!("Skipping point with non-numeric id {}", u);
            None
        }
        None => None,
    }
}

/// Build the `{"text", "metadata"}` payload for a point.
fn record_payload(text: String, metadata: Metadata) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    map.insert("text".to_string(), Value::from(text));
    map.insert(
        "metadata".to_string(),
        json_to_qdrant(serde_json::Value::Object(metadata)),
    );
    map
}

/// Inverse of [`record_payload`]; missing fields come back empty.
fn split_payload(mut payload: HashMap<String, Value>) -> (String, Metadata) {
    let text = match payload.remove("text").and_then(|v| v.kind) {
        Some(Kind::StringValue(s)) => s,
        _ => String::new(),
    };
    let metadata = match payload.remove("metadata").map(qdrant_to_json) {
        Some(serde_json::Value::Object(map)) => map,
        _ => Metadata::new(),
    };
    (text, metadata)
}

fn json_to_qdrant(value: serde_json::Value) -> Value {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Kind::StringValue(s),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(json_to_qdrant).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map.into_iter().map(|(k, v)| (k, json_to_qdrant(v))).collect(),
        }),
    };
    Value { kind: Some(kind) }
}

fn qdrant_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(qdrant_to_json).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields.into_iter().map(|(k, v)| (k, qdrant_to_json(v))).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_roundtrip_nested_metadata() {
        let metadata = json!({
            "source": "assets/files/alpha/contract.txt",
            "page": 3,
            "score": 0.5,
            "tags": ["a", "b"],
            "extra": {"reviewed": true, "note": null}
        });
        let Some(metadata) = metadata.as_object().cloned() else {
            panic!("object expected");
        };

        let payload = record_payload("clause text".to_string(), metadata.clone());
        assert!(payload.contains_key("text"));
        assert!(payload.contains_key("metadata"));

        let (text, restored) = split_payload(payload);
        assert_eq!(text, "clause text");
        assert_eq!(restored, metadata);
    }

    #[test]
    fn test_rejected_status_is_not_retried() {
        let err = classify_status(grpc_code::INVALID_ARGUMENT, "Wrong input: Vector dimension error");
        assert!(matches!(err, ProviderError::Rejected { status: 400, .. }));
        assert!(!err.is_retryable());

        let err = classify_status(grpc_code::NOT_FOUND, "Collection missing");
        assert!(matches!(err, ProviderError::Rejected { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unavailable_status_is_retried() {
        for code in [
            grpc_code::UNAVAILABLE,
            grpc_code::DEADLINE_EXCEEDED,
            grpc_code::RESOURCE_EXHAUSTED,
        ] {
            assert!(classify_status(code, "busy").is_retryable());
        }
    }

    #[test]
    fn test_split_payload_with_empty_map() {
        let (text, metadata) = split_payload(HashMap::new());
        assert!(text.is_empty());
        assert!(metadata.is_empty());
    }

    #[test]
    fn test_numeric_id_extraction() {
        assert_eq!(numeric_id(Some(PointId::from(42u64))), Some(42));
        assert_eq!(numeric_id(None), None);
        assert_eq!(numeric_id(Some(PointId::from("not-a-number".to_string()))), None);
    }

    #[tokio::test]
    async fn test_operations_before_connect_fail() {
        let store = QdrantStore::new(&VectorDbConfig::default(), RetryPolicy::default());
        assert!(matches!(
            store.search_by_vector("collection_a", &[0.1], 3).await,
            Err(ProviderError::NotConnected(_))
        ));
        assert!(store.disconnect().await.is_ok());
    }
}
