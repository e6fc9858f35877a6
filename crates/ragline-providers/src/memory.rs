//! In-process vector store.
//!
//! Holds every collection in memory with exact (brute force) scoring. Used
//! for tests and for single-process runs without a Qdrant server.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use ragline_config::DistanceMethod;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    CollectionInfo, Metadata, ProviderError, RetrievedDocument, VectorRecord, VectorStoreProvider,
};

const PROVIDER_NAME: &str = "memory";

struct StoredPoint {
    vector: Vec<f32>,
    text: String,
    metadata: Metadata,
}

struct Collection {
    dimensions: usize,
    /// Keyed by record id; iteration order is the store's native order.
    points: BTreeMap<u64, StoredPoint>,
}

/// Vector store backed by a map of collections.
pub struct MemoryVectorStore {
    distance: DistanceMethod,
    connected: AtomicBool,
    collections: RwLock<HashMap<String, Collection>>,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new(DistanceMethod::Cosine)
    }
}

impl MemoryVectorStore {
    pub fn new(distance: DistanceMethod) -> Self {
        Self {
            distance,
            connected: AtomicBool::new(false),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn ensure_connected(&self) -> Result<(), ProviderError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::NotConnected(PROVIDER_NAME.to_string()))
        }
    }

    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self.distance {
            DistanceMethod::Dot => dot,
            DistanceMethod::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

fn distance_name(distance: DistanceMethod) -> &'static str {
    match distance {
        DistanceMethod::Cosine => "cosine",
        DistanceMethod::Dot => "dot",
    }
}

#[async_trait]
impl VectorStoreProvider for MemoryVectorStore {
    async fn connect(&self) -> Result<(), ProviderError> {
        self.connected.store(true, Ordering::SeqCst);
        debug!("Memory vector store connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("Memory vector store disconnected");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ProviderError> {
        self.ensure_connected()?;
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>, ProviderError> {
        self.ensure_connected()?;
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        reset: bool,
    ) -> Result<bool, ProviderError> {
        self.ensure_connected()?;
        let mut collections = self.collections.write().await;

        if reset && collections.remove(name).is_some() {
            info!("Reset collection {}", name);
        }

        if let Some(existing) = collections.get(name) {
            if existing.dimensions != dimensions {
                return Err(ProviderError::DimensionMismatch {
                    collection: name.to_string(),
                    expected: existing.dimensions,
                    actual: dimensions,
                });
            }
            debug!("Collection {} already exists", name);
            return Ok(false);
        }

        info!("Creating collection: {} with {} dimensions", name, dimensions);
        collections.insert(
            name.to_string(),
            Collection {
                dimensions,
                points: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool, ProviderError> {
        self.ensure_connected()?;
        Ok(self.collections.write().await.remove(name).is_some())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, ProviderError> {
        self.ensure_connected()?;
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| ProviderError::CollectionNotFound(name.to_string()))?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimensions: collection.dimensions,
            points_count: collection.points.len() as u64,
            distance: distance_name(self.distance).to_string(),
        })
    }

    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> Result<bool, ProviderError> {
        self.ensure_connected()?;
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| ProviderError::CollectionNotFound(name.to_string()))?;

        // Validate the whole batch before touching anything.
        if let Some(bad) = records.iter().find(|r| r.vector.len() != collection.dimensions) {
            return Err(ProviderError::DimensionMismatch {
                collection: name.to_string(),
                expected: collection.dimensions,
                actual: bad.vector.len(),
            });
        }

        debug!("Upserting {} points into {}", records.len(), name);
        for record in records {
            collection.points.insert(
                record.id,
                StoredPoint {
                    vector: record.vector,
                    text: record.text,
                    metadata: record.metadata,
                },
            );
        }
        Ok(true)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>, ProviderError> {
        self.ensure_connected()?;
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| ProviderError::CollectionNotFound(name.to_string()))?;

        if vector.len() != collection.dimensions {
            return Err(ProviderError::DimensionMismatch {
                collection: name.to_string(),
                expected: collection.dimensions,
                actual: vector.len(),
            });
        }

        let mut hits: Vec<RetrievedDocument> = collection
            .points
            .iter()
            .map(|(id, point)| RetrievedDocument {
                id: *id,
                score: self.score(vector, &point.vector),
                text: point.text.clone(),
                metadata: point.metadata.clone(),
            })
            .collect();

        // Stable sort keeps id order among equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);

        debug!("Found {} search hits in {}", hits.len(), name);
        Ok(hits)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, vector: Vec<f32>, text: &str) -> VectorRecord {
        VectorRecord {
            id,
            vector,
            text: text.to_string(),
            metadata: Metadata::new(),
        }
    }

    async fn connected_store() -> MemoryVectorStore {
        let store = MemoryVectorStore::default();
        store.connect().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let store = MemoryVectorStore::default();
        assert!(matches!(
            store.create_collection("c", 3, false).await,
            Err(ProviderError::NotConnected(_))
        ));

        store.connect().await.unwrap();
        assert!(store.create_collection("c", 3, false).await.unwrap());

        store.disconnect().await.unwrap();
        assert!(matches!(
            store.collection_exists("c").await,
            Err(ProviderError::NotConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_create_collection_is_idempotent() {
        let store = connected_store().await;
        assert!(store.create_collection("c", 3, false).await.unwrap());
        assert!(!store.create_collection("c", 3, false).await.unwrap());
        assert_eq!(store.list_collections().await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_create_collection_dimension_mismatch() {
        let store = connected_store().await;
        store.create_collection("c", 3, false).await.unwrap();

        let err = store.create_collection("c", 4, false).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::DimensionMismatch {
                expected: 3,
                actual: 4,
                ..
            }
        ));

        // Reset recreates with the new size.
        assert!(store.create_collection("c", 4, true).await.unwrap());
        assert_eq!(store.collection_info("c").await.unwrap().dimensions, 4);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = connected_store().await;
        store.create_collection("c", 2, false).await.unwrap();

        store.upsert("c", vec![record(7, vec![1.0, 0.0], "old")]).await.unwrap();
        store.upsert("c", vec![record(7, vec![0.0, 1.0], "new")]).await.unwrap();

        assert_eq!(store.collection_info("c").await.unwrap().points_count, 1);
        let hits = store.search_by_vector("c", &[0.0, 1.0], 5).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_size_without_partial_write() {
        let store = connected_store().await;
        store.create_collection("c", 2, false).await.unwrap();

        let result = store
            .upsert(
                "c",
                vec![record(1, vec![1.0, 0.0], "ok"), record(2, vec![1.0], "bad")],
            )
            .await;

        assert!(matches!(result, Err(ProviderError::DimensionMismatch { .. })));
        assert_eq!(store.collection_info("c").await.unwrap().points_count, 0);
    }

    #[tokio::test]
    async fn test_search_orders_by_descending_score() {
        let store = connected_store().await;
        store.create_collection("c", 2, false).await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    record(1, vec![0.0, 1.0], "orthogonal"),
                    record(2, vec![1.0, 0.0], "same"),
                    record(3, vec![1.0, 1.0], "diagonal"),
                ],
            )
            .await
            .unwrap();

        let hits = store.search_by_vector("c", &[1.0, 0.0], 10).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["same", "diagonal", "orthogonal"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

        let limited = store.search_by_vector("c", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_search_ties_keep_native_order() {
        let store = connected_store().await;
        store.create_collection("c", 2, false).await.unwrap();
        store
            .upsert(
                "c",
                vec![record(9, vec![1.0, 0.0], "b"), record(4, vec![1.0, 0.0], "a")],
            )
            .await
            .unwrap();

        let hits = store.search_by_vector("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, 4);
        assert_eq!(hits[1].id, 9);
    }

    #[tokio::test]
    async fn test_missing_collection_errors() {
        let store = connected_store().await;
        assert!(matches!(
            store.collection_info("nope").await,
            Err(ProviderError::CollectionNotFound(_))
        ));
        assert!(!store.delete_collection("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_dot_distance() {
        let store = MemoryVectorStore::new(DistanceMethod::Dot);
        store.connect().await.unwrap();
        store.create_collection("c", 2, false).await.unwrap();
        store
            .upsert("c", vec![record(1, vec![2.0, 0.0], "long"), record(2, vec![1.0, 0.0], "short")])
            .await
            .unwrap();

        let hits = store.search_by_vector("c", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].text, "long");
        assert!((hits[0].score - 2.0).abs() < f32::EPSILON);
        assert_eq!(store.collection_info("c").await.unwrap().distance, "dot");
    }
}
