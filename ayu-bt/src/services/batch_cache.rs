//! Read-through batch cache
//!
//! Readers go through the cache; every mutating call invalidates the batch's
//! entry after it commits, so a reader never sees a state older than the last
//! completed write.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::batches;
use crate::models::Batch;

#[derive(Default)]
pub struct BatchCache {
    entries: RwLock<HashMap<Uuid, Batch>>,
    /// Bumped by every invalidation; a load that raced one is not cached
    epoch: AtomicU64,
}

impl BatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached batch, loading it from the store on a miss
    pub async fn get_or_load(&self, db: &SqlitePool, batch_id: Uuid) -> ayu_common::Result<Option<Batch>> {
        if let Some(batch) = self.entries.read().await.get(&batch_id) {
            return Ok(Some(batch.clone()));
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let loaded = batches::load_batch(db, batch_id).await?;
        if let Some(batch) = &loaded {
            let mut entries = self.entries.write().await;
            if self.epoch.load(Ordering::Acquire) == epoch {
                entries.insert(batch_id, batch.clone());
            }
        }
        Ok(loaded)
    }

    pub async fn invalidate(&self, batch_id: Uuid) {
        let mut entries = self.entries.write().await;
        self.epoch.fetch_add(1, Ordering::AcqRel);
        entries.remove(&batch_id);
    }

    #[cfg(test)]
    async fn contains(&self, batch_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::{GeoTag, Species, Stage};
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_miss_loads_and_invalidate_forces_reload() {
        let pool = test_pool().await;
        let now = Utc::now();
        let batch = Batch {
            batch_id: Uuid::new_v4(),
            farmer_id: "F-1".to_string(),
            farmer_name: None,
            species: Species::Amla,
            visit_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            geotag: GeoTag::new(1.0, 2.0).unwrap(),
            estimated_quantity: None,
            current_stage: Stage::Plantation,
            completed_stages: BTreeSet::new(),
            locked: false,
            final_details: None,
            created_by: "C-1".to_string(),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        batches::insert_batch(&pool, &batch).await.unwrap();

        let cache = BatchCache::new();
        assert!(cache.get_or_load(&pool, Uuid::new_v4()).await.unwrap().is_none());

        let first = cache.get_or_load(&pool, batch.batch_id).await.unwrap().unwrap();
        assert_eq!(first.current_stage, Stage::Plantation);
        assert!(cache.contains(batch.batch_id).await);

        let mut next = batch.clone();
        next.current_stage = Stage::Growth;
        batches::update_batch(&pool, &next).await.unwrap();

        // Stale until invalidated
        let cached = cache.get_or_load(&pool, batch.batch_id).await.unwrap().unwrap();
        assert_eq!(cached.current_stage, Stage::Plantation);

        cache.invalidate(batch.batch_id).await;
        let fresh = cache.get_or_load(&pool, batch.batch_id).await.unwrap().unwrap();
        assert_eq!(fresh.current_stage, Stage::Growth);
        assert_eq!(fresh.version, 1);
    }
}
