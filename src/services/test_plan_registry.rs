//! In-memory store of live test plans.
//!
//! Every write goes through [`TestPlanRegistry::mutate`], which holds the
//! plan's own lock for the duration of the closure. Readers get snapshot
//! copies. The callback synchronizer lives here too so that deleting a
//! plan also releases its outstanding waits.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::domain::errors::{CuratorError, CuratorResult};
use crate::domain::models::TestPlan;
use crate::services::callback_sync::CallbackSynchronizer;

#[derive(Debug, Default)]
pub struct TestPlanRegistry {
    plans: RwLock<HashMap<String, Arc<Mutex<TestPlan>>>>,
    sync: CallbackSynchronizer,
}

impl TestPlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn synchronizer(&self) -> &CallbackSynchronizer {
        &self.sync
    }

    /// Insert a new plan. An id already in use leaves the registry untouched.
    pub async fn create(&self, plan: TestPlan) -> CuratorResult<TestPlan> {
        let mut plans = self.plans.write().await;
        if plans.contains_key(&plan.id) {
            return Err(CuratorError::AlreadyExists(plan.id));
        }
        let snapshot = plan.clone();
        plans.insert(plan.id.clone(), Arc::new(Mutex::new(plan)));
        info!(plan_id = %snapshot.id, "test plan registered");
        Ok(snapshot)
    }

    async fn entry(&self, id: &str) -> CuratorResult<Arc<Mutex<TestPlan>>> {
        self.plans
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CuratorError::PlanNotFound(id.to_string()))
    }

    /// Snapshot copy of one plan.
    pub async fn get(&self, id: &str) -> CuratorResult<TestPlan> {
        let entry = self.entry(id).await?;
        let plan = entry.lock().await;
        Ok(plan.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.plans.read().await.contains_key(id)
    }

    /// Apply `f` to the plan under its exclusive lock and bump `updated_at`.
    pub async fn mutate<R, F>(&self, id: &str, f: F) -> CuratorResult<R>
    where
        F: FnOnce(&mut TestPlan) -> R + Send,
    {
        let entry = self.entry(id).await?;
        let mut plan = entry.lock().await;
        let out = f(&mut plan);
        plan.touch();
        Ok(out)
    }

    /// Remove a plan, abandoning any wait still registered for it.
    pub async fn delete(&self, id: &str) -> CuratorResult<TestPlan> {
        let entry = self
            .plans
            .write()
            .await
            .remove(id)
            .ok_or_else(|| CuratorError::PlanNotFound(id.to_string()))?;
        let dropped = self.sync.drop_plan(id);
        if dropped > 0 {
            debug!(plan_id = id, dropped, "abandoned outstanding synchronizers");
        }
        let plan = entry.lock().await.clone();
        info!(plan_id = id, status = %plan.status, "test plan removed");
        Ok(plan)
    }

    /// Snapshot of every live plan, oldest first.
    pub async fn list(&self) -> Vec<TestPlan> {
        let entries: Vec<Arc<Mutex<TestPlan>>> =
            self.plans.read().await.values().cloned().collect();
        let mut plans = Vec::with_capacity(entries.len());
        for entry in entries {
            plans.push(entry.lock().await.clone());
        }
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        plans
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }
}
