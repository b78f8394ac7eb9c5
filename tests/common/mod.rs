//! Common test utilities for integration tests
//!
//! In-memory collaborators that record every call, plus descriptor
//! fixtures and a polling helper for the spawned plan workers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use curator::domain::models::{
    DescriptorIdentity, DescriptorRef, NetworkServiceDescriptor, PlannerCallback,
    SelectionStrategy, ServicePlatform, TestDescriptor, TestPlanSpec,
};
use curator::domain::ports::{
    Catalogue, CatalogueEntry, ClientError, ExecutionAck, ExecutionCallback, Executor,
    ImageProvider, InstantiationAck, InstantiationRequest, Planner, PlannerReport,
    PlatformAdapter,
};
use curator::services::{
    Collaborators, Orchestrator, OrchestratorSettings, PlatformSelector, TestPlanRegistry,
};

pub const NSD_UUID: &str = "nsd-uuid-1";
pub const TESTD_UUID: &str = "testd-uuid-1";

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn nsd() -> Value {
    json!({"vendor": "eu.5gtango", "name": "ns-squid", "version": "0.1"})
}

/// Test descriptor with one probe whose parameter needs the squid address.
pub fn testd(platforms: &[&str]) -> Value {
    json!({
        "vendor": "eu.5gtango",
        "name": "test-http",
        "version": "0.1",
        "service_platforms": platforms,
        "phases": [{
            "id": "setup",
            "steps": [{
                "action": "configure",
                "probes": [{
                    "name": "ab",
                    "image": "sonatanfv/ab:dev",
                    "parameters": [{"key": "IP", "value": "$(squid/endpoint/address)"}]
                }]
            }]
        }]
    })
}

/// Instantiation outputs that satisfy [`testd`]'s placeholder.
pub fn functions() -> Vec<Value> {
    vec![json!({"name": "squid", "endpoint": {"address": "10.0.0.7"}})]
}

pub fn spec(id: &str) -> TestPlanSpec {
    TestPlanSpec {
        id: Some(id.to_string()),
        network_service: DescriptorRef::Catalogue(NSD_UUID.to_string()),
        test: DescriptorRef::Catalogue(TESTD_UUID.to_string()),
        callbacks: vec![
            PlannerCallback {
                event_actor: Some("Curator".into()),
                url: "/test-plans/on-change/completed".into(),
                status: Some("COMPLETED".into()),
            },
            PlannerCallback {
                event_actor: Some("Curator".into()),
                url: "/test-plans/on-change".into(),
                status: None,
            },
        ],
    }
}

pub struct FakeCatalogue {
    pub nsd: Value,
    pub testd: Value,
    pub lookups: Mutex<Vec<String>>,
}

impl FakeCatalogue {
    pub fn new(nsd: Value, testd: Value) -> Self {
        Self {
            nsd,
            testd,
            lookups: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Catalogue for FakeCatalogue {
    async fn network_service(
        &self,
        uuid: &str,
    ) -> Result<CatalogueEntry<NetworkServiceDescriptor>, ClientError> {
        self.lookups.lock().unwrap().push(uuid.to_string());
        if uuid != NSD_UUID {
            return Err(ClientError::NotFound(uuid.to_string()));
        }
        Ok(CatalogueEntry {
            uuid: Some(uuid.to_string()),
            descriptor: NetworkServiceDescriptor::new(self.nsd.clone()),
        })
    }

    async fn test_descriptor(
        &self,
        uuid: &str,
    ) -> Result<CatalogueEntry<TestDescriptor>, ClientError> {
        self.lookups.lock().unwrap().push(uuid.to_string());
        if uuid != TESTD_UUID {
            return Err(ClientError::NotFound(uuid.to_string()));
        }
        Ok(CatalogueEntry {
            uuid: Some(uuid.to_string()),
            descriptor: TestDescriptor::new(self.testd.clone()),
        })
    }

    async fn network_service_by_identity(
        &self,
        _identity: &DescriptorIdentity,
    ) -> Result<CatalogueEntry<NetworkServiceDescriptor>, ClientError> {
        Ok(CatalogueEntry {
            uuid: Some(NSD_UUID.to_string()),
            descriptor: NetworkServiceDescriptor::new(self.nsd.clone()),
        })
    }

    async fn test_descriptor_by_identity(
        &self,
        _identity: &DescriptorIdentity,
    ) -> Result<CatalogueEntry<TestDescriptor>, ClientError> {
        Ok(CatalogueEntry {
            uuid: Some(TESTD_UUID.to_string()),
            descriptor: TestDescriptor::new(self.testd.clone()),
        })
    }
}

/// Platform adapter with one pool per platform type.
#[derive(Default)]
pub struct FakeAdapter {
    pub pools: HashMap<String, Vec<ServicePlatform>>,
    /// Platform types whose instantiation is refused immediately
    pub refuse: HashSet<String>,
    /// When set, `instantiate` records the request and answers once released
    pub hold: Option<Arc<Notify>>,
    pub requests: Mutex<Vec<InstantiationRequest>>,
    pub terminated: Mutex<Vec<(String, String)>>,
}

impl FakeAdapter {
    pub fn with_platforms(platforms: &[(&str, &str)]) -> Self {
        let mut pools: HashMap<String, Vec<ServicePlatform>> = HashMap::new();
        for (platform_type, name) in platforms {
            pools
                .entry(platform_type.to_string())
                .or_default()
                .push(ServicePlatform::new(*name, *platform_type));
        }
        Self {
            pools,
            ..Self::default()
        }
    }

    pub fn refusing(mut self, platform_type: &str) -> Self {
        self.refuse.insert(platform_type.to_string());
        self
    }

    pub fn holding(mut self, gate: Arc<Notify>) -> Self {
        self.hold = Some(gate);
        self
    }

    pub fn requests(&self) -> Vec<InstantiationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<(String, String)> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    async fn available_platforms(
        &self,
        platform_type: &str,
    ) -> Result<Vec<ServicePlatform>, ClientError> {
        Ok(self.pools.get(platform_type).cloned().unwrap_or_default())
    }

    async fn instantiate(
        &self,
        request: &InstantiationRequest,
    ) -> Result<InstantiationAck, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.hold {
            gate.notified().await;
        }
        let refused = self
            .pools
            .iter()
            .filter(|(platform_type, _)| self.refuse.contains(*platform_type))
            .any(|(_, pool)| pool.iter().any(|p| p.name == request.platform_name));
        if refused {
            return Ok(InstantiationAck {
                error: Some("no resources left".into()),
                package_id: None,
            });
        }
        Ok(InstantiationAck {
            error: None,
            package_id: Some("pkg-1".into()),
        })
    }

    async fn terminate(&self, platform_name: &str, instance_uuid: &str) -> Result<(), ClientError> {
        self.terminated
            .lock()
            .unwrap()
            .push((platform_name.to_string(), instance_uuid.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeExecutor {
    next: AtomicUsize,
    /// When set, `submit` records the test and then holds its ack until released
    pub gate: Option<Arc<Notify>>,
    pub submitted: Mutex<Vec<(String, Value, Vec<ExecutionCallback>)>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<(String, Value, Vec<ExecutionCallback>)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn test_ids(&self) -> Vec<String> {
        self.submitted().into_iter().map(|(id, _, _)| id).collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn submit(
        &self,
        _plan_id: &str,
        test: &Value,
        callbacks: &[ExecutionCallback],
    ) -> Result<ExecutionAck, ClientError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let test_uuid = format!("test-{n}");
        self.submitted
            .lock()
            .unwrap()
            .push((test_uuid.clone(), test.clone(), callbacks.to_vec()));
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(ExecutionAck {
            test_uuid,
            status: Some("RUNNING".into()),
        })
    }

    async fn cancel(
        &self,
        _plan_id: &str,
        test_id: &str,
        _callbacks: &[ExecutionCallback],
    ) -> Result<(), ClientError> {
        self.cancelled.lock().unwrap().push(test_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePlanner {
    pub calls: Mutex<Vec<(String, PlannerReport)>>,
}

impl FakePlanner {
    pub fn calls(&self) -> Vec<(String, PlannerReport)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for FakePlanner {
    async fn notify(&self, path: &str, report: &PlannerReport) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), report.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeImages {
    pub pulled: Mutex<Vec<String>>,
    pub removed: Mutex<Vec<String>>,
    pub prunes: AtomicUsize,
}

#[async_trait]
impl ImageProvider for FakeImages {
    async fn pull(&self, image: &str) -> Result<String, ClientError> {
        self.pulled.lock().unwrap().push(image.to_string());
        Ok(format!("sha256:{image}"))
    }

    async fn remove(&self, image: &str) -> Result<(), ClientError> {
        self.removed.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn prune(&self) -> Result<(), ClientError> {
        self.prunes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An orchestrator wired to recording collaborators.
pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub catalogue: Arc<FakeCatalogue>,
    pub adapter: Arc<FakeAdapter>,
    pub executor: Arc<FakeExecutor>,
    pub planner: Arc<FakePlanner>,
    pub images: Arc<FakeImages>,
}

impl Harness {
    pub fn new(testd: Value, adapter: FakeAdapter) -> Self {
        Self::with_settings(testd, adapter, settings(Duration::from_secs(600)))
    }

    pub fn with_settings(testd: Value, adapter: FakeAdapter, settings: OrchestratorSettings) -> Self {
        Self::build(testd, adapter, FakeExecutor::default(), settings)
    }

    pub fn with_executor(testd: Value, adapter: FakeAdapter, executor: FakeExecutor) -> Self {
        Self::build(
            testd,
            adapter,
            executor,
            settings(Duration::from_secs(600)),
        )
    }

    fn build(
        testd: Value,
        adapter: FakeAdapter,
        executor: FakeExecutor,
        settings: OrchestratorSettings,
    ) -> Self {
        let catalogue = Arc::new(FakeCatalogue::new(nsd(), testd));
        let adapter = Arc::new(adapter);
        let executor = Arc::new(executor);
        let planner = Arc::new(FakePlanner::default());
        let images = Arc::new(FakeImages::default());

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(TestPlanRegistry::new()),
            PlatformSelector::new(SelectionStrategy::First, HashMap::new()),
            Collaborators {
                catalogue: catalogue.clone(),
                platform_adapter: adapter.clone(),
                executor: executor.clone(),
                planner: planner.clone(),
                images: images.clone(),
            },
            settings,
        ));

        Self {
            orchestrator,
            catalogue,
            adapter,
            executor,
            planner,
            images,
        }
    }
}

pub fn settings(instantiation_timeout: Duration) -> OrchestratorSettings {
    OrchestratorSettings {
        instantiation_timeout,
        cancel_ack_timeout: Duration::from_secs(5),
        ..OrchestratorSettings::default()
    }
}

/// Poll `check` until it holds; panics after roughly five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
