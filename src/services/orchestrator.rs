//! Test plan workflow driver.
//!
//! One worker per plan runs [`Orchestrator::run`]: descriptor resolution,
//! probe images, then one branch per declared platform type. Branches are
//! started in declaration order and wait for their instantiation callback
//! independently. Inbound notifications advance instance records and the
//! last one to bring every instance to a terminal status triggers
//! [`Orchestrator::finalize`], which tears everything down, reports to the
//! planner once and deletes the plan.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{CuratorError, CuratorResult};
use crate::domain::models::{
    normalize_platform_type, Config, DescriptorIdentity, NetworkServiceDescriptor,
    PlannerCallback, Probe, ServiceInstanceRecord, ServicePlatform, TestDescriptor, TestPlan,
    TestPlanSpec, TestPlanStatus, TestStatus,
};
use crate::domain::ports::{
    Catalogue, ExecutionCallback, Executor, ImageProvider, InstantiationAck,
    InstantiationRequest, Planner, PlannerReport, PlatformAdapter,
};
use crate::services::callback_sync::WaitHandle;
use crate::services::parameter_resolver::{self, DescriptorStamp};
use crate::services::platform_selector::PlatformSelector;
use crate::services::test_plan_registry::TestPlanRegistry;

/// `event_actor` sent with every planner report.
pub const EVENT_ACTOR: &str = "Curator";

/// Path placeholder the executor replaces with the test id.
pub const TEST_UUID_PLACEHOLDER: &str = "<test_uuid>";

/// How often a cancel worker checks for branches still being started.
const BRANCH_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// The collaborators a plan is driven through.
#[derive(Clone)]
pub struct Collaborators {
    /// Descriptor lookups
    pub catalogue: Arc<dyn Catalogue>,
    /// Platform listing, instantiation and termination
    pub platform_adapter: Arc<dyn PlatformAdapter>,
    /// Test submission and cancellation
    pub executor: Arc<dyn Executor>,
    /// Receives the final report of each plan
    pub planner: Arc<dyn Planner>,
    /// Probe image pulls and cleanup
    pub images: Arc<dyn ImageProvider>,
}

/// Settings the workflow reads from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Base URL collaborators use to call back into the curator
    pub public_url: String,
    /// Bound on the wait for an instance's `sp-ready` callback
    pub instantiation_timeout: Duration,
    /// Bound on the wait for the executor's cancel acknowledgement
    pub cancel_ack_timeout: Duration,
    /// Planner path used when the plan registered no callback
    pub planner_fallback_path: String,
}

impl OrchestratorSettings {
    /// Read the workflow settings out of the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_url: config.server.public_url.trim_end_matches('/').to_string(),
            instantiation_timeout: config.orchestrator.instantiation_timeout(),
            cancel_ack_timeout: config.orchestrator.cancel_ack_timeout(),
            planner_fallback_path: config.orchestrator.planner_fallback_path.clone(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Why finalize was invoked; decides the aggregate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeMode {
    /// Every instance settled on its own
    Completion,
    /// The plan was cancelled; the aggregate is CANCELLED
    Cancellation,
}

/// Outcome reported by the platform adapter's `sp-ready` callback.
#[derive(Debug, Clone, PartialEq)]
pub enum InstantiationOutcome {
    Ready {
        service_instance_id: String,
        functions: Vec<Value>,
    },
    Failed(String),
}

/// Descriptors and identifiers fixed once a plan leaves STARTING.
#[derive(Debug, Clone)]
struct ResolvedDescriptors {
    network_service: NetworkServiceDescriptor,
    service: DescriptorIdentity,
    test: TestDescriptor,
    nsd_uuid: Option<String>,
    testd_uuid: Option<String>,
    platform_types: Vec<String>,
}

impl ResolvedDescriptors {
    fn instance_name(&self, target: &str) -> String {
        let td_name = self.test.name().unwrap_or("test");
        format!("{td_name}-{}-{target}", self.service.name)
    }
}

/// A branch whose instantiation was accepted and now waits for `sp-ready`.
struct PendingInstance {
    instance_name: String,
    handle: WaitHandle,
}

/// Drives test plans through their lifecycle.
///
/// Shared behind an `Arc` by the HTTP handlers and the spawned plan
/// workers; all plan state lives in the [`TestPlanRegistry`].
pub struct Orchestrator {
    registry: Arc<TestPlanRegistry>,
    selector: PlatformSelector,
    collaborators: Collaborators,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Create an orchestrator over `registry` and the given collaborators.
    pub fn new(
        registry: Arc<TestPlanRegistry>,
        selector: PlatformSelector,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            registry,
            selector,
            collaborators,
            settings,
        }
    }

    /// The registry holding every live plan.
    pub fn registry(&self) -> &Arc<TestPlanRegistry> {
        &self.registry
    }

    /// The platform selector, for its usage counters.
    pub fn selector(&self) -> &PlatformSelector {
        &self.selector
    }

    /// The workflow settings in effect.
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Register a new plan and start its worker. Returns the created snapshot.
    pub async fn submit(self: &Arc<Self>, spec: TestPlanSpec) -> CuratorResult<TestPlan> {
        let id = spec
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let plan = self.registry.create(TestPlan::new(id.clone(), spec)).await?;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.run(&id).await {
                warn!(plan_id = %id, error = %err, "test plan worker stopped early");
            }
        });
        Ok(plan)
    }

    /// Mark a plan CANCELLING and start its cancel worker.
    ///
    /// A plan that is already cancelling or finalizing is left alone.
    pub async fn request_cancel(self: &Arc<Self>, plan_id: &str) -> CuratorResult<TestPlanStatus> {
        let start_worker = self
            .registry
            .mutate(plan_id, |plan| {
                if plan.finalizing || plan.status == TestPlanStatus::Cancelling {
                    false
                } else {
                    plan.status = TestPlanStatus::Cancelling;
                    true
                }
            })
            .await?;

        if start_worker {
            let this = Arc::clone(self);
            let id = plan_id.to_string();
            tokio::spawn(async move {
                if let Err(err) = this.cancel(&id).await {
                    warn!(plan_id = %id, error = %err, "cancel worker stopped early");
                }
            });
        } else {
            debug!(plan_id, "cancel already in progress");
        }
        Ok(TestPlanStatus::Cancelling)
    }

    /// Drive a plan from STARTING until every branch has settled.
    #[instrument(skip_all, fields(plan_id = %plan_id))]
    pub async fn run(&self, plan_id: &str) -> CuratorResult<()> {
        let descriptors = match self.resolve_descriptors(plan_id).await {
            Ok(descriptors) => descriptors,
            Err(err @ CuratorError::PlanNotFound(_)) => return Err(err),
            Err(err) => {
                error!(error = %err, "test plan cannot start");
                self.registry
                    .mutate(plan_id, |plan| {
                        plan.error = Some(err.to_string());
                        plan.status = TestPlanStatus::Error;
                    })
                    .await?;
                self.finalize(plan_id, FinalizeMode::Completion).await?;
                return Ok(());
            }
        };

        let probes = self.pull_probes(&descriptors.test).await;
        let proceed = self
            .registry
            .mutate(plan_id, |plan| {
                plan.probes = probes;
                if plan.status == TestPlanStatus::Starting {
                    plan.status = TestPlanStatus::Instantiating;
                    true
                } else {
                    false
                }
            })
            .await?;
        if !proceed {
            info!("test plan left STARTING before instantiation, stopping");
            return Ok(());
        }

        let descriptors = &descriptors;
        let mut branches = Vec::new();
        for platform_type in &descriptors.platform_types {
            if !self.enter_branch(plan_id).await? {
                info!("test plan is cancelling, not starting further platforms");
                break;
            }
            match self.start_instance(plan_id, platform_type, descriptors).await {
                Ok(Some(pending)) => branches.push(async move {
                    self.complete_instance(plan_id, pending, descriptors).await;
                    self.leave_branch(plan_id).await;
                }),
                Ok(None) => self.leave_branch(plan_id).await,
                Err(err) => {
                    self.leave_branch(plan_id).await;
                    return Err(err);
                }
            }
        }
        info!(waiting = branches.len(), "platform branches started");
        join_all(branches).await;

        self.finalize_if_done(plan_id).await;
        Ok(())
    }

    /// Count a new platform branch unless the plan is being cancelled.
    async fn enter_branch(&self, plan_id: &str) -> CuratorResult<bool> {
        self.registry
            .mutate(plan_id, |plan| {
                if plan.status == TestPlanStatus::Cancelling || plan.finalizing {
                    false
                } else {
                    plan.starting_branches += 1;
                    true
                }
            })
            .await
    }

    async fn leave_branch(&self, plan_id: &str) {
        let _ = self
            .registry
            .mutate(plan_id, |plan| {
                plan.starting_branches = plan.starting_branches.saturating_sub(1);
            })
            .await;
    }

    /// Wait until no branch is between instantiation and submission.
    ///
    /// Bounded by the time a branch may spend waiting for `sp-ready` plus
    /// the cancel acknowledgement window.
    async fn wait_for_branches(&self, plan_id: &str) -> CuratorResult<()> {
        let deadline = tokio::time::Instant::now()
            + self.settings.instantiation_timeout
            + self.settings.cancel_ack_timeout;
        loop {
            let starting = self.registry.get(plan_id).await?.starting_branches;
            if starting == 0 {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(plan_id, starting, "platform branches still starting, cancelling anyway");
                return Ok(());
            }
            tokio::time::sleep(BRANCH_POLL_INTERVAL).await;
        }
    }

    async fn resolve_descriptors(&self, plan_id: &str) -> CuratorResult<ResolvedDescriptors> {
        let plan = self.registry.get(plan_id).await?;
        let catalogue = &self.collaborators.catalogue;

        let (network_service, mut nsd_uuid) = match plan.network_service_descriptor {
            Some(descriptor) => (descriptor, plan.nsd_uuid),
            None => {
                let uuid = plan.nsd_uuid.ok_or_else(|| {
                    CuratorError::Validation("no network service descriptor given".into())
                })?;
                let entry = catalogue.network_service(&uuid).await.map_err(|err| {
                    CuratorError::Catalogue(format!("network service {uuid}: {err}"))
                })?;
                (entry.descriptor, entry.uuid.or(Some(uuid)))
            }
        };

        let (test, mut testd_uuid) = match plan.test_descriptor {
            Some(descriptor) => (descriptor, plan.testd_uuid),
            None => {
                let uuid = plan
                    .testd_uuid
                    .ok_or_else(|| CuratorError::Validation("no test descriptor given".into()))?;
                let entry = catalogue.test_descriptor(&uuid).await.map_err(|err| {
                    CuratorError::Catalogue(format!("test descriptor {uuid}: {err}"))
                })?;
                (entry.descriptor, entry.uuid.or(Some(uuid)))
            }
        };

        let service = network_service.identity()?;
        let platform_types = test.service_platforms()?;
        if platform_types.is_empty() {
            return Err(CuratorError::Validation(
                "test descriptor declares no service platform".into(),
            ));
        }

        // inline descriptors without uuids are looked up by identity for stamping
        if nsd_uuid.is_none() {
            match catalogue.network_service_by_identity(&service).await {
                Ok(entry) => nsd_uuid = entry.uuid,
                Err(err) => warn!(service = %service, error = %err, "network service uuid unknown"),
            }
        }
        if testd_uuid.is_none() {
            if let Ok(identity) = test.identity() {
                match catalogue.test_descriptor_by_identity(&identity).await {
                    Ok(entry) => testd_uuid = entry.uuid,
                    Err(err) => warn!(test = %identity, error = %err, "test descriptor uuid unknown"),
                }
            }
        }

        let resolved = ResolvedDescriptors {
            network_service,
            service,
            test,
            nsd_uuid,
            testd_uuid,
            platform_types,
        };
        let stored = resolved.clone();
        self.registry
            .mutate(plan_id, move |plan| {
                plan.network_service_descriptor = Some(stored.network_service);
                plan.test_descriptor = Some(stored.test);
                plan.nsd_uuid = stored.nsd_uuid;
                plan.testd_uuid = stored.testd_uuid;
            })
            .await?;
        info!(service = %resolved.service, platforms = ?resolved.platform_types, "descriptors resolved");
        Ok(resolved)
    }

    async fn pull_probes(&self, test: &TestDescriptor) -> Vec<Probe> {
        let mut probes = Vec::new();
        for spec in test.setup_probes() {
            match self.collaborators.images.pull(&spec.image).await {
                Ok(id) => {
                    debug!(probe = %spec.name, image = %spec.image, "probe image pulled");
                    probes.push(Probe::pulled(id, spec.name, spec.image));
                }
                Err(err) => {
                    warn!(probe = %spec.name, image = %spec.image, error = %err, "probe image pull failed");
                    probes.push(Probe::failed(spec.name, spec.image, &err.to_string()));
                }
            }
        }
        probes
    }

    async fn pick_platform(&self, platform_type: &str) -> CuratorResult<ServicePlatform> {
        let pool = self
            .collaborators
            .platform_adapter
            .available_platforms(platform_type)
            .await
            .map_err(|err| CuratorError::PlatformUnavailable {
                platform_type: platform_type.to_string(),
                reason: err.to_string(),
            })?;
        self.selector.select(platform_type, &pool)
    }

    /// Append a record, renaming it if the plan already uses the name.
    async fn add_record(&self, plan_id: &str, mut record: ServiceInstanceRecord) -> CuratorResult<String> {
        self.registry
            .mutate(plan_id, move |plan| {
                let base = record.instance_name.clone();
                let mut suffix = 1;
                while plan.instance(&record.instance_name).is_some() {
                    suffix += 1;
                    record.instance_name = format!("{base}-{suffix}");
                }
                let name = record.instance_name.clone();
                plan.service_instances.push(record);
                name
            })
            .await
    }

    async fn fail_instance(&self, plan_id: &str, instance_name: &str, err: &CuratorError) {
        warn!(plan_id, instance = instance_name, error = %err, "service instance failed");
        let reason = err.to_string();
        let result = self
            .registry
            .mutate(plan_id, |plan| {
                if let Some(instance) = plan.instance_mut(instance_name) {
                    if instance.service_instance_id.is_some() {
                        instance.mark_test_failed(reason);
                    } else {
                        instance.mark_instantiation_failed(reason);
                    }
                }
            })
            .await;
        if let Err(err) = result {
            debug!(plan_id, error = %err, "could not record instance failure");
        }
    }

    /// Select a platform and request instantiation for one declared type.
    ///
    /// Branch failures are recorded on the branch's record; only registry
    /// errors (plan gone) are returned.
    async fn start_instance(
        &self,
        plan_id: &str,
        platform_type: &str,
        descriptors: &ResolvedDescriptors,
    ) -> CuratorResult<Option<PendingInstance>> {
        let platform_type = normalize_platform_type(platform_type);

        let platform = match self.pick_platform(&platform_type).await {
            Ok(platform) => platform,
            Err(err) => {
                let record = ServiceInstanceRecord::new(
                    &platform_type,
                    descriptors.instance_name(&platform_type),
                );
                let name = self.add_record(plan_id, record).await?;
                self.fail_instance(plan_id, &name, &err).await;
                return Ok(None);
            }
        };

        let mut record =
            ServiceInstanceRecord::new(&platform_type, descriptors.instance_name(&platform.name));
        record.platform_name = Some(platform.name.clone());
        let instance_name = self.add_record(plan_id, record).await?;

        let sync = self.registry.synchronizer();
        let handle = match sync.register(plan_id, &instance_name) {
            Ok(handle) => handle,
            Err(err) => {
                self.fail_instance(plan_id, &instance_name, &err).await;
                return Ok(None);
            }
        };

        let request = InstantiationRequest {
            platform_name: platform.name.clone(),
            service: descriptors.service.clone(),
            instance_name: instance_name.clone(),
            callback_url: self.sp_ready_url(plan_id, &instance_name),
        };
        info!(
            plan_id,
            instance = %instance_name,
            platform = %platform.name,
            "requesting service instantiation"
        );

        let failure = match self.collaborators.platform_adapter.instantiate(&request).await {
            Ok(InstantiationAck {
                error: None,
                package_id,
            }) => {
                self.registry
                    .mutate(plan_id, |plan| {
                        if let Some(instance) = plan.instance_mut(&instance_name) {
                            instance.package_id = package_id;
                            instance.package_uploaded = true;
                        }
                    })
                    .await?;
                return Ok(Some(PendingInstance {
                    instance_name,
                    handle,
                }));
            }
            Ok(InstantiationAck {
                error: Some(reason),
                ..
            }) => CuratorError::Instantiation(reason),
            Err(err) => CuratorError::instantiation(&err),
        };

        sync.discard(handle);
        self.fail_instance(plan_id, &instance_name, &failure).await;
        Ok(None)
    }

    async fn complete_instance(
        &self,
        plan_id: &str,
        pending: PendingInstance,
        descriptors: &ResolvedDescriptors,
    ) {
        let instance_name = pending.instance_name.clone();
        match self.deploy_and_submit(plan_id, pending, descriptors).await {
            Ok(()) => {}
            Err(err @ (CuratorError::PlanNotFound(_) | CuratorError::WaitAbandoned(_))) => {
                debug!(plan_id, instance = %instance_name, error = %err, "test plan went away");
            }
            Err(err) => self.fail_instance(plan_id, &instance_name, &err).await,
        }
    }

    /// Wait for `sp-ready`, resolve the test descriptor and submit it.
    async fn deploy_and_submit(
        &self,
        plan_id: &str,
        pending: PendingInstance,
        descriptors: &ResolvedDescriptors,
    ) -> CuratorResult<()> {
        let PendingInstance {
            instance_name,
            handle,
        } = pending;
        self.registry
            .synchronizer()
            .wait(handle, self.settings.instantiation_timeout)
            .await?;

        let plan = self.registry.get(plan_id).await?;
        if plan.status == TestPlanStatus::Cancelling {
            debug!(plan_id, instance = %instance_name, "plan is cancelling, not submitting");
            return Ok(());
        }
        let record = plan
            .instance(&instance_name)
            .cloned()
            .ok_or_else(|| CuratorError::NotFound(format!("service instance {instance_name}")))?;
        if record.error.is_some() {
            // recorded by the sp-ready handler
            return Ok(());
        }
        let service_instance_id = record.service_instance_id.clone().ok_or_else(|| {
            CuratorError::Instantiation("adapter reported no service instance id".into())
        })?;

        let stamp = DescriptorStamp {
            test_descriptor_uuid: descriptors.testd_uuid.clone(),
            package_descriptor_uuid: record.package_id.clone(),
            network_service_descriptor_uuid: descriptors.nsd_uuid.clone(),
            service_instance_uuid: Some(service_instance_id),
        };
        let instance = parameter_resolver::resolve(&descriptors.test, &record.functions, &stamp)?;

        let ack = self
            .collaborators
            .executor
            .submit(plan_id, instance.as_value(), &self.execution_callbacks(plan_id))
            .await
            .map_err(|err| CuratorError::execution(&err))?;
        let status = ack
            .status
            .as_deref()
            .and_then(TestStatus::from_str)
            .unwrap_or(TestStatus::Running);
        info!(plan_id, instance = %instance_name, test_id = %ack.test_uuid, %status, "test submitted");

        self.registry
            .mutate(plan_id, |plan| {
                // the executor may report the outcome before its submit ack lands
                let reported = plan.unclaimed_outcomes.remove(&ack.test_uuid);
                if let Some(instance) = plan.instance_mut(&instance_name) {
                    instance.test_id = Some(ack.test_uuid);
                    instance.advance(status);
                    if let Some(outcome) = reported {
                        debug!(instance = %instance_name, %outcome, "test finished before its submission was recorded");
                        instance.advance(outcome);
                    }
                }
                if plan.status == TestPlanStatus::Instantiating {
                    plan.status = TestPlanStatus::Running;
                }
            })
            .await
    }

    /// Cancel every live test of a plan, then finalize as CANCELLED.
    ///
    /// Branches still waiting for `sp-ready` are given their instantiation
    /// window first, so a service deployed meanwhile is torn down by
    /// finalize instead of being reported to a deleted plan.
    #[instrument(skip_all, fields(plan_id = %plan_id))]
    pub async fn cancel(&self, plan_id: &str) -> CuratorResult<TestPlanStatus> {
        self.registry
            .mutate(plan_id, |plan| plan.status = TestPlanStatus::Cancelling)
            .await?;
        self.wait_for_branches(plan_id).await?;
        let plan = self.registry.get(plan_id).await?;

        let mut workers = Vec::new();
        for record in plan
            .service_instances
            .into_iter()
            .filter(|r| r.test_status.is_active())
        {
            if record.test_id.is_some() {
                workers.push(self.cancel_instance(plan_id, record));
            } else {
                self.registry
                    .mutate(plan_id, |plan| {
                        if let Some(instance) = plan.instance_mut(&record.instance_name) {
                            instance.advance(TestStatus::Cancelled);
                        }
                    })
                    .await?;
            }
        }
        info!(cancelling = workers.len(), "cancelling running tests");
        join_all(workers).await;

        self.finalize(plan_id, FinalizeMode::Cancellation).await
    }

    async fn cancel_instance(&self, plan_id: &str, record: ServiceInstanceRecord) {
        let Some(test_id) = record.test_id.as_deref() else {
            return;
        };
        let instance_name = record.instance_name.as_str();
        let sync = self.registry.synchronizer();

        let acknowledged = match sync.register(plan_id, test_id) {
            Ok(handle) => {
                match self
                    .collaborators
                    .executor
                    .cancel(plan_id, test_id, &self.execution_callbacks(plan_id))
                    .await
                {
                    Ok(()) => sync.wait(handle, self.settings.cancel_ack_timeout).await,
                    Err(err) => {
                        sync.discard(handle);
                        Err(CuratorError::execution(&err))
                    }
                }
            }
            Err(err) => Err(err),
        };
        if let Err(err) = acknowledged {
            warn!(plan_id, test_id, error = %err, "test cancellation not acknowledged");
            let reason = err.to_string();
            let _ = self
                .registry
                .mutate(plan_id, |plan| {
                    if let Some(instance) = plan.instance_mut(instance_name) {
                        instance.mark_test_failed(reason);
                    }
                })
                .await;
        }

        let mut terminated = false;
        if let (Some(platform), Some(instance_uuid), false) = (
            record.platform_name.as_deref(),
            record.service_instance_id.as_deref(),
            record.terminated,
        ) {
            match self
                .collaborators
                .platform_adapter
                .terminate(platform, instance_uuid)
                .await
            {
                Ok(()) => terminated = true,
                Err(err) => warn!(
                    plan_id,
                    instance = instance_name,
                    error = %CuratorError::cleanup(&err),
                    "service termination failed"
                ),
            }
        }

        let _ = self
            .registry
            .mutate(plan_id, |plan| {
                if let Some(instance) = plan.instance_mut(instance_name) {
                    instance.terminated |= terminated;
                    instance.advance(TestStatus::Cancelled);
                }
            })
            .await;
    }

    /// Finalize when the plan has settled and is not being cancelled.
    ///
    /// Returns true if this call performed the finalize.
    pub async fn finalize_if_done(&self, plan_id: &str) -> bool {
        let ready = match self.registry.get(plan_id).await {
            Ok(plan) => {
                !plan.finalizing
                    && !matches!(
                        plan.status,
                        TestPlanStatus::Starting | TestPlanStatus::Cancelling
                    )
                    && plan.all_instances_terminal()
            }
            Err(_) => false,
        };
        if !ready {
            return false;
        }
        match self.finalize(plan_id, FinalizeMode::Completion).await {
            Ok(_) => true,
            Err(err) => {
                debug!(plan_id, error = %err, "finalize already handled elsewhere");
                false
            }
        }
    }

    /// Tear down a plan, report to the planner and delete it.
    ///
    /// Runs at most once per plan: a concurrent second call gets
    /// `AlreadyFinalizing`, a later one `PlanNotFound`. Each cleanup step
    /// logs its failure and moves on.
    #[instrument(skip_all, fields(plan_id = %plan_id, ?mode))]
    pub async fn finalize(&self, plan_id: &str, mode: FinalizeMode) -> CuratorResult<TestPlanStatus> {
        let plan = self
            .registry
            .mutate(plan_id, |plan| {
                if plan.finalizing {
                    None
                } else {
                    plan.finalizing = true;
                    Some(plan.clone())
                }
            })
            .await?
            .ok_or_else(|| CuratorError::AlreadyFinalizing(plan_id.to_string()))?;

        self.terminate_instances(&plan).await;
        self.remove_probe_images(&plan.probes).await;

        let plan = self.registry.get(plan_id).await.unwrap_or(plan);
        let status = match mode {
            FinalizeMode::Cancellation => TestPlanStatus::Cancelled,
            FinalizeMode::Completion => plan.completion_status(),
        };
        let report = PlannerReport {
            event_actor: EVENT_ACTOR.to_string(),
            test_plan_uuid: plan.id.clone(),
            status,
            test_results: plan.result_summaries(),
            exception: plan.failure_summary(),
        };

        if let Err(err) = self
            .registry
            .mutate(plan_id, |plan| plan.status = status)
            .await
        {
            warn!(error = %err, "could not record final status");
        }

        let path = self.planner_path(&plan.callbacks, status);
        match self.collaborators.planner.notify(&path, &report).await {
            Ok(()) => info!(%status, path = %path, results = report.test_results.len(), "planner notified"),
            Err(err) => error!(%status, path = %path, error = %err, "planner notification failed"),
        }

        if let Err(err) = self.registry.delete(plan_id).await {
            warn!(error = %err, "test plan already removed");
        }
        Ok(status)
    }

    async fn terminate_instances(&self, plan: &TestPlan) {
        for record in plan.service_instances.iter().filter(|r| r.needs_termination()) {
            let (Some(platform), Some(instance_uuid)) = (
                record.platform_name.as_deref(),
                record.service_instance_id.as_deref(),
            ) else {
                continue;
            };
            match self
                .collaborators
                .platform_adapter
                .terminate(platform, instance_uuid)
                .await
            {
                Ok(()) => {
                    debug!(instance = %record.instance_name, "service instance terminated");
                    let _ = self
                        .registry
                        .mutate(&plan.id, |p| {
                            if let Some(instance) = p.instance_mut(&record.instance_name) {
                                instance.terminated = true;
                            }
                        })
                        .await;
                }
                Err(err) => warn!(
                    instance = %record.instance_name,
                    error = %CuratorError::cleanup(&err),
                    "service termination failed"
                ),
            }
        }
    }

    async fn remove_probe_images(&self, probes: &[Probe]) {
        let images = &self.collaborators.images;
        for probe in probes.iter().filter(|p| p.is_pulled()) {
            if let Err(err) = images.remove(&probe.image).await {
                warn!(image = %probe.image, error = %CuratorError::cleanup(&err), "probe image removal failed");
            }
        }
        if let Err(err) = images.prune().await {
            warn!(error = %CuratorError::cleanup(&err), "resource prune failed");
        }
    }

    /// Planner path for the aggregate status.
    ///
    /// The callback registered for that status wins, then the first one
    /// registered for any status, then the first one; the configured
    /// fallback is used when the planner registered none.
    pub fn planner_path(&self, callbacks: &[PlannerCallback], status: TestPlanStatus) -> String {
        let usable: Vec<&PlannerCallback> =
            callbacks.iter().filter(|c| !c.url.trim().is_empty()).collect();
        usable
            .iter()
            .find(|c| {
                c.status
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(status.as_str()))
            })
            .or_else(|| usable.iter().find(|c| c.status.is_none()))
            .or_else(|| usable.first())
            .map_or_else(
                || self.settings.planner_fallback_path.clone(),
                |c| c.url.clone(),
            )
    }

    fn plan_url(&self, plan_id: &str) -> String {
        format!(
            "{}/api/v1/test-preparations/{plan_id}",
            self.settings.public_url
        )
    }

    pub fn sp_ready_url(&self, plan_id: &str, instance_name: &str) -> String {
        format!(
            "{}/service-instances/{instance_name}/sp-ready",
            self.plan_url(plan_id)
        )
    }

    pub fn execution_callbacks(&self, plan_id: &str) -> Vec<ExecutionCallback> {
        let base = self.plan_url(plan_id);
        vec![
            ExecutionCallback {
                name: "running".to_string(),
                path: format!("{base}/change"),
            },
            ExecutionCallback {
                name: "cancel".to_string(),
                path: format!("{base}/tests/{TEST_UUID_PLACEHOLDER}/cancel"),
            },
            ExecutionCallback {
                name: "finish".to_string(),
                path: format!("{base}/tests/{TEST_UUID_PLACEHOLDER}/finish"),
            },
        ]
    }

    /// `sp-ready`: record the instantiation outcome and wake the branch.
    pub async fn on_instance_ready(
        &self,
        plan_id: &str,
        instance_name: &str,
        outcome: InstantiationOutcome,
    ) -> CuratorResult<()> {
        let found = self
            .registry
            .mutate(plan_id, |plan| {
                let Some(instance) = plan.instance_mut(instance_name) else {
                    return false;
                };
                match outcome {
                    InstantiationOutcome::Ready {
                        service_instance_id,
                        functions,
                    } => {
                        // a late deployment is still recorded so finalize tears it down
                        let earlier = instance.error.take();
                        instance.mark_deployed(service_instance_id, functions);
                        if earlier.is_some() {
                            instance.test_error = earlier;
                        }
                    }
                    InstantiationOutcome::Failed(reason) => {
                        instance.mark_instantiation_failed(reason);
                    }
                }
                true
            })
            .await?;

        if !found {
            return Err(CuratorError::NotFound(format!(
                "service instance {instance_name}"
            )));
        }
        self.registry.synchronizer().signal(plan_id, instance_name);
        Ok(())
    }

    /// `change`: the executor reports a status move of a running test.
    pub async fn on_test_status_change(
        &self,
        plan_id: &str,
        test_id: &str,
        status: TestStatus,
    ) -> CuratorResult<()> {
        let found = self
            .registry
            .mutate(plan_id, |plan| {
                let Some(instance) = plan.instance_by_test_mut(test_id) else {
                    return false;
                };
                if !instance.advance(status) {
                    debug!(plan_id, test_id, %status, "ignoring status change");
                }
                if status == TestStatus::Running && plan.status == TestPlanStatus::Instantiating {
                    plan.status = TestPlanStatus::Running;
                }
                true
            })
            .await?;
        if !found {
            return Err(CuratorError::NotFound(format!("test {test_id}")));
        }
        if status.is_terminal() {
            self.finalize_if_done(plan_id).await;
        }
        Ok(())
    }

    /// `finish`: keep the result payload and close the instance.
    pub async fn on_test_finished(
        &self,
        plan_id: &str,
        test_id: &str,
        payload: Value,
    ) -> CuratorResult<()> {
        let status = payload_status(&payload)
            .filter(TestStatus::is_terminal)
            .unwrap_or(TestStatus::Completed);
        self.record_test_outcome(plan_id, test_id, payload, status)
            .await
    }

    /// `cancel`: the executor acknowledges a cancellation.
    pub async fn on_test_cancelled(
        &self,
        plan_id: &str,
        test_id: &str,
        payload: Value,
    ) -> CuratorResult<()> {
        let status = match payload_status(&payload) {
            Some(TestStatus::Error) => TestStatus::Error,
            _ => TestStatus::Cancelled,
        };
        self.record_test_outcome(plan_id, test_id, payload, status)
            .await
    }

    async fn record_test_outcome(
        &self,
        plan_id: &str,
        test_id: &str,
        mut payload: Value,
        status: TestStatus,
    ) -> CuratorResult<()> {
        if let Some(object) = payload.as_object_mut() {
            object
                .entry("test_uuid")
                .or_insert_with(|| Value::String(test_id.to_string()));
        }
        let known = self
            .registry
            .mutate(plan_id, |plan| {
                plan.test_results.push(payload);
                let known = plan
                    .instance_by_test_mut(test_id)
                    .map(|instance| instance.advance(status))
                    .is_some();
                if !known {
                    plan.unclaimed_outcomes.insert(test_id.to_string(), status);
                }
                known
            })
            .await?;
        if !known {
            warn!(plan_id, test_id, %status, "result for a test no instance has claimed yet");
        }

        let sync = self.registry.synchronizer();
        if sync.is_pending(plan_id, test_id) {
            sync.signal(plan_id, test_id);
        }
        self.finalize_if_done(plan_id).await;
        Ok(())
    }
}

fn payload_status(payload: &Value) -> Option<TestStatus> {
    payload
        .get("status")
        .and_then(Value::as_str)
        .and_then(TestStatus::from_str)
}
