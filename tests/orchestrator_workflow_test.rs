//! End-to-end test plan workflows against in-memory collaborators.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;

use common::{
    eventually, functions, settings, spec, testd, FakeAdapter, FakeExecutor, Harness,
    TESTD_UUID,
};
use curator::domain::models::{DescriptorRef, TestPlanStatus, TestStatus};
use curator::services::{FinalizeMode, InstantiationOutcome};
use curator::CuratorError;

fn two_platforms() -> FakeAdapter {
    FakeAdapter::with_platforms(&[("sonata", "sp-sonata"), ("osm", "sp-osm")])
}

async fn report_ready(h: &Harness, plan_id: &str) {
    for request in h.adapter.requests() {
        h.orchestrator
            .on_instance_ready(
                plan_id,
                &request.instance_name,
                InstantiationOutcome::Ready {
                    service_instance_id: format!("nsi-{}", request.platform_name),
                    functions: functions(),
                },
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_plan_completes_on_every_platform() {
    let h = Harness::new(testd(&["SONATA", "osm"]), two_platforms());
    let plan_id = "plan-complete";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("two instantiation requests", move || async move {
        adapter.requests().len() == 2
    })
    .await;
    let names: Vec<String> = h
        .adapter
        .requests()
        .iter()
        .map(|r| r.instance_name.clone())
        .collect();
    assert_eq!(
        names,
        vec!["test-http-ns-squid-sp-sonata", "test-http-ns-squid-sp-osm"]
    );
    assert!(h.adapter.requests()[0]
        .callback_url
        .ends_with("/api/v1/test-preparations/plan-complete/service-instances/test-http-ns-squid-sp-sonata/sp-ready"));

    report_ready(&h, plan_id).await;
    let executor = &h.executor;
    eventually("two submissions", move || async move {
        executor.submitted().len() == 2
    })
    .await;

    let (_, test, callbacks) = &h.executor.submitted()[0];
    assert_eq!(
        test["phases"][0]["steps"][0]["probes"][0]["parameters"][0]["value"],
        "10.0.0.7"
    );
    assert_eq!(test["test_descriptor_uuid"], TESTD_UUID);
    assert_eq!(test["package_descriptor_uuid"], "pkg-1");
    assert_eq!(callbacks.len(), 3);

    let registry = h.orchestrator.registry();
    eventually("plan running", move || async move {
        registry
            .get(plan_id)
            .await
            .is_ok_and(|plan| plan.status == TestPlanStatus::Running)
    })
    .await;

    for test_id in h.executor.test_ids() {
        h.orchestrator
            .on_test_finished(
                plan_id,
                &test_id,
                json!({"status": "COMPLETED", "results_uuid": format!("res-{test_id}")}),
            )
            .await
            .unwrap();
    }

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (path, report) = h.planner.calls().remove(0);
    assert_eq!(path, "/test-plans/on-change/completed");
    assert_eq!(report.status, TestPlanStatus::Completed);
    assert_eq!(report.event_actor, "Curator");
    assert_eq!(report.test_results.len(), 2);
    assert!(report
        .test_results
        .iter()
        .all(|r| r.results_uuid.as_deref() == Some(&*format!("res-{}", r.test_uuid))));
    assert_eq!(report.exception, None);

    assert_eq!(h.adapter.terminated().len(), 2);
    assert_eq!(
        *h.images.pulled.lock().unwrap(),
        vec!["sonatanfv/ab:dev".to_string()]
    );
    assert_eq!(
        *h.images.removed.lock().unwrap(),
        vec!["sha256:sonatanfv/ab:dev".to_string()]
    );
    assert_eq!(h.images.prunes.load(Ordering::SeqCst), 1);
    assert!(!h.orchestrator.registry().contains(plan_id).await);
}

#[tokio::test]
async fn test_refused_platform_does_not_stop_its_sibling() {
    let h = Harness::new(testd(&["sonata", "osm"]), two_platforms().refusing("osm"));
    let plan_id = "plan-partial";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let registry = h.orchestrator.registry();
    eventually("osm branch failed", move || async move {
        registry.get(plan_id).await.is_ok_and(|plan| {
            plan.service_instances
                .iter()
                .any(|i| i.platform_type == "osm" && i.test_status == TestStatus::Error)
        })
    })
    .await;

    let plan = h.orchestrator.registry().get(plan_id).await.unwrap();
    let osm = plan
        .service_instances
        .iter()
        .find(|i| i.platform_type == "osm")
        .unwrap();
    assert!(osm.error.as_deref().unwrap().contains("no resources left"));
    assert!(osm.service_instance_id.is_none());
    assert!(h.planner.calls().is_empty());

    let sonata = h.adapter.requests()[0].clone();
    h.orchestrator
        .on_instance_ready(
            plan_id,
            &sonata.instance_name,
            InstantiationOutcome::Ready {
                service_instance_id: "nsi-1".into(),
                functions: functions(),
            },
        )
        .await
        .unwrap();

    let executor = &h.executor;
    eventually("sonata submission", move || async move {
        executor.submitted().len() == 1
    })
    .await;
    let test_id = h.executor.test_ids().remove(0);
    h.orchestrator
        .on_test_finished(plan_id, &test_id, json!({"status": "COMPLETED"}))
        .await
        .unwrap();

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (path, report) = h.planner.calls().remove(0);
    assert_eq!(path, "/test-plans/on-change");
    assert_eq!(report.status, TestPlanStatus::Error);
    assert_eq!(report.test_results.len(), 1);
    assert_eq!(report.test_results[0].test_status, TestStatus::Completed);
    assert!(report.exception.unwrap().contains("no resources left"));
    assert_eq!(
        h.adapter.terminated(),
        vec![("sp-sonata".to_string(), "nsi-1".to_string())]
    );
}

#[tokio::test]
async fn test_cancel_stops_running_tests() {
    let h = Harness::new(testd(&["sonata", "osm"]), two_platforms());
    let plan_id = "plan-cancel";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("two instantiation requests", move || async move {
        adapter.requests().len() == 2
    })
    .await;
    report_ready(&h, plan_id).await;
    let executor = &h.executor;
    eventually("two submissions", move || async move {
        executor.submitted().len() == 2
    })
    .await;

    let status = h.orchestrator.request_cancel(plan_id).await.unwrap();
    assert_eq!(status, TestPlanStatus::Cancelling);
    // a second request does not start another worker
    h.orchestrator.request_cancel(plan_id).await.unwrap();

    eventually("executor asked to cancel", move || async move {
        executor.cancelled().len() == 2
    })
    .await;
    assert!(h.planner.calls().is_empty());

    for test_id in h.executor.test_ids() {
        h.orchestrator
            .on_test_cancelled(plan_id, &test_id, json!({}))
            .await
            .unwrap();
    }

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (path, report) = h.planner.calls().remove(0);
    assert_eq!(path, "/test-plans/on-change");
    assert_eq!(report.status, TestPlanStatus::Cancelled);
    assert!(report
        .test_results
        .iter()
        .all(|r| r.test_status == TestStatus::Cancelled));
    assert_eq!(h.adapter.terminated().len(), 2);
    assert!(!h.orchestrator.registry().contains(plan_id).await);
    assert!(h.orchestrator.registry().synchronizer().pending_keys().is_empty());
}

#[tokio::test]
async fn test_result_arriving_before_submit_ack_still_finalizes() {
    let gate = Arc::new(Notify::new());
    let h = Harness::with_executor(
        testd(&["sonata"]),
        FakeAdapter::with_platforms(&[("sonata", "sp-sonata")]),
        FakeExecutor::gated(gate.clone()),
    );
    let plan_id = "plan-early-result";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("instantiation request", move || async move {
        adapter.requests().len() == 1
    })
    .await;
    report_ready(&h, plan_id).await;
    let executor = &h.executor;
    eventually("submission in flight", move || async move {
        executor.submitted().len() == 1
    })
    .await;

    // the executor fails the test before the curator sees the submit ack
    h.orchestrator
        .on_test_finished(
            plan_id,
            "test-1",
            json!({"status": "ERROR", "results_uuid": "res-early"}),
        )
        .await
        .unwrap();
    assert!(h.planner.calls().is_empty());
    gate.notify_one();

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (_, report) = h.planner.calls().remove(0);
    assert_eq!(report.status, TestPlanStatus::Error);
    assert_eq!(report.test_results.len(), 1);
    assert_eq!(report.test_results[0].test_uuid, "test-1");
    assert_eq!(report.test_results[0].test_status, TestStatus::Error);
    assert_eq!(report.test_results[0].results_uuid.as_deref(), Some("res-early"));
    assert_eq!(
        h.adapter.terminated(),
        vec![("sp-sonata".to_string(), "nsi-sp-sonata".to_string())]
    );
    assert!(!h.orchestrator.registry().contains(plan_id).await);
}

#[tokio::test]
async fn test_cancel_while_instantiating_tears_down_late_deployment() {
    let gate = Arc::new(Notify::new());
    let h = Harness::new(
        testd(&["sonata", "osm"]),
        two_platforms().holding(gate.clone()),
    );
    let plan_id = "plan-cancel-early";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("first instantiation request", move || async move {
        adapter.requests().len() == 1
    })
    .await;
    h.orchestrator.request_cancel(plan_id).await.unwrap();
    gate.notify_one();

    // the cancel worker holds the plan open while sp-ready is outstanding
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.planner.calls().is_empty());
    assert!(h.orchestrator.registry().contains(plan_id).await);

    report_ready(&h, plan_id).await;

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (_, report) = h.planner.calls().remove(0);
    assert_eq!(report.status, TestPlanStatus::Cancelled);
    assert!(report.test_results.is_empty());
    assert!(h.executor.submitted().is_empty());
    // no further platform is deployed once the plan is cancelling
    assert_eq!(h.adapter.requests().len(), 1);
    assert_eq!(
        h.adapter.terminated(),
        vec![("sp-sonata".to_string(), "nsi-sp-sonata".to_string())]
    );
    assert!(!h.orchestrator.registry().contains(plan_id).await);
    assert!(h.orchestrator.registry().synchronizer().pending_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_sp_ready_times_out_and_finalizes() {
    let h = Harness::with_settings(
        testd(&["sonata"]),
        FakeAdapter::with_platforms(&[("sonata", "sp-sonata")]),
        settings(Duration::from_secs(30)),
    );
    let plan_id = "plan-timeout";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (_, report) = h.planner.calls().remove(0);
    assert_eq!(report.status, TestPlanStatus::Error);
    assert!(report.test_results.is_empty());
    assert!(report.exception.unwrap().contains("Timed out"));
    assert!(h.adapter.terminated().is_empty());
    assert!(h.executor.submitted().is_empty());
}

#[tokio::test]
async fn test_sp_ready_failure_is_recorded() {
    let h = Harness::new(
        testd(&["sonata"]),
        FakeAdapter::with_platforms(&[("sonata", "sp-sonata")]),
    );
    let plan_id = "plan-sp-failed";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("instantiation request", move || async move {
        adapter.requests().len() == 1
    })
    .await;
    let name = h.adapter.requests()[0].instance_name.clone();
    h.orchestrator
        .on_instance_ready(plan_id, &name, InstantiationOutcome::Failed("vim down".into()))
        .await
        .unwrap();

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (_, report) = h.planner.calls().remove(0);
    assert_eq!(report.status, TestPlanStatus::Error);
    assert!(report.exception.unwrap().contains("vim down"));
    assert!(h.executor.submitted().is_empty());
}

#[tokio::test]
async fn test_unresolved_placeholder_fails_instance_and_tears_down() {
    let h = Harness::new(
        testd(&["sonata"]),
        FakeAdapter::with_platforms(&[("sonata", "sp-sonata")]),
    );
    let plan_id = "plan-unresolved";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("instantiation request", move || async move {
        adapter.requests().len() == 1
    })
    .await;
    let name = h.adapter.requests()[0].instance_name.clone();
    h.orchestrator
        .on_instance_ready(
            plan_id,
            &name,
            InstantiationOutcome::Ready {
                service_instance_id: "nsi-1".into(),
                functions: vec![],
            },
        )
        .await
        .unwrap();

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (_, report) = h.planner.calls().remove(0);
    assert_eq!(report.status, TestPlanStatus::Error);
    assert!(report
        .exception
        .unwrap()
        .contains("$(squid/endpoint/address)"));
    assert!(h.executor.submitted().is_empty());
    assert_eq!(
        h.adapter.terminated(),
        vec![("sp-sonata".to_string(), "nsi-1".to_string())]
    );
}

#[tokio::test]
async fn test_catalogue_miss_reports_error_without_instances() {
    let h = Harness::new(testd(&["sonata"]), two_platforms());
    let mut plan = spec("plan-missing");
    plan.network_service = DescriptorRef::Catalogue("unknown".into());
    h.orchestrator.submit(plan).await.unwrap();

    let planner = &h.planner;
    eventually("planner notified", move || async move {
        planner.calls().len() == 1
    })
    .await;
    let (_, report) = h.planner.calls().remove(0);
    assert_eq!(report.status, TestPlanStatus::Error);
    assert!(report.exception.unwrap().contains("Catalogue lookup failed"));
    assert!(h.adapter.requests().is_empty());
}

#[tokio::test]
async fn test_duplicate_plan_id_is_rejected() {
    let h = Harness::new(testd(&["sonata"]), two_platforms());
    h.orchestrator.submit(spec("plan-dup")).await.unwrap();

    let err = h.orchestrator.submit(spec("plan-dup")).await.unwrap_err();
    assert!(matches!(err, CuratorError::AlreadyExists(ref id) if id == "plan-dup"));
}

#[tokio::test]
async fn test_finalize_happens_once() {
    let h = Harness::new(
        testd(&["sonata"]),
        FakeAdapter::with_platforms(&[("sonata", "sp-sonata")]),
    );
    let plan_id = "plan-once";
    h.orchestrator.submit(spec(plan_id)).await.unwrap();

    let adapter = &h.adapter;
    eventually("instantiation request", move || async move {
        adapter.requests().len() == 1
    })
    .await;
    report_ready(&h, plan_id).await;
    let executor = &h.executor;
    eventually("submission", move || async move {
        executor.submitted().len() == 1
    })
    .await;
    let test_id = h.executor.test_ids().remove(0);

    let orchestrator = &h.orchestrator;
    let (finished, forced) = tokio::join!(
        orchestrator.on_test_finished(plan_id, &test_id, json!({"status": "ERROR"})),
        orchestrator.finalize(plan_id, FinalizeMode::Completion),
    );
    assert!(finished.is_ok() || finished.unwrap_err().is_not_found());
    if let Err(err) = forced {
        assert!(matches!(
            err,
            CuratorError::AlreadyFinalizing(_) | CuratorError::PlanNotFound(_)
        ));
    }

    // late callbacks after finalize find nothing
    let late = h
        .orchestrator
        .on_test_finished(plan_id, &test_id, json!({"status": "COMPLETED"}))
        .await;
    assert!(late.unwrap_err().is_not_found());
    assert_eq!(h.planner.calls().len(), 1);
}
