//! Lifecycle orchestrator tests.
//!
//! The orchestrator runs against an in-memory database and fake adapters
//! that append to a shared call log, so tests can assert both what was
//! called and in which order.

#![allow(clippy::unwrap_used)]

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use craftdock_core::Allocator;
use craftdock_core::db::unix_timestamp;

use crate::dns::DnsRegistry;
use crate::identity::IdentityResolver;
use crate::notify::{Notifier, NotifyError};
use crate::provision::{InstanceParams, ProvisionError, Provisioner};
use crate::proxy::{RouteError, RouteRegistry};
use crate::storage::{Database, RequestStatus};

use super::scheduler::process_due;
use super::{
    LifecycleConfig, LifecycleError, Orchestrator, ProvisionJob, RequestDraft,
    spawn_provision_worker,
};

type CallLog = Arc<Mutex<Vec<String>>>;

fn push(log: &CallLog, entry: String) {
    log.lock().unwrap().push(entry);
}

fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct FakeProvisioner {
    log: CallLog,
    fail: bool,
}

#[tonic::async_trait]
impl Provisioner for FakeProvisioner {
    async fn create(
        &self,
        vmid: i64,
        _template: i64,
        _params: &InstanceParams,
    ) -> Result<(), ProvisionError> {
        push(&self.log, format!("create:{vmid}"));
        if self.fail {
            Err(ProvisionError::Api {
                status: 500,
                message: "clone failed".into(),
            })
        } else {
            Ok(())
        }
    }

    async fn destroy(&self, vmid: i64) -> Result<(), ProvisionError> {
        push(&self.log, format!("destroy:{vmid}"));
        if self.fail {
            Err(ProvisionError::Api {
                status: 500,
                message: "destroy failed".into(),
            })
        } else {
            Ok(())
        }
    }
}

struct FakeDns {
    log: CallLog,
    fail: bool,
}

#[tonic::async_trait]
impl DnsRegistry for FakeDns {
    async fn create_subdomain(&self, name: &str) -> bool {
        push(&self.log, format!("dns-add:{name}"));
        !self.fail
    }

    async fn remove_subdomain(&self, name: &str) -> bool {
        push(&self.log, format!("dns-remove:{name}"));
        !self.fail
    }
}

struct FakeRoutes {
    log: CallLog,
    fail: bool,
}

#[tonic::async_trait]
impl RouteRegistry for FakeRoutes {
    async fn add_route(&self, name: &str, addr: &str) -> Result<(), RouteError> {
        push(&self.log, format!("route-add:{name}:{addr}"));
        if self.fail {
            Err(RouteError::Reload("proxy unreachable".into()))
        } else {
            Ok(())
        }
    }

    async fn remove_route(&self, name: &str) -> Result<(), RouteError> {
        push(&self.log, format!("route-remove:{name}"));
        if self.fail {
            Err(RouteError::Reload("proxy unreachable".into()))
        } else {
            Ok(())
        }
    }
}

struct FakeNotifier {
    log: CallLog,
    fail: bool,
}

#[tonic::async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        push(&self.log, format!("mail:{to}:{subject}"));
        if self.fail {
            Err(NotifyError::Send("smtp unreachable".into()))
        } else {
            Ok(())
        }
    }
}

struct FakeResolver {
    log: CallLog,
    identity: String,
}

#[tonic::async_trait]
impl IdentityResolver for FakeResolver {
    async fn resolve(&self, owner_name: &str) -> String {
        push(&self.log, format!("resolve:{owner_name}"));
        self.identity.clone()
    }
}

#[derive(Default)]
struct Failures {
    provisioner: bool,
    dns: bool,
    routes: bool,
    notifier: bool,
}

struct Harness {
    db: Database,
    orchestrator: Orchestrator,
    log: CallLog,
    jobs_rx: mpsc::Receiver<ProvisionJob>,
}

fn config() -> LifecycleConfig {
    LifecycleConfig {
        base_domain: "example.net".to_string(),
        name_prefix: "mc-".to_string(),
        template_id: 129,
        game_port: 25565,
        notify_delay_secs: 90,
        operator_email: "admin@example.net".to_string(),
    }
}

async fn harness(failures: Failures) -> Harness {
    let db = Database::open_in_memory().await.unwrap();
    let log: CallLog = Arc::default();
    let (tx, jobs_rx) = mpsc::channel(8);

    let orchestrator = Orchestrator::new(
        db.clone(),
        Allocator::new(Ipv4Addr::new(10, 0, 10, 0)),
        config(),
        Arc::new(FakeProvisioner {
            log: Arc::clone(&log),
            fail: failures.provisioner,
        }),
        Arc::new(FakeDns {
            log: Arc::clone(&log),
            fail: failures.dns,
        }),
        Arc::new(FakeRoutes {
            log: Arc::clone(&log),
            fail: failures.routes,
        }),
        Arc::new(FakeNotifier {
            log: Arc::clone(&log),
            fail: failures.notifier,
        }),
        Arc::new(FakeResolver {
            log: Arc::clone(&log),
            identity: "a1b2c3d4".to_string(),
        }),
        tx,
    );

    Harness {
        db,
        orchestrator,
        log,
        jobs_rx,
    }
}

fn draft(servername: &str) -> RequestDraft {
    RequestDraft {
        email: "player@example.com".to_string(),
        servername: servername.to_string(),
        seed: "cool seed!".to_string(),
        gamemode: "Survival ".to_string(),
        difficulty: "Hard".to_string(),
        whitelist_enabled: true,
        owner_name: "Steve".to_string(),
    }
}

// === submit ===

#[tokio::test]
async fn submit_stores_a_sanitized_pending_row() {
    let h = harness(Failures::default()).await;

    let row = h.orchestrator.submit(draft("Skyblock!!")).await.unwrap();

    assert_eq!(row.servername, "Skyblock");
    assert_eq!(row.seed, "coolseed");
    assert_eq!(row.status, RequestStatus::Pending.as_str());
    assert!(row.ip.is_none());
    assert!(row.identity_ref.is_none());
    // Gamemode/difficulty are stored as submitted; they are normalized on
    // approval.
    assert_eq!(row.gamemode, "Survival ");
}

#[tokio::test]
async fn submit_notifies_the_operator() {
    let h = harness(Failures::default()).await;
    h.orchestrator.submit(draft("Hub")).await.unwrap();

    assert_eq!(
        entries(&h.log),
        vec!["mail:admin@example.net:New server request".to_string()]
    );
}

#[tokio::test]
async fn submit_rejects_invalid_email_without_side_effects() {
    let h = harness(Failures::default()).await;

    let mut bad = draft("Hub");
    bad.email = "not-an-email".to_string();
    let err = h.orchestrator.submit(bad).await.unwrap_err();

    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(h.db.list_requests(None).await.unwrap().is_empty());
    assert!(entries(&h.log).is_empty());
}

#[tokio::test]
async fn submit_rejects_oversized_servername() {
    let h = harness(Failures::default()).await;

    let err = h
        .orchestrator
        .submit(draft("ThisNameIsWayTooLongForAServer"))
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Validation(_)));
    assert!(h.db.list_requests(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn submit_rejects_names_differing_only_in_case() {
    let h = harness(Failures::default()).await;
    let first = h.orchestrator.submit(draft("Hub")).await.unwrap();

    let err = h.orchestrator.submit(draft("hub")).await.unwrap_err();
    assert!(matches!(err, LifecycleError::NameConflict(ref name) if name == "hub"));

    // The first row is untouched and only its operator mail went out.
    let rows = h.db.list_requests(None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, first.id);
    assert_eq!(rows[0].servername, "Hub");
    assert_eq!(entries(&h.log).len(), 1);
}

// === approve ===

#[tokio::test]
async fn approve_missing_id_makes_no_adapter_calls() {
    let mut h = harness(Failures::default()).await;

    let err = h.orchestrator.approve(9999).await.unwrap_err();

    assert!(matches!(err, LifecycleError::NotFound(9999)));
    assert!(entries(&h.log).is_empty());
    assert!(h.jobs_rx.try_recv().is_err());
}

#[tokio::test]
async fn approve_allocates_persists_and_dispatches() {
    let mut h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Skyblock!!")).await.unwrap();

    let approved = h.orchestrator.approve(row.id).await.unwrap();

    // First row after the seeded sequence floor.
    assert_eq!(approved.id, 201);
    assert_eq!(approved.ip.as_deref(), Some("10.0.10.1"));
    assert_eq!(approved.identity_ref.as_deref(), Some("a1b2c3d4"));
    assert_eq!(approved.gamemode, "survival");
    assert_eq!(approved.difficulty, "hard");
    assert_eq!(approved.seed, "coolseed");
    // The worker is not running in this harness, so the row still shows the
    // dispatched-but-unsettled state.
    assert_eq!(approved.status, RequestStatus::Provisioning.as_str());

    let job = h.jobs_rx.try_recv().unwrap();
    assert_eq!(job.request_id, row.id);
    assert_eq!(job.vmid, row.id);
    assert_eq!(job.template, 129);
    assert_eq!(job.params.instance_name, "mc-Skyblock");
    assert_eq!(job.params.gamemode, "survival");
    assert!(job.params.whitelist_enabled);
    assert_eq!(job.params.identity_ref, "a1b2c3d4");
}

#[tokio::test]
async fn approve_maps_the_fifth_id_to_the_fifth_address() {
    let h = harness(Failures::default()).await;
    for name in ["One", "Two", "Three", "Four"] {
        h.orchestrator.submit(draft(name)).await.unwrap();
    }
    let row = h.orchestrator.submit(draft("Skyblock!!")).await.unwrap();
    assert_eq!(row.id, 205);

    let approved = h.orchestrator.approve(row.id).await.unwrap();
    assert_eq!(approved.ip.as_deref(), Some("10.0.10.5"));
}

#[tokio::test]
async fn approve_registers_dns_and_proxy_route() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Skyblock!!")).await.unwrap();
    h.log.lock().unwrap().clear();

    h.orchestrator.approve(row.id).await.unwrap();

    let log = entries(&h.log);
    assert!(log.contains(&"resolve:Steve".to_string()));
    assert!(log.contains(&"dns-add:mc-Skyblock".to_string()));
    assert!(log.contains(&"route-add:mc-Skyblock:10.0.10.1:25565".to_string()));
}

#[tokio::test]
async fn approve_enqueues_the_deferred_notification() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();

    h.orchestrator.approve(row.id).await.unwrap();

    let now = unix_timestamp();
    // Not due before the configured delay has elapsed.
    assert!(h.db.due_notifications(now + 10).await.unwrap().is_empty());

    let due = h.db.due_notifications(now + 90).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].recipient, "player@example.com");
    assert!(due[0].body.contains("mc-Hub.example.net"));
}

#[tokio::test]
async fn approve_twice_is_an_invalid_state() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();

    h.orchestrator.approve(row.id).await.unwrap();
    let err = h.orchestrator.approve(row.id).await.unwrap_err();

    assert!(matches!(err, LifecycleError::InvalidState { .. }));
}

#[tokio::test]
async fn approve_continues_past_dns_failure() {
    let h = harness(Failures {
        dns: true,
        ..Failures::default()
    })
    .await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();

    let approved = h.orchestrator.approve(row.id).await.unwrap();

    // The route registration and deferred notification still happened.
    assert!(entries(&h.log).contains(&"route-add:mc-Hub:10.0.10.1:25565".to_string()));
    let now = unix_timestamp();
    assert_eq!(h.db.due_notifications(now + 90).await.unwrap().len(), 1);
    // And the failure is visible on the row.
    assert_eq!(approved.last_error.as_deref(), Some("dns registration failed"));
}

// === deny ===

#[tokio::test]
async fn deny_missing_id_makes_no_adapter_calls() {
    let h = harness(Failures::default()).await;

    let err = h.orchestrator.deny(9999).await.unwrap_err();

    assert!(matches!(err, LifecycleError::NotFound(9999)));
    assert!(entries(&h.log).is_empty());
}

#[tokio::test]
async fn deny_notifies_and_deletes() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();
    h.log.lock().unwrap().clear();

    h.orchestrator.deny(row.id).await.unwrap();

    // Only the denial mail: nothing was provisioned, so no compute, DNS, or
    // proxy calls are made.
    assert_eq!(
        entries(&h.log),
        vec!["mail:player@example.com:Server request denied".to_string()]
    );
    assert!(h.db.list_requests(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn deny_after_approval_is_an_invalid_state() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();
    h.orchestrator.approve(row.id).await.unwrap();

    let err = h.orchestrator.deny(row.id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState { .. }));
}

// === decommission ===

#[tokio::test]
async fn decommission_missing_id_makes_no_adapter_calls() {
    let h = harness(Failures::default()).await;

    let err = h.orchestrator.decommission(9999).await.unwrap_err();

    assert!(matches!(err, LifecycleError::NotFound(9999)));
    assert!(entries(&h.log).is_empty());
}

#[tokio::test]
async fn decommission_runs_every_step_in_order() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Skyblock!!")).await.unwrap();
    h.orchestrator.approve(row.id).await.unwrap();
    h.log.lock().unwrap().clear();

    h.orchestrator.decommission(row.id).await.unwrap();

    assert_eq!(
        entries(&h.log),
        vec![
            format!("destroy:{}", row.id),
            "dns-remove:mc-Skyblock".to_string(),
            "route-remove:mc-Skyblock".to_string(),
            "mail:player@example.com:Server deleted".to_string(),
        ]
    );
    assert!(h.db.list_requests(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn decommission_continues_past_adapter_failures() {
    // Every adapter fails; every step must still be attempted and the row
    // still removed.
    let h = harness(Failures {
        provisioner: true,
        dns: true,
        routes: true,
        notifier: true,
    })
    .await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();
    h.log.lock().unwrap().clear();

    h.orchestrator.decommission(row.id).await.unwrap();

    assert_eq!(
        entries(&h.log),
        vec![
            format!("destroy:{}", row.id),
            "dns-remove:mc-Hub".to_string(),
            "route-remove:mc-Hub".to_string(),
            "mail:player@example.com:Server deleted".to_string(),
        ]
    );
    assert!(h.db.list_requests(None).await.unwrap().is_empty());
}

// === list ===

#[tokio::test]
async fn list_pending_excludes_decided_requests() {
    let h = harness(Failures::default()).await;
    let a = h.orchestrator.submit(draft("Alpha")).await.unwrap();
    let b = h.orchestrator.submit(draft("Beta")).await.unwrap();
    h.orchestrator.approve(a.id).await.unwrap();

    let pending = h.orchestrator.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);
}

// === provision worker ===

#[tokio::test]
async fn worker_settles_the_row_to_active_on_success() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();
    h.orchestrator.approve(row.id).await.unwrap();

    let log: CallLog = Arc::default();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, handle) = spawn_provision_worker(
        h.db.clone(),
        Arc::new(FakeProvisioner { log, fail: false }),
        shutdown_rx,
    );

    tx.send(ProvisionJob {
        request_id: row.id,
        vmid: row.id,
        template: 129,
        params: InstanceParams {
            seed: String::new(),
            instance_name: "mc-Hub".to_string(),
            gamemode: "survival".to_string(),
            difficulty: "hard".to_string(),
            whitelist_enabled: false,
            owner_name: "Steve".to_string(),
            identity_ref: "a1b2c3d4".to_string(),
        },
    })
    .await
    .unwrap();

    // Closing the queue lets the worker drain it and exit.
    drop(tx);
    handle.await.unwrap();

    let settled = h.db.get_request(row.id).await.unwrap();
    assert_eq!(settled.status, RequestStatus::Active.as_str());
}

#[tokio::test]
async fn worker_records_provisioning_failure() {
    let h = harness(Failures::default()).await;
    let row = h.orchestrator.submit(draft("Hub")).await.unwrap();
    h.orchestrator.approve(row.id).await.unwrap();

    let log: CallLog = Arc::default();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (tx, handle) = spawn_provision_worker(
        h.db.clone(),
        Arc::new(FakeProvisioner { log, fail: true }),
        shutdown_rx,
    );

    tx.send(ProvisionJob {
        request_id: row.id,
        vmid: row.id,
        template: 129,
        params: InstanceParams {
            seed: String::new(),
            instance_name: "mc-Hub".to_string(),
            gamemode: "survival".to_string(),
            difficulty: "hard".to_string(),
            whitelist_enabled: false,
            owner_name: "Steve".to_string(),
            identity_ref: "a1b2c3d4".to_string(),
        },
    })
    .await
    .unwrap();

    drop(tx);
    handle.await.unwrap();

    let settled = h.db.get_request(row.id).await.unwrap();
    assert_eq!(settled.status, RequestStatus::Failed.as_str());
    assert!(settled.last_error.unwrap().contains("clone failed"));
}

// === notification scheduler ===

#[tokio::test]
async fn due_notifications_are_sent_exactly_once() {
    let db = Database::open_in_memory().await.unwrap();
    let log: CallLog = Arc::default();
    let notifier = FakeNotifier {
        log: Arc::clone(&log),
        fail: false,
    };

    let now = unix_timestamp();
    db.enqueue_notification(201, "player@example.com", "Approved", "live!", now - 1)
        .await
        .unwrap();

    process_due(&db, &notifier).await;
    process_due(&db, &notifier).await;

    assert_eq!(entries(&log).len(), 1);
}

#[tokio::test]
async fn notifications_are_not_sent_before_their_delay() {
    let db = Database::open_in_memory().await.unwrap();
    let log: CallLog = Arc::default();
    let notifier = FakeNotifier {
        log: Arc::clone(&log),
        fail: false,
    };

    let now = unix_timestamp();
    db.enqueue_notification(201, "player@example.com", "Approved", "live!", now + 3600)
        .await
        .unwrap();

    process_due(&db, &notifier).await;

    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn failed_notification_jobs_are_settled_not_retried() {
    let db = Database::open_in_memory().await.unwrap();
    let log: CallLog = Arc::default();
    let notifier = FakeNotifier {
        log: Arc::clone(&log),
        fail: true,
    };

    let now = unix_timestamp();
    db.enqueue_notification(201, "player@example.com", "Approved", "live!", now - 1)
        .await
        .unwrap();

    process_due(&db, &notifier).await;
    process_due(&db, &notifier).await;

    // One attempt, then the job is marked failed and left alone.
    assert_eq!(entries(&log).len(), 1);
    assert!(db.due_notifications(now + 10).await.unwrap().is_empty());
}
