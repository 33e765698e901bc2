//! Lifecycle controller scenarios.
//!
//! Most tests run on a paused clock with scripted probes, so budgets of
//! several seconds complete instantly.

use std::path::PathBuf;
use std::time::Duration;

use pki_server::lifecycle::{
    HttpProbe, LifecycleController, LifecycleError, ProbeOutcome, ServerState, WaitOptions, WebappState,
};
use tempfile::TempDir;
use tokio::time::Instant;

mod common;

use common::{MemoryDescriptors, RecordingService, ScriptedProbe};

type Controller = LifecycleController<RecordingService, ScriptedProbe, MemoryDescriptors>;

struct Fixture {
    _dir: TempDir,
    service: RecordingService,
    probe: ScriptedProbe,
    descriptors: MemoryDescriptors,
    controller: Controller,
}

fn fixture(probe: ScriptedProbe, https_port: Option<u16>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let server_xml: PathBuf = dir.path().join("conf").join("server.xml");
    common::write_server_xml(&server_xml, 8080, https_port);

    let service = RecordingService::default();
    let descriptors = MemoryDescriptors::default();
    let controller = LifecycleController::new(
        "pki-tomcat",
        "tomcat",
        server_xml,
        service.clone(),
        probe.clone(),
        descriptors.clone(),
    );

    Fixture {
        _dir: dir,
        service,
        probe,
        descriptors,
        controller,
    }
}

fn wait_secs(max_wait: u64) -> WaitOptions {
    WaitOptions::waiting().with_max_wait(Some(Duration::from_secs(max_wait)))
}

#[tokio::test(start_paused = true)]
async fn test_start_times_out_when_always_refused() {
    let mut f = fixture(ScriptedProbe::refused(), None);
    let started = Instant::now();

    let err = f.controller.start(wait_secs(5)).await.unwrap_err();

    match err {
        LifecycleError::Timeout {
            operation,
            instance,
            elapsed_secs,
        } => {
            assert_eq!(operation, "start");
            assert_eq!(instance, "pki-tomcat");
            assert_eq!(elapsed_secs, 5);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(f.probe.count(), 5);
    assert_eq!(f.controller.state(), ServerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_start_404_counts_as_running() {
    let mut f = fixture(ScriptedProbe::always(ProbeOutcome::Responded(404)), None);

    f.controller.start(wait_secs(5)).await.unwrap();

    assert_eq!(f.probe.requests(), vec!["http://localhost:8080/".to_string()]);
    assert_eq!(f.service.calls(), vec!["start tomcat@pki-tomcat".to_string()]);
    assert_eq!(f.controller.state(), ServerState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_start_probes_secure_connector_first() {
    let mut f = fixture(ScriptedProbe::always(ProbeOutcome::Responded(200)), Some(8443));

    f.controller.start(wait_secs(5)).await.unwrap();

    assert_eq!(f.probe.requests(), vec!["https://localhost:8443/".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_start_retries_until_reply() {
    let refused = ProbeOutcome::Transport("connection refused".to_string());
    let probe = ScriptedProbe::new(vec![refused.clone(), refused, ProbeOutcome::Responded(200)]);
    let mut f = fixture(probe, None);
    let started = Instant::now();

    f.controller.start(wait_secs(60)).await.unwrap();

    assert_eq!(f.probe.count(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_start_without_wait_never_probes() {
    let mut f = fixture(ScriptedProbe::refused(), None);

    f.controller.start(WaitOptions::default()).await.unwrap();

    assert_eq!(f.probe.count(), 0);
    assert_eq!(f.service.calls(), vec!["start tomcat@pki-tomcat".to_string()]);
    assert_eq!(f.controller.state(), ServerState::Starting);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_wait_outlasts_default_budget() {
    let mut script = vec![ProbeOutcome::Transport("connection refused".to_string()); 120];
    script.push(ProbeOutcome::Responded(200));
    let mut f = fixture(ScriptedProbe::new(script), None);

    f.controller.start(WaitOptions::waiting().with_max_wait(None)).await.unwrap();

    assert_eq!(f.probe.count(), 121);
}

#[tokio::test(start_paused = true)]
async fn test_tls_failure_aborts_immediately() {
    let reason = "invalid peer certificate: UnknownIssuer";
    let probe = ScriptedProbe::new(vec![
        ProbeOutcome::Transport("connection refused".to_string()),
        ProbeOutcome::Tls(reason.to_string()),
        ProbeOutcome::Responded(200),
    ]);
    let mut f = fixture(probe, Some(8443));
    let started = Instant::now();

    let err = f.controller.start(wait_secs(60)).await.unwrap_err();

    match err {
        LifecycleError::Tls {
            operation, reason: r, ..
        } => {
            assert_eq!(operation, "start");
            assert_eq!(r, reason);
        }
        other => panic!("expected TLS failure, got {other:?}"),
    }
    assert_eq!(f.probe.count(), 2);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_stop_refused_means_stopped() {
    let mut f = fixture(ScriptedProbe::refused(), None);

    f.controller.stop(wait_secs(5)).await.unwrap();

    assert_eq!(f.probe.count(), 1);
    assert_eq!(f.service.calls(), vec!["stop tomcat@pki-tomcat".to_string()]);
    assert_eq!(f.controller.state(), ServerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_polling_while_server_replies() {
    let probe = ScriptedProbe::new(vec![
        ProbeOutcome::Responded(200),
        ProbeOutcome::Responded(404),
        ProbeOutcome::Transport("connection reset".to_string()),
    ]);
    let mut f = fixture(probe, None);

    f.controller.stop(wait_secs(60)).await.unwrap();

    assert_eq!(f.probe.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_times_out_when_server_keeps_replying() {
    let mut f = fixture(ScriptedProbe::always(ProbeOutcome::Responded(200)), None);

    let err = f.controller.stop(wait_secs(3)).await.unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Timeout {
            operation: "stop",
            elapsed_secs: 3,
            ..
        }
    ));
    assert_eq!(f.controller.state(), ServerState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_restart_stops_then_starts() {
    let probe = ScriptedProbe::new(vec![
        ProbeOutcome::Transport("connection refused".to_string()),
        ProbeOutcome::Responded(200),
    ]);
    let mut f = fixture(probe, None);

    f.controller.restart(wait_secs(10)).await.unwrap();

    assert_eq!(
        f.service.calls(),
        vec!["stop tomcat@pki-tomcat".to_string(), "start tomcat@pki-tomcat".to_string()]
    );
    assert_eq!(f.probe.count(), 2);
    assert_eq!(f.controller.state(), ServerState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_restart_waits_for_stop_even_without_wait() {
    let mut f = fixture(ScriptedProbe::refused(), None);

    f.controller.restart(WaitOptions::default()).await.unwrap();

    // One probe for the stop, none for the start.
    assert_eq!(f.probe.count(), 1);
    assert_eq!(f.controller.state(), ServerState::Starting);
}

#[tokio::test(start_paused = true)]
async fn test_missing_connector_fails_before_signal() {
    let dir = tempfile::tempdir().unwrap();
    let server_xml = dir.path().join("server.xml");
    std::fs::write(&server_xml, r#"<Server port="8005"><Service name="Catalina"/></Server>"#).unwrap();

    let service = RecordingService::default();
    let mut controller = LifecycleController::new(
        "pki-tomcat",
        "tomcat",
        &server_xml,
        service.clone(),
        ScriptedProbe::refused(),
        MemoryDescriptors::default(),
    );

    let err = controller.start(WaitOptions::waiting()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidState(_)));
    assert!(service.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deploy_probes_context_path() {
    let mut f = fixture(ScriptedProbe::always(ProbeOutcome::Responded(200)), None);
    let descriptor = br#"<Context docBase="/usr/share/pki/ca/webapps/ca"/>"#;

    f.controller
        .deploy("ROOT", descriptor, None, wait_secs(5))
        .await
        .unwrap();
    f.controller
        .deploy("admin", descriptor, Some("/var/lib/pki/admin"), wait_secs(5))
        .await
        .unwrap();

    assert_eq!(
        f.probe.requests(),
        vec!["http://localhost:8080/".to_string(), "http://localhost:8080/admin".to_string()]
    );
    assert_eq!(f.controller.webapp_state("admin"), WebappState::Present);

    let written = String::from_utf8(f.descriptors.get("admin").unwrap()).unwrap();
    assert!(written.contains(r#"docBase="/var/lib/pki/admin""#));
    let root = String::from_utf8(f.descriptors.get("ROOT").unwrap()).unwrap();
    assert!(root.contains(r#"docBase="/usr/share/pki/ca/webapps/ca""#));
}

#[tokio::test(start_paused = true)]
async fn test_deploy_timeout_leaves_descriptor() {
    let mut f = fixture(ScriptedProbe::refused(), None);

    let err = f
        .controller
        .deploy("pki", b"<Context/>", None, wait_secs(4))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::Timeout {
            operation: "deploy",
            elapsed_secs: 4,
            ..
        }
    ));
    assert!(f.controller.is_deployed("pki"));
    assert_eq!(f.controller.webapp_state("pki"), WebappState::Absent);
}

#[tokio::test(start_paused = true)]
async fn test_undeploy_waits_for_404() {
    let probe = ScriptedProbe::new(vec![ProbeOutcome::Responded(200), ProbeOutcome::Responded(404)]);
    let mut f = fixture(probe, None);
    f.descriptors.files.lock().unwrap().insert("admin".to_string(), b"<Context/>".to_vec());

    f.controller.undeploy("admin", false, wait_secs(10)).await.unwrap();

    assert!(!f.controller.is_deployed("admin"));
    assert_eq!(f.probe.count(), 2);
    assert_eq!(f.probe.requests()[0], "http://localhost:8080/admin");
    assert_eq!(f.controller.webapp_state("admin"), WebappState::Absent);
}

#[tokio::test(start_paused = true)]
async fn test_undeploy_missing_descriptor() {
    let mut f = fixture(ScriptedProbe::refused(), None);

    let err = f
        .controller
        .undeploy("ghost", false, WaitOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { .. }));

    f.controller.undeploy("ghost", true, WaitOptions::default()).await.unwrap();
    assert_eq!(f.probe.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_list_webapps_sorted_with_versions() {
    let f = fixture(ScriptedProbe::refused(), None);
    {
        let mut files = f.descriptors.files.lock().unwrap();
        files.insert("pki##3".to_string(), br#"<Context docBase="/opt/pki"/>"#.to_vec());
        files.insert("ROOT".to_string(), b"<Context/>".to_vec());
    }

    let webapps = f.controller.list_webapps().unwrap();

    assert_eq!(webapps.len(), 2);
    assert_eq!(webapps[0].id, "ROOT");
    assert_eq!(webapps[0].path, "/");
    assert_eq!(webapps[0].doc_base, None);
    assert_eq!(webapps[1].path, "/pki");
    assert_eq!(webapps[1].version.as_deref(), Some("3"));
    assert_eq!(webapps[1].doc_base.as_deref(), Some("/opt/pki"));
}

#[tokio::test(start_paused = true)]
async fn test_status_checks() {
    let probe = ScriptedProbe::new(vec![
        ProbeOutcome::Responded(404),
        ProbeOutcome::Responded(404),
        ProbeOutcome::Responded(200),
        ProbeOutcome::Transport("connection refused".to_string()),
    ]);
    let f = fixture(probe, None);

    assert!(f.controller.is_running(None).await.unwrap());
    assert!(!f.controller.is_available("/ca", None).await.unwrap());
    assert!(f.controller.is_available("/ca", None).await.unwrap());
    assert!(!f.controller.is_running(None).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_service_passthrough() {
    let f = fixture(ScriptedProbe::refused(), None);

    assert!(f.controller.is_active().await.unwrap());
    f.controller.enable().await.unwrap();
    f.controller.disable().await.unwrap();

    assert_eq!(
        f.service.calls(),
        vec![
            "is-active tomcat@pki-tomcat".to_string(),
            "enable tomcat@pki-tomcat".to_string(),
            "disable tomcat@pki-tomcat".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_start_against_live_server() {
    let addr = common::start_mock_server(404).await;
    let dir = tempfile::tempdir().unwrap();
    let server_xml = dir.path().join("server.xml");
    common::write_server_xml(&server_xml, addr.port(), None);

    let mut controller = LifecycleController::new(
        "pki-tomcat",
        "tomcat",
        &server_xml,
        RecordingService::default(),
        HttpProbe::new().unwrap(),
        MemoryDescriptors::default(),
    )
    .with_hostname("127.0.0.1")
    .with_poll_interval(Duration::from_millis(10));

    controller
        .start(WaitOptions::waiting().with_timeout(Some(Duration::from_secs(5))))
        .await
        .unwrap();
    assert_eq!(controller.state(), ServerState::Running);
}

#[tokio::test]
async fn test_stop_against_plaintext_https_port_is_tls_failure() {
    let addr = common::start_plaintext_server().await;
    let dir = tempfile::tempdir().unwrap();
    let server_xml = dir.path().join("server.xml");
    common::write_server_xml(&server_xml, 1, Some(addr.port()));

    let mut controller = LifecycleController::new(
        "pki-tomcat",
        "tomcat",
        &server_xml,
        RecordingService::default(),
        HttpProbe::new().unwrap(),
        MemoryDescriptors::default(),
    )
    .with_hostname("127.0.0.1")
    .with_poll_interval(Duration::from_millis(10));

    let opts = WaitOptions::waiting().with_timeout(Some(Duration::from_secs(5)));

    let err = controller.stop(opts).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Tls { operation: "stop", .. }), "got {err:?}");
    assert_ne!(controller.state(), ServerState::Stopped);

    let err = controller.start(opts).await.unwrap_err();
    assert!(matches!(err, LifecycleError::Tls { operation: "start", .. }), "got {err:?}");
}
