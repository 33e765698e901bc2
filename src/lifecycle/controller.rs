//! Lifecycle controller.
//!
//! # Responsibilities
//! - Send start/stop signals through the service manager
//! - Turn those signals into observed transitions by polling the
//!   instance's own HTTP(S) connector
//! - Deploy and undeploy web applications through descriptor files
//!
//! # Probe classification
//! ```text
//!                start/deploy   stop          undeploy
//! HTTP reply     ready          keep polling  keep polling (404: ready)
//! transport err  keep polling   ready         ready
//! TLS failure    abort          abort         abort
//! ```
//!
//! # Design Decisions
//! - The endpoint is read from `server.xml` on every operation, secure
//!   connector preferred
//! - Operations take `&mut self`; callers serialize them per instance

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::Instrument;
use url::Url;

use crate::lifecycle::probe::{ProbeOutcome, ReadinessProbe};
use crate::lifecycle::service::{ServiceError, ServiceManager};
use crate::lifecycle::state::{ServerState, WebappState};
use crate::lifecycle::webapp::{probe_path, render_descriptor, DescriptorStore, Webapp};
use crate::observability::{metrics, spans};
use crate::resilience::{poll_until, PollError, PollPolicy, PollStep};
use crate::server_config::{ServerConfig, ServerConfigError};

/// Default wait budget.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Default delay between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{instance}: {operation} did not complete after {elapsed_secs}s")]
    Timeout {
        operation: &'static str,
        instance: String,
        elapsed_secs: u64,
    },

    #[error("{instance}: server unreachable due to SSL error during {operation}: {reason}")]
    Tls {
        operation: &'static str,
        instance: String,
        reason: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Service control failed: {0}")]
    ServiceControl(#[from] ServiceError),

    #[error("Server configuration error: {0}")]
    Config(#[from] ServerConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Wait flag, budget and per-probe timeout of one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub wait: bool,
    /// `None` waits forever.
    pub max_wait: Option<Duration>,
    pub timeout: Option<Duration>,
}

impl WaitOptions {
    /// Wait with the default budget.
    pub fn waiting() -> Self {
        Self {
            wait: true,
            ..Self::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            wait: false,
            max_wait: Some(DEFAULT_MAX_WAIT),
            timeout: None,
        }
    }
}

/// What a transition waits to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// Any HTTP reply.
    Reachable,
    /// No connection.
    Unreachable,
    /// No connection, or 404 for the path.
    Absent,
}

impl Expect {
    fn classify(self, outcome: ProbeOutcome) -> PollStep<()> {
        match (self, outcome) {
            (_, ProbeOutcome::Tls(reason)) => PollStep::Fatal(reason),
            (Expect::Reachable, ProbeOutcome::Responded(_)) => PollStep::Ready(()),
            (Expect::Reachable, ProbeOutcome::Transport(reason)) => PollStep::Pending(reason),
            (Expect::Unreachable | Expect::Absent, ProbeOutcome::Transport(_)) => PollStep::Ready(()),
            (Expect::Absent, ProbeOutcome::Responded(404)) => PollStep::Ready(()),
            (Expect::Unreachable | Expect::Absent, ProbeOutcome::Responded(status)) => {
                PollStep::Pending(format!("HTTP {status}"))
            }
        }
    }
}

/// Drives one instance through start/stop/deploy/undeploy.
#[derive(Debug)]
pub struct LifecycleController<S, P, D> {
    instance: String,
    service_id: String,
    server_xml: PathBuf,
    hostname: String,
    poll_interval: Duration,
    service: S,
    probe: P,
    descriptors: D,
    state: ServerState,
    webapps: BTreeMap<String, WebappState>,
}

impl<S, P, D> LifecycleController<S, P, D>
where
    S: ServiceManager,
    P: ReadinessProbe,
    D: DescriptorStore,
{
    /// Controller for `instance`, managed as service `<instance_type>@<instance>`.
    pub fn new(
        instance: impl Into<String>,
        instance_type: &str,
        server_xml: impl Into<PathBuf>,
        service: S,
        probe: P,
        descriptors: D,
    ) -> Self {
        let instance = instance.into();
        Self {
            service_id: format!("{instance_type}@{instance}"),
            instance,
            server_xml: server_xml.into(),
            hostname: "localhost".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            service,
            probe,
            descriptors,
            state: ServerState::Stopped,
            webapps: BTreeMap::new(),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn server_xml(&self) -> &Path {
        &self.server_xml
    }

    /// Last observed server state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Last observed state of a web application.
    pub fn webapp_state(&self, app_id: &str) -> WebappState {
        self.webapps.get(app_id).copied().unwrap_or_default()
    }

    pub fn descriptors(&self) -> &D {
        &self.descriptors
    }

    pub async fn start(&mut self, opts: WaitOptions) -> LifecycleResult<()> {
        let span = spans::operation_span("start", &self.instance);
        self.start_inner(opts).instrument(span).await
    }

    pub async fn stop(&mut self, opts: WaitOptions) -> LifecycleResult<()> {
        let span = spans::operation_span("stop", &self.instance);
        self.stop_inner(opts).instrument(span).await
    }

    /// Stop and wait, then start with `opts`.
    pub async fn restart(&mut self, opts: WaitOptions) -> LifecycleResult<()> {
        self.stop(WaitOptions { wait: true, ..opts }).await?;
        self.start(opts).await
    }

    /// Install the descriptor of `app_id`, optionally pointing it at `doc_base`.
    pub async fn deploy(
        &mut self,
        app_id: &str,
        descriptor: &[u8],
        doc_base: Option<&str>,
        opts: WaitOptions,
    ) -> LifecycleResult<()> {
        let span = spans::operation_span("deploy", &self.instance);
        self.deploy_inner(app_id, descriptor, doc_base, opts).instrument(span).await
    }

    /// Remove the descriptor of `app_id`. `force` tolerates a missing one.
    pub async fn undeploy(&mut self, app_id: &str, force: bool, opts: WaitOptions) -> LifecycleResult<()> {
        let span = spans::operation_span("undeploy", &self.instance);
        self.undeploy_inner(app_id, force, opts).instrument(span).await
    }

    /// One probe of `/`: any HTTP reply means running.
    pub async fn is_running(&self, timeout: Option<Duration>) -> LifecycleResult<bool> {
        let url = self.endpoint("/")?;
        match self.probe.get(&url, timeout).await {
            ProbeOutcome::Responded(_) => Ok(true),
            ProbeOutcome::Transport(reason) => {
                tracing::debug!(reason = %reason, "Server not reachable");
                Ok(false)
            }
            ProbeOutcome::Tls(reason) => Err(self.tls_error("status", reason)),
        }
    }

    /// One probe of `path`: 404 means the path does not exist.
    pub async fn is_available(&self, path: &str, timeout: Option<Duration>) -> LifecycleResult<bool> {
        let url = self.endpoint(path)?;
        match self.probe.get(&url, timeout).await {
            ProbeOutcome::Responded(404) => Ok(false),
            ProbeOutcome::Responded(status) if status < 400 => Ok(true),
            ProbeOutcome::Responded(status) => {
                Err(LifecycleError::Unreachable(format!("{url} returned HTTP {status}")))
            }
            ProbeOutcome::Transport(reason) => Err(LifecycleError::Unreachable(reason)),
            ProbeOutcome::Tls(reason) => Err(self.tls_error("status", reason)),
        }
    }

    pub fn is_deployed(&self, app_id: &str) -> bool {
        self.descriptors.exists(app_id)
    }

    /// Deployed web applications, sorted by id.
    pub fn list_webapps(&self) -> LifecycleResult<Vec<Webapp>> {
        let mut webapps = Vec::new();
        for id in self.descriptors.list()? {
            let content = self.descriptors.read(&id)?;
            webapps.push(Webapp::from_descriptor(&id, self.descriptors.location(&id), &content)?);
        }
        Ok(webapps)
    }

    pub async fn is_active(&self) -> LifecycleResult<bool> {
        Ok(self.service.is_active(&self.service_id).await?)
    }

    pub async fn enable(&self) -> LifecycleResult<()> {
        tracing::info!(service = %self.service_id, "Enabling service");
        Ok(self.service.enable(&self.service_id).await?)
    }

    pub async fn disable(&self) -> LifecycleResult<()> {
        tracing::info!(service = %self.service_id, "Disabling service");
        Ok(self.service.disable(&self.service_id).await?)
    }

    /// URL of `path` on the instance's preferred connector.
    pub fn endpoint(&self, path: &str) -> LifecycleResult<Url> {
        let config = ServerConfig::load(&self.server_xml)?;

        let (scheme, port) = match config.get_secure_port() {
            Some(port) => ("https", port),
            None => match config.get_unsecure_port() {
                Some(port) => ("http", port),
                None => {
                    return Err(LifecycleError::InvalidState(format!(
                        "{} has no HTTP connector",
                        self.server_xml.display()
                    )))
                }
            },
        };

        let mut url = Url::parse(&format!("{scheme}://{}:{port}/", self.hostname))
            .map_err(|e| LifecycleError::InvalidState(format!("Invalid endpoint port '{port}': {e}")))?;
        url.set_path(path);
        Ok(url)
    }

    async fn start_inner(&mut self, opts: WaitOptions) -> LifecycleResult<()> {
        let started = Instant::now();
        let url = if opts.wait { Some(self.endpoint("/")?) } else { None };

        self.service.start_signal(&self.service_id).await?;
        self.set_state(ServerState::Starting);

        let Some(url) = url else {
            metrics::record_transition("start", "signalled", started.elapsed());
            return Ok(());
        };

        tracing::info!("Waiting for server to start");
        match self.wait_for("start", &url, opts, Expect::Reachable).await {
            Ok(()) => {
                self.set_state(ServerState::Running);
                tracing::info!("Server started");
                metrics::record_transition("start", "ok", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.set_state(ServerState::Stopped);
                metrics::record_transition("start", "failed", started.elapsed());
                Err(e)
            }
        }
    }

    async fn stop_inner(&mut self, opts: WaitOptions) -> LifecycleResult<()> {
        let started = Instant::now();
        let url = if opts.wait { Some(self.endpoint("/")?) } else { None };

        self.service.stop_signal(&self.service_id).await?;
        self.set_state(ServerState::Stopping);

        let Some(url) = url else {
            metrics::record_transition("stop", "signalled", started.elapsed());
            return Ok(());
        };

        tracing::info!("Waiting for server to stop");
        match self.wait_for("stop", &url, opts, Expect::Unreachable).await {
            Ok(()) => {
                self.set_state(ServerState::Stopped);
                tracing::info!("Server stopped");
                metrics::record_transition("stop", "ok", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.set_state(ServerState::Running);
                metrics::record_transition("stop", "failed", started.elapsed());
                Err(e)
            }
        }
    }

    async fn deploy_inner(
        &mut self,
        app_id: &str,
        descriptor: &[u8],
        doc_base: Option<&str>,
        opts: WaitOptions,
    ) -> LifecycleResult<()> {
        let started = Instant::now();
        let content = render_descriptor(descriptor, doc_base)?;
        let url = if opts.wait {
            Some(self.endpoint(&probe_path(app_id))?)
        } else {
            None
        };

        self.descriptors.write(app_id, &content)?;
        self.set_webapp_state(app_id, WebappState::Starting);

        let Some(url) = url else {
            metrics::record_transition("deploy", "signalled", started.elapsed());
            return Ok(());
        };

        tracing::info!(webapp = %app_id, path = %url.path(), "Waiting for web application to start");
        match self.wait_for("deploy", &url, opts, Expect::Reachable).await {
            Ok(()) => {
                self.set_webapp_state(app_id, WebappState::Present);
                tracing::info!(webapp = %app_id, "Web application started");
                metrics::record_transition("deploy", "ok", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.set_webapp_state(app_id, WebappState::Absent);
                metrics::record_transition("deploy", "failed", started.elapsed());
                Err(e)
            }
        }
    }

    async fn undeploy_inner(&mut self, app_id: &str, force: bool, opts: WaitOptions) -> LifecycleResult<()> {
        let started = Instant::now();
        let url = if opts.wait {
            Some(self.endpoint(&probe_path(app_id))?)
        } else {
            None
        };

        if !self.descriptors.remove(app_id)? {
            if !force {
                return Err(LifecycleError::NotFound {
                    kind: "Web application",
                    key: app_id.to_string(),
                });
            }
            tracing::debug!(webapp = %app_id, "No descriptor to remove");
        }
        self.set_webapp_state(app_id, WebappState::Stopping);

        let Some(url) = url else {
            metrics::record_transition("undeploy", "signalled", started.elapsed());
            return Ok(());
        };

        tracing::info!(webapp = %app_id, path = %url.path(), "Waiting for web application to stop");
        match self.wait_for("undeploy", &url, opts, Expect::Absent).await {
            Ok(()) => {
                self.set_webapp_state(app_id, WebappState::Absent);
                tracing::info!(webapp = %app_id, "Web application stopped");
                metrics::record_transition("undeploy", "ok", started.elapsed());
                Ok(())
            }
            Err(e) => {
                self.set_webapp_state(app_id, WebappState::Present);
                metrics::record_transition("undeploy", "failed", started.elapsed());
                Err(e)
            }
        }
    }

    async fn wait_for(
        &self,
        operation: &'static str,
        url: &Url,
        opts: WaitOptions,
        expect: Expect,
    ) -> LifecycleResult<()> {
        let probe = &self.probe;
        let policy = PollPolicy::new(self.poll_interval, opts.max_wait);

        let result = poll_until(policy, |attempt| async move {
            let outcome = probe.get(url, opts.timeout).await;
            metrics::record_probe(operation, outcome.label());
            tracing::debug!(attempt, outcome = ?outcome, "Probe");
            expect.classify(outcome)
        })
        .await;

        match result {
            Ok(polled) => {
                tracing::debug!(attempts = polled.attempts, elapsed_ms = polled.elapsed.as_millis() as u64, "Transition observed");
                Ok(())
            }
            Err(PollError::Exhausted { attempts, elapsed, last }) => {
                tracing::warn!(attempts, last = %last, "Gave up waiting");
                Err(LifecycleError::Timeout {
                    operation,
                    instance: self.instance.clone(),
                    elapsed_secs: elapsed.as_secs(),
                })
            }
            Err(PollError::Fatal { reason, .. }) => {
                tracing::error!(reason = %reason, "TLS failure while waiting");
                Err(self.tls_error(operation, reason))
            }
        }
    }

    fn tls_error(&self, operation: &'static str, reason: String) -> LifecycleError {
        LifecycleError::Tls {
            operation,
            instance: self.instance.clone(),
            reason,
        }
    }

    fn set_state(&mut self, state: ServerState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "Server state changed");
            self.state = state;
        }
    }

    fn set_webapp_state(&mut self, app_id: &str, state: WebappState) {
        let previous = self.webapps.insert(app_id.to_string(), state).unwrap_or_default();
        if previous != state {
            tracing::debug!(webapp = %app_id, from = %previous, to = %state, "Web application state changed");
        }
    }
}
