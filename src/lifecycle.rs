//! Process lifecycle: staged startup and coordinated graceful shutdown.
//!
//! ```text
//!   Uninitialized ─▶ ConnectingStore ─▶ MiddlewareReady ─▶ RoutesReady ─▶ Listening
//!                                                                           │
//!                     Terminated ◀── ClosingStore ◀── DrainingListener ◀────┘
//! ```
//!
//! Startup stages run one after another. A store that cannot be reached is
//! not fatal (the supervisor keeps retrying in the background); any other
//! stage failure aborts startup. Shutdown runs at most once no matter how
//! many triggers fire; later triggers are logged and ignored.

use crate::config::Config;
use crate::http::{self, AppState};
use crate::metrics;
use crate::realtime::{Gateway, RoomRegistry};
use crate::security::RateLimitManager;
use crate::store::Connector;
use crate::supervisor::Supervisor;
use crate::telemetry;
use parking_lot::Mutex;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

/// Interval between rate limiter map cleanups.
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Lifecycle phase of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Uninitialized,
    ConnectingStore,
    MiddlewareReady,
    RoutesReady,
    Listening,
    DrainingListener,
    ClosingStore,
    Terminated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::ConnectingStore => "connecting_store",
            Self::MiddlewareReady => "middleware_ready",
            Self::RoutesReady => "routes_ready",
            Self::Listening => "listening",
            Self::DrainingListener => "draining_listener",
            Self::ClosingStore => "closing_store",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Shutdown sequence
// ============================================================================

type StepFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
type StepAction = Box<dyn FnOnce() -> StepFuture + Send>;

struct ShutdownStep {
    name: &'static str,
    phase: Phase,
    action: StepAction,
}

/// Ordered cleanup actions run on shutdown.
#[derive(Default)]
pub struct ShutdownSequence {
    steps: Vec<ShutdownStep>,
}

impl ShutdownSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. Steps run in the order they were added.
    pub fn step<F, Fut>(mut self, name: &'static str, phase: Phase, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.steps.push(ShutdownStep {
            name,
            phase,
            action: Box::new(move || Box::pin(action())),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// What happened during a shutdown run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: String,
    /// Steps that returned an error.
    pub failed_steps: Vec<&'static str>,
    /// Steps abandoned after the step timeout.
    pub timed_out: Vec<&'static str>,
}

impl ShutdownReport {
    /// No step failed. Timed out steps do not make a shutdown unclean.
    pub fn is_clean(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed(ShutdownReport),
    /// Another trigger already started the shutdown.
    AlreadyInProgress,
}

/// Single-flight shutdown controller and phase tracker.
pub struct ShutdownCoordinator {
    in_progress: AtomicBool,
    phase: watch::Sender<Phase>,
    sequence: Mutex<Option<ShutdownSequence>>,
    report: Mutex<Option<ShutdownReport>>,
    step_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(step_timeout: Duration) -> Self {
        let (phase, _) = watch::channel(Phase::Uninitialized);
        Self {
            in_progress: AtomicBool::new(false),
            phase,
            sequence: Mutex::new(None),
            report: Mutex::new(None),
            step_timeout,
        }
    }

    /// Register the cleanup actions. Replaces any earlier sequence.
    pub fn install(&self, sequence: ShutdownSequence) {
        *self.sequence.lock() = Some(sequence);
    }

    pub fn set_phase(&self, phase: Phase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            info!(from = %previous, to = %phase, "Lifecycle phase");
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run the shutdown sequence, unless a shutdown has already started.
    ///
    /// Each step is bounded by the step timeout; a step that errors or times
    /// out is logged and the next step still runs.
    pub async fn shutdown(&self, reason: &str) -> ShutdownOutcome {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            warn!(reason, "Shutdown already in progress, ignoring");
            return ShutdownOutcome::AlreadyInProgress;
        }
        info!(reason, "Shutting down");

        let sequence = self.sequence.lock().take().unwrap_or_default();
        let mut report = ShutdownReport {
            reason: reason.to_string(),
            ..Default::default()
        };

        for step in sequence.steps {
            self.set_phase(step.phase);
            let span = telemetry::spans::shutdown_step(step.name);
            let run = tokio::time::timeout(self.step_timeout, (step.action)()).instrument(span);
            match run.await {
                Ok(Ok(())) => info!(step = step.name, "Shutdown step complete"),
                Ok(Err(e)) => {
                    error!(step = step.name, error = %e, "Shutdown step failed");
                    report.failed_steps.push(step.name);
                }
                Err(_) => {
                    warn!(
                        step = step.name,
                        timeout = ?self.step_timeout,
                        "Shutdown step timed out, continuing"
                    );
                    report.timed_out.push(step.name);
                }
            }
        }

        *self.report.lock() = Some(report.clone());
        self.set_phase(Phase::Terminated);
        info!(clean = report.is_clean(), "Shutdown complete");
        ShutdownOutcome::Completed(report)
    }

    /// Wait until shutdown has finished and return its report.
    pub async fn wait(&self) -> ShutdownReport {
        let mut rx = self.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|phase| *phase == Phase::Terminated).await;
        self.report.lock().clone().unwrap_or_default()
    }
}

// ============================================================================
// Server
// ============================================================================

/// Process assembly: store supervisor, HTTP listener and realtime gateway.
pub struct Server {
    config: Config,
    connector: Arc<dyn Connector>,
}

impl Server {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Run the startup stages in order and return once both listeners are up.
    pub async fn start(self) -> anyhow::Result<RunningServer> {
        let Self { config, connector } = self;
        let coordinator = Arc::new(ShutdownCoordinator::new(config.shutdown.drain_timeout()));

        // Registered before the store stage so the first attempt is counted.
        if config.server.metrics_enabled {
            metrics::init();
        }

        // Stage 1: backing store. Failure here never aborts startup.
        coordinator.set_phase(Phase::ConnectingStore);
        let supervisor = Supervisor::new(connector, &config.database);
        let state = supervisor.connect().await;
        if state.connected {
            info!("Backing store connected");
        } else {
            let policy = supervisor.policy();
            warn!(
                error = state.last_error.as_deref().unwrap_or("unknown"),
                retry_pending = state.retry_pending,
                max_retries = policy.max_retries,
                base_delay = ?policy.base_delay,
                "Starting without backing store"
            );
        }

        // Stage 2: middleware.
        let shutdown = CancellationToken::new();
        let rate_limiter = Arc::new(RateLimitManager::new(
            &config.rate_limit,
            config.realtime.connection_burst_per_ip,
        ));
        let app_state = AppState::new(&config, supervisor.clone(), Arc::clone(&rate_limiter), shutdown.clone());
        coordinator.set_phase(Phase::MiddlewareReady);

        // Stage 3: routes.
        let router = http::router(app_state, config.server.metrics_enabled);
        coordinator.set_phase(Phase::RoutesReady);

        // Stage 4: listeners.
        let rooms = Arc::new(RoomRegistry::new());
        let http_listener = TcpListener::bind(config.server.address).await?;
        let http_addr = http_listener.local_addr()?;
        let gateway = Gateway::bind(
            &config.realtime,
            config.server.listen_timeout(),
            Arc::clone(&rooms),
            Arc::clone(&rate_limiter),
            shutdown.clone(),
        )
        .await?;
        let realtime_addr = gateway.local_addr()?;

        let http_task = spawn_http(http_listener, router, shutdown.clone(), Arc::clone(&coordinator));
        let gateway_task = tokio::spawn(async move {
            if let Err(e) = gateway.run().await {
                error!(error = %e, "Realtime gateway failed");
            }
        });
        spawn_rate_limit_cleanup(rate_limiter, shutdown.clone());

        coordinator.install(shutdown_sequence(shutdown.clone(), http_task, gateway_task, supervisor.clone()));
        coordinator.set_phase(Phase::Listening);
        info!(
            name = %config.server.name,
            environment = config.server.environment.as_str(),
            %http_addr,
            %realtime_addr,
            "Server listening"
        );

        Ok(RunningServer {
            http_addr,
            realtime_addr,
            supervisor,
            rooms,
            coordinator,
        })
    }
}

fn spawn_http(
    listener: TcpListener,
    router: axum::Router,
    shutdown: CancellationToken,
    coordinator: Arc<ShutdownCoordinator>,
) -> JoinHandle<()> {
    let stopping = shutdown.clone();
    tokio::spawn(async move {
        let result = http::serve(listener, router, shutdown).await;
        match result {
            Err(e) if !stopping.is_cancelled() => {
                error!(error = %e, "HTTP listener failed");
                // The drain step awaits this task, so shut down from a fresh one.
                tokio::spawn(async move {
                    coordinator.shutdown("http listener failed").await;
                });
            }
            Err(e) => warn!(error = %e, "HTTP listener error while stopping"),
            Ok(()) => info!("HTTP listener stopped"),
        }
    })
}

fn spawn_rate_limit_cleanup(rate_limiter: Arc<RateLimitManager>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    rate_limiter.cleanup();
                    metrics::set_rate_limiter_entries(rate_limiter.stats());
                }
            }
        }
    });
}

fn shutdown_sequence(
    shutdown: CancellationToken,
    http_task: JoinHandle<()>,
    gateway_task: JoinHandle<()>,
    supervisor: Supervisor,
) -> ShutdownSequence {
    ShutdownSequence::new()
        .step("drain listeners", Phase::DrainingListener, move || async move {
            shutdown.cancel();
            http_task.await?;
            gateway_task.await?;
            Ok(())
        })
        .step("close store", Phase::ClosingStore, move || async move {
            supervisor.disconnect().await?;
            Ok(())
        })
}

/// Handle to a started server.
pub struct RunningServer {
    http_addr: SocketAddr,
    realtime_addr: SocketAddr,
    supervisor: Supervisor,
    rooms: Arc<RoomRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl RunningServer {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn realtime_addr(&self) -> SocketAddr {
        self.realtime_addr
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    pub async fn shutdown(&self, reason: &str) -> ShutdownOutcome {
        self.coordinator.shutdown(reason).await
    }

    pub async fn wait_for_shutdown(&self) -> ShutdownReport {
        self.coordinator.wait().await
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Wait for a termination signal and return its name.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };
    Ok(name)
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Trigger shutdown on every termination signal.
///
/// Signals after the first land on the already-in-progress path.
pub fn spawn_signal_listener(coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match wait_for_shutdown_signal().await {
                Ok(signal) => {
                    info!(signal, "Received termination signal");
                    let coordinator = Arc::clone(&coordinator);
                    tokio::spawn(async move {
                        coordinator.shutdown(signal).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to install signal handlers");
                    return;
                }
            }
        }
    })
}
