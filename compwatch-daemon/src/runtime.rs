use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use compwatch_core::Inventory;
use compwatch_gateway::GatewayReader;
use compwatch_sync::{run_pass, PassSummary, Store, SyncError, SyncOptions};

use crate::config::{Config, LogFormat};
use crate::error::DaemonError;

/// Which invocation of the per-machine routine a pass is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Once at startup, against whatever baseline already exists.
    Initialization,
    SteadyState,
}

impl PassKind {
    fn label(self) -> &'static str {
        match self {
            PassKind::Initialization => "initialization",
            PassKind::SteadyState => "steady-state",
        }
    }
}

/// How a pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    Completed(PassSummary),
    /// The pass did not start (inventory unavailable, unknown machine).
    Skipped(SyncError),
    /// The pass failed unexpectedly; the loop cools down before retrying.
    Crashed(String),
}

/// Sleep intervals of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    pub error_cooldown: Duration,
}

/// Delay before the next pass.
pub fn next_delay(outcome: &PassOutcome, timing: &Timing) -> Duration {
    match outcome {
        PassOutcome::Completed(_) | PassOutcome::Skipped(_) => timing.poll_interval,
        PassOutcome::Crashed(_) => timing.error_cooldown,
    }
}

/// Everything one pass needs. Owned by the scheduler, lent to the blocking
/// thread pool for the duration of a pass.
pub struct Worker {
    reader: GatewayReader,
    store: Store,
    inventory: Box<dyn Inventory + Send>,
    options: SyncOptions,
}

impl Worker {
    pub fn new(
        reader: GatewayReader,
        store: Store,
        inventory: Box<dyn Inventory + Send>,
        options: SyncOptions,
    ) -> Self {
        Self {
            reader,
            store,
            inventory,
            options,
        }
    }

    pub fn run_pass(&mut self) -> Result<PassSummary, SyncError> {
        run_pass(
            self.inventory.as_ref(),
            &self.reader,
            &mut self.store,
            &self.options,
        )
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: Config) -> Result<(), DaemonError> {
    init_tracing(config.log_format, "info");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(DaemonError::Runtime)?;
    runtime.block_on(run(config))
}

/// Run the daemon until Ctrl-C.
///
/// The backing store must answer at startup; otherwise this returns
/// [`DaemonError::StoreUnreachable`] before any pass runs.
pub async fn run(config: Config) -> Result<(), DaemonError> {
    let store = config.open_store()?;
    let location = store.describe();
    let store = tokio::task::spawn_blocking(move || store.ping().map(|()| store))
        .await
        .map_err(|err| DaemonError::Join {
            task: "store_check",
            message: err.to_string(),
        })?
        .map_err(|source| DaemonError::StoreUnreachable {
            location: location.clone(),
            source,
        })?;

    tracing::info!(
        store = %location,
        gateway = %config.gateway_url,
        tools = ?config.catalog.tool_range(),
        read_mode = %config.read_mode,
        threshold_mm = config.sync_options().engine.threshold(),
        interval_secs = config.poll_interval.as_secs(),
        "compwatch daemon started",
    );

    let worker = Arc::new(Mutex::new(Worker::new(
        config.reader(),
        store,
        config.inventory(),
        config.sync_options(),
    )));
    let timing = Timing {
        poll_interval: config.poll_interval,
        error_cooldown: config.error_cooldown,
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    let scheduler_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = scheduler(
                move |kind| run_worker_pass(Arc::clone(&worker), kind),
                timing,
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(watch_signal(tokio::signal::ctrl_c(), shutdown))
    };

    let (scheduler_result, signal_result) = tokio::join!(scheduler_handle, signal_handle);
    handle_join("scheduler", scheduler_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("compwatch daemon stopped");
    Ok(())
}

/// Perpetual pass loop: one initialization pass, then steady-state passes.
///
/// Shutdown is only observed between passes.
pub(crate) async fn scheduler<F, Fut>(
    mut pass: F,
    timing: Timing,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    F: FnMut(PassKind) -> Fut,
    Fut: Future<Output = PassOutcome>,
{
    let mut kind = PassKind::Initialization;
    loop {
        let outcome = pass(kind).await;
        match &outcome {
            PassOutcome::Completed(_) => {}
            PassOutcome::Skipped(err) => {
                tracing::warn!(
                    pass = kind.label(),
                    error = %err,
                    "pass skipped; retrying next interval",
                );
            }
            PassOutcome::Crashed(message) => {
                tracing::error!(
                    pass = kind.label(),
                    error = %message,
                    cooldown_secs = timing.error_cooldown.as_secs(),
                    "pass failed unexpectedly; cooling down",
                );
            }
        }
        let delay = next_delay(&outcome, &timing);
        kind = PassKind::SteadyState;

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    Ok(())
}

/// Wait for `signal` and broadcast shutdown. The scheduler is stopped even
/// when the signal handler cannot be installed, so the error reaches `run`.
async fn watch_signal<S>(signal: S, shutdown: broadcast::Sender<()>) -> Result<(), DaemonError>
where
    S: Future<Output = std::io::Result<()>>,
{
    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        _ = shutdown_rx.recv() => Ok(()),
        signal = signal => {
            match signal {
                Ok(()) => {
                    tracing::info!("received ctrl-c, stopping after the current pass");
                    let _ = shutdown.send(());
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(error = %err, "ctrl-c handler failed; stopping");
                    let _ = shutdown.send(());
                    Err(DaemonError::Signal(err))
                }
            }
        }
    }
}

async fn run_worker_pass(worker: Arc<Mutex<Worker>>, kind: PassKind) -> PassOutcome {
    let joined = tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        // A panic in an earlier pass poisons the lock; the state is still usable.
        let mut worker = worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::info!(pass = kind.label(), "pass starting");
        let result = worker.run_pass();
        (result, started.elapsed())
    })
    .await;

    match joined {
        Ok((Ok(summary), elapsed)) => {
            tracing::info!(
                pass = kind.label(),
                machines = summary.machines.len(),
                changes = summary.total_changes(),
                duration_ms = elapsed.as_millis() as u64,
                "pass complete",
            );
            PassOutcome::Completed(summary)
        }
        Ok((Err(err), _)) => PassOutcome::Skipped(err),
        Err(err) => PassOutcome::Crashed(format!("pass task join error: {err}")),
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join {
            task,
            message: err.to_string(),
        }),
    }
}

/// Install the global stderr subscriber. `RUST_LOG` overrides `default_level`.
pub fn init_tracing(format: LogFormat, default_level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = match format {
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
}
