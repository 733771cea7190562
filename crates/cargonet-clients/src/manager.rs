//! Truck client manager.
//!
//! Grounded on `TruckSimulationManager`: one dedicated OS thread per truck
//! client, each running its own single-threaded Tokio runtime so a stuck
//! client can never starve another's reactor. The manager talks to each
//! worker thread over an mpsc channel of commands rather than touching the
//! client's `Arc` from arbitrary tasks, mirroring the original's
//! `moveToThread` + queued-signal boundary.

use cargonet_proto::TransportConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};

use crate::error::ClientError;
use crate::sim_process::SimProcessConfig;
use crate::truck::{SyncState, TripRequest, TripResult, TruckClient};

/// How often `run_simulation_sync` polls between `sync_go_once` rounds,
/// matching the original's `WAIT_INTERVAL` (~100ms) spin.
const WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Bounded wait for a worker thread to exit on shutdown before it is
/// abandoned (SPEC_FULL.md §4.6.1 / spec.md §5).
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub sim_time: f64,
    pub broker: TransportConfig,
    /// Simulator process spawn parameters (SPEC_FULL.md §6.4: `exePath`,
    /// `masterFilePath`, `configUpdates`, `argsUpdates`). `None` skips
    /// process management entirely, e.g. for tests driving a client
    /// against a simulator started out-of-band.
    pub sim_process: Option<SimProcessConfig>,
}

enum WorkerCommand {
    Connect(oneshot::Sender<Result<(), ClientError>>),
    AddTripAsync(TripRequest, oneshot::Sender<Result<oneshot::Receiver<TripResult>, ClientError>>),
    CurrentSync(oneshot::Sender<Option<SyncState>>),
    SendGo(f64, oneshot::Sender<Result<(), ClientError>>),
    Reset(oneshot::Sender<()>),
    /// `endSimulator(old)` + `defineSimulator` under a (possibly new) name
    /// and config, in one step: disconnects the current client, builds a
    /// fresh one under `name`/`config`, and reconnects it. Used by both
    /// `rename_client` (name changes, config unchanged) and
    /// `update_client_config` (name unchanged, config changes) since the
    /// truck dialect has no wire-level `defineSimulator`/`endSimulator`
    /// messages — "define" is the act of spawning the simulator process
    /// with a given config, so redefining means ending the old process and
    /// spawning a new one.
    Redefine(String, ClientConfig, oneshot::Sender<Result<(), ClientError>>),
    Shutdown,
}

struct ClientWorker {
    thread: Option<std::thread::JoinHandle<()>>,
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    config: ClientConfig,
}

impl ClientWorker {
    fn spawn(name: String, config: ClientConfig) -> Self {
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();
        let worker_config = config.clone();

        let thread = std::thread::Builder::new()
            .name(format!("truck-client-{name}"))
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build truck client worker runtime");

                rt.block_on(async move {
                    let mut client = TruckClient::with_sim_process(
                        name.clone(),
                        worker_config.broker.clone(),
                        worker_config.sim_process.clone(),
                    );

                    while let Some(cmd) = cmd_rx.recv().await {
                        match cmd {
                            WorkerCommand::Connect(reply) => {
                                let _ = reply.send(client.connect().await);
                            }
                            WorkerCommand::AddTripAsync(request, reply) => {
                                let _ = reply.send(client.add_trip_async(request).await);
                            }
                            WorkerCommand::CurrentSync(reply) => {
                                let _ = reply.send(client.current_sync().await);
                            }
                            WorkerCommand::SendGo(time, reply) => {
                                let _ = reply.send(client.send_go(time).await);
                            }
                            WorkerCommand::Reset(reply) => {
                                client.reset().await;
                                let _ = reply.send(());
                            }
                            WorkerCommand::Redefine(new_name, new_config, reply) => {
                                let _ = client.disconnect().await;
                                let mut redefined = TruckClient::with_sim_process(
                                    new_name,
                                    new_config.broker.clone(),
                                    new_config.sim_process.clone(),
                                );
                                let result = redefined.connect().await;
                                client = redefined;
                                let _ = reply.send(result);
                            }
                            WorkerCommand::Shutdown => break,
                        }
                    }
                });
            })
            .expect("failed to spawn truck client worker thread");

        Self { thread: Some(thread), cmd_tx, config }
    }

    async fn send<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand) -> Option<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx.send(make(tx)).ok()?;
        rx.await.ok()
    }

    /// Send the shutdown command and bounded-wait (§5: 3s) for the worker
    /// thread to exit before abandoning it. A blocking `JoinHandle::join`
    /// has no place in an async fn, so the join itself runs on the
    /// blocking pool and is raced against the deadline with
    /// `tokio::time::timeout` — there is no safe forced-kill of an OS
    /// thread in Rust, so "terminate fallback" here means detaching the
    /// thread rather than actually terminating it (SPEC_FULL.md §4.6.1).
    async fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
        let Some(thread) = self.thread.take() else { return };
        let join = tokio::task::spawn_blocking(move || thread.join());
        match tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, join).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(_))) => tracing::warn!("truck client worker thread panicked during shutdown"),
            Ok(Err(_)) => tracing::warn!("shutdown join task itself panicked"),
            Err(_) => tracing::warn!(
                "truck client worker thread did not exit within {:?}; abandoning it",
                SHUTDOWN_JOIN_TIMEOUT
            ),
        }
    }
}

impl Drop for ClientWorker {
    /// Best-effort only: `Drop` cannot await the bounded join `shutdown()`
    /// performs, so this just signals the worker to quit. Callers that
    /// need the bounded-wait-then-abandon guarantee call `shutdown()`
    /// explicitly first (`remove_client` does).
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
    }
}

/// Owns every truck client's dedicated worker thread, `"*"`-expanding name
/// resolution, and the sync-barrier stepping loop (`run_simulation_sync`).
pub struct TruckClientManager {
    workers: Arc<RwLock<HashMap<String, ClientWorker>>>,
}

impl Default for TruckClientManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TruckClientManager {
    pub fn new() -> Self {
        Self { workers: Arc::new(RwLock::new(HashMap::new())) }
    }

    pub async fn create_client(&self, name: &str, config: ClientConfig) -> Result<(), ClientError> {
        {
            let workers = self.workers.read().await;
            if workers.contains_key(name) {
                return Err(ClientError::LifecycleError {
                    detail: format!("client '{name}' already exists"),
                });
            }
        }

        let worker = ClientWorker::spawn(name.to_string(), config);
        let connected = worker.send(WorkerCommand::Connect).await;

        match connected {
            Some(Ok(())) => {
                self.workers.write().await.insert(name.to_string(), worker);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => Err(ClientError::LifecycleError {
                detail: "worker thread died before connecting".to_string(),
            }),
        }
    }

    pub async fn remove_client(&self, name: &str) -> Result<(), ClientError> {
        let mut workers = self.workers.write().await;
        match workers.remove(name) {
            Some(mut worker) => {
                worker.shutdown().await;
                Ok(())
            }
            None => Err(ClientError::LifecycleError { detail: format!("no such client '{name}'") }),
        }
    }

    /// `endSimulator(old)`; swap map keys; re-issue `defineSimulator` under
    /// the new name — for the truck dialect this means ending the old
    /// client's transport and spawned simulator process and standing up a
    /// fresh one under `new_name` with the same config, rather than a
    /// server-side RPC, since the truck wire dialect carries no
    /// `defineSimulator`/`endSimulator` messages of its own.
    pub async fn rename_client(&self, old_name: &str, new_name: &str) -> Result<(), ClientError> {
        let mut workers = self.workers.write().await;
        if workers.contains_key(new_name) {
            return Err(ClientError::LifecycleError {
                detail: format!("client '{new_name}' already exists"),
            });
        }
        let worker = workers
            .get(old_name)
            .ok_or_else(|| ClientError::LifecycleError { detail: format!("no such client '{old_name}'") })?;
        let config = worker.config.clone();
        let redefined = worker
            .send(|reply| WorkerCommand::Redefine(new_name.to_string(), config.clone(), reply))
            .await
            .ok_or_else(|| ClientError::LifecycleError { detail: "worker thread died".to_string() })?;
        redefined?;

        let worker = workers.remove(old_name).expect("checked present above");
        workers.insert(new_name.to_string(), worker);
        Ok(())
    }

    /// "end, replace stored config, redefine": re-issues the same
    /// define/end cycle `rename_client` does, keeping the name fixed and
    /// swapping in `config`.
    pub async fn update_client_config(&self, name: &str, config: ClientConfig) -> Result<(), ClientError> {
        let mut workers = self.workers.write().await;
        let worker = workers
            .get_mut(name)
            .ok_or_else(|| ClientError::LifecycleError { detail: format!("no such client '{name}'") })?;
        worker
            .send(|reply| WorkerCommand::Redefine(name.to_string(), config.clone(), reply))
            .await
            .ok_or_else(|| ClientError::LifecycleError { detail: "worker thread died".to_string() })??;
        worker.config = config;
        Ok(())
    }

    /// Resets every registered client, swallowing per-client failures the
    /// way `resetServer` swallows exceptions from `endSimulator` calls so
    /// one misbehaving client cannot block the others from resetting.
    pub async fn reset_server(&self) {
        let workers = self.workers.read().await;
        for (name, worker) in workers.iter() {
            if worker.send(WorkerCommand::Reset).await.is_none() {
                tracing::warn!(name, "client did not acknowledge reset");
            }
        }
    }

    /// `"*"` expands to every currently registered client name, taken
    /// under a read lock so concurrent `create_client`/`remove_client`
    /// calls are never torn.
    async fn expand_names(&self, names: &[String]) -> Vec<String> {
        if names.iter().any(|n| n == "*") {
            self.workers.read().await.keys().cloned().collect()
        } else {
            names.to_vec()
        }
    }

    pub async fn add_trip_async(&self, name: &str, request: TripRequest) -> Result<oneshot::Receiver<TripResult>, ClientError> {
        let workers = self.workers.read().await;
        let worker = workers
            .get(name)
            .ok_or_else(|| ClientError::LifecycleError { detail: format!("no such client '{name}'") })?;
        worker
            .send(|reply| WorkerCommand::AddTripAsync(request, reply))
            .await
            .ok_or_else(|| ClientError::LifecycleError { detail: "worker thread died".to_string() })?
    }

    /// One round of the sync barrier: find the client sitting furthest
    /// ahead and send it a `GO`, exactly as `syncGoOnce` advances whichever
    /// client has already caught up to the simulation's current horizon.
    async fn sync_go_once(&self, names: &[String]) -> bool {
        let workers = self.workers.read().await;
        let mut max_time = f64::MIN;
        let mut furthest: Option<&str> = None;

        for name in names {
            let Some(worker) = workers.get(name) else { continue };
            let sync = worker.send(WorkerCommand::CurrentSync).await.flatten();
            let time = sync.map(|s| s.time).unwrap_or(0.0);
            if time > max_time {
                max_time = time;
                furthest = Some(name.as_str());
            }
        }

        let Some(name) = furthest else { return false };
        if let Some(worker) = workers.get(name) {
            let _ = worker.send(|reply| WorkerCommand::SendGo(max_time, reply)).await;
        }
        true
    }

    /// True while any named client's progress is below the configured
    /// `sim_time`, matching `keepGoing`.
    async fn keep_going(&self, names: &[String]) -> bool {
        let workers = self.workers.read().await;
        for name in names {
            let Some(worker) = workers.get(name) else { continue };
            let sync = worker.send(WorkerCommand::CurrentSync).await.flatten();
            let time = sync.map(|s| s.time).unwrap_or(0.0);
            if time < worker.config.sim_time {
                return true;
            }
        }
        false
    }

    /// Drives the named clients (or every client, via `"*"`) to
    /// completion, one `sync_go_once` round at a time, sleeping
    /// `WAIT_INTERVAL` between rounds.
    pub async fn run_simulation_sync(&self, names: &[String]) {
        let expanded = self.expand_names(names).await;
        while self.keep_going(&expanded).await {
            self.sync_go_once(&expanded).await;
            tokio::time::sleep(WAIT_INTERVAL).await;
        }
    }

    /// Issues an advance to every named client concurrently, unlike
    /// `run_simulation_sync`'s one-at-a-time barrier: each client is sent
    /// its own `GO` for its own current time, with no client waiting on
    /// another's reply.
    pub async fn run_simulation_async(&self, names: &[String]) {
        let expanded = self.expand_names(names).await;
        let workers = self.workers.read().await;

        let sends = expanded.iter().filter_map(|name| {
            let worker = workers.get(name)?;
            Some(async move {
                let sync = worker.send(WorkerCommand::CurrentSync).await.flatten();
                let time = sync.map(|s| s.time).unwrap_or(0.0);
                let _ = worker.send(|reply| WorkerCommand::SendGo(time, reply)).await;
            })
        });

        futures::future::join_all(sends).await;
    }

    pub async fn client_names(&self) -> Vec<String> {
        self.workers.read().await.keys().cloned().collect()
    }
}
