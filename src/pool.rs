//! One supervisor task per camera, joined at shutdown.

use crate::dispatcher::Dispatcher;
use crate::registry::CameraRegistry;
use crate::supervisor::{ConnectionState, ConnectionSupervisor, SupervisorConfig, SupervisorExit};
use crate::transport::Connector;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Running supervisors for every camera in a registry.
///
/// Workers are independent: a camera stuck connecting or backing off never delays another.
/// Dropping the pool without calling [`shutdown`](Self::shutdown) aborts the workers.
#[derive(Debug)]
pub struct SupervisorPool {
    tasks: JoinSet<(String, SupervisorExit)>,
    states: BTreeMap<String, watch::Receiver<ConnectionState>>,
    cancel: CancellationToken,
}

impl SupervisorPool {
    /// Spawn a supervisor for every camera. Must be called from within a Tokio runtime.
    pub fn spawn(
        registry: &CameraRegistry,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        config: SupervisorConfig,
    ) -> Self {
        Self::spawn_with_token(registry, connector, dispatcher, config, CancellationToken::new())
    }

    /// Like [`spawn`](Self::spawn), stopping when `cancel` (or a parent of it) is cancelled.
    pub fn spawn_with_token(
        registry: &CameraRegistry,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        config: SupervisorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let mut tasks = JoinSet::new();
        let mut states = BTreeMap::new();

        for camera in registry.iter() {
            let name = camera.name().to_string();
            let supervisor = ConnectionSupervisor::new(
                camera.clone(),
                connector.clone(),
                dispatcher.clone(),
                config.clone(),
            );
            states.insert(name.clone(), supervisor.subscribe());
            let token = cancel.child_token();
            tasks.spawn(async move {
                let exit = supervisor.run(token).await;
                (name, exit)
            });
        }
        info!(target: "alarmstream::pool", cameras = states.len(), "supervisors started");

        Self { tasks, states, cancel }
    }

    /// Token that stops every worker when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Current state of one camera.
    pub fn state(&self, camera: &str) -> Option<ConnectionState> {
        self.states.get(camera).map(|rx| *rx.borrow())
    }

    /// Current state of every camera, ordered by name.
    pub fn states(&self) -> Vec<(String, ConnectionState)> {
        self.states.iter().map(|(name, rx)| (name.clone(), *rx.borrow())).collect()
    }

    /// Follow one camera's state changes.
    pub fn subscribe(&self, camera: &str) -> Option<watch::Receiver<ConnectionState>> {
        self.states.get(camera).cloned()
    }

    /// Cancel every worker and wait for all of them.
    pub async fn shutdown(self) -> Vec<(String, SupervisorExit)> {
        info!(target: "alarmstream::pool", "shutdown requested");
        self.cancel.cancel();
        self.join().await
    }

    /// Wait until every worker has stopped, either through cancellation or because its camera
    /// is unsupported. Exits are returned in completion order.
    pub async fn join(mut self) -> Vec<(String, SupervisorExit)> {
        let mut exits = Vec::with_capacity(self.states.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(exit) => exits.push(exit),
                Err(err) => {
                    error!(target: "alarmstream::pool", error = %err, "supervisor task failed")
                }
            }
        }
        exits
    }
}
