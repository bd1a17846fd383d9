//! Periodic casting device discovery
//!
//! One background task polls the discovery collaborator and publishes the
//! device list on a watch channel. The task is started once and cancelled
//! once; a stopped monitor stays stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::CastingDiscovery;
use crate::models::CastingDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Running,
    Stopped,
}

pub struct CastingDeviceMonitor {
    discovery: Arc<dyn CastingDiscovery>,
    interval: Duration,
    devices: watch::Sender<Vec<CastingDevice>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    state: MonitorState,
}

impl CastingDeviceMonitor {
    pub fn new(discovery: Arc<dyn CastingDiscovery>, interval: Duration) -> Self {
        let (devices, _) = watch::channel(Vec::new());
        Self {
            discovery,
            interval,
            devices,
            cancel: CancellationToken::new(),
            task: None,
            state: MonitorState::Idle,
        }
    }

    /// Spawn the polling task. Later calls do nothing.
    pub fn start(&mut self) {
        if self.state != MonitorState::Idle {
            debug!(state = ?self.state, "device monitor already started");
            return;
        }
        self.state = MonitorState::Running;

        let discovery = Arc::clone(&self.discovery);
        let devices = self.devices.clone();
        let cancel = self.cancel.clone();
        let period = self.interval;

        info!(interval_secs = period.as_secs(), "device monitor started");
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let found = tokio::select! {
                    _ = cancel.cancelled() => break,
                    found = discovery.get_devices() => found,
                };
                match found {
                    Ok(list) => {
                        debug!(count = list.len(), "casting devices refreshed");
                        devices.send_replace(list);
                    }
                    // Keep showing the last known devices
                    Err(e) => warn!(error = %e, "device discovery failed"),
                }
            }
        }));
    }

    /// Cancel the polling task and wait for it to finish
    pub async fn stop(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }
        self.state = MonitorState::Stopped;
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
            info!("device monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }

    /// Latest device list
    pub fn devices(&self) -> Vec<CastingDevice> {
        self.devices.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<CastingDevice>> {
        self.devices.subscribe()
    }

    pub async fn select_device(&self, id: &str) {
        self.discovery.select_device(id).await;
    }
}

impl Drop for CastingDeviceMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
