use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::devices::gps::LocationSample;
use crate::output::{DataFormatter, DataSender};
use crate::services::GpsService;
use crate::storage::{LocationStore, SubscriptionId};
use crate::utils::error::GpsError;

/// Everything the view renders. Any change re-renders the whole view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub locations: Vec<LocationSample>,
    pub is_gps_service_running: bool,
}

/// Terminal screen listing accurate locations, with start/stop control over
/// the GPS service.
///
/// Store notifications arrive on the writer's thread. The registered
/// listener only pushes a wake-up into a channel; reading the store and
/// rendering happen on whichever task drives this view.
pub struct LocationView {
    store: Arc<LocationStore>,
    service: GpsService,
    formatter: Box<dyn DataFormatter>,
    senders: Vec<Box<dyn DataSender>>,
    state: ViewState,
    subscription: Option<SubscriptionId>,
    wakeup_tx: mpsc::UnboundedSender<()>,
    wakeup_rx: mpsc::UnboundedReceiver<()>,
    renders: u64,
}

impl LocationView {
    pub fn new(
        store: Arc<LocationStore>,
        service: GpsService,
        formatter: Box<dyn DataFormatter>,
    ) -> Self {
        let (wakeup_tx, wakeup_rx) = mpsc::unbounded_channel();
        Self {
            store,
            service,
            formatter,
            senders: Vec::new(),
            state: ViewState::default(),
            subscription: None,
            wakeup_tx,
            wakeup_rx,
            renders: 0,
        }
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        self.senders.push(sender);
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn render_count(&self) -> u64 {
        self.renders
    }

    pub fn is_observing(&self) -> bool {
        self.subscription.is_some()
    }

    /// Starts observing the store and renders whatever it already holds.
    pub async fn on_start(&mut self) -> Result<(), GpsError> {
        if self.subscription.is_none() {
            let wakeup_tx = self.wakeup_tx.clone();
            let id = self.store.add_listener(Arc::new(move || {
                // The receiver lives as long as the view.
                let _ = wakeup_tx.send(());
            }));
            self.subscription = Some(id);
        }

        // Pick up whatever arrived while stopped.
        self.state = ViewState {
            locations: self.store.get_locations(),
            is_gps_service_running: self.service.is_running().await,
        };
        self.update_views().await
    }

    pub fn on_stop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.remove_listener(id);
        }
    }

    /// Handles every wake-up queued so far with a single re-render.
    /// Returns how many wake-ups were consumed.
    pub async fn process_notifications(&mut self) -> Result<usize, GpsError> {
        let mut pending = 0;
        while self.wakeup_rx.try_recv().is_ok() {
            pending += 1;
        }
        if pending > 0 {
            self.on_location_data_changed().await?;
        }
        Ok(pending)
    }

    /// Re-renders on every store change until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), GpsError>
    where
        F: Future<Output = ()>,
    {
        let (_, no_controls) = mpsc::unbounded_channel();
        self.run_with_controls(no_controls, shutdown).await
    }

    /// Like [`run_until`](Self::run_until), and also flips the GPS service on
    /// every message from `toggles`, the way the start/stop button does.
    pub async fn run_with_controls<F>(
        &mut self,
        mut toggles: mpsc::UnboundedReceiver<()>,
        shutdown: F,
    ) -> Result<(), GpsError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut controls_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                toggle = toggles.recv(), if controls_open => {
                    match toggle {
                        Some(()) => {
                            if let Err(e) = self.toggle_gps_service().await {
                                warn!("⚠️ Failed to toggle GPS service: {}", e);
                            }
                        }
                        None => controls_open = false,
                    }
                }
                wakeup = self.wakeup_rx.recv() => {
                    if wakeup.is_none() {
                        break;
                    }
                    // Collapse a burst of changes into one render.
                    while self.wakeup_rx.try_recv().is_ok() {}
                    if let Err(e) = self.on_location_data_changed().await {
                        warn!("⚠️ Failed to render locations: {}", e);
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn toggle_gps_service(&mut self) -> Result<(), GpsError> {
        if self.state.is_gps_service_running {
            self.stop_gps_service().await
        } else {
            self.start_gps_service().await
        }
    }

    pub async fn start_gps_service(&mut self) -> Result<(), GpsError> {
        self.service.start().await?;
        self.state.is_gps_service_running = true;
        self.update_views().await
    }

    pub async fn stop_gps_service(&mut self) -> Result<(), GpsError> {
        self.service.stop().await?;
        self.state.is_gps_service_running = false;
        self.update_views().await
    }

    async fn on_location_data_changed(&mut self) -> Result<(), GpsError> {
        self.state.locations = self.store.get_locations();
        self.update_views().await
    }

    /// Renders the full view from `state`.
    pub fn render(&self) -> String {
        let button = if self.state.is_gps_service_running {
            "[ Stop GPS ]"
        } else {
            "[ Start GPS ]"
        };
        format!("{}\n{}", button, self.formatter.format(&self.state.locations))
    }

    async fn update_views(&mut self) -> Result<(), GpsError> {
        let rendered = self.render();
        self.renders += 1;
        debug!(
            "🖥️ Render #{} with {} locations via {}",
            self.renders,
            self.state.locations.len(),
            self.formatter.format_type()
        );
        for sender in &self.senders {
            sender.send(&rendered).await?;
        }
        Ok(())
    }
}

impl Drop for LocationView {
    fn drop(&mut self) {
        self.on_stop();
    }
}
