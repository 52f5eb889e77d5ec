use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::config::GpsConfig;
use crate::devices::gps::GpsReader;
use crate::devices::traits::LocationSource;
use crate::storage::LocationStore;
use crate::utils::error::GpsError;

/// Opens a fresh location source each time the service (re)connects.
pub type SourceFactory =
    Arc<dyn Fn() -> Result<Box<dyn LocationSource>, GpsError> + Send + Sync>;

/// How long `stop` waits for the reader thread before detaching it.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

struct ActiveRun {
    active: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    task: JoinHandle<()>,
    started_at: DateTime<Utc>,
}

/// Background service that records every fix of a location source into the
/// shared store while it runs.
#[derive(Clone)]
pub struct GpsService {
    store: Arc<LocationStore>,
    factory: SourceFactory,
    reconnect_delay: Duration,
    run: Arc<Mutex<Option<ActiveRun>>>,
    samples_recorded: Arc<AtomicU64>,
}

impl GpsService {
    /// Service reading the serial receiver described by `config`.
    pub fn new(config: &GpsConfig, store: Arc<LocationStore>) -> Self {
        let reader_config = config.clone();
        let factory: SourceFactory = Arc::new(move || {
            let reader = GpsReader::open(&reader_config)?;
            Ok(Box::new(reader) as Box<dyn LocationSource>)
        });
        Self::with_source_factory(store, Duration::from_secs(config.reconnect_delay_secs), factory)
    }

    pub fn with_source_factory(
        store: Arc<LocationStore>,
        reconnect_delay: Duration,
        factory: SourceFactory,
    ) -> Self {
        Self {
            store,
            factory,
            reconnect_delay,
            run: Arc::new(Mutex::new(None)),
            samples_recorded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn start(&self) -> Result<(), GpsError> {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(|r| r.active.load(Ordering::SeqCst)) {
            info!("🧭 GPS service already running");
            return Ok(());
        }

        let active = Arc::new(AtomicBool::new(true));
        let stop_signal = Arc::new(Notify::new());

        let task = tokio::spawn(Self::record_locations(
            Arc::clone(&self.store),
            Arc::clone(&self.factory),
            self.reconnect_delay,
            Arc::clone(&active),
            Arc::clone(&stop_signal),
            Arc::clone(&self.samples_recorded),
        ));

        *run = Some(ActiveRun {
            active,
            stop_signal,
            task,
            started_at: Utc::now(),
        });
        info!("🧭 GPS service started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), GpsError> {
        let Some(run) = self.run.lock().await.take() else {
            return Ok(());
        };

        info!("🧭 GPS service stopping...");
        run.active.store(false, Ordering::SeqCst);
        run.stop_signal.notify_one();

        match tokio::time::timeout(STOP_GRACE_PERIOD, run.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            // Only reachable while a source is still being opened.
            Err(_) => warn!("⚠️ GPS reader still blocked, detaching it"),
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.run
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| r.active.load(Ordering::SeqCst))
    }

    pub async fn started_at(&self) -> Option<DateTime<Utc>> {
        self.run.lock().await.as_ref().map(|r| r.started_at)
    }

    /// Samples written to the store since this service was created.
    pub fn samples_recorded(&self) -> u64 {
        self.samples_recorded.load(Ordering::Relaxed)
    }

    pub async fn get_status(&self) -> String {
        let stored = self.store.sample_count();
        if !self.is_running().await {
            return format!("🧭 GPS Inactive ({} samples stored)", stored);
        }

        match self.store.latest_location() {
            Some(latest) => format!(
                "🧭 GPS Active - Position: {:.6}°, {:.6}° ±{:.1}m ({} samples stored)",
                latest.latitude, latest.longitude, latest.accuracy, stored
            ),
            None => format!("🧭 GPS Active - Waiting for fix... ({} samples stored)", stored),
        }
    }

    async fn record_locations(
        store: Arc<LocationStore>,
        factory: SourceFactory,
        reconnect_delay: Duration,
        active: Arc<AtomicBool>,
        stop_signal: Arc<Notify>,
        samples_recorded: Arc<AtomicU64>,
    ) {
        while active.load(Ordering::SeqCst) {
            let store = Arc::clone(&store);
            let factory = Arc::clone(&factory);
            let reader_active = Arc::clone(&active);
            let counter = Arc::clone(&samples_recorded);

            let result = tokio::task::spawn_blocking(move || -> Result<u64, GpsError> {
                let mut source = factory()?;
                info!(
                    "🧭 Reading {} locations from {} source",
                    source.provider(),
                    source.source_type()
                );

                let mut recorded = 0u64;
                source.read_locations(&reader_active, &mut |sample| {
                    if !reader_active.load(Ordering::SeqCst) {
                        return false;
                    }
                    // Record everything; filtering happens when reading.
                    store.insert_location(sample);
                    counter.fetch_add(1, Ordering::Relaxed);
                    recorded += 1;
                    true
                })?;
                Ok(recorded)
            })
            .await;

            match result {
                Ok(Ok(recorded)) => info!("🧭 Location source ended after {} samples", recorded),
                Ok(Err(e)) => error!("❌ GPS monitoring error: {}", e),
                Err(e) => error!("❌ GPS reader task failed: {}", e),
            }

            if !active.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(reconnect_delay) => {}
                _ = stop_signal.notified() => {}
            }
        }

        info!("🧭 GPS service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::gps::{NmeaDecoder, NmeaReplay};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tokio::sync::mpsc;

    const LOG: &str = "\
$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47
$GPGGA,123520,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*4D
$GPGGA,123521,4807.038,N,01131.000,E,1,08,3.0,545.4,M,46.9,M,,*46
";

    fn replay_factory() -> SourceFactory {
        Arc::new(|| {
            let replay = NmeaReplay::new(Cursor::new(LOG), NmeaDecoder::new("gps", 1000));
            Ok(Box::new(replay) as Box<dyn LocationSource>)
        })
    }

    /// A receiver that never gets a fix.
    struct SilentSource {
        live: Arc<AtomicUsize>,
    }

    impl LocationSource for SilentSource {
        fn provider(&self) -> &str {
            "gps"
        }

        fn source_type(&self) -> &str {
            "silent"
        }

        fn read_locations(
            &mut self,
            keep_running: &AtomicBool,
            _callback: &mut dyn FnMut(crate::devices::gps::LocationSample) -> bool,
        ) -> Result<(), GpsError> {
            while keep_running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    impl Drop for SilentSource {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn silent_factory(opened: Arc<AtomicUsize>, live: Arc<AtomicUsize>) -> SourceFactory {
        Arc::new(move || {
            opened.fetch_add(1, Ordering::SeqCst);
            // Two sources alive at once would mean two opens of one port.
            assert_eq!(live.fetch_add(1, Ordering::SeqCst), 0);
            Ok(Box::new(SilentSource {
                live: Arc::clone(&live),
            }) as Box<dyn LocationSource>)
        })
    }

    fn failing_factory() -> SourceFactory {
        Arc::new(|| Err(GpsError::ConnectionError("no receiver".to_string())))
    }

    async fn wait_for_change(rx: &mut mpsc::UnboundedReceiver<()>) {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("store change within timeout")
            .expect("listener still registered");
    }

    #[tokio::test]
    async fn test_service_records_into_store() {
        let store = LocationStore::shared();
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.add_listener(Arc::new(move || {
            let _ = tx.send(());
        }));

        let service = GpsService::with_source_factory(
            Arc::clone(&store),
            Duration::from_secs(60),
            replay_factory(),
        );
        service.start().await.unwrap();
        assert!(service.is_running().await);

        for _ in 0..3 {
            wait_for_change(&mut rx).await;
        }
        assert_eq!(store.sample_count(), 3);
        // HDOP 3.0 gives 15 m, which is recorded but not displayed.
        assert_eq!(store.get_locations().len(), 2);
        assert!(service.get_status().await.contains("Position"));

        service.stop().await.unwrap();
        assert!(!service.is_running().await);
        assert_eq!(service.samples_recorded(), 3);
    }

    #[tokio::test]
    async fn test_stop_ends_recording() {
        let store = LocationStore::shared();
        let service = GpsService::with_source_factory(
            Arc::clone(&store),
            Duration::from_millis(5),
            replay_factory(),
        );

        service.start().await.unwrap();
        service.stop().await.unwrap();

        let count = store.sample_count();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.sample_count(), count);
        assert!(service.get_status().await.contains("Inactive"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let store = LocationStore::shared();
        let service = GpsService::with_source_factory(
            Arc::clone(&store),
            Duration::from_secs(60),
            replay_factory(),
        );

        service.start().await.unwrap();
        let started_at = service.started_at().await;
        service.start().await.unwrap();
        assert_eq!(service.started_at().await, started_at);

        service.stop().await.unwrap();
        service.stop().await.unwrap();
        assert!(service.started_at().await.is_none());
    }

    #[tokio::test]
    async fn test_failing_source_keeps_service_alive() {
        let store = LocationStore::shared();
        let service = GpsService::with_source_factory(
            Arc::clone(&store),
            Duration::from_millis(10),
            failing_factory(),
        );

        service.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(service.is_running().await);
        assert!(service.get_status().await.contains("Waiting for fix"));

        service.stop().await.unwrap();
        assert_eq!(store.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_releases_silent_source_before_restart() {
        let store = LocationStore::shared();
        let opened = Arc::new(AtomicUsize::new(0));
        let live = Arc::new(AtomicUsize::new(0));
        let service = GpsService::with_source_factory(
            Arc::clone(&store),
            Duration::from_secs(60),
            silent_factory(Arc::clone(&opened), Arc::clone(&live)),
        );

        service.start().await.unwrap();
        while opened.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let begin = Instant::now();
        service.stop().await.unwrap();
        assert!(begin.elapsed() < Duration::from_millis(500));
        assert_eq!(live.load(Ordering::SeqCst), 0);

        service.start().await.unwrap();
        while opened.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(live.load(Ordering::SeqCst), 1);

        service.stop().await.unwrap();
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(store.sample_count(), 0);
    }
}
