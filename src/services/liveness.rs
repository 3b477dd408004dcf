use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::models::ReplicationSettings;
use crate::utils::error::AppResult;

/// Überwacht die Verbindung eines Replikationsziels.
///
/// Prüft im Abstand `probe_interval`; nach einem Fehler wird alle
/// `reconnect_interval` neu verbunden, unbegrenzt oft. `on_outage` läuft,
/// sobald die Trennung erkannt ist und das Ziel noch als getrennt gilt;
/// `on_reconnect` nach erfolgreicher Wiederverbindung.
pub struct LivenessProbe {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessProbe {
    pub fn spawn<O, F>(
        store: Arc<dyn Store>,
        settings: &ReplicationSettings,
        on_outage: O,
        on_reconnect: F,
    ) -> AppResult<Self>
    where
        O: Fn() + Send + 'static,
        F: Fn() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let probe_interval = settings.probe_interval();
        let reconnect_interval = settings.reconnect_interval();

        let handle = thread::Builder::new()
            .name("mhf-liveness".to_string())
            .spawn(move || {
                probe_loop(
                    store.as_ref(),
                    &stop_rx,
                    probe_interval,
                    reconnect_interval,
                    &on_outage,
                    &on_reconnect,
                );
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Beendet die Überwachung vor der nächsten Prüfung
    pub fn stop(&mut self) {
        // Schließen des Kanals weckt den Thread sofort
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Verbindungsüberwachung ist abgestürzt");
            }
        }
    }
}

impl Drop for LivenessProbe {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_requested(result: Result<(), RecvTimeoutError>) -> bool {
    !matches!(result, Err(RecvTimeoutError::Timeout))
}

fn probe_loop(
    store: &dyn Store,
    stop_rx: &mpsc::Receiver<()>,
    probe_interval: Duration,
    reconnect_interval: Duration,
    on_outage: &dyn Fn(),
    on_reconnect: &dyn Fn(),
) {
    loop {
        if stop_requested(stop_rx.recv_timeout(probe_interval)) {
            break;
        }
        if store.probe().is_ok() {
            continue;
        }

        warn!(
            "{}-Datenbank nicht erreichbar, neuer Versuch alle {:?}",
            store.backend(),
            reconnect_interval
        );
        on_outage();

        loop {
            if stop_requested(stop_rx.recv_timeout(reconnect_interval)) {
                debug!("Verbindungsüberwachung beendet");
                return;
            }
            match store.reconnect() {
                Ok(()) => {
                    info!("{}-Datenbank wieder verbunden", store.backend());
                    on_reconnect();
                    break;
                }
                Err(e) => debug!("Wiederverbindung fehlgeschlagen: {}", e),
            }
        }
    }
    debug!("Verbindungsüberwachung beendet");
}
