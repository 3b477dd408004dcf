//! Einseitige Spiegelung der lokalen Datenbank in ein Replikationsziel.
//!
//! Schreiboperationen markieren Tabellen als "dirty"; ein Hintergrund-Thread
//! leert die Menge und ersetzt jede markierte Tabelle im Ziel vollständig.

use std::collections::BTreeSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::liveness::LivenessProbe;
use crate::db::{Store, Table};
use crate::models::ReplicationSettings;
use crate::utils::error::AppResult;

#[derive(Default)]
struct DirtyState {
    pending: BTreeSet<Table>,
    signaled: bool,
    busy: bool,
    stopped: bool,
}

/// Menge der zu synchronisierenden Tabellen plus Wecksignal.
///
/// Erzeuger fügen ein und setzen danach das Signal, beides unter derselben
/// Sperre. Der Worker löscht das Signal erst, wenn er die Menge leer sieht.
#[derive(Default)]
pub struct DirtyTables {
    state: Mutex<DirtyState>,
    wake: Condvar,
    idle: Condvar,
}

impl DirtyTables {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DirtyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mark(&self, tables: &[Table]) {
        let mut state = self.lock();
        state.pending.extend(tables.iter().copied());
        state.signaled = true;
        self.wake.notify_one();
    }

    pub fn mark_all(&self) {
        self.mark(Table::ALL);
    }

    /// Weckt den Worker, ohne etwas zu markieren
    fn resume(&self) {
        let mut state = self.lock();
        state.signaled = true;
        self.wake.notify_one();
    }

    pub fn pending(&self) -> Vec<Table> {
        self.lock().pending.iter().copied().collect()
    }

    /// Wartet, bis nichts mehr aussteht und kein Abgleich läuft
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.pending.is_empty() && !state.busy {
                return true;
            }
            let now = Instant::now();
            if now >= deadline || state.stopped {
                return false;
            }
            state = self
                .idle
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn stop(&self) {
        let mut state = self.lock();
        state.stopped = true;
        self.wake.notify_all();
        self.idle.notify_all();
    }

    /// Nächste Tabelle für den Worker; `None` heißt beenden
    fn next(&self, replica: &dyn Store) -> Option<Table> {
        let mut state = self.lock();
        loop {
            while !state.signaled && !state.stopped {
                state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
            if state.stopped {
                return None;
            }

            // Getrennt: Einträge bleiben liegen, der Ausfall hat ohnehin alles markiert
            if !replica.is_connected() {
                state.signaled = false;
                self.idle.notify_all();
                continue;
            }

            match state.pending.pop_first() {
                Some(table) => {
                    state.busy = true;
                    return Some(table);
                }
                None => {
                    state.signaled = false;
                    self.idle.notify_all();
                }
            }
        }
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.busy = false;
        self.idle.notify_all();
    }
}

/// Kopiert eine Tabelle vollständig von `primary` nach `replica`
pub fn resync_table(primary: &dyn Store, replica: &dyn Store, table: Table) -> AppResult<usize> {
    let rows = primary.snapshot(table)?;
    replica.replace_table(&rows)?;
    Ok(rows.len())
}

/// Replikation in ein Ziel: Worker-Thread plus Verbindungsüberwachung
pub struct Replication {
    replica: Arc<dyn Store>,
    dirty: Arc<DirtyTables>,
    worker: Option<JoinHandle<()>>,
    probe: Option<LivenessProbe>,
}

impl Replication {
    /// Startet mit einem vollständigen Abgleich aller Tabellen
    pub fn start(
        primary: Arc<dyn Store>,
        replica: Arc<dyn Store>,
        settings: &ReplicationSettings,
    ) -> AppResult<Self> {
        let dirty = Arc::new(DirtyTables::new());
        dirty.mark_all();

        let worker = {
            let dirty = Arc::clone(&dirty);
            let replica = Arc::clone(&replica);
            thread::Builder::new()
                .name("mhf-replication".to_string())
                .spawn(move || worker_loop(primary.as_ref(), replica.as_ref(), &dirty))?
        };

        // Alles wird beim Ausfall markiert, solange das Ziel noch getrennt ist;
        // die Wiederverbindung weckt nur noch den Worker
        let probe = {
            let on_outage = Arc::clone(&dirty);
            let on_reconnect = Arc::clone(&dirty);
            LivenessProbe::spawn(
                Arc::clone(&replica),
                settings,
                move || on_outage.mark_all(),
                move || on_reconnect.resume(),
            )?
        };

        info!("Replikation nach {} gestartet", replica.backend());

        Ok(Self {
            replica,
            dirty,
            worker: Some(worker),
            probe: Some(probe),
        })
    }

    pub fn mark(&self, tables: &[Table]) {
        self.dirty.mark(tables);
    }

    pub fn pending(&self) -> Vec<Table> {
        self.dirty.pending()
    }

    #[cfg(test)]
    fn wait_idle(&self, timeout: Duration) -> bool {
        self.dirty.wait_idle(timeout)
    }

    /// Geteilter Zugriff zum Warten, ohne die Replikation selbst zu sperren
    pub fn dirty_tables(&self) -> Arc<DirtyTables> {
        Arc::clone(&self.dirty)
    }

    pub fn replica(&self) -> &Arc<dyn Store> {
        &self.replica
    }

    /// Hält Überwachung und Worker an; ein laufender Abgleich wird noch beendet
    pub fn stop(&mut self) {
        if let Some(mut probe) = self.probe.take() {
            probe.stop();
        }
        self.dirty.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Replikations-Thread ist abgestürzt");
            }
            info!("Replikation nach {} beendet", self.replica.backend());
        }
    }
}

impl Drop for Replication {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(primary: &dyn Store, replica: &dyn Store, dirty: &DirtyTables) {
    while let Some(table) = dirty.next(replica) {
        match resync_table(primary, replica, table) {
            Ok(count) => debug!("Tabelle {} synchronisiert ({} Zeilen)", table, count),
            Err(e) => warn!("Synchronisation von {} fehlgeschlagen: {}", table, e),
        }
        dirty.finish();
    }
}
