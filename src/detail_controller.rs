//! Editing session for a single crime.
//!
//! The controller subscribes to one record, keeps the latest emitted value as
//! a mutable working copy and writes it back when the session ends. Plain
//! field edits stay in memory until [`CrimeDetailController::commit`]; values
//! returned by the date and contact pickers are saved straight away.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::app_response::AppResponse;
use crate::local_db_model::{truncate_to_millis, Crime};
use crate::query::{Query, Revisioned};
use crate::report::crime_report;
use crate::repository::CrimeRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading(Uuid),
    Bound(Uuid),
}

/// Last "record changed" signal: the working copy as of that moment, or the
/// read failure the store reported.
pub type RecordChange = Option<Result<Crime, AppResponse>>;

struct Session {
    state: SessionState,
    /// Bumped whenever a session starts or ends; a listener only applies
    /// emissions while its generation is current.
    generation: u64,
    working: Option<Crime>,
    /// Store revision of this session's latest own save. Emissions read at or
    /// before it are older than the working copy and are dropped.
    last_write_revision: Option<u64>,
}

pub struct CrimeDetailController {
    repository: Arc<CrimeRepository>,
    session: Arc<Mutex<Session>>,
    changes: Arc<watch::Sender<RecordChange>>,
    listener: Option<JoinHandle<()>>,
}

impl CrimeDetailController {
    pub fn new(repository: Arc<CrimeRepository>) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            repository,
            session: Arc::new(Mutex::new(Session {
                state: SessionState::Uninitialized,
                generation: 0,
                working: None,
                last_write_revision: None,
            })),
            changes: Arc::new(changes),
            listener: None,
        }
    }

    /// Starts a session on `id`. Must be called from within a tokio runtime.
    ///
    /// Any previous subscription is released without saving.
    pub fn load(&mut self, id: Uuid) {
        self.release_listener();

        let generation = {
            let mut session = lock(&self.session);
            session.generation += 1;
            session.state = SessionState::Loading(id);
            session.working = None;
            session.last_write_revision = None;
            session.generation
        };
        self.changes.send_replace(None);

        debug!("Loading crime {} (session {})", id, generation);
        let query = self.repository.get(id);
        self.listener = Some(spawn_listener(
            id,
            generation,
            query,
            Arc::clone(&self.session),
            Arc::clone(&self.changes),
        ));
    }

    pub fn state(&self) -> SessionState {
        lock(&self.session).state
    }

    pub fn working_copy(&self) -> Option<Crime> {
        lock(&self.session).working.clone()
    }

    pub fn changes(&self) -> watch::Receiver<RecordChange> {
        self.changes.subscribe()
    }

    pub fn report(&self) -> Option<String> {
        lock(&self.session).working.as_ref().map(crime_report)
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.edit(|crime| crime.title = title);
    }

    pub fn set_date(&self, date: DateTime<Utc>) {
        self.edit(|crime| crime.date = truncate_to_millis(date));
    }

    pub fn set_solved(&self, is_solved: bool) {
        self.edit(|crime| crime.is_solved = is_solved);
    }

    pub fn set_suspect(&self, suspect: impl Into<String>) {
        let suspect = suspect.into();
        self.edit(|crime| crime.suspect = suspect);
    }

    /// Ends the session, writing the working copy back.
    ///
    /// Without a working copy this only releases the subscription. If the
    /// write fails the session stays open so the caller can retry.
    pub fn commit(&mut self) -> Result<(), AppResponse> {
        let working = lock(&self.session).working.clone();

        if let Some(crime) = working {
            self.repository.save(&crime)?;
            info!("Committed crime {}", crime.id);
        } else {
            debug!("Commit with no crime loaded");
        }

        {
            let mut session = lock(&self.session);
            session.generation += 1;
            session.state = SessionState::Uninitialized;
            session.working = None;
            session.last_write_revision = None;
        }
        self.release_listener();
        self.changes.send_replace(None);
        Ok(())
    }

    pub fn on_external_date_chosen(&self, date: DateTime<Utc>) -> Result<(), AppResponse> {
        self.edit_and_save(|crime| crime.date = truncate_to_millis(date))
    }

    pub fn on_external_suspect_chosen(&self, name: impl Into<String>) -> Result<(), AppResponse> {
        let name = name.into();
        self.edit_and_save(|crime| crime.suspect = name)
    }

    fn edit(&self, apply: impl FnOnce(&mut Crime)) {
        match lock(&self.session).working.as_mut() {
            Some(crime) => apply(crime),
            None => debug!("Ignoring edit: no crime loaded"),
        }
    }

    /// Saves the whole working copy, pending plain edits included.
    fn edit_and_save(&self, apply: impl FnOnce(&mut Crime)) -> Result<(), AppResponse> {
        let mut session = lock(&self.session);
        let Some(crime) = session.working.as_mut() else {
            warn!("Picker result arrived with no crime loaded");
            return Ok(());
        };

        apply(crime);
        let snapshot = crime.clone();
        let revision = self.repository.save(&snapshot)?;
        debug!("Saved picker result for crime {} at revision {}", snapshot.id, revision);

        session.last_write_revision = Some(revision);
        self.changes.send_replace(Some(Ok(snapshot)));
        Ok(())
    }

    fn release_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl Drop for CrimeDetailController {
    fn drop(&mut self) {
        self.release_listener();
    }
}

fn spawn_listener(
    id: Uuid,
    generation: u64,
    mut query: Query<Option<Crime>>,
    session: Arc<Mutex<Session>>,
    changes: Arc<watch::Sender<RecordChange>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let emission = query.next_revisioned().await;
            if !apply_emission(id, generation, emission, &session, &changes) {
                break;
            }
        }
        debug!("Listener for crime {} stopped", id);
    })
}

/// Returns `false` once the session this listener belongs to has ended.
fn apply_emission(
    id: Uuid,
    generation: u64,
    emission: Result<Revisioned<Option<Crime>>, AppResponse>,
    session: &Mutex<Session>,
    changes: &watch::Sender<RecordChange>,
) -> bool {
    let mut session = lock(session);
    if session.generation != generation {
        return false;
    }

    match emission {
        Ok((revision, Some(crime))) => {
            if session.last_write_revision.is_some_and(|written| revision <= written) {
                debug!("Dropping crime {} read at revision {}: superseded by own save", id, revision);
                return true;
            }
            session.working = Some(crime.clone());
            session.state = SessionState::Bound(id);
            changes.send_replace(Some(Ok(crime)));
        }
        Ok((_, None)) => debug!("Crime {} not stored yet", id),
        Err(e) => {
            warn!("Failed to read crime {}: {}", id, e);
            changes.send_replace(Some(Err(e)));
        }
    }
    true
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
