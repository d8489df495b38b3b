//! Session registry: concurrency-safe directory of sessions.
//!
//! The registry owns every [`Session`]. Locking is fine-grained: the outer
//! map lock is held only long enough to fetch the per-id entry, and each
//! entry has its own mutex, so work on unrelated sessions never serialises.
//! No lock is held across collaborator awaits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::foundation::SessionId;
use crate::domain::intake::{FlowPolicy, IntakeFlow};
use crate::domain::session::{Session, SessionError};
use crate::ports::RoomInfo;

/// Handle to a session's background unit of work.
#[derive(Debug)]
pub struct RunnerHandle {
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Registry entry: the session plus its room credentials and live runner.
struct SessionEntry {
    session: Session,
    room: RoomInfo,
    runner: Option<RunnerHandle>,
    /// Flow driven over HTTP for text-chat sessions. Voice sessions keep
    /// their flow inside the background task instead.
    chat_flow: Option<IntakeFlow>,
}

/// Concurrency-safe directory of active and recently finished sessions.
#[derive(Default)]
pub struct SessionRegistry {
    entries: RwLock<HashMap<SessionId, Arc<Mutex<SessionEntry>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new session bound to the given room credentials.
    pub async fn create(&self, room: RoomInfo) -> Session {
        let session = Session::new(SessionId::new());
        let snapshot = session.clone();
        let entry = SessionEntry {
            session,
            room,
            runner: None,
            chat_flow: None,
        };
        self.entries
            .write()
            .await
            .insert(*snapshot.id(), Arc::new(Mutex::new(entry)));
        debug!(session_id = %snapshot.id(), "session created");
        snapshot
    }

    /// Returns a snapshot of the session.
    pub async fn get(&self, id: &SessionId) -> Result<Session, SessionError> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.session.clone())
    }

    /// Returns the room credentials for the session.
    pub async fn room_info(&self, id: &SessionId) -> Result<RoomInfo, SessionError> {
        let entry = self.entry(id).await?;
        let guard = entry.lock().await;
        Ok(guard.room.clone())
    }

    /// Applies a mutation to the session under its per-id lock.
    ///
    /// The closure runs synchronously while the entry mutex is held, so one
    /// session's updates are atomic with respect to concurrent readers.
    pub async fn update<T>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, SessionError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        Ok(f(&mut guard.session))
    }

    /// Applies a mutation to the session together with its text-chat flow,
    /// under the per-id lock.
    ///
    /// The flow is created on first use and keeps its bookkeeping (re-prompt
    /// counts, pending confirmations) across requests.
    pub async fn update_with_chat_flow<T>(
        &self,
        id: &SessionId,
        policy: FlowPolicy,
        f: impl FnOnce(&mut IntakeFlow, &mut Session) -> T,
    ) -> Result<T, SessionError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        let SessionEntry {
            session, chat_flow, ..
        } = &mut *guard;
        let flow = chat_flow.get_or_insert_with(|| IntakeFlow::new(policy));
        Ok(f(flow, session))
    }

    /// Attaches the background runner for a session.
    pub async fn install_runner(
        &self,
        id: &SessionId,
        runner: RunnerHandle,
    ) -> Result<(), SessionError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        if let Some(previous) = guard.runner.replace(runner) {
            // A stale runner must never outlive its replacement.
            previous.cancel.cancel();
        }
        Ok(())
    }

    /// Detaches and returns the runner, if one is attached.
    pub async fn take_runner(&self, id: &SessionId) -> Result<Option<RunnerHandle>, SessionError> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        Ok(guard.runner.take())
    }

    /// Removes a session, cancelling any live runner.
    ///
    /// Returns false when the id is unknown.
    pub async fn delete(&self, id: &SessionId) -> bool {
        let removed = self.entries.write().await.remove(id);
        match removed {
            Some(entry) => {
                let mut guard = entry.lock().await;
                if let Some(runner) = guard.runner.take() {
                    runner.cancel.cancel();
                }
                debug!(session_id = %id, "session deleted");
                true
            }
            None => false,
        }
    }

    /// Removes terminal sessions older than `max_age`.
    ///
    /// Active sessions are never removed, regardless of age.
    pub async fn cleanup_expired(&self, max_age: Duration) -> usize {
        let candidates: Vec<SessionId> = {
            let map = self.entries.read().await;
            let mut expired = Vec::new();
            for (id, entry) in map.iter() {
                let guard = entry.lock().await;
                if guard.session.is_terminal() && guard.session.created_at().age() > max_age {
                    expired.push(*id);
                }
            }
            expired
        };

        let mut removed = 0;
        for id in candidates {
            // Re-check under the write lock; the session cannot have become
            // active again (terminal is monotonic), only deleted.
            if self.delete(&id).await {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(count = removed, "expired sessions swept");
        }
        removed
    }

    /// Lists snapshots of all active sessions.
    pub async fn list_active(&self) -> Vec<Session> {
        let map = self.entries.read().await;
        let mut active = Vec::new();
        for entry in map.values() {
            let guard = entry.lock().await;
            if !guard.session.is_terminal() {
                active.push(guard.session.clone());
            }
        }
        active
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn entry(&self, id: &SessionId) -> Result<Arc<Mutex<SessionEntry>>, SessionError> {
        self.entries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::not_found(*id))
    }
}
