//! Shared relay state and the operations that mutate it.
//!
//! The registry and the history log sit behind a single mutex. Appending an
//! entry, reading the membership and queueing the entry for every member all
//! happen while that lock is held, so every session observes broadcasts in
//! the same global order and a session joining mid-broadcast either gets an
//! entry in its history replay or as a live event, never both and never
//! neither.
//!
//! Queueing never waits on a socket. Each session drains its own queue (see
//! [`crate::server`]), so one stalled recipient cannot hold up the rest.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    history::History,
    message::{ClientEvent, EntryKind, HistoryEntry, ServerEvent},
    registry::{Outbox, Registry, SessionHandle, SessionId},
};

#[derive(Default)]
struct RelayState {
    registry: Registry,
    history: History,
}

pub struct Relay {
    state: Mutex<RelayState>,
    next_id: AtomicU64,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RelayState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a new session and queues its `history` event.
    ///
    /// The history event is always the first thing in the session's queue
    /// and holds exactly the entries appended before registration.
    pub async fn connect(&self, outbox: Outbox) -> SessionId {
        let id = self.next_id();
        let handle = SessionHandle::new(id, outbox);

        let mut state = self.state.lock().await;
        state.registry.add(handle.clone());
        let replay = ServerEvent::History {
            messages: state.history.snapshot(),
        };
        if let Err(err) = handle.deliver(replay) {
            debug!(session = id, error = %err, "session gone before history replay");
            state.registry.remove(id);
        }

        id
    }

    pub async fn handle_event(&self, session: SessionId, event: ClientEvent) {
        match event {
            ClientEvent::Join { name } => self.join(session, name).await,
            ClientEvent::Message { content } => {
                self.publish(session, EntryKind::Message, content).await;
            }
            ClientEvent::Image { content } => {
                self.publish(session, EntryKind::Image, content).await;
            }
        }
    }

    /// Sets the display name used for this session's future entries. Nothing
    /// is broadcast.
    pub async fn join(&self, session: SessionId, name: String) {
        let mut state = self.state.lock().await;
        debug!(session, %name, "session joined");
        state.registry.set_name(session, name);
    }

    /// Appends an entry for `session` and broadcasts it to every member,
    /// sender included. Returns `None` if the session has already closed.
    pub async fn publish(
        &self,
        session: SessionId,
        kind: EntryKind,
        content: impl Into<Arc<str>>,
    ) -> Option<HistoryEntry> {
        let mut state = self.state.lock().await;
        if !state.registry.contains(session) {
            debug!(session, "dropping entry from closed session");
            return None;
        }

        let entry = HistoryEntry::new(kind, state.registry.name_of(session), content);
        state.history.append(entry.clone());
        broadcast(&mut state.registry, ServerEvent::from(entry.clone()));

        Some(entry)
    }

    /// Removes the session. Returns `true` only for the call that performed
    /// the removal, so callers can run close-time work exactly once.
    pub async fn disconnect(&self, session: SessionId) -> bool {
        self.state.lock().await.registry.remove(session)
    }

    pub async fn members(&self) -> Vec<SessionId> {
        self.state.lock().await.registry.ids()
    }

    pub async fn name_of(&self, session: SessionId) -> String {
        self.state.lock().await.registry.name_of(session).to_string()
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().await.history.snapshot()
    }
}

/// Queues `event` for every current member. A failed delivery removes that
/// member and moves on to the next.
fn broadcast(registry: &mut Registry, event: ServerEvent) {
    let failed: Vec<SessionId> = registry
        .snapshot()
        .into_iter()
        .filter_map(|member| match member.deliver(event.clone()) {
            Ok(()) => None,
            Err(err) => {
                debug!(error = %err, "dropping unreachable session");
                Some(member.id())
            }
        })
        .collect();

    for session in failed {
        if registry.remove(session) {
            info!(session, "session removed after failed delivery");
        }
    }
}
