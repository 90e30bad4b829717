use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::{error::RelayError, message::ServerEvent};

pub type SessionId = u64;

/// Name reported for sessions that never sent a `join`.
pub const ANONYMOUS: &str = "Anonymous";

/// Sending half of a session's outbound queue.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;
/// Receiving half, drained by the session's socket writer.
pub type Inbox = mpsc::UnboundedReceiver<ServerEvent>;

/// Cloneable handle to one live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    outbox: Outbox,
}

impl SessionHandle {
    pub fn new(id: SessionId, outbox: Outbox) -> Self {
        Self { id, outbox }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues an event for this session without waiting on its socket.
    /// Fails only once the session's writer has gone away.
    pub fn deliver(&self, event: ServerEvent) -> Result<(), RelayError> {
        self.outbox.send(event).map_err(|_| RelayError::Delivery {
            session: self.id,
            reason: "outbound queue closed".to_string(),
        })
    }
}

#[derive(Debug)]
struct Member {
    handle: SessionHandle,
    name: Option<String>,
}

/// Live sessions and their display names.
///
/// A name is stored inside its member record, so a name can never outlive
/// the session it belongs to.
#[derive(Debug, Default)]
pub struct Registry {
    members: BTreeMap<SessionId, Member>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a nameless session. Returns `false` if it was already present,
    /// in which case nothing changes.
    pub fn add(&mut self, handle: SessionHandle) -> bool {
        if self.members.contains_key(&handle.id) {
            return false;
        }
        self.members
            .insert(handle.id, Member { handle, name: None });
        true
    }

    pub fn set_name(&mut self, id: SessionId, name: impl Into<String>) {
        if let Some(member) = self.members.get_mut(&id) {
            member.name = Some(name.into());
        }
    }

    pub fn name_of(&self, id: SessionId) -> &str {
        self.members
            .get(&id)
            .and_then(|member| member.name.as_deref())
            .unwrap_or(ANONYMOUS)
    }

    /// Removes a session and its name. Returns `true` only for the call that
    /// actually removed it.
    pub fn remove(&mut self, id: SessionId) -> bool {
        self.members.remove(&id).is_some()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.members.contains_key(&id)
    }

    /// Current members ordered by session id.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.members
            .values()
            .map(|member| member.handle.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.members.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
