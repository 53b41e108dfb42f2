//! Room subscription bookkeeping.
//!
//! Pure state: the tracker decides which join/leave commands to emit, the
//! client decides whether it may emit them (only while authenticated).

use std::collections::BTreeSet;

use hubbub_shared::{ClientCommand, RoomKey};

#[derive(Debug, Default)]
pub struct RoomTracker {
    /// Rooms joined on the current authenticated connection.
    joined: BTreeSet<RoomKey>,
    /// Rooms that were joined when the connection dropped, to be re-joined
    /// after the next successful authentication.
    pending_rejoin: BTreeSet<RoomKey>,
}

impl RoomTracker {
    /// Record `room` as joined. Returns the join command if it was not
    /// already joined.
    pub fn join(&mut self, room: &RoomKey) -> Option<ClientCommand> {
        self.pending_rejoin.remove(room);
        self.joined.insert(room.clone()).then(|| room.join_command())
    }

    /// Forget `room` and return its leave command.
    pub fn leave(&mut self, room: &RoomKey) -> ClientCommand {
        self.joined.remove(room);
        self.pending_rejoin.remove(room);
        room.leave_command()
    }

    /// Drop a room from the rejoin list without emitting anything.
    pub fn forget(&mut self, room: &RoomKey) -> bool {
        self.pending_rejoin.remove(room)
    }

    /// Leave every joined room, returning the leave commands.
    pub fn leave_all(&mut self) -> Vec<ClientCommand> {
        self.pending_rejoin.clear();
        std::mem::take(&mut self.joined)
            .iter()
            .map(RoomKey::leave_command)
            .collect()
    }

    pub fn joined(&self) -> Vec<RoomKey> {
        self.joined.iter().cloned().collect()
    }

    pub fn pending_rejoin(&self) -> Vec<RoomKey> {
        self.pending_rejoin.iter().cloned().collect()
    }

    pub fn is_joined(&self, room: &RoomKey) -> bool {
        self.joined.contains(room)
    }

    /// The connection dropped: nothing is joined any more, but remember what was.
    pub fn suspend(&mut self) {
        let joined = std::mem::take(&mut self.joined);
        self.pending_rejoin.extend(joined);
    }

    /// Authentication succeeded: mark remembered rooms joined again and
    /// return their join commands.
    pub fn resume(&mut self) -> Vec<ClientCommand> {
        let pending = std::mem::take(&mut self.pending_rejoin);
        pending.into_iter().filter_map(|room| self.join(&room)).collect()
    }

    pub fn clear(&mut self) {
        self.joined.clear();
        self.pending_rejoin.clear();
    }
}
