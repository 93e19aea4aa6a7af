use std::time::Instant;

use tokio::sync::oneshot;

/// Final disposition of one in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    Accept,
    Reject,
    Timeout,
    Cancelled,
}

/// One outstanding Access-Request.
///
/// The identifier slot holding this entry is the ownership token for
/// the request's lifetime: whoever takes the entry out of the table
/// gets to complete it, exactly once.
pub(crate) struct PendingRequest {
    /// Index of the server targeted by the first transmission; the
    /// i-th transmission goes to `servers[(first_server + i) % m]`.
    pub first_server: usize,
    /// Transmissions performed so far.
    pub sent: usize,
    /// Transmissions still allowed after the ones performed.
    pub attempts_remaining: usize,
    pub next_send_at: Instant,
    /// The request authenticator, kept to verify the response against.
    pub authenticator: [u8; 16],
    /// The serialized datagram; retransmissions re-send these exact
    /// bytes so the correlation key and the password obfuscation never
    /// diverge across the failover rotation.
    pub datagram: Vec<u8>,
    pub completion: oneshot::Sender<Completion>,
}

/// The 256-entry identifier table of a single socket.
///
/// The identifier field of the packet header is 8 bits, so each
/// socket can carry at most 256 concurrent requests; a round-robin
/// cursor hands out identifiers in wire order and skips entries still
/// in use.
pub(crate) struct PendingTable {
    slots: Vec<Option<PendingRequest>>,
    cursor: u8,
    in_use: usize,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self {
            slots: (0..256).map(|_| None).collect(),
            cursor: 0,
            in_use: 0,
        }
    }
}

impl PendingTable {
    /// Finds the next free identifier, advancing the cursor past it.
    ///
    /// Returns `None` when all 256 entries are in use; callers must
    /// treat that as immediate exhaustion rather than waiting.
    pub fn reserve(&mut self) -> Option<u8> {
        if self.in_use == self.slots.len() {
            return None;
        }

        for _ in 0..self.slots.len() {
            let id = self.cursor;
            self.cursor = self.cursor.wrapping_add(1);
            if self.slots[id as usize].is_none() {
                return Some(id);
            }
        }

        None
    }

    /// Fills a slot previously handed out by [`reserve`] under the
    /// same lock guard.
    ///
    /// [`reserve`]: PendingTable::reserve
    pub fn occupy(&mut self, id: u8, request: PendingRequest) {
        debug_assert!(self.slots[id as usize].is_none());
        self.slots[id as usize] = Some(request);
        self.in_use += 1;
    }

    pub fn get_mut(&mut self, id: u8) -> Option<&mut PendingRequest> {
        self.slots[id as usize].as_mut()
    }

    pub fn take(&mut self, id: u8) -> Option<PendingRequest> {
        let request = self.slots[id as usize].take();
        if request.is_some() {
            self.in_use -= 1;
        }

        request
    }

    pub fn drain(&mut self) -> Vec<PendingRequest> {
        self.in_use = 0;
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }
}
