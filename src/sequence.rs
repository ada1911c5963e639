//! Freshness filtering over 16-bit sequence ids.
//!
//! The staleness rule is deliberately simple and must match across peers:
//! an id is fresh when it is not lower than the last one applied, or when
//! it is lower by at least `reset_range`, which is read as the sender's
//! counter having wrapped. Ids that are lower by less than `reset_range`
//! are stale. A very late packet sent just before a wrap
//! (`last = 5, incoming = 65500`) is accepted as fresh; that window is the
//! known cost of the heuristic.

use crate::protocol::{PeerId, SequenceId};
use ahash::AHashMap;

pub const DEFAULT_RESET_RANGE: u16 = 256;

/// Returns true if `incoming` is older than, or out of order with, `last`.
///
/// Equal ids are fresh: one tick may arrive as several bundles sharing an id.
pub fn is_stale(last: SequenceId, incoming: SequenceId, reset_range: u16) -> bool {
    if incoming >= last {
        return false;
    }

    let difference = last - incoming;
    difference < reset_range
}

/// Receive-side filter for one direction of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGuard {
    last: SequenceId,
    reset_range: u16,
}

impl SequenceGuard {
    pub fn new(reset_range: u16) -> Self {
        Self { last: 0, reset_range }
    }

    /// Accepts `incoming` if it is fresh, adopting it as the new last id.
    pub fn accept(&mut self, incoming: SequenceId) -> bool {
        if is_stale(self.last, incoming, self.reset_range) {
            return false;
        }
        self.last = incoming;
        true
    }

    pub fn last(&self) -> SequenceId {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }
}

impl Default for SequenceGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RESET_RANGE)
    }
}

/// Sent and received counters for one (direction, peer) link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceState {
    last_sent: SequenceId,
    received: SequenceGuard,
}

impl SequenceState {
    pub fn new(reset_range: u16) -> Self {
        Self {
            last_sent: 0,
            received: SequenceGuard::new(reset_range),
        }
    }

    /// Moves to the next outgoing id. `u16::MAX` is never used; the
    /// counter goes back to 0 instead.
    pub fn advance_sent(&mut self) -> SequenceId {
        self.last_sent = self.last_sent.wrapping_add(1);
        if self.last_sent == u16::MAX {
            self.last_sent = 0;
        }
        self.last_sent
    }

    pub fn last_sent(&self) -> SequenceId {
        self.last_sent
    }

    pub fn last_received(&self) -> SequenceId {
        self.received.last()
    }

    pub fn accept_received(&mut self, incoming: SequenceId) -> bool {
        self.received.accept(incoming)
    }

    pub fn reset(&mut self) {
        self.last_sent = 0;
        self.received.reset();
    }
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::new(DEFAULT_RESET_RANGE)
    }
}

/// Lazily created per-peer sequence states.
#[derive(Debug, Clone)]
pub struct SequenceTable {
    reset_range: u16,
    peers: AHashMap<PeerId, SequenceState>,
}

impl SequenceTable {
    pub fn new(reset_range: u16) -> Self {
        Self {
            reset_range,
            peers: AHashMap::new(),
        }
    }

    pub fn state_mut(&mut self, peer: PeerId) -> &mut SequenceState {
        let reset_range = self.reset_range;
        self.peers
            .entry(peer)
            .or_insert_with(|| SequenceState::new(reset_range))
    }

    pub fn get(&self, peer: PeerId) -> Option<&SequenceState> {
        self.peers.get(&peer)
    }

    pub fn remove(&mut self, peer: PeerId) -> Option<SequenceState> {
        self.peers.remove(&peer)
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for SequenceTable {
    fn default() -> Self {
        Self::new(DEFAULT_RESET_RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        assert!(is_stale(100, 99, DEFAULT_RESET_RANGE));
        assert!(!is_stale(100, 100, DEFAULT_RESET_RANGE));
        assert!(!is_stale(100, 150, DEFAULT_RESET_RANGE));
    }

    #[test]
    fn test_wraparound_boundaries() {
        // Counter wrapped on the sender: large drop reads as fresh.
        assert!(!is_stale(65500, 10, DEFAULT_RESET_RANGE));
        assert!(!is_stale(65500, 5, DEFAULT_RESET_RANGE));
        // Higher ids are always fresh, even a late pre-wrap packet.
        assert!(!is_stale(5, 65500, DEFAULT_RESET_RANGE));

        // Exact threshold: a drop of reset_range is fresh, one less is stale.
        assert!(!is_stale(1000, 1000 - 256, DEFAULT_RESET_RANGE));
        assert!(is_stale(1000, 1000 - 255, DEFAULT_RESET_RANGE));
        assert!(is_stale(300, 45, DEFAULT_RESET_RANGE));
        assert!(!is_stale(300, 44, DEFAULT_RESET_RANGE));
    }

    #[test]
    fn test_custom_reset_range() {
        assert!(is_stale(100, 50, 64));
        assert!(!is_stale(100, 36, 64));
    }

    #[test]
    fn test_guard_adopts_incoming() {
        let mut guard = SequenceGuard::default();

        assert!(guard.accept(10));
        assert_eq!(guard.last(), 10);
        assert!(guard.accept(10));
        assert!(!guard.accept(9));
        assert_eq!(guard.last(), 10);
        assert!(guard.accept(40));
        assert_eq!(guard.last(), 40);
    }

    #[test]
    fn test_guard_follows_sender_across_wrap() {
        let mut guard = SequenceGuard::default();
        assert!(guard.accept(65530));
        assert!(guard.accept(65534));
        assert!(guard.accept(0));
        assert!(guard.accept(1));
        assert!(!guard.accept(0));
        assert_eq!(guard.last(), 1);
    }

    #[test]
    fn test_advance_sent_skips_max() {
        let mut state = SequenceState::default();
        assert_eq!(state.advance_sent(), 1);

        let mut state = SequenceState::default();
        for _ in 0..65533 {
            state.advance_sent();
        }
        assert_eq!(state.last_sent(), 65533);
        assert_eq!(state.advance_sent(), 65534);
        assert_eq!(state.advance_sent(), 0);
        assert_eq!(state.advance_sent(), 1);
    }

    #[test]
    fn test_table_isolates_peers() {
        let mut table = SequenceTable::new(DEFAULT_RESET_RANGE);
        let a = PeerId(1);
        let b = PeerId(2);

        assert!(table.state_mut(a).accept_received(500));
        assert!(table.state_mut(b).accept_received(3));
        assert!(!table.state_mut(a).accept_received(499));
        assert!(table.state_mut(b).accept_received(4));

        assert_eq!(table.get(a).map(|s| s.last_received()), Some(500));
        assert_eq!(table.len(), 2);

        table.remove(a);
        assert!(table.get(a).is_none());
        assert!(table.state_mut(a).accept_received(1));
    }
}
