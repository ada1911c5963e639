use crate::protocol::{Channel, Destination, PeerId, SyncRecord};
use ahash::AHashMap;

#[derive(Debug, Default)]
struct ChannelQueues {
    reliable: Vec<SyncRecord>,
    unreliable: Vec<SyncRecord>,
}

impl ChannelQueues {
    fn get_mut(&mut self, channel: Channel) -> &mut Vec<SyncRecord> {
        match channel {
            Channel::Reliable => &mut self.reliable,
            Channel::Unreliable => &mut self.unreliable,
        }
    }

    fn len(&self) -> usize {
        self.reliable.len() + self.unreliable.len()
    }

    fn drain_into(&mut self, destination: Destination, out: &mut Vec<QueuedBatch>) {
        for (channel, records) in [
            (Channel::Reliable, &mut self.reliable),
            (Channel::Unreliable, &mut self.unreliable),
        ] {
            if !records.is_empty() {
                out.push(QueuedBatch {
                    destination,
                    channel,
                    records: std::mem::take(records),
                });
            }
        }
    }
}

/// Records gathered for one destination and channel during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedBatch {
    pub destination: Destination,
    pub channel: Channel,
    pub records: Vec<SyncRecord>,
}

/// Everything drained from an [`OutboundQueue`], in send order.
#[derive(Debug, Default)]
pub struct DrainedQueues {
    batches: Vec<QueuedBatch>,
}

impl DrainedQueues {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedBatch> {
        self.batches.iter()
    }
}

impl IntoIterator for DrainedQueues {
    type Item = QueuedBatch;
    type IntoIter = std::vec::IntoIter<QueuedBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.into_iter()
    }
}

/// Pending records between ticks, keyed by destination and channel.
///
/// Per-peer queues are created on first use and dropped at every drain.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    to_server: ChannelQueues,
    to_all: ChannelQueues,
    to_peers: AHashMap<PeerId, ChannelQueues>,
    peer_order: Vec<PeerId>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, destination: Destination, channel: Channel, record: SyncRecord) {
        let queues = match destination {
            Destination::Server => &mut self.to_server,
            Destination::All => &mut self.to_all,
            Destination::Peer(peer) => {
                if !self.to_peers.contains_key(&peer) {
                    self.peer_order.push(peer);
                }
                self.to_peers.entry(peer).or_default()
            }
        };
        queues.get_mut(channel).push(record);
    }

    pub fn enqueue_to_server(&mut self, record: SyncRecord, reliable: bool) {
        self.enqueue(Destination::Server, Channel::from_reliable(reliable), record);
    }

    pub fn enqueue_to_all(&mut self, record: SyncRecord, reliable: bool) {
        self.enqueue(Destination::All, Channel::from_reliable(reliable), record);
    }

    pub fn enqueue_to_peer(&mut self, peer: PeerId, record: SyncRecord, reliable: bool) {
        self.enqueue(Destination::Peer(peer), Channel::from_reliable(reliable), record);
    }

    /// Takes every pending record and leaves the queue empty.
    ///
    /// Order: all-reliable, all-unreliable, per-peer reliable, per-peer
    /// unreliable (peers in first-enqueue order), then server-bound.
    pub fn drain_all(&mut self) -> DrainedQueues {
        let mut batches = Vec::new();

        self.to_all.drain_into(Destination::All, &mut batches);

        let peers = std::mem::take(&mut self.peer_order);
        let mut to_peers = std::mem::take(&mut self.to_peers);
        for channel in [Channel::Reliable, Channel::Unreliable] {
            for peer in &peers {
                if let Some(queues) = to_peers.get_mut(peer) {
                    let records = std::mem::take(queues.get_mut(channel));
                    if !records.is_empty() {
                        batches.push(QueuedBatch {
                            destination: Destination::Peer(*peer),
                            channel,
                            records,
                        });
                    }
                }
            }
        }

        self.to_server.drain_into(Destination::Server, &mut batches);

        DrainedQueues { batches }
    }

    pub fn len(&self) -> usize {
        self.to_server.len()
            + self.to_all.len()
            + self.to_peers.values().map(ChannelQueues::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of peers with a queue this tick.
    pub fn peer_count(&self) -> usize {
        self.to_peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u32) -> SyncRecord {
        SyncRecord::new(id, 0)
    }

    fn ids(batch: &QueuedBatch) -> Vec<u32> {
        batch.records.iter().map(|r| r.entity_id).collect()
    }

    #[test]
    fn test_enqueue_preserves_order_without_dedup() {
        let mut queue = OutboundQueue::new();
        queue.enqueue_to_all(record(1), false);
        queue.enqueue_to_all(record(2), false);
        queue.enqueue_to_all(record(1), false);

        let drained: Vec<_> = queue.drain_all().into_iter().collect();
        assert_eq!(drained.len(), 1);
        assert_eq!(ids(&drained[0]), vec![1, 2, 1]);
    }

    #[test]
    fn test_drain_order_and_clear() {
        let mut queue = OutboundQueue::new();
        queue.enqueue_to_server(record(9), true);
        queue.enqueue_to_peer(PeerId(2), record(5), false);
        queue.enqueue_to_peer(PeerId(1), record(4), true);
        queue.enqueue_to_all(record(3), false);
        queue.enqueue_to_all(record(2), true);
        queue.enqueue_to_peer(PeerId(2), record(6), true);

        assert_eq!(queue.len(), 6);
        assert_eq!(queue.peer_count(), 2);

        let drained: Vec<_> = queue.drain_all().into_iter().collect();
        let order: Vec<_> = drained.iter().map(|b| (b.destination, b.channel)).collect();
        assert_eq!(
            order,
            vec![
                (Destination::All, Channel::Reliable),
                (Destination::All, Channel::Unreliable),
                (Destination::Peer(PeerId(2)), Channel::Reliable),
                (Destination::Peer(PeerId(1)), Channel::Reliable),
                (Destination::Peer(PeerId(2)), Channel::Unreliable),
                (Destination::Server, Channel::Reliable),
            ]
        );

        assert!(queue.is_empty());
        assert_eq!(queue.peer_count(), 0);
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_peer_queues_are_isolated() {
        let mut queue = OutboundQueue::new();
        queue.enqueue_to_peer(PeerId(1), record(10), false);
        queue.enqueue_to_peer(PeerId(2), record(20), false);
        queue.enqueue_to_peer(PeerId(1), record(11), false);

        let drained: Vec<_> = queue.drain_all().into_iter().collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].destination, Destination::Peer(PeerId(1)));
        assert_eq!(ids(&drained[0]), vec![10, 11]);
        assert_eq!(drained[1].destination, Destination::Peer(PeerId(2)));
        assert_eq!(ids(&drained[1]), vec![20]);
    }
}
