use crate::protocol::{Channel, Message, SequenceId, SyncRecord};

/// Upper bound on the encoded size of one record. Planning uses this
/// instead of measuring, so a bundle never overflows its packet.
pub const MAXIMUM_RECORD_SIZE: usize = 40;

/// Bytes kept free in every packet for transport and message headers.
pub const HEADER_RESERVE: usize = 20;

/// Packet size assumed until the transport reports its real limits.
pub const DEFAULT_MAXIMUM_PACKET_SIZE: usize = 1200;

/// Largest record count the `u16` count field of a message can carry.
pub const MAXIMUM_RECORDS_PER_MESSAGE: usize = u16::MAX as usize;

/// How many records fit in one message, per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleCapacity {
    pub reliable: usize,
    pub unreliable: usize,
}

impl BundleCapacity {
    pub fn from_packet_sizes(reliable_max_packet: usize, unreliable_max_packet: usize) -> Self {
        Self {
            reliable: records_per_packet(reliable_max_packet),
            unreliable: records_per_packet(unreliable_max_packet),
        }
    }

    pub fn for_channel(&self, channel: Channel) -> usize {
        match channel {
            Channel::Reliable => self.reliable,
            Channel::Unreliable => self.unreliable,
        }
    }
}

impl Default for BundleCapacity {
    fn default() -> Self {
        Self::from_packet_sizes(DEFAULT_MAXIMUM_PACKET_SIZE, DEFAULT_MAXIMUM_PACKET_SIZE)
    }
}

/// Never below one, so even a tiny packet limit keeps records moving,
/// and never above what the message count field can hold.
fn records_per_packet(max_packet_size: usize) -> usize {
    (max_packet_size.saturating_sub(HEADER_RESERVE) / MAXIMUM_RECORD_SIZE)
        .clamp(1, MAXIMUM_RECORDS_PER_MESSAGE)
}

/// Splits `records` into contiguous messages of at most
/// `per_message_capacity` records, all stamped with `sequence_id`.
/// The capacity is clamped to `1..=MAXIMUM_RECORDS_PER_MESSAGE`.
pub fn bundle(
    sequence_id: SequenceId,
    records: Vec<SyncRecord>,
    per_message_capacity: usize,
) -> Vec<Message> {
    let capacity = per_message_capacity.clamp(1, MAXIMUM_RECORDS_PER_MESSAGE);
    let mut messages = Vec::with_capacity(records.len().div_ceil(capacity));

    let mut remaining = records.into_iter().peekable();
    while remaining.peek().is_some() {
        let chunk: Vec<SyncRecord> = remaining.by_ref().take(capacity).collect();
        messages.push(Message::new(sequence_id, chunk));
    }

    messages
}
