use crate::bundler::{bundle, BundleCapacity, DEFAULT_MAXIMUM_PACKET_SIZE, HEADER_RESERVE};
use crate::debug;
use crate::dispatch::{self, DispatchReport, Origin, RecordHandler};
use crate::error::{Result, SyncError};
use crate::limits::{Clock, DiscoveryState, LimitDiscovery, SystemClock, DEFAULT_DISCOVERY_TIMEOUT};
use crate::protocol::*;
use crate::queue::OutboundQueue;
use crate::registry::{OutboundRecord, SourceHandle, SourceRegistry, TransformSource};
use crate::sequence::{SequenceState, SequenceTable, DEFAULT_RESET_RANGE};
use crate::serialization::encode_message;
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub reset_range: u16,
    pub default_max_packet_size: usize,
    pub discovery_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reset_range: DEFAULT_RESET_RANGE,
            default_max_packet_size: DEFAULT_MAXIMUM_PACKET_SIZE,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_reset_range(mut self, reset_range: u16) -> Self {
        self.reset_range = reset_range;
        self
    }

    pub fn with_default_max_packet_size(mut self, size: usize) -> Self {
        self.default_max_packet_size = size;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.reset_range == 0 {
            return Err(SyncError::InvalidConfig("reset_range must be non-zero".to_string()));
        }
        if self.default_max_packet_size <= HEADER_RESERVE {
            return Err(SyncError::InvalidConfig(format!(
                "default_max_packet_size must exceed the {} byte header reserve",
                HEADER_RESERVE
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    TickPending,
    Flushed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub frame: u64,
    pub fixed_step: bool,
    pub records_gathered: usize,
    pub sources_skipped: usize,
    pub messages_sent: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub ticks: u64,
    pub messages_sent: u64,
    pub send_failures: u64,
    pub messages_received: u64,
    pub stale_dropped: u64,
    pub malformed_dropped: u64,
}

/// Runs one protocol tick per frame: gathers records from registered
/// sources, stamps them with the next sequence id and sends them in
/// packet-sized bundles. Also owns the inbound freshness state.
pub struct TickDriver<T: Transport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    config: SyncConfig,
    registry: SourceRegistry,
    queue: OutboundQueue,
    capacity: BundleCapacity,
    discovery: LimitDiscovery,
    // Server sends to all and to observers under one counter.
    server_sequence: SequenceState,
    client_sequence: SequenceState,
    peer_sequences: SequenceTable,
    handler: Option<Box<dyn RecordHandler>>,
    phase: TickPhase,
    fixed_step: bool,
    last_fixed_frame: Option<u64>,
    server_active: bool,
    client_active: bool,
    stats: SyncStats,
}

impl<T: Transport> TickDriver<T, SystemClock> {
    pub fn new(transport: T, config: SyncConfig) -> Result<Self> {
        Self::with_clock(transport, SystemClock::new(), config)
    }
}

impl<T: Transport, C: Clock> TickDriver<T, C> {
    pub fn with_clock(transport: T, clock: C, config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let capacity = BundleCapacity::from_packet_sizes(
            config.default_max_packet_size,
            config.default_max_packet_size,
        );

        Ok(Self {
            transport,
            clock,
            capacity,
            discovery: LimitDiscovery::new(config.discovery_timeout),
            server_sequence: SequenceState::new(config.reset_range),
            client_sequence: SequenceState::new(config.reset_range),
            peer_sequences: SequenceTable::new(config.reset_range),
            config,
            registry: SourceRegistry::new(),
            queue: OutboundQueue::new(),
            handler: None,
            phase: TickPhase::Idle,
            fixed_step: false,
            last_fixed_frame: None,
            server_active: false,
            client_active: false,
            stats: SyncStats::default(),
        })
    }

    pub fn register_source(&mut self, source: Box<dyn TransformSource>) -> SourceHandle {
        self.registry.register(source)
    }

    pub fn unregister_source(&mut self, handle: SourceHandle) -> bool {
        self.registry.unregister(handle).is_some()
    }

    pub fn set_record_handler(&mut self, handler: Box<dyn RecordHandler>) {
        self.handler = Some(handler);
    }

    pub fn enqueue_to_server(&mut self, record: SyncRecord, reliable: bool) {
        self.queue.enqueue_to_server(record, reliable);
    }

    pub fn enqueue_to_all(&mut self, record: SyncRecord, reliable: bool) {
        self.queue.enqueue_to_all(record, reliable);
    }

    pub fn enqueue_to_peer(&mut self, peer: PeerId, record: SyncRecord, reliable: bool) {
        self.queue.enqueue_to_peer(peer, record, reliable);
    }

    /// Fixed-timestep signal. Only the first call for a given frame counts.
    pub fn fixed_update(&mut self, frame: u64) {
        if self.last_fixed_frame == Some(frame) {
            return;
        }
        self.last_fixed_frame = Some(frame);
        self.fixed_step = true;
    }

    /// Runs the tick for `frame`.
    pub fn update(&mut self, frame: u64) -> TickReport {
        self.phase = TickPhase::TickPending;
        self.refresh_roles();

        if let Some(capacity) = self.discovery.poll(self.clock.now(), &self.transport) {
            self.capacity = capacity;
            debug::trace_capacity(&capacity);
        }

        let fixed_step = std::mem::take(&mut self.fixed_step);
        let mut report = TickReport {
            frame,
            fixed_step,
            ..TickReport::default()
        };

        for (handle, source) in self.registry.iter_mut() {
            match source.produce(fixed_step) {
                Ok(Some(OutboundRecord {
                    destination,
                    channel,
                    record,
                })) => {
                    self.queue.enqueue(destination, channel, record);
                    report.records_gathered += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    log::debug!("source {:?} skipped this tick: {}", handle, err);
                    report.sources_skipped += 1;
                }
            }
        }

        report.messages_sent = self.flush();
        self.phase = TickPhase::Idle;
        self.stats.ticks += 1;

        debug::trace_tick(&report);
        report
    }

    /// Sends everything queued and clears the queues. Returns the number
    /// of messages handed to the transport.
    pub fn flush(&mut self) -> usize {
        self.refresh_roles();
        let drained = self.queue.drain_all();

        let server_sequence = self
            .transport
            .is_server_active()
            .then(|| self.server_sequence.advance_sent());
        let client_sequence = self
            .transport
            .is_client_active()
            .then(|| self.client_sequence.advance_sent());

        let mut sent = 0;
        for batch in drained {
            let sequence_id = match batch.destination {
                Destination::Server => client_sequence,
                Destination::All | Destination::Peer(_) => server_sequence,
            };
            let Some(sequence_id) = sequence_id else {
                log::debug!(
                    "dropping {} records for {:?}: role inactive",
                    batch.records.len(),
                    batch.destination
                );
                continue;
            };

            if let Destination::Peer(peer) = batch.destination {
                if !self.transport.is_peer_ready(peer) {
                    continue;
                }
            }

            let record_count = batch.records.len();
            let messages = bundle(sequence_id, batch.records, self.capacity.for_channel(batch.channel));
            debug::trace_bundle(&batch.destination, batch.channel, record_count, messages.len());

            for message in &messages {
                debug::log_message("Outgoing", message);
                let payload = encode_message(message);
                let size = payload.len();

                let result = match batch.destination {
                    Destination::Server => self.transport.send_to_server(batch.channel, payload),
                    Destination::All => self.transport.send_to_all(batch.channel, payload),
                    Destination::Peer(peer) => self.transport.send_to_peer(peer, batch.channel, payload),
                };

                match result {
                    Ok(()) => {
                        sent += 1;
                        self.stats.messages_sent += 1;
                        debug::trace_transport_send(size, &batch.destination);
                    }
                    Err(err) => {
                        self.stats.send_failures += 1;
                        log::warn!("failed to send sync message to {:?}: {}", batch.destination, err);
                    }
                }
            }
        }

        self.phase = TickPhase::Flushed;
        sent
    }

    /// Handles a message the server sent to this client.
    pub fn receive_from_server(&mut self, data: &[u8]) -> Result<DispatchReport> {
        debug::trace_transport_receive(data.len(), "server");
        let result = match self.handler.as_deref_mut() {
            Some(handler) => dispatch::receive(data, Origin::Server, &mut self.client_sequence, handler),
            None => dispatch::receive(data, Origin::Server, &mut self.client_sequence, &mut discard),
        };
        self.record_receive(&result);
        result
    }

    /// Handles a message a client sent to this server.
    pub fn receive_from_client(&mut self, peer: PeerId, data: &[u8]) -> Result<DispatchReport> {
        debug::trace_transport_receive(data.len(), &peer.to_string());
        let state = self.peer_sequences.state_mut(peer);
        let origin = Origin::Client(peer);
        let result = match self.handler.as_deref_mut() {
            Some(handler) => dispatch::receive(data, origin, state, handler),
            None => dispatch::receive(data, origin, state, &mut discard),
        };
        self.record_receive(&result);
        result
    }

    /// Forgets the sequence state of a client connection that ended.
    pub fn peer_disconnected(&mut self, peer: PeerId) {
        self.peer_sequences.remove(peer);
    }

    fn record_receive(&mut self, result: &Result<DispatchReport>) {
        match result {
            Ok(report) if report.stale => self.stats.stale_dropped += 1,
            Ok(_) => self.stats.messages_received += 1,
            Err(_) => self.stats.malformed_dropped += 1,
        }
    }

    /// Starts fresh sequence state whenever a role comes up or goes down.
    fn refresh_roles(&mut self) {
        let server_active = self.transport.is_server_active();
        if server_active != self.server_active {
            self.server_sequence.reset();
            self.peer_sequences.clear();
            log::debug!("server role {}", if server_active { "started" } else { "stopped" });
        }
        self.server_active = server_active;

        let client_active = self.transport.is_client_active();
        if client_active != self.client_active {
            self.client_sequence.reset();
            log::debug!("client role {}", if client_active { "started" } else { "stopped" });
        }
        self.client_active = client_active;
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    pub fn capacity(&self) -> BundleCapacity {
        self.capacity
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    pub fn pending_records(&self) -> usize {
        self.queue.len()
    }

    pub fn server_sequence(&self) -> &SequenceState {
        &self.server_sequence
    }

    pub fn client_sequence(&self) -> &SequenceState {
        &self.client_sequence
    }

    pub fn peer_sequence(&self, peer: PeerId) -> Option<&SequenceState> {
        self.peer_sequences.get(peer)
    }

    pub fn source_count(&self) -> usize {
        self.registry.len()
    }

    pub fn get_stats(&self) -> SyncStats {
        self.stats
    }

    pub fn get_config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn discard(_: Origin, _: EntityId, _: ComponentIndex, _: &SyncRecord) -> Result<()> {
    Ok(())
}
