use crate::error::{Result, SyncError};
use crate::protocol::{Channel, PeerId};
use ahash::AHashSet;
use bytes::Bytes;

/// The delivery layer the sync core hands encoded messages to.
///
/// Roles, readiness and packet limits are queried every tick, so a
/// transport may change them at any time.
pub trait Transport {
    fn is_server_active(&self) -> bool;
    fn is_client_active(&self) -> bool;

    /// Largest packet the channel accepts, or `None` while still unknown.
    fn max_packet_size(&self, channel: Channel) -> Option<usize>;

    /// Whether a connected peer may receive sync messages yet.
    fn is_peer_ready(&self, peer: PeerId) -> bool;

    fn send_to_server(&mut self, channel: Channel, payload: Bytes) -> Result<()>;
    fn send_to_all(&mut self, channel: Channel, payload: Bytes) -> Result<()>;
    fn send_to_peer(&mut self, peer: PeerId, channel: Channel, payload: Bytes) -> Result<()>;
}

/// Where a payload was sent, as recorded by [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendTarget {
    Server,
    All,
    Peer(PeerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayload {
    pub target: SendTarget,
    pub channel: Channel,
    pub payload: Bytes,
}

/// In-process transport that records every send.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    server_active: bool,
    client_active: bool,
    reliable_limit: Option<usize>,
    unreliable_limit: Option<usize>,
    ready_peers: AHashSet<PeerId>,
    failing_peers: AHashSet<PeerId>,
    sent: Vec<SentPayload>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server() -> Self {
        Self {
            server_active: true,
            ..Self::default()
        }
    }

    pub fn client() -> Self {
        Self {
            client_active: true,
            ..Self::default()
        }
    }

    /// Acting as server and client at once.
    pub fn host() -> Self {
        Self {
            server_active: true,
            client_active: true,
            ..Self::default()
        }
    }

    pub fn set_server_active(&mut self, active: bool) {
        self.server_active = active;
    }

    pub fn set_client_active(&mut self, active: bool) {
        self.client_active = active;
    }

    pub fn set_packet_limits(&mut self, reliable: usize, unreliable: usize) {
        self.reliable_limit = Some(reliable);
        self.unreliable_limit = Some(unreliable);
    }

    pub fn set_peer_ready(&mut self, peer: PeerId, ready: bool) {
        if ready {
            self.ready_peers.insert(peer);
        } else {
            self.ready_peers.remove(&peer);
        }
    }

    /// Makes every send to `peer` fail.
    pub fn fail_sends_to(&mut self, peer: PeerId) {
        self.failing_peers.insert(peer);
    }

    pub fn sent(&self) -> &[SentPayload] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<SentPayload> {
        std::mem::take(&mut self.sent)
    }

    fn record(&mut self, target: SendTarget, channel: Channel, payload: Bytes) {
        self.sent.push(SentPayload {
            target,
            channel,
            payload,
        });
    }
}

impl Transport for MemoryTransport {
    fn is_server_active(&self) -> bool {
        self.server_active
    }

    fn is_client_active(&self) -> bool {
        self.client_active
    }

    fn max_packet_size(&self, channel: Channel) -> Option<usize> {
        match channel {
            Channel::Reliable => self.reliable_limit,
            Channel::Unreliable => self.unreliable_limit,
        }
    }

    fn is_peer_ready(&self, peer: PeerId) -> bool {
        self.ready_peers.contains(&peer)
    }

    fn send_to_server(&mut self, channel: Channel, payload: Bytes) -> Result<()> {
        if !self.client_active {
            return Err(SyncError::ConnectionClosed);
        }
        self.record(SendTarget::Server, channel, payload);
        Ok(())
    }

    fn send_to_all(&mut self, channel: Channel, payload: Bytes) -> Result<()> {
        if !self.server_active {
            return Err(SyncError::ConnectionClosed);
        }
        self.record(SendTarget::All, channel, payload);
        Ok(())
    }

    fn send_to_peer(&mut self, peer: PeerId, channel: Channel, payload: Bytes) -> Result<()> {
        if self.failing_peers.contains(&peer) {
            return Err(SyncError::Transport(format!("send to {} failed", peer)));
        }
        if !self.ready_peers.contains(&peer) {
            return Err(SyncError::PeerNotReady(peer));
        }
        self.record(SendTarget::Peer(peer), channel, payload);
        Ok(())
    }
}

#[cfg(feature = "async")]
pub mod channel {
    //! Hands outgoing payloads to an async I/O task through an unbounded
    //! channel, so the tick never waits on the network.

    use super::*;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Outgoing {
        pub target: SendTarget,
        pub channel: Channel,
        pub payload: Bytes,
    }

    pub struct ChannelTransport {
        sender: mpsc::UnboundedSender<Outgoing>,
        server_active: bool,
        client_active: bool,
        reliable_limit: Option<usize>,
        unreliable_limit: Option<usize>,
        ready_peers: AHashSet<PeerId>,
    }

    impl ChannelTransport {
        pub fn new(server_active: bool, client_active: bool) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
            let (sender, receiver) = mpsc::unbounded_channel();
            let transport = Self {
                sender,
                server_active,
                client_active,
                reliable_limit: None,
                unreliable_limit: None,
                ready_peers: AHashSet::new(),
            };
            (transport, receiver)
        }

        pub fn set_packet_limits(&mut self, reliable: usize, unreliable: usize) {
            self.reliable_limit = Some(reliable);
            self.unreliable_limit = Some(unreliable);
        }

        pub fn set_peer_ready(&mut self, peer: PeerId, ready: bool) {
            if ready {
                self.ready_peers.insert(peer);
            } else {
                self.ready_peers.remove(&peer);
            }
        }

        fn forward(&self, target: SendTarget, channel: Channel, payload: Bytes) -> Result<()> {
            self.sender
                .send(Outgoing {
                    target,
                    channel,
                    payload,
                })
                .map_err(|_| SyncError::ConnectionClosed)
        }
    }

    impl Transport for ChannelTransport {
        fn is_server_active(&self) -> bool {
            self.server_active
        }

        fn is_client_active(&self) -> bool {
            self.client_active
        }

        fn max_packet_size(&self, channel: Channel) -> Option<usize> {
            match channel {
                Channel::Reliable => self.reliable_limit,
                Channel::Unreliable => self.unreliable_limit,
            }
        }

        fn is_peer_ready(&self, peer: PeerId) -> bool {
            self.ready_peers.contains(&peer)
        }

        fn send_to_server(&mut self, channel: Channel, payload: Bytes) -> Result<()> {
            self.forward(SendTarget::Server, channel, payload)
        }

        fn send_to_all(&mut self, channel: Channel, payload: Bytes) -> Result<()> {
            self.forward(SendTarget::All, channel, payload)
        }

        fn send_to_peer(&mut self, peer: PeerId, channel: Channel, payload: Bytes) -> Result<()> {
            self.forward(SendTarget::Peer(peer), channel, payload)
        }
    }

}
