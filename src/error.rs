use crate::protocol::{ComponentIndex, EntityId, PeerId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed record: needed {needed} bytes, {remaining} remaining")]
    MalformedRecord { needed: usize, remaining: usize },

    #[error("Unknown entity: {0}")]
    UnknownEntity(EntityId),

    #[error("Entity {entity_id} has no synchronized component at index {component_index}")]
    ComponentIndexMismatch {
        entity_id: EntityId,
        component_index: ComponentIndex,
    },

    #[error("Stale packet: last {last}, incoming {incoming}")]
    StalePacket { last: u16, incoming: u16 },

    #[error("Peer not ready: {0}")]
    PeerNotReady(PeerId),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Source failed: {0}")]
    SourceFailed(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, SyncError>;
