pub mod protocol;
pub mod compression;
pub mod serialization;
pub mod sequence;
pub mod queue;
pub mod bundler;
pub mod limits;
pub mod registry;
pub mod dispatch;
pub mod transport;
pub mod error;
pub mod sync;
pub mod debug;

pub use protocol::{
    EntityId, ComponentIndex, SequenceId, PeerId,
    Channel, Destination, SyncFlags,
    Vector3, Quaternion, SyncRecord, Message,
};

pub use compression::{
    CompressedAxes, compress_quaternion, decompress_quaternion,
    can_compress_vector3, MAX_COMPRESSION_VALUE, COMPRESSION_RESOLUTION,
};

pub use serialization::{
    encode_record, decode_record, encode_message, decode_message, encoded_len,
};

pub use sequence::{
    is_stale, SequenceGuard, SequenceState, SequenceTable, DEFAULT_RESET_RANGE,
};

pub use queue::{OutboundQueue, QueuedBatch, DrainedQueues};

pub use bundler::{
    bundle, BundleCapacity,
    MAXIMUM_RECORD_SIZE, MAXIMUM_RECORDS_PER_MESSAGE, HEADER_RESERVE, DEFAULT_MAXIMUM_PACKET_SIZE,
};

pub use limits::{Clock, SystemClock, ManualClock, LimitDiscovery, DiscoveryState};

pub use registry::{TransformSource, OutboundRecord, SourceHandle, SourceRegistry};

pub use dispatch::{RecordHandler, DispatchReport, Origin};

pub use transport::{Transport, MemoryTransport, SendTarget, SentPayload};

#[cfg(feature = "async")]
pub use transport::channel::{ChannelTransport, Outgoing};

pub use error::{SyncError, Result};

pub use sync::{TickDriver, SyncConfig, TickPhase, TickReport, SyncStats};

pub use debug::{
    init_debug_mode, is_debug_enabled, is_trace_enabled,
    log_message, trace_bundle, trace_tick, trace_capacity,
    trace_transport_send, trace_transport_receive,
    format_bytes, message_summary,
};
