use crate::error::{Result, SyncError};
use crate::protocol::{ComponentIndex, EntityId, Message, PeerId, SyncRecord};
use crate::sequence::SequenceState;
use crate::serialization::decode_message;

/// Which side of the link a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Server,
    Client(PeerId),
}

/// Applies decoded records to local entities.
///
/// Return [`SyncError::UnknownEntity`] when the id resolves to nothing and
/// [`SyncError::ComponentIndexMismatch`] when the entity has no component
/// at the index; both skip the record without affecting the rest.
pub trait RecordHandler {
    fn on_record(
        &mut self,
        origin: Origin,
        entity_id: EntityId,
        component_index: ComponentIndex,
        record: &SyncRecord,
    ) -> Result<()>;
}

impl<F> RecordHandler for F
where
    F: FnMut(Origin, EntityId, ComponentIndex, &SyncRecord) -> Result<()>,
{
    fn on_record(
        &mut self,
        origin: Origin,
        entity_id: EntityId,
        component_index: ComponentIndex,
        record: &SyncRecord,
    ) -> Result<()> {
        self(origin, entity_id, component_index, record)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub applied: usize,
    pub skipped: usize,
    pub stale: bool,
}

/// Decodes `data`, checks it against `state`, and hands each record to
/// `handler` in order. A malformed message is rejected before any record
/// is dispatched.
pub(crate) fn receive<H: RecordHandler + ?Sized>(
    data: &[u8],
    origin: Origin,
    state: &mut SequenceState,
    handler: &mut H,
) -> Result<DispatchReport> {
    let message = decode_message(data)?;

    if !state.accept_received(message.sequence_id) {
        return Ok(DispatchReport {
            stale: true,
            ..DispatchReport::default()
        });
    }

    Ok(dispatch(&message, origin, handler))
}

fn dispatch<H: RecordHandler + ?Sized>(message: &Message, origin: Origin, handler: &mut H) -> DispatchReport {
    let mut report = DispatchReport::default();

    for record in &message.records {
        match handler.on_record(origin, record.entity_id, record.component_index, record) {
            Ok(()) => report.applied += 1,
            Err(SyncError::UnknownEntity(_)) => report.skipped += 1,
            Err(err @ SyncError::ComponentIndexMismatch { .. }) => {
                log::warn!("{}", err);
                report.skipped += 1;
            }
            Err(err) => {
                log::debug!("record for entity {} skipped: {}", record.entity_id, err);
                report.skipped += 1;
            }
        }
    }

    report
}
