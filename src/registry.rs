use crate::error::Result;
use crate::protocol::{Channel, Destination, PeerId, SyncRecord};

/// A record a source wants sent this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub destination: Destination,
    pub channel: Channel,
    pub record: SyncRecord,
}

impl OutboundRecord {
    pub fn to_server(record: SyncRecord, reliable: bool) -> Self {
        Self {
            destination: Destination::Server,
            channel: Channel::from_reliable(reliable),
            record,
        }
    }

    pub fn to_all(record: SyncRecord, reliable: bool) -> Self {
        Self {
            destination: Destination::All,
            channel: Channel::from_reliable(reliable),
            record,
        }
    }

    pub fn to_peer(peer: PeerId, record: SyncRecord, reliable: bool) -> Self {
        Self {
            destination: Destination::Peer(peer),
            channel: Channel::from_reliable(reliable),
            record,
        }
    }
}

/// Something that owns a transform and decides each tick whether to sync it.
pub trait TransformSource {
    /// Called once per tick. `fixed_step` is true when a fixed-timestep
    /// update ran during the frame.
    fn produce(&mut self, fixed_step: bool) -> Result<Option<OutboundRecord>>;
}

impl<F> TransformSource for F
where
    F: FnMut(bool) -> Result<Option<OutboundRecord>>,
{
    fn produce(&mut self, fixed_step: bool) -> Result<Option<OutboundRecord>> {
        self(fixed_step)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceHandle(u64);

struct Entry {
    handle: SourceHandle,
    source: Box<dyn TransformSource>,
}

/// Active transform sources, visited in registration order.
#[derive(Default)]
pub struct SourceRegistry {
    entries: Vec<Entry>,
    next_handle: u64,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn TransformSource>) -> SourceHandle {
        let handle = SourceHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Entry { handle, source });
        handle
    }

    pub fn unregister(&mut self, handle: SourceHandle) -> Option<Box<dyn TransformSource>> {
        let index = self.entries.iter().position(|e| e.handle == handle)?;
        Some(self.entries.remove(index).source)
    }

    pub fn contains(&self, handle: SourceHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (SourceHandle, &mut Box<dyn TransformSource>)> {
        self.entries.iter_mut().map(|e| (e.handle, &mut e.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    #[test]
    fn test_register_and_unregister() {
        let mut registry = SourceRegistry::new();
        let a = registry.register(Box::new(|_fixed: bool| -> Result<Option<OutboundRecord>> {
            Ok(None)
        }));
        let b = registry.register(Box::new(|_fixed: bool| -> Result<Option<OutboundRecord>> {
            Ok(Some(OutboundRecord::to_all(SyncRecord::new(1, 0), false)))
        }));

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.unregister(a).is_some());
        assert!(registry.unregister(a).is_none());
        assert!(!registry.contains(a));
        assert!(registry.contains(b));
    }

    #[test]
    fn test_registration_order() {
        let mut registry = SourceRegistry::new();
        for id in 0..3u32 {
            registry.register(Box::new(move |_fixed: bool| -> Result<Option<OutboundRecord>> {
                Ok(Some(OutboundRecord::to_server(SyncRecord::new(id, 0), true)))
            }));
        }

        let produced: Vec<u32> = registry
            .iter_mut()
            .filter_map(|(_, source)| source.produce(false).ok().flatten())
            .map(|outbound| outbound.record.entity_id)
            .collect();
        assert_eq!(produced, vec![0, 1, 2]);
    }

    #[test]
    fn test_source_error_is_returned() {
        let mut source = |_fixed: bool| -> Result<Option<OutboundRecord>> {
            Err(SyncError::SourceFailed("transform missing".to_string()))
        };
        assert!(source.produce(true).is_err());
    }
}
