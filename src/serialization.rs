use crate::compression::{
    compress_quaternion, compressed_vector3_len, decompress_quaternion, read_compressed_vector3,
    write_compressed_vector3,
};
use crate::error::{Result, SyncError};
use crate::protocol::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Bytes in front of the records of every message: sequence id and record count.
pub const MESSAGE_HEADER_SIZE: usize = 4;

pub(crate) fn ensure_remaining<B: Buf>(buf: &B, needed: usize) -> Result<()> {
    let remaining = buf.remaining();
    if remaining < needed {
        return Err(SyncError::MalformedRecord { needed, remaining });
    }
    Ok(())
}

fn put_vector3<B: BufMut>(buf: &mut B, v: Vector3) {
    buf.put_f32_le(v.x);
    buf.put_f32_le(v.y);
    buf.put_f32_le(v.z);
}

fn get_vector3<B: Buf>(buf: &mut B) -> Result<Vector3> {
    ensure_remaining(buf, 12)?;
    Ok(Vector3::new(buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()))
}

fn put_entity_id<B: BufMut>(buf: &mut B, flags: SyncFlags, entity_id: EntityId) {
    match flags.id_width() {
        1 => buf.put_u8(entity_id as u8),
        2 => buf.put_u16_le(entity_id as u16),
        _ => buf.put_u32_le(entity_id),
    }
}

fn get_entity_id<B: Buf>(buf: &mut B, flags: SyncFlags) -> Result<EntityId> {
    let width = flags.id_width();
    ensure_remaining(buf, width)?;
    Ok(match width {
        1 => buf.get_u8() as EntityId,
        2 => buf.get_u16_le() as EntityId,
        _ => buf.get_u32_le(),
    })
}

fn vector3_len(flags: SyncFlags, v: &Vector3) -> usize {
    if flags.contains(SyncFlags::COMPRESS_SMALL) {
        compressed_vector3_len(v)
    } else {
        12
    }
}

/// Exact number of bytes `encode_record` writes for `record`.
pub fn encoded_len(record: &SyncRecord) -> usize {
    let flags = record.flags;
    let mut len = 1 + flags.id_width() + 1;

    if flags.contains(SyncFlags::POSITION) {
        len += vector3_len(flags, &record.position.unwrap_or_default());
    }
    if flags.contains(SyncFlags::ROTATION) {
        len += 4;
    }
    if flags.contains(SyncFlags::SCALE) {
        len += vector3_len(flags, &record.scale.unwrap_or(Vector3::ONE));
    }
    if flags.contains(SyncFlags::PLATFORM) {
        len += 4;
    }

    len
}

/// Writes one record. Flags decide which fields go out; a flagged field
/// with no value is written as its default (zero position, identity
/// rotation, unit scale, platform 0), so it decodes as `Some(default)`.
/// Records built through the `with_*` builders always round-trip.
pub fn encode_record<B: BufMut>(record: &SyncRecord, buf: &mut B) {
    let flags = record.flags;
    let compress = flags.contains(SyncFlags::COMPRESS_SMALL);

    buf.put_u8(flags.bits());
    put_entity_id(buf, flags, record.entity_id);
    buf.put_u8(record.component_index);

    if flags.contains(SyncFlags::POSITION) {
        let position = record.position.unwrap_or_default();
        if compress {
            write_compressed_vector3(buf, position);
        } else {
            put_vector3(buf, position);
        }
    }
    if flags.contains(SyncFlags::ROTATION) {
        buf.put_u32_le(compress_quaternion(record.rotation.unwrap_or_default()));
    }
    if flags.contains(SyncFlags::SCALE) {
        let scale = record.scale.unwrap_or(Vector3::ONE);
        if compress {
            write_compressed_vector3(buf, scale);
        } else {
            put_vector3(buf, scale);
        }
    }
    if flags.contains(SyncFlags::PLATFORM) {
        buf.put_u32_le(record.platform_id.unwrap_or(0));
    }
}

fn read_record<B: Buf>(buf: &mut B) -> Result<SyncRecord> {
    ensure_remaining(buf, 1)?;
    let flags = SyncFlags::from_bits(buf.get_u8());
    let compress = flags.contains(SyncFlags::COMPRESS_SMALL);

    let entity_id = get_entity_id(buf, flags)?;
    ensure_remaining(buf, 1)?;
    let component_index = buf.get_u8();

    let mut record = SyncRecord {
        flags,
        entity_id,
        component_index,
        position: None,
        rotation: None,
        scale: None,
        platform_id: None,
    };

    if flags.contains(SyncFlags::POSITION) {
        record.position = Some(if compress {
            read_compressed_vector3(buf)?
        } else {
            get_vector3(buf)?
        });
    }
    if flags.contains(SyncFlags::ROTATION) {
        ensure_remaining(buf, 4)?;
        record.rotation = Some(decompress_quaternion(buf.get_u32_le()));
    }
    if flags.contains(SyncFlags::SCALE) {
        record.scale = Some(if compress {
            read_compressed_vector3(buf)?
        } else {
            get_vector3(buf)?
        });
    }
    if flags.contains(SyncFlags::PLATFORM) {
        ensure_remaining(buf, 4)?;
        record.platform_id = Some(buf.get_u32_le());
    }

    Ok(record)
}

/// Decodes one record from the front of `data`, returning it with the
/// number of bytes consumed.
pub fn decode_record(data: &[u8]) -> Result<(SyncRecord, usize)> {
    let mut cursor = data;
    let record = read_record(&mut cursor)?;
    Ok((record, data.len() - cursor.len()))
}

/// `message` must hold at most `u16::MAX` records; [`crate::bundler::bundle`]
/// never builds a larger one.
pub fn encode_message(message: &Message) -> Bytes {
    let body: usize = message.records.iter().map(encoded_len).sum();
    let mut buf = BytesMut::with_capacity(MESSAGE_HEADER_SIZE + body);

    buf.put_u16_le(message.sequence_id);
    buf.put_u16_le(message.records.len() as u16);
    for record in &message.records {
        encode_record(record, &mut buf);
    }

    buf.freeze()
}

/// Decodes a whole message. Any truncated record fails the message as a whole.
pub fn decode_message(data: &[u8]) -> Result<Message> {
    let mut cursor = data;
    ensure_remaining(&cursor, MESSAGE_HEADER_SIZE)?;
    let sequence_id = cursor.get_u16_le();
    let count = cursor.get_u16_le() as usize;

    let mut records = Vec::with_capacity(count.min(cursor.len()));
    for _ in 0..count {
        records.push(read_record(&mut cursor)?);
    }

    Ok(Message { sequence_id, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::COMPRESSION_RESOLUTION;

    fn all_flag_combinations() -> impl Iterator<Item = SyncFlags> {
        (0u16..=255).map(|bits| SyncFlags::from_bits(bits as u8))
    }

    fn sample_record(flags: SyncFlags) -> SyncRecord {
        let entity_id = match flags.id_width() {
            1 => 200,
            2 => 40_000,
            _ => 3_000_000,
        };
        let mut record = SyncRecord::new(entity_id, 3);
        record.set_flags(flags);
        if flags.contains(SyncFlags::POSITION) {
            record.position = Some(Vector3::new(12.34, -1000.5, 0.07));
        }
        if flags.contains(SyncFlags::ROTATION) {
            record.rotation = Some(Quaternion::from_axis_angle(Vector3::new(0.0, 1.0, 0.0), 1.2));
        }
        if flags.contains(SyncFlags::SCALE) {
            record.scale = Some(Vector3::new(1.0, 2.5, -700.0));
        }
        if flags.contains(SyncFlags::PLATFORM) {
            record.platform_id = Some(77);
        }
        record
    }

    fn assert_vector_close(expected: Option<Vector3>, actual: Option<Vector3>, compressed: bool) {
        match (expected, actual) {
            (None, None) => {}
            (Some(e), Some(a)) => {
                for (e, a) in [(e.x, a.x), (e.y, a.y), (e.z, a.z)] {
                    if compressed && e.abs() <= crate::compression::MAX_COMPRESSION_VALUE {
                        assert!((e - a).abs() <= COMPRESSION_RESOLUTION, "{} vs {}", e, a);
                    } else {
                        assert_eq!(e, a);
                    }
                }
            }
            other => panic!("presence mismatch: {:?}", other),
        }
    }

    #[test]
    fn test_record_round_trip_all_flags() {
        for flags in all_flag_combinations() {
            let record = sample_record(flags);
            let mut buf = BytesMut::new();
            encode_record(&record, &mut buf);

            let (decoded, consumed) = decode_record(&buf).unwrap();
            let compressed = flags.contains(SyncFlags::COMPRESS_SMALL);

            assert_eq!(decoded.flags(), flags);
            assert_eq!(decoded.entity_id, record.entity_id);
            assert_eq!(decoded.component_index, record.component_index);
            assert_eq!(decoded.platform_id, record.platform_id);
            assert_vector_close(record.position, decoded.position, compressed);
            assert_vector_close(record.scale, decoded.scale, compressed);
            match (record.rotation, decoded.rotation) {
                (None, None) => {}
                (Some(e), Some(a)) => assert!(e.angle_to(&a) < 0.5),
                other => panic!("rotation presence mismatch: {:?}", other),
            }

            assert_eq!(consumed, buf.len());
            assert_eq!(consumed, encoded_len(&record));
        }
    }

    #[test]
    fn test_flagged_missing_fields_decode_as_defaults() {
        let mut record = SyncRecord::new(3, 0);
        let flags = record.flags()
            | SyncFlags::POSITION
            | SyncFlags::ROTATION
            | SyncFlags::SCALE
            | SyncFlags::PLATFORM;
        record.set_flags(flags);

        let mut buf = BytesMut::new();
        encode_record(&record, &mut buf);
        assert_eq!(buf.len(), encoded_len(&record));

        let (decoded, _) = decode_record(&buf).unwrap();
        assert_eq!(decoded.flags(), flags);
        assert_eq!(decoded.position, Some(Vector3::ZERO));
        assert_eq!(decoded.scale, Some(Vector3::ONE));
        assert_eq!(decoded.platform_id, Some(0));
        let rotation = decoded.rotation.unwrap();
        assert!(rotation.angle_to(&Quaternion::IDENTITY) < 0.5);
    }

    #[test]
    fn test_decode_consumes_only_its_record() {
        let first = SyncRecord::new(5, 0).with_position(Vector3::new(1.0, 2.0, 3.0)).compressed();
        let second = SyncRecord::new(9, 1).with_platform(4).settled();

        let mut buf = BytesMut::new();
        encode_record(&first, &mut buf);
        let split = buf.len();
        encode_record(&second, &mut buf);

        let (decoded_first, consumed) = decode_record(&buf).unwrap();
        assert_eq!(consumed, split);
        assert_eq!(decoded_first.entity_id, 5);

        let (decoded_second, consumed) = decode_record(&buf[split..]).unwrap();
        assert_eq!(consumed, buf.len() - split);
        assert_eq!(decoded_second, second);
    }

    #[test]
    fn test_entity_id_widths_on_wire() {
        let mut buf = BytesMut::new();
        encode_record(&SyncRecord::new(7, 0), &mut buf);
        assert_eq!(buf.len(), 3);

        buf.clear();
        encode_record(&SyncRecord::new(700, 0), &mut buf);
        assert_eq!(buf.len(), 4);
        assert_eq!(&buf[1..3], &700u16.to_le_bytes());

        buf.clear();
        encode_record(&SyncRecord::new(70_000, 0), &mut buf);
        assert_eq!(buf.len(), 6);
        assert_eq!(&buf[1..5], &70_000u32.to_le_bytes());
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let record = sample_record(SyncFlags::POSITION | SyncFlags::ROTATION | SyncFlags::PLATFORM);
        let mut buf = BytesMut::new();
        encode_record(&record, &mut buf);

        for cut in 0..buf.len() {
            let result = decode_record(&buf[..cut]);
            assert!(matches!(result, Err(SyncError::MalformedRecord { .. })), "cut at {}", cut);
        }
    }

    #[test]
    fn test_worst_case_record_fits_bundler_estimate() {
        let flags = SyncFlags::POSITION
            | SyncFlags::ROTATION
            | SyncFlags::SCALE
            | SyncFlags::PLATFORM
            | SyncFlags::COMPRESS_SMALL;
        let mut record = SyncRecord::new(u32::MAX, 0);
        record.set_flags(flags);
        record.position = Some(Vector3::new(1e6, 1e6, 1e6));
        record.scale = Some(Vector3::new(1e6, 1e6, 1e6));

        assert!(encoded_len(&record) <= crate::bundler::MAXIMUM_RECORD_SIZE);
    }

    #[test]
    fn test_message_round_trip() {
        let message = Message::new(
            513,
            vec![
                SyncRecord::new(1, 0).with_position(Vector3::new(1.0, 1.0, 1.0)),
                SyncRecord::new(300, 2).with_rotation(Quaternion::IDENTITY),
                SyncRecord::new(2, 0).settled(),
            ],
        );

        let bytes = encode_message(&message);
        assert_eq!(&bytes[0..2], &513u16.to_le_bytes());
        assert_eq!(&bytes[2..4], &3u16.to_le_bytes());

        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded.sequence_id, 513);
        assert_eq!(decoded.records.len(), 3);
        assert_eq!(decoded.records[0], message.records[0]);
        assert_eq!(decoded.records[2], message.records[2]);
    }

    #[test]
    fn test_truncated_message_is_discarded() {
        let message = Message::new(1, vec![SyncRecord::new(1, 0), SyncRecord::new(2, 0)]);
        let bytes = encode_message(&message);

        assert!(decode_message(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_message(&bytes[..3]).is_err());
    }
}
