//! Envelope encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! Every envelope is a fixed-size little-endian blob, whatever its kind:
//!
//! ```text
//! time:i32  kind:i32  sender:i32
//! counts:    i32 × MAX_RESOURCE_KINDS
//! slots:     (id:i32, owner:i32, cooldown_remaining_ms:i32, available_at_secs:f64) × MAX_SLOTS
//! ```
//!
//! # Domain-Offset Kind Codes
//!
//! The domain is not a separate field. It is folded into the kind code:
//! `100 + 10 * domain + offset`, with offsets REQUEST = 0, ACK = 1,
//! RELEASE = 2 and the sibling return request = 3. Domain 0 therefore uses
//! 100/101/102/103 and domain 1 uses 110/111/112/113.

use crate::{Envelope, Intent, MessageKind, Payload, SlotRecord, MAX_RESOURCE_KINDS, MAX_SLOTS};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use cohort_types::{DomainId, LamportTime, PeerId};
use thiserror::Error;

/// Kind code of domain 0's REQUEST.
pub const KIND_BASE: i32 = 100;

/// Distance between the kind codes of consecutive domains.
pub const KIND_STRIDE: i32 = 10;

const OFFSET_REQUEST: i32 = 0;
const OFFSET_ACK: i32 = 1;
const OFFSET_RELEASE: i32 = 2;
const OFFSET_RETURN_REQUEST: i32 = 3;

const HEADER_SIZE: usize = 3 * 4;
const SLOT_RECORD_SIZE: usize = 3 * 4 + 8;

/// Size in bytes of every encoded envelope.
pub const ENVELOPE_SIZE: usize =
    HEADER_SIZE + MAX_RESOURCE_KINDS * 4 + MAX_SLOTS * SLOT_RECORD_SIZE;

/// Errors that can occur during envelope encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("envelope must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("unknown kind code: {0}")]
    UnknownKind(i32),

    #[error("negative {field}: {value}")]
    NegativeField { field: &'static str, value: i32 },

    #[error("{field} does not fit the wire format")]
    FieldOverflow { field: &'static str },
}

/// Compute the wire kind code for a kind in a domain.
pub fn kind_code(domain: DomainId, kind: MessageKind) -> Result<i32, WireError> {
    let offset = match kind {
        MessageKind::Request(Intent::Acquire) => OFFSET_REQUEST,
        MessageKind::Ack => OFFSET_ACK,
        MessageKind::Release => OFFSET_RELEASE,
        MessageKind::Request(Intent::Return) => OFFSET_RETURN_REQUEST,
    };

    i32::try_from(domain.0)
        .ok()
        .and_then(|d| d.checked_mul(KIND_STRIDE))
        .and_then(|d| d.checked_add(KIND_BASE + offset))
        .ok_or(WireError::FieldOverflow { field: "domain" })
}

/// Split a wire kind code back into its domain and kind.
pub fn parse_kind_code(code: i32) -> Result<(DomainId, MessageKind), WireError> {
    if code < KIND_BASE {
        return Err(WireError::UnknownKind(code));
    }

    let relative = code - KIND_BASE;
    let domain = DomainId((relative / KIND_STRIDE) as u32);
    let kind = match relative % KIND_STRIDE {
        OFFSET_REQUEST => MessageKind::Request(Intent::Acquire),
        OFFSET_ACK => MessageKind::Ack,
        OFFSET_RELEASE => MessageKind::Release,
        OFFSET_RETURN_REQUEST => MessageKind::Request(Intent::Return),
        _ => return Err(WireError::UnknownKind(code)),
    };

    Ok((domain, kind))
}

fn to_wire_int(field: &'static str, value: u32) -> Result<i32, WireError> {
    i32::try_from(value).map_err(|_| WireError::FieldOverflow { field })
}

fn from_wire_int(field: &'static str, value: i32) -> Result<u32, WireError> {
    u32::try_from(value).map_err(|_| WireError::NegativeField { field, value })
}

/// Encode an envelope to wire format.
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::with_capacity(ENVELOPE_SIZE);

    buf.put_i32_le(to_wire_int("time", envelope.time.0)?);
    buf.put_i32_le(kind_code(envelope.domain, envelope.kind)?);
    buf.put_i32_le(to_wire_int("sender", envelope.sender.0)?);

    for count in envelope.payload.counts {
        buf.put_i32_le(count);
    }

    for slot in &envelope.payload.slots {
        buf.put_i32_le(slot.id);
        buf.put_i32_le(slot.owner);
        buf.put_i32_le(slot.cooldown_remaining_ms);
        buf.put_f64_le(slot.available_at_secs);
    }

    debug_assert_eq!(buf.len(), ENVELOPE_SIZE);
    Ok(buf.freeze())
}

/// Decode an envelope from wire format.
pub fn decode_envelope(mut data: &[u8]) -> Result<Envelope, WireError> {
    if data.len() != ENVELOPE_SIZE {
        return Err(WireError::WrongLength {
            expected: ENVELOPE_SIZE,
            actual: data.len(),
        });
    }

    let time = LamportTime(from_wire_int("time", data.get_i32_le())?);
    let (domain, kind) = parse_kind_code(data.get_i32_le())?;
    let sender = PeerId(from_wire_int("sender", data.get_i32_le())?);

    let mut payload = Payload::empty();
    for count in payload.counts.iter_mut() {
        *count = data.get_i32_le();
    }
    for slot in payload.slots.iter_mut() {
        *slot = SlotRecord {
            id: data.get_i32_le(),
            owner: data.get_i32_le(),
            cooldown_remaining_ms: data.get_i32_le(),
            available_at_secs: data.get_f64_le(),
        };
    }

    Ok(Envelope {
        domain,
        kind,
        time,
        sender,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes_are_offset_per_domain() {
        assert_eq!(
            kind_code(DomainId(0), MessageKind::Request(Intent::Acquire)),
            Ok(100)
        );
        assert_eq!(kind_code(DomainId(0), MessageKind::Ack), Ok(101));
        assert_eq!(kind_code(DomainId(0), MessageKind::Release), Ok(102));
        assert_eq!(kind_code(DomainId(1), MessageKind::Ack), Ok(111));
        assert_eq!(
            kind_code(DomainId(1), MessageKind::Request(Intent::Return)),
            Ok(113)
        );

        assert_eq!(
            parse_kind_code(112),
            Ok((DomainId(1), MessageKind::Release))
        );
    }

    #[test]
    fn test_encode_decode_release_with_slots() {
        let mut payload = Payload::empty();
        payload.slots[0] = SlotRecord {
            id: 0,
            owner: SlotRecord::NO_OWNER,
            cooldown_remaining_ms: 750,
            available_at_secs: 12.5,
        };
        payload.slots[1] = SlotRecord {
            id: 1,
            owner: 2,
            cooldown_remaining_ms: 0,
            available_at_secs: 0.0,
        };
        let envelope = Envelope::release(DomainId(1), LamportTime(42), PeerId(2), payload);

        let bytes = encode_envelope(&envelope).unwrap();
        assert_eq!(bytes.len(), ENVELOPE_SIZE);

        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_every_kind_has_the_same_size() {
        let request = Envelope::request(DomainId(0), Intent::Acquire, LamportTime(1), PeerId(0));
        let ack = Envelope::ack(DomainId(0), LamportTime(2), PeerId(1));

        assert_eq!(encode_envelope(&request).unwrap().len(), ENVELOPE_SIZE);
        assert_eq!(encode_envelope(&ack).unwrap().len(), ENVELOPE_SIZE);
    }

    #[test]
    fn test_wrong_length() {
        let result = decode_envelope(&[0u8; 7]);
        assert_eq!(
            result,
            Err(WireError::WrongLength {
                expected: ENVELOPE_SIZE,
                actual: 7
            })
        );
    }

    #[test]
    fn test_unknown_kind() {
        let envelope = Envelope::ack(DomainId(0), LamportTime(1), PeerId(0));
        let mut bytes = encode_envelope(&envelope).unwrap().to_vec();

        // Offset 7 is not a kind in any domain.
        bytes[4..8].copy_from_slice(&107i32.to_le_bytes());
        assert_eq!(decode_envelope(&bytes), Err(WireError::UnknownKind(107)));

        bytes[4..8].copy_from_slice(&42i32.to_le_bytes());
        assert_eq!(decode_envelope(&bytes), Err(WireError::UnknownKind(42)));
    }

    #[test]
    fn test_negative_sender() {
        let envelope = Envelope::ack(DomainId(0), LamportTime(1), PeerId(0));
        let mut bytes = encode_envelope(&envelope).unwrap().to_vec();
        bytes[8..12].copy_from_slice(&(-3i32).to_le_bytes());

        assert_eq!(
            decode_envelope(&bytes),
            Err(WireError::NegativeField {
                field: "sender",
                value: -3
            })
        );
    }

    #[test]
    fn test_time_overflow() {
        let envelope = Envelope::ack(DomainId(0), LamportTime(u32::MAX), PeerId(0));
        assert_eq!(
            encode_envelope(&envelope),
            Err(WireError::FieldOverflow { field: "time" })
        );
    }
}
