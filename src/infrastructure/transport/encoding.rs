use crate::infrastructure::transport::MessageEnvelope;
use crate::foundation::{ElectorError, Result};
use bincode::Options;

const WIRE_PROTOCOL_VERSION_V1: u16 = 1;

pub fn encode_envelope(envelope: &MessageEnvelope) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&WIRE_PROTOCOL_VERSION_V1.to_le_bytes());
    let bytes = bincode::DefaultOptions::new().with_fixint_encoding().serialize(envelope)?;
    out.extend_from_slice(&bytes);
    Ok(out)
}

pub fn decode_envelope(bytes: &[u8]) -> Result<MessageEnvelope> {
    if bytes.len() < 2 {
        return Err(ElectorError::Encoding { details: "message too short".to_string() });
    }
    let version = u16::from_le_bytes([bytes[0], bytes[1]]);
    if version != WIRE_PROTOCOL_VERSION_V1 {
        return Err(ElectorError::Encoding {
            details: format!("wire protocol version mismatch: expected {WIRE_PROTOCOL_VERSION_V1}, got {version}"),
        });
    }
    Ok(bincode::DefaultOptions::new().with_fixint_encoding().deserialize(&bytes[2..])?)
}
