//! Length-prefixed message framing and the on-disk record header (§4.4).

use crate::message::{Message, Operation};
use std::convert::TryInto;

/// Low 24 bits of the record magic, `"HMD"`.
const MAGIC: u32 = 0x484D44;
const HEADER_LEN: usize = 12;

#[derive(Debug, Clone)]
pub struct CodecError(pub String);

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "codec error: {}", self.0)
    }
}

impl std::error::Error for CodecError {}

fn operation_str(op: Option<Operation>) -> &'static str {
    match op {
        None => "",
        Some(Operation::Create) => "create",
        Some(Operation::Update) => "update",
        Some(Operation::Delete) => "delete",
        Some(Operation::Snapshot) => "snapshot",
    }
}

fn operation_from_str(s: &str) -> Option<Operation> {
    match s {
        "create" => Some(Operation::Create),
        "update" => Some(Operation::Update),
        "delete" => Some(Operation::Delete),
        "snapshot" => Some(Operation::Snapshot),
        _ => None,
    }
}

fn write_field(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u32).to_le_bytes());
    out.extend_from_slice(field);
}

fn read_field<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8], CodecError> {
    if *pos + 4 > buf.len() {
        return Err(CodecError("truncated length prefix".into()));
    }
    let len = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    if *pos + len > buf.len() {
        return Err(CodecError("truncated field".into()));
    }
    let field = &buf[*pos..*pos + len];
    *pos += len;
    Ok(field)
}

/// Encode a message into the uncompressed framing described in §4.4.
pub fn encode_message(message: &Message) -> Vec<u8> {
    let mut out = Vec::new();
    write_field(&mut out, message.id.as_bytes());
    write_field(&mut out, operation_str(message.operation).as_bytes());
    write_field(&mut out, message.table.as_bytes());
    write_field(&mut out, message.schema.as_bytes());
    write_field(&mut out, &message.before);
    write_field(&mut out, &message.after);
    write_field(&mut out, &message.payload);
    out.extend_from_slice(&(message.metadata.len() as u32).to_le_bytes());
    for (k, v) in &message.metadata {
        write_field(&mut out, k.as_bytes());
        write_field(&mut out, v.as_bytes());
    }
    out
}

/// Decode a message previously produced by [`encode_message`].
///
/// `data`/`operation`-as-enum round-trips losslessly; the dynamic `data` map (§9's tagged
/// values) is not part of this wire framing and is reset to empty on decode, matching the
/// spec's framing field list, which does not include it.
pub fn decode_message(buf: &[u8]) -> Result<Message, CodecError> {
    let mut pos = 0usize;
    let id = String::from_utf8_lossy(read_field(buf, &mut pos)?).into_owned();
    let operation = operation_from_str(&String::from_utf8_lossy(read_field(buf, &mut pos)?));
    let table = String::from_utf8_lossy(read_field(buf, &mut pos)?).into_owned();
    let schema = String::from_utf8_lossy(read_field(buf, &mut pos)?).into_owned();
    let before = read_field(buf, &mut pos)?.to_vec();
    let after = read_field(buf, &mut pos)?.to_vec();
    let payload = read_field(buf, &mut pos)?.to_vec();

    if pos + 4 > buf.len() {
        return Err(CodecError("truncated metadata count".into()));
    }
    let meta_count = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;

    let mut metadata = std::collections::BTreeMap::new();
    for _ in 0..meta_count {
        let key = String::from_utf8_lossy(read_field(buf, &mut pos)?).into_owned();
        let value = String::from_utf8_lossy(read_field(buf, &mut pos)?).into_owned();
        metadata.insert(key, value);
    }

    Ok(Message { id, operation, schema, table, before, after, payload, data: Default::default(), metadata })
}

/// Fixed 12-byte record header: magic+algorithm tag, uncompressed size, on-disk data length.
pub struct RecordHeader {
    pub algorithm_tag: u8,
    pub uncompressed_size: u32,
    pub data_len: u32,
}

impl RecordHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let magic_and_tag = MAGIC | ((self.algorithm_tag as u32) << 24);
        out[0..4].copy_from_slice(&magic_and_tag.to_le_bytes());
        out[4..8].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.data_len.to_le_bytes());
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError("truncated record header".into()));
        }
        let magic_and_tag = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let magic = magic_and_tag & 0x00FF_FFFF;
        if magic != MAGIC {
            return Err(CodecError(format!("bad magic: {:#x}", magic)));
        }
        let algorithm_tag = (magic_and_tag >> 24) as u8;
        let uncompressed_size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let data_len = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        Ok(Self { algorithm_tag, uncompressed_size, data_len })
    }
}

pub const RECORD_HEADER_LEN: usize = HEADER_LEN;
