//! Binary framing for request and response envelopes.
//!
//! Frame layout: `OG`, version, channel, body length (u32 big-endian), bincode body,
//! checksum (sum of all preceding bytes mod 256).

use super::message::{RequestEnvelope, ResponseEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const MAGIC: [u8; 2] = *b"OG";
pub const VERSION: u8 = 1;
const HEADER_LEN: usize = 8;
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// Which channel a frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Request = 1,
    Response = 2,
}

impl Channel {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Channel::Request),
            2 => Some(Channel::Response),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },
    #[error("bad frame magic")]
    BadMagic,
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown channel byte {0}")]
    UnknownChannel(u8),
    #[error("frame on {found:?} channel, expected {expected:?}")]
    WrongChannel { expected: Channel, found: Channel },
    #[error("checksum mismatch: computed {computed}, frame carries {found}")]
    Checksum { computed: u8, found: u8 },
    #[error("frame body of {0} bytes exceeds limit")]
    TooLarge(usize),
    #[error("payload: {0}")]
    Payload(#[from] bincode::Error),
}

fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    (sum % 256) as u8
}

/// Serialize `value` into one frame on `channel`.
pub fn encode_frame<T: Serialize>(channel: Channel, value: &T) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(value)?;
    if body.len() > MAX_BODY_LEN {
        return Err(CodecError::TooLarge(body.len()));
    }
    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + 1);
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.push(channel as u8);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out.push(checksum(&out));
    Ok(out)
}

/// Parse one frame from the start of `buf`. Returns the value and bytes consumed.
pub fn decode_frame<T: DeserializeOwned>(
    expected: Channel,
    buf: &[u8],
) -> Result<(T, usize), CodecError> {
    if buf.len() < HEADER_LEN {
        return Err(CodecError::Incomplete {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }
    if buf[0..2] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    if buf[2] != VERSION {
        return Err(CodecError::UnsupportedVersion(buf[2]));
    }
    let found = Channel::from_byte(buf[3]).ok_or(CodecError::UnknownChannel(buf[3]))?;
    if found != expected {
        return Err(CodecError::WrongChannel { expected, found });
    }
    let body_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if body_len > MAX_BODY_LEN {
        return Err(CodecError::TooLarge(body_len));
    }
    let frame_len = HEADER_LEN + body_len + 1;
    if buf.len() < frame_len {
        return Err(CodecError::Incomplete {
            needed: frame_len,
            available: buf.len(),
        });
    }
    let computed = checksum(&buf[..frame_len - 1]);
    let found_sum = buf[frame_len - 1];
    if computed != found_sum {
        return Err(CodecError::Checksum {
            computed,
            found: found_sum,
        });
    }
    let value = bincode::deserialize(&buf[HEADER_LEN..HEADER_LEN + body_len])?;
    Ok((value, frame_len))
}

pub fn encode_request(req: &RequestEnvelope) -> Result<Vec<u8>, CodecError> {
    encode_frame(Channel::Request, req)
}

pub fn decode_request(buf: &[u8]) -> Result<(RequestEnvelope, usize), CodecError> {
    decode_frame(Channel::Request, buf)
}

pub fn encode_response(resp: &ResponseEnvelope) -> Result<Vec<u8>, CodecError> {
    encode_frame(Channel::Response, resp)
}

pub fn decode_response(buf: &[u8]) -> Result<(ResponseEnvelope, usize), CodecError> {
    decode_frame(Channel::Response, buf)
}

/// Audit frame: `hostname\tcategory\t` followed by the raw bytes.
pub fn encode_audit(hostname: &str, category: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hostname.len() + category.len() + 2 + payload.len());
    out.extend_from_slice(hostname.as_bytes());
    out.push(b'\t');
    out.extend_from_slice(category.as_bytes());
    out.push(b'\t');
    out.extend_from_slice(payload);
    out
}

/// Split an audit frame into hostname, category and payload.
pub fn decode_audit(buf: &[u8]) -> Option<(&str, &str, &[u8])> {
    let first = buf.iter().position(|&b| b == b'\t')?;
    let rest = &buf[first + 1..];
    let second = rest.iter().position(|&b| b == b'\t')?;
    let hostname = std::str::from_utf8(&buf[..first]).ok()?;
    let category = std::str::from_utf8(&rest[..second]).ok()?;
    Some((hostname, category, &rest[second + 1..]))
}
