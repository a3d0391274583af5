//! # Framing
//!
//! Messages on a byte stream are delimited by a 4-byte little-endian length
//! header. The header covers the payload only.

use crate::error::Error;
use crate::error::Result;

/// Size of the length header.
pub const HEADER_LEN: usize = 4;

/// Largest payload either side accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Builds the header for a payload of `len` bytes.
pub fn header(len: usize) -> Result<[u8; HEADER_LEN]> {
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    Ok((len as u32).to_le_bytes())
}

/// Reads the payload length out of a header.
pub fn payload_len(header: [u8; HEADER_LEN]) -> Result<usize> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    Ok(len)
}

/// Prefixes `payload` with its header.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&header(payload.len())?);
    out.extend_from_slice(payload);
    Ok(out)
}
