//! Packet framing for the binary object stream.
//!
//! Both the legacy (old-format) and current (new-format) packet headers
//! from RFC 4880 are accepted on input; re-serialization always emits
//! new-format headers. Partial body lengths are not supported, which is
//! fine for key rings and detached signature lists where every packet
//! carries a definite length.

use std::io::{self, prelude::*};

use log::*;

use crate::error::*;

pub const TAG_SIGNATURE: u8 = 2;
pub const TAG_PUBLIC_KEY: u8 = 6;
pub const TAG_COMPRESSED_DATA: u8 = 8;
pub const TAG_MARKER: u8 = 10;
pub const TAG_TRUST: u8 = 12;
pub const TAG_USER_ID: u8 = 13;
pub const TAG_PUBLIC_SUBKEY: u8 = 14;
pub const TAG_USER_ATTRIBUTE: u8 = 17;

/// A raw packet: tag plus unparsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub tag: u8,
    pub body: Vec<u8>,
}

pub(crate) fn get_u8(reader: &mut impl Read) -> Result<u8, SyncError> {
    let mut byte = [0u8; 1];
    if let Err(e) = reader.read_exact(&mut byte) {
        return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
            SyncError::Eof
        } else {
            e.into()
        });
    }
    Ok(byte[0])
}

pub(crate) fn get_be_u16(reader: &mut impl Read) -> Result<u16, SyncError> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes)?;
    Ok(u16::from_be_bytes(bytes))
}

pub(crate) fn get_be_u32(reader: &mut impl Read) -> Result<u32, SyncError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Read one packet, or `None` at a clean end of stream.
pub fn read_packet(reader: &mut impl Read) -> Result<Option<Packet>, SyncError> {
    let ctb = match get_u8(reader) {
        Ok(ctb) => ctb,
        Err(SyncError::Eof) => return Ok(None),
        Err(e) => return Err(e),
    };
    if ctb & 0x80 == 0 {
        debug!("Invalid packet tag byte: {:02x}", ctb);
        return Err(SyncError::Parse);
    }
    let (tag, len) = if ctb & 0x40 != 0 {
        (ctb & 0x3f, read_new_format_length(reader)?)
    } else {
        let tag = (ctb >> 2) & 0x0f;
        let len = match ctb & 0x03 {
            0 => Some(get_u8(reader)? as usize),
            1 => Some(get_be_u16(reader)? as usize),
            2 => Some(get_be_u32(reader)? as usize),
            // Indeterminate length, body extends to the end of the stream
            _ => None,
        };
        (tag, len)
    };
    let body = match len {
        Some(len) => {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    SyncError::Eof
                } else {
                    SyncError::from(e)
                }
            })?;
            body
        }
        None => {
            let mut body = vec![];
            reader.read_to_end(&mut body)?;
            body
        }
    };
    Ok(Some(Packet { tag, body }))
}

fn read_new_format_length(reader: &mut impl Read) -> Result<Option<usize>, SyncError> {
    let b0 = get_u8(reader)?;
    match b0 {
        0..=191 => Ok(Some(b0 as usize)),
        192..=223 => {
            let b1 = get_u8(reader)?;
            Ok(Some(((b0 as usize - 192) << 8) + b1 as usize + 192))
        }
        255 => Ok(Some(get_be_u32(reader)? as usize)),
        _ => {
            debug!("Partial body lengths are not supported");
            Err(SyncError::Parse)
        }
    }
}

/// Serialize a packet with a new-format header.
pub fn write_packet(writer: &mut impl Write, tag: u8, body: &[u8]) -> Result<(), SyncError> {
    writer.write_all(&[0xc0 | (tag & 0x3f)])?;
    let len = body.len();
    if len < 192 {
        writer.write_all(&[len as u8])?;
    } else if len < 8384 {
        let adjusted = len - 192;
        writer.write_all(&[(adjusted >> 8) as u8 + 192, (adjusted & 0xff) as u8])?;
    } else {
        writer.write_all(&[255])?;
        writer.write_all(&(len as u32).to_be_bytes())?;
    }
    writer.write_all(body)?;
    Ok(())
}

/// Read a multi-precision integer, returning its minimal big-endian bytes.
pub fn read_mpi(reader: &mut impl Read) -> Result<Vec<u8>, SyncError> {
    let bits = get_be_u16(reader)? as usize;
    let len = (bits + 7) / 8;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Left-pad an MPI value to a fixed width, e.g. a curve scalar.
///
/// Returns `None` when the value is wider than the target.
pub(crate) fn left_pad<const N: usize>(bytes: &[u8]) -> Option<[u8; N]> {
    let bytes = {
        // MPIs may carry leading zero octets from sloppy producers
        let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        &bytes[first..]
    };
    if bytes.len() > N {
        return None;
    }
    let mut out = [0u8; N];
    out[N - bytes.len()..].copy_from_slice(bytes);
    Some(out)
}

/// A signature subpacket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    pub typ: u8,
    pub critical: bool,
    pub body: Vec<u8>,
}

pub const SUBPACKET_CREATION_TIME: u8 = 2;
pub const SUBPACKET_KEY_EXPIRATION: u8 = 9;
pub const SUBPACKET_ISSUER: u8 = 16;
pub const SUBPACKET_ISSUER_FINGERPRINT: u8 = 33;

/// Parse a subpacket area (the hashed or unhashed region of a signature).
pub fn read_subpackets(area: &[u8]) -> Result<Vec<Subpacket>, SyncError> {
    let mut reader = io::Cursor::new(area);
    let mut subpackets = vec![];
    loop {
        let b0 = match get_u8(&mut reader) {
            Ok(b0) => b0,
            Err(SyncError::Eof) => break,
            Err(e) => return Err(e),
        };
        let len = match b0 {
            0..=191 => b0 as usize,
            192..=254 => {
                let b1 = get_u8(&mut reader)?;
                ((b0 as usize - 192) << 8) + b1 as usize + 192
            }
            255 => get_be_u32(&mut reader)? as usize,
        };
        if len == 0 {
            return Err(SyncError::Parse);
        }
        let typ = get_u8(&mut reader)?;
        let mut body = vec![0u8; len - 1];
        reader.read_exact(&mut body)?;
        subpackets.push(Subpacket {
            typ: typ & 0x7f,
            critical: typ & 0x80 != 0,
            body,
        });
    }
    Ok(subpackets)
}
