//! A minimal OpenPGP subset: enough packet parsing to verify detached
//! signatures against public key rings, including revocation and expiry
//! checks. Nothing here generates keys, reasons about the web of trust, or
//! touches encryption.

pub mod algorithm;
pub mod armor;
mod hash;
pub mod key;
pub mod packet;
pub mod signature;

use std::io::{self, prelude::*};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use log::*;

pub use key::{KeyRing, PublicKey};
pub use packet::Packet;
pub use signature::Signature;

use crate::error::*;

/// Read a whole object stream: armored or binary input, with an optional
/// leading compression wrapper that is unwrapped transparently.
///
/// The wrapper-or-not ambiguity has to be resolved before assuming the
/// top-level object type, for key rings and signature lists alike.
pub fn read_object_stream(input: &mut impl Read) -> Result<Vec<Packet>, SyncError> {
    let mut raw = vec![];
    input.read_to_end(&mut raw)?;
    let first = *raw.first().ok_or(SyncError::Eof)?;
    let binary = if armor::is_armored(first) {
        let text = std::str::from_utf8(&raw).map_err(|_| SyncError::Armor("not UTF-8"))?;
        armor::decode(text)?
    } else {
        raw
    };

    let packets = read_packets(&binary)?;
    match packets.first() {
        Some(p) if p.tag == packet::TAG_COMPRESSED_DATA => {
            let inner = decompress(&p.body)?;
            read_packets(&inner)
        }
        _ => Ok(packets),
    }
}

fn read_packets(data: &[u8]) -> Result<Vec<Packet>, SyncError> {
    let mut reader = io::Cursor::new(data);
    let mut packets = vec![];
    while let Some(p) = packet::read_packet(&mut reader)? {
        packets.push(p);
    }
    Ok(packets)
}

fn decompress(body: &[u8]) -> Result<Vec<u8>, SyncError> {
    let algorithm = *body.first().ok_or(SyncError::Eof)?;
    let compressed = &body[1..];
    let mut out = vec![];
    match algorithm {
        0 => out.extend_from_slice(compressed),
        1 => {
            DeflateDecoder::new(compressed).read_to_end(&mut out)?;
        }
        2 => {
            ZlibDecoder::new(compressed).read_to_end(&mut out)?;
        }
        3 => return Err(SyncError::UnsupportedAlgorithm("bzip2".to_string())),
        other => {
            return Err(SyncError::UnsupportedAlgorithm(format!(
                "compression id {}",
                other
            )))
        }
    }
    Ok(out)
}

/// Parse key ring material: every public key packet starts a new ring that
/// collects the packets following it. Loose packets before the first key
/// are ignored with a warning, matching lenient key server responses.
pub fn read_keyrings(input: &mut impl Read) -> Result<Vec<KeyRing>, SyncError> {
    let packets = read_object_stream(input)?;
    let mut rings = vec![];
    let mut current: Vec<Packet> = vec![];
    for p in packets {
        if p.tag == packet::TAG_PUBLIC_KEY {
            if !current.is_empty() {
                rings.push(KeyRing::from_packets(std::mem::take(&mut current))?);
            }
            current.push(p);
        } else if current.is_empty() {
            warn!("Invalid object (tag {}) found and ignored", p.tag);
        } else {
            current.push(p);
        }
    }
    if !current.is_empty() {
        rings.push(KeyRing::from_packets(current)?);
    }
    Ok(rings)
}

/// Parse a detached signature list. Any non-signature packet makes the
/// list unparseable; an unparseable list always fails verification later.
pub fn read_signatures(input: &mut impl Read) -> Result<Vec<Signature>, SyncError> {
    let packets = read_object_stream(input)?;
    let mut signatures = vec![];
    for p in packets {
        if p.tag != packet::TAG_SIGNATURE {
            debug!("Unexpected packet (tag {}) in signature list", p.tag);
            return Err(SyncError::Parse);
        }
        signatures.push(Signature::parse(&p.body)?);
    }
    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    fn sig_stream() -> Vec<u8> {
        let kp = ed25519_compact::KeyPair::generate();
        let body = signature::tests::ed25519_sig_body(&kp, b"content", 7);
        let mut out = vec![];
        packet::write_packet(&mut out, packet::TAG_SIGNATURE, &body).unwrap();
        out
    }

    #[test]
    fn test_read_signatures_plain() {
        let stream = sig_stream();
        let sigs = read_signatures(&mut io::Cursor::new(&stream[..])).unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].issuer, Some(7));
    }

    #[test]
    fn test_read_signatures_zlib_wrapped() {
        let stream = sig_stream();
        let mut compressed = vec![2u8];
        let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
        encoder.write_all(&stream).unwrap();
        encoder.finish().unwrap();
        let mut wrapped = vec![];
        packet::write_packet(&mut wrapped, packet::TAG_COMPRESSED_DATA, &compressed).unwrap();

        let sigs = read_signatures(&mut io::Cursor::new(&wrapped[..])).unwrap();
        assert_eq!(sigs.len(), 1);
    }

    #[test]
    fn test_read_signatures_uncompressed_wrapper() {
        let stream = sig_stream();
        let mut body = vec![0u8];
        body.extend_from_slice(&stream);
        let mut wrapped = vec![];
        packet::write_packet(&mut wrapped, packet::TAG_COMPRESSED_DATA, &body).unwrap();
        assert_eq!(
            read_signatures(&mut io::Cursor::new(&wrapped[..]))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_read_signatures_bzip2_wrapper_rejected() {
        let mut wrapped = vec![];
        packet::write_packet(&mut wrapped, packet::TAG_COMPRESSED_DATA, &[3u8, 0, 0]).unwrap();
        assert!(matches!(
            read_signatures(&mut io::Cursor::new(&wrapped[..])).unwrap_err(),
            SyncError::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn test_read_signatures_rejects_foreign_packet() {
        let mut stream = sig_stream();
        packet::write_packet(&mut stream, packet::TAG_USER_ID, b"stray").unwrap();
        assert!(read_signatures(&mut io::Cursor::new(&stream[..])).is_err());
    }

    #[test]
    fn test_read_object_stream_empty_input() {
        assert!(read_object_stream(&mut io::Cursor::new(&[][..])).is_err());
    }

    #[test]
    fn test_read_keyrings_groups_by_primary() {
        let kp1 = ed25519_compact::KeyPair::generate();
        let kp2 = ed25519_compact::KeyPair::generate();
        let mut stream = vec![];
        for kp in [&kp1, &kp2] {
            let mut pk = [0u8; 32];
            pk.copy_from_slice(kp.pk.as_ref());
            let body = key::tests::ed25519_key_body(1_600_000_000, &pk);
            packet::write_packet(&mut stream, packet::TAG_PUBLIC_KEY, &body).unwrap();
            packet::write_packet(&mut stream, packet::TAG_USER_ID, b"someone").unwrap();
        }
        let rings = read_keyrings(&mut io::Cursor::new(&stream[..])).unwrap();
        assert_eq!(rings.len(), 2);
        assert_ne!(rings[0].primary.key_id, rings[1].primary.key_id);
    }

    #[test]
    fn test_read_keyrings_skips_leading_noise() {
        let kp = ed25519_compact::KeyPair::generate();
        let mut pk = [0u8; 32];
        pk.copy_from_slice(kp.pk.as_ref());
        let mut stream = vec![];
        packet::write_packet(&mut stream, packet::TAG_MARKER, b"PGP").unwrap();
        let body = key::tests::ed25519_key_body(1_600_000_000, &pk);
        packet::write_packet(&mut stream, packet::TAG_PUBLIC_KEY, &body).unwrap();
        let rings = read_keyrings(&mut io::Cursor::new(&stream[..])).unwrap();
        assert_eq!(rings.len(), 1);
    }
}
