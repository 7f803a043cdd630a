//! Wire-format fixtures: key rings and detached signatures built
//! byte-by-byte, independently of the parser under test.

#![allow(dead_code)]

use modsync::reexports::base64::engine::general_purpose::STANDARD as BASE64;
use modsync::reexports::base64::Engine;
use modsync::reexports::ed25519_compact;
use modsync::reexports::flate2::{write::ZlibEncoder, Compression};
use modsync::reexports::sha1::Sha1;
use modsync::reexports::sha2::{Digest, Sha256};

use std::io::Write;

const TAG_SIGNATURE: u8 = 2;
const TAG_PUBLIC_KEY: u8 = 6;
const TAG_COMPRESSED_DATA: u8 = 8;
const TAG_USER_ID: u8 = 13;

const ED25519_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0xda, 0x47, 0x0f, 0x01];

const SUBPACKET_CREATION_TIME: u8 = 2;
const SUBPACKET_KEY_EXPIRATION: u8 = 9;
const SUBPACKET_ISSUER: u8 = 16;

/// New-format packet framing, one- or two-octet lengths.
pub fn packet(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0xc0 | tag];
    let len = body.len();
    assert!(len < 8384, "fixture packets stay small");
    if len < 192 {
        out.push(len as u8);
    } else {
        let adjusted = len - 192;
        out.push((adjusted >> 8) as u8 + 192);
        out.push((adjusted & 0xff) as u8);
    }
    out.extend_from_slice(body);
    out
}

pub fn mpi(value: &[u8]) -> Vec<u8> {
    let first = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let value = &value[first..];
    let bits = match value.first() {
        None => 0,
        Some(&b) => (value.len() - 1) * 8 + (8 - b.leading_zeros() as usize),
    };
    let mut out = (bits as u16).to_be_bytes().to_vec();
    out.extend_from_slice(value);
    out
}

pub fn subpacket(typ: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![(body.len() + 1) as u8, typ];
    out.extend_from_slice(body);
    out
}

/// An Ed25519 test identity able to emit key rings and detached
/// signatures in wire format.
pub struct TestKey {
    kp: ed25519_compact::KeyPair,
    pub created: u32,
}

impl TestKey {
    pub fn generate() -> Self {
        Self::generate_at(1_600_000_000)
    }

    pub fn generate_at(created: u32) -> Self {
        Self {
            kp: ed25519_compact::KeyPair::generate(),
            created,
        }
    }

    /// Public key packet body, version 4.
    pub fn key_body(&self) -> Vec<u8> {
        let mut body = vec![4u8];
        body.extend_from_slice(&self.created.to_be_bytes());
        body.push(22); // EdDSA
        body.push(ED25519_OID.len() as u8);
        body.extend_from_slice(ED25519_OID);
        let mut point = vec![0x40u8];
        point.extend_from_slice(self.kp.pk.as_ref());
        body.extend_from_slice(&mpi(&point));
        body
    }

    /// The key id, the low 64 bits of the v4 fingerprint.
    pub fn key_id(&self) -> u64 {
        let body = self.key_body();
        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update((body.len() as u16).to_be_bytes());
        hasher.update(&body);
        let fingerprint = hasher.finalize();
        u64::from_be_bytes(fingerprint[12..20].try_into().unwrap())
    }

    /// A plain key ring: the key packet plus a user id.
    pub fn keyring(&self) -> Vec<u8> {
        let mut out = packet(TAG_PUBLIC_KEY, &self.key_body());
        out.extend_from_slice(&packet(TAG_USER_ID, b"Test Signer <signer@example.com>"));
        out
    }

    /// A key ring whose self-signature bounds validity to `valid_seconds`
    /// after key creation. The self-signature is structural only; the
    /// parser mines its subpackets without checking its cryptography.
    pub fn keyring_with_expiry(&self, valid_seconds: u32) -> Vec<u8> {
        let mut hashed = subpacket(SUBPACKET_CREATION_TIME, &self.created.to_be_bytes());
        hashed.extend_from_slice(&subpacket(
            SUBPACKET_KEY_EXPIRATION,
            &valid_seconds.to_be_bytes(),
        ));
        hashed.extend_from_slice(&subpacket(SUBPACKET_ISSUER, &self.key_id().to_be_bytes()));
        let sig = structural_signature(0x13, &hashed);

        let mut out = packet(TAG_PUBLIC_KEY, &self.key_body());
        out.extend_from_slice(&packet(TAG_USER_ID, b"Test Signer <signer@example.com>"));
        out.extend_from_slice(&packet(TAG_SIGNATURE, &sig));
        out
    }

    /// A key ring carrying a key revocation signature.
    pub fn keyring_revoked(&self) -> Vec<u8> {
        let mut hashed = subpacket(SUBPACKET_CREATION_TIME, &self.created.to_be_bytes());
        hashed.extend_from_slice(&subpacket(SUBPACKET_ISSUER, &self.key_id().to_be_bytes()));
        let sig = structural_signature(0x20, &hashed);

        let mut out = packet(TAG_PUBLIC_KEY, &self.key_body());
        out.extend_from_slice(&packet(TAG_SIGNATURE, &sig));
        out.extend_from_slice(&packet(TAG_USER_ID, b"Test Signer <signer@example.com>"));
        out
    }

    /// The key ring as an armored block, the shape key servers answer with.
    pub fn armored_keyring(&self) -> String {
        armor(&self.keyring())
    }

    /// A signature packet over `content`, with real cryptography.
    pub fn signature_packet(&self, content: &[u8]) -> Vec<u8> {
        let mut hashed = subpacket(SUBPACKET_CREATION_TIME, &1_650_000_000u32.to_be_bytes());
        hashed.extend_from_slice(&subpacket(SUBPACKET_ISSUER, &self.key_id().to_be_bytes()));

        let mut digest = Sha256::new();
        digest.update(content);
        digest.update([4u8, 0x00, 22, 8]);
        digest.update((hashed.len() as u16).to_be_bytes());
        digest.update(&hashed);
        digest.update([0x04, 0xff]);
        digest.update(((6 + hashed.len()) as u32).to_be_bytes());
        let digest = digest.finalize();

        let sig = self.kp.sk.sign(digest, None);

        let mut body = vec![4u8, 0x00, 22, 8];
        body.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
        body.extend_from_slice(&hashed);
        body.extend_from_slice(&0u16.to_be_bytes());
        body.extend_from_slice(&digest[..2]);
        body.extend_from_slice(&mpi(&sig.as_ref()[..32]));
        body.extend_from_slice(&mpi(&sig.as_ref()[32..]));
        packet(TAG_SIGNATURE, &body)
    }

    /// A complete detached signature stream for `content`.
    pub fn sign_detached(&self, content: &[u8]) -> Vec<u8> {
        self.signature_packet(content)
    }
}

/// A parseable signature packet with throwaway cryptographic material.
fn structural_signature(sig_type: u8, hashed: &[u8]) -> Vec<u8> {
    let mut body = vec![4u8, sig_type, 22, 8];
    body.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
    body.extend_from_slice(hashed);
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&[0, 0]);
    body.extend_from_slice(&mpi(&[1; 32]));
    body.extend_from_slice(&mpi(&[1; 32]));
    body
}

/// Wrap an object stream in a zlib compressed data packet.
pub fn wrap_zlib(stream: &[u8]) -> Vec<u8> {
    let mut body = vec![2u8];
    let mut encoder = ZlibEncoder::new(&mut body, Compression::default());
    encoder.write_all(stream).unwrap();
    encoder.finish().unwrap();
    packet(TAG_COMPRESSED_DATA, &body)
}

/// ASCII armor with a CRC-24 checksum line.
pub fn armor(data: &[u8]) -> String {
    let mut text = String::from("-----BEGIN PGP PUBLIC KEY BLOCK-----\n");
    text.push_str("Version: fixtures\n\n");
    for chunk in data.chunks(48) {
        text.push_str(&BASE64.encode(chunk));
        text.push('\n');
    }
    let crc = crc24(data);
    text.push('=');
    text.push_str(&BASE64.encode([(crc >> 16) as u8, (crc >> 8) as u8, crc as u8]));
    text.push_str("\n-----END PGP PUBLIC KEY BLOCK-----\n");
    text
}

fn crc24(data: &[u8]) -> u32 {
    let mut crc: u32 = 0x00b7_04ce;
    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= 0x0186_4cfb;
            }
        }
    }
    crc & 0x00ff_ffff
}
