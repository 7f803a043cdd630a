//! Signature packets and detached signature verification.

use std::io::{self, prelude::*};

use ecdsa::signature::hazmat::PrehashVerifier;
use log::*;

use crate::error::*;
use crate::pgp::algorithm::{signature_name, HashAlgorithm, PublicKeyAlgorithm};
use crate::pgp::hash::Hasher;
use crate::pgp::key::{KeyMaterial, PublicKey};
use crate::pgp::packet::{self, Subpacket};

/// Signature over a binary document, the type a detached signature uses.
pub const SIG_BINARY: u8 = 0x00;
/// Key revocation signature.
pub const SIG_KEY_REVOCATION: u8 = 0x20;

const VERIFY_CHUNK_SIZE: usize = 65536;

#[derive(Clone)]
enum SigMaterial {
    Ed25519(ed25519_compact::Signature),
    EcdsaP256(p256::ecdsa::Signature),
    /// Parsed but not verifiable with this implementation.
    Unsupported,
}

/// A version 4 signature packet.
#[derive(Clone)]
pub struct Signature {
    pub sig_type: u8,
    pub key_algorithm: PublicKeyAlgorithm,
    pub hash_algorithm: HashAlgorithm,
    /// Issuer key id, from the issuer or issuer-fingerprint subpacket.
    pub issuer: Option<u64>,
    /// Signature creation time, seconds since the Unix epoch.
    pub created: u32,
    /// Key expiration time in seconds after key creation, when the hashed
    /// area carries one.
    pub key_expiration: Option<u32>,
    /// Raw hashed subpacket area, needed verbatim for digest computation.
    hashed_area: Vec<u8>,
    left16: [u8; 2],
    material: SigMaterial,
}

impl Signature {
    /// Parse a signature packet body.
    pub fn parse(body: &[u8]) -> Result<Self, SyncError> {
        let mut reader = io::Cursor::new(body);
        let version = packet::get_u8(&mut reader)?;
        if version != 4 {
            debug!("Unsupported signature packet version {}", version);
            return Err(SyncError::Parse);
        }
        let sig_type = packet::get_u8(&mut reader)?;
        let key_algorithm = PublicKeyAlgorithm::from(packet::get_u8(&mut reader)?);
        let hash_algorithm = HashAlgorithm::from(packet::get_u8(&mut reader)?);

        let hashed_len = packet::get_be_u16(&mut reader)? as usize;
        let mut hashed_area = vec![0u8; hashed_len];
        reader.read_exact(&mut hashed_area)?;
        let unhashed_len = packet::get_be_u16(&mut reader)? as usize;
        let mut unhashed_area = vec![0u8; unhashed_len];
        reader.read_exact(&mut unhashed_area)?;

        let mut left16 = [0u8; 2];
        reader.read_exact(&mut left16)?;

        let material = Self::parse_material(key_algorithm, &mut reader)?;

        let hashed = packet::read_subpackets(&hashed_area)?;
        let unhashed = packet::read_subpackets(&unhashed_area)?;
        let issuer = find_issuer(&hashed).or_else(|| find_issuer(&unhashed));
        let created = hashed
            .iter()
            .find(|sp| sp.typ == packet::SUBPACKET_CREATION_TIME)
            .and_then(|sp| sp.body.get(..4))
            .map(|b| u32::from_be_bytes(b.try_into().unwrap_or_default()))
            .unwrap_or(0);
        let key_expiration = hashed
            .iter()
            .find(|sp| sp.typ == packet::SUBPACKET_KEY_EXPIRATION)
            .and_then(|sp| sp.body.get(..4))
            .map(|b| u32::from_be_bytes(b.try_into().unwrap_or_default()));

        Ok(Self {
            sig_type,
            key_algorithm,
            hash_algorithm,
            issuer,
            created,
            key_expiration,
            hashed_area,
            left16,
            material,
        })
    }

    fn parse_material(
        key_algorithm: PublicKeyAlgorithm,
        reader: &mut impl Read,
    ) -> Result<SigMaterial, SyncError> {
        match key_algorithm {
            PublicKeyAlgorithm::EdDsa => {
                let r = packet::read_mpi(reader)?;
                let s = packet::read_mpi(reader)?;
                match (packet::left_pad::<32>(&r), packet::left_pad::<32>(&s)) {
                    (Some(r), Some(s)) => {
                        let mut raw = [0u8; 64];
                        raw[..32].copy_from_slice(&r);
                        raw[32..].copy_from_slice(&s);
                        Ok(SigMaterial::Ed25519(ed25519_compact::Signature::new(raw)))
                    }
                    // Wider scalars would be another curve, e.g. Ed448
                    _ => Ok(SigMaterial::Unsupported),
                }
            }
            PublicKeyAlgorithm::Ecdsa => {
                let r = packet::read_mpi(reader)?;
                let s = packet::read_mpi(reader)?;
                match (packet::left_pad::<32>(&r), packet::left_pad::<32>(&s)) {
                    (Some(r), Some(s)) => p256::ecdsa::Signature::from_scalars(r, s)
                        .map(SigMaterial::EcdsaP256)
                        .map_err(|_| SyncError::Parse),
                    _ => Ok(SigMaterial::Unsupported),
                }
            }
            PublicKeyAlgorithm::RsaGeneral
            | PublicKeyAlgorithm::RsaEncrypt
            | PublicKeyAlgorithm::RsaSign => {
                packet::read_mpi(reader)?;
                Ok(SigMaterial::Unsupported)
            }
            PublicKeyAlgorithm::Dsa => {
                packet::read_mpi(reader)?;
                packet::read_mpi(reader)?;
                Ok(SigMaterial::Unsupported)
            }
            _ => Ok(SigMaterial::Unsupported),
        }
    }

    /// Whether this is a certification or direct-key signature, the kinds
    /// that bind metadata such as expiry to a key.
    pub fn is_certification(&self) -> bool {
        matches!(self.sig_type, 0x10..=0x13 | 0x1f)
    }

    /// Compute the document digest: the streamed content followed by the
    /// version 4 signature trailer. The content is read to its end in
    /// fixed-size chunks with a single reused buffer.
    pub fn digest(&self, content: &mut impl Read) -> Result<Vec<u8>, SyncError> {
        let mut hasher = Hasher::new(self.hash_algorithm)?;
        let mut buf = vec![0u8; VERIFY_CHUNK_SIZE];
        loop {
            match content.read(&mut buf)? {
                0 => break,
                n => hasher.update(&buf[..n]),
            }
        }
        hasher.update(&[
            4,
            self.sig_type,
            u8::from(self.key_algorithm),
            u8::from(self.hash_algorithm),
        ]);
        hasher.update(&(self.hashed_area.len() as u16).to_be_bytes());
        hasher.update(&self.hashed_area);
        let hashed_len = 6 + self.hashed_area.len();
        hasher.update(&[0x04, 0xff]);
        hasher.update(&(hashed_len as u32).to_be_bytes());
        Ok(hasher.finalize())
    }

    /// Check this signature against a digest produced by [`Self::digest`].
    ///
    /// `Ok(false)` means the cryptographic check failed; an error means the
    /// key or signature algorithm is not supported by the verifier.
    pub fn check(&self, key: &PublicKey, digest: &[u8]) -> Result<bool, SyncError> {
        if digest.len() < 2 || digest[..2] != self.left16 {
            return Ok(false);
        }
        match (&key.material, &self.material) {
            (KeyMaterial::Ed25519(pk), SigMaterial::Ed25519(sig)) => {
                Ok(pk.verify(digest, sig).is_ok())
            }
            (KeyMaterial::EcdsaP256(pk), SigMaterial::EcdsaP256(sig)) => {
                Ok(pk.verify_prehash(digest, sig).is_ok())
            }
            _ => Err(SyncError::UnsupportedAlgorithm(signature_name(
                self.key_algorithm,
                self.hash_algorithm,
            ))),
        }
    }
}

fn find_issuer(subpackets: &[Subpacket]) -> Option<u64> {
    for sp in subpackets {
        if sp.typ == packet::SUBPACKET_ISSUER {
            if let Some(b) = sp.body.get(..8) {
                return Some(u64::from_be_bytes(b.try_into().unwrap_or_default()));
            }
        }
    }
    // Fall back to the v4 issuer fingerprint, whose low 64 bits are the id
    for sp in subpackets {
        if sp.typ == packet::SUBPACKET_ISSUER_FINGERPRINT && sp.body.len() == 21 && sp.body[0] == 4
        {
            if let Some(b) = sp.body.get(13..21) {
                return Some(u64::from_be_bytes(b.try_into().unwrap_or_default()));
            }
        }
    }
    None
}
