//! Public key packets and key rings.

use std::io::{self, prelude::*};

use log::*;
use sha1::{Digest, Sha1};

use crate::error::*;
use crate::pgp::algorithm::PublicKeyAlgorithm;
use crate::pgp::packet::{self, Packet};
use crate::pgp::signature::{Signature, SIG_KEY_REVOCATION};

const ED25519_OID: &[u8] = &[0x2b, 0x06, 0x01, 0x04, 0x01, 0xda, 0x47, 0x0f, 0x01];
const NIST_P256_OID: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];

/// Parsed key material, reduced to what the verifier can actually use.
#[derive(Clone)]
pub(crate) enum KeyMaterial {
    Ed25519(ed25519_compact::PublicKey),
    EcdsaP256(p256::ecdsa::VerifyingKey),
    /// Parsed but not verifiable with this implementation.
    Unsupported,
}

/// A version 4 public key or subkey.
#[derive(Clone)]
pub struct PublicKey {
    pub key_id: u64,
    pub fingerprint: [u8; 20],
    pub algorithm: PublicKeyAlgorithm,
    /// Creation time, seconds since the Unix epoch.
    pub creation_time: u32,
    pub(crate) material: KeyMaterial,
}

impl PublicKey {
    /// Parse a public key packet body.
    pub fn parse(body: &[u8]) -> Result<Self, SyncError> {
        let mut reader = io::Cursor::new(body);
        let version = packet::get_u8(&mut reader)?;
        if version != 4 {
            return Err(SyncError::KeyRing(format!(
                "unsupported key packet version {}",
                version
            )));
        }
        let creation_time = packet::get_be_u32(&mut reader)?;
        let algorithm = PublicKeyAlgorithm::from(packet::get_u8(&mut reader)?);
        let material = Self::parse_material(algorithm, &mut reader)?;

        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update((body.len() as u16).to_be_bytes());
        hasher.update(body);
        let fingerprint: [u8; 20] = hasher.finalize().into();
        let key_id = u64::from_be_bytes(
            fingerprint[12..20]
                .try_into()
                .map_err(|_| SyncError::Parse)?,
        );

        Ok(Self {
            key_id,
            fingerprint,
            algorithm,
            creation_time,
            material,
        })
    }

    fn parse_material(
        algorithm: PublicKeyAlgorithm,
        reader: &mut impl Read,
    ) -> Result<KeyMaterial, SyncError> {
        match algorithm {
            PublicKeyAlgorithm::EdDsa => {
                let oid = read_curve_oid(reader)?;
                let point = packet::read_mpi(reader)?;
                if oid != ED25519_OID {
                    debug!("Unsupported EdDSA curve, treating key as unusable");
                    return Ok(KeyMaterial::Unsupported);
                }
                // Native point encoding: 0x40 prefix plus 32 bytes
                if point.len() != 33 || point[0] != 0x40 {
                    return Err(SyncError::KeyRing("malformed Ed25519 point".to_string()));
                }
                let pk = ed25519_compact::PublicKey::from_slice(&point[1..])
                    .map_err(|_| SyncError::KeyRing("invalid Ed25519 key".to_string()))?;
                Ok(KeyMaterial::Ed25519(pk))
            }
            PublicKeyAlgorithm::Ecdsa => {
                let oid = read_curve_oid(reader)?;
                let point = packet::read_mpi(reader)?;
                if oid != NIST_P256_OID {
                    debug!("Unsupported ECDSA curve, treating key as unusable");
                    return Ok(KeyMaterial::Unsupported);
                }
                let pk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
                    .map_err(|_| SyncError::KeyRing("invalid P-256 key".to_string()))?;
                Ok(KeyMaterial::EcdsaP256(pk))
            }
            PublicKeyAlgorithm::RsaGeneral
            | PublicKeyAlgorithm::RsaEncrypt
            | PublicKeyAlgorithm::RsaSign => {
                packet::read_mpi(reader)?;
                packet::read_mpi(reader)?;
                Ok(KeyMaterial::Unsupported)
            }
            PublicKeyAlgorithm::Dsa => {
                for _ in 0..4 {
                    packet::read_mpi(reader)?;
                }
                Ok(KeyMaterial::Unsupported)
            }
            _ => Ok(KeyMaterial::Unsupported),
        }
    }
}

fn read_curve_oid(reader: &mut impl Read) -> Result<Vec<u8>, SyncError> {
    let len = packet::get_u8(reader)? as usize;
    // 0 and 0xff are reserved markers, not lengths
    if len == 0 || len == 0xff {
        return Err(SyncError::Parse);
    }
    let mut oid = vec![0u8; len];
    reader.read_exact(&mut oid)?;
    Ok(oid)
}

/// A key ring: one primary key with its subkeys and attached signatures,
/// exactly as grouped in the object stream. The raw packets are retained
/// so a merged collection can be written back out losslessly.
#[derive(Clone)]
pub struct KeyRing {
    packets: Vec<Packet>,
    pub primary: PublicKey,
    pub subkeys: Vec<PublicKey>,
    /// A key revocation signature is attached to the primary key.
    pub revoked: bool,
    /// Validity window in seconds from the primary key's creation time.
    /// Zero means the ring never expires.
    pub valid_seconds: u32,
}

impl KeyRing {
    /// Assemble a ring from its packet run. The first packet must be a
    /// public key packet; signature packets that fail to parse are kept
    /// for re-serialization but carry no semantics.
    pub(crate) fn from_packets(packets: Vec<Packet>) -> Result<Self, SyncError> {
        let first = packets.first().ok_or(SyncError::Parse)?;
        if first.tag != packet::TAG_PUBLIC_KEY {
            return Err(SyncError::KeyRing(
                "key ring does not start with a public key packet".to_string(),
            ));
        }
        let primary = PublicKey::parse(&first.body)?;

        let mut subkeys = vec![];
        let mut revoked = false;
        // Expiry comes from the most recent self-signature
        let mut latest_self_sig: Option<Signature> = None;
        for p in &packets[1..] {
            match p.tag {
                packet::TAG_PUBLIC_SUBKEY => match PublicKey::parse(&p.body) {
                    Ok(subkey) => subkeys.push(subkey),
                    Err(e) => debug!("Skipping unparseable subkey packet: {}", e),
                },
                packet::TAG_SIGNATURE => {
                    let sig = match Signature::parse(&p.body) {
                        Ok(sig) => sig,
                        Err(e) => {
                            debug!("Skipping unparseable signature packet: {}", e);
                            continue;
                        }
                    };
                    let self_issued = sig.issuer.map_or(true, |id| id == primary.key_id);
                    if sig.sig_type == SIG_KEY_REVOCATION && self_issued {
                        revoked = true;
                    } else if self_issued && sig.is_certification() {
                        let newer = latest_self_sig
                            .as_ref()
                            .map_or(true, |prev| sig.created >= prev.created);
                        if newer {
                            latest_self_sig = Some(sig);
                        }
                    }
                }
                packet::TAG_USER_ID
                | packet::TAG_USER_ATTRIBUTE
                | packet::TAG_TRUST
                | packet::TAG_MARKER => {}
                other => debug!("Ignoring packet with tag {} inside key ring", other),
            }
        }
        let valid_seconds = latest_self_sig
            .and_then(|sig| sig.key_expiration)
            .unwrap_or(0);

        Ok(Self {
            packets,
            primary,
            subkeys,
            revoked,
            valid_seconds,
        })
    }

    /// Find a key in this ring by key id, searching the primary key and
    /// all subkeys.
    pub fn key_by_id(&self, key_id: u64) -> Option<&PublicKey> {
        if self.primary.key_id == key_id {
            return Some(&self.primary);
        }
        self.subkeys.iter().find(|k| k.key_id == key_id)
    }

    /// Whether the ring has expired at `now_unix`. A zero validity window
    /// never expires.
    pub fn has_expired(&self, now_unix: u64) -> bool {
        self.valid_seconds != 0
            && now_unix > self.primary.creation_time as u64 + self.valid_seconds as u64
    }

    /// Serialize the ring's packets with new-format framing.
    pub fn serialize(&self, writer: &mut impl Write) -> Result<(), SyncError> {
        for p in &self.packets {
            packet::write_packet(writer, p.tag, &p.body)?;
        }
        Ok(())
    }
}
