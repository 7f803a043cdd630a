//! The trust store: a merged collection of public key rings and the
//! verification logic that decides whether signed content is admitted.

use std::collections::HashMap;
use std::fs::File;
use std::io::{prelude::*, SeekFrom};
use std::path::Path;

use ct_codecs::{Encoder, Hex};
use log::*;
use time::OffsetDateTime;

use crate::error::*;
use crate::hkp::KeyClient;
use crate::pgp::algorithm::signature_name;
use crate::pgp::{self, KeyRing, Signature};
use crate::clock::{SystemTimeSource, TimeSource};

/// The outcome of verifying one piece of content against its signature
/// list. Only [`VerifyOutcome::Valid`] admits the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    /// The cryptographic check failed; the content does not match the
    /// signature. The only outcome that indicates tampering.
    BadSignature,
    /// The signing key is absent from the store, or the key or hash
    /// algorithm is unsupported by the verifier.
    UnknownKey(u64),
    Revoked(u64),
    Expired(u64),
    /// Content could not be read back from disk.
    ReadFailed,
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Valid)
    }
}

/// Public key rings keyed by the key id of their primary key.
///
/// Built once at startup from the local ring file plus any key material
/// retrieved for the configured key ids, then read-only while entries are
/// verified. Retrieval by id is a convenience, not a trust decision: the
/// operator only lists ids whose keys they already intend to trust.
pub struct KeyStore {
    rings: HashMap<u64, KeyRing>,
    clock: Box<dyn TimeSource>,
}

impl KeyStore {
    /// Load the local key ring file (required) and merge in whatever the
    /// key servers return for the configured key ids. Later material for
    /// a primary key id replaces earlier material.
    pub fn load(
        path: &Path,
        key_servers: &[String],
        key_ids: &[String],
        client: &KeyClient,
    ) -> Result<Self, SyncError> {
        let mut input = File::open(path).map_err(|e| {
            SyncError::KeyRing(format!("cannot open key ring {}: {}", path.display(), e))
        })?;
        let mut rings = HashMap::new();
        merge(&mut rings, pgp::read_keyrings(&mut input)?);
        for key_id in key_ids {
            if let Some(fetched) = client.retrieve(key_id, key_servers) {
                merge(&mut rings, fetched);
            }
        }
        Ok(Self {
            rings,
            clock: Box::new(SystemTimeSource),
        })
    }

    /// Replace the clock used for expiry checks.
    pub fn with_time_source(mut self, clock: Box<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Log every key in the store at debug level.
    pub fn debug_dump(&self) {
        for ring in self.rings.values() {
            for key in std::iter::once(&ring.primary).chain(ring.subkeys.iter()) {
                debug!(
                    "Public key id = {:016X}, algo = {}, fingerprint = [{}]",
                    key.key_id,
                    key.algorithm,
                    Hex::encode_to_string(key.fingerprint)
                        .unwrap_or_else(|_| "<hex encoding error>".to_string())
                );
            }
        }
    }

    fn find(&self, key_id: u64) -> Option<(&KeyRing, &pgp::PublicKey)> {
        self.rings
            .values()
            .find_map(|ring| ring.key_by_id(key_id).map(|key| (ring, key)))
    }

    /// Verify `content` against a detached signature list.
    ///
    /// Every signature in the list must independently pass; the first
    /// failure decides the outcome. An empty list never passes.
    pub fn verify<R: Read + Seek>(&self, content: &mut R, sigs: &[Signature]) -> VerifyOutcome {
        if sigs.is_empty() {
            warn!("Empty signature list, verification automatically fails");
            return VerifyOutcome::BadSignature;
        }
        for sig in sigs {
            let key_id = sig.issuer.unwrap_or(0);
            let Some((ring, key)) = self.find(key_id) else {
                warn!(
                    "Cannot find key {:016X} in current key ring, or the key/hash algorithm is unknown/unsupported",
                    key_id
                );
                return VerifyOutcome::UnknownKey(key_id);
            };
            if let Err(e) = content.seek(SeekFrom::Start(0)) {
                warn!("Failed to read content while checking signature: {}", e);
                return VerifyOutcome::ReadFailed;
            }
            let digest = match sig.digest(content) {
                Ok(digest) => digest,
                Err(SyncError::Io(e)) => {
                    warn!("Failed to read content while checking signature: {}", e);
                    return VerifyOutcome::ReadFailed;
                }
                Err(_) => {
                    warn!(
                        "Cannot find key {:016X} in current key ring, or the key/hash algorithm is unknown/unsupported",
                        key_id
                    );
                    return VerifyOutcome::UnknownKey(key_id);
                }
            };
            let description = format!(
                "{} key {:016X}, made on {}",
                signature_name(sig.key_algorithm, sig.hash_algorithm),
                key_id,
                format_timestamp(sig.created)
            );
            match sig.check(key, &digest) {
                Err(_) => {
                    warn!(
                        "Cannot find key {:016X} in current key ring, or the key/hash algorithm is unknown/unsupported",
                        key_id
                    );
                    return VerifyOutcome::UnknownKey(key_id);
                }
                Ok(false) => {
                    warn!("Signature verification failed ({})", description);
                    return VerifyOutcome::BadSignature;
                }
                Ok(true) => {}
            }
            if ring.revoked {
                warn!(
                    "Signature verified ({}) but the key pair has been revoked",
                    description
                );
                return VerifyOutcome::Revoked(key_id);
            }
            if ring.has_expired(self.clock.now_unix()) {
                warn!(
                    "Signature verified ({}) but the key pair has expired",
                    description
                );
                return VerifyOutcome::Expired(key_id);
            }
            debug!("Signature verified: {}", description);
        }
        VerifyOutcome::Valid
    }

    /// Verify one cached artifact against its `<name>.sig` companion.
    /// Usable independently of a running sync cycle for spot re-checks.
    pub fn verify_file(&self, mod_file: &Path) -> bool {
        let name = mod_file.file_name().map(|n| n.to_string_lossy().into_owned());
        let name = name.as_deref().unwrap_or("<unnamed>");
        debug!("Verifying {}", name);
        let sig_path = sig_path_for(mod_file);
        let mut content = match File::open(mod_file) {
            Ok(file) => file,
            Err(_) => {
                warn!("Failed to read {}, verification automatically fails", name);
                return false;
            }
        };
        let sigs = match File::open(&sig_path)
            .map_err(SyncError::from)
            .and_then(|mut f| pgp::read_signatures(&mut f))
        {
            Ok(sigs) => sigs,
            Err(_) => {
                warn!(
                    "Failed to read signature for {}, verification automatically fails",
                    name
                );
                return false;
            }
        };
        if sigs.is_empty() {
            warn!(
                "Failed to load any signature for {}, check if you downloaded the wrong file",
                name
            );
            return false;
        }
        self.verify(&mut content, &sigs).is_valid()
    }

    /// Write the merged collection back to disk. Failure costs nothing but
    /// the persistence, so it is only logged.
    pub fn save(&self, path: &Path) {
        if let Err(e) = self.try_save(path) {
            warn!("Failed to save key store: {}", e);
        }
    }

    fn try_save(&self, path: &Path) -> Result<(), SyncError> {
        let mut file = File::create(path)?;
        for ring in self.rings.values() {
            ring.serialize(&mut file)?;
        }
        Ok(())
    }
}

/// The signature companion of a cached artifact.
pub(crate) fn sig_path_for(mod_file: &Path) -> std::path::PathBuf {
    let mut name = mod_file.file_name().unwrap_or_default().to_os_string();
    name.push(".sig");
    mod_file.with_file_name(name)
}

fn merge(rings: &mut HashMap<u64, KeyRing>, incoming: Vec<KeyRing>) {
    for ring in incoming {
        rings.insert(ring.primary.key_id, ring);
    }
}

fn format_timestamp(unix_secs: u32) -> String {
    OffsetDateTime::from_unix_timestamp(unix_secs as i64)
        .map(|t| t.to_string())
        .unwrap_or_else(|_| unix_secs.to_string())
}
