use sha1::digest::DynDigest;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use crate::error::*;
use crate::pgp::algorithm::HashAlgorithm;

/// A streaming hasher for the subset of hash algorithms the verifier
/// supports. MD5 and the other legacy registrations parse but cannot be
/// used for verification.
pub(crate) struct Hasher {
    inner: Box<dyn DynDigest>,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Result<Self, SyncError> {
        let inner: Box<dyn DynDigest> = match algorithm {
            HashAlgorithm::Sha1 => Box::new(Sha1::default()),
            HashAlgorithm::Sha224 => Box::new(Sha224::default()),
            HashAlgorithm::Sha256 => Box::new(Sha256::default()),
            HashAlgorithm::Sha384 => Box::new(Sha384::default()),
            HashAlgorithm::Sha512 => Box::new(Sha512::default()),
            other => return Err(SyncError::UnsupportedAlgorithm(other.name().to_string())),
        };
        Ok(Self { inner })
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Vec<u8> {
        self.inner.finalize().to_vec()
    }
}
