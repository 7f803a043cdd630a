//! Numeric algorithm registries from RFC 4880, mapped to display names.

use std::fmt;

/// A public key algorithm identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PublicKeyAlgorithm {
    RsaGeneral,
    RsaEncrypt,
    RsaSign,
    ElgamalEncrypt,
    Dsa,
    Ecdh,
    Ecdsa,
    ElgamalGeneral,
    DiffieHellman,
    EdDsa,
    Unknown(u8),
}

impl From<u8> for PublicKeyAlgorithm {
    fn from(v: u8) -> Self {
        match v {
            1 => PublicKeyAlgorithm::RsaGeneral,
            2 => PublicKeyAlgorithm::RsaEncrypt,
            3 => PublicKeyAlgorithm::RsaSign,
            16 => PublicKeyAlgorithm::ElgamalEncrypt,
            17 => PublicKeyAlgorithm::Dsa,
            18 => PublicKeyAlgorithm::Ecdh,
            19 => PublicKeyAlgorithm::Ecdsa,
            20 => PublicKeyAlgorithm::ElgamalGeneral,
            21 => PublicKeyAlgorithm::DiffieHellman,
            22 => PublicKeyAlgorithm::EdDsa,
            x => PublicKeyAlgorithm::Unknown(x),
        }
    }
}

impl From<PublicKeyAlgorithm> for u8 {
    fn from(v: PublicKeyAlgorithm) -> Self {
        match v {
            PublicKeyAlgorithm::RsaGeneral => 1,
            PublicKeyAlgorithm::RsaEncrypt => 2,
            PublicKeyAlgorithm::RsaSign => 3,
            PublicKeyAlgorithm::ElgamalEncrypt => 16,
            PublicKeyAlgorithm::Dsa => 17,
            PublicKeyAlgorithm::Ecdh => 18,
            PublicKeyAlgorithm::Ecdsa => 19,
            PublicKeyAlgorithm::ElgamalGeneral => 20,
            PublicKeyAlgorithm::DiffieHellman => 21,
            PublicKeyAlgorithm::EdDsa => 22,
            PublicKeyAlgorithm::Unknown(x) => x,
        }
    }
}

impl PublicKeyAlgorithm {
    /// Human-readable algorithm family name.
    pub fn name(&self) -> &'static str {
        match self {
            PublicKeyAlgorithm::RsaGeneral
            | PublicKeyAlgorithm::RsaEncrypt
            | PublicKeyAlgorithm::RsaSign => "RSA",
            PublicKeyAlgorithm::ElgamalEncrypt | PublicKeyAlgorithm::ElgamalGeneral => "ELGAMAL",
            PublicKeyAlgorithm::Dsa => "DSA",
            PublicKeyAlgorithm::Ecdh => "ECDH",
            PublicKeyAlgorithm::Ecdsa => "ECDSA",
            PublicKeyAlgorithm::DiffieHellman => "DIFFIE_HELLMAN",
            PublicKeyAlgorithm::EdDsa => "EDDSA",
            PublicKeyAlgorithm::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for PublicKeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A hash algorithm identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Ripemd160,
    DoubleSha,
    Md2,
    Tiger192,
    Haval5_160,
    Sha256,
    Sha384,
    Sha512,
    Sha224,
    Unknown(u8),
}

impl From<u8> for HashAlgorithm {
    fn from(v: u8) -> Self {
        match v {
            1 => HashAlgorithm::Md5,
            2 => HashAlgorithm::Sha1,
            3 => HashAlgorithm::Ripemd160,
            4 => HashAlgorithm::DoubleSha,
            5 => HashAlgorithm::Md2,
            6 => HashAlgorithm::Tiger192,
            7 => HashAlgorithm::Haval5_160,
            8 => HashAlgorithm::Sha256,
            9 => HashAlgorithm::Sha384,
            10 => HashAlgorithm::Sha512,
            11 => HashAlgorithm::Sha224,
            x => HashAlgorithm::Unknown(x),
        }
    }
}

impl From<HashAlgorithm> for u8 {
    fn from(v: HashAlgorithm) -> Self {
        match v {
            HashAlgorithm::Md5 => 1,
            HashAlgorithm::Sha1 => 2,
            HashAlgorithm::Ripemd160 => 3,
            HashAlgorithm::DoubleSha => 4,
            HashAlgorithm::Md2 => 5,
            HashAlgorithm::Tiger192 => 6,
            HashAlgorithm::Haval5_160 => 7,
            HashAlgorithm::Sha256 => 8,
            HashAlgorithm::Sha384 => 9,
            HashAlgorithm::Sha512 => 10,
            HashAlgorithm::Sha224 => 11,
            HashAlgorithm::Unknown(x) => x,
        }
    }
}

impl HashAlgorithm {
    /// Human-readable hash name.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Ripemd160 => "RIPEMD160",
            HashAlgorithm::DoubleSha => "DOUBLE-SHA",
            HashAlgorithm::Md2 => "MD2",
            HashAlgorithm::Tiger192 => "TIGER192",
            HashAlgorithm::Haval5_160 => "HAVAL-5-160",
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha384 => "SHA384",
            HashAlgorithm::Sha512 => "SHA512",
            HashAlgorithm::Sha224 => "SHA224",
            HashAlgorithm::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Combined name for log lines, e.g. `SHA256withEDDSA`.
pub fn signature_name(key: PublicKeyAlgorithm, hash: HashAlgorithm) -> String {
    format!("{}with{}", hash.name(), key.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_algorithm_roundtrip() {
        for id in [1u8, 2, 3, 16, 17, 18, 19, 20, 21, 22, 99] {
            let algo = PublicKeyAlgorithm::from(id);
            assert_eq!(u8::from(algo), id);
        }
    }

    #[test]
    fn test_hash_algorithm_roundtrip() {
        for id in 1u8..=12 {
            let algo = HashAlgorithm::from(id);
            assert_eq!(u8::from(algo), id);
        }
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(PublicKeyAlgorithm::from(1).name(), "RSA");
        assert_eq!(PublicKeyAlgorithm::from(3).name(), "RSA");
        assert_eq!(PublicKeyAlgorithm::from(17).name(), "DSA");
        assert_eq!(PublicKeyAlgorithm::from(19).name(), "ECDSA");
        assert_eq!(PublicKeyAlgorithm::from(22).name(), "EDDSA");
        assert_eq!(PublicKeyAlgorithm::from(20).name(), "ELGAMAL");
        assert_eq!(PublicKeyAlgorithm::from(42).name(), "UNKNOWN");

        assert_eq!(HashAlgorithm::from(2).name(), "SHA1");
        assert_eq!(HashAlgorithm::from(8).name(), "SHA256");
        assert_eq!(HashAlgorithm::from(10).name(), "SHA512");
        assert_eq!(HashAlgorithm::from(7).name(), "HAVAL-5-160");
        assert_eq!(HashAlgorithm::from(42).name(), "UNKNOWN");
    }

    #[test]
    fn test_signature_name() {
        assert_eq!(
            signature_name(PublicKeyAlgorithm::EdDsa, HashAlgorithm::Sha256),
            "SHA256withEDDSA"
        );
        assert_eq!(
            signature_name(PublicKeyAlgorithm::RsaGeneral, HashAlgorithm::Sha512),
            "SHA512withRSA"
        );
    }
}
