//! Integrity verification for completed transfers: `XCRC`/`XMD5`/`XSHA1`/
//! `XSHA256`/`HASH` selection and comparison against a digest recomputed
//! locally. Selection order when the caller doesn't pin an algorithm:
//! SHA256 > SHA1 > MD5 > CRC.

use crate::error::{FtpError, FtpResult};
use crate::types::HashAlgorithm;
use md5::{Digest as Md5Digest, Md5};
use sha1::Sha1;
use sha2::{Digest as Sha2Digest, Sha256};

/// Incrementally hashes a stream of chunks with one of the four
/// supported algorithms, selected once up front for the whole transfer.
pub enum IntegrityHasher {
    Crc32(crc32fast::Hasher),
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl IntegrityHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
            HashAlgorithm::Md5 => Self::Md5(Md5::new()),
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(chunk),
            Self::Md5(h) => h.update(chunk),
            Self::Sha1(h) => h.update(chunk),
            Self::Sha256(h) => h.update(chunk),
        }
    }

    /// Lowercase hex digest, matching the form FTP servers advertise for
    /// `XCRC`/`XMD5`/`XSHA1`/`XSHA256`/`HASH` responses.
    pub fn finalize_hex(self) -> String {
        match self {
            Self::Crc32(h) => format!("{:08x}", h.finalize()),
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Compare a locally computed digest to the server's reported digest,
/// case-insensitively (servers vary in hex casing).
pub fn verify(expected_from_server: &str, actual_local: &str) -> FtpResult<()> {
    if expected_from_server.eq_ignore_ascii_case(actual_local) {
        Ok(())
    } else {
        Err(FtpError::IntegrityError {
            expected: expected_from_server.to_string(),
            actual: actual_local.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hasher_matches_known_digest() {
        let mut hasher = IntegrityHasher::new(HashAlgorithm::Sha256);
        hasher.update(b"hello");
        let digest = hasher.finalize_hex();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn verify_is_case_insensitive() {
        assert!(verify("ABCDEF", "abcdef").is_ok());
        assert!(verify("abcdef", "111111").is_err());
    }
}
