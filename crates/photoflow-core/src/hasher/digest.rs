use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::hash::Hasher as _;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use tracing::warn;
use twox_hash::XxHash64;

use crate::error::Error;

/// Read buffer size; files are never loaded whole.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
    Blake3,
    Xxh64,
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            "xxh64" | "xxhash64" => Ok(Self::Xxh64),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
            Self::Xxh64 => "xxh64",
        };
        f.write_str(name)
    }
}

enum StreamHasher {
    Md5(md5::Context),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
    Xxh64(XxHash64),
}

impl StreamHasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            ChecksumAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            ChecksumAlgorithm::Xxh64 => Self::Xxh64(XxHash64::with_seed(0)),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(data),
            Self::Sha256(hasher) => hasher.update(data),
            Self::Blake3(hasher) => {
                hasher.update(data);
            }
            Self::Xxh64(hasher) => hasher.write(data),
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha256(hasher) => format!("{:x}", hasher.finalize()),
            Self::Blake3(hasher) => hasher.finalize().to_hex().to_string(),
            Self::Xxh64(hasher) => format!("{:016x}", hasher.finish()),
        }
    }
}

/// Stream `file` through `algorithm` in fixed-size chunks and return the lowercase hex digest.
pub fn try_checksum_file(file: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let mut f = File::open(file)?;
    let mut hasher = StreamHasher::new(algorithm);
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match f.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finish_hex())
}

/// Like [`try_checksum_file`], but an unreadable file (permissions, vanished mid-scan)
/// yields `None` instead of an error.
pub fn checksum_file(file: &Path, algorithm: ChecksumAlgorithm) -> Option<String> {
    match try_checksum_file(file, algorithm) {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!("Could not checksum '{}': {}", file.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn digest_of(content: &[u8], algorithm: ChecksumAlgorithm) -> String {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("f.bin");
        fs::write(&path, content).unwrap();
        checksum_file(&path, algorithm).unwrap()
    }

    #[test]
    fn test_zero_byte_reference_digests() {
        assert_eq!(
            digest_of(b"", ChecksumAlgorithm::Md5),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            digest_of(b"", ChecksumAlgorithm::Sha256),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            digest_of(b"", ChecksumAlgorithm::Blake3),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
        assert_eq!(digest_of(b"", ChecksumAlgorithm::Xxh64), "ef46db3751d8e999");
    }

    #[test]
    fn test_known_content_reference_digests() {
        assert_eq!(
            digest_of(b"abc", ChecksumAlgorithm::Md5),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digest_of(b"abc", ChecksumAlgorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_multi_chunk_matches_one_shot() {
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let expected = format!("{:x}", Sha256::digest(&content));
        assert_eq!(digest_of(&content, ChecksumAlgorithm::Sha256), expected);
    }

    #[test]
    fn test_unreadable_file_is_none() {
        let tmp = tempdir().unwrap();
        assert!(checksum_file(&tmp.path().join("gone.jpg"), ChecksumAlgorithm::Md5).is_none());
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!("MD5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert_eq!(
            "sha-256".parse::<ChecksumAlgorithm>().unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert!(matches!(
            "crc32".parse::<ChecksumAlgorithm>(),
            Err(Error::UnknownAlgorithm(_))
        ));
        assert_eq!(ChecksumAlgorithm::Blake3.to_string(), "blake3");
    }
}
