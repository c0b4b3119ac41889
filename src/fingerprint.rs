//! Content fingerprints for change detection.
//!
//! The scanner's skip decision trusts these digests completely, so they are
//! always SHA-256 over the full byte contents, never a sample or an mtime.

use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Lowercase hex SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint a file by streaming it from disk. I/O errors are returned
/// as-is.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            fingerprint(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn single_byte_change_changes_digest() {
        let a = fingerprint(b"hello world");
        let b = fingerprint(b"hello worle");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn file_digest_matches_memory_digest() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(tmp.path(), &data).unwrap();
        assert_eq!(fingerprint_file(tmp.path()).unwrap(), fingerprint(&data));
    }

    #[test]
    fn missing_file_propagates_io_error() {
        let err = fingerprint_file(Path::new("/definitely/not/here.bin")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
