//! Content checksums for release artifacts

use crate::error::{KilnError, KilnResult};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// SHA-1 of a file's contents as 40 lowercase hex characters
pub fn sha1_file(path: &Path) -> KilnResult<String> {
    let mut file = File::open(path)
        .map_err(|e| KilnError::io(format!("opening {} for checksum", path.display()), e))?;

    let mut hasher = Sha1::new();
    let mut buffer = vec![0_u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| KilnError::io(format!("reading {} for checksum", path.display()), e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn sha1_known_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capi-1.87.8.tgz");
        fs::write(&path, b"lots of files").unwrap();

        assert_eq!(
            sha1_file(&path).unwrap(),
            "ba01716b40a3557d699d024d76c307e351e96829"
        );
    }

    #[test]
    fn sha1_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        assert_eq!(
            sha1_file(&path).unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn sha1_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(sha1_file(&dir.path().join("nope")).is_err());
    }
}
