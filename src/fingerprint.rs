//! Source fingerprints for change detection
//!
//! Three strategies, from cheapest to strictest:
//! 1. Name: hash of the stored name (never touches disk)
//! 2. Signature: size + mtime of the file on disk
//! 3. Content: blake3 hash of the file content

use crate::error::{Error, Result};
use crate::record::SourceFile;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::SystemTime;

/// Opaque, comparable digest of a field's content
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// Nothing attached to the field
    Absent,
    Name(u64),
    Signature { size: u64, mtime: SystemTime },
    Content(String),
}

impl Fingerprint {
    pub fn is_absent(&self) -> bool {
        matches!(self, Fingerprint::Absent)
    }
}

/// Maps field content to a fingerprint
pub trait Fingerprinter: Send + Sync {
    fn fingerprint(&self, source: Option<&SourceFile>) -> Result<Fingerprint>;
}

/// Which fingerprinter a router is built with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintMode {
    #[default]
    Name,
    Signature,
    Content,
}

impl FingerprintMode {
    pub fn fingerprinter(self) -> Box<dyn Fingerprinter> {
        match self {
            FingerprintMode::Name => Box::new(NameFingerprinter),
            FingerprintMode::Signature => Box::new(SignatureFingerprinter),
            FingerprintMode::Content => Box::new(ContentFingerprinter),
        }
    }
}

/// Hashes the stored name only. Replacing a file under the same name is not
/// detected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameFingerprinter;

impl Fingerprinter for NameFingerprinter {
    fn fingerprint(&self, source: Option<&SourceFile>) -> Result<Fingerprint> {
        let Some(source) = source else {
            return Ok(Fingerprint::Absent);
        };
        let mut hasher = DefaultHasher::new();
        source.name.hash(&mut hasher);
        Ok(Fingerprint::Name(hasher.finish()))
    }
}

/// Size + mtime of the file (sufficient for almost every edit)
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureFingerprinter;

impl Fingerprinter for SignatureFingerprinter {
    fn fingerprint(&self, source: Option<&SourceFile>) -> Result<Fingerprint> {
        let Some(source) = source else {
            return Ok(Fingerprint::Absent);
        };
        let metadata = std::fs::metadata(&source.path)
            .map_err(|e| Error::fingerprint(&source.path, e))?;
        let mtime = metadata
            .modified()
            .map_err(|e| Error::fingerprint(&source.path, e))?;

        Ok(Fingerprint::Signature {
            size: metadata.len(),
            mtime,
        })
    }
}

/// blake3 digest of the file content
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentFingerprinter;

impl Fingerprinter for ContentFingerprinter {
    fn fingerprint(&self, source: Option<&SourceFile>) -> Result<Fingerprint> {
        match source {
            None => Ok(Fingerprint::Absent),
            Some(source) => Ok(Fingerprint::Content(hash_file(&source.path)?)),
        }
    }
}

/// Compute blake3 hash of file content
///
/// Uses memory mapping for large files
fn hash_file(path: &Path) -> Result<String> {
    use blake3::Hasher;
    use memmap2::MmapOptions;
    use std::fs::File;
    use std::io::{BufReader, Read};

    const MEMMAP_THRESHOLD: u64 = 10 * 1024 * 1024; // 10MB
    const BUFFER_SIZE: usize = 1024 * 1024; // 1MB

    let file = File::open(path).map_err(|e| Error::fingerprint(path, e))?;
    let file_size = file.metadata().map_err(|e| Error::fingerprint(path, e))?.len();

    let mut hasher = Hasher::new();

    if file_size >= MEMMAP_THRESHOLD {
        // Safety: the mapping is read-only and dropped before returning
        let mmap =
            unsafe { MmapOptions::new().map(&file) }.map_err(|e| Error::fingerprint(path, e))?;
        hasher.update(&mmap[..]);
        return Ok(hasher.finalize().to_hex().to_string());
    }

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| Error::fingerprint(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_source(dir: &TempDir, name: &str, content: &str) -> SourceFile {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        SourceFile::new(name, path)
    }

    #[test]
    fn test_absent_for_every_mode() {
        for mode in [
            FingerprintMode::Name,
            FingerprintMode::Signature,
            FingerprintMode::Content,
        ] {
            let fp = mode.fingerprinter().fingerprint(None).unwrap();
            assert!(fp.is_absent());
        }
    }

    #[test]
    fn test_name_fingerprint_follows_name() {
        let a = SourceFile::new("a.png", "/nonexistent/a.png");
        let b = SourceFile::new("b.png", "/nonexistent/a.png");

        let fp = NameFingerprinter;
        assert_eq!(fp.fingerprint(Some(&a)).unwrap(), fp.fingerprint(Some(&a)).unwrap());
        assert_ne!(fp.fingerprint(Some(&a)).unwrap(), fp.fingerprint(Some(&b)).unwrap());
        assert_ne!(fp.fingerprint(Some(&a)).unwrap(), Fingerprint::Absent);
    }

    #[test]
    fn test_content_fingerprint_same_content() {
        let temp_dir = TempDir::new().unwrap();
        let a = write_source(&temp_dir, "a.png", "hello world");
        let b = write_source(&temp_dir, "b.png", "hello world");

        let fp = ContentFingerprinter;
        assert_eq!(fp.fingerprint(Some(&a)).unwrap(), fp.fingerprint(Some(&b)).unwrap());
    }

    #[test]
    fn test_content_fingerprint_modified() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir, "a.png", "hello world");

        let fp = ContentFingerprinter;
        let before = fp.fingerprint(Some(&source)).unwrap();
        fs::write(&source.path, "hello world modified").unwrap();
        let after = fp.fingerprint(Some(&source)).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_signature_fingerprint_size_change() {
        let temp_dir = TempDir::new().unwrap();
        let source = write_source(&temp_dir, "a.png", "hello");

        let fp = SignatureFingerprinter;
        let before = fp.fingerprint(Some(&source)).unwrap();
        fs::write(&source.path, "hello, longer").unwrap();
        let after = fp.fingerprint(Some(&source)).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let source = SourceFile::new("gone.png", temp_dir.path().join("gone.png"));

        let result = ContentFingerprinter.fingerprint(Some(&source));
        assert!(matches!(result, Err(Error::Fingerprint { .. })));
        assert!(SignatureFingerprinter.fingerprint(Some(&source)).is_err());
    }
}
