//! Archive reading and writing utilities.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regpack_archive_schema::{Manifest, MANIFEST_FILE};
use regpack_common::{hash, Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tar::{Archive, Builder};
use tracing::info;

/// Extension of produced archive files.
pub const ARCHIVE_EXTENSION: &str = "regpack";

/// Name of the compressed blockchain payload at the archive root.
pub const BLOCKCHAIN_PAYLOAD_FILE: &str = "blockchain-data.tar.gz";

/// Compress a directory tree into a gzipped tarball.
pub fn pack_tree(src: &Path, out: &Path) -> Result<()> {
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(out)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.append_dir_all("", src)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Extract a gzipped tarball into a directory.
pub fn unpack_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .map_err(|e| Error::Archive(format!("cannot open archive {:?}: {}", archive_path, e)))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(dest)
        .map_err(|e| Error::Archive(format!("cannot extract {:?}: {}", archive_path, e)))?;
    Ok(())
}

/// Read just the manifest from an archive, without a full extraction.
pub fn read_manifest(archive_path: &Path) -> Result<Manifest> {
    let file = File::open(archive_path)
        .map_err(|e| Error::Archive(format!("cannot open archive {:?}: {}", archive_path, e)))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive
        .entries()
        .map_err(|e| Error::Archive(format!("unreadable archive {:?}: {}", archive_path, e)))?
    {
        let mut entry = entry.map_err(|e| Error::Archive(e.to_string()))?;
        let path = entry.path().map_err(|e| Error::Archive(e.to_string()))?;
        let name = path.to_string_lossy().trim_start_matches("./").to_string();
        if name == MANIFEST_FILE {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(serde_json::from_slice(&content)?);
        }
    }
    Err(Error::Archive(format!(
        "no {} found in {:?}",
        MANIFEST_FILE, archive_path
    )))
}

/// Compress the staged chain data into one payload and return its hash.
pub fn pack_blockchain_payload(src_dir: &Path, out: &Path) -> Result<String> {
    pack_tree(src_dir, out)?;
    let digest = hash::sha256_file(out)?;
    info!("Blockchain payload packed ({} bytes)", std::fs::metadata(out)?.len());
    Ok(digest)
}

/// Extract the blockchain payload into a directory.
pub fn unpack_blockchain_payload(payload: &Path, dest: &Path) -> Result<()> {
    unpack_archive(payload, dest)
}

/// One file whose content does not match its recorded checksum.
#[derive(Debug, Clone)]
pub struct ChecksumMismatch {
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for ChecksumMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "checksum mismatch for {}: expected {}, got {}",
            self.path, self.expected, self.actual
        )
    }
}

/// Verify every recorded checksum against the extracted tree.
///
/// Mismatches are reported, not fatal: import surfaces them as warnings and
/// continues.
pub fn verify_checksums(root: &Path, manifest: &Manifest) -> Result<Vec<ChecksumMismatch>> {
    let mut mismatches = Vec::new();

    for (rel, expected) in &manifest.checksums.files {
        let path = root.join(rel);
        let actual = if path.is_file() {
            hash::sha256_file(&path)?
        } else {
            "missing".to_string()
        };
        if actual != *expected {
            mismatches.push(ChecksumMismatch {
                path: rel.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    if let Some(expected) = &manifest.checksums.blockchain_payload {
        let payload = root.join(BLOCKCHAIN_PAYLOAD_FILE);
        let actual = if payload.is_file() {
            hash::sha256_file(&payload)?
        } else {
            "missing".to_string()
        };
        if actual != *expected {
            mismatches.push(ChecksumMismatch {
                path: BLOCKCHAIN_PAYLOAD_FILE.to_string(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    Ok(mismatches)
}
