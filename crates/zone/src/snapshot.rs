//! Chunked snapshot bootstrap format (spec §4.H / §6).
//!
//! A snapshot is a self-contained export of every entry in a zone at
//! compaction time, split into fixed-size chunks so a bootstrapping peer
//! can fetch and verify them independently. Layout under
//! `<root>/snapshots/`:
//!
//! ```text
//! manifest.json   {"format_tag","latest_commit_id","commit_count","chunk_count","total_size"}
//! chunk-000000
//! chunk-000001
//! ...
//! ```
//!
//! Each chunk is a flat sequence of entries:
//! `u32 path_len | path (utf8) | u32 data_len | data`, all little-endian.
//! `path` is the zone-relative key the entry should be restored under
//! (`"<key>/<commit_id>"`).

use crate::Zone;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dagstore_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

/// The format tag written into every manifest; bumped if the entry
/// encoding changes incompatibly.
pub const SNAPSHOT_FORMAT_TAG: u32 = 1;

/// Default maximum number of bytes buffered into a chunk before it is
/// flushed and a new one started.
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 8 * 1024 * 1024;

/// Snapshot manifest, written last so its presence marks the snapshot
/// complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
    /// Format tag for forward/backward compatibility checks.
    pub format_tag: u32,
    /// The most recent commit id included in this snapshot.
    pub latest_commit_id: String,
    /// Total number of commit-bearing entries included.
    pub commit_count: usize,
    /// Number of chunk files making up the snapshot.
    pub chunk_count: usize,
    /// Total size in bytes across all chunks.
    pub total_size: u64,
}

fn chunk_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("chunk-{index:06}"))
}

fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("manifest.json")
}

fn write_entry(w: &mut impl Write, path: &str, data: &[u8]) -> std::io::Result<usize> {
    let path_bytes = path.as_bytes();
    w.write_u32::<LittleEndian>(path_bytes.len() as u32)?;
    w.write_all(path_bytes)?;
    w.write_u32::<LittleEndian>(data.len() as u32)?;
    w.write_all(data)?;
    Ok(4 + path_bytes.len() + 4 + data.len())
}

fn read_entry(r: &mut impl Read) -> std::io::Result<Option<(String, Vec<u8>)>> {
    let path_len = match r.read_u32::<LittleEndian>() {
        Ok(n) => n,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut path_buf = vec![0u8; path_len as usize];
    r.read_exact(&mut path_buf)?;
    let path = String::from_utf8(path_buf).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let data_len = r.read_u32::<LittleEndian>()?;
    let mut data = vec![0u8; data_len as usize];
    r.read_exact(&mut data)?;
    Ok(Some((path, data)))
}

/// Write a full snapshot of `entries` (each `(zone_relative_path, data)`)
/// into `snapshots_dir`, chunked to roughly `chunk_size_bytes` each.
///
/// Crash-safe: every chunk and the manifest are written to a temp file,
/// fsynced, then renamed into place; the manifest is written last so a
/// reader never observes a partial snapshot as complete.
///
/// # Errors
///
/// Returns an error if any chunk or the manifest fails to write.
pub fn write_snapshot(
    snapshots_dir: &Path,
    latest_commit_id: &str,
    chunk_size_bytes: usize,
    entries: impl IntoIterator<Item = (String, Vec<u8>)>,
) -> Result<SnapshotManifest> {
    fs::create_dir_all(snapshots_dir)?;

    let mut chunk_index = 0usize;
    let mut current = Vec::new();
    let mut commit_count = 0usize;
    let mut total_size = 0u64;

    let flush = |dir: &Path, index: usize, buf: &[u8]| -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let final_path = chunk_path(dir, index);
        let temp_path = dir.join(format!(".chunk-{index:06}.tmp"));
        {
            let mut file = BufWriter::new(File::create(&temp_path)?);
            file.write_all(buf)?;
            file.flush()?;
            file.get_ref().sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;
        Ok(())
    };

    for (path, data) in entries {
        let entry_size = write_entry(&mut current, &path, &data)?;
        total_size += entry_size as u64;
        commit_count += 1;
        if current.len() >= chunk_size_bytes {
            flush(snapshots_dir, chunk_index, &current)?;
            chunk_index += 1;
            current.clear();
        }
    }
    if !current.is_empty() {
        flush(snapshots_dir, chunk_index, &current)?;
        chunk_index += 1;
    }

    let manifest = SnapshotManifest {
        format_tag: SNAPSHOT_FORMAT_TAG,
        latest_commit_id: latest_commit_id.to_string(),
        commit_count,
        chunk_count: chunk_index,
        total_size,
    };

    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
    let final_manifest = manifest_path(snapshots_dir);
    let temp_manifest = snapshots_dir.join(".manifest.json.tmp");
    {
        let mut file = File::create(&temp_manifest)?;
        file.write_all(&manifest_bytes)?;
        file.sync_all()?;
    }
    fs::rename(&temp_manifest, &final_manifest)?;

    Ok(manifest)
}

/// Read the manifest for a snapshot directory, if one exists.
///
/// # Errors
///
/// Returns [`Error::SnapshotManifestDecodingFailed`] if the manifest file
/// exists but is not valid JSON in the expected shape, rather than
/// silently treating the snapshot as absent — a malformed manifest is a
/// distinct failure from "no snapshot was ever taken".
pub fn read_manifest(snapshots_dir: &Path) -> Result<Option<SnapshotManifest>> {
    let path = manifest_path(snapshots_dir);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path)?;
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|_| Error::SnapshotManifestDecodingFailed)
}

/// Read every entry out of a snapshot, applying each to `zone` under its
/// recorded `(key, commit_id)` pair. `path` entries are expected in the
/// form `"<key>/<commit_id>"`, as written by [`write_snapshot`] via
/// [`entry_path`].
///
/// # Errors
///
/// Returns [`Error::UnsupportedSnapshotFormat`] if the manifest's
/// `format_tag` doesn't match [`SNAPSHOT_FORMAT_TAG`] rather than
/// attempting a best-effort decode of an encoding this build doesn't
/// know. Returns [`Error::SnapshotChunkMissing`] if the manifest names a
/// chunk that isn't present on disk.
pub fn restore_snapshot(snapshots_dir: &Path, zone: &dyn Zone) -> Result<SnapshotManifest> {
    let manifest = read_manifest(snapshots_dir)?.ok_or(Error::SnapshotManifestDecodingFailed)?;
    if manifest.format_tag != SNAPSHOT_FORMAT_TAG {
        return Err(Error::UnsupportedSnapshotFormat { found: manifest.format_tag, expected: SNAPSHOT_FORMAT_TAG });
    }

    for index in 0..manifest.chunk_count {
        let path = chunk_path(snapshots_dir, index);
        if !path.exists() {
            return Err(Error::SnapshotChunkMissing(index));
        }
        let mut reader = BufReader::new(File::open(&path)?);
        while let Some((entry_path, data)) = read_entry(&mut reader)? {
            let (key, commit_id) = split_entry_path(&entry_path)?;
            zone.store(key, commit_id, &data)?;
        }
    }
    Ok(manifest)
}

fn split_entry_path(path: &str) -> Result<(&str, &str)> {
    path.rsplit_once('/')
        .ok_or_else(|| Error::Internal(format!("malformed snapshot entry path: {path}")))
}

/// Build the zone-relative path a snapshot entry is recorded under.
pub fn entry_path(key: &str, commit_id: &str) -> String {
    format!("{key}/{commit_id}")
}

/// Encode a single entry's bytes directly, for callers streaming entries
/// without going through [`write_snapshot`] (e.g. incremental
/// appenders).
pub fn encode_entry(path: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    write_entry(&mut buf, path, data)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryZone;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_manifest_round_trips() {
        let dir = tempdir().unwrap();
        let entries = vec![
            (entry_path("versions", "c1"), b"commit1".to_vec()),
            (entry_path("versions", "c2"), b"commit2".to_vec()),
        ];
        let manifest = write_snapshot(dir.path(), "c2", DEFAULT_CHUNK_SIZE_BYTES, entries).unwrap();
        assert_eq!(manifest.commit_count, 2);
        assert_eq!(manifest.chunk_count, 1);

        let read_back = read_manifest(dir.path()).unwrap().unwrap();
        assert_eq!(read_back, manifest);
    }

    #[test]
    fn small_chunk_size_splits_into_multiple_chunks() {
        let dir = tempdir().unwrap();
        let entries: Vec<_> = (0..10)
            .map(|i| (entry_path("versions", &format!("c{i}")), vec![0u8; 100]))
            .collect();
        let manifest = write_snapshot(dir.path(), "c9", 256, entries).unwrap();
        assert!(manifest.chunk_count > 1);
    }

    #[test]
    fn restore_snapshot_repopulates_a_fresh_zone() {
        let dir = tempdir().unwrap();
        let entries = vec![
            (entry_path("values/v1", "c1"), b"payload-a".to_vec()),
            (entry_path("maps/k1", "c1"), b"payload-b".to_vec()),
        ];
        write_snapshot(dir.path(), "c1", DEFAULT_CHUNK_SIZE_BYTES, entries).unwrap();

        let zone = InMemoryZone::new();
        restore_snapshot(dir.path(), &zone).unwrap();
        assert_eq!(zone.get("values/v1", "c1").unwrap(), Some(b"payload-a".to_vec()));
        assert_eq!(zone.get("maps/k1", "c1").unwrap(), Some(b"payload-b".to_vec()));
    }

    #[test]
    fn missing_chunk_is_a_distinct_error() {
        let dir = tempdir().unwrap();
        let entries = vec![(entry_path("versions", "c1"), b"a".to_vec())];
        write_snapshot(dir.path(), "c1", DEFAULT_CHUNK_SIZE_BYTES, entries).unwrap();
        fs::remove_file(chunk_path(dir.path(), 0)).unwrap();

        let zone = InMemoryZone::new();
        let err = restore_snapshot(dir.path(), &zone).unwrap_err();
        assert!(matches!(err, Error::SnapshotChunkMissing(0)));
    }

    #[test]
    fn restore_rejects_a_manifest_from_an_unrecognized_format() {
        let dir = tempdir().unwrap();
        let entries = vec![(entry_path("versions", "c1"), b"a".to_vec())];
        let manifest = write_snapshot(dir.path(), "c1", DEFAULT_CHUNK_SIZE_BYTES, entries).unwrap();

        let mut tampered = manifest;
        tampered.format_tag = SNAPSHOT_FORMAT_TAG + 1;
        fs::write(manifest_path(dir.path()), serde_json::to_vec_pretty(&tampered).unwrap()).unwrap();

        let zone = InMemoryZone::new();
        let err = restore_snapshot(dir.path(), &zone).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSnapshotFormat { found, expected } if found == SNAPSHOT_FORMAT_TAG + 1 && expected == SNAPSHOT_FORMAT_TAG
        ));
    }

    #[test]
    fn reading_manifest_from_empty_dir_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_manifest(dir.path()).unwrap().is_none());
    }

    #[test]
    fn malformed_manifest_is_a_decoding_error_not_a_missing_snapshot() {
        let dir = tempdir().unwrap();
        fs::write(manifest_path(dir.path()), b"not json").unwrap();
        let err = read_manifest(dir.path()).unwrap_err();
        assert!(matches!(err, Error::SnapshotManifestDecodingFailed));
    }
}
