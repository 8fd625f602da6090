//! Point-in-time archives of the transport's auth directory.
//!
//! Archives are gzip-compressed tarballs named `session-<UTC timestamp>.tar.gz`.
//! Archives are written to a `.partial` file first and renamed into place, so a
//! listing never sees half an archive.

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use okibot_core::error::OkibotError;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

const PREFIX: &str = "session-";
const SUFFIX: &str = ".tar.gz";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// One archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub path: PathBuf,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Disambiguates archives created within the same millisecond.
    seq: u32,
}

/// Creates, lists, prunes, and restores session archives.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    dir: PathBuf,
    /// Archives to keep after each snapshot. 0 = unlimited.
    keep_last: usize,
}

impl SnapshotManager {
    pub fn new(dir: impl Into<PathBuf>, keep_last: usize) -> Self {
        Self {
            dir: dir.into(),
            keep_last,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Archive `source` into a new uniquely named snapshot.
    ///
    /// Returns `Ok(None)` without touching the archive directory when `source`
    /// does not exist.
    pub async fn snapshot(&self, source: &Path) -> Result<Option<SnapshotRecord>, OkibotError> {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            debug!("snapshot skipped: {} does not exist", source.display());
            return Ok(None);
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let record = self.reserve_name(Utc::now()).await;
        let partial = partial_path(&record.path);
        let source = source.to_path_buf();
        let partial_for_task = partial.clone();

        let written = tokio::task::spawn_blocking(move || write_archive(&source, &partial_for_task))
            .await
            .map_err(|e| OkibotError::Snapshot(format!("archive task failed: {e}")))?;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        tokio::fs::rename(&partial, &record.path).await?;
        info!("session saved: {}", record.path.display());

        if let Err(e) = self.prune().await {
            warn!("snapshot retention failed: {e}");
        }
        Ok(Some(record))
    }

    /// Replace `dest` with the contents of `archive`.
    ///
    /// Extraction goes to a sibling staging directory first; `dest` is only
    /// removed once the whole archive unpacked cleanly.
    pub async fn restore(&self, archive: &Path, dest: &Path) -> Result<(), OkibotError> {
        if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
            return Err(OkibotError::Snapshot(format!(
                "archive not found: {}",
                archive.display()
            )));
        }

        let staging = staging_path(dest);
        if tokio::fs::try_exists(&staging).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&staging).await?;
        }
        tokio::fs::create_dir_all(&staging).await?;

        let archive_owned = archive.to_path_buf();
        let staging_for_task = staging.clone();
        let unpacked =
            tokio::task::spawn_blocking(move || unpack_archive(&archive_owned, &staging_for_task))
                .await
                .map_err(|e| OkibotError::Snapshot(format!("restore task failed: {e}")))?;

        if let Err(e) = unpacked {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(dest).await?;
        }
        tokio::fs::rename(&staging, dest).await?;
        info!(
            "session restored from {} into {}",
            archive.display(),
            dest.display()
        );
        Ok(())
    }

    /// Restore the newest archive, if there is one.
    pub async fn restore_latest(&self, dest: &Path) -> Result<Option<SnapshotRecord>, OkibotError> {
        match self.latest().await? {
            Some(record) => {
                self.restore(&record.path, dest).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Restore the newest archive only when `dest` is missing or empty.
    ///
    /// A populated directory holds a session that may be newer than any
    /// archive, so it is left untouched.
    pub async fn restore_if_absent(&self, dest: &Path) -> Result<StartupRestore, OkibotError> {
        if has_entries(dest).await? {
            return Ok(StartupRestore::Kept);
        }
        Ok(match self.restore_latest(dest).await? {
            Some(record) => StartupRestore::Restored(record),
            None => StartupRestore::NoArchive,
        })
    }

    /// All archives, oldest first.
    pub async fn list(&self) -> Result<Vec<SnapshotRecord>, OkibotError> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((created_at, seq)) = parse_archive_name(&name) {
                records.push(SnapshotRecord {
                    path: entry.path(),
                    name,
                    created_at,
                    seq,
                });
            }
        }
        records.sort_by(|a, b| (a.created_at, a.seq).cmp(&(b.created_at, b.seq)));
        Ok(records)
    }

    pub async fn latest(&self) -> Result<Option<SnapshotRecord>, OkibotError> {
        Ok(self.list().await?.pop())
    }

    /// Store an uploaded archive as the newest snapshot after checking it unpacks.
    pub async fn import(&self, bytes: Vec<u8>) -> Result<SnapshotRecord, OkibotError> {
        let bytes = tokio::task::spawn_blocking(move || validate_archive(&bytes).map(|_| bytes))
            .await
            .map_err(|e| OkibotError::Snapshot(format!("import task failed: {e}")))??;

        tokio::fs::create_dir_all(&self.dir).await?;
        let record = self.reserve_name(Utc::now()).await;
        let partial = partial_path(&record.path);
        tokio::fs::write(&partial, bytes).await?;
        tokio::fs::rename(&partial, &record.path).await?;
        info!("session archive imported: {}", record.path.display());
        Ok(record)
    }

    /// Delete the oldest archives beyond `keep_last`. Returns how many were removed.
    pub async fn prune(&self) -> Result<usize, OkibotError> {
        if self.keep_last == 0 {
            return Ok(0);
        }
        let records = self.list().await?;
        if records.len() <= self.keep_last {
            return Ok(0);
        }
        let excess = records.len() - self.keep_last;
        for record in &records[..excess] {
            tokio::fs::remove_file(&record.path).await?;
            debug!("pruned old snapshot {}", record.name);
        }
        Ok(excess)
    }

    async fn reserve_name(&self, now: DateTime<Utc>) -> SnapshotRecord {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let mut seq = 0u32;
        loop {
            let name = archive_name(&stamp, seq);
            let path = self.dir.join(&name);
            let taken = tokio::fs::try_exists(&path).await.unwrap_or(false)
                || tokio::fs::try_exists(partial_path(&path))
                    .await
                    .unwrap_or(false);
            if !taken {
                return SnapshotRecord {
                    path,
                    name,
                    created_at: now,
                    seq,
                };
            }
            seq += 1;
        }
    }
}

fn archive_name(stamp: &str, seq: u32) -> String {
    if seq == 0 {
        format!("{PREFIX}{stamp}{SUFFIX}")
    } else {
        format!("{PREFIX}{stamp}-{seq}{SUFFIX}")
    }
}

/// Parse `session-<stamp>[-<seq>].tar.gz` into its timestamp and sequence number.
fn parse_archive_name(name: &str) -> Option<(DateTime<Utc>, u32)> {
    let inner = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
    let z = inner.find('Z')?;
    let (stamp, rest) = inner.split_at(z + 1);
    let seq = match rest {
        "" => 0,
        r => r.strip_prefix('-')?.parse().ok()?,
    };
    let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((naive.and_utc(), seq))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".partial");
    PathBuf::from(s)
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "auth".to_string());
    dest.with_file_name(format!(".{name}.restoring"))
}

fn write_archive(source: &Path, out: &Path) -> Result<(), OkibotError> {
    let file = std::fs::File::create(out)?;
    let encoder = GzEncoder::new(file, Compression::best());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(".", source)
        .map_err(|e| OkibotError::Snapshot(format!("failed to archive {}: {e}", source.display())))?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(())
}

/// Map an archive entry path to a relative path, rejecting anything that could
/// escape the destination. `Ok(None)` for the root entry itself.
fn sanitize_entry_path(path: &Path) -> Result<Option<PathBuf>, OkibotError> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => clean.push(part),
            _ => {
                return Err(OkibotError::Snapshot(format!(
                    "archive entry escapes destination: {}",
                    path.display()
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(clean))
    }
}

fn unpack_archive(archive: &Path, dest: &Path) -> Result<(), OkibotError> {
    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let entries = tar
        .entries()
        .map_err(|e| OkibotError::Snapshot(format!("unreadable archive: {e}")))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| OkibotError::Snapshot(format!("corrupt archive entry: {e}")))?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            warn!("skipping link entry in session archive");
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(relative) = sanitize_entry_path(&path)? else {
            continue;
        };
        let target = dest.join(&relative);

        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .map_err(|e| OkibotError::Snapshot(format!("failed to unpack {}: {e}", relative.display())))?;
    }
    Ok(())
}

fn validate_archive(bytes: &[u8]) -> Result<(), OkibotError> {
    let mut tar = tar::Archive::new(GzDecoder::new(bytes));
    let entries = tar
        .entries()
        .map_err(|e| OkibotError::Snapshot(format!("not a gzip tar archive: {e}")))?;
    for entry in entries {
        let entry = entry.map_err(|e| OkibotError::Snapshot(format!("corrupt archive: {e}")))?;
        let path = entry.path()?.into_owned();
        sanitize_entry_path(&path)?;
    }
    Ok(())
}

/// What [`SnapshotManager::restore_if_absent`] did.
#[derive(Debug)]
pub enum StartupRestore {
    /// The directory already had a session.
    Kept,
    Restored(SnapshotRecord),
    NoArchive,
}

async fn has_entries(dir: &Path) -> Result<bool, OkibotError> {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_auth_dir(root: &Path) -> PathBuf {
        let auth = root.join("auth");
        std::fs::create_dir_all(auth.join("session/keys")).unwrap();
        std::fs::write(auth.join("creds.json"), r#"{"me":"bot"}"#).unwrap();
        std::fs::write(auth.join("session/keys/k1"), "secret-key").unwrap();
        auth
    }

    #[tokio::test]
    async fn test_missing_source_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);

        let result = mgr.snapshot(&dir.path().join("nope")).await.unwrap();
        assert!(result.is_none());
        assert!(!dir.path().join("backups").exists());
        assert!(mgr.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_then_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let auth = seed_auth_dir(dir.path());
        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);

        let record = mgr.snapshot(&auth).await.unwrap().unwrap();
        assert!(record.path.exists());
        assert!(record.name.starts_with("session-"));
        assert!(record.name.ends_with(".tar.gz"));

        // Damage the live directory, then restore over it.
        std::fs::remove_file(auth.join("session/keys/k1")).unwrap();
        std::fs::write(auth.join("stale.tmp"), "partial").unwrap();

        mgr.restore(&record.path, &auth).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(auth.join("session/keys/k1")).unwrap(),
            "secret-key"
        );
        assert_eq!(
            std::fs::read_to_string(auth.join("creds.json")).unwrap(),
            r#"{"me":"bot"}"#
        );
        assert!(!auth.join("stale.tmp").exists());
    }

    #[tokio::test]
    async fn test_each_snapshot_gets_unique_name() {
        let dir = tempfile::tempdir().unwrap();
        let auth = seed_auth_dir(dir.path());
        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);

        let mut names = std::collections::HashSet::new();
        for _ in 0..3 {
            let record = mgr.snapshot(&auth).await.unwrap().unwrap();
            assert!(names.insert(record.name));
        }
        assert_eq!(mgr.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_keep_last_prunes_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let auth = seed_auth_dir(dir.path());
        let mgr = SnapshotManager::new(dir.path().join("backups"), 2);

        let first = mgr.snapshot(&auth).await.unwrap().unwrap();
        mgr.snapshot(&auth).await.unwrap();
        let third = mgr.snapshot(&auth).await.unwrap().unwrap();

        let remaining = mgr.list().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(!first.path.exists());
        assert_eq!(remaining.last().unwrap().name, third.name);
    }

    #[tokio::test]
    async fn test_restore_missing_archive_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path(), 0);
        let err = mgr
            .restore(&dir.path().join("session-x.tar.gz"), &dir.path().join("auth"))
            .await
            .unwrap_err();
        assert!(matches!(err, OkibotError::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_restore_latest_without_archives() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);
        let restored = mgr.restore_latest(&dir.path().join("auth")).await.unwrap();
        assert!(restored.is_none());
        assert!(!dir.path().join("auth").exists());
    }

    #[tokio::test]
    async fn test_restore_if_absent_keeps_live_session() {
        let dir = tempfile::tempdir().unwrap();
        let auth = seed_auth_dir(dir.path());
        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);
        mgr.snapshot(&auth).await.unwrap().unwrap();

        // The live session moves on after the archive was taken.
        std::fs::write(auth.join("creds.json"), r#"{"me":"bot","rotated":true}"#).unwrap();

        let outcome = mgr.restore_if_absent(&auth).await.unwrap();
        assert!(matches!(outcome, StartupRestore::Kept));
        assert_eq!(
            std::fs::read_to_string(auth.join("creds.json")).unwrap(),
            r#"{"me":"bot","rotated":true}"#
        );
    }

    #[tokio::test]
    async fn test_restore_if_absent_fills_missing_or_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let auth = seed_auth_dir(dir.path());
        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);
        mgr.snapshot(&auth).await.unwrap().unwrap();

        std::fs::remove_dir_all(&auth).unwrap();
        let outcome = mgr.restore_if_absent(&auth).await.unwrap();
        assert!(matches!(outcome, StartupRestore::Restored(_)));
        assert!(auth.join("session/keys/k1").exists());

        std::fs::remove_dir_all(&auth).unwrap();
        std::fs::create_dir_all(&auth).unwrap();
        let outcome = mgr.restore_if_absent(&auth).await.unwrap();
        assert!(matches!(outcome, StartupRestore::Restored(_)));
        assert!(auth.join("creds.json").exists());

        let empty = SnapshotManager::new(dir.path().join("none"), 0);
        let fresh = dir.path().join("fresh-auth");
        let outcome = empty.restore_if_absent(&fresh).await.unwrap();
        assert!(matches!(outcome, StartupRestore::NoArchive));
    }

    #[tokio::test]
    async fn test_import_rejects_garbage_and_accepts_archive() {
        let dir = tempfile::tempdir().unwrap();
        let auth = seed_auth_dir(dir.path());
        let source = SnapshotManager::new(dir.path().join("src-backups"), 0);
        let record = source.snapshot(&auth).await.unwrap().unwrap();
        let bytes = std::fs::read(&record.path).unwrap();

        let mgr = SnapshotManager::new(dir.path().join("backups"), 0);
        assert!(mgr.import(b"definitely not gzip".to_vec()).await.is_err());
        assert!(mgr.list().await.unwrap().is_empty());

        let imported = mgr.import(bytes).await.unwrap();
        assert_eq!(mgr.latest().await.unwrap().unwrap().name, imported.name);
    }

    #[test]
    fn test_parse_archive_name() {
        let (ts, seq) = parse_archive_name("session-2026-10-18T09-15-02-123Z.tar.gz").unwrap();
        assert_eq!(seq, 0);
        assert_eq!(ts.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-10-18 09:15:02");

        let (_, seq) = parse_archive_name("session-2026-10-18T09-15-02-123Z-4.tar.gz").unwrap();
        assert_eq!(seq, 4);

        assert!(parse_archive_name("session-2026-10-18.tar.gz").is_none());
        assert!(parse_archive_name("notes.txt").is_none());
        assert!(parse_archive_name("session-2026-10-18T09-15-02-123Z.tar.gz.partial").is_none());
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(
            sanitize_entry_path(Path::new("./a/b")).unwrap(),
            Some(PathBuf::from("a/b"))
        );
        assert_eq!(sanitize_entry_path(Path::new(".")).unwrap(), None);
        assert!(sanitize_entry_path(Path::new("../etc/passwd")).is_err());
        assert!(sanitize_entry_path(Path::new("/etc/passwd")).is_err());
    }
}
