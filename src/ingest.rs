//! Correlating a data source into the central repository.

use crate::error::StoreError;
use crate::mime::guess_mime_types;
use crate::model::{AttributeType, CorrelationCase, DataSource, FileRef, KnownStatus};
use crate::store::{CentralRepository, InstanceRecord};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub case_name: String,
    pub data_source: String,
    pub device_id: String,
    pub exclude: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct IngestReport {
    pub case: CorrelationCase,
    pub data_source: DataSource,
    pub files_seen: usize,
    pub recorded: usize,
    pub already_present: usize,
    pub excluded: usize,
    /// Files that could not be hashed plus directories that could not be listed.
    pub unreadable: usize,
    /// Symlinks, sockets, devices and other non-regular entries.
    pub skipped: usize,
}

/// Walk `root`, hash every regular file and record it as a Files instance of
/// the given case and data source.
///
/// Hidden files and files named by ignore files are evidence too, so only the
/// explicit exclude patterns filter the walk.
pub fn ingest_directory(
    repo: &CentralRepository,
    root: &Path,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::NotADirectory(root.to_path_buf()));
    }

    let excludes = build_globset(&options.exclude)?;
    let case = repo.add_case(&options.case_name);
    let data_source = repo.add_data_source(case.id, &options.data_source, &options.device_id)?;

    let mut report = IngestReport {
        case: case.clone(),
        data_source: data_source.clone(),
        files_seen: 0,
        recorded: 0,
        already_present: 0,
        excluded: 0,
        unreadable: 0,
        skipped: 0,
    };

    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false).follow_links(false);

    let mut object_id: i64 = 0;
    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("cannot read under {}: {}", root.display(), e);
                report.unreadable += 1;
                continue;
            }
        };
        let path = entry.path();
        match entry.file_type() {
            Some(t) if t.is_file() => {}
            Some(t) if t.is_dir() => continue,
            _ => {
                debug!("skipping non-regular file {}", path.display());
                report.skipped += 1;
                continue;
            }
        }
        report.files_seen += 1;

        let rel = path.strip_prefix(root).unwrap_or(path);
        if excludes.is_match(rel) || path.file_name().is_some_and(|n| excludes.is_match(n)) {
            report.excluded += 1;
            continue;
        }

        let digest = match hash_file(path) {
            Ok(d) => d,
            Err(e) => {
                warn!("skipping unreadable file {}: {}", path.display(), e);
                report.unreadable += 1;
                continue;
            }
        };

        object_id += 1;
        let inserted = repo.record_instance(InstanceRecord {
            case_id: case.id,
            data_source_id: data_source.id,
            attribute_type: AttributeType::Files,
            value: digest,
            file: FileRef {
                object_id: Some(object_id),
                path: evidence_path(rel),
                mime_types: guess_mime_types(path),
            },
            comment: options.comment.clone(),
            known_status: None,
        })?;

        if inserted {
            report.recorded += 1;
        } else {
            report.already_present += 1;
        }
    }

    debug!(
        recorded = report.recorded,
        excluded = report.excluded,
        unreadable = report.unreadable,
        skipped = report.skipped,
        "ingested {} into case '{}'",
        root.display(),
        case.display_name
    );
    Ok(report)
}

/// A single non-file attribute observed in a data source.
#[derive(Debug, Clone)]
pub struct AttributeObservation {
    pub case_name: String,
    pub data_source: String,
    pub attribute_type: AttributeType,
    pub value: String,
    pub path: String,
    pub comment: Option<String>,
    pub known_status: Option<KnownStatus>,
}

/// Record one observation, creating its case and data source as needed.
/// Returns `false` if the same occurrence was already recorded.
pub fn record_attribute(
    repo: &CentralRepository,
    observation: AttributeObservation,
) -> Result<bool, IngestError> {
    let case = repo.add_case(&observation.case_name);
    let data_source = repo.add_data_source(case.id, &observation.data_source, "")?;
    let inserted = repo.record_instance(InstanceRecord {
        case_id: case.id,
        data_source_id: data_source.id,
        attribute_type: observation.attribute_type,
        value: observation.value,
        file: FileRef {
            object_id: None,
            mime_types: guess_mime_types(Path::new(&observation.path)),
            path: observation.path,
        },
        comment: observation.comment,
        known_status: observation.known_status,
    })?;
    Ok(inserted)
}

/// SHA-256 of a file's content as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

/// Data-source-rooted path with forward slashes, e.g. `/Users/bob/a.jpg`.
fn evidence_path(rel: &Path) -> String {
    let joined = rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{}", joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AttributeStore, StoreSession};
    use std::fs;
    use tempfile::TempDir;

    fn options(case: &str, ds: &str) -> IngestOptions {
        IngestOptions {
            case_name: case.to_string(),
            data_source: ds.to_string(),
            ..IngestOptions::default()
        }
    }

    #[test]
    fn test_hash_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ingest_directory() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("DCIM")).unwrap();
        fs::write(dir.path().join("DCIM/img_001.jpg"), b"jpeg bytes").unwrap();
        fs::write(dir.path().join(".hidden.pdf"), b"pdf bytes").unwrap();
        fs::write(dir.path().join("swap.tmp"), b"scratch").unwrap();

        let repo = CentralRepository::new();
        let mut opts = options("Alpha", "phone");
        opts.exclude = vec!["*.tmp".to_string()];
        let report = ingest_directory(&repo, dir.path(), &opts).unwrap();

        assert_eq!(report.files_seen, 3);
        assert_eq!(report.recorded, 2);
        assert_eq!(report.excluded, 1);

        let session = repo.open_session().unwrap();
        let mut instances = session.instances_in_case(report.case.id, AttributeType::Files).unwrap();
        instances.sort_by(|a, b| a.file.path.cmp(&b.file.path));
        assert_eq!(instances[0].file.path, "/.hidden.pdf");
        assert_eq!(instances[0].file.mime_types, vec!["application/pdf".to_string()]);
        assert_eq!(instances[1].file.path, "/DCIM/img_001.jpg");
        assert_eq!(instances[1].value, hash_file(&dir.path().join("DCIM/img_001.jpg")).unwrap());
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"same").unwrap();
        let repo = CentralRepository::new();
        ingest_directory(&repo, dir.path(), &options("Alpha", "usb")).unwrap();
        let second = ingest_directory(&repo, dir.path(), &options("Alpha", "usb")).unwrap();
        assert_eq!(second.recorded, 0);
        assert_eq!(second.already_present, 1);
        assert_eq!(repo.stats().instances, 1);
    }

    #[test]
    fn test_ingest_rejects_files_and_bad_patterns() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("x.bin");
        fs::write(&file, b"x").unwrap();
        let repo = CentralRepository::new();
        assert!(matches!(
            ingest_directory(&repo, &file, &options("Alpha", "d")),
            Err(IngestError::NotADirectory(_))
        ));

        let mut opts = options("Alpha", "d");
        opts.exclude = vec!["[unclosed".to_string()];
        assert!(matches!(ingest_directory(&repo, dir.path(), &opts), Err(IngestError::Pattern(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_unlistable_directory_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok.txt"), b"fine").unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("evidence.jpg"), b"jpeg bytes").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users can still list the directory
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let repo = CentralRepository::new();
        let report = ingest_directory(&repo, dir.path(), &options("Alpha", "disk")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(report.recorded, 1);
        assert_eq!(report.unreadable, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_counted_as_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("target.txt"), b"data").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target.txt"), dir.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("dangling.txt")).unwrap();

        let repo = CentralRepository::new();
        let report = ingest_directory(&repo, dir.path(), &options("Alpha", "disk")).unwrap();

        assert_eq!(report.files_seen, 1);
        assert_eq!(report.recorded, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.unreadable, 0);
    }

    #[test]
    fn test_record_attribute() {
        let repo = CentralRepository::new();
        let observation = AttributeObservation {
            case_name: "Alpha".to_string(),
            data_source: "phone".to_string(),
            attribute_type: AttributeType::Email,
            value: "Bob@Example.com".to_string(),
            path: "/data/mail.db".to_string(),
            comment: Some("from contacts".to_string()),
            known_status: Some(KnownStatus::Notable),
        };
        assert!(record_attribute(&repo, observation.clone()).unwrap());
        assert!(!record_attribute(&repo, observation).unwrap());

        let session = repo.open_session().unwrap();
        let found = session.instances_with_value(AttributeType::Email, "bob@example.com").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].known_status, Some(KnownStatus::Notable));
        assert_eq!(found[0].comment.as_deref(), Some("from contacts"));
    }
}
