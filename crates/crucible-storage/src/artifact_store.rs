use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{debug, info};

use crucible_core::error::InvalidRequest;
use crucible_core::ids;
use crucible_core::record::{ArtifactDescriptor, FileMeta};

use crate::signed_url::UrlSigner;

const META_NAME: &str = "meta.json";
const COPY_BUF_BYTES: usize = 64 * 1024;

/// An uploaded file resolved from the store: sidecar metadata plus the
/// payload location on disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub meta: FileMeta,
    pub path: PathBuf,
}

/// Content-addressed filesystem store for uploaded inputs and produced
/// outputs. Layout: `<root>/uploads/<id>/` and `<root>/artifacts/<id>/`,
/// each holding the payload under its declared filename plus a `meta.json`
/// sidecar. Per-id directory creation is serialized by mkdir on a fresh
/// random id; no extra locking.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    signer: UrlSigner,
    url_ttl_seconds: i64,
}

impl ArtifactStore {
    pub fn open(
        root: impl Into<PathBuf>,
        signer: UrlSigner,
        url_ttl_seconds: i64,
    ) -> Result<Self, anyhow::Error> {
        let root = root.into();
        std::fs::create_dir_all(root.join("uploads"))?;
        std::fs::create_dir_all(root.join("artifacts"))?;
        Ok(Self {
            root,
            signer,
            url_ttl_seconds,
        })
    }

    /// Persist one uploaded payload. The SHA-256 is computed here, once;
    /// uploads are immutable afterwards.
    pub fn save_upload(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<FileMeta, anyhow::Error> {
        let name = sanitize_file_name(name)?;
        let id = ids::new_file_id();
        let dir = self.root.join("uploads").join(&id);
        std::fs::create_dir(&dir)?;
        std::fs::write(dir.join(&name), bytes)?;

        let meta = FileMeta {
            id: id.clone(),
            name,
            size: bytes.len() as u64,
            sha256: crucible_core::sha256_hex(bytes),
            content_type: content_type.to_string(),
        };
        write_meta(&dir, &meta)?;

        info!(file_id = %id, name = %meta.name, size = meta.size, "stored upload");
        Ok(meta)
    }

    pub fn get_upload(&self, id: &str) -> Result<Option<UploadedFile>, anyhow::Error> {
        if !is_valid_file_id(id) {
            return Ok(None);
        }
        let dir = self.root.join("uploads").join(id);
        read_stored(&dir)
    }

    /// Move one produced file from a run workdir into the store: copy while
    /// hashing, write the sidecar, delete the source, and mint a signed URL
    /// valid for the configured TTL.
    pub fn ingest_artifact(&self, src: &Path) -> Result<ArtifactDescriptor, anyhow::Error> {
        let name = src
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("artifact has no usable file name: {}", src.display()))?
            .to_string();

        let id = ids::new_file_id();
        let dir = self.root.join("artifacts").join(&id);
        std::fs::create_dir(&dir)?;

        let (size, sha256) = copy_hashing(src, &dir.join(&name))?;
        let content_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .to_string();

        let meta = FileMeta {
            id: id.clone(),
            name: name.clone(),
            size,
            sha256: sha256.clone(),
            content_type: content_type.clone(),
        };
        write_meta(&dir, &meta)?;
        std::fs::remove_file(src)?;

        let expires_at = OffsetDateTime::now_utc().unix_timestamp() + self.url_ttl_seconds;
        let url = self.signer.sign(&format!("/v1/files/{id}"), expires_at)?;

        debug!(file_id = %id, name = %name, size, "ingested artifact");
        Ok(ArtifactDescriptor {
            name,
            size,
            sha256,
            url,
            expires_at,
            content_type,
        })
    }

    /// Resolve a file id for download: artifacts first, then uploads.
    pub fn open_payload(&self, id: &str) -> Result<Option<UploadedFile>, anyhow::Error> {
        if !is_valid_file_id(id) {
            return Ok(None);
        }
        if let Some(found) = read_stored(&self.root.join("artifacts").join(id))? {
            return Ok(Some(found));
        }
        read_stored(&self.root.join("uploads").join(id))
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }
}

fn read_stored(dir: &Path) -> Result<Option<UploadedFile>, anyhow::Error> {
    let meta_path = dir.join(META_NAME);
    let bytes = match std::fs::read(&meta_path) {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let meta: FileMeta = serde_json::from_slice(&bytes)?;
    let path = dir.join(&meta.name);
    Ok(Some(UploadedFile { meta, path }))
}

fn write_meta(dir: &Path, meta: &FileMeta) -> Result<(), anyhow::Error> {
    let bytes = serde_json::to_vec_pretty(meta)?;
    std::fs::write(dir.join(META_NAME), bytes)?;
    Ok(())
}

fn copy_hashing(src: &Path, dst: &Path) -> Result<(u64, String), anyhow::Error> {
    let mut reader = std::fs::File::open(src)?;
    let mut writer = std::fs::File::create(dst)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUF_BYTES];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        size += n as u64;
    }
    writer.flush()?;
    Ok((size, hex::encode(hasher.finalize())))
}

/// Reduce a client-declared filename to a single normal path component.
fn sanitize_file_name(name: &str) -> Result<String, anyhow::Error> {
    let candidate = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if candidate.is_empty() || candidate == META_NAME || candidate.starts_with('.') {
        return Err(InvalidRequest::new("file", "invalid file name").into());
    }
    Ok(candidate.to_string())
}

fn is_valid_file_id(id: &str) -> bool {
    id.strip_prefix("file_")
        .is_some_and(|suffix| suffix.len() == 12 && suffix.chars().all(|c| c.is_ascii_alphanumeric()))
}
