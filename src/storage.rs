use std::fs;
use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::UploadError;

/// Keeps uploaded originals and hands back a URL they can be fetched from.
pub trait ImageStore: Send + Sync {
    fn store(&self, bytes: &[u8]) -> Result<String, UploadError>;
}

/// Content addressed store on local disk, served under `/uploads/`.
pub struct LocalImageStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self { dir: dir.into(), public_url: public_url.into() }
    }

    /// Resolves a stored file name. Anything that is not a bare name we
    /// could have produced is rejected.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
            && !name.starts_with('.');
        valid.then(|| self.dir.join(name))
    }
}

impl ImageStore for LocalImageStore {
    fn store(&self, bytes: &[u8]) -> Result<String, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        let name = format!("{}.{}", hex::encode(Sha256::digest(bytes)), extension_for(bytes));
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(&name);
        if !path.exists() {
            fs::write(&path, bytes)?;
            info!("event" = "upload.stored", name = %name, bytes = bytes.len());
        }
        Ok(format!("{}/uploads/{}", self.public_url, name))
    }
}

fn extension_for(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(image::ImageFormat::Png) => "png",
        _ => "bin",
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("jpg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    #[test]
    fn stores_content_addressed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(tmp.path().join("up"), "http://host:3000");
        let url = store.store(PNG_MAGIC).unwrap();
        let again = store.store(PNG_MAGIC).unwrap();
        assert_eq!(url, again);
        assert!(url.starts_with("http://host:3000/uploads/"));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        let path = store.resolve(name).unwrap();
        assert_eq!(fs::read(path).unwrap(), PNG_MAGIC);
        assert_eq!(content_type_for(name), "image/png");
    }

    #[test]
    fn empty_upload_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(tmp.path(), "http://host");
        assert!(matches!(store.store(&[]), Err(UploadError::Empty)));
    }

    #[test]
    fn unwritable_directory_is_an_upload_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let store = LocalImageStore::new(blocker.join("sub"), "http://host");
        assert!(matches!(store.store(b"data"), Err(UploadError::Io(_))));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let store = LocalImageStore::new("/srv/uploads", "http://host");
        assert!(store.resolve("../etc/passwd").is_none());
        assert!(store.resolve(".hidden").is_none());
        assert!(store.resolve("a/b.jpg").is_none());
        assert_eq!(store.resolve("abc123.jpg"), Some(PathBuf::from("/srv/uploads/abc123.jpg")));
    }
}
