// SPDX-FileCopyrightText: 2026 Leadbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user media files under `<data_dir>/media/<user>/`.
//!
//! Stored files are addressed by `/media/<user>/<message>.<ext>`, which the
//! gateway serves back through [`MediaStore::resolve`].

use std::path::{Path, PathBuf};

use leadbridge_core::BridgeError;
use tracing::debug;

/// URL prefix of every stored media path.
pub const MEDIA_URL_PREFIX: &str = "/media";

/// File extension for a MIME type. Parameters such as `; codecs=opus` are ignored.
pub fn extension_for(mimetype: Option<&str>) -> &'static str {
    let essence = mimetype
        .and_then(|m| m.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/3gpp" => "3gp",
        "video/quicktime" => "mov",
        "audio/ogg" => "ogg",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/aac" => "aac",
        "audio/amr" => "amr",
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "text/plain" => "txt",
        _ => "bin",
    }
}

/// MIME type to serve a stored file with, from its extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "3gp" => "video/3gpp",
        "mov" => "video/quicktime",
        "ogg" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "amr" => "audio/amr",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Keep ids usable as single path components.
pub(crate) fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "_".to_string() } else { cleaned }
}

fn media_err(message: String, e: std::io::Error) -> BridgeError {
    BridgeError::Media {
        message,
        source: Some(Box::new(e)),
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    /// `root` is the media directory itself, usually `<data_dir>/media`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(sanitize(user_id))
    }

    /// Write `bytes` and return the stable `/media/<user>/<id>.<ext>` path.
    pub async fn save(
        &self,
        user_id: &str,
        message_id: &str,
        bytes: &[u8],
        mimetype: Option<&str>,
    ) -> Result<String, BridgeError> {
        let user = sanitize(user_id);
        let file_name = format!("{}.{}", sanitize(message_id), extension_for(mimetype));
        let dir = self.user_dir(user_id);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| media_err(format!("cannot create {}", dir.display()), e))?;
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| media_err(format!("cannot write {}", path.display()), e))?;

        debug!(user_id, file = %file_name, size = bytes.len(), "media stored");
        Ok(format!("{MEDIA_URL_PREFIX}/{user}/{file_name}"))
    }

    /// Local file for a stored media file name, if the name is well formed.
    pub fn resolve(&self, user_id: &str, file_name: &str) -> Option<PathBuf> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        if sanitize(stem) != stem || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.user_dir(user_id).join(file_name))
    }

    /// Whether the `<user>` segment of a media URL belongs to `user_id`.
    pub fn owned_by(&self, user_id: &str, url_user: &str) -> bool {
        sanitize(user_id) == url_user
    }

    /// Remove every stored file for a user.
    pub async fn wipe(&self, user_id: &str) -> Result<(), BridgeError> {
        let dir = self.user_dir(user_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(user_id, "media directory removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(media_err(format!("cannot remove {}", dir.display()), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn extension_table() {
        assert_eq!(extension_for(Some("image/jpeg")), "jpg");
        assert_eq!(extension_for(Some("audio/ogg; codecs=opus")), "ogg");
        assert_eq!(extension_for(Some("IMAGE/PNG")), "png");
        assert_eq!(extension_for(Some("application/x-unknown")), "bin");
        assert_eq!(extension_for(None), "bin");
        assert_eq!(extension_for(Some("")), "bin");
    }

    #[tokio::test]
    async fn save_writes_under_user_dir() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let url = store
            .save("u1", "ABC123", b"jpeg-bytes", Some("image/jpeg"))
            .await
            .unwrap();
        assert_eq!(url, "/media/u1/ABC123.jpg");
        let written = std::fs::read(dir.path().join("u1/ABC123.jpg")).unwrap();
        assert_eq!(written, b"jpeg-bytes");
    }

    #[tokio::test]
    async fn unknown_mime_falls_back_to_bin() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let url = store.save("u1", "m1", b"?", None).await.unwrap();
        assert_eq!(url, "/media/u1/m1.bin");
    }

    #[tokio::test]
    async fn hostile_ids_stay_inside_root() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let url = store.save("../u1", "../../etc/passwd", b"x", None).await.unwrap();
        assert_eq!(url, "/media/___u1/______etc_passwd.bin");
        assert!(dir.path().join("___u1").is_dir());
    }

    #[tokio::test]
    async fn resolve_and_wipe() {
        let dir = tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        store.save("u1", "m1", b"x", Some("image/png")).await.unwrap();

        let path = store.resolve("u1", "m1.png").unwrap();
        assert!(path.exists());
        assert!(store.resolve("u1", "../secret.png").is_none());
        assert!(store.resolve("u1", "noext").is_none());

        store.wipe("u1").await.unwrap();
        assert!(!path.exists());
        // Wiping twice is fine.
        store.wipe("u1").await.unwrap();
    }

    #[test]
    fn url_owner_matches_sanitized_user() {
        let store = MediaStore::new("/tmp/unused");
        assert!(store.owned_by("u1", "u1"));
        assert!(store.owned_by("../u1", "___u1"));
        assert!(!store.owned_by("u2", "u1"));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.jpg"), "image/jpeg");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }
}
