//! Media type detection from magic bytes.

use std::path::Path;

/// Detect the MIME type of a file by its leading bytes.
///
/// Returns `None` when the type is unknown or the file cannot be read.
pub fn detect_media_type(path: &Path) -> Option<String> {
    match infer::get_from_path(path) {
        Ok(Some(kind)) => Some(kind.mime_type().to_string()),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("Media type detection failed for {}: {}", path.display(), e);
            None
        }
    }
}

/// Broad category of a MIME type: `image`, `video` or `audio`
pub fn media_category(media_type: Option<&str>) -> Option<&'static str> {
    let media_type = media_type?;
    if media_type.starts_with("image/") {
        Some("image")
    } else if media_type.starts_with("video/") {
        Some("video")
    } else if media_type.starts_with("audio/") {
        Some("audio")
    } else {
        None
    }
}

/// Whether the type is worth attempting a raster decode on
pub fn is_image(media_type: Option<&str>) -> bool {
    media_category(media_type) == Some("image")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn detects_png_from_content_not_extension() {
        let mut file = NamedTempFile::with_suffix(".txt").unwrap();
        file.write_all(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0])
            .unwrap();

        assert_eq!(detect_media_type(file.path()).as_deref(), Some("image/png"));
    }

    #[test]
    fn plain_text_is_unknown() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"same").unwrap();
        assert_eq!(detect_media_type(file.path()), None);
    }

    #[test]
    fn categories() {
        assert_eq!(media_category(Some("image/jpeg")), Some("image"));
        assert_eq!(media_category(Some("video/mp4")), Some("video"));
        assert_eq!(media_category(Some("application/pdf")), None);
        assert_eq!(media_category(None), None);
        assert!(is_image(Some("image/png")));
        assert!(!is_image(Some("video/quicktime")));
    }
}
