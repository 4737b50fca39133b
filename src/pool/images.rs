// Image references for multimodal requests.
//
// Remote URLs and data URLs are passed through; local files are read and
// inlined as base64 data URLs.

use std::path::Path;

use base64::Engine;

use crate::error::{LlmError, Result};

/// Maximum image file size (20 MB).
const MAX_IMAGE_SIZE: u64 = 20 * 1024 * 1024;

/// Determine the MIME type for an image based on its extension.
fn media_type_for_extension(path: &str) -> Option<&'static str> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())?;

    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://")
        || reference.starts_with("https://")
        || reference.starts_with("data:")
}

/// Turn an image reference into something usable as `image_url.url`.
pub(crate) async fn to_image_url(reference: &str) -> Result<String> {
    if is_remote(reference) {
        return Ok(reference.to_string());
    }

    let media_type = media_type_for_extension(reference).ok_or_else(|| {
        LlmError::Validation(format!("unsupported image format: {reference}"))
    })?;

    let metadata = tokio::fs::metadata(reference).await?;
    if metadata.len() > MAX_IMAGE_SIZE {
        return Err(LlmError::Validation(format!(
            "image file too large: {} bytes (max {} bytes)",
            metadata.len(),
            MAX_IMAGE_SIZE
        )));
    }

    let data = tokio::fs::read(reference).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
    Ok(format!("data:{media_type};base64,{encoded}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_media_type_for_extension() {
        assert_eq!(media_type_for_extension("photo.PNG"), Some("image/png"));
        assert_eq!(media_type_for_extension("photo.jpeg"), Some("image/jpeg"));
        assert_eq!(media_type_for_extension("notes.txt"), None);
        assert_eq!(media_type_for_extension("no_extension"), None);
    }

    #[tokio::test]
    async fn test_remote_references_pass_through() {
        for r in ["https://example.com/cat.png", "data:image/png;base64,AAAA"] {
            assert_eq!(to_image_url(r).await.unwrap(), r);
        }
    }

    #[tokio::test]
    async fn test_local_file_becomes_data_url() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(b"\x89PNG").unwrap();
        let url = to_image_url(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw==");
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let err = to_image_url("/tmp/report.pdf").await.unwrap_err();
        assert!(matches!(err, LlmError::Validation(_)));
    }
}
