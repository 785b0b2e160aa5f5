use crate::models::ImageKind;

/// Content type for a format name (`jpeg`, `jpg`, `png`, ...). Anything
/// unrecognised is served as JPEG.
pub fn resolve_content_type(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "tiff" => "image/tiff",
        "gif" => "image/gif",
        other => {
            tracing::debug!("Unrecognized format '{}', falling back to image/jpeg", other);
            "image/jpeg"
        }
    }
}

/// Inverse of [`resolve_content_type`] for the recognised formats.
pub fn format_for_content_type(content_type: &str) -> Option<ImageKind> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some(ImageKind::Jpeg),
        "image/png" => Some(ImageKind::Png),
        "image/webp" => Some(ImageKind::Webp),
        "image/tiff" => Some(ImageKind::Tiff),
        "image/gif" => Some(ImageKind::Gif),
        _ => None,
    }
}

/// Content type guessed from a key's extension, used when the store reports none.
pub fn content_type_for_key(key: &str) -> &'static str {
    let extension = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    match ImageKind::from_name(extension) {
        Some(kind) => kind.content_type(),
        None => resolve_content_type(extension),
    }
}
