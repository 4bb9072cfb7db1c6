//! Static format to MIME type table for provider-reported formats.

/// Look up the MIME type for a provider `format` (a file extension without
/// the dot). Unknown formats return `None`.
pub fn mime_type_for_format(format: &str) -> Option<&'static str> {
    let mime = match format.to_ascii_lowercase().as_str() {
        // images
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "ico" => "image/vnd.microsoft.icon",
        "pdf" => "application/pdf",
        "eps" => "application/postscript",
        "psd" => "image/vnd.adobe.photoshop",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "heic" => "image/heic",
        // video
        "mp4" => "video/mp4",
        "flv" => "video/x-flv",
        "mov" => "video/quicktime",
        "ogv" => "video/ogg",
        "webm" => "video/webm",
        "3gp" => "video/3gpp",
        "3g2" => "video/3gpp2",
        "wmv" => "video/x-ms-wmv",
        "mpeg" | "mpg" => "video/mpeg",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        // audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => return None,
    };
    Some(mime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_formats() {
        assert_eq!(mime_type_for_format("jpg"), Some("image/jpeg"));
        assert_eq!(mime_type_for_format("PNG"), Some("image/png"));
        assert_eq!(mime_type_for_format("3g2"), Some("video/3gpp2"));
        assert_eq!(mime_type_for_format("ogv"), Some("video/ogg"));
        assert_eq!(mime_type_for_format("pdf"), Some("application/pdf"));
    }

    #[test]
    fn required_formats_are_all_mapped() {
        for format in [
            "jpg", "png", "gif", "bmp", "tiff", "ico", "pdf", "eps", "psd", "svg", "webp", "mp4",
            "flv", "mov", "ogv", "webm", "3gp", "3g2", "wmv", "mpeg", "avi",
        ] {
            assert!(mime_type_for_format(format).is_some(), "{format} unmapped");
        }
    }

    #[test]
    fn unknown_format_is_none() {
        assert_eq!(mime_type_for_format("xyz"), None);
        assert_eq!(mime_type_for_format(""), None);
    }
}
