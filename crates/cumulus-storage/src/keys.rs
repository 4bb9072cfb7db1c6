//! Shared key generation for storage backends.
//!
//! A logical id is joined onto the configured prefix to form the storage
//! path (`{prefix}/{id}`). The Cloudinary public id is that path without the
//! file extension, except for `raw` resources, where the provider keeps the
//! extension as part of the id.

use crate::provider::UploadResponse;
use cumulus_core::{AdapterConfig, ResourceType};
use std::path::Path;

/// Join prefix segments and an id with `/`.
pub fn join_path(prefix: Option<&[String]>, id: &str) -> String {
    match prefix {
        Some(segments) if !segments.is_empty() => format!("{}/{}", segments.join("/"), id),
        _ => id.to_string(),
    }
}

/// Extension of `id` including the leading dot, if it has one.
fn extension_of(id: &str) -> Option<String> {
    Path::new(id)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
}

/// Storage path of `id`: `{prefix}/{id}`.
pub fn path(config: &AdapterConfig, id: &str) -> String {
    join_path(config.prefix(), id)
}

/// Cloudinary public id of `id`.
pub fn public_id(config: &AdapterConfig, id: &str) -> String {
    let path = path(config, id);
    if config.resource_type() == ResourceType::Raw {
        return path;
    }

    match extension_of(id) {
        Some(ext) => path
            .strip_suffix(ext.as_str())
            .map(String::from)
            .unwrap_or(path),
        None => path,
    }
}

/// The logical id that matches what the provider actually stored:
/// the returned public id without the prefix, plus `.{format}` when the
/// provider reports a format.
pub fn uploaded_id(config: &AdapterConfig, response: &UploadResponse) -> String {
    let mut id = match config.prefix_path() {
        Some(prefix) => response
            .public_id
            .strip_prefix(&format!("{}/", prefix))
            .unwrap_or(&response.public_id)
            .to_string(),
        None => response.public_id.clone(),
    };

    if let Some(format) = response.format.as_deref().filter(|f| !f.is_empty()) {
        id.push('.');
        id.push_str(format);
    }

    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(public_id: &str, format: Option<&str>) -> UploadResponse {
        UploadResponse {
            public_id: public_id.to_string(),
            format: format.map(String::from),
            ..UploadResponse::default()
        }
    }

    #[test]
    fn public_id_strips_extension() {
        let config = AdapterConfig::new(ResourceType::Image);
        assert_eq!(public_id(&config, "foo.jpg"), "foo");
        assert_eq!(public_id(&config, "dir/foo.tar.gz"), "dir/foo.tar");
        assert_eq!(public_id(&config, "foo"), "foo");
        assert_eq!(public_id(&config, ".hidden"), ".hidden");
    }

    #[test]
    fn public_id_for_video_and_auto_strips_extension() {
        for rt in [ResourceType::Video, ResourceType::Auto] {
            let config = AdapterConfig::new(rt);
            assert_eq!(public_id(&config, "clip.mp4"), "clip");
        }
    }

    #[test]
    fn public_id_keeps_extension_for_raw() {
        let config = AdapterConfig::new(ResourceType::Raw);
        assert_eq!(public_id(&config, "report.pdf"), "report.pdf");
        assert_eq!(path(&config, "report.pdf"), "report.pdf");
    }

    #[test]
    fn prefix_is_joined() {
        let config = AdapterConfig::new(ResourceType::Image).with_prefix("store/avatars");
        assert_eq!(path(&config, "foo.jpg"), "store/avatars/foo.jpg");
        assert_eq!(public_id(&config, "foo.jpg"), "store/avatars/foo");
    }

    #[test]
    fn prefix_with_dots_is_not_treated_as_extension() {
        let config = AdapterConfig::new(ResourceType::Image).with_prefix("v1.2");
        assert_eq!(public_id(&config, "foo"), "v1.2/foo");
    }

    #[test]
    fn uploaded_id_appends_format() {
        let config = AdapterConfig::new(ResourceType::Image);
        assert_eq!(uploaded_id(&config, &response("foo", Some("jpg"))), "foo.jpg");
        assert_eq!(uploaded_id(&config, &response("foo", None)), "foo");
    }

    #[test]
    fn uploaded_id_strips_prefix() {
        let config = AdapterConfig::new(ResourceType::Image).with_prefix("store");
        assert_eq!(
            uploaded_id(&config, &response("store/foo_bar", Some("png"))),
            "foo_bar.png"
        );
        // Ids the provider placed elsewhere are kept whole.
        assert_eq!(
            uploaded_id(&config, &response("other/foo", Some("png"))),
            "other/foo.png"
        );
    }

    #[test]
    fn uploaded_id_for_raw_keeps_public_id() {
        let config = AdapterConfig::new(ResourceType::Raw).with_prefix("docs");
        assert_eq!(
            uploaded_id(&config, &response("docs/report.pdf", None)),
            "report.pdf"
        );
    }

    #[test]
    fn join_path_without_prefix() {
        assert_eq!(join_path(None, "a/b.txt"), "a/b.txt");
        assert_eq!(join_path(Some(&[]), "a.txt"), "a.txt");
    }
}
