//! Delivery URL construction
//!
//! URLs take the form
//! `{delivery_base}/{cloud}/{resource_type}/{type}/[s--SIG--/][transformation/][v{version}/]{path}[.{format}]`.
//! Building a URL never touches the network.

use crate::provider::signature::param_value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cumulus_core::{CloudinaryConfig, ProviderCredentials, ProviderOptions, ResourceType};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Transformation options and their URL component keys.
const TRANSFORMATION_KEYS: &[(&str, &str)] = &[
    ("angle", "a"),
    ("aspect_ratio", "ar"),
    ("audio_codec", "ac"),
    ("background", "b"),
    ("bit_rate", "br"),
    ("border", "bo"),
    ("color", "co"),
    ("color_space", "cs"),
    ("crop", "c"),
    ("default_image", "d"),
    ("delay", "dl"),
    ("density", "dn"),
    ("dpr", "dpr"),
    ("duration", "du"),
    ("effect", "e"),
    ("end_offset", "eo"),
    ("fetch_format", "f"),
    ("flags", "fl"),
    ("gravity", "g"),
    ("height", "h"),
    ("opacity", "o"),
    ("overlay", "l"),
    ("page", "pg"),
    ("quality", "q"),
    ("radius", "r"),
    ("start_offset", "so"),
    ("underlay", "u"),
    ("video_codec", "vc"),
    ("width", "w"),
    ("x", "x"),
    ("y", "y"),
    ("zoom", "z"),
];

/// Builds delivery URLs for one Cloudinary account.
#[derive(Clone, Debug)]
pub struct UrlBuilder {
    credentials: ProviderCredentials,
    delivery_base_url: String,
    secure: bool,
}

impl UrlBuilder {
    pub fn new(
        credentials: ProviderCredentials,
        delivery_base_url: impl Into<String>,
        secure: bool,
    ) -> Self {
        Self {
            credentials,
            delivery_base_url: delivery_base_url.into().trim_end_matches('/').to_string(),
            secure,
        }
    }

    pub fn from_config(config: &CloudinaryConfig) -> Self {
        Self::new(
            config.credentials.clone(),
            config.delivery_base_url.clone(),
            config.secure,
        )
    }

    /// Build the URL of `path` (the prefixed storage path, extension included).
    ///
    /// `resource_type` and `type` entries in `options` override the defaults
    /// passed in.
    pub fn build(
        &self,
        path: &str,
        resource_type: ResourceType,
        delivery_type: &str,
        options: &ProviderOptions,
    ) -> String {
        let resource_type = options
            .get("resource_type")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| resource_type.to_string());
        let delivery_type = options
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(delivery_type);
        let secure = options
            .get("secure")
            .and_then(Value::as_bool)
            .unwrap_or(self.secure);
        let sign_url = options
            .get("sign_url")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut source = path.to_string();
        if let Some(format) = options.get("format").and_then(param_value) {
            if !format.is_empty() {
                source.push('.');
                source.push_str(&format);
            }
        }

        let transformation = transformation_string(options);
        let version = options
            .get("version")
            .and_then(param_value)
            .filter(|v| !v.is_empty())
            .or_else(|| {
                // Folder paths are delivered with an explicit version.
                (source.contains('/') && !has_version_component(&source))
                    .then(|| "1".to_string())
            });

        let mut url = self.base(secure);
        url.push('/');
        url.push_str(&self.credentials.cloud_name);
        url.push('/');
        url.push_str(&resource_type);
        url.push('/');
        url.push_str(delivery_type);
        url.push('/');

        if sign_url {
            url.push_str(&format!("s--{}--/", self.signature(&transformation, &source)));
        }
        if let Some(transformation) = transformation.as_deref() {
            url.push_str(transformation);
            url.push('/');
        }
        if let Some(version) = version {
            url.push('v');
            url.push_str(&version);
            url.push('/');
        }
        url.push_str(&escape_path(&source));

        url
    }

    fn base(&self, secure: bool) -> String {
        if secure {
            self.delivery_base_url.clone()
        } else {
            match self.delivery_base_url.strip_prefix("https://") {
                Some(rest) => format!("http://{}", rest),
                None => self.delivery_base_url.clone(),
            }
        }
    }

    /// First 32 characters of the URL-safe base64 SHA-256 of
    /// `{transformation/}{source}` followed by the API secret.
    fn signature(&self, transformation: &Option<String>, source: &str) -> String {
        let to_sign = match transformation {
            Some(t) => format!("{}/{}", t, source),
            None => source.to_string(),
        };

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.credentials.api_secret.as_bytes());
        let mut encoded = URL_SAFE_NO_PAD.encode(hasher.finalize());
        encoded.truncate(32);
        encoded
    }
}

/// Render the transformation components, sorted by component key, followed by
/// any raw `transformation` string.
fn transformation_string(options: &ProviderOptions) -> Option<String> {
    let mut components: Vec<(&str, String)> = TRANSFORMATION_KEYS
        .iter()
        .filter_map(|(name, key)| {
            options
                .get(*name)
                .and_then(param_value)
                .filter(|v| !v.is_empty())
                .map(|v| (*key, v))
        })
        .collect();
    components.sort_by(|a, b| a.0.cmp(b.0));

    let mut parts = Vec::new();
    if !components.is_empty() {
        parts.push(
            components
                .iter()
                .map(|(key, value)| format!("{}_{}", key, value))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    if let Some(raw) = options
        .get("transformation")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        parts.push(raw.to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Percent-encode each path segment, keeping the `/` separators.
fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether the source already starts with a `v{digits}/` component.
fn has_version_component(source: &str) -> bool {
    source
        .split_once('/')
        .map(|(first, _)| {
            first.len() > 1
                && first.starts_with('v')
                && first[1..].chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cumulus_core::metadata::options_from;
    use serde_json::json;

    fn builder() -> UrlBuilder {
        UrlBuilder::new(
            ProviderCredentials::new("demo", "1234", "secret"),
            "https://res.cloudinary.com",
            true,
        )
    }

    #[test]
    fn plain_url() {
        let url = builder().build("foo.jpg", ResourceType::Image, "upload", &ProviderOptions::new());
        assert_eq!(url, "https://res.cloudinary.com/demo/image/upload/foo.jpg");
    }

    #[test]
    fn transformation_components_are_sorted() {
        let url = builder().build(
            "foo.jpg",
            ResourceType::Image,
            "upload",
            &options_from(json!({"crop": "fit", "width": 150, "height": 150})),
        );
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/c_fit,h_150,w_150/foo.jpg"
        );
        assert!(url.contains("c_fit"));
        assert!(url.contains("w_150"));
        assert!(url.contains("h_150"));
    }

    #[test]
    fn resource_type_and_type_options_override_defaults() {
        let url = builder().build(
            "clip.mp4",
            ResourceType::Image,
            "upload",
            &options_from(json!({"resource_type": "video", "type": "private"})),
        );
        assert_eq!(url, "https://res.cloudinary.com/demo/video/private/clip.mp4");
    }

    #[test]
    fn insecure_url_uses_http() {
        let url = builder().build(
            "foo.jpg",
            ResourceType::Image,
            "upload",
            &options_from(json!({"secure": false})),
        );
        assert!(url.starts_with("http://res.cloudinary.com/"));
    }

    #[test]
    fn version_and_format() {
        let url = builder().build(
            "foo",
            ResourceType::Image,
            "upload",
            &options_from(json!({"version": 1371995958, "format": "png"})),
        );
        assert_eq!(
            url,
            "https://res.cloudinary.com/demo/image/upload/v1371995958/foo.png"
        );
    }

    #[test]
    fn folder_paths_get_default_version() {
        let url = builder().build(
            "store/foo.jpg",
            ResourceType::Image,
            "upload",
            &ProviderOptions::new(),
        );
        assert_eq!(url, "https://res.cloudinary.com/demo/image/upload/v1/store/foo.jpg");
    }

    #[test]
    fn raw_transformation_follows_components() {
        let url = builder().build(
            "foo.jpg",
            ResourceType::Image,
            "upload",
            &options_from(json!({"width": 100, "transformation": "e_sepia"})),
        );
        assert!(url.ends_with("/upload/w_100/e_sepia/foo.jpg"));
    }

    #[test]
    fn signed_url_is_deterministic() {
        let opts = options_from(json!({"sign_url": true, "width": 10}));
        let first = builder().build("foo.jpg", ResourceType::Image, "authenticated", &opts);
        let second = builder().build("foo.jpg", ResourceType::Image, "authenticated", &opts);
        assert_eq!(first, second);

        let rest = first
            .strip_prefix("https://res.cloudinary.com/demo/image/authenticated/s--")
            .unwrap();
        let (signature, tail) = rest.split_once("--/").unwrap();
        assert_eq!(signature.len(), 32);
        assert_eq!(tail, "w_10/foo.jpg");
    }

    #[test]
    fn path_is_escaped() {
        let url = builder().build(
            "my photo.jpg",
            ResourceType::Image,
            "upload",
            &ProviderOptions::new(),
        );
        assert!(url.ends_with("/upload/my%20photo.jpg"));
    }
}
