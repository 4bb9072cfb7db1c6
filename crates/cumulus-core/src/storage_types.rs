use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// This enum defines the available storage backend types.
/// It's defined in core because it's used in configuration and by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Cloudinary,
    Local,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloudinary" => Ok(StorageBackend::Cloudinary),
            "local" => Ok(StorageBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Cloudinary => write!(f, "cloudinary"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Cloudinary resource type (the provider's coarse content bucket)
///
/// The resource type decides which transformations are available, the shape
/// of delivery URLs, and whether the provider tracks file extensions
/// separately from the public id (`raw` resources keep theirs in the id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    #[default]
    Image,
    Video,
    Raw,
    Auto,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
            ResourceType::Auto => "auto",
        }
    }

    /// Whether the provider reports pixel dimensions for this resource type.
    pub fn has_dimensions(&self) -> bool {
        matches!(self, ResourceType::Image | ResourceType::Video)
    }
}

impl FromStr for ResourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(ResourceType::Image),
            "video" => Ok(ResourceType::Video),
            "raw" => Ok(ResourceType::Raw),
            "auto" => Ok(ResourceType::Auto),
            _ => Err(anyhow::anyhow!("Invalid resource type: {}", s)),
        }
    }
}

impl Display for ResourceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
