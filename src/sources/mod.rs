//! Source-link recognition.
//!
//! Each supported platform knows how to recognize its links and how to derive
//! the short content key that addresses a cached download.

pub mod youtube;

/// A platform whose links can be turned into cache keys
pub trait SourcePlatform: Send + Sync {
    /// Derive the content key for a link, if the link belongs to this platform
    fn content_key(&self, url: &str) -> Option<String>;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;

    /// Check if this platform recognizes the given link
    fn supports_url(&self, url: &str) -> bool {
        self.content_key(url).is_some()
    }
}

/// A recognized source link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub platform: &'static str,
    pub content_key: String,
    pub url: String,
}

/// Registry for managing the known source platforms
pub struct SourceRegistry {
    platforms: Vec<Box<dyn SourcePlatform>>,
}

impl SourceRegistry {
    /// Create a new registry with the default platforms
    pub fn new() -> Self {
        let mut registry = Self {
            platforms: Vec::new(),
        };

        registry.register(Box::new(youtube::YoutubeSource::new()));

        registry
    }

    /// Register a new platform
    pub fn register(&mut self, platform: Box<dyn SourcePlatform>) {
        self.platforms.push(platform);
    }

    /// Resolve a link to its platform and content key.
    ///
    /// Keys become file names in the cache, so a key that is not a plain
    /// token of ASCII letters, digits, `-` and `_` is treated as unrecognized.
    pub fn resolve(&self, url: &str) -> Option<SourceRef> {
        self.platforms.iter().find_map(|platform| {
            platform
                .content_key(url)
                .filter(|key| is_plain_key(key))
                .map(|content_key| SourceRef {
                    platform: platform.platform_name(),
                    content_key,
                    url: url.to_string(),
                })
        })
    }

    /// Content key for a link, if any platform recognizes it
    pub fn content_key(&self, url: &str) -> Option<String> {
        self.resolve(url).map(|source| source.content_key)
    }

    /// List all supported platforms
    pub fn list_platforms(&self) -> Vec<&'static str> {
        self.platforms
            .iter()
            .map(|platform| platform.platform_name())
            .collect()
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource;

    impl SourcePlatform for FixedSource {
        fn content_key(&self, url: &str) -> Option<String> {
            url.strip_prefix("fixed://").map(str::to_string)
        }

        fn platform_name(&self) -> &'static str {
            "Fixed"
        }
    }

    #[test]
    fn test_resolves_youtube_by_default() {
        let registry = SourceRegistry::new();
        let source = registry
            .resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .unwrap();
        assert_eq!(source.platform, "YouTube");
        assert_eq!(source.content_key, "dQw4w9WgXcQ");
        assert_eq!(registry.list_platforms(), vec!["YouTube"]);
    }

    #[test]
    fn test_registered_platform_is_consulted() {
        let mut registry = SourceRegistry::new();
        assert!(registry.content_key("fixed://abc").is_none());

        registry.register(Box::new(FixedSource));
        assert_eq!(registry.content_key("fixed://abc").as_deref(), Some("abc"));
    }

    #[test]
    fn test_keys_that_are_not_file_safe_are_rejected() {
        let mut registry = SourceRegistry::new();
        registry.register(Box::new(FixedSource));

        assert!(registry.content_key("fixed://../../etc/passwd").is_none());
        assert!(registry.content_key("fixed://a%2Fb").is_none());
        assert!(registry.content_key("fixed://").is_none());
        assert!(registry.content_key("https://youtu.be/../../out/x").is_none());
        assert_eq!(registry.content_key("fixed://clip_01-a").as_deref(), Some("clip_01-a"));
    }
}
