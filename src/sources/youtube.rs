use regex::Regex;

use super::SourcePlatform;

/// YouTube link recognizer
pub struct YoutubeSource {
    pattern: Regex,
    id_pattern: Regex,
}

impl YoutubeSource {
    pub fn new() -> Self {
        // Greedy prefix so the last marker in the link wins.
        let pattern = Regex::new(r"^.*(youtu\.be/|v/|u/\w/|embed/|shorts/|watch\?v=|&v=)([^#&?]*).*")
            .expect("static YouTube pattern is valid");
        let id_pattern = Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static video id pattern is valid");

        Self { pattern, id_pattern }
    }

    /// Extract the 11-character video identifier from a link
    pub fn video_id(&self, url: &str) -> Option<String> {
        let captures = self.pattern.captures(url)?;
        let id = captures.get(2)?.as_str();

        self.id_pattern.is_match(id).then(|| id.to_string())
    }

    /// Canonical watch link for a video identifier
    pub fn watch_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", video_id)
    }
}

impl SourcePlatform for YoutubeSource {
    fn content_key(&self, url: &str) -> Option<String> {
        self.video_id(url)
    }

    fn platform_name(&self) -> &'static str {
        "YouTube"
    }
}

impl Default for YoutubeSource {
    fn default() -> Self {
        Self::new()
    }
}
