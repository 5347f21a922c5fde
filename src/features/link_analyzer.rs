use regex::Regex;

/// Finds raw http(s) links in unnormalized body text.
pub struct LinkAnalyzer {
    link_regex: Regex,
}

impl Default for LinkAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkAnalyzer {
    pub fn new() -> Self {
        Self {
            // Stops at whitespace and at the characters that usually close a
            // link in markup or prose: '>', ')' and '"'.
            link_regex: Regex::new(r#"https?://[^\s>)"]+"#).unwrap(),
        }
    }

    /// All link occurrences in document order, duplicates included.
    pub fn extract_links(&self, body: &str) -> Vec<String> {
        self.link_regex
            .find_iter(body)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
