use log::debug;
use regex::{Captures, Regex};
use thiserror::Error;

/// Markup that the tag scanner could not make sense of. Never escapes the
/// normalizer: callers fall back to treating the input as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupParseError {
    #[error("comment opened at byte {0} is never terminated")]
    UnterminatedComment(usize),
    #[error("<{tag}> element opened at byte {offset} is never closed")]
    UnclosedRawText { tag: String, offset: usize },
    #[error("tag opened at byte {0} has no closing '>'")]
    UnterminatedTag(usize),
}

/// Elements whose content is not visible text.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

pub struct TextNormalizer {
    html_entity_regex: Regex,
    url_regex: Regex,
    line_break_regex: Regex,
    disallowed_regex: Regex,
    whitespace_regex: Regex,
}

impl TextNormalizer {
    pub fn new() -> Self {
        Self {
            html_entity_regex: Regex::new(r"&(?:#(\d+)|#[xX]([0-9A-Fa-f]+)|([a-zA-Z][a-zA-Z0-9]*));")
                .unwrap(),
            url_regex: Regex::new(r"\b[a-z][a-z0-9+]*://\S*").unwrap(),
            line_break_regex: Regex::new(r"[\r\n]+").unwrap(),
            disallowed_regex: Regex::new(r"[^a-z0-9\s]").unwrap(),
            whitespace_regex: Regex::new(r"\s+").unwrap(),
        }
    }

    /// Reduce arbitrary HTML or plain text to lowercase alphanumeric words
    /// separated by single spaces.
    pub fn normalize(&self, raw: &str) -> String {
        let text = self.visible_text(raw).to_lowercase();
        let text = self.url_regex.replace_all(&text, " ");
        let text = self.line_break_regex.replace_all(&text, " ");
        let text = self.disallowed_regex.replace_all(&text, " ");
        let text = self.whitespace_regex.replace_all(&text, " ");
        text.trim().to_string()
    }

    /// Visible text of a markup fragment, or the input itself when the
    /// markup cannot be parsed.
    pub fn visible_text(&self, raw: &str) -> String {
        match self.html_to_text(raw) {
            Ok(text) => text,
            Err(e) => {
                debug!("Treating input as plain text: {}", e);
                raw.to_string()
            }
        }
    }

    /// Extract the text nodes of `html`, entity-decoded and trimmed, joined
    /// by single spaces. Comments, declarations and script/style bodies are
    /// dropped. A `<` that does not start a tag is kept as text.
    pub fn html_to_text(&self, html: &str) -> Result<String, MarkupParseError> {
        let mut nodes: Vec<String> = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;

        while let Some(rel) = html[pos..].find('<') {
            let open = pos + rel;
            let rest = &html[open..];

            if rest.starts_with("<!--") {
                self.push_text_node(&mut nodes, &html[text_start..open]);
                let end = rest
                    .find("-->")
                    .ok_or(MarkupParseError::UnterminatedComment(open))?;
                pos = open + end + 3;
                text_start = pos;
                continue;
            }

            let starts_tag = matches!(
                rest[1..].chars().next(),
                Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '!' || c == '?'
            );
            if !starts_tag {
                pos = open + 1;
                continue;
            }

            self.push_text_node(&mut nodes, &html[text_start..open]);
            let close = rest
                .find('>')
                .ok_or(MarkupParseError::UnterminatedTag(open))?;
            let tag = &rest[1..close];
            pos = open + close + 1;

            let name = tag_name(tag);
            if !tag.starts_with('/')
                && !tag.ends_with('/')
                && RAW_TEXT_ELEMENTS.contains(&name.as_str())
            {
                let end = find_closing_tag(&html[pos..], &name).ok_or_else(|| {
                    MarkupParseError::UnclosedRawText {
                        tag: name.clone(),
                        offset: open,
                    }
                })?;
                let end_tag = pos + end;
                let gt = html[end_tag..]
                    .find('>')
                    .ok_or(MarkupParseError::UnterminatedTag(end_tag))?;
                pos = end_tag + gt + 1;
            }
            text_start = pos;
        }

        self.push_text_node(&mut nodes, &html[text_start..]);
        Ok(nodes.join(" "))
    }

    fn push_text_node(&self, nodes: &mut Vec<String>, raw: &str) {
        let decoded = self.decode_html_entities(raw);
        let trimmed = decoded.trim();
        if !trimmed.is_empty() {
            nodes.push(trimmed.to_string());
        }
    }

    fn decode_html_entities(&self, text: &str) -> String {
        if !text.contains('&') {
            return text.to_string();
        }

        self.html_entity_regex
            .replace_all(text, |caps: &Captures| {
                let decoded = if let Some(decimal) = caps.get(1) {
                    decimal.as_str().parse::<u32>().ok().and_then(char::from_u32)
                } else if let Some(hex) = caps.get(2) {
                    u32::from_str_radix(hex.as_str(), 16)
                        .ok()
                        .and_then(char::from_u32)
                } else {
                    caps.get(3).and_then(|named| match named.as_str() {
                        "amp" => Some('&'),
                        "lt" => Some('<'),
                        "gt" => Some('>'),
                        "quot" => Some('"'),
                        "apos" => Some('\''),
                        "nbsp" => Some(' '),
                        _ => None,
                    })
                };
                match decoded {
                    Some(ch) => ch.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .to_string()
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offset of the first `</name` in `html` that closes `name` itself,
/// not a longer element name sharing the prefix.
fn find_closing_tag(html: &str, name: &str) -> Option<usize> {
    // to_ascii_lowercase keeps byte offsets aligned with `html`
    let lowered = html.to_ascii_lowercase();
    let needle = format!("</{}", name);
    let mut from = 0;
    while let Some(rel) = lowered[from..].find(&needle) {
        let start = from + rel;
        let after = start + needle.len();
        match lowered[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => return Some(start),
            None => return Some(start),
            _ => from = after,
        }
    }
    None
}

/// Lowercased element name of a tag body such as `/div` or `a href="..."`.
fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_separates_nodes() {
        let normalizer = TextNormalizer::new();
        let text = normalizer
            .html_to_text("<p>Hello<b>World</b></p><div>  again </div>")
            .unwrap();
        assert_eq!(text, "Hello World again");
    }

    #[test]
    fn test_html_to_text_drops_script_style_and_comments() {
        let normalizer = TextNormalizer::new();
        let html = "<style>p { color: red }</style><!-- hidden --><SCRIPT>var x = 1;</SCRIPT>Visible";
        assert_eq!(normalizer.html_to_text(html).unwrap(), "Visible");
    }

    #[test]
    fn test_html_to_text_decodes_entities() {
        let normalizer = TextNormalizer::new();
        let text = normalizer
            .html_to_text("Tom &amp; Jerry &#65;&#x42; &unknown;")
            .unwrap();
        assert_eq!(text, "Tom & Jerry AB &unknown;");
    }

    #[test]
    fn test_html_to_text_keeps_bare_angle_brackets() {
        let normalizer = TextNormalizer::new();
        assert_eq!(normalizer.html_to_text("3 < 5 and 7 > 2").unwrap(), "3 < 5 and 7 > 2");
    }

    #[test]
    fn test_malformed_markup_is_reported() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.html_to_text("before <!-- never closed"),
            Err(MarkupParseError::UnterminatedComment(7))
        );
        assert!(matches!(
            normalizer.html_to_text("<script>alert(1)"),
            Err(MarkupParseError::UnclosedRawText { .. })
        ));
        assert_eq!(
            normalizer.html_to_text("text <b class=x"),
            Err(MarkupParseError::UnterminatedTag(5))
        );
    }

    #[test]
    fn test_malformed_markup_degrades_to_plain_text() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("<!-- broken <b>Bold</b>"),
            "broken b bold b"
        );
    }

    #[test]
    fn test_normalize_pipeline() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("<p>URGENT:\r\nVisit https://evil.example/login NOW!</p>"),
            "urgent visit now"
        );
        assert_eq!(normalizer.normalize("don't   stop\n\nme"), "don t stop me");
        assert_eq!(normalizer.normalize(""), "");
        assert_eq!(normalizer.normalize("   \n  "), "");
    }

    #[test]
    fn test_normalize_removes_any_url_scheme() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("get ftp://files.example/x and HTTP://A.B/c done"),
            "get and done"
        );
    }

    #[test]
    fn test_url_glued_to_word_keeps_the_word() {
        let normalizer = TextNormalizer::new();
        assert_eq!(
            normalizer.normalize("Update your password.https://evil.example/reset"),
            "update your password"
        );
        assert_eq!(
            normalizer.normalize("Click:http://x.example/a now"),
            "click now"
        );
    }

    #[test]
    fn test_raw_text_ends_only_at_its_own_closing_tag() {
        let normalizer = TextNormalizer::new();
        let html = "<script>var t = '</scripts>';</script >Shown<style>a{}</STYLE\n>After";
        assert_eq!(normalizer.html_to_text(html).unwrap(), "Shown After");
        assert!(matches!(
            normalizer.html_to_text("<script>x</scriptx>"),
            Err(MarkupParseError::UnclosedRawText { .. })
        ));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = TextNormalizer::new();
        let inputs = [
            "<html><body><h1>Account &amp; Security</h1><p>Click <a href=\"http://x.y\">here</a></p></body></html>",
            "Plain text with   spaces\tand\ttabs",
            "&lt;b&gt;escaped&lt;/b&gt; markup",
            "<!-- unterminated",
            "Ünïcödé façade – naïve café",
            "http://only.a.link",
            "a < b > c",
        ];
        for input in inputs {
            let once = normalizer.normalize(input);
            assert_eq!(normalizer.normalize(&once), once, "input: {input}");
        }
    }
}
