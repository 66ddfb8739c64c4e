//! Image attachments referenced by posts.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::PostId;

static WIDTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""width";(?:s:[0-9]+:"([0-9]+)"|i:([0-9]+);)"#).expect("valid width regex")
});

static HEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""height";(?:s:[0-9]+:"([0-9]+)"|i:([0-9]+);)"#).expect("valid height regex")
});

static GALLERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[gallery ids="([0-9,]+)""#).expect("valid gallery regex"));

/// An attachment shown in a post gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// `<width>x<height>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Read `<width>x<height>` from a serialized `_wp_attachment_metadata` value.
pub fn parse_dimensions(metadata: &str) -> Option<String> {
    let width = first_number(&WIDTH, metadata)?;
    let height = first_number(&HEIGHT, metadata)?;
    Some(format!("{}x{}", width, height))
}

fn first_number<'a>(pattern: &Regex, metadata: &'a str) -> Option<&'a str> {
    let captures = pattern.captures(metadata)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
}

/// Attachment ids named by every `[gallery ids="..."]` shortcode, in order of
/// first appearance.
pub fn gallery_ids(content: &str) -> Vec<PostId> {
    let mut ids: Vec<PostId> = Vec::new();
    for captures in GALLERY.captures_iter(content) {
        for id in captures[1].split(',').filter_map(|id| id.parse().ok()) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dimensions() {
        let meta = r#"a:3:{s:5:"width";i:1024;s:6:"height";i:768;s:4:"file";s:9:"bacon.jpg";}"#;
        assert_eq!(parse_dimensions(meta).as_deref(), Some("1024x768"));

        let meta = r#"a:2:{s:5:"width";s:3:"640";s:6:"height";s:3:"480";}"#;
        assert_eq!(parse_dimensions(meta).as_deref(), Some("640x480"));
    }

    #[test]
    fn test_parse_dimensions_needs_both() {
        assert_eq!(parse_dimensions(r#"a:1:{s:5:"width";i:10;}"#), None);
        assert_eq!(parse_dimensions(""), None);
    }

    #[test]
    fn test_gallery_ids() {
        let content = r#"Intro [gallery ids="3,1,"] more [gallery ids="x"] [gallery ids="1,7"]"#;
        assert_eq!(gallery_ids(content), vec![3, 1, 7]);
        assert!(gallery_ids("[gallery]").is_empty());
    }
}
