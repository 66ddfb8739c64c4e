//! Post model for published blog posts.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{Image, TermId, User, UserId};

/// Post identifier (`ID` in the posts table).
pub type PostId = i64;

/// Status of a post that is not (or no longer) published.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Publish,
    Future,
    Draft,
    Trash,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Publish => "publish",
            PostStatus::Future => "future",
            PostStatus::Draft => "draft",
            PostStatus::Trash => "trash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "publish" => Some(PostStatus::Publish),
            "future" => Some(PostStatus::Future),
            "draft" => Some(PostStatus::Draft),
            "trash" => Some(PostStatus::Trash),
            _ => None,
        }
    }
}

/// Anything that carries a publication date.
pub trait Dated {
    fn date(&self) -> DateTime<Utc>;
}

impl Dated for DateTime<Utc> {
    fn date(&self) -> DateTime<Utc> {
        *self
    }
}

/// A published post with its terms bound.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub date: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub name: String,
    /// Permalink path, `/YYYY/MM/<name>`
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// `crop` meta of the thumbnail attachment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_crop: Option<String>,
    /// Thumbnail `<width>x<height>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_size: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
    /// Gallery attachments by id; `None` when the attachment is gone
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub gallery: BTreeMap<PostId, Option<Image>>,
    pub categories: Vec<TermId>,
    pub tags: Vec<TermId>,
}

impl Post {
    pub fn new(id: PostId, title: &str, date: DateTime<Utc>, name: Option<&str>) -> Self {
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => slugify(title),
        };
        Self {
            id,
            title: title.to_string(),
            content: String::new(),
            excerpt: None,
            date,
            modified: date,
            slug: permalink(date, &name),
            name,
            author_id: None,
            author: None,
            thumbnail: None,
            thumbnail_crop: None,
            thumbnail_size: None,
            meta: BTreeMap::new(),
            gallery: BTreeMap::new(),
            categories: Vec::new(),
            tags: Vec::new(),
        }
    }
}

impl Dated for Post {
    fn date(&self) -> DateTime<Utc> {
        self.date
    }
}

fn permalink(date: DateTime<Utc>, name: &str) -> String {
    format!("/{}/{:02}/{}", date.year(), date.month(), name)
}

/// Lowercase ASCII slug with single dashes between words.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Parse a `YYYY-MM-DD HH:MM:SS` column as UTC.
///
/// Zero dates (`0000-00-00 00:00:00`) and anything unparsable map to the Unix epoch,
/// which the archive index ignores.
pub fn parse_gmt_date(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|v| NaiveDateTime::parse_from_str(v.trim(), "%Y-%m-%d %H:%M:%S").ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Format a timestamp the way the posts table stores it.
pub fn format_gmt_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_slug_uses_name() {
        let date = Utc.with_ymd_and_hms(2011, 11, 3, 10, 0, 0).unwrap();
        let post = Post::new(1, "Bacon ipsum", date, Some("bacon-ipsum"));
        assert_eq!(post.slug, "/2011/11/bacon-ipsum");
    }

    #[test]
    fn test_post_slug_falls_back_to_title() {
        let date = Utc.with_ymd_and_hms(2009, 8, 1, 0, 0, 0).unwrap();
        let post = Post::new(2, "Ham, andouille & speck!", date, Some(""));
        assert_eq!(post.slug, "/2009/08/ham-andouille-speck");
    }

    #[test]
    fn test_parse_gmt_date() {
        let date = parse_gmt_date(Some("2011-10-10 08:30:00"));
        assert_eq!(date, Utc.with_ymd_and_hms(2011, 10, 10, 8, 30, 0).unwrap());
        assert_eq!(format_gmt_date(date), "2011-10-10 08:30:00");

        assert_eq!(parse_gmt_date(Some("0000-00-00 00:00:00")), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(parse_gmt_date(None), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_post_status() {
        assert_eq!(PostStatus::parse("future"), Some(PostStatus::Future));
        assert_eq!(PostStatus::Trash.as_str(), "trash");
        assert_eq!(PostStatus::parse("inherit"), None);
    }
}
