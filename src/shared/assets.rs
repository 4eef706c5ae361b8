use super::language::Direction;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use tracing::debug;

static IMAGE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp|svg|bmp|ico)(\?[^/]*)?$").unwrap());

static MALFORMED_IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?[:/]*[^\s]*\.(jpg|jpeg|png|gif|webp|svg|bmp|ico)").unwrap()
});

static HOSTED_IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?[:/]*[a-zA-Z0-9.-]+/[^\s]*\.(jpg|jpeg|png|gif|webp|svg|bmp|ico)")
        .unwrap()
});

static INLINE_IMAGE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)https?[:/]*[^\s]+\.(jpg|jpeg|png|gif|webp|svg|bmp|ico)(\?[^\s]*)?").unwrap()
});

static DOMAIN_AND_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?://)([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})(/?.*)$").unwrap());

static NUMBERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+\.)\s*(.*)$").unwrap());

static BULLET_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([•\-*])\s*(.*)$").unwrap());

/// Notice shown in place of a standalone image line that failed to load.
pub const IMAGE_LOAD_FAILED: &str = "לא ניתן לטעון את התמונה (שגיאת SSL/CORS)";

/// Notice shown in place of an image found inside a line of text.
pub const INLINE_IMAGE_FAILED: &str = "שגיאה בטעינת תמונה";

/// Fix the common ways a bot mangles a URL: a scheme missing its `//`, and a
/// path glued onto the domain without its leading slash.
pub fn repair_url(raw: &str) -> String {
    let mut fixed = raw.trim().to_string();

    if fixed.starts_with("https:") && !fixed.starts_with("https://") {
        fixed = fixed.replacen("https:", "https://", 1);
    }
    if fixed.starts_with("http:") && !fixed.starts_with("http://") {
        fixed = fixed.replacen("http:", "http://", 1);
    }

    if let Some(caps) = DOMAIN_AND_PATH.captures(&fixed) {
        let path = &caps[3];
        if !path.is_empty() && !path.starts_with('/') {
            fixed = format!("{}{}/{}", &caps[1], &caps[2], path);
        }
    }

    fixed
}

/// True when the whole of `text` reads as a link to an image.
pub fn looks_like_image_url(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let fixed = repair_url(trimmed);
    match Url::parse(&fixed) {
        Ok(url) => IMAGE_EXTENSION.is_match(url.path()),
        Err(e) => {
            debug!("Not a parseable URL ({}): {}", e, trimmed);
            IMAGE_EXTENSION.is_match(trimmed)
                || MALFORMED_IMAGE_URL.is_match(trimmed)
                || HOSTED_IMAGE_URL.is_match(trimmed)
        }
    }
}

/// An image to display, with what to show if it cannot be loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDescriptor {
    /// Repaired URL to load.
    pub url: String,
    /// Text as it appeared in the message, used as the fallback link label.
    pub fallback_text: String,
    /// Shown next to the fallback link.
    pub fallback_notice: &'static str,
}

impl ImageDescriptor {
    /// An image that makes up a whole line.
    pub fn from_text(text: &str) -> Self {
        Self {
            url: repair_url(text),
            fallback_text: text.trim().to_string(),
            fallback_notice: IMAGE_LOAD_FAILED,
        }
    }

    /// An image URL found inside a line of text.
    pub fn inline(text: &str) -> Self {
        Self {
            fallback_notice: INLINE_IMAGE_FAILED,
            ..Self::from_text(text)
        }
    }
}

/// Every image URL embedded in a line, in order of appearance.
pub fn find_inline_images(line: &str) -> Vec<ImageDescriptor> {
    INLINE_IMAGE_URL
        .find_iter(line.trim())
        .map(|m| ImageDescriptor::inline(m.as_str()))
        .collect()
}

/// A list line whose marker must sit on the trailing edge for Hebrew items.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListItem {
    Numbered {
        marker: String,
        text: String,
        direction: Direction,
    },
    Bullet {
        text: String,
        direction: Direction,
    },
}

impl ListItem {
    pub fn detect(line: &str) -> Option<Self> {
        if let Some(caps) = NUMBERED_ITEM.captures(line) {
            let text = caps[2].to_string();
            return Some(ListItem::Numbered {
                marker: caps[1].to_string(),
                direction: Direction::of(&text),
                text,
            });
        }

        BULLET_ITEM.captures(line).map(|caps| {
            let text = caps[2].to_string();
            ListItem::Bullet {
                direction: Direction::of(&text),
                text,
            }
        })
    }
}

/// Display treatment of one line of a text segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineAsset {
    /// The whole line is an image URL.
    Image { image: ImageDescriptor },
    /// Images found inside the line. The surrounding text is not shown.
    Images { images: Vec<ImageDescriptor> },
    List { item: ListItem },
    Break,
    Plain { text: String, direction: Direction },
}

impl LineAsset {
    pub fn classify(line: &str) -> Self {
        let trimmed = line.trim();

        if looks_like_image_url(trimmed) {
            return LineAsset::Image {
                image: ImageDescriptor::from_text(trimmed),
            };
        }

        let images = find_inline_images(trimmed);
        if !images.is_empty() {
            return LineAsset::Images { images };
        }

        if let Some(item) = ListItem::detect(line) {
            return LineAsset::List { item };
        }

        if trimmed.is_empty() {
            return LineAsset::Break;
        }

        LineAsset::Plain {
            text: line.to_string(),
            direction: Direction::of(line),
        }
    }
}
