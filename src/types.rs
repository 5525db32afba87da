use std::fmt;
use url::Url;

/// Fields read from one listing element before validation. Empty means "not found".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    pub image: String,
}

/// A validated listing entry. The link is its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub site_name: String,
    pub title: String,
    pub link: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingTitle,
    MissingLink,
    /// Link resolved to something other than http(s), e.g. `javascript:`.
    UnsupportedLink(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::MissingTitle => write!(f, "missing title"),
            DropReason::MissingLink => write!(f, "missing link"),
            DropReason::UnsupportedLink(l) => write!(f, "unsupported link: {l}"),
        }
    }
}

/// Result of processing a single element of the item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementOutcome {
    Kept(Item),
    Dropped(DropReason),
}

impl Item {
    /// Validate a raw extraction. Title and link must be non-empty and the
    /// link an absolute http(s) URL.
    pub fn from_raw(site_name: &str, raw: RawItem) -> Result<Item, DropReason> {
        let title = raw.title.trim();
        let link = raw.link.trim();
        if link.is_empty() {
            return Err(DropReason::MissingLink);
        }
        match Url::parse(link) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => return Err(DropReason::UnsupportedLink(link.to_string())),
        }
        if title.is_empty() {
            return Err(DropReason::MissingTitle);
        }
        let image = Some(raw.image.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Item {
            site_name: site_name.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            image,
        })
    }
}
