//! Selector-driven extraction of listing items from a rendered page.
//!
//! Each site names an item-list selector plus title, link and image selectors
//! evaluated inside every list element. Elements that do not yield a title and
//! an absolute link are dropped individually; they never abort the page.

use anyhow::{anyhow, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

use crate::config::{ExtractionConfig, SiteConfig};
use crate::types::{DropReason, ElementOutcome, Item, RawItem};

/// Where a site keeps its preview image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStrategy {
    /// Lazy-load attributes, then `src`.
    Attributes,
    /// Attributes first, then an inline `background-image: url(...)` style.
    BackgroundStyle,
}

/// Extraction quirks of a known site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteVariant {
    pub image: ImageStrategy,
}

impl Default for SiteVariant {
    fn default() -> Self { Self { image: ImageStrategy::Attributes } }
}

/// Known sites with non-default extraction. Lookup is by exact site name.
const SITE_VARIANTS: &[(&str, SiteVariant)] = &[
    // Vuetify `v-img` renders covers as a div background.
    ("nshens", SiteVariant { image: ImageStrategy::BackgroundStyle }),
];

pub fn variant_for(site_name: &str) -> SiteVariant {
    SITE_VARIANTS
        .iter()
        .find(|(name, _)| *name == site_name)
        .map(|(_, v)| *v)
        .unwrap_or_default()
}

/// Compiled selectors of one site.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    pub items: Selector,
    pub title: Selector,
    pub link: Selector,
    pub image: Selector,
}

impl SiteSelectors {
    pub fn compile(site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            items: parse_selector(&site.name, "item_list_selector", &site.item_list_selector)?,
            title: parse_selector(&site.name, "title_selector", &site.title_selector)?,
            link: parse_selector(&site.name, "link_selector", &site.link_selector)?,
            image: parse_selector(&site.name, "image_selector", &site.image_selector)?,
        })
    }
}

fn parse_selector(site: &str, field: &str, raw: &str) -> Result<Selector> {
    if raw.trim().is_empty() {
        return Err(anyhow!("site {site}: {field} is empty"));
    }
    Selector::parse(raw).map_err(|e| anyhow!("site {site}: invalid {field} `{raw}`: {e:?}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dropped {
    /// Position of the element in the item list.
    pub index: usize,
    pub reason: DropReason,
}

/// Items in document order plus the elements that were dropped.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub items: Vec<Item>,
    pub dropped: Vec<Dropped>,
}

pub struct Extractor<'a> {
    site: &'a SiteConfig,
    rules: &'a ExtractionConfig,
    base: Url,
    selectors: SiteSelectors,
    variant: SiteVariant,
}

impl<'a> Extractor<'a> {
    pub fn new(site: &'a SiteConfig, rules: &'a ExtractionConfig) -> Result<Self> {
        Ok(Self {
            base: site.base_url()?,
            selectors: SiteSelectors::compile(site)?,
            variant: variant_for(&site.name),
            site,
            rules,
        })
    }

    pub fn variant(&self) -> SiteVariant { self.variant }

    pub fn extract(&self, document: &Html) -> Extraction {
        let mut out = Extraction::default();
        for (index, element) in document.select(&self.selectors.items).enumerate() {
            match self.extract_element(element) {
                ElementOutcome::Kept(item) => out.items.push(item),
                ElementOutcome::Dropped(reason) => {
                    debug!(site = %self.site.name, index, %reason, "dropping element");
                    out.dropped.push(Dropped { index, reason });
                }
            }
        }
        out
    }

    pub fn extract_element(&self, element: ElementRef<'_>) -> ElementOutcome {
        match Item::from_raw(&self.site.name, self.read_raw(element)) {
            Ok(item) => ElementOutcome::Kept(item),
            Err(reason) => ElementOutcome::Dropped(reason),
        }
    }

    fn read_raw(&self, element: ElementRef<'_>) -> RawItem {
        RawItem {
            title: self.read_title(element),
            link: self.read_link(element),
            image: self.read_image(element),
        }
    }

    fn read_title(&self, element: ElementRef<'_>) -> String {
        let Some(node) = select_within(element, &self.selectors.title) else {
            return String::new();
        };
        // Only text-node titles have inner whitespace collapsed.
        if let Some(attr) = self.site.title_attr.as_deref() {
            if let Some(v) = node.value().attr(attr).map(str::trim).filter(|v| !v.is_empty()) {
                return v.to_string();
            }
        }
        collapse_whitespace(&node.text().collect::<String>())
    }

    fn read_link(&self, element: ElementRef<'_>) -> String {
        select_within(element, &self.selectors.link)
            .and_then(|node| node.value().attr(&self.site.link_attr))
            .and_then(|raw| resolve_url(&self.base, raw))
            .unwrap_or_default()
    }

    fn read_image(&self, element: ElementRef<'_>) -> String {
        let Some(node) = select_within(element, &self.selectors.image) else {
            return String::new();
        };
        let from_attrs = self
            .rules
            .image_attrs
            .iter()
            .filter_map(|attr| node.value().attr(attr))
            .map(str::trim)
            .find(|v| !is_placeholder(v, self.rules));
        let chosen = match (from_attrs, self.variant.image) {
            (Some(v), _) => Some(v.to_string()),
            (None, ImageStrategy::BackgroundStyle) => {
                node.value().attr("style").and_then(background_image_url)
            }
            (None, ImageStrategy::Attributes) => None,
        };
        chosen.and_then(|v| resolve_url(&self.base, &v)).unwrap_or_default()
    }
}

/// First descendant matching `selector`, or the element itself when it matches.
fn select_within<'a>(element: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    element
        .select(selector)
        .next()
        .or_else(|| selector.matches(&element).then_some(element))
}

/// Resolve `raw` against `base`. Relative, protocol-relative and absolute
/// inputs all come out as one absolute URL.
pub fn resolve_url(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    base.join(raw).ok().map(|u| u.to_string())
}

/// Lazy-load placeholders: empty values, inline data URIs, placeholder
/// suffixes (matched on the path only) and loading markers.
pub fn is_placeholder(value: &str, rules: &ExtractionConfig) -> bool {
    if value.is_empty() || value.starts_with("data:") {
        return true;
    }
    let lower = value.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or_default();
    rules.placeholder_suffixes.iter().any(|s| path.ends_with(&s.to_ascii_lowercase()))
        || rules.placeholder_markers.iter().any(|m| lower.contains(&m.to_ascii_lowercase()))
}

/// Pull the URL out of `background-image: url("...")`; quotes are optional.
pub fn background_image_url(style: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"]*))\s*\)"#).expect("static regex")
    });
    let caps = re.captures(style)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
