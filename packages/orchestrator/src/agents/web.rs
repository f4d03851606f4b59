//! Web scraping agent.
//!
//! Fetches a catalog page over HTTP and runs it through a chain of
//! [`SiteExtractor`]s. Site-specific extractors recognize known listing
//! layouts; a generic fallback pulls whatever product signals it can find
//! from an arbitrary page. Requests are rate limited per agent instance.

use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use indexmap::IndexMap;
use nonzero_ext::nonzero;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::traits::agent::{AgentOutcome, ExtractionAgent};
use crate::types::record::RawExtract;
use crate::types::source::{Source, SourceType};

type DefaultRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const MAX_ITEMS_PER_PAGE: usize = 50;

/// Pulls catalog items out of a fetched page.
///
/// Extractors are consulted in registration order; the first one that both
/// matches the URL and yields at least one item wins.
pub trait SiteExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this extractor recognizes the page at `url`.
    fn matches(&self, url: &Url) -> bool;

    /// Extract raw catalog items from the page body.
    fn extract(&self, html: &str, url: &Url) -> Vec<IndexMap<String, Value>>;
}

/// Extraction agent for web sources.
pub struct WebScrapingAgent {
    client: reqwest::Client,
    limiter: DefaultRateLimiter,
    extractors: Vec<Box<dyn SiteExtractor>>,
}

impl WebScrapingAgent {
    /// Create an agent with the default extractor chain: listing-page
    /// extraction first, generic single-page fallback last.
    pub fn new() -> Self {
        Self::with_requests_per_second(nonzero!(2u32))
    }

    /// Create an agent capped at `rps` outgoing requests per second.
    pub fn with_requests_per_second(rps: NonZeroU32) -> Self {
        Self {
            client: reqwest::Client::new(),
            limiter: RateLimiter::direct(Quota::per_second(rps)),
            extractors: vec![
                Box::new(ListingPageExtractor::new()),
                Box::new(GenericPageExtractor::new()),
            ],
        }
    }

    /// Prepend a site-specific extractor so it is consulted before the
    /// built-in chain.
    pub fn with_extractor(mut self, extractor: Box<dyn SiteExtractor>) -> Self {
        self.extractors.insert(0, extractor);
        self
    }

    fn extract_items(&self, html: &str, url: &Url) -> Option<(String, Vec<IndexMap<String, Value>>)> {
        for extractor in &self.extractors {
            if !extractor.matches(url) {
                continue;
            }
            let items = extractor.extract(html, url);
            if !items.is_empty() {
                debug!(
                    extractor = extractor.name(),
                    items = items.len(),
                    url = %url,
                    "page extracted"
                );
                return Some((extractor.name().to_string(), items));
            }
        }
        None
    }
}

impl Default for WebScrapingAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionAgent for WebScrapingAgent {
    fn name(&self) -> &str {
        "web_scraper"
    }

    fn supports(&self, source_type: SourceType) -> bool {
        source_type == SourceType::Web
    }

    async fn attempt(&self, source: &Source) -> AgentOutcome {
        let url = match Url::parse(&source.locator) {
            Ok(url) => url,
            Err(err) => {
                return AgentOutcome::permanent(format!(
                    "invalid URL `{}`: {err}",
                    source.locator
                ))
            }
        };

        self.limiter.until_ready().await;

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(err) => return classify_transport_error(&err),
        };

        let status = response.status();
        if !status.is_success() {
            return classify_http_status(status);
        }

        let html = match response.text().await {
            Ok(html) => html,
            Err(err) => return classify_transport_error(&err),
        };

        match self.extract_items(&html, &url) {
            Some((_, items)) => {
                let mut raw = RawExtract::new();
                for item in items.into_iter().take(MAX_ITEMS_PER_PAGE) {
                    raw = raw.with_item(item);
                }
                AgentOutcome::Success(raw)
            }
            None => AgentOutcome::permanent(format!("no catalog items recognized at {url}")),
        }
    }
}

fn classify_transport_error(err: &reqwest::Error) -> AgentOutcome {
    if err.is_builder() {
        // Malformed request, retrying cannot help.
        AgentOutcome::permanent(format!("request could not be built: {err}"))
    } else {
        AgentOutcome::retryable(format!("transport error: {err}"))
    }
}

fn classify_http_status(status: StatusCode) -> AgentOutcome {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AgentOutcome::retryable(format!("server responded {status}"))
    } else {
        AgentOutcome::permanent(format!("server responded {status}"))
    }
}

/// Recognizes listing pages (search results, category grids) and extracts
/// one item per result card.
pub struct ListingPageExtractor {
    item_block: Regex,
    title: Regex,
    price: Regex,
    image: Regex,
    link: Regex,
}

impl ListingPageExtractor {
    pub fn new() -> Self {
        Self {
            item_block: Regex::new(
                r#"(?s)<(?:li|div|article)[^>]*class="[^"]*(?:ui-search-result|search-result|product-card|product-item|catalog-item)[^"]*"[^>]*>(.*?)</(?:li|div|article)>"#,
            )
            .expect("static regex"),
            title: Regex::new(r"(?s)<(?:h[1-4]|a)[^>]*>\s*([^<]+?)\s*<").expect("static regex"),
            price: Regex::new(r"(?:\$|MXN|USD|€)\s*([0-9][0-9.,]*)").expect("static regex"),
            image: Regex::new(r#"<img[^>]*src="([^"]+)""#).expect("static regex"),
            link: Regex::new(r#"<a[^>]*href="([^"]+)""#).expect("static regex"),
        }
    }
}

impl Default for ListingPageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteExtractor for ListingPageExtractor {
    fn name(&self) -> &str {
        "listing_page"
    }

    fn matches(&self, _url: &Url) -> bool {
        // Layout is detected from the markup, not the URL.
        true
    }

    fn extract(&self, html: &str, url: &Url) -> Vec<IndexMap<String, Value>> {
        let mut items = Vec::new();

        for block in self.item_block.captures_iter(html) {
            let body = &block[1];

            let title = self
                .title
                .captures(body)
                .map(|c| collapse_text(&c[1]))
                .filter(|t| !t.is_empty());
            let Some(title) = title else { continue };

            let mut item: IndexMap<String, Value> = IndexMap::new();
            item.insert("title".to_string(), json!(title));

            if let Some(c) = self.price.captures(body) {
                item.insert("price".to_string(), json!(c[1].to_string()));
            }
            if let Some(c) = self.link.captures(body) {
                if let Some(href) = resolve_href(url, &c[1]) {
                    item.insert("link".to_string(), json!(href));
                }
            }
            if let Some(c) = self.image.captures(body) {
                if let Some(src) = resolve_href(url, &c[1]) {
                    item.insert("img".to_string(), json!(src));
                }
            }

            items.push(item);
            if items.len() >= MAX_ITEMS_PER_PAGE {
                break;
            }
        }

        items
    }
}

/// Fallback extractor: treats the whole page as a single product and pulls
/// title, first price and the og:image if present.
pub struct GenericPageExtractor {
    title: Regex,
    heading: Regex,
    price: Regex,
    og_image: Regex,
}

impl GenericPageExtractor {
    pub fn new() -> Self {
        Self {
            title: Regex::new(r"(?s)<title[^>]*>\s*([^<]+?)\s*</title>").expect("static regex"),
            heading: Regex::new(r"(?s)<h1[^>]*>\s*([^<]+?)\s*</h1>").expect("static regex"),
            price: Regex::new(r"(?:\$|MXN|USD|€)\s*([0-9][0-9.,]*)").expect("static regex"),
            og_image: Regex::new(
                r#"<meta[^>]*property="og:image"[^>]*content="([^"]+)""#,
            )
            .expect("static regex"),
        }
    }
}

impl Default for GenericPageExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteExtractor for GenericPageExtractor {
    fn name(&self) -> &str {
        "generic_page"
    }

    fn matches(&self, _url: &Url) -> bool {
        true
    }

    fn extract(&self, html: &str, url: &Url) -> Vec<IndexMap<String, Value>> {
        let title = self
            .heading
            .captures(html)
            .or_else(|| self.title.captures(html))
            .map(|c| collapse_text(&c[1]))
            .filter(|t| !t.is_empty());
        let price = self.price.captures(html).map(|c| c[1].to_string());

        // A bare page with neither a title nor a price carries no catalog
        // signal worth recording.
        if title.is_none() && price.is_none() {
            return Vec::new();
        }

        let mut item: IndexMap<String, Value> = IndexMap::new();
        if let Some(title) = title {
            item.insert("title".to_string(), json!(title));
        }
        if let Some(price) = price {
            item.insert("price".to_string(), json!(price));
        }
        if let Some(c) = self.og_image.captures(html) {
            if let Some(src) = resolve_href(url, &c[1]) {
                item.insert("img".to_string(), json!(src));
            }
        }
        item.insert("url".to_string(), json!(url.to_string()));

        vec![item]
    }
}

fn collapse_text(raw: &str) -> String {
    let decoded = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_href(base: &Url, href: &str) -> Option<String> {
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::fields;

    const LISTING_HTML: &str = r#"
        <html><body>
        <ul>
          <li class="ui-search-result">
            <a href="/item/1"><h2> Wireless &amp; Wired Mouse </h2></a>
            <img src="https://cdn.example.com/1.jpg">
            <span class="price">$ 249.90</span>
          </li>
          <li class="ui-search-result">
            <a href="/item/2"><h2>Mechanical Keyboard</h2></a>
            <span class="price">MXN 1,299</span>
          </li>
        </ul>
        </body></html>
    "#;

    #[test]
    fn test_listing_extractor_reads_result_cards() {
        let extractor = ListingPageExtractor::new();
        let url = Url::parse("https://shop.example.com/listado/peripherals").unwrap();

        let items = extractor.extract(LISTING_HTML, &url);
        assert_eq!(items.len(), 2);

        assert_eq!(items[0]["title"], json!("Wireless & Wired Mouse"));
        assert_eq!(items[0]["price"], json!("249.90"));
        assert_eq!(items[0]["link"], json!("https://shop.example.com/item/1"));
        assert_eq!(items[0]["img"], json!("https://cdn.example.com/1.jpg"));

        assert_eq!(items[1]["title"], json!("Mechanical Keyboard"));
        assert_eq!(items[1]["price"], json!("1,299"));
        assert!(items[1].get("img").is_none());
    }

    #[test]
    fn test_generic_extractor_falls_back_to_single_item() {
        let extractor = GenericPageExtractor::new();
        let url = Url::parse("https://example.com/product/42").unwrap();
        let html = r#"
            <html><head>
              <title>Standing Desk - Shop</title>
              <meta property="og:image" content="/images/desk.png">
            </head>
            <body><h1>Standing Desk</h1><p>Only $ 4,500.00 today</p></body></html>
        "#;

        let items = extractor.extract(html, &url);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], json!("Standing Desk"));
        assert_eq!(items[0]["price"], json!("4,500.00"));
        assert_eq!(items[0]["img"], json!("https://example.com/images/desk.png"));
        assert_eq!(items[0]["url"], json!("https://example.com/product/42"));
    }

    #[test]
    fn test_generic_extractor_ignores_empty_pages() {
        let extractor = GenericPageExtractor::new();
        let url = Url::parse("https://example.com/").unwrap();
        assert!(extractor.extract("<html><body></body></html>", &url).is_empty());
    }

    #[test]
    fn test_http_status_classification() {
        use crate::graph::OutcomeKind;

        assert_eq!(
            classify_http_status(StatusCode::TOO_MANY_REQUESTS).kind(),
            OutcomeKind::Retryable
        );
        assert_eq!(
            classify_http_status(StatusCode::SERVICE_UNAVAILABLE).kind(),
            OutcomeKind::Retryable
        );
        assert_eq!(
            classify_http_status(StatusCode::NOT_FOUND).kind(),
            OutcomeKind::Permanent
        );
        assert_eq!(
            classify_http_status(StatusCode::FORBIDDEN).kind(),
            OutcomeKind::Permanent
        );
    }

    #[test]
    fn test_raw_field_names_normalize_to_canonical() {
        use crate::types::record::NormalizedRecord;
        use crate::types::source::SourceId;

        let extractor = ListingPageExtractor::new();
        let url = Url::parse("https://shop.example.com/search?q=mouse").unwrap();
        let items = extractor.extract(LISTING_HTML, &url);

        let mut raw = RawExtract::new();
        for item in items {
            raw = raw.with_item(item);
        }
        let record = NormalizedRecord::from_raw(SourceId::new(), "web_scraper", raw);

        assert_eq!(record.items[0].fields[fields::NAME], json!("Wireless & Wired Mouse"));
        assert_eq!(record.items[0].fields[fields::PRICE], json!("249.90"));
        assert_eq!(
            record.items[0].fields[fields::PAGE],
            json!("https://shop.example.com/item/1")
        );
        assert_eq!(
            record.items[0].fields[fields::IMAGE],
            json!("https://cdn.example.com/1.jpg")
        );
    }
}
