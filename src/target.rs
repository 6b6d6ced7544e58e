use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::info;

use crate::config;

/// How many new reviews this run should collect before stopping.
#[derive(Debug, Clone, Copy)]
pub enum TargetMode {
    /// Fixed cap from configuration.
    Fixed(usize),
    /// Scrape the total review count off the app's store page. Failure to
    /// locate or parse the indicator is fatal; there is no fallback cap.
    StorePage,
}

static REVIEW_COUNT_META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[itemprop="reviewCount"]"#).unwrap());
static REVIEW_SUMMARY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.user_reviews_summary_row span.responsive_hidden").unwrap());
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d[\d,]*)").unwrap());

pub async fn resolve_target(client: &Client, app_id: i32, mode: TargetMode) -> Result<usize> {
    match mode {
        TargetMode::Fixed(cap) => Ok(cap),
        TargetMode::StorePage => {
            let url = config::store_page_url(app_id);
            info!(url, "Resolving total review count from store page");
            let html = client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
                .context("Failed to fetch store page")?;
            let total = count_from_document(&html)?;
            info!(total, "Store page reports total reviews");
            Ok(total)
        }
    }
}

/// Locate the review-count indicator in a store page document. The structured
/// `reviewCount` meta tag is the primary source; the visible "(N)" next to the
/// review summary is the fallback.
pub fn count_from_document(html: &str) -> Result<usize> {
    let doc = Html::parse_document(html);

    let text = doc
        .select(&REVIEW_COUNT_META)
        .next()
        .and_then(|meta| meta.value().attr("content").map(str::to_string))
        .or_else(|| {
            doc.select(&REVIEW_SUMMARY)
                .next()
                .map(|el| el.text().collect::<String>())
        });

    let Some(text) = text else {
        bail!("Review count indicator not found on store page");
    };
    parse_count(&text).with_context(|| format!("Unparseable review count {text:?}"))
}

/// First integer in the text, thousands separators stripped.
fn parse_count(text: &str) -> Result<usize> {
    let caps = COUNT_RE
        .captures(text)
        .context("No digits in review count text")?;
    Ok(caps[1].replace(',', "").parse()?)
}

// ── Tests ──
