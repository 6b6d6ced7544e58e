//! Rendering-layer contract for the review listing.
//!
//! The pipeline only ever talks to a [`Page`]: wait until cards render, snapshot
//! every card currently rendered, reveal more via scroll, close when done.
//! [`HttpPage`] is the production implementation: it fetches listing chunks
//! over HTTP and keeps every chunk received so far, so `query_all` re-scans the
//! full accumulated card set exactly like a browser page that keeps appending
//! lazy-loaded content.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A text-bearing element inside a card.
pub struct Element<'a>(ElementRef<'a>);

impl<'a> Element<'a> {
    /// Visible text, one line per text node, trimmed.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for piece in self.0.text() {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(piece);
        }
        out
    }

    pub fn query_all(&self, selector: &Selector) -> Vec<Element<'a>> {
        self.0.select(selector).map(Element).collect()
    }
}

/// One rendered review card, detached from the page it came from.
pub struct Card {
    doc: Html,
}

impl Card {
    pub fn from_fragment(html: &str) -> Self {
        Self {
            doc: Html::parse_fragment(html),
        }
    }

    pub fn query(&self, selector: &Selector) -> Option<Element<'_>> {
        self.doc.select(selector).next().map(Element)
    }
}

#[async_trait]
pub trait Page {
    /// Block until at least one element matches, or fail after `timeout`.
    async fn wait_for_ready(&mut self, selector: &Selector, timeout: Duration) -> Result<()>;

    /// Snapshot of every matching card currently rendered, top to bottom.
    fn query_all(&self, selector: &Selector) -> Vec<Card>;

    /// Reveal more lazy-loaded content.
    async fn scroll_to_bottom(&mut self) -> Result<()>;

    async fn close(&mut self);
}

/// Detach every match in `html` into an owned [`Card`].
pub(crate) fn cards_in(html: &str, selector: &Selector) -> Vec<Card> {
    let doc = Html::parse_document(html);
    doc.select(selector)
        .map(|el| Card::from_fragment(&el.html()))
        .collect()
}

pub struct HttpPage {
    client: Client,
    url: String,
    chunks: Vec<String>,
    next_chunk: u32,
}

/// Open the listing and fetch its first chunk.
pub async fn navigate(client: Client, url: &str) -> Result<HttpPage> {
    info!(url, "Opening review listing");
    let body = fetch(&client, url).await?;
    Ok(HttpPage {
        client,
        url: url.to_string(),
        chunks: vec![body],
        next_chunk: 2,
    })
}

async fn fetch(client: &Client, url: &str) -> Result<String> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

impl HttpPage {
    fn chunk_url(&self, n: u32) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}p={}", self.url, sep, n)
    }
}

#[async_trait]
impl Page for HttpPage {
    async fn wait_for_ready(&mut self, selector: &Selector, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.query_all(selector).is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("Listing not ready within {:.1}s: no match for selector", timeout.as_secs_f64());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
            match fetch(&self.client, &self.url).await {
                Ok(body) => self.chunks[0] = body,
                Err(e) => warn!(error = %e, "Readiness re-fetch failed"),
            }
        }
    }

    fn query_all(&self, selector: &Selector) -> Vec<Card> {
        self.chunks
            .iter()
            .flat_map(|chunk| cards_in(chunk, selector))
            .collect()
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        let url = self.chunk_url(self.next_chunk);
        debug!(url, "Fetching next listing chunk");
        let body = fetch(&self.client, &url).await?;
        self.chunks.push(body);
        self.next_chunk += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.chunks.clear();
        info!("Review listing closed");
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_text_trims_and_joins_nodes() {
        let sel = Selector::parse("div.found_helpful").unwrap();
        let cards = cards_in(
            r#"<div class="found_helpful">  12 people found this review helpful <br>
                3 people found this review funny </div>"#,
            &sel,
        );
        assert_eq!(cards.len(), 1);
        let text = cards[0].query(&sel).unwrap().text();
        assert_eq!(
            text,
            "12 people found this review helpful\n3 people found this review funny"
        );
    }

    #[test]
    fn cards_are_detached_snapshots() {
        let card_sel = Selector::parse("div.apphub_Card").unwrap();
        let hours_sel = Selector::parse("div.hours").unwrap();
        let html = r#"
            <div class="apphub_Card"><div class="hours">1.2 hrs</div></div>
            <div class="apphub_Card"><div class="hours">3.4 hrs</div></div>"#;
        let cards = cards_in(html, &card_sel);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].query(&hours_sel).unwrap().text(), "1.2 hrs");
        assert_eq!(cards[1].query(&hours_sel).unwrap().text(), "3.4 hrs");
    }

    #[test]
    fn chunk_urls_extend_the_listing_query() {
        let page = HttpPage {
            client: Client::new(),
            url: "https://example.test/reviews/?browsefilter=toprated".into(),
            chunks: Vec::new(),
            next_chunk: 2,
        };
        assert_eq!(
            page.chunk_url(2),
            "https://example.test/reviews/?browsefilter=toprated&p=2"
        );
    }
}
