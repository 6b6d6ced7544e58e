use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;
use tracing::debug;

use crate::db::Review;
use crate::render::Card;

pub static CARD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.apphub_Card").unwrap());

static AUTHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.apphub_CardContentAuthorName").unwrap());
static AUTHOR_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static HOURS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.hours").unwrap());
static DATE_POSTED: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.date_posted").unwrap());
static CONTENT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.apphub_CardTextContent").unwrap());
static FOUND_HELPFUL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.found_helpful").unwrap());

static HELPFUL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*) people found this review helpful").unwrap());
static FUNNY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*) people found this review funny").unwrap());

/// Pull one candidate review out of a card. Each field degrades independently
/// to its default when its sub-element is missing; an empty body rejects the
/// whole card.
pub fn extract_review(card: &Card, app_id: i32) -> Option<Review> {
    // The profile link is the last anchor in the author block; earlier anchors
    // carry avatar and badge markup.
    let username = card
        .query(&AUTHOR)
        .map(|author| author.query_all(&AUTHOR_LINK))
        .and_then(|links| links.last().map(|a| a.text()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let hours_played = card
        .query(&HOURS)
        .map(|e| e.text())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let posted_date = card
        .query(&DATE_POSTED)
        .map(|e| e.text().replace("Posted:", "").trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let body = card
        .query(&CONTENT)
        .map(|e| e.text().trim().to_string())
        .unwrap_or_default();
    if body.is_empty() {
        debug!("Skipping card with empty review body");
        return None;
    }

    let (helpful_count, funny_count) = card
        .query(&FOUND_HELPFUL)
        .map(|e| {
            let text = e.text();
            (vote_count(&text, &HELPFUL_RE), vote_count(&text, &FUNNY_RE))
        })
        .unwrap_or((0, 0));

    Some(Review {
        username,
        hours_played,
        posted_date,
        body,
        helpful_count,
        funny_count,
        app_id,
    })
}

/// Leading count out of "<N> people found this review …" text; numbers may
/// carry thousands separators. No match means 0.
fn vote_count(text: &str, re: &Regex) -> i32 {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::cards_in;

    fn fixture_cards() -> Vec<Card> {
        let html = std::fs::read_to_string("tests/fixtures/review_cards.html").unwrap();
        cards_in(&html, &CARD_SELECTOR)
    }

    #[test]
    fn full_card_extracts_every_field() {
        let cards = fixture_cards();
        let r = extract_review(&cards[0], 220).unwrap();
        assert_eq!(r.username, "grizzled_vet");
        assert_eq!(r.hours_played, "1,024.5 hrs on record");
        assert_eq!(r.posted_date, "14 June");
        assert!(r.body.contains("Still the best co-op shooter"));
        assert_eq!(r.helpful_count, 1234);
        assert_eq!(r.funny_count, 56);
        assert_eq!(r.app_id, 220);
    }

    #[test]
    fn missing_subelements_degrade_to_defaults() {
        let cards = fixture_cards();
        let r = extract_review(&cards[1], 220).unwrap();
        assert_eq!(r.username, "Unknown");
        assert_eq!(r.hours_played, "Unknown");
        assert_eq!(r.posted_date, "Unknown");
        assert_eq!(r.body, "Bare-bones card, still a valid review.");
        assert_eq!(r.helpful_count, 0);
        assert_eq!(r.funny_count, 0);
    }

    #[test]
    fn empty_body_rejects_the_card() {
        let cards = fixture_cards();
        assert!(extract_review(&cards[2], 220).is_none());
    }

    #[test]
    fn posted_label_is_stripped() {
        let cards = fixture_cards();
        let r = extract_review(&cards[3], 220).unwrap();
        assert_eq!(r.posted_date, "2 January, 2014");
    }

    #[test]
    fn vote_counts_strip_thousands_separators() {
        assert_eq!(
            vote_count("1,234 people found this review helpful", &HELPFUL_RE),
            1234
        );
        assert_eq!(vote_count("7 people found this review funny", &FUNNY_RE), 7);
    }

    #[test]
    fn absent_vote_phrases_default_to_zero() {
        assert_eq!(vote_count("Award", &HELPFUL_RE), 0);
        assert_eq!(vote_count("Award", &FUNNY_RE), 0);
        assert_eq!(
            vote_count("5 people found this review helpful", &FUNNY_RE),
            0
        );
    }
}
