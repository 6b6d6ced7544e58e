use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::batch::{BatchBuffer, ReviewSink};
use crate::config::HarvestConfig;
use crate::dedup::SeenBodies;
use crate::extract::{extract_review, CARD_SELECTOR};
use crate::render::Page;

pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HarvestStats {
    pub accepted: usize,
    pub target: usize,
    pub scans: usize,
    /// True when the stall guard ended the run before the target was met.
    pub stalled: bool,
}

/// Drive the listing until `target` new reviews are accepted, or the stall
/// guard gives up. Each pass re-scans every card rendered so far: the listing
/// accumulates cards as scrolling proceeds, so re-encountering an accepted
/// card is expected and collapses in the dedup set.
pub async fn run<P: Page>(
    page: &mut P,
    cfg: &HarvestConfig,
    mut seen: SeenBodies,
    sinks: &mut [Box<dyn ReviewSink>],
    target: usize,
) -> Result<HarvestStats> {
    page.wait_for_ready(&CARD_SELECTOR, READY_TIMEOUT)
        .await
        .context("Review listing never became ready")?;
    info!(known = seen.len(), target, "Listing ready, starting scan loop");

    let pb = ProgressBar::new(target as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} reviews")?
            .progress_chars("=> "),
    );

    let mut batch = BatchBuffer::new(cfg.batch_size);
    let mut accepted = 0usize;
    let mut scans = 0usize;
    let mut stalled_scans = 0u32;
    let mut stalled = false;

    while accepted < target {
        let cards = page.query_all(&CARD_SELECTOR);
        scans += 1;
        let accepted_before = accepted;

        for card in &cards {
            let Some(review) = extract_review(card, cfg.app_id) else {
                continue;
            };
            if !seen.accept(&review.body) {
                continue;
            }

            batch.add(review);
            accepted += 1;
            pb.set_position(accepted as u64);

            if batch.should_flush() {
                batch.flush(sinks).await;
            }
            if accepted >= target {
                break;
            }
        }

        info!(accepted, target, rendered = cards.len(), "Scan complete");
        if accepted >= target {
            break;
        }

        if accepted == accepted_before {
            stalled_scans += 1;
            if cfg.stall_limit > 0 && stalled_scans >= cfg.stall_limit {
                warn!(
                    scans = stalled_scans,
                    accepted,
                    target,
                    "Listing stopped yielding new reviews, stopping early"
                );
                stalled = true;
                break;
            }
        } else {
            stalled_scans = 0;
        }

        if let Err(e) = page.scroll_to_bottom().await {
            warn!(error = %e, "Scroll failed, re-scanning current snapshot");
        }
        tokio::time::sleep(cfg.scroll_delay).await;
    }

    batch.drain_on_exit(sinks).await;
    pb.finish_and_clear();

    Ok(HarvestStats {
        accepted,
        target,
        scans,
        stalled,
    })
}

// ── Tests ──
