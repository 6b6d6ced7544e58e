use async_trait::async_trait;
use tracing::{debug, info};

use crate::db::Review;

/// A durable destination for accepted reviews. Sinks log their own success or
/// failure and never surface an error to the pipeline: a sink outage degrades
/// that batch to memory-only progress, it does not abort the scrape.
#[async_trait]
pub trait ReviewSink {
    fn name(&self) -> &'static str;

    async fn write_batch(&mut self, reviews: &[Review]);
}

/// Accepted reviews waiting for the next flush. Holds at most `capacity`
/// records; records leave only through a flush, in acceptance order.
pub struct BatchBuffer {
    reviews: Vec<Review>,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            reviews: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&mut self, review: Review) {
        self.reviews.push(review);
    }

    pub fn should_flush(&self) -> bool {
        self.reviews.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.reviews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviews.is_empty()
    }

    /// Hand the buffered batch to every sink, then clear. The buffer clears
    /// whether or not a sink managed to persist it; the dedup set guarantees
    /// the rendering layer cannot produce these records again this run.
    pub async fn flush(&mut self, sinks: &mut [Box<dyn ReviewSink>]) {
        if self.is_empty() {
            return;
        }
        for sink in sinks.iter_mut() {
            debug!(sink = sink.name(), count = self.reviews.len(), "Writing batch");
            sink.write_batch(&self.reviews).await;
        }
        self.reviews.clear();
    }

    /// Final flush at loop termination, normal or early.
    pub async fn drain_on_exit(&mut self, sinks: &mut [Box<dyn ReviewSink>]) {
        if !self.is_empty() {
            info!(count = self.len(), "Flushing final partial batch");
            self.flush(sinks).await;
        }
    }
}

// ── Tests ──

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Test sink that records every batch it receives.
    pub struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<Review>>>>,
    }

    impl RecordingSink {
        pub fn new() -> (Self, Arc<Mutex<Vec<Vec<Review>>>>) {
            let batches = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    batches: Arc::clone(&batches),
                },
                batches,
            )
        }
    }

    #[async_trait]
    impl ReviewSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn write_batch(&mut self, reviews: &[Review]) {
            self.batches.lock().unwrap().push(reviews.to_vec());
        }
    }

    pub fn review(body: &str) -> Review {
        Review {
            username: "someone".to_string(),
            hours_played: "1.0 hrs on record".to_string(),
            posted_date: "1 January".to_string(),
            body: body.to_string(),
            helpful_count: 0,
            funny_count: 0,
            app_id: 220,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{review, RecordingSink};
    use super::*;

    #[tokio::test]
    async fn should_flush_at_capacity() {
        let mut buffer = BatchBuffer::new(3);
        buffer.add(review("a"));
        buffer.add(review("b"));
        assert!(!buffer.should_flush());
        buffer.add(review("c"));
        assert!(buffer.should_flush());
    }

    #[tokio::test]
    async fn flush_hands_same_batch_to_every_sink_in_order() {
        let (sink_a, batches_a) = RecordingSink::new();
        let (sink_b, batches_b) = RecordingSink::new();
        let mut sinks: Vec<Box<dyn ReviewSink>> = vec![Box::new(sink_a), Box::new(sink_b)];

        let mut buffer = BatchBuffer::new(2);
        buffer.add(review("first"));
        buffer.add(review("second"));
        buffer.flush(&mut sinks).await;

        assert!(buffer.is_empty());
        for batches in [batches_a, batches_b] {
            let batches = batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            let bodies: Vec<&str> = batches[0].iter().map(|r| r.body.as_str()).collect();
            assert_eq!(bodies, ["first", "second"]);
        }
    }

    #[tokio::test]
    async fn drain_on_exit_flushes_partial_content_once() {
        let (sink, batches) = RecordingSink::new();
        let mut sinks: Vec<Box<dyn ReviewSink>> = vec![Box::new(sink)];

        let mut buffer = BatchBuffer::new(10);
        buffer.add(review("leftover"));
        buffer.drain_on_exit(&mut sinks).await;
        buffer.drain_on_exit(&mut sinks).await;

        assert!(buffer.is_empty());
        assert_eq!(batches.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_flush_reaches_no_sink() {
        let (sink, batches) = RecordingSink::new();
        let mut sinks: Vec<Box<dyn ReviewSink>> = vec![Box::new(sink)];

        let mut buffer = BatchBuffer::new(2);
        buffer.flush(&mut sinks).await;
        assert!(batches.lock().unwrap().is_empty());
    }
}
