use std::collections::VecDeque;

use serde::Serialize;

/// Trailing span kept by the score window, in milliseconds.
pub const WINDOW_MS: u64 = 3_500;
/// Recency decay rate: a sample at the window edge weighs `exp(-2)` of a fresh one.
const DECAY_RATE: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSample {
    /// Raw score already multiplied by `confidence`.
    pub score: f64,
    pub time: u64,
    pub confidence: f64,
}

impl ScoreSample {
    /// Recency weight of this sample as seen at `now`.
    pub fn weight(&self, now: u64, span_ms: u64) -> f64 {
        let age = now.saturating_sub(self.time) as f64 / span_ms as f64;
        (-DECAY_RATE * age).exp() * self.confidence
    }
}

/// Recency-weighted mean over the trailing window of per-frame scores.
///
/// Samples decay continuously with age rather than dropping off a fixed-size
/// buffer; anything `span_ms` or older is evicted on every update.
#[derive(Debug, Clone)]
pub struct ScoreWindow {
    samples: VecDeque<ScoreSample>,
    span_ms: u64,
}

impl Default for ScoreWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreWindow {
    pub fn new() -> Self {
        Self::with_span(WINDOW_MS)
    }

    pub fn with_span(span_ms: u64) -> Self {
        Self {
            samples: VecDeque::new(),
            span_ms: span_ms.max(1),
        }
    }

    /// Records one frame and returns the smoothed score at `now`.
    pub fn update(&mut self, raw_score: f64, confidence: f64, now: u64) -> f64 {
        self.samples.push_back(ScoreSample {
            score: raw_score * confidence,
            time: now,
            confidence,
        });
        self.prune(now);
        self.smoothed(now)
    }

    pub fn smoothed(&self, now: u64) -> f64 {
        let mut total_weight = 0.0;
        let mut weighted = 0.0;
        for sample in &self.samples {
            let w = sample.weight(now, self.span_ms);
            total_weight += w;
            weighted += sample.score * w;
        }

        let denominator = if total_weight == 0.0 { 1.0 } else { total_weight };
        weighted / denominator
    }

    fn prune(&mut self, now: u64) {
        let span = self.span_ms;
        self.samples.retain(|s| now.saturating_sub(s.time) < span);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Scores of the `n` most recent samples, oldest first.
    pub fn recent_scores(&self, n: usize) -> Vec<f64> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).map(|s| s.score).collect()
    }
}
