use facematch_vision::{Embedding, FaceExtractor, FrameSource, Metric};
use serde::Serialize;

use crate::config::Config;
use crate::extract::extract_frame;
use crate::sampler::FrameSampler;

/// `{"match": bool}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    #[serde(rename = "match")]
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionState {
    Scanning,
    /// First candidate within tolerance.
    Matched { frame: usize, distance: f32 },
    /// Stream ended without a match.
    Exhausted,
}

impl DecisionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecisionState::Scanning)
    }

    pub fn result(&self) -> MatchResult {
        MatchResult {
            matched: matches!(self, DecisionState::Matched { .. }),
        }
    }
}

/// Any-face match test of candidates against one reference embedding.
pub struct MatchDecider<'a> {
    reference: &'a Embedding,
    tolerance: f32,
    metric: Metric,
    state: DecisionState,
    closest: Option<f32>,
}

impl<'a> MatchDecider<'a> {
    pub fn new(reference: &'a Embedding, tolerance: f32, metric: Metric) -> Self {
        Self {
            reference,
            tolerance,
            metric,
            state: DecisionState::Scanning,
            closest: None,
        }
    }

    pub fn state(&self) -> &DecisionState {
        &self.state
    }

    /// Smallest distance seen so far.
    pub fn closest(&self) -> Option<f32> {
        self.closest
    }

    /// Tests the candidates of one frame in order. Ignored once terminal.
    pub fn offer(&mut self, frame: usize, candidates: &[Embedding]) -> &DecisionState {
        if self.state.is_terminal() {
            return &self.state;
        }
        for candidate in candidates {
            let Some(distance) = self.metric.distance(self.reference, candidate) else {
                log::warn!(
                    "frame {}: candidate has {} values, reference has {}; skipping",
                    frame,
                    candidate.len(),
                    self.reference.len()
                );
                continue;
            };
            self.closest = Some(self.closest.map_or(distance, |c| c.min(distance)));
            if distance <= self.tolerance {
                self.state = DecisionState::Matched { frame, distance };
                break;
            }
        }
        &self.state
    }

    /// Marks the stream as ended. A match already reached is kept.
    pub fn finish(mut self) -> DecisionState {
        if !self.state.is_terminal() {
            self.state = DecisionState::Exhausted;
        }
        self.state
    }
}

/// Scans sampled frames of `source` until a face matches `reference` or the
/// stream ends. No frame is read after the matching one.
pub fn decide<S, E>(
    source: S,
    extractor: &mut E,
    reference: &Embedding,
    cfg: &Config,
) -> DecisionState
where
    S: FrameSource,
    E: FaceExtractor + ?Sized,
{
    let mut sampler = FrameSampler::new(source, cfg.sampling_interval);
    let mut decider = MatchDecider::new(reference, cfg.match_tolerance, cfg.metric);
    let mut skipped = 0usize;

    for frame in sampler.by_ref() {
        match extract_frame(extractor, &frame) {
            Ok(candidates) => {
                if decider.offer(frame.index, &candidates).is_terminal() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("{}", e);
                skipped += 1;
            }
        }
    }

    let closest = decider.closest();
    let state = decider.finish();
    let report = sampler.finish();

    match &state {
        DecisionState::Matched { frame, distance } => log::info!(
            "match at frame {} (distance {:.4} <= {:.4}) after reading {} frame(s)",
            frame,
            distance,
            cfg.match_tolerance,
            report.frames_read
        ),
        _ => log::info!(
            "no match in {} frame(s) ({} sampled, {} skipped, closest {}, {})",
            report.frames_read,
            report.frames_sampled,
            skipped,
            closest.map_or_else(|| "n/a".to_string(), |d| format!("{:.4}", d)),
            report
                .end
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        ),
    }

    state
}
