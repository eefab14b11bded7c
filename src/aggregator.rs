use facematch_vision::{Embedding, FaceExtractor, FrameSource};
use serde::Serialize;

use crate::config::Config;
use crate::extract::extract_frame;
use crate::sampler::FrameSampler;

/// Every embedding found in one pass over a video, in frame then detection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptorSet {
    pub count: usize,
    pub descriptors: Vec<Embedding>,
}

impl DescriptorSet {
    pub fn new(descriptors: Vec<Embedding>) -> Self {
        Self {
            count: descriptors.len(),
            descriptors,
        }
    }
}

/// Runs the extractor over every sampled frame of `source`.
///
/// Always consumes the whole stream. Frames the extractor fails on are
/// logged and skipped.
pub fn aggregate<S, E>(source: S, extractor: &mut E, cfg: &Config) -> DescriptorSet
where
    S: FrameSource,
    E: FaceExtractor + ?Sized,
{
    let mut sampler = FrameSampler::new(source, cfg.sampling_interval);
    let mut descriptors = Vec::new();
    let mut skipped = 0usize;

    for frame in sampler.by_ref() {
        match extract_frame(extractor, &frame) {
            Ok(found) => descriptors.extend(found),
            Err(e) => {
                log::warn!("{}", e);
                skipped += 1;
            }
        }
    }

    let report = sampler.finish();
    log::info!(
        "read {} frame(s), sampled {}, skipped {}, collected {} descriptor(s) ({})",
        report.frames_read,
        report.frames_sampled,
        skipped,
        descriptors.len(),
        report
            .end
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    );

    DescriptorSet::new(descriptors)
}
