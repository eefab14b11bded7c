pub mod aggregator;
pub mod config;
pub mod decider;
pub mod error;
pub mod extract;
pub mod reference;
pub mod sampler;
pub mod source;

pub use aggregator::{aggregate, DescriptorSet};
pub use decider::{decide, DecisionState, MatchDecider, MatchResult};
pub use error::{Error, ExtractionError, InputError, StreamEnd};
pub use sampler::{FrameSampler, SampledFrame, SamplerReport};

// Re-export vision types for convenience
pub use facematch_vision::{face, video, Detection, Embedding, FaceExtractor, FrameSource, Metric, Pipeline};
