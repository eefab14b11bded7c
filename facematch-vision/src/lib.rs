pub mod camera;
pub mod embedding;
pub mod face;
pub mod model;
pub mod pipeline;
pub mod video;
pub mod yunet;

// Re-export commonly used types
pub use camera::Camera;
pub use embedding::{Embedding, Metric};
pub use face::{Detection, FaceExtractor};
pub use pipeline::{DetectorSettings, Pipeline};
pub use video::{FrameSource, VideoFile};
