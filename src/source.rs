use facematch_vision::{Camera, FrameSource, VideoFile};
use std::path::PathBuf;

use crate::error::InputError;

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    File(PathBuf),
    Camera { device: String, max_frames: usize },
}

impl SourceSpec {
    fn path(&self) -> PathBuf {
        match self {
            SourceSpec::File(path) => path.clone(),
            SourceSpec::Camera { device, .. } => PathBuf::from(device),
        }
    }
}

/// Opens the source for reading. Fails before any frame is read.
pub fn open_source(spec: &SourceSpec) -> Result<Box<dyn FrameSource>, InputError> {
    let path = spec.path();
    if !path.exists() {
        return Err(InputError::MissingVideo { path });
    }
    let opened: anyhow::Result<Box<dyn FrameSource>> = match spec {
        SourceSpec::File(path) => VideoFile::open(path).map(|v| {
            let (w, h) = v.dimensions();
            log::info!("opened {} ({}x{})", path.display(), w, h);
            Box::new(v) as Box<dyn FrameSource>
        }),
        SourceSpec::Camera { device, max_frames } => Camera::open(device).map(|c| {
            log::info!("opened camera {} for {} frame(s)", device, max_frames);
            Box::new(c.with_frame_limit(*max_frames)) as Box<dyn FrameSource>
        }),
    };
    opened.map_err(|source| InputError::UnreadableVideo { path, source })
}
