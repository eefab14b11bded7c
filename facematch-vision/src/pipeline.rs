use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;
use std::path::Path;

use crate::face::{self, Detection, FaceExtractor, ALIGNED_FACE_SIZE};
use crate::Embedding;

/// YuNet detection thresholds.
#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            score_threshold: 0.6,
            nms_threshold: 0.3,
        }
    }
}

/// ONNX Runtime face pipeline: YuNet detect → align → SFace encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    settings: DetectorSettings,
}

impl Pipeline {
    pub fn new(detector_model: &Path, recognizer_model: &Path) -> Result<Self> {
        Self::with_settings(detector_model, recognizer_model, DetectorSettings::default())
    }

    pub fn with_settings(
        detector_model: &Path,
        recognizer_model: &Path,
        settings: DetectorSettings,
    ) -> Result<Self> {
        Ok(Self {
            detector: crate::model::detector_session(detector_model)?,
            encoder: crate::model::recog_session(recognizer_model)?,
            settings,
        })
    }

    pub fn settings(&self) -> DetectorSettings {
        self.settings
    }
}

impl FaceExtractor for Pipeline {
    fn detect_faces(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            frame,
            self.settings.score_threshold,
            self.settings.nms_threshold,
        )
        .context("detecting faces")
    }

    fn encode_faces(
        &mut self,
        frame: &DynamicImage,
        detections: &[Detection],
    ) -> Result<Vec<Embedding>> {
        detections
            .iter()
            .map(|detection| {
                let aligned = face::align_face(frame, detection, ALIGNED_FACE_SIZE)
                    .context("aligning face")?;
                face::encode_face(&mut self.encoder, &aligned).context("encoding face")
            })
            .collect()
    }
}
