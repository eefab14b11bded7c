use facematch_vision::{Embedding, FaceExtractor};

use crate::error::ExtractionError;
use crate::sampler::SampledFrame;

/// Detects and encodes every face in one sampled frame, in detection order.
///
/// A frame without faces yields an empty list and skips the encoder.
pub fn extract_frame<E: FaceExtractor + ?Sized>(
    extractor: &mut E,
    frame: &SampledFrame,
) -> Result<Vec<Embedding>, ExtractionError> {
    let wrap = |source: anyhow::Error| ExtractionError {
        frame: frame.index,
        source,
    };

    let detections = extractor.detect_faces(&frame.image).map_err(wrap)?;
    if detections.is_empty() {
        log::debug!("frame {}: no faces", frame.index);
        return Ok(Vec::new());
    }

    let embeddings = extractor
        .encode_faces(&frame.image, &detections)
        .map_err(wrap)?;
    if embeddings.len() != detections.len() {
        return Err(wrap(anyhow::anyhow!(
            "extractor returned {} embeddings for {} faces",
            embeddings.len(),
            detections.len()
        )));
    }

    log::debug!("frame {}: {} face(s)", frame.index, embeddings.len());
    Ok(embeddings)
}
