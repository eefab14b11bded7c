use crate::{yunet, Embedding};
use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// Input side of the YuNet detector.
const DETECTOR_INPUT: u32 = 640;
/// Side of the aligned face crop SFace expects.
pub const ALIGNED_FACE_SIZE: u32 = 112;

/// Face found in a frame, in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // eyes, nose tip, mouth corners as x,y pairs
}

/// Turns frames into face embeddings.
///
/// `encode_faces` returns exactly one embedding per detection, in the order
/// the detections were given.
pub trait FaceExtractor {
    fn detect_faces(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>>;

    fn encode_faces(
        &mut self,
        frame: &DynamicImage,
        detections: &[Detection],
    ) -> Result<Vec<Embedding>>;
}

impl<E: FaceExtractor + ?Sized> FaceExtractor for &mut E {
    fn detect_faces(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>> {
        (**self).detect_faces(frame)
    }

    fn encode_faces(
        &mut self,
        frame: &DynamicImage,
        detections: &[Detection],
    ) -> Result<Vec<Embedding>> {
        (**self).encode_faces(frame, detections)
    }
}

/// Letterbox placement of a frame inside the square detector input.
struct Letterbox {
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl Letterbox {
    fn unmap(&self, normalized: f32, offset: f32) -> f32 {
        (normalized * DETECTOR_INPUT as f32 - offset) / self.scale
    }
}

fn letterbox(img: &DynamicImage) -> (RgbImage, Letterbox) {
    let (w, h) = img.dimensions();
    let scale = DETECTOR_INPUT as f32 / w.max(h) as f32;
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);

    let mut canvas = DynamicImage::new_rgb8(DETECTOR_INPUT, DETECTOR_INPUT);
    let offset_x = (DETECTOR_INPUT - new_w) / 2;
    let offset_y = (DETECTOR_INPUT - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

    (
        canvas.to_rgb8(),
        Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        },
    )
}

/// Packs an RGB image into a planar BGR `[1, 3, H, W]` tensor with values in `[0, 255]`.
fn bgr_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    let (b, rest) = data.split_at_mut(plane);
    let (g, r) = rest.split_at_mut(plane);
    for (i, px) in img.pixels().enumerate() {
        r[i] = px[0] as f32;
        g[i] = px[1] as f32;
        b[i] = px[2] as f32;
    }
    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Detect faces in an image with the YuNet detector.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    let (canvas, placement) = letterbox(img);
    let input = Value::from_array(bgr_tensor(&canvas)?)?;
    let outputs = session.run(ort::inputs![input]).context("running detector")?;

    let mut tensors: Vec<(Vec<i64>, Vec<f32>)> = Vec::with_capacity(12);
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.push((shape.iter().copied().collect(), data.to_vec()));
    }
    let heads = yunet::Heads::parse(&tensors, DETECTOR_INPUT as usize)?;
    let raw = heads.decode(score_threshold);

    let detections: Vec<Detection> = raw
        .into_iter()
        .map(|d| {
            let mut landmarks = [0.0f32; 10];
            for (k, lm) in landmarks.iter_mut().enumerate() {
                let offset = if k % 2 == 0 {
                    placement.offset_x
                } else {
                    placement.offset_y
                };
                *lm = placement.unmap(d.landmarks[k], offset);
            }
            Detection {
                bbox: [
                    placement.unmap(d.bbox[0], placement.offset_x),
                    placement.unmap(d.bbox[1], placement.offset_y),
                    d.bbox[2] * DETECTOR_INPUT as f32 / placement.scale,
                    d.bbox[3] * DETECTOR_INPUT as f32 / placement.scale,
                ],
                score: d.score,
                landmarks,
            }
        })
        .collect();

    log::debug!("detector kept {} candidate(s) before nms", detections.len());

    if nms_threshold < 1.0 {
        Ok(nms(&detections, nms_threshold))
    } else {
        Ok(detections)
    }
}

/// Greedy non-maximum suppression. The result is ordered by descending score.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }
    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

/// Rotate, scale and crop a face so its eyes land on the ArcFace reference
/// positions of a `size` x `size` crop.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    // ArcFace eye positions for a 112x112 crop
    const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
    const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);
    let (dx, dy) = (right.0 - left.0, right.1 - left.1);
    let eye_dist = dx.hypot(dy);
    if eye_dist <= f32::EPSILON {
        anyhow::bail!("degenerate eye landmarks");
    }

    let unit = size as f32 / ALIGNED_FACE_SIZE as f32;
    let ref_dist = (REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).hypot(REF_RIGHT_EYE.1 - REF_LEFT_EYE.1);
    let scale = unit * ref_dist / eye_dist;
    let angle = dy.atan2(dx);

    let center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let target = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * unit,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * unit,
    );

    // forward: out = M * in + t, M = scale * [cos sin; -sin cos]
    let (cos, sin) = (angle.cos() * scale, angle.sin() * scale);
    let tx = target.0 - (cos * center.0 + sin * center.1);
    let ty = target.1 - (-sin * center.0 + cos * center.1);
    let det = cos * cos + sin * sin;

    let src = img.to_rgb8();
    let (w, h) = src.dimensions();
    let mut out = RgbImage::new(size, size);

    for oy in 0..size {
        for ox in 0..size {
            let px = ox as f32 - tx;
            let py = oy as f32 - ty;
            let sx = (cos * px - sin * py) / det;
            let sy = (sin * px + cos * py) / det;
            if sx < 0.0 || sy < 0.0 || sx >= w as f32 || sy >= h as f32 {
                continue;
            }
            out.put_pixel(ox, oy, bilinear(&src, sx, sy));
        }
    }

    Ok(DynamicImage::ImageRgb8(out))
}

fn bilinear(src: &RgbImage, x: f32, y: f32) -> image::Rgb<u8> {
    let (w, h) = src.dimensions();
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = src.get_pixel(x0, y0);
    let p10 = src.get_pixel(x1, y0);
    let p01 = src.get_pixel(x0, y1);
    let p11 = src.get_pixel(x1, y1);

    let mut px = [0u8; 3];
    for (c, v) in px.iter_mut().enumerate() {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        *v = (top * (1.0 - fy) + bottom * fy) as u8;
    }
    image::Rgb(px)
}

/// Encode an aligned face crop with SFace. The result is L2-normalized.
pub fn encode_face(session: &mut Session, face_img: &DynamicImage) -> Result<Embedding> {
    let face = face_img
        .resize_exact(
            ALIGNED_FACE_SIZE,
            ALIGNED_FACE_SIZE,
            image::imageops::FilterType::Triangle,
        )
        .to_rgb8();
    let input = Value::from_array(bgr_tensor(&face)?)?;
    let outputs = session.run(ort::inputs![input]).context("running recognizer")?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // [1, 128] for SFace
    let dim = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    if dim == 0 || dim > data.len() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        anyhow::bail!("unexpected recognizer output shape {:?}", dims);
    }

    Ok(Embedding::new(data[..dim].to_vec()).normalized())
}
