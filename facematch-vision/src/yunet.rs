//! YuNet output decoding.
//!
//! YuNet is anchor-free: every cell of the stride-8, -16 and -32 grids predicts
//! a classification score, an objectness score, a box and five landmarks
//! relative to the cell. The exported graph emits twelve tensors in the order
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, .., kps_32`.

use anyhow::{bail, Result};
use ndarray::Array2;

const STRIDES: [usize; 3] = [8, 16, 32];

/// Detection in coordinates normalized to the square detector input.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10],
}

/// Per-stride prediction heads.
#[derive(Debug)]
pub struct Heads {
    input_size: usize,
    scores: Vec<Array2<f32>>,
    boxes: Vec<Array2<f32>>,
    keypoints: Vec<Array2<f32>>,
}

impl Heads {
    /// Builds the heads from `(shape, data)` pairs in graph output order.
    pub fn parse(outputs: &[(Vec<i64>, Vec<f32>)], input_size: usize) -> Result<Self> {
        if outputs.len() < 12 {
            bail!("expected 12 detector outputs, got {}", outputs.len());
        }

        let head = |group: usize, width: usize| -> Result<Vec<Array2<f32>>> {
            STRIDES
                .iter()
                .enumerate()
                .map(|(scale, &stride)| -> Result<Array2<f32>> {
                    let idx = group * 3 + scale;
                    let (shape, data) = &outputs[idx];
                    let cells = (input_size / stride).pow(2);
                    if shape.len() != 3
                        || shape[0] != 1
                        || shape[1] as usize != cells
                        || shape[2] as usize != width
                    {
                        bail!(
                            "detector output {} has shape {:?}, expected [1, {}, {}]",
                            idx,
                            shape,
                            cells,
                            width
                        );
                    }
                    Ok(Array2::from_shape_vec((cells, width), data.clone())?)
                })
                .collect()
        };

        let cls = head(0, 1)?;
        let obj = head(1, 1)?;
        let scores = cls
            .iter()
            .zip(&obj)
            .map(|(c, o)| {
                let mut s = c * o;
                s.mapv_inplace(|v| v.clamp(0.0, 1.0).sqrt());
                s
            })
            .collect();

        Ok(Self {
            input_size,
            scores,
            boxes: head(2, 4)?,
            keypoints: head(3, 10)?,
        })
    }

    /// Decodes every cell scoring at least `score_threshold`.
    pub fn decode(&self, score_threshold: f32) -> Vec<RawDetection> {
        let size = self.input_size as f32;
        let mut out = Vec::new();

        for (scale, &stride) in STRIDES.iter().enumerate() {
            let grid = self.input_size / stride;
            let s = stride as f32;
            let scores = &self.scores[scale];
            let boxes = &self.boxes[scale];
            let kps = &self.keypoints[scale];

            for row in 0..grid {
                for col in 0..grid {
                    let idx = row * grid + col;
                    let score = scores[[idx, 0]];
                    if score < score_threshold {
                        continue;
                    }

                    let cx = (col as f32 + boxes[[idx, 0]]) * s / size;
                    let cy = (row as f32 + boxes[[idx, 1]]) * s / size;
                    let w = boxes[[idx, 2]] * s / size;
                    let h = boxes[[idx, 3]] * s / size;

                    let mut landmarks = [0.0f32; 10];
                    for k in 0..5 {
                        landmarks[k * 2] = (col as f32 + kps[[idx, k * 2]]) * s / size;
                        landmarks[k * 2 + 1] = (row as f32 + kps[[idx, k * 2 + 1]]) * s / size;
                    }

                    out.push(RawDetection {
                        bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                        score,
                        landmarks,
                    });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: usize = 640;

    /// Twelve all-zero outputs with one confident cell on the stride-32 grid.
    fn outputs_with_cell(row: usize, col: usize) -> Vec<(Vec<i64>, Vec<f32>)> {
        let mut outputs = Vec::new();
        for width in [1usize, 1, 4, 10] {
            for stride in STRIDES {
                let cells = (INPUT / stride).pow(2);
                outputs.push((
                    vec![1, cells as i64, width as i64],
                    vec![0.0; cells * width],
                ));
            }
        }
        let grid = INPUT / 32;
        let idx = row * grid + col;
        outputs[2].1[idx] = 0.9; // cls_32
        outputs[5].1[idx] = 0.9; // obj_32
        let bbox = &mut outputs[8].1;
        bbox[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.3, 4.0, 4.0]);
        outputs
    }

    #[test]
    fn test_decode_single_cell() {
        let heads = Heads::parse(&outputs_with_cell(10, 10), INPUT).unwrap();
        let detections = heads.decode(0.5);
        assert_eq!(detections.len(), 1);
        let d = &detections[0];

        // centre (10.5 * 32, 10.3 * 32) / 640 = (0.525, 0.515), side 4 * 32 / 640 = 0.2
        assert!((d.bbox[0] - 0.425).abs() < 1e-5);
        assert!((d.bbox[1] - 0.415).abs() < 1e-5);
        assert!((d.bbox[2] - 0.2).abs() < 1e-5);
        assert!((d.bbox[3] - 0.2).abs() < 1e-5);
        assert!((d.score - 0.9).abs() < 1e-5);
        // zero landmark offsets sit on the cell corner
        assert!((d.landmarks[0] - 0.5).abs() < 1e-5);
        assert!((d.landmarks[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_filters_everything() {
        let heads = Heads::parse(&outputs_with_cell(3, 7), INPUT).unwrap();
        assert!(heads.decode(0.95).is_empty());
    }

    #[test]
    fn test_rejects_wrong_shapes() {
        let mut outputs = outputs_with_cell(0, 0);
        outputs[7].0 = vec![1, 1600, 5];
        assert!(Heads::parse(&outputs, INPUT).is_err());
        assert!(Heads::parse(&outputs[..11], INPUT).is_err());
    }
}
