use crate::bbox::BBox;
use crate::detection::Detection;
use crate::error::{Error, Result};
use crate::sigmoid::{sigmoid, SigmoidTable};

use log::{trace, warn};
use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// Box side exponent limits; keeps `exp` finite on garbage logits.
const MAX_SIZE_LOGIT: f32 = 5.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    /// objectness early-out
    pub detection_threshold: f32,
    /// objectness x class score
    pub confidence_threshold: f32,
    pub num_classes: usize,
    pub scale_xy: f32,
    pub use_sigmoid_table: bool,
    /// false when the engine already emits probabilities
    pub apply_sigmoid: bool,
    pub class_offset: i32,
    /// pre-decoded boxes are in 0..1 and get scaled by the blob size
    pub normalized_boxes: bool,
}

impl DecoderConfig {
    pub fn new(confidence_threshold: f32, num_classes: usize) -> Self {
        Self {
            confidence_threshold,
            num_classes,
            ..Default::default()
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.15,
            confidence_threshold: 0.20,
            num_classes: 80,
            scale_xy: 2.0,
            use_sigmoid_table: true,
            apply_sigmoid: true,
            class_offset: 0,
            normalized_boxes: false,
        }
    }
}

/// Anchors (w, h in blob pixels) and stride of one output scale.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScaleSpec {
    pub stride: f32,
    pub anchors: Vec<(f32, f32)>,
}

impl ScaleSpec {
    pub fn new(stride: f32, anchors: Vec<(f32, f32)>) -> Self {
        Self { stride, anchors }
    }

    /// P3/8, P4/16, P5/32 anchors of YOLOv7-tiny.
    pub fn yolov7_tiny() -> Vec<ScaleSpec> {
        vec![
            ScaleSpec::new(8.0, vec![(10.0, 13.0), (16.0, 30.0), (33.0, 23.0)]),
            ScaleSpec::new(16.0, vec![(30.0, 61.0), (62.0, 45.0), (59.0, 119.0)]),
            ScaleSpec::new(32.0, vec![(116.0, 90.0), (156.0, 198.0), (373.0, 326.0)]),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassColumn {
    /// `[x, y, w, h, conf, score_0 .. score_n]`
    Scores,
    /// `[x, y, w, h, conf, class_id]`
    Index,
}

/// Decode strategy picked once per output tensor from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    AnchorGrid {
        anchors: usize,
        grid_w: usize,
        grid_h: usize,
    },
    PreDecoded {
        rows: usize,
        class_column: ClassColumn,
    },
}

#[derive(Debug, Default)]
pub struct DecodeReport {
    pub detections: Vec<Detection>,
    pub failures: Vec<Error>,
    pub outputs: usize,
}

impl DecodeReport {
    /// No output tensor could be decoded at all.
    #[inline]
    pub fn is_failed(&self) -> bool {
        self.failures.len() >= self.outputs.max(1)
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty() && !self.is_failed()
    }
}

/// Per-cell grid indices laid out as `[grid_h, grid_w]`.
#[derive(Debug)]
pub struct GridOffsets {
    pub xs: Array2<f32>,
    pub ys: Array2<f32>,
}

#[derive(Debug, Default)]
pub struct GridCache {
    grids: HashMap<(usize, usize), Rc<GridOffsets>>,
}

impl GridCache {
    pub fn offsets(&mut self, grid_w: usize, grid_h: usize) -> Rc<GridOffsets> {
        self.grids
            .entry((grid_w, grid_h))
            .or_insert_with(|| {
                trace!("building grid offsets for {}x{}", grid_w, grid_h);

                Rc::new(GridOffsets {
                    xs: Array2::from_shape_fn((grid_h, grid_w), |(_, x)| x as f32),
                    ys: Array2::from_shape_fn((grid_h, grid_w), |(y, _)| y as f32),
                })
            })
            .clone()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

pub struct YoloDecoder {
    config: DecoderConfig,
    scales: Vec<ScaleSpec>,
    table: SigmoidTable,
    grids: GridCache,
}

impl YoloDecoder {
    pub fn new(config: DecoderConfig, scales: Vec<ScaleSpec>) -> Self {
        Self {
            config,
            scales,
            table: SigmoidTable::default(),
            grids: GridCache::default(),
        }
    }

    #[inline]
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    #[inline]
    pub fn grid_cache(&self) -> &GridCache {
        &self.grids
    }

    /// Decodes every output; a tensor that fails contributes no candidates
    /// and is recorded in `failures`.
    pub fn decode(&mut self, outputs: &[ArrayViewD<'_, f32>], blob: (u32, u32)) -> DecodeReport {
        let mut report = DecodeReport {
            outputs: outputs.len(),
            ..Default::default()
        };

        if outputs.is_empty() {
            warn!("{}", Error::NoOutputs);
            report.failures.push(Error::NoOutputs);
            return report;
        }

        for (scale, output) in outputs.iter().enumerate() {
            let layout = match self.classify(scale, output.shape()) {
                Ok(layout) => layout,
                Err(err) => {
                    warn!("{}", err);
                    report.failures.push(err);
                    continue;
                }
            };

            let mut candidates = Vec::new();
            let res = match layout {
                TensorLayout::AnchorGrid { .. } => {
                    self.decode_anchor_grid(scale, output, &mut candidates)
                }
                TensorLayout::PreDecoded { class_column, .. } => {
                    self.decode_pre_decoded(scale, output, class_column, blob, &mut candidates)
                }
            };

            match res {
                Ok(()) => {
                    trace!("output {}: {:?} -> {} candidates", scale, layout, candidates.len());
                    report.detections.append(&mut candidates);
                }
                Err(err) => {
                    warn!("{}", err);
                    report.failures.push(err);
                }
            }
        }

        report
    }

    pub fn classify(&self, scale: usize, shape: &[usize]) -> Result<TensorLayout> {
        let per_anchor = 5 + self.config.num_classes;
        let malformed = || Error::MalformedTensorShape {
            scale,
            shape: shape.to_vec(),
        };

        match *shape {
            [1, rows, 6] => Ok(TensorLayout::PreDecoded {
                rows,
                class_column: ClassColumn::Index,
            }),
            [1, rows, cols] | [rows, cols] if cols == per_anchor => Ok(TensorLayout::PreDecoded {
                rows,
                class_column: ClassColumn::Scores,
            }),
            [rows, 6] => Ok(TensorLayout::PreDecoded {
                rows,
                class_column: ClassColumn::Index,
            }),
            [1, channels, grid_h, grid_w] | [channels, grid_h, grid_w] => {
                let layer = self
                    .scales
                    .get(scale)
                    .ok_or(Error::MissingScaleSpec { scale })?;
                let anchors = layer.anchors.len();

                if anchors == 0 || grid_h == 0 || grid_w == 0 || channels != anchors * per_anchor {
                    return Err(malformed());
                }

                Ok(TensorLayout::AnchorGrid {
                    anchors,
                    grid_w,
                    grid_h,
                })
            }
            _ => Err(malformed()),
        }
    }

    #[inline]
    fn activate(&self, x: f32) -> f32 {
        if !self.config.apply_sigmoid {
            x
        } else if self.config.use_sigmoid_table {
            self.table.eval(x)
        } else {
            sigmoid(x)
        }
    }

    fn decode_anchor_grid(
        &mut self,
        scale: usize,
        output: &ArrayViewD<'_, f32>,
        results: &mut Vec<Detection>,
    ) -> Result<()> {
        let malformed = || Error::MalformedTensorShape {
            scale,
            shape: output.shape().to_vec(),
        };

        let view = if output.ndim() == 4 {
            output.index_axis(Axis(0), 0)
        } else {
            output.view()
        };
        let view = view.into_dimensionality::<Ix3>().map_err(|_| malformed())?;
        let layer = self
            .scales
            .get(scale)
            .cloned()
            .ok_or(Error::MissingScaleSpec { scale })?;

        let (grid_h, grid_w) = (view.shape()[1], view.shape()[2]);
        let offsets = self.grids.offsets(grid_w, grid_h);

        let num_classes = self.config.num_classes;
        let per_anchor = 5 + num_classes;
        let sxy = self.config.scale_xy;
        let bias = 0.5 * (sxy - 1.0);

        for (anchor, &(anchor_w, anchor_h)) in layer.anchors.iter().enumerate() {
            let base = anchor * per_anchor;
            let objectness = view.index_axis(Axis(0), base + 4);

            for gy in 0..grid_h {
                for gx in 0..grid_w {
                    let obj = self.activate(objectness[[gy, gx]]);

                    // NaN falls through here too
                    if !(obj >= self.config.detection_threshold) {
                        continue;
                    }

                    let mut class_index = 0;
                    let mut class_conf = f32::NEG_INFINITY;

                    for c in 0..num_classes {
                        let val = self.activate(view[[base + 5 + c, gy, gx]]);

                        if val > class_conf {
                            class_index = c;
                            class_conf = val;
                        }
                    }

                    let score = obj * class_conf;
                    if !(score >= self.config.confidence_threshold) {
                        continue;
                    }

                    let tx = self.activate(view[[base, gy, gx]]);
                    let ty = self.activate(view[[base + 1, gy, gx]]);
                    let tw = view[[base + 2, gy, gx]].clamp(-MAX_SIZE_LOGIT, MAX_SIZE_LOGIT);
                    let th = view[[base + 3, gy, gx]].clamp(-MAX_SIZE_LOGIT, MAX_SIZE_LOGIT);

                    let cx = (tx * sxy - bias + offsets.xs[[gy, gx]]) * layer.stride;
                    let cy = (ty * sxy - bias + offsets.ys[[gy, gx]]) * layer.stride;
                    let w = tw.exp() * anchor_w;
                    let h = th.exp() * anchor_h;

                    let bbox = BBox::xywh(cx, cy, w, h);
                    if !bbox.is_finite() {
                        continue;
                    }

                    results.push(Detection::new(
                        bbox,
                        score,
                        class_index as i32 + self.config.class_offset,
                    ));
                }
            }
        }

        Ok(())
    }

    fn decode_pre_decoded(
        &self,
        scale: usize,
        output: &ArrayViewD<'_, f32>,
        class_column: ClassColumn,
        blob: (u32, u32),
        results: &mut Vec<Detection>,
    ) -> Result<()> {
        let malformed = || Error::MalformedTensorShape {
            scale,
            shape: output.shape().to_vec(),
        };

        let view = if output.ndim() == 3 {
            output.index_axis(Axis(0), 0)
        } else {
            output.view()
        };
        let view = view.into_dimensionality::<Ix2>().map_err(|_| malformed())?;

        let (sx, sy) = if self.config.normalized_boxes {
            (blob.0 as f32, blob.1 as f32)
        } else {
            (1.0, 1.0)
        };

        for row in view.outer_iter() {
            let conf = row[4];

            let (class, score) = match class_column {
                ClassColumn::Index => (row[5].round() as i32, conf),
                ClassColumn::Scores => {
                    let mut class_index = 0;
                    let mut class_conf = f32::NEG_INFINITY;

                    for (idx, val) in row.iter().skip(5).copied().enumerate() {
                        if val > class_conf {
                            class_index = idx;
                            class_conf = val;
                        }
                    }

                    (class_index as i32, conf * class_conf)
                }
            };

            if !(score >= self.config.confidence_threshold) {
                continue;
            }

            let bbox = BBox::xywh(row[0] * sx, row[1] * sy, row[2] * sx, row[3] * sy);
            if !bbox.is_finite() {
                continue;
            }

            results.push(Detection::new(bbox, score, class + self.config.class_offset));
        }

        Ok(())
    }
}
