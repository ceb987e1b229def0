use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb, Xywh};
use crate::color::ColorDescriptor;

use std::cmp::Ordering;

/// Contains (x,y) of the center and (width,height) of bbox
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: i32,

    // sampled right before association, carried into the matched track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorDescriptor>,
}

impl Detection {
    #[inline]
    pub fn new(bbox: BBox<Xywh>, confidence: f32, class: i32) -> Self {
        Self {
            x: bbox.cx(),
            y: bbox.cy(),
            w: bbox.width(),
            h: bbox.height(),
            confidence,
            class,
            color: None,
        }
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox().iou(&other.bbox())
    }

    #[inline(always)]
    pub fn bbox(&self) -> BBox<Xywh> {
        BBox::xywh(self.x, self.y, self.w, self.h)
    }

    #[inline(always)]
    pub fn ltrb(&self) -> BBox<Ltrb> {
        self.bbox().as_ltrb()
    }

    #[inline]
    pub fn with_bbox(mut self, bbox: BBox<Xywh>) -> Self {
        self.x = bbox.cx();
        self.y = bbox.cy();
        self.w = bbox.width();
        self.h = bbox.height();
        self
    }
}

#[inline]
fn score_rank(confidence: f32) -> f32 {
    if confidence.is_nan() {
        f32::NEG_INFINITY
    } else {
        confidence
    }
}

/// Descending confidence with NaN last; a total order, safe for `sort_by`.
#[inline]
pub fn by_score_desc(a: &Detection, b: &Detection) -> Ordering {
    score_rank(b.confidence).total_cmp(&score_rank(a.confidence))
}
