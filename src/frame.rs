use crate::bbox::{BBox, Xywh};

use image::RgbImage;
use ndarray::ArrayViewD;

/// Maps boxes from network-input (blob) pixels to output-image pixels.
pub trait BlobMapping {
    fn map(&self, bbox: BBox<Xywh>) -> BBox<Xywh>;
}

/// Blob and image share one coordinate space.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl BlobMapping for Identity {
    #[inline]
    fn map(&self, bbox: BBox<Xywh>) -> BBox<Xywh> {
        bbox
    }
}

/// Undoes an aspect-preserving resize: `image = (blob - pad) / scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Fits `image` into `blob`, centering it with padding.
    pub fn fit(image: (u32, u32), blob: (u32, u32)) -> Self {
        let (iw, ih) = (image.0.max(1) as f32, image.1.max(1) as f32);
        let (bw, bh) = (blob.0 as f32, blob.1 as f32);
        let scale = (bw / iw).min(bh / ih);

        Self {
            scale,
            pad_x: (bw - iw * scale) / 2.0,
            pad_y: (bh - ih * scale) / 2.0,
        }
    }
}

impl BlobMapping for Letterbox {
    fn map(&self, bbox: BBox<Xywh>) -> BBox<Xywh> {
        if self.scale <= 0.0 {
            return bbox;
        }

        BBox::xywh(
            (bbox.cx() - self.pad_x) / self.scale,
            (bbox.cy() - self.pad_y) / self.scale,
            bbox.width() / self.scale,
            bbox.height() / self.scale,
        )
    }
}

/// Everything the pipeline consumes for one frame.
pub struct Frame<'a> {
    /// one tensor per output scale, in scale order
    pub outputs: Vec<ArrayViewD<'a, f32>>,
    pub blob_dims: (u32, u32),
    pub image: Option<&'a RgbImage>,
}

impl<'a> Frame<'a> {
    pub fn new(outputs: Vec<ArrayViewD<'a, f32>>, blob_dims: (u32, u32)) -> Self {
        Self {
            outputs,
            blob_dims,
            image: None,
        }
    }

    pub fn with_image(mut self, image: &'a RgbImage) -> Self {
        self.image = Some(image);
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
