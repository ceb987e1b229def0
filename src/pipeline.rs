use crate::color::ColorSampler;
use crate::config::Config;
use crate::context::Context;
use crate::decoder::{ScaleSpec, YoloDecoder};
use crate::error::Error;
use crate::frame::{BlobMapping, Frame, Identity};
use crate::nms::Suppressor;
use crate::tracker::Tracker;
use crate::{Detection, Track};

use log::debug;
use serde_derive::{Deserialize, Serialize};
use std::rc::Rc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Detected,
    /// decoding worked, nothing survived
    Empty,
    /// some outputs could not be decoded
    Degraded,
    /// no output could be decoded; tracks aged as on an empty frame
    DecodeFailed,
}

#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub status: FrameStatus,
    pub tracks: Rc<[Track]>,
    pub context: Context,
    /// detections handed to the tracker
    pub detections: usize,
    pub failures: Vec<Error>,
}

/// Decode, suppress, color and track, one frame per call.
pub struct Pipeline {
    decoder: YoloDecoder,
    suppressor: Suppressor,
    sampler: ColorSampler,
    tracker: Tracker,
    mapping: Box<dyn BlobMapping>,
    frames: u64,
}

impl Pipeline {
    pub fn new(config: Config, scales: Vec<ScaleSpec>) -> Self {
        let config = config.sanitized();

        Self {
            decoder: YoloDecoder::new(config.decoder, scales),
            suppressor: Suppressor::new(config.nms),
            sampler: ColorSampler::new(config.color),
            tracker: Tracker::new(config.tracker, config.context),
            mapping: Box::new(Identity),
            frames: 0,
        }
    }

    pub fn with_mapping<M: BlobMapping + 'static>(mut self, mapping: M) -> Self {
        self.mapping = Box::new(mapping);
        self
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn process(&mut self, frame: &Frame<'_>) -> FrameOutput {
        self.frames += 1;

        let report = self.decoder.decode(&frame.outputs, frame.blob_dims);
        let failed = report.is_failed();
        let degraded = report.is_degraded();
        let candidates = report.detections.len();

        let kept = self.suppressor.suppress(report.detections);
        let detections = self.prepare(kept, frame);

        self.tracker.update(&detections);

        let status = if failed {
            FrameStatus::DecodeFailed
        } else if degraded {
            FrameStatus::Degraded
        } else if detections.is_empty() {
            FrameStatus::Empty
        } else {
            FrameStatus::Detected
        };

        debug!(
            "frame {}: {:?}, {} candidates, {} kept, {} tracks, context {}",
            self.frames,
            status,
            candidates,
            detections.len(),
            self.tracker.scene().len(),
            self.tracker.context()
        );

        FrameOutput {
            status,
            tracks: self.tracker.tracks(),
            context: self.tracker.context(),
            detections: detections.len(),
            failures: report.failures,
        }
    }

    /// Clips to the blob, maps to image space and attaches colors.
    fn prepare(&self, detections: Vec<Detection>, frame: &Frame<'_>) -> Vec<Detection> {
        let (bw, bh) = frame.blob_dims;
        let max_x = bw.saturating_sub(1) as f32;
        let max_y = bh.saturating_sub(1) as f32;

        let image = frame
            .image
            .filter(|_| self.sampler.config().enabled);

        detections
            .into_iter()
            .filter_map(|det| {
                let clipped = det.ltrb().clip(max_x, max_y);
                if clipped.area() <= 0.0 {
                    return None;
                }

                let bbox = self.mapping.map(clipped.as_xywh());
                let mut det = det.with_bbox(bbox);
                det.color = image.map(|img| self.sampler.sample(img, &bbox));

                Some(det)
            })
            .collect()
    }
}
