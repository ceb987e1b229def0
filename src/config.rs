use crate::color::ColorConfig;
use crate::context::{ContextConfig, ContextProfile};
use crate::decoder::DecoderConfig;
use crate::nms::NmsConfig;
use crate::tracker::TrackerConfig;

use log::warn;
use serde_derive::{Deserialize, Serialize};

/// All tuning of a [`Pipeline`](crate::Pipeline), one section per stage.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub decoder: DecoderConfig,
    pub nms: NmsConfig,
    pub color: ColorConfig,
    pub tracker: TrackerConfig,
    pub context: ContextConfig,
}

fn clamp_f32(name: &str, value: &mut f32, min: f32, max: f32) {
    let clamped = if value.is_nan() {
        min
    } else {
        value.clamp(min, max)
    };

    if clamped != *value {
        warn!("config: {} = {} out of range, clamped to {}", name, value, clamped);
        *value = clamped;
    }
}

fn clamp_usize(name: &str, value: &mut usize, min: usize, max: usize) {
    let clamped = (*value).clamp(min, max);

    if clamped != *value {
        warn!("config: {} = {} out of range, clamped to {}", name, value, clamped);
        *value = clamped;
    }
}

fn clamp_profile(name: &str, profile: &mut ContextProfile) {
    clamp_f32(name, &mut profile.max_distance, 1.0, f32::MAX);
}

impl Config {
    /// Pulls every value back into its usable range. Never fails.
    pub fn sanitize(&mut self) {
        let d = &mut self.decoder;
        clamp_f32("decoder.detection_threshold", &mut d.detection_threshold, 0.0, 1.0);
        clamp_f32("decoder.confidence_threshold", &mut d.confidence_threshold, 0.0, 1.0);
        clamp_f32("decoder.scale_xy", &mut d.scale_xy, 1.0, 4.0);
        clamp_usize("decoder.num_classes", &mut d.num_classes, 1, usize::MAX);

        let n = &mut self.nms;
        clamp_f32("nms.iou_threshold", &mut n.iou_threshold, 0.0, 1.0);
        clamp_usize("nms.max_boxes", &mut n.max_boxes, 1, usize::MAX);

        let c = &mut self.color;
        clamp_f32("color.margin", &mut c.margin, 0.0, 0.49);
        clamp_usize("color.step", &mut c.step, 1, usize::MAX);
        clamp_f32("color.min_saturation", &mut c.min_saturation, 0.0, 255.0);
        clamp_f32("color.min_value", &mut c.min_value, 0.0, 255.0);

        let t = &mut self.tracker;
        clamp_f32("tracker.max_distance", &mut t.max_distance, 1.0, f32::MAX);
        clamp_f32("tracker.match_threshold", &mut t.match_threshold, 0.0, f32::MAX);
        clamp_f32("tracker.color_weight", &mut t.color_weight, 0.0, 1.0);
        clamp_f32("tracker.prediction_weight", &mut t.prediction_weight, 0.0, 1.0);
        clamp_f32("tracker.class_mismatch_penalty", &mut t.class_mismatch_penalty, 0.0, 1.0);
        clamp_f32("tracker.class_weight", &mut t.class_weight, 0.0, 1.0);
        clamp_usize("tracker.history_len", &mut t.history_len, 2, usize::MAX);

        let cue_weight = t.color_weight + t.prediction_weight;
        if cue_weight > 1.0 {
            warn!(
                "config: tracker.color_weight + tracker.prediction_weight = {} exceeds 1, rescaled",
                cue_weight
            );
            t.color_weight /= cue_weight;
            t.prediction_weight /= cue_weight;
        }

        let x = &mut self.context;
        clamp_usize("context.history_len", &mut x.history_len, 1, usize::MAX);
        clamp_usize("context.min_history", &mut x.min_history, 1, x.history_len);
        clamp_profile("context.indoor.max_distance", &mut x.indoor);
        clamp_profile("context.city.max_distance", &mut x.city);
        clamp_profile("context.highway.max_distance", &mut x.highway);
    }

    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}
