use crate::color::color_similarity;
use crate::context::{Context, ContextClassifier, ContextConfig, ContextProfile};
use crate::detection::by_score_desc;
use crate::scene::{Participant, Scene};
use crate::{Detection, Track};

use log::debug;
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::rc::Rc;

/// Cost term used when a cue is disabled or uninformative.
const NEUTRAL_COST: f32 = 0.5;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// hard association gate, px
    pub max_distance: f32,
    pub max_missing_frames: u32,
    /// matches are accepted strictly below this cost
    pub match_threshold: f32,
    pub color_enabled: bool,
    pub color_weight: f32,
    pub prediction_enabled: bool,
    pub prediction_weight: f32,
    pub class_mismatch_penalty: f32,
    pub class_weight: f32,
    pub history_len: usize,
}

impl TrackerConfig {
    pub fn new(max_distance: f32, max_missing_frames: u32) -> Self {
        Self {
            max_distance,
            max_missing_frames,
            ..Default::default()
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 200.0,
            max_missing_frames: 30,
            match_threshold: 1.8,
            color_enabled: true,
            color_weight: 0.3,
            prediction_enabled: true,
            prediction_weight: 0.3,
            class_mismatch_penalty: 0.8,
            class_weight: 0.2,
            history_len: 5,
        }
    }
}

/// Greedy multi-object tracker with context-adaptive gating.
pub struct Tracker {
    config: TrackerConfig,
    scene: Scene,
    context: ContextClassifier,
}

impl Tracker {
    pub fn new(config: TrackerConfig, context: ContextConfig) -> Self {
        Self {
            config,
            scene: Scene::new(),
            context: ContextClassifier::new(context),
        }
    }

    /// Live values; `max_distance` and `max_missing_frames` follow the
    /// active context once it has switched.
    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[inline]
    pub fn context(&self) -> Context {
        self.context.active()
    }

    #[inline]
    pub fn context_classifier(&self) -> &ContextClassifier {
        &self.context
    }

    pub fn apply_profile(&mut self, profile: ContextProfile) {
        debug!(
            "tracker retuned: max_distance {} -> {}, max_missing_frames {} -> {}",
            self.config.max_distance,
            profile.max_distance,
            self.config.max_missing_frames,
            profile.max_missing_frames
        );

        self.config.max_distance = profile.max_distance;
        self.config.max_missing_frames = profile.max_missing_frames;
    }

    /// Association cost of `det` against `p`; `f32::INFINITY` past the
    /// distance gate.
    pub fn cost(&self, det: &Detection, p: &Participant) -> f32 {
        let cfg = &self.config;
        let max_distance = cfg.max_distance.max(f32::EPSILON);
        let center = det.bbox().center();

        let dist = na::distance(&center, &p.center());
        if !(dist <= max_distance) {
            return f32::INFINITY;
        }

        let (prediction_weight, prediction_cost) = if cfg.prediction_enabled {
            let predicted = p.prediction();
            (
                cfg.prediction_weight,
                na::distance(&center, &predicted) / max_distance,
            )
        } else {
            (0.0, NEUTRAL_COST)
        };

        let (color_weight, color_cost) = if cfg.color_enabled {
            let color = det.color.unwrap_or_default();
            (cfg.color_weight, 1.0 - color_similarity(&color, &p.color))
        } else {
            (0.0, NEUTRAL_COST)
        };

        let class_cost = if det.class == p.class {
            0.0
        } else {
            cfg.class_mismatch_penalty
        };

        let distance_weight = (1.0 - color_weight - prediction_weight).max(0.0);

        dist / max_distance * distance_weight
            + color_cost * color_weight
            + prediction_cost * prediction_weight
            + class_cost * cfg.class_weight
    }

    /// Advances the tracker by one frame. An empty slice ages every track.
    pub fn update(&mut self, detections: &[Detection]) {
        if self.context.config().enabled {
            let speeds: Vec<f32> = self
                .scene
                .iter()
                .map(|p| p.speed().unwrap_or(0.0))
                .collect();

            if let Some(profile) = self.context.observe(detections, &speeds) {
                self.apply_profile(profile);
            }
        }

        let mut order: Vec<usize> = (0..detections.len()).collect();
        order.sort_by(|&a, &b| by_score_desc(&detections[a], &detections[b]));

        let mut used = BTreeSet::new();
        let mut unmatched = Vec::new();

        for idx in order {
            let det = &detections[idx];
            let mut best: Option<(u32, f32)> = None;

            for p in self.scene.iter() {
                if used.contains(&p.id) {
                    continue;
                }

                let cost = self.cost(det, p);
                if cost < best.map_or(f32::INFINITY, |(_, c)| c) {
                    best = Some((p.id, cost));
                }
            }

            match best {
                Some((id, cost)) if cost < self.config.match_threshold => {
                    if let Some(p) = self.scene.get_mut(id) {
                        p.update(det, cost);
                    }
                    used.insert(id);
                }
                _ => unmatched.push(idx),
            }
        }

        let max_missing = self.config.max_missing_frames;
        let lost: Vec<u32> = self
            .scene
            .iter_mut()
            .filter(|p| !used.contains(&p.id))
            .filter_map(|p| {
                p.missing_frames += 1;
                (p.missing_frames > max_missing).then_some(p.id)
            })
            .collect();

        for id in lost {
            if let Some(p) = self.scene.remove(id) {
                debug!("track {} lost after {} frames", id, p.missing_frames);
            }
        }

        unmatched.sort_unstable();
        for idx in unmatched {
            let id = self.scene.insert(&detections[idx], self.config.history_len);
            debug!("track {} created (class {})", id, detections[idx].class);
        }
    }

    pub fn tracks(&self) -> Rc<[Track]> {
        let context = self.context();

        self.scene
            .iter()
            .map(|p| Track::from((p, context)))
            .collect::<Vec<_>>()
            .into()
    }
}

impl crate::Tracking for Tracker {
    #[inline]
    fn update(&mut self, detections: &[Detection]) {
        Tracker::update(self, detections)
    }

    #[inline]
    fn tracks(&self) -> Rc<[Track]> {
        Tracker::tracks(self)
    }
}
