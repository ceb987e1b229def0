use crate::circular_queue::CircularQueue;
use crate::detection::Detection;

use log::{debug, info};
use serde_derive::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Context {
    #[default]
    Indoor,
    City,
    Highway,
}

impl Context {
    pub const ALL: [Context; 3] = [Context::Indoor, Context::City, Context::Highway];

    #[inline]
    fn index(self) -> usize {
        match self {
            Context::Indoor => 0,
            Context::City => 1,
            Context::Highway => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Indoor => "INDOOR",
            Context::City => "CITY",
            Context::Highway => "HIGHWAY",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracker tuning pushed on every context switch.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ContextProfile {
    pub max_distance: f32,
    pub max_missing_frames: u32,
}

impl ContextProfile {
    pub fn new(max_distance: f32, max_missing_frames: u32) -> Self {
        Self {
            max_distance,
            max_missing_frames,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    pub enabled: bool,
    pub history_len: usize,
    /// votes needed before the majority is trusted
    pub min_history: usize,
    /// disagreeing frames that must pass before a switch
    pub hysteresis: u32,
    pub vehicle_classes: Vec<i32>,
    pub highway_min_vehicles: usize,
    pub highway_min_speed: f32,
    pub city_min_speed: f32,
    pub indoor: ContextProfile,
    pub city: ContextProfile,
    pub highway: ContextProfile,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_len: 30,
            min_history: 10,
            hysteresis: 15,
            vehicle_classes: vec![2, 3, 5, 7],
            highway_min_vehicles: 3,
            highway_min_speed: 15.0,
            city_min_speed: 5.0,
            indoor: ContextProfile::new(120.0, 30),
            city: ContextProfile::new(150.0, 30),
            highway: ContextProfile::new(200.0, 20),
        }
    }
}

impl ContextConfig {
    pub fn profile(&self, context: Context) -> ContextProfile {
        match context {
            Context::Indoor => self.indoor,
            Context::City => self.city,
            Context::Highway => self.highway,
        }
    }
}

#[derive(Debug)]
pub struct ContextClassifier {
    config: ContextConfig,
    history: CircularQueue<Context>,
    active: Context,
    stable_frames: u32,
}

impl ContextClassifier {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            history: CircularQueue::with_capacity(config.history_len),
            config,
            active: Context::default(),
            stable_frames: 0,
        }
    }

    #[inline]
    pub fn active(&self) -> Context {
        self.active
    }

    #[inline]
    pub fn stable_frames(&self) -> u32 {
        self.stable_frames
    }

    #[inline]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Instantaneous context of a single frame.
    pub fn classify(&self, detections: &[Detection], mean_speed: f32) -> Context {
        let vehicles = detections
            .iter()
            .filter(|d| self.config.vehicle_classes.contains(&d.class))
            .count();

        if vehicles >= self.config.highway_min_vehicles && mean_speed > self.config.highway_min_speed
        {
            Context::Highway
        } else if vehicles >= 1 || mean_speed > self.config.city_min_speed {
            Context::City
        } else {
            Context::Indoor
        }
    }

    /// Most frequent context in the history; ties go to the active context,
    /// then to the calmer one.
    pub fn majority(&self) -> Option<Context> {
        if self.history.len() < self.config.min_history.max(1) {
            return None;
        }

        let mut votes = [0usize; 3];
        for ctx in self.history.iter() {
            votes[ctx.index()] += 1;
        }

        let best = votes.iter().copied().max().unwrap_or(0);
        if votes[self.active.index()] == best {
            return Some(self.active);
        }

        Context::ALL.iter().copied().find(|c| votes[c.index()] == best)
    }

    /// Feeds one frame. Returns the new tracker tuning only when the active
    /// context switches.
    pub fn observe(&mut self, detections: &[Detection], speeds: &[f32]) -> Option<ContextProfile> {
        let mean_speed = if speeds.is_empty() {
            0.0
        } else {
            speeds.iter().sum::<f32>() / speeds.len() as f32
        };

        let current = self.classify(detections, mean_speed);
        self.history.push(current);

        let majority = self.majority()?;

        if majority == self.active {
            self.stable_frames = 0;
            return None;
        }

        if self.stable_frames > self.config.hysteresis {
            info!(
                "context switch: {} -> {} after {} frames",
                self.active, majority, self.stable_frames
            );

            self.active = majority;
            self.stable_frames = 0;

            return Some(self.config.profile(majority));
        }

        self.stable_frames += 1;
        debug!(
            "context {} disputed by {} ({}/{})",
            self.active, majority, self.stable_frames, self.config.hysteresis
        );

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;

    fn car() -> Detection {
        Detection::new(BBox::xywh(10.0, 10.0, 5.0, 5.0), 0.9, 2)
    }

    fn person() -> Detection {
        Detection::new(BBox::xywh(10.0, 10.0, 5.0, 5.0), 0.9, 0)
    }

    #[test]
    fn classifies_frames_by_vehicles_and_speed() {
        let cls = ContextClassifier::new(ContextConfig::default());

        assert_eq!(Context::default(), Context::Indoor);
        assert_eq!(cls.classify(&[], 0.0), Context::Indoor);
        assert_eq!(cls.classify(&[person()], 1.0), Context::Indoor);
        assert_eq!(cls.classify(&[person()], 6.0), Context::City);
        assert_eq!(cls.classify(&[car()], 0.0), Context::City);
        assert_eq!(cls.classify(&[car(), car(), car()], 10.0), Context::City);
        assert_eq!(cls.classify(&[car(), car(), car()], 20.0), Context::Highway);
    }

    #[test]
    fn no_vote_before_min_history() {
        let mut cls = ContextClassifier::new(ContextConfig::default());

        for _ in 0..9 {
            assert_eq!(cls.observe(&[car()], &[]), None);
            assert_eq!(cls.majority(), None);
        }

        cls.observe(&[car()], &[]);
        assert_eq!(cls.majority(), Some(Context::City));
    }

    #[test]
    fn switches_only_after_hysteresis() {
        let mut cls = ContextClassifier::new(ContextConfig::default());
        let mut switched_at = None;

        for frame in 0..40 {
            if let Some(profile) = cls.observe(&[car()], &[]) {
                assert_eq!(profile, ContextConfig::default().city);
                switched_at = Some(frame);
                break;
            }
        }

        // frames 9..=24 raise the counter to 16, frame 25 switches
        assert_eq!(switched_at, Some(25));
        assert_eq!(cls.active(), Context::City);
        assert_eq!(cls.stable_frames(), 0);
    }

    #[test]
    fn single_outlier_does_not_flip() {
        let mut cls = ContextClassifier::new(ContextConfig::default());

        for _ in 0..30 {
            cls.observe(&[], &[]);
        }
        assert_eq!(cls.observe(&[car()], &[]), None);

        for _ in 0..30 {
            assert_eq!(cls.observe(&[], &[]), None);
        }

        assert_eq!(cls.active(), Context::Indoor);
    }

    #[test]
    fn agreement_resets_the_counter() {
        let config = ContextConfig {
            history_len: 3,
            min_history: 1,
            hysteresis: 2,
            ..Default::default()
        };
        let mut cls = ContextClassifier::new(config);

        cls.observe(&[car()], &[]);
        cls.observe(&[car()], &[]);
        assert_eq!(cls.stable_frames(), 2);

        for _ in 0..3 {
            cls.observe(&[], &[]);
        }
        assert_eq!(cls.stable_frames(), 0);
        assert_eq!(cls.active(), Context::Indoor);
    }

    #[test]
    fn mean_speed_drives_highway() {
        let config = ContextConfig {
            min_history: 1,
            hysteresis: 0,
            ..Default::default()
        };
        let mut cls = ContextClassifier::new(config);
        let cars = [car(), car(), car()];

        assert_eq!(cls.observe(&cars, &[20.0, 30.0]), None);
        assert_eq!(
            cls.observe(&cars, &[20.0, 30.0]),
            Some(ContextConfig::default().highway)
        );
        assert_eq!(cls.active(), Context::Highway);
    }
}
