use crate::bbox::{BBox, Xywh};
use crate::circular_queue::CircularQueue;
use crate::color::ColorDescriptor;
use crate::predictor::Predictor;
use crate::Detection;

use nalgebra as na;
use std::collections::BTreeMap;

/// Persistent state of one tracked object.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: u32,
    pub bbox: BBox<Xywh>,
    pub class: i32,
    pub confidence: f32,
    pub color: ColorDescriptor,
    pub history: CircularQueue<na::Point2<f32>>,
    pub predictor: Predictor,
    pub missing_frames: u32,
    pub tracking_quality: f32,
}

impl Participant {
    pub fn new(id: u32, det: &Detection, history_len: usize) -> Self {
        let bbox = det.bbox();
        let mut history = CircularQueue::with_capacity(history_len);
        history.push(bbox.center());

        Self {
            id,
            bbox,
            class: det.class,
            confidence: det.confidence,
            color: det.color.unwrap_or_default(),
            history,
            predictor: Predictor::default(),
            missing_frames: 0,
            tracking_quality: 1.0,
        }
    }

    pub fn update(&mut self, det: &Detection, cost: f32) {
        self.bbox = det.bbox();
        self.class = det.class;
        self.confidence = det.confidence;
        self.color = det.color.unwrap_or_default();

        self.history.push(self.bbox.center());
        self.predictor.update(&self.history);

        self.missing_frames = 0;
        self.tracking_quality = (1.0 - cost).clamp(0.0, 1.0);
    }

    /// Last observed center.
    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        self.history
            .last()
            .copied()
            .unwrap_or_else(|| self.bbox.center())
    }

    #[inline]
    pub fn prediction(&self) -> na::Point2<f32> {
        self.predictor.predict(self.center())
    }

    #[inline]
    pub fn speed(&self) -> Option<f32> {
        self.predictor.speed()
    }
}

/// Track arena: ids start at 1, grow monotonically and are never reused.
#[derive(Debug)]
pub struct Scene {
    participants: BTreeMap<u32, Participant>,
    next_id: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            participants: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn insert(&mut self, det: &Detection, history_len: usize) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.participants
            .insert(id, Participant::new(id, det, history_len));

        id
    }

    #[inline]
    pub fn remove(&mut self, id: u32) -> Option<Participant> {
        self.participants.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&Participant> {
        self.participants.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    /// Ascending id order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.participants.values_mut()
    }

    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.participants.keys().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
