use crate::circular_queue::CircularQueue;
use nalgebra as na;

/// One-step constant-velocity extrapolation from the last two centers.
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    pub velocity: na::Vector2<f32>,
    pub has_linear: bool,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            velocity: na::Vector2::zeros(),
            has_linear: false,
        }
    }
}

impl Predictor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self, history: &CircularQueue<na::Point2<f32>>) {
        match history.last_two() {
            Some((prev, last)) => {
                self.velocity = last - prev;
                self.has_linear = true;
            }
            None => self.reset(),
        }
    }

    #[inline]
    pub fn predict(&self, from: na::Point2<f32>) -> na::Point2<f32> {
        if self.has_linear {
            from + self.velocity
        } else {
            from
        }
    }

    /// Magnitude of the last frame-to-frame displacement.
    #[inline]
    pub fn speed(&self) -> Option<f32> {
        self.has_linear.then(|| self.velocity.norm())
    }
}
