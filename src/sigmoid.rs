use num_traits::Float;

const DEFAULT_RANGE: f32 = 10.0;
const DEFAULT_SIZE: usize = 2000;

#[inline]
pub fn sigmoid<F: Float>(x: F) -> F {
    F::one() / (F::one() + (-x).exp())
}

/// Precomputed sigmoid over `[min, max]`, linearly interpolated between
/// samples and saturated outside the range.
#[derive(Debug, Clone)]
pub struct SigmoidTable {
    min: f32,
    max: f32,
    scale: f32,
    values: Vec<f32>,
}

impl SigmoidTable {
    pub fn new(min: f32, max: f32, size: usize) -> Self {
        let size = size.max(2);
        let (min, max) = if max > min { (min, max) } else { (max, min + 1.0) };
        let step = (max - min) / (size - 1) as f32;
        let values = (0..size)
            .map(|i| sigmoid(min + step * i as f32))
            .collect();

        Self {
            min,
            max,
            scale: (size - 1) as f32 / (max - min),
            values,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn eval(&self, x: f32) -> f32 {
        if x.is_nan() {
            return 0.5;
        }

        let last = self.values.len() - 1;

        if x <= self.min {
            return self.values[0];
        }

        if x >= self.max {
            return self.values[last];
        }

        let pos = (x - self.min) * self.scale;
        let idx = (pos as usize).min(last - 1);
        let frac = pos - idx as f32;

        self.values[idx] + (self.values[idx + 1] - self.values[idx]) * frac
    }
}

impl Default for SigmoidTable {
    fn default() -> Self {
        Self::new(-DEFAULT_RANGE, DEFAULT_RANGE, DEFAULT_SIZE)
    }
}
