use crate::error::GeometryError;
use std::ops::{Add, Mul, Sub};

/// Anything that can be blended linearly: scalars and fixed-size vectors.
pub trait Interpolant: Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f64, Output = Self> {}

impl<T> Interpolant for T where T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f64, Output = T> {}

/// Cubic Hermite spline through samples at strictly increasing knots, with
/// Catmull-Rom tangents scaled by `1 - tension`.
///
/// Queries outside the knot range clamp to the first or last sample.
#[derive(Debug, Clone)]
pub struct CatmullRom<T> {
    knots: Vec<f64>,
    samples: Vec<T>,
    tension: f64,
}

impl<T: Interpolant> CatmullRom<T> {
    pub fn new(knots: Vec<f64>, samples: Vec<T>, tension: f64) -> Result<Self, GeometryError> {
        if knots.len() != samples.len() {
            return Err(GeometryError::Interpolation(format!(
                "{} knots but {} samples",
                knots.len(),
                samples.len()
            )));
        }
        if knots.len() < 2 {
            return Err(GeometryError::Interpolation(
                "at least two samples are required".to_string(),
            ));
        }
        if knots.iter().any(|k| !k.is_finite()) || knots.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GeometryError::Interpolation(
                "knots must be finite and strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            knots,
            samples,
            tension,
        })
    }

    /// Uniform knots `0, 1/(n-1), ..., 1`.
    pub fn uniform(samples: Vec<T>, tension: f64) -> Result<Self, GeometryError> {
        let last = samples.len().saturating_sub(1).max(1) as f64;
        let knots = (0..samples.len()).map(|i| i as f64 / last).collect();
        Self::new(knots, samples, tension)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    pub fn eval(&self, t: f64) -> T {
        let n = self.knots.len();
        if t.is_nan() || t <= self.knots[0] {
            return self.samples[0];
        }
        if t >= self.knots[n - 1] {
            return self.samples[n - 1];
        }

        // knots[i] <= t < knots[i + 1]
        let i = self.knots.partition_point(|&k| k <= t) - 1;
        let (i0, i2, i3) = (i.saturating_sub(1), i + 1, (i + 2).min(n - 1));

        let (x0, x1, x2, x3) = (self.knots[i0], self.knots[i], self.knots[i2], self.knots[i3]);
        let (y0, y1, y2, y3) = (self.samples[i0], self.samples[i], self.samples[i2], self.samples[i3]);

        let scale = 1.0 - self.tension;
        let m1 = (y2 - y0) * (scale / (x2 - x0));
        let m2 = (y3 - y1) * (scale / (x3 - x1));

        let dx = x2 - x1;
        let s = (t - x1) / dx;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;

        y1 * h00 + m1 * (h10 * dx) + y2 * h01 + m2 * (h11 * dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector2;

    #[test]
    fn passes_through_samples() {
        let knots = vec![0.0, 0.3, 0.5, 1.0];
        let samples = vec![1.0, -2.0, 4.0, 0.5];
        let spline = CatmullRom::new(knots.clone(), samples.clone(), 0.5).unwrap();
        for (k, s) in knots.iter().zip(&samples) {
            assert!((spline.eval(*k) - s).abs() < 1e-12);
        }
    }

    #[test]
    fn clamps_outside_the_knot_range() {
        let spline = CatmullRom::uniform(vec![2.0, 3.0, 5.0], 0.0).unwrap();
        assert_eq!(spline.eval(-1.0), 2.0);
        assert_eq!(spline.eval(7.0), 5.0);
        assert_eq!(spline.eval(f64::NAN), 2.0);
    }

    #[test]
    fn reproduces_linear_data() {
        let samples: Vec<f64> = (0..6).map(|i| 3.0 * i as f64 / 5.0 - 1.0).collect();
        let spline = CatmullRom::uniform(samples, 0.0).unwrap();
        for j in 0..=20 {
            let t = j as f64 / 20.0;
            assert!((spline.eval(t) - (3.0 * t - 1.0)).abs() < 1e-12, "t = {t}");
        }
    }

    #[test]
    fn interpolates_vectors_smoothly() {
        let n = 51;
        let samples: Vec<Vector2<f64>> = (0..n)
            .map(|i| {
                let a = i as f64 / (n - 1) as f64;
                Vector2::new(a.cos(), a.sin())
            })
            .collect();
        let spline = CatmullRom::uniform(samples, 0.0).unwrap();
        let v = spline.eval(0.505);
        assert!((v.x - 0.505f64.cos()).abs() < 1e-5);
        assert!((v.y - 0.505f64.sin()).abs() < 1e-5);
    }

    #[test]
    fn rejects_bad_knots() {
        assert!(CatmullRom::new(vec![0.0, 0.0], vec![1.0, 2.0], 0.0).is_err());
        assert!(CatmullRom::new(vec![0.0, 1.0], vec![1.0], 0.0).is_err());
        assert!(CatmullRom::<f64>::uniform(vec![1.0], 0.0).is_err());
    }
}
