use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Upper bound accepted for `GeodesicSettings::max_steps`.
pub const MAX_GEODESIC_STEPS: usize = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeodesicSettings {
    /// Step size of the symplectic integrator.
    pub step: f64,
    pub max_steps: usize,
}

impl Default for GeodesicSettings {
    fn default() -> Self {
        Self {
            step: 0.02,
            max_steps: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Number of RK4 steps over the curve parameter range [0, 1].
    pub steps: usize,
    /// Catmull-Rom tension used when interpolating the transported frame.
    pub tension: f64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            steps: 100,
            tension: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiniteDifferenceSettings {
    /// Stencil width for native fallbacks (double precision).
    pub native_step: f64,
    /// Stencil width for GLSL fallbacks (shaders run in single precision).
    pub glsl_step: f64,
}

impl Default for FiniteDifferenceSettings {
    fn default() -> Self {
        Self {
            native_step: 1e-5,
            glsl_step: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceSettings {
    pub geodesic: GeodesicSettings,
    pub transport: TransportSettings,
    pub finite_difference: FiniteDifferenceSettings,
}

impl SurfaceSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.geodesic.step.is_finite() && self.geodesic.step > 0.0) {
            bail!("Geodesic step size must be positive and finite.");
        }
        if self.geodesic.max_steps > MAX_GEODESIC_STEPS {
            bail!(
                "Geodesic step count {} exceeds the limit of {MAX_GEODESIC_STEPS}.",
                self.geodesic.max_steps
            );
        }
        if self.transport.steps == 0 {
            bail!("Parallel transport needs at least one step.");
        }
        if !self.transport.tension.is_finite() {
            bail!("Interpolation tension must be finite.");
        }
        let fd = &self.finite_difference;
        for (label, h) in [("native", fd.native_step), ("GLSL", fd.glsl_step)] {
            if !(h.is_finite() && h > 0.0) {
                bail!("Finite-difference {label} step must be positive and finite (got {h}).");
            }
        }
        Ok(())
    }
}
