use crate::error::Result;
use crate::geometry::{PlaneCurve, TangentVector};
use crate::interpolation::CatmullRom;
use crate::settings::TransportSettings;
use crate::solvers::TransportRk4;
use crate::traits::TransportField;
use log::debug;
use nalgebra::Vector2;

/// The coordinate basis `(1, 0)`, `(0, 1)` parallel-transported along a
/// curve, interpolated between the integration samples.
#[derive(Debug, Clone)]
pub struct TransportedFrame {
    x: CatmullRom<Vector2<f64>>,
    y: CatmullRom<Vector2<f64>>,
}

impl TransportedFrame {
    /// Transported images of the two basis vectors at curve parameter `t`.
    /// Clamped to the end samples outside `[0, 1]`.
    pub fn basis(&self, t: f64) -> [Vector2<f64>; 2] {
        [self.x.eval(t), self.y.eval(t)]
    }

    /// Transport of the vector with coordinates `v` at `t = 0` to parameter `t`.
    pub fn transport(&self, t: f64, v: &Vector2<f64>) -> Vector2<f64> {
        let [bx, by] = self.basis(t);
        bx * v.x + by * v.y
    }

    pub fn knots(&self) -> &[f64] {
        self.x.knots()
    }
}

/// Integrates the transport equation for both basis vectors from `t = 0` to
/// `t = 1` with `settings.steps` RK4 steps, sampling after every step.
pub fn parallel_transport<F, C>(field: &F, curve: &C, settings: &TransportSettings) -> Result<TransportedFrame>
where
    F: TransportField + ?Sized,
    C: PlaneCurve + ?Sized,
{
    let steps = settings.steps.max(1);
    let h = 1.0 / steps as f64;
    let stepper = TransportRk4::new(h);

    let mut ts = Vec::with_capacity(steps + 1);
    let mut xs = Vec::with_capacity(steps + 1);
    let mut ys = Vec::with_capacity(steps + 1);

    let mut bx = Vector2::new(1.0, 0.0);
    let mut by = Vector2::new(0.0, 1.0);
    ts.push(0.0);
    xs.push(bx);
    ys.push(by);

    for i in 0..steps {
        let t = i as f64 * h;
        bx = stepper.step(field, curve, t, &bx);
        by = stepper.step(field, curve, t, &by);
        ts.push((i + 1) as f64 / steps as f64);
        xs.push(bx);
        ys.push(by);
    }
    debug!("transported frame over {steps} steps; final basis {bx:?}, {by:?}");

    Ok(TransportedFrame {
        x: CatmullRom::new(ts.clone(), xs, settings.tension)?,
        y: CatmullRom::new(ts, ys, settings.tension)?,
    })
}

/// A curve together with the frame transported along it. Produces initial
/// conditions for geodesics anchored on the curve.
#[derive(Debug, Clone)]
pub struct BoundaryTransport<C> {
    curve: C,
    frame: TransportedFrame,
}

impl<C: PlaneCurve> BoundaryTransport<C> {
    pub fn new<F: TransportField + ?Sized>(field: &F, curve: C, settings: &TransportSettings) -> Result<Self> {
        let frame = parallel_transport(field, &curve, settings)?;
        Ok(Self { curve, frame })
    }

    /// `v` (given in the coordinate basis at `t = 0`) transported to `t`,
    /// based at the curve point there.
    pub fn at(&self, t: f64, v: &Vector2<f64>) -> TangentVector {
        TangentVector::new(self.curve.point(t), self.frame.transport(t, v))
    }

    pub fn curve(&self) -> &C {
        &self.curve
    }

    pub fn frame(&self) -> &TransportedFrame {
        &self.frame
    }
}
