//! Tone curves.
//!
//! A [`Curve`] maps an input intensity in [0, 1] to an output intensity
//! in [0, 1] through a set of control points. Filters sample curves
//! directly or bake them into dense lookup tables, which is what the
//! CPU kernels index and the GPU path uploads as 1D pixel arrays.
//!
//! Interpolation is Catmull-Rom through the sorted control points, with
//! the result clamped to [0, 1]. Outside the first/last control point
//! the curve is flat.

/// One control point of a tone curve, both coordinates in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// Input intensity.
    pub x: f32,
    /// Output intensity.
    pub y: f32,
}

impl CurvePoint {
    /// Creates a control point, clamping both coordinates to [0, 1].
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }
}

/// A tone curve over sorted control points.
///
/// Degenerate configurations are well defined: an empty curve is the
/// identity, a single point is a constant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Curve {
    points: Vec<CurvePoint>,
}

impl Curve {
    /// The identity curve (no control points).
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Builds a curve from control points; points are sorted by x.
    pub fn from_points(mut points: Vec<CurvePoint>) -> Self {
        points.sort_by(|a, b| a.x.total_cmp(&b.x));
        Self { points }
    }

    /// A linear curve from (0, 0) to (1, gain), gain clamped to [0, 1].
    pub fn linear(gain: f32) -> Self {
        Self::from_points(vec![CurvePoint::new(0.0, 0.0), CurvePoint::new(1.0, gain)])
    }

    /// Inserts a control point, keeping the set sorted.
    pub fn add_point(&mut self, point: CurvePoint) {
        let at = self
            .points
            .partition_point(|p| p.x <= point.x);
        self.points.insert(at, point);
    }

    /// The sorted control points.
    #[inline]
    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// `true` if the curve has no control points (identity).
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.points.is_empty()
    }

    /// Samples the curve at `x`.
    ///
    /// `x` is clamped to [0, 1] first; the result is always in [0, 1].
    pub fn sample(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);

        match self.points.len() {
            0 => x,
            1 => self.points[0].y,
            _ => self.sample_spline(x),
        }
    }

    /// Bakes the curve into a dense table of `n` samples.
    ///
    /// Entry `i` holds the curve value at `i / (n - 1)`. Kernels index
    /// the table by channel value; the GPU path uploads it as a 1D
    /// pixel array.
    pub fn bake(&self, n: usize) -> Vec<f32> {
        assert!(n >= 2, "a baked curve needs at least two samples");

        let scale = 1.0 / (n - 1) as f32;
        (0..n).map(|i| self.sample(i as f32 * scale)).collect()
    }

    fn sample_spline(&self, x: f32) -> f32 {
        let points = &self.points;
        let last = points.len() - 1;

        if x <= points[0].x {
            return points[0].y;
        }

        if x >= points[last].x {
            return points[last].y;
        }

        // segment index with points[i].x <= x < points[i + 1].x
        let i = points.partition_point(|p| p.x <= x) - 1;
        let i = i.min(last - 1);

        let p1 = points[i];
        let p2 = points[i + 1];
        // extrapolated phantom endpoints keep the boundary segments
        // linear instead of flattening their tangents
        let p0 = if i == 0 {
            CurvePoint {
                x: 2.0 * p1.x - p2.x,
                y: 2.0 * p1.y - p2.y,
            }
        } else {
            points[i - 1]
        };
        let p3 = if i + 2 > last {
            CurvePoint {
                x: 2.0 * p2.x - p1.x,
                y: 2.0 * p2.y - p1.y,
            }
        } else {
            points[i + 2]
        };

        let span = p2.x - p1.x;
        if span <= f32::EPSILON {
            return p1.y;
        }

        let t = (x - p1.x) / span;
        let t2 = t * t;
        let t3 = t2 * t;

        let y = 0.5
            * ((2.0 * p1.y)
                + (-p0.y + p2.y) * t
                + (2.0 * p0.y - 5.0 * p1.y + 4.0 * p2.y - p3.y) * t2
                + (-p0.y + 3.0 * p1.y - 3.0 * p2.y + p3.y) * t3);

        y.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity() {
        let curve = Curve::identity();
        assert!(curve.is_identity());
        assert_relative_eq!(curve.sample(0.0), 0.0);
        assert_relative_eq!(curve.sample(0.25), 0.25);
        assert_relative_eq!(curve.sample(1.0), 1.0);
    }

    #[test]
    fn test_single_point_is_constant() {
        let curve = Curve::from_points(vec![CurvePoint::new(0.5, 0.7)]);
        assert_relative_eq!(curve.sample(0.0), 0.7);
        assert_relative_eq!(curve.sample(1.0), 0.7);
    }

    #[test]
    fn test_linear_interpolation() {
        let curve = Curve::linear(1.0);
        assert_relative_eq!(curve.sample(0.0), 0.0);
        assert_relative_eq!(curve.sample(0.5), 0.5, epsilon = 1e-5);
        assert_relative_eq!(curve.sample(1.0), 1.0);
    }

    #[test]
    fn test_endpoint_clamping() {
        let curve = Curve::from_points(vec![
            CurvePoint::new(0.2, 0.1),
            CurvePoint::new(0.8, 0.9),
        ]);
        // flat outside the control range
        assert_relative_eq!(curve.sample(0.0), 0.1);
        assert_relative_eq!(curve.sample(1.0), 0.9);
    }

    #[test]
    fn test_interpolation_passes_through_points() {
        let points = vec![
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(0.3, 0.5),
            CurvePoint::new(0.7, 0.6),
            CurvePoint::new(1.0, 1.0),
        ];
        let curve = Curve::from_points(points.clone());

        for p in &points {
            assert_relative_eq!(curve.sample(p.x), p.y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_sample_stays_in_range() {
        let curve = Curve::from_points(vec![
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(0.1, 0.95),
            CurvePoint::new(0.2, 0.05),
            CurvePoint::new(1.0, 1.0),
        ]);

        for i in 0..=100 {
            let v = curve.sample(i as f32 / 100.0);
            assert!((0.0..=1.0).contains(&v), "sample escaped range: {v}");
        }
    }

    #[test]
    fn test_bake() {
        let curve = Curve::identity();
        let lut = curve.bake(256);
        assert_eq!(lut.len(), 256);
        assert_relative_eq!(lut[0], 0.0);
        assert_relative_eq!(lut[255], 1.0);
        assert_relative_eq!(lut[128], 128.0 / 255.0, epsilon = 1e-6);
    }

    #[test]
    fn test_add_point_keeps_order() {
        let mut curve = Curve::linear(1.0);
        curve.add_point(CurvePoint::new(0.5, 0.25));
        let xs: Vec<f32> = curve.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 0.5, 1.0]);
    }
}
