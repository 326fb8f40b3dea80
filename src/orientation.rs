//! Orientation from gyro integration and/or accelerometer tilt.
//!
//! The orientation frame is Y-up: a controller lying flat, buttons up,
//! reads identity. Rotations compose as `Ry(yaw) * Rx(pitch) * Rz(roll)`.

use crate::types::{Matrix3, OrientationMode, Vector3};

pub const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Empirically tuned scale applied to integrated gyro angles. Not a physical
/// constant; see `WiimoteConfig::gyro_damping`.
pub const DEFAULT_DAMPING: f64 = 0.65;

/// Gravity direction of a controller at rest, in the orientation frame.
const REST_GRAVITY: Vector3 = [0.0, -1.0, 0.0];

pub fn rotation_x(deg: f64) -> Matrix3 {
    let (s, c) = deg.to_radians().sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

pub fn rotation_y(deg: f64) -> Matrix3 {
    let (s, c) = deg.to_radians().sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

pub fn rotation_z(deg: f64) -> Matrix3 {
    let (s, c) = deg.to_radians().sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

pub fn multiply(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

#[cfg(test)]
pub(crate) fn apply(m: &Matrix3, v: &Vector3) -> Vector3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn dot(a: &Vector3, b: &Vector3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: &Vector3, b: &Vector3) -> Vector3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: &Vector3) -> Option<Vector3> {
    let len = dot(v, v).sqrt();
    if len < 1e-9 {
        return None;
    }
    Some([v[0] / len, v[1] / len, v[2] / len])
}

/// Rotation of `deg` degrees about `axis` (Rodrigues). Identity for a
/// degenerate axis.
pub fn axis_angle(axis: &Vector3, deg: f64) -> Matrix3 {
    let Some([x, y, z]) = normalize(axis) else {
        return IDENTITY;
    };
    let (s, c) = deg.to_radians().sin_cos();
    let t = 1.0 - c;
    [
        [c + t * x * x, t * x * y - s * z, t * x * z + s * y],
        [t * x * y + s * z, c + t * y * y, t * y * z - s * x],
        [t * x * z - s * y, t * y * z + s * x, c + t * z * z],
    ]
}

/// Euler angles `[pitch, roll, yaw]` in degrees of a `Ry * Rx * Rz` matrix.
///
/// yaw = atan2(m[0][2], m[2][2]), pitch = asin(-m[1][2]), roll = atan2(m[1][0], m[1][1])
pub fn euler_of(m: &Matrix3) -> Vector3 {
    let pitch = (-m[1][2]).clamp(-1.0, 1.0).asin();
    let roll = m[1][0].atan2(m[1][1]);
    let yaw = m[0][2].atan2(m[2][2]);
    [pitch.to_degrees(), roll.to_degrees(), yaw.to_degrees()]
}

/// Map calibrated device acceleration to the unit gravity direction in the
/// orientation frame. The device Z axis becomes frame Y.
pub fn gravity_direction(acceleration: &Vector3) -> Option<Vector3> {
    normalize(&[-acceleration[0], -acceleration[2], -acceleration[1]])
}

/// Pitch and roll in degrees that bring `gravity` (frame coordinates, unit
/// length) onto the rest direction.
pub fn tilt_of(gravity: &Vector3) -> (f64, f64) {
    let pitch = gravity[2].clamp(-1.0, 1.0).asin();
    let roll = (-gravity[0]).atan2(-gravity[1]);
    (pitch.to_degrees(), roll.to_degrees())
}

/// Running orientation estimate.
#[derive(Debug, Clone)]
pub struct Orientation {
    mode: OrientationMode,
    damping: f64,
    matrix: Matrix3,
    euler_deg: Vector3,
}

impl Orientation {
    pub fn new(mode: OrientationMode, damping: f64) -> Self {
        Self {
            mode,
            damping,
            matrix: IDENTITY,
            euler_deg: [0.0; 3],
        }
    }

    pub fn mode(&self) -> OrientationMode {
        self.mode
    }

    /// Change the mode, restarting from identity.
    pub fn set_mode(&mut self, mode: OrientationMode) {
        self.mode = mode;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.matrix = IDENTITY;
        self.euler_deg = [0.0; 3];
    }

    pub fn matrix(&self) -> Matrix3 {
        self.matrix
    }

    /// `[pitch, roll, yaw]` in degrees.
    pub fn euler_deg(&self) -> Vector3 {
        self.euler_deg
    }

    /// Compose one integration step. `rates` are `[pitch, roll, yaw]` in
    /// degrees/second, applied in yaw, pitch, roll order.
    pub fn integrate(&mut self, rates: Vector3, elapsed_ms: f64) {
        let [pitch, roll, yaw] = rates.map(|rate| self.damping * rate * elapsed_ms / 1000.0);
        let step = multiply(&multiply(&rotation_y(yaw), &rotation_x(pitch)), &rotation_z(roll));
        self.matrix = multiply(&self.matrix, &step);
        self.euler_deg = euler_of(&self.matrix);
    }

    /// Rebuild the orientation from the gravity vector alone. Carries no yaw.
    /// Returns false if `acceleration` has no direction.
    pub fn from_gravity(&mut self, acceleration: &Vector3) -> bool {
        let Some(gravity) = gravity_direction(acceleration) else {
            return false;
        };
        let axis = cross(&gravity, &REST_GRAVITY);
        let cos = dot(&gravity, &REST_GRAVITY).clamp(-1.0, 1.0);
        self.matrix = if normalize(&axis).is_some() {
            axis_angle(&axis, cos.acos().to_degrees())
        } else if cos > 0.0 {
            IDENTITY
        } else {
            rotation_x(180.0)
        };
        self.euler_deg = euler_of(&self.matrix);
        true
    }

    /// Keep the integrated yaw and replace pitch and roll with the
    /// accelerometer tilt. Returns false if `acceleration` has no direction.
    pub fn mix(&mut self, acceleration: &Vector3) -> bool {
        let Some(gravity) = gravity_direction(acceleration) else {
            return false;
        };
        let yaw = euler_of(&self.matrix)[2];
        let (pitch, roll) = tilt_of(&gravity);
        self.matrix = multiply(&multiply(&rotation_y(yaw), &rotation_x(pitch)), &rotation_z(roll));
        self.euler_deg = [pitch, roll, yaw];
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Vector3, b: &Vector3) {
        for axis in 0..3 {
            assert!((a[axis] - b[axis]).abs() < 1e-6, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_euler_round_trip() {
        let m = multiply(&multiply(&rotation_y(40.0), &rotation_x(-25.0)), &rotation_z(15.0));
        assert_close(&euler_of(&m), &[-25.0, 15.0, 40.0]);
    }

    #[test]
    fn test_axis_angle_matches_elementary_rotations() {
        let m = axis_angle(&[0.0, 2.0, 0.0], 30.0);
        let r = rotation_y(30.0);
        for i in 0..3 {
            assert_close(&m[i], &r[i]);
        }
    }

    #[test]
    fn test_gravity_at_rest_is_identity() {
        let mut o = Orientation::new(OrientationMode::Raw, DEFAULT_DAMPING);
        assert!(o.from_gravity(&[0.0, 0.0, 1.0]));
        for i in 0..3 {
            assert_close(&o.matrix()[i], &IDENTITY[i]);
        }
        assert!(!o.from_gravity(&[0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_gravity_rotation_maps_measurement_onto_rest() {
        let mut o = Orientation::new(OrientationMode::Raw, DEFAULT_DAMPING);
        for accel in [[1.0, 0.0, 0.0], [0.3, -0.4, 0.8], [0.0, 1.0, 0.2], [0.0, 0.0, -1.0]] {
            assert!(o.from_gravity(&accel));
            let g = gravity_direction(&accel).unwrap();
            assert_close(&apply(&o.matrix(), &g), &REST_GRAVITY);
        }
    }

    #[test]
    fn test_integration_accumulates_damped_angles() {
        let mut o = Orientation::new(OrientationMode::Raw, 1.0);
        for _ in 0..10 {
            o.integrate([0.0, 0.0, 90.0], 50.0);
        }
        assert_close(&o.euler_deg(), &[0.0, 0.0, 45.0]);

        let mut damped = Orientation::new(OrientationMode::Raw, DEFAULT_DAMPING);
        damped.integrate([100.0, 0.0, 0.0], 500.0);
        assert_close(&damped.euler_deg(), &[32.5, 0.0, 0.0]);
    }

    #[test]
    fn test_mix_keeps_integrated_yaw() {
        let mut o = Orientation::new(OrientationMode::Mixed, 1.0);
        o.integrate([0.0, 0.0, 30.0], 1000.0);

        let (pitch, roll) = (20.0f64, 10.0f64);
        let (sb, cb) = pitch.to_radians().sin_cos();
        let (sc, cc) = roll.to_radians().sin_cos();
        let frame = [-cb * sc, -cb * cc, sb];
        let accel = [-frame[0], -frame[2], -frame[1]];

        assert!(o.mix(&accel));
        assert_close(&o.euler_deg(), &[20.0, 10.0, 30.0]);
        assert_close(&euler_of(&o.matrix()), &[20.0, 10.0, 30.0]);
    }
}
