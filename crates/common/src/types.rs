use serde::{Deserialize, Serialize};

/// Camera orientation in degrees.
///
/// Applied pitch first (about X), then yaw (about Y), then roll (about Z).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotation {
    pub const ZERO: Self = Self {
        pitch: 0.0,
        yaw: 0.0,
        roll: 0.0,
    };

    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Add per-axis deltas, keeping every angle in `[-180, 180)`.
    pub fn offset(self, pitch: f32, yaw: f32, roll: f32) -> Self {
        Self {
            pitch: wrap_degrees(self.pitch + pitch),
            yaw: wrap_degrees(self.yaw + yaw),
            roll: wrap_degrees(self.roll + roll),
        }
    }

    /// `(pitch, yaw, roll)` in radians.
    pub fn to_radians(self) -> (f32, f32, f32) {
        (
            self.pitch.to_radians(),
            self.yaw.to_radians(),
            self.roll.to_radians(),
        )
    }
}

/// Wrap an angle in degrees into `[-180, 180)`.
pub fn wrap_degrees(degrees: f32) -> f32 {
    (degrees + 180.0).rem_euclid(360.0) - 180.0
}
