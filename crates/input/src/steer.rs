use texgrid_common::Rotation;

use crate::keys::{InputState, Key};

/// Fixed per-tick rotation deltas, in degrees.
///
/// Up/Down pitch, Left/Right yaw, Confirm/Cancel roll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraSteer {
    pub pitch_step: f32,
    pub yaw_step: f32,
    pub roll_step: f32,
}

impl Default for CameraSteer {
    fn default() -> Self {
        Self {
            pitch_step: 1.0,
            yaw_step: 1.0,
            roll_step: 0.1,
        }
    }
}

impl CameraSteer {
    /// Next rotation given the previous one and the keys held this tick.
    pub fn apply(&self, rotation: Rotation, input: &dyn InputState) -> Rotation {
        let axis = |negative: Key, positive: Key| -> f32 {
            match (input.is_key_down(negative), input.is_key_down(positive)) {
                (true, false) => -1.0,
                (false, true) => 1.0,
                _ => 0.0,
            }
        };

        let pitch = axis(Key::Up, Key::Down) * self.pitch_step;
        let yaw = axis(Key::Left, Key::Right) * self.yaw_step;
        let roll = axis(Key::Cancel, Key::Confirm) * self.roll_step;

        if pitch == 0.0 && yaw == 0.0 && roll == 0.0 {
            return rotation;
        }
        rotation.offset(pitch, yaw, roll)
    }
}
