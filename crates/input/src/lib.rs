//! Input collaborator: "is key X currently down" plus the pure steering
//! function that turns a key snapshot into a new camera rotation.
//!
//! # Invariants
//! - Steering never touches the camera; it maps `(rotation, input)` to a rotation.
//! - Platform key codes are mapped to [`Key`] by the application, not here.

pub mod keys;
pub mod steer;

pub use keys::{InputState, Key, KeyboardState};
pub use steer::CameraSteer;

pub fn crate_info() -> &'static str {
    "texgrid-input v0.1.0"
}
