mod controller;
mod state;

pub use controller::{ControllerError, PlaybackController, PlaybackHandle};
pub use state::PlaybackState;
