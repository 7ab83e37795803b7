//! Input plugins for an in-process host.
//!
//! An [`InputPlugin`] recognizes streams and plays them; the
//! [`PluginRegistry`] routes locations to plugins by extension and content.
//! [`MpegInputPlugin`] handles MPEG audio (`mp3`, `mp2`, `mp1`, `bmu`).

mod mpeg;
mod plugin;
mod registry;

pub use mpeg::{MpegInputPlugin, MPEG_EXTENSIONS};
pub use plugin::{
    extension_of, title_from_location, InputPlugin, PluginError, PluginInfo, PluginResult,
    TrackInfo,
};
pub use registry::PluginRegistry;
