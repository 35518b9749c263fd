//! Scrollink Render Library
//!
//! GPU drawing surface for the scrollink engine. The default implementation
//! records every frame into a Vello scene.

#[cfg(feature = "vello-renderer")]
mod vello_impl;

#[cfg(feature = "vello-renderer")]
pub use vello_impl::{FrameStats, VelloBitmap, VelloSurface, blend_mode};
