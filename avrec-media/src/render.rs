//! Frame rendering onto a codec input surface
//!
//! The video pipeline draws frames with a caller supplied [`FrameRenderer`]
//! and presents them on the [`InputSurface`] the codec device created. Each
//! `swap_buffers` hands one frame to the encoder.

use thiserror::Error;

/// Rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    /// The rendering context could not be bound to the calling thread
    #[error("Failed to make context current: {reason}")]
    ContextUnavailable {
        /// Failure reason
        reason: String,
    },

    /// Frame presentation failed
    #[error("Swap buffers failed: {reason}")]
    SwapFailed {
        /// Failure reason
        reason: String,
    },

    /// The renderer could not draw a frame
    #[error("Draw failed: {reason}")]
    DrawFailed {
        /// Failure reason
        reason: String,
    },

    /// The surface was already released
    #[error("Surface released")]
    SurfaceReleased,
}

/// Result type for rendering operations
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// Drawable surface feeding a video codec device
///
/// Created by [`crate::VideoCodecDevice::create_input_surface`] and used
/// exclusively by the render thread.
pub trait InputSurface: Send {
    /// Bind the surface's rendering context to the calling thread
    fn make_current(&mut self) -> RenderResult<()>;

    /// Present the drawn frame to the encoder
    ///
    /// May block until the encoder is ready for another frame. The render
    /// thread calls this back to back, so a blocking swap is what sets the
    /// frame rate.
    fn swap_buffers(&mut self) -> RenderResult<()>;

    /// Release the surface and its context
    fn release(&mut self);
}

/// Draws the frames that get recorded
///
/// Hooks are always called on the render thread, in order:
/// `on_context_created`, `on_surface_changed`, then `on_draw_frame` once per
/// frame, and finally `on_context_destroyed` when the thread exits.
pub trait FrameRenderer: Send {
    /// The rendering context became current
    fn on_context_created(&mut self) {}

    /// The surface dimensions are known
    fn on_surface_changed(&mut self, _width: u32, _height: u32) {}

    /// Draw one frame
    fn on_draw_frame(&mut self) -> RenderResult<()>;

    /// The render thread is exiting
    fn on_context_destroyed(&mut self) {}
}

impl<F> FrameRenderer for F
where
    F: FnMut() -> RenderResult<()> + Send,
{
    fn on_draw_frame(&mut self) -> RenderResult<()> {
        self()
    }
}
