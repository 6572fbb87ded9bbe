// Infinitton iDisplay Driver - Shared Library
// Image pipeline, frame cache, animation scheduling and driver configuration

pub mod animation;
pub mod color;
pub mod config;
pub mod frame_cache;
pub mod loader;
pub mod pipeline;
pub mod press;

pub use animation::{AnimationError, AnimationRegistry, AnimationScheduler};
pub use config::{ButtonConfig, DriverConfig};
pub use frame_cache::{CacheError, CacheKey, FrameCache};
pub use pipeline::{Frame, PipelineError, Rotation, TransformOptions};
pub use press::{handle_press, PressListener, PressSettings};
