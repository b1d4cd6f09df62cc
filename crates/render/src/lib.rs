pub mod engine;
pub mod renderer;
pub mod thumbnail;

pub use engine::{Engine, DEFAULT_ENGINE};
pub use renderer::{CaptureMetrics, CaptureOutcome, CaptureRequest, ProcessRenderer, Renderer};
pub use thumbnail::{ImageThumbnailer, Thumbnailer};
