pub mod expander;
pub mod job;
pub mod plugin;
pub mod service;
pub mod version;

pub use expander::{expand, job_for_page, RefreshingSet};
pub use job::{Job, JobOptions};
pub use plugin::{start_plugins, Plugin, PluginContext};
pub use service::{CaptureHandle, CaptureService, Command, ModelUpdate};
pub use version::{Touch, VersionTracker};
