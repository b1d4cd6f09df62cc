use std::sync::Arc;
use tracing::{info, warn};

use argus_core::{Config, EventBus, Result};

use crate::service::CaptureHandle;

/// What a plugin gets at startup: a read-only configuration snapshot, the
/// typed event bus, and the capture front door. Never the live state.
#[derive(Clone)]
pub struct PluginContext {
    pub config: Arc<Config>,
    pub events: EventBus,
    pub capture: CaptureHandle,
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Called once at gateway boot. Long-running work must spawn its own
    /// task; a failure here disables the plugin, nothing else.
    fn start(&self, ctx: PluginContext) -> Result<()>;
}

pub fn start_plugins(plugins: &[Box<dyn Plugin>], ctx: &PluginContext) {
    for plugin in plugins {
        match plugin.start(ctx.clone()) {
            Ok(()) => info!(plugin = plugin.name(), "Plugin started"),
            Err(e) => warn!(plugin = plugin.name(), error = %e, "Plugin failed to start"),
        }
    }
}
