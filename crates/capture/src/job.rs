use serde::Serialize;

use argus_core::{Cookie, Device, Viewport};

/// One pending capture. Created by the expander, consumed exactly once by the
/// dispatcher, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub url: String,
    pub name: String,
    pub options: JobOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Environment alias the capture belongs to.
    pub env: String,
    pub device: Device,
    pub cookies: Vec<Cookie>,
    pub user_agent: String,
    pub viewport: Viewport,
}
