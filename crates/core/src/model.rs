use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::Result;

/// Placeholder in the host template replaced by the resolved server name.
const ALIAS_PLACEHOLDER: &str = "{$alias}";

/// Placeholder in page URLs replaced by the resolved host.
const HOST_PLACEHOLDER: &str = "$host";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub cookies: Vec<String>,
    /// Key into an environment's alternative map, for pages served from a
    /// substitute host on some environments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub alias: String,
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative: Option<HashMap<String, String>>,
}

/// The persisted page configuration: one page list per device, the
/// environment list, and the URL building blocks.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    #[serde(default)]
    pub desktop: Vec<Page>,
    #[serde(default)]
    pub tablet: Vec<Page>,
    #[serde(default)]
    pub mobile: Vec<Page>,
    #[serde(default)]
    pub envs: Vec<Environment>,
    /// Host template containing `{$alias}`, e.g. `http://{$alias}.example.com`.
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Request URLs the renderer must not load.
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    /// Set when the model was changed through the push channel and not yet
    /// written back to disk.
    #[serde(default)]
    pub edited: bool,
}

impl PageModel {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Missing or unreadable configuration leaves an empty model; the service
    /// still starts.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(model) => {
                debug!(path = %path.display(), envs = model.envs.len(), "Loaded page configuration");
                model
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "No page configuration found, starting empty");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn pages(&self, device: Device) -> &[Page] {
        match device {
            Device::Desktop => &self.desktop,
            Device::Tablet => &self.tablet,
            Device::Mobile => &self.mobile,
        }
    }

    pub fn env_by_alias(&self, alias: &str) -> Option<&Environment> {
        self.envs.iter().find(|e| e.alias == alias)
    }

    pub fn env_aliases(&self) -> Vec<String> {
        self.envs.iter().map(|e| e.alias.clone()).collect()
    }

    /// Build the request URL for a page on an environment: pick the
    /// alternative server when both sides declare one, substitute it into the
    /// host template, append the port, then substitute the host into the
    /// page's URL template.
    pub fn resolve_url(&self, page: &Page, env: &Environment) -> String {
        let server = page
            .alternative
            .as_ref()
            .and_then(|key| env.alternative.as_ref().and_then(|map| map.get(key)))
            .unwrap_or(&env.server);

        let mut host = self.host.replace(ALIAS_PLACEHOLDER, server);
        if let Some(port) = env.port {
            host.push_str(&format!(":{}", port));
        }

        page.url.replace(HOST_PLACEHOLDER, &host)
    }
}

/// One cookie value as handed to the renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Named cookie table loaded from the cookie file. Pages reference entries by
/// name; unknown names are skipped silently.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CookieTable(pub HashMap<String, Cookie>);

impl CookieTable {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(table) => table,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "No cookie file found, starting empty");
                Self::default()
            }
        }
    }

    pub fn resolve(&self, names: &[String]) -> Vec<Cookie> {
        names
            .iter()
            .filter_map(|name| self.0.get(name).cloned())
            .collect()
    }
}

/// One capture round: a time-ordered identifier (also the on-disk folder
/// name) plus the environment aliases captured per device. The list of
/// versions is append-only; only the most recent one is ever mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub name: String,
    #[serde(default)]
    pub desktop: Vec<String>,
    #[serde(default)]
    pub tablet: Vec<String>,
    #[serde(default)]
    pub mobile: Vec<String>,
}

impl Version {
    pub fn empty(name: String) -> Self {
        Self {
            name,
            desktop: Vec::new(),
            tablet: Vec::new(),
            mobile: Vec::new(),
        }
    }

    pub fn aliases(&self, device: Device) -> &[String] {
        match device {
            Device::Desktop => &self.desktop,
            Device::Tablet => &self.tablet,
            Device::Mobile => &self.mobile,
        }
    }

    pub fn aliases_mut(&mut self, device: Device) -> &mut Vec<String> {
        match device {
            Device::Desktop => &mut self.desktop,
            Device::Tablet => &mut self.tablet,
            Device::Mobile => &mut self.mobile,
        }
    }

    pub fn contains(&self, device: Device, alias: &str) -> bool {
        self.aliases(device).iter().any(|a| a == alias)
    }

    /// A version is complete when every device has captured every configured
    /// environment.
    pub fn is_complete(&self, env_count: usize) -> bool {
        self.desktop.len() == env_count
            && self.tablet.len() == env_count
            && self.mobile.len() == env_count
    }
}
