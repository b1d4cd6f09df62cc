use std::path::PathBuf;
use tracing::warn;

use argus_core::{Error, Result};

/// A renderer backend: an external binary that takes the capture script plus
/// a JSON payload and writes a raster image to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    pub name: &'static str,
    /// Extra argument disabling certificate checks, engines differ here.
    pub ssl_arg: Option<&'static str>,
}

const ENGINES: &[Engine] = &[
    Engine {
        name: "phantomjs",
        ssl_arg: Some("--ignore-ssl-errors=true"),
    },
    Engine {
        name: "slimerjs",
        ssl_arg: None,
    },
];

pub const DEFAULT_ENGINE: &str = "phantomjs";

impl Engine {
    /// Look up an engine by name; unknown or absent names fall back to the
    /// default backend.
    pub fn get(name: Option<&str>) -> &'static Engine {
        let wanted = name.unwrap_or(DEFAULT_ENGINE);
        match ENGINES.iter().find(|e| e.name == wanted) {
            Some(engine) => engine,
            None => {
                warn!(engine = wanted, "Unknown engine, falling back to {}", DEFAULT_ENGINE);
                ENGINES
                    .iter()
                    .find(|e| e.name == DEFAULT_ENGINE)
                    .unwrap_or(&ENGINES[0])
            }
        }
    }

    /// Resolve the engine binary: `ARGUS_<NAME>_PATH` wins, then `$PATH`.
    pub fn resolve_binary(&self) -> Result<PathBuf> {
        let var = format!("ARGUS_{}_PATH", self.name.to_uppercase());
        if let Ok(path) = std::env::var(&var) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        which::which(self.name)
            .map_err(|e| Error::Engine(format!("{} not found: {}", self.name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_by_name() {
        assert_eq!(Engine::get(Some("slimerjs")).name, "slimerjs");
        assert_eq!(Engine::get(Some("phantomjs")).name, "phantomjs");
    }

    #[test]
    fn test_unknown_name_falls_back_to_default() {
        assert_eq!(Engine::get(Some("webkit2png")).name, DEFAULT_ENGINE);
        assert_eq!(Engine::get(None).name, DEFAULT_ENGINE);
    }

    #[test]
    fn test_phantomjs_carries_ssl_arg() {
        assert!(Engine::get(Some("phantomjs")).ssl_arg.is_some());
    }
}
