use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use argus_core::{Cookie, Error, Result, Viewport};

use crate::engine::Engine;

/// Everything the external renderer needs for one capture.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    /// Destination image path on disk.
    pub dest: PathBuf,
    pub user_agent: String,
    pub viewport: Viewport,
    pub cookies: Vec<Cookie>,
    /// Request URLs the renderer must skip.
    pub blacklist: Vec<String>,
    pub proxy: Option<String>,
}

/// Status payload printed by the capture script on success.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CaptureMetrics {
    /// Per-request load errors encountered while rendering.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Result of a renderer run that exited cleanly. `metrics` is `None` when
/// the status payload could not be parsed; the capture still counts as done.
#[derive(Debug, Clone, Default)]
pub struct CaptureOutcome {
    pub metrics: Option<CaptureMetrics>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    async fn capture(&self, req: &CaptureRequest) -> Result<CaptureOutcome>;
}

/// Spawns the engine binary with the capture script and a JSON payload,
/// bounded by a hard timeout. An overrun kills the process.
pub struct ProcessRenderer {
    engine: &'static Engine,
    script: PathBuf,
    timeout: Duration,
}

impl ProcessRenderer {
    pub fn new(engine: &'static Engine, script: PathBuf, timeout: Duration) -> Self {
        Self {
            engine,
            script,
            timeout,
        }
    }

    fn payload(req: &CaptureRequest) -> String {
        json!({
            "ua": req.user_agent,
            "viewportSize": req.viewport,
            "cookies": req.cookies,
            "blacklist": req.blacklist,
            "path": req.dest,
            "url": req.url,
        })
        .to_string()
    }
}

#[async_trait]
impl Renderer for ProcessRenderer {
    fn name(&self) -> &str {
        self.engine.name
    }

    async fn capture(&self, req: &CaptureRequest) -> Result<CaptureOutcome> {
        let binary = self.engine.resolve_binary()?;

        let mut cmd = Command::new(&binary);
        if let Some(proxy) = &req.proxy {
            cmd.arg(format!("--proxy={}", proxy));
        }
        if let Some(ssl_arg) = self.engine.ssl_arg {
            cmd.arg(ssl_arg);
        }
        cmd.arg(&self.script)
            .arg(Self::payload(req))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(engine = self.engine.name, url = %req.url, dest = %req.dest.display(), "Spawning renderer");

        let output = match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Render(format!("failed to spawn {}: {}", self.engine.name, e))),
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "{} exceeded {}s rendering {}",
                    self.engine.name,
                    self.timeout.as_secs(),
                    req.url
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Render(format!(
                "{} exited with {:?}: {}",
                self.engine.name,
                output.status.code(),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_outcome(self.engine.name, &stdout))
    }
}

/// A clean exit with an unreadable status payload is still a completed
/// capture; only the metrics are missing.
fn parse_outcome(engine: &str, stdout: &str) -> CaptureOutcome {
    match serde_json::from_str::<CaptureMetrics>(stdout.trim()) {
        Ok(metrics) => {
            if !metrics.errors.is_empty() {
                warn!(engine, errors = ?metrics.errors, "Request errors during capture");
            }
            CaptureOutcome {
                metrics: Some(metrics),
            }
        }
        Err(e) => {
            warn!(engine, error = %e, output = stdout.trim(), "Unparsable renderer status payload");
            CaptureOutcome { metrics: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CaptureRequest {
        CaptureRequest {
            url: "http://www.example.com/index.html".into(),
            dest: PathBuf::from("/tmp/prodhome.png"),
            user_agent: "test-agent".into(),
            viewport: Viewport {
                width: 1600,
                height: 1100,
            },
            cookies: vec![],
            blacklist: vec!["http://ads.example.com".into()],
            proxy: None,
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload: serde_json::Value =
            serde_json::from_str(&ProcessRenderer::payload(&request())).unwrap();
        assert_eq!(payload["url"], "http://www.example.com/index.html");
        assert_eq!(payload["ua"], "test-agent");
        assert_eq!(payload["viewportSize"]["width"], 1600);
        assert_eq!(payload["blacklist"][0], "http://ads.example.com");
        assert_eq!(payload["path"], "/tmp/prodhome.png");
    }

    #[test]
    fn test_parse_outcome_with_request_errors() {
        let outcome = parse_outcome("phantomjs", r#"{"errors": ["http://x failed"]}"#);
        assert_eq!(outcome.metrics.unwrap().errors.len(), 1);
    }

    #[test]
    fn test_parse_outcome_garbage_yields_no_metrics() {
        let outcome = parse_outcome("phantomjs", "TypeError: undefined is not a function");
        assert!(outcome.metrics.is_none());
    }

    #[test]
    fn test_parse_outcome_empty_errors() {
        let outcome = parse_outcome("phantomjs", r#"{"errors": []}"#);
        assert!(outcome.metrics.unwrap().errors.is_empty());
    }
}
