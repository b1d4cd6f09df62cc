use std::sync::Arc;
use tracing::{info, warn};

use argus_core::{Device, Environment, PageModel, Paths};

use crate::differ::{format_percentage, ImageDiffer};
use crate::results::ResultSet;

/// Diffs two environments page-by-page over every device, feeding the result
/// set. Reads captured images from the given version's directory.
pub struct ComparisonOrchestrator {
    differ: Arc<dyn ImageDiffer>,
}

impl ComparisonOrchestrator {
    pub fn new(differ: Arc<dyn ImageDiffer>) -> Self {
        Self { differ }
    }

    pub fn compare(
        &self,
        model: &PageModel,
        left: &Environment,
        right: &Environment,
        paths: &Paths,
        version: &str,
        results: &mut ResultSet,
    ) {
        info!(left = %left.alias, right = %right.alias, version, "Comparison started");

        for device in Device::ALL {
            results.reset(device);

            for page in model.pages(device) {
                let left_image = paths.image_path(version, &left.alias, &page.name);
                let right_image = paths.image_path(version, &right.alias, &page.name);

                match self.differ.diff(&left_image, &right_image) {
                    Ok(percentage) => {
                        results.upsert(&page.name, device, &format_percentage(percentage));
                    }
                    Err(e) => {
                        warn!(page = %page.name, device = %device, error = %e, "Diff failed, skipping page");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::Result;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct StubDiffer {
        by_page: HashMap<String, f64>,
        calls: Mutex<Vec<(PathBuf, PathBuf)>>,
    }

    impl ImageDiffer for StubDiffer {
        fn diff(&self, left: &Path, right: &Path) -> Result<f64> {
            self.calls
                .lock()
                .unwrap()
                .push((left.to_path_buf(), right.to_path_buf()));
            let name = left.file_name().unwrap().to_str().unwrap();
            self.by_page
                .get(name)
                .copied()
                .ok_or_else(|| argus_core::Error::Diff(format!("missing: {}", name)))
        }
    }

    fn model() -> PageModel {
        serde_json::from_str(
            r#"{
                "host": "http://{$alias}.example.com",
                "envs": [
                    {"alias": "envA", "server": "a"},
                    {"alias": "envB", "server": "b"}
                ],
                "desktop": [{"name": "home", "url": "$host/"}],
                "tablet": [{"name": "home", "url": "$host/"}],
                "mobile": [{"name": "home", "url": "$host/"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_identical_pages_leave_no_entries() {
        let differ = Arc::new(StubDiffer {
            by_page: HashMap::from([("envAhome.png".to_string(), 0.0)]),
            calls: Mutex::new(Vec::new()),
        });
        let orchestrator = ComparisonOrchestrator::new(differ.clone());
        let model = model();
        let paths = Paths::with_base(PathBuf::from("/tmp/argus-test"));
        let mut results = ResultSet::default();

        orchestrator.compare(
            &model,
            &model.envs[0],
            &model.envs[1],
            &paths,
            "7-1-2026-9:30",
            &mut results,
        );

        for device in Device::ALL {
            assert!(results.device(device).results.is_empty());
        }
        // one diff per device for the single configured page
        assert_eq!(differ.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_regression_recorded_per_device() {
        let differ = Arc::new(StubDiffer {
            by_page: HashMap::from([("envAhome.png".to_string(), 12.5)]),
            calls: Mutex::new(Vec::new()),
        });
        let orchestrator = ComparisonOrchestrator::new(differ);
        let model = model();
        let paths = Paths::with_base(PathBuf::from("/tmp/argus-test"));
        let mut results = ResultSet::default();

        orchestrator.compare(
            &model,
            &model.envs[0],
            &model.envs[1],
            &paths,
            "7-1-2026-9:30",
            &mut results,
        );

        for device in Device::ALL {
            let entries = &results.device(device).results;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].percentage, "12.50");
        }
    }

    #[test]
    fn test_diff_error_skips_page_and_clears_stale_entries() {
        let differ = Arc::new(StubDiffer {
            by_page: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        });
        let orchestrator = ComparisonOrchestrator::new(differ);
        let model = model();
        let paths = Paths::with_base(PathBuf::from("/tmp/argus-test"));
        let mut results = ResultSet::default();
        results.upsert("stale", Device::Desktop, "9.99");

        orchestrator.compare(
            &model,
            &model.envs[0],
            &model.envs[1],
            &paths,
            "7-1-2026-9:30",
            &mut results,
        );

        assert!(results.device(Device::Desktop).results.is_empty());
    }

    #[test]
    fn test_reads_from_version_directory() {
        let differ = Arc::new(StubDiffer {
            by_page: HashMap::from([("envAhome.png".to_string(), 0.0)]),
            calls: Mutex::new(Vec::new()),
        });
        let orchestrator = ComparisonOrchestrator::new(differ.clone());
        let model = model();
        let paths = Paths::with_base(PathBuf::from("/tmp/argus-test"));
        let mut results = ResultSet::default();

        orchestrator.compare(
            &model,
            &model.envs[0],
            &model.envs[1],
            &paths,
            "7-1-2026-9:30",
            &mut results,
        );

        let calls = differ.calls.lock().unwrap();
        assert!(calls[0]
            .0
            .starts_with("/tmp/argus-test/screenshots/7-1-2026-9:30"));
        assert!(calls[0].1.ends_with("envBhome.png"));
    }
}
