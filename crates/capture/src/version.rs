use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use argus_core::{Device, Error, Paths, Result, Version};

/// Outcome of applying an environment-touched transition to the current
/// version.
#[derive(Debug, PartialEq, Eq)]
pub enum Touch {
    /// The alias was new for this device; `completed` is set when the
    /// insertion made every device reach full cardinality.
    Recorded { completed: bool },
    /// Repeat touch while other aliases/devices are still pending: a
    /// liveness nudge, no state change.
    RepeatCollecting,
    /// Repeat touch on a complete version: the caller must allocate a new
    /// version.
    RepeatComplete,
    /// No version exists (a previous allocation failed).
    NoVersion,
}

/// Per-version capture record stored next to the images.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct VersionStatus {
    #[serde(default)]
    desktop: Vec<String>,
    #[serde(default)]
    tablet: Vec<String>,
    #[serde(default)]
    mobile: Vec<String>,
}

/// Tracks capture rounds. The version list is append-only and the most
/// recent entry is the only one ever mutated; a complete version is sealed
/// and the next touch materializes a new one.
pub struct VersionTracker {
    paths: Paths,
    versions: Vec<Version>,
}

impl VersionTracker {
    pub fn new(paths: Paths) -> Self {
        Self {
            paths,
            versions: Vec::new(),
        }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn current(&self) -> Option<&Version> {
        self.versions.last()
    }

    pub fn current_name(&self) -> Option<&str> {
        self.versions.last().map(|v| v.name.as_str())
    }

    /// Rebuild the version list from the capture directory. Entries are
    /// ordered chronologically; a folder whose name matches neither naming
    /// scheme sorts first and is kept as-is. Device sets come from the
    /// folder's status record when present, otherwise the version is assumed
    /// to cover every configured alias. An empty directory allocates the
    /// first version immediately.
    pub fn bootstrap(&mut self, aliases: &[String]) -> Result<()> {
        debug!("Fetch versions list");
        let dir = self.paths.capture_dir();
        std::fs::create_dir_all(&dir)?;

        let mut names: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();

        if names.is_empty() {
            return self.add_version();
        }

        for name in &names {
            if sort_key(name).is_none() {
                warn!(version = %name, "Version folder name not recognized, sorting first");
            }
        }
        names.sort_by_key(|name| sort_key(name));

        for name in names {
            let version = match self.load_status(&name) {
                Some(status) => Version {
                    name,
                    desktop: status.desktop,
                    tablet: status.tablet,
                    mobile: status.mobile,
                },
                // no status record: consider the round full
                None => Version {
                    name,
                    desktop: aliases.to_vec(),
                    tablet: aliases.to_vec(),
                    mobile: aliases.to_vec(),
                },
            };
            self.versions.push(version);
        }

        Ok(())
    }

    fn load_status(&self, version: &str) -> Option<VersionStatus> {
        let path = self.paths.status_file(version);
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(version, error = %e, "Unreadable status record, considering the round full");
                None
            }
        }
    }

    /// Allocate a new round: the storage directory is created before the
    /// version is published, so a failed allocation leaves the list
    /// unchanged and a later touch can retry. Identifiers are minute-granular;
    /// a second round inside the same minute is stamped one minute later to
    /// keep the list unique and time-ordered.
    pub fn add_version(&mut self) -> Result<()> {
        let mut now = Local::now();
        let mut name = version_name(now);
        while self.versions.iter().any(|v| v.name == name) {
            now = now + chrono::Duration::minutes(1);
            name = version_name(now);
        }

        std::fs::create_dir_all(self.paths.version_dir(&name))?;
        info!(version = %name, "New version added");
        self.versions.push(Version::empty(name));
        Ok(())
    }

    /// Apply an environment-touched transition to the current version.
    pub fn record_touch(&mut self, device: Device, alias: &str, env_count: usize) -> Touch {
        let Some(current) = self.versions.last_mut() else {
            return Touch::NoVersion;
        };

        if !current.contains(device, alias) {
            current.aliases_mut(device).push(alias.to_string());
            let completed = current.is_complete(env_count);
            if completed {
                debug!(version = %current.name, "Version complete");
            }
            self.persist_status();
            return Touch::Recorded { completed };
        }

        if current.is_complete(env_count) {
            Touch::RepeatComplete
        } else {
            Touch::RepeatCollecting
        }
    }

    /// Write the current version's device sets next to its images so a
    /// restart reconstructs partial rounds faithfully.
    fn persist_status(&self) {
        let Some(current) = self.versions.last() else {
            return;
        };
        let status = VersionStatus {
            desktop: current.desktop.clone(),
            tablet: current.tablet.clone(),
            mobile: current.mobile.clone(),
        };
        let path = self.paths.status_file(&current.name);
        let result = serde_json::to_string_pretty(&status)
            .map_err(Error::from)
            .and_then(|content| std::fs::write(&path, content).map_err(Error::from));
        if let Err(e) = result {
            warn!(version = %current.name, error = %e, "Failed to write status record");
        }
    }
}

/// Folder name for a new round: unpadded `m-d-yyyy-h:mm`, local time.
fn version_name(now: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}-{}:{}",
        now.month(),
        now.day(),
        now.year(),
        now.hour(),
        now.minute()
    )
}

/// Chronological key for a version folder name. Supports the legacy 3-field
/// `m-d-yyyy` form and the current 4-field `m-d-yyyy-h:mm` form; anything
/// else yields `None` and sorts before every dated entry.
fn sort_key(name: &str) -> Option<NaiveDateTime> {
    let parts: Vec<&str> = name.split('-').collect();
    match parts.len() {
        3 => {
            let (month, day, year) = parse_date(&parts)?;
            NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
        }
        4 => {
            let (month, day, year) = parse_date(&parts)?;
            let (hour, minute) = parts[3].split_once(':')?;
            NaiveDate::from_ymd_opt(year, month, day)?
                .and_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
        }
        _ => None,
    }
}

fn parse_date(parts: &[&str]) -> Option<(u32, u32, i32)> {
    Some((
        parts[0].parse().ok()?,
        parts[1].parse().ok()?,
        parts[2].parse().ok()?,
    ))
}
