use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use argus_core::Device;

use crate::differ::ZERO_DIFF;

/// One regressed page. Absence from the list means no regression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub name: String,
    pub percentage: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: Vec<ResultEntry>,
}

/// Last comparison outcome per device. Entry names are unique per device:
/// a repeated upsert updates in place, and the zero sentinel evicts.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default)]
    pub desktop: DeviceResults,
    #[serde(default)]
    pub tablet: DeviceResults,
    #[serde(default)]
    pub mobile: DeviceResults,
}

impl ResultSet {
    pub fn device(&self, device: Device) -> &DeviceResults {
        match device {
            Device::Desktop => &self.desktop,
            Device::Tablet => &self.tablet,
            Device::Mobile => &self.mobile,
        }
    }

    pub fn device_mut(&mut self, device: Device) -> &mut DeviceResults {
        match device {
            Device::Desktop => &mut self.desktop,
            Device::Tablet => &mut self.tablet,
            Device::Mobile => &mut self.mobile,
        }
    }

    pub fn reset(&mut self, device: Device) {
        self.device_mut(device).results.clear();
    }

    /// Record a comparison outcome. An existing entry is updated, or removed
    /// when the percentage is exactly the zero sentinel; a new entry is only
    /// added for a non-zero percentage.
    pub fn upsert(&mut self, name: &str, device: Device, percentage: &str) {
        let results = self.device_mut(device);

        if let Some(idx) = results.results.iter().position(|e| e.name == name) {
            if percentage == ZERO_DIFF {
                results.results.remove(idx);
            } else {
                results.results[idx].percentage = percentage.to_string();
                results.date = Some(Utc::now());
            }
            return;
        }

        if percentage != ZERO_DIFF {
            results.results.push(ResultEntry {
                name: name.to_string(),
                percentage: percentage.to_string(),
            });
            results.date = Some(Utc::now());
        }
    }
}
