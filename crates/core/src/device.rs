use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The three capture targets. Viewports and user agents are fixed constants,
/// not runtime configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Desktop,
    Tablet,
    Mobile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub viewport: Viewport,
    pub user_agent: &'static str,
}

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 6.1) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/41.0.2228.0 Safari/537.36";
const TABLET_UA: &str = "Mozilla/5.0 (iPad; CPU OS 8_0 like Mac OS X) AppleWebKit/600.1.3 (KHTML, like Gecko) Version/8.0 Mobile/12A4345d Safari/600.1.4";
const MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 8_1 like Mac OS X) AppleWebKit/536.26 (KHTML, like Gecko) Version/6.0 Mobile/10A5376e Safari/8536.25";

impl Device {
    pub const ALL: [Device; 3] = [Device::Desktop, Device::Tablet, Device::Mobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Tablet => "tablet",
            Device::Mobile => "mobile",
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        match self {
            Device::Desktop => DeviceProfile {
                viewport: Viewport { width: 1600, height: 1100 },
                user_agent: DESKTOP_UA,
            },
            Device::Tablet => DeviceProfile {
                viewport: Viewport { width: 1024, height: 1100 },
                user_agent: TABLET_UA,
            },
            Device::Mobile => DeviceProfile {
                viewport: Viewport { width: 640, height: 1100 },
                user_agent: MOBILE_UA,
            },
        }
    }
}

impl std::str::FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(Device::Desktop),
            "tablet" => Ok(Device::Tablet),
            "mobile" => Ok(Device::Mobile),
            other => Err(Error::NotFound(format!("unknown device: {}", other))),
        }
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
