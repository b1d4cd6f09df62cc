pub mod config;
pub mod device;
pub mod error;
pub mod event;
pub mod model;
pub mod paths;

pub use config::Config;
pub use device::{Device, DeviceProfile, Viewport};
pub use error::{Error, Result};
pub use event::{Event, EventBus};
pub use model::{Cookie, CookieTable, Environment, Page, PageModel, Version};
pub use paths::Paths;
