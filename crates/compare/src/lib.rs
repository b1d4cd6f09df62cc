pub mod differ;
pub mod orchestrator;
pub mod results;

pub use differ::{format_percentage, ImageDiffer, PixelDiffer, ZERO_DIFF};
pub use orchestrator::ComparisonOrchestrator;
pub use results::{DeviceResults, ResultEntry, ResultSet};
