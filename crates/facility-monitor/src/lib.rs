//! Consumer-side adapters over the facility metrics stream.

pub mod buffer;
pub mod monitor;
pub mod view;

pub use buffer::RingBuffer;
pub use monitor::{FacilityMonitor, HISTORY_LEN, MAX_ALERTS, Sample};
pub use view::LiveMetrics;
