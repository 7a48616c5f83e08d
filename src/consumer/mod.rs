//! Consumer: drains the input queue, squares each item, pushes results.

pub mod drain;
pub mod progress;
pub mod transform;

pub use drain::{Consumer, ConsumerConfig, DrainReport, DrainState, MalformedPolicy};
pub use progress::{Progress, ProgressTracker};
pub use transform::{ResultRecord, parse_item, transform};
