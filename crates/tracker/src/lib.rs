pub mod handle;
pub mod tracker;

pub use handle::{Handle, Outcome};
pub use tracker::ResourceTracker;
