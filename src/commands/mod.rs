//! CLI command implementations

mod list;
pub mod serve;

pub use list::list_devices;
