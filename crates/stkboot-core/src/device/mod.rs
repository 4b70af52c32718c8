//! Device capability and memory description
//!
//! The bootloader core never addresses hardware registers. A target platform
//! implements [`Device`] and describes its memories with a [`MemoryLayout`].

mod profiles;
mod traits;
mod types;

pub use profiles::{find_by_name, find_by_signature, PROFILES};
pub use traits::Device;
pub use types::{AddressMode, DeviceProfile, FuseKind, MemoryLayout};
