//! Bootloader configuration

use bitflags::bitflags;

bitflags! {
    /// Optional command processor features
    ///
    /// These used to be build-time switches of the bootloader firmware.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Options: u8 {
        /// Answer `CMD_SPI_MULTI` with the signature/fuse compatibility stub
        const SPI_MULTI          = 1 << 0;
        /// Accept `CMD_PROGRAM_LOCK_ISP`
        const LOCK_BITS          = 1 << 1;
        /// Toggle the activity indicator after every reply
        const ACTIVITY_INDICATOR = 1 << 2;
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::all()
    }
}

/// Version constants reported through `CMD_GET_PARAMETER`
///
/// Hosts compare these against what they expect from an AVRISP mkII, so the
/// defaults match that programmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// `PARAM_BUILD_NUMBER_LOW`
    pub build_number_low: u8,
    /// `PARAM_BUILD_NUMBER_HIGH`
    pub build_number_high: u8,
    /// `PARAM_HW_VER`
    pub hw_version: u8,
    /// `PARAM_SW_MAJOR`
    pub sw_major: u8,
    /// `PARAM_SW_MINOR`
    pub sw_minor: u8,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            build_number_low: 0,
            build_number_high: 0,
            hw_version: 0x0F,
            sw_major: 2,
            sw_minor: 0x0A,
        }
    }
}

/// Session-wide bootloader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootloaderConfig {
    /// Only accept sequence number 1 or the sequence of the next reply
    pub strict_sequence_check: bool,
    /// Optional commands and indicators
    pub options: Options,
    /// Maximum busy polls per erase/write before giving up, `None` waits forever
    pub busy_timeout: Option<u32>,
    /// Values answered to `CMD_GET_PARAMETER`
    pub version: VersionInfo,
}

impl BootloaderConfig {
    /// Enable or disable strict sequence checking
    pub fn with_strict_sequence(mut self, strict: bool) -> Self {
        self.strict_sequence_check = strict;
        self
    }

    /// Replace the option set
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Bound every busy-wait to `polls` device polls
    pub fn with_busy_timeout(mut self, polls: Option<u32>) -> Self {
        self.busy_timeout = polls;
        self
    }
}
