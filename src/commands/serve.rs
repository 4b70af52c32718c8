//! `stkboot serve`: one bootloader session against an emulated device

use crate::cli::ServeArgs;
use crate::config::{profile_config, ConfigFile};
use crate::error::Result;
use crate::transport::{accept_tcp, open_serial, Connection};
use std::fs;
use stkboot_core::device::Device;
use stkboot_core::{Bootloader, BootloaderConfig};
use stkboot_dummy::{DummyConfig, DummyDevice};

/// Run the serve command
pub fn run(args: &ServeArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => ConfigFile::from_file(path)?,
        None => ConfigFile::default(),
    };

    let base = match args.device.as_deref().or(file.device_name()) {
        Some(name) => profile_config(name)?,
        None => DummyConfig::default(),
    };
    let device_config = file.device_config(base)?;

    let mut config = file.apply(BootloaderConfig::default());
    if args.strict_sequence {
        config.strict_sequence_check = true;
    }
    if args.busy_timeout.is_some() {
        config.busy_timeout = args.busy_timeout;
    }

    let device = match &args.image {
        Some(path) => {
            let image = fs::read(path)?;
            if image.len() > device_config.layout.flash_size as usize {
                log::warn!(
                    "Image is {} bytes, only the first {} fit in flash",
                    image.len(),
                    device_config.layout.flash_size
                );
            }
            log::info!("Loaded {} bytes from {}", image.len(), path.display());
            DummyDevice::with_flash(device_config, &image)
        }
        None => DummyDevice::new(device_config),
    };

    let sig = device.config().signature;
    log::info!(
        "Emulating device {:02X} {:02X} {:02X}, {} bytes flash, boot section at 0x{:05X}",
        sig[0],
        sig[1],
        sig[2],
        device.layout().flash_size,
        device.layout().boot_start
    );

    let device = match &args.transport {
        Connection::Serial { device: port, baud } => {
            let mut link = open_serial(port, *baud)?;
            run_session(device, config, &mut link)?
        }
        Connection::Tcp { host, port } => {
            let mut link = accept_tcp(host, *port)?;
            run_session(device, config, &mut link)?
        }
    };

    log::info!(
        "Session done: {} pages erased, {} pages written",
        device.erase_log().len(),
        device.commits()
    );

    if let Some(path) = &args.dump {
        fs::write(path, device.flash())?;
        log::info!("Wrote flash contents to {}", path.display());
    }

    Ok(())
}

/// Serve requests on `link` until the host leaves programming mode
pub fn run_session<T>(device: DummyDevice, config: BootloaderConfig, link: &mut T) -> Result<DummyDevice>
where
    T: embedded_io::Read + embedded_io::Write,
{
    let mut bootloader = Bootloader::new(device, config);
    bootloader.run(link)?;
    Ok(bootloader.into_device())
}
