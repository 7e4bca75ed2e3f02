pub mod adb;
pub mod android;
pub mod traits;

pub use android::AndroidDevice;
pub use traits::{AppInfo, DeviceOps};

use crate::error::EngineError;

/// Print connected Android devices.
pub async fn list_devices() -> Result<(), EngineError> {
    let devices = adb::get_devices().await?;
    if devices.is_empty() {
        println!("No devices connected");
        return Ok(());
    }
    for device in devices {
        println!("{}\t{}", device.serial, device.state);
    }
    Ok(())
}
