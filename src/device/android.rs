use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::adb;
use super::traits::{AppInfo, DeviceOps};
use crate::error::EngineError;

/// Escape text for the Android shell `input text` command
fn escape_for_shell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(' ', "%s")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
        .replace('&', "\\&")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('|', "\\|")
        .replace(';', "\\;")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

fn keycode_for(key: &str) -> String {
    let name = key.trim().to_uppercase();
    let name = name.strip_prefix("KEYCODE_").unwrap_or(&name);
    match name {
        "BACK" => "KEYCODE_BACK".to_string(),
        "HOME" => "KEYCODE_HOME".to_string(),
        "MENU" => "KEYCODE_MENU".to_string(),
        "POWER" => "KEYCODE_POWER".to_string(),
        "ENTER" => "KEYCODE_ENTER".to_string(),
        "DEL" | "DELETE" => "KEYCODE_DEL".to_string(),
        "VOLUME_UP" => "KEYCODE_VOLUME_UP".to_string(),
        "VOLUME_DOWN" => "KEYCODE_VOLUME_DOWN".to_string(),
        other => format!("KEYCODE_{}", other),
    }
}

/// A physical or emulated Android device driven over adb.
pub struct AndroidDevice {
    serial: Option<String>,
}

impl AndroidDevice {
    pub fn new(serial: Option<String>) -> Self {
        Self { serial }
    }

    /// Connect and verify the transport by asking for the product model.
    pub async fn connect(serial: Option<String>) -> Result<Self, EngineError> {
        let device = Self::new(serial);
        let model = adb::shell(device.serial(), "getprop ro.product.model").await?;
        log::info!("connected to device: {}", model.trim());
        Ok(device)
    }

    fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }
}

#[async_trait]
impl DeviceOps for AndroidDevice {
    async fn click(&self, x: i32, y: i32) -> Result<(), EngineError> {
        adb::shell(self.serial(), &format!("input tap {} {}", x, y)).await?;
        Ok(())
    }

    async fn long_press(&self, x: i32, y: i32, duration: Duration) -> Result<(), EngineError> {
        // a swipe that stays in place is a long press
        adb::shell(
            self.serial(),
            &format!(
                "input swipe {} {} {} {} {}",
                x,
                y,
                x,
                y,
                duration.as_millis()
            ),
        )
        .await?;
        Ok(())
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration: Duration,
    ) -> Result<(), EngineError> {
        adb::shell(
            self.serial(),
            &format!(
                "input swipe {} {} {} {} {}",
                x1,
                y1,
                x2,
                y2,
                duration.as_millis()
            ),
        )
        .await?;
        Ok(())
    }

    async fn set_text(&self, text: &str) -> Result<(), EngineError> {
        adb::shell(
            self.serial(),
            &format!("input text \"{}\"", escape_for_shell(text)),
        )
        .await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), EngineError> {
        adb::shell(self.serial(), &format!("input keyevent {}", keycode_for(key))).await?;
        Ok(())
    }

    async fn dump_hierarchy(&self) -> Result<String, EngineError> {
        // exec-out avoids the round trip through /sdcard on modern Android
        match adb::exec_out(self.serial(), "uiautomator dump /dev/stdout").await {
            Ok(output) if output.contains("<?xml") => Ok(output),
            _ => {
                adb::shell(
                    self.serial(),
                    "uiautomator dump /sdcard/window_dump.xml > /dev/null && cat /sdcard/window_dump.xml",
                )
                .await
            }
        }
    }

    async fn screen_size(&self) -> Result<(u32, u32), EngineError> {
        let output = adb::shell(self.serial(), "wm size").await?;
        let re = Regex::new(r"(?m)^(?:Override|Physical) size:\s*(\d+)x(\d+)").unwrap();
        // prefer an Override line when present
        let mut physical = None;
        for caps in re.captures_iter(&output) {
            let size = (
                caps[1].parse().unwrap_or(1080),
                caps[2].parse().unwrap_or(1920),
            );
            if caps[0].starts_with("Override") {
                return Ok(size);
            }
            physical = Some(size);
        }
        match physical {
            Some(size) => Ok(size),
            None => {
                log::warn!("could not parse 'wm size' output, assuming 1080x1920");
                Ok((1080, 1920))
            }
        }
    }

    async fn current_app(&self) -> Result<AppInfo, EngineError> {
        let output = adb::shell(
            self.serial(),
            "dumpsys window 2>/dev/null | grep -E 'mCurrentFocus|mFocusedApp' | head -2",
        )
        .await?;

        let re = Regex::new(r"([A-Za-z0-9_.]+)/([A-Za-z0-9_.$]+)").unwrap();
        match re.captures(&output) {
            Some(caps) => Ok(AppInfo {
                package: caps[1].to_string(),
                activity: caps[2].to_string(),
            }),
            None => Ok(AppInfo::default()),
        }
    }

    async fn launch_app(&self, package: &str) -> Result<(), EngineError> {
        let output = adb::shell(
            self.serial(),
            &format!("monkey -p {} -c android.intent.category.LAUNCHER 1", package),
        )
        .await?;
        if output.contains("No activities found") {
            return Err(EngineError::fatal(format!(
                "no launchable activity for package '{}'",
                package
            )));
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), EngineError> {
        adb::shell(self.serial(), "screencap -p /sdcard/droid_pilot_screen.png").await?;
        adb::exec(
            self.serial(),
            &[
                "pull",
                "/sdcard/droid_pilot_screen.png",
                &path.to_string_lossy(),
            ],
        )
        .await?;
        Ok(())
    }
}
