use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EngineError;

/// Foreground application identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppInfo {
    pub package: String,
    pub activity: String,
}

/// Device primitive interface.
///
/// All effects the engine produces go through this trait; the dispatcher
/// and resolver never reach a device through ambient globals. Operations
/// are synchronous from the caller's point of view and fail with a
/// transient-vs-fatal distinguishable [`EngineError`].
#[async_trait]
pub trait DeviceOps: Send + Sync {
    /// Tap at absolute screen coordinates.
    async fn click(&self, x: i32, y: i32) -> Result<(), EngineError>;

    /// Press and hold at absolute screen coordinates.
    async fn long_press(&self, x: i32, y: i32, duration: Duration) -> Result<(), EngineError>;

    /// Gesture from (x1, y1) to (x2, y2) over `duration`.
    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration: Duration,
    ) -> Result<(), EngineError>;

    /// Type text at the current focus.
    async fn set_text(&self, text: &str) -> Result<(), EngineError>;

    /// Press a named key (e.g. "BACK", "HOME", "DEL", "ENTER").
    async fn press_key(&self, key: &str) -> Result<(), EngineError>;

    /// Capture the current UI hierarchy as markup text.
    async fn dump_hierarchy(&self) -> Result<String, EngineError>;

    /// Screen dimensions in pixels, (width, height).
    async fn screen_size(&self) -> Result<(u32, u32), EngineError>;

    /// Package and activity of the foreground app.
    async fn current_app(&self) -> Result<AppInfo, EngineError>;

    /// Launch an installed application by package id.
    async fn launch_app(&self, package: &str) -> Result<(), EngineError>;

    /// Save a screenshot to a local path.
    async fn screenshot(&self, path: &Path) -> Result<(), EngineError>;
}
