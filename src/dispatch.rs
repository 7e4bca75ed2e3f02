//! Turns planned [`ActionDescriptor`]s into device effects.
//!
//! The dispatcher owns the capture loop: every resolution happens against a
//! fresh snapshot, and the snapshot's index never outlives one cycle. Only
//! an impossible capture surfaces as `Err`; everything behavioral (element
//! not found, gate refused, gesture rejected) is an `Outcome` with
//! `succeeded: false` so a run can report it instead of aborting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::action::{ActionDescriptor, ActionKind};
use crate::device::{AppInfo, DeviceOps};
use crate::error::EngineError;
use crate::hierarchy::{parse, Index, Node, ScrollAxis};
use crate::resolver::{resolve, Strategy};

/// Friendly-name to package mapping for OPEN. English and Chinese labels
/// both route to the stock packages.
const APP_PACKAGES: [(&str, &str); 12] = [
    ("settings", "com.android.settings"),
    ("设置", "com.android.settings"),
    ("messages", "com.android.mms"),
    ("短信", "com.android.mms"),
    ("phone", "com.android.dialer"),
    ("电话", "com.android.dialer"),
    ("camera", "com.android.camera"),
    ("相机", "com.android.camera"),
    ("gallery", "com.android.gallery"),
    ("图库", "com.android.gallery"),
    ("browser", "com.android.browser"),
    ("浏览器", "com.android.browser"),
];

/// Resource keys that identify a launcher workspace on common ROMs.
const HOME_WORKSPACE_KEYS: [&str; 2] = [
    "com.miui.home:id/workspace",
    "com.android.launcher3:id/workspace",
];

/// Result of one dispatched action.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub succeeded: bool,
    pub detail: String,
}

impl Outcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Outcome {
            succeeded: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Outcome {
            succeeded: false,
            detail: detail.into(),
        }
    }
}

/// Dispatcher tunables. Tests shrink the delays; production uses defaults.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Forward scroll attempts before giving up on a missing element.
    pub scroll_attempts: usize,
    /// Reverse scrolls used to restore position after a failed search.
    pub reverse_scrolls: usize,
    /// Pause after a gesture so the UI can settle.
    pub settle: Duration,
    /// WAIT re-capture interval.
    pub poll_interval: Duration,
    pub default_wait_timeout: Duration,
    /// When set, each capture's raw dump and a screenshot land here.
    pub data_dir: Option<PathBuf>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            scroll_attempts: 3,
            reverse_scrolls: 2,
            settle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            default_wait_timeout: Duration::from_secs(10),
            data_dir: None,
        }
    }
}

/// One observed device state: parsed tree plus the context around it.
pub struct Capture {
    pub root: Node,
    pub app: AppInfo,
    pub screen: (u32, u32),
}

/// A resolution copied out of its capture so the snapshot can be dropped
/// before the next device call.
#[derive(Debug, Clone)]
struct Found {
    center: (i32, i32),
    path: String,
    checkable: bool,
    editable: bool,
    promoted: bool,
}

pub struct Dispatcher<D: DeviceOps> {
    device: D,
    config: DispatchConfig,
    step: AtomicUsize,
}

impl<D: DeviceOps> Dispatcher<D> {
    pub fn new(device: D, config: DispatchConfig) -> Self {
        Dispatcher {
            device,
            config,
            step: AtomicUsize::new(0),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Snapshot the device: dump, parse, dimensions, foreground app.
    ///
    /// The foreground app and artifact persistence are best-effort; only a
    /// failed dump or an unparseable tree fails the capture.
    pub async fn capture(&self) -> Result<Capture, EngineError> {
        let xml = self.device.dump_hierarchy().await?;
        let root = parse(&xml)?;
        let screen = self.device.screen_size().await?;
        let app = match self.device.current_app().await {
            Ok(app) => app,
            Err(e) => {
                log::warn!("could not determine foreground app: {}", e);
                AppInfo::default()
            }
        };
        self.persist_artifacts(&xml).await;
        Ok(Capture { root, app, screen })
    }

    async fn persist_artifacts(&self, xml: &str) {
        let Some(dir) = &self.config.data_dir else {
            return;
        };
        let step = self.step.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = std::fs::create_dir_all(dir) {
            log::warn!("could not create data dir {}: {}", dir.display(), e);
            return;
        }
        let dump_path = dir.join(format!("step-{:03}.xml", step));
        if let Err(e) = std::fs::write(&dump_path, xml) {
            log::warn!("could not persist dump {}: {}", dump_path.display(), e);
        }
        let shot_path = dir.join(format!("step-{:03}.png", step));
        if let Err(e) = self.device.screenshot(&shot_path).await {
            log::warn!("could not persist screenshot: {}", e);
        }
    }

    /// Execute one action. `Err` means a capture was needed and impossible.
    pub async fn dispatch(&self, action: &ActionDescriptor) -> Result<Outcome, EngineError> {
        match &action.kind {
            ActionKind::Click => self.click_like(action, false).await,
            ActionKind::Check => self.click_like(action, true).await,
            ActionKind::Input => self.input(action).await,
            ActionKind::Swipe => self.swipe_action(action).await,
            ActionKind::Wait => self.wait_for(action).await,
            ActionKind::Back => Ok(self.key_outcome("BACK").await),
            ActionKind::Home => self.go_home().await,
            ActionKind::Open => self.open_app(action).await,
            ActionKind::Unknown(kind) => {
                Ok(Outcome::failed(format!("unsupported action '{}'", kind)))
            }
        }
    }

    /// Run a batch in order, stopping at the first failure.
    pub async fn dispatch_all(
        &self,
        actions: &[ActionDescriptor],
    ) -> Result<Vec<Outcome>, EngineError> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            println!("{} {}", "▶".green(), describe(action).cyan());
            let outcome = self.dispatch(action).await?;
            if outcome.succeeded {
                println!("  {} {}", "✓".green(), outcome.detail);
            } else {
                println!("  {} {}", "⚠".yellow(), outcome.detail.yellow());
            }
            let stop = !outcome.succeeded;
            outcomes.push(outcome);
            if stop {
                break;
            }
        }
        Ok(outcomes)
    }

    async fn key_outcome(&self, key: &str) -> Outcome {
        match self.device.press_key(key).await {
            Ok(()) => Outcome::ok(format!("pressed {}", key)),
            Err(e) => Outcome::failed(format!("key {} failed: {}", key, e)),
        }
    }

    /// Resolve a query, scrolling to reveal off-screen content when the
    /// first snapshot misses. After exhausting forward scrolls the screen
    /// is scrolled back (bounded) so later actions see familiar content.
    async fn find_with_scroll(&self, query: &str) -> Result<Option<Found>, EngineError> {
        let mut forward = 0usize;
        for attempt in 0..=self.config.scroll_attempts {
            let capture = self.capture().await?;
            let screen = capture.screen;
            let (hit, axis) = {
                let index = Index::build(&capture.root);
                let hit = resolve(query, Strategy::Auto, &index).map(|r| Found {
                    center: r.node.bounds.center(),
                    path: r.node.path.clone(),
                    checkable: r.node.checkable,
                    editable: r.node.editable,
                    promoted: r.promoted,
                });
                (hit, index.scroll_axis())
            };

            if hit.is_some() {
                return Ok(hit);
            }
            if attempt == self.config.scroll_attempts {
                for _ in 0..forward.min(self.config.reverse_scrolls) {
                    if let Err(e) = self.scroll_step(axis, screen, true).await {
                        log::warn!("restore scroll failed: {}", e);
                        break;
                    }
                    tokio::time::sleep(self.config.settle).await;
                }
                break;
            }
            log::debug!("'{}' not visible, scrolling ({:?})", query, axis);
            if let Err(e) = self.scroll_step(axis, screen, false).await {
                log::warn!("scroll failed, stopping search: {}", e);
                break;
            }
            forward += 1;
            tokio::time::sleep(self.config.settle).await;
        }
        Ok(None)
    }

    /// One scroll gesture over the middle of the screen on the given axis.
    async fn scroll_step(
        &self,
        axis: ScrollAxis,
        screen: (u32, u32),
        reverse: bool,
    ) -> Result<(), EngineError> {
        let (w, h) = (screen.0 as i32, screen.1 as i32);
        let (x1, y1, x2, y2) = match axis {
            ScrollAxis::Vertical => {
                let (from, to) = if reverse {
                    (h / 3, h * 2 / 3)
                } else {
                    (h * 2 / 3, h / 3)
                };
                (w / 2, from, w / 2, to)
            }
            ScrollAxis::Horizontal => {
                let (from, to) = if reverse {
                    (w / 4, w * 3 / 4)
                } else {
                    (w * 3 / 4, w / 4)
                };
                (from, h / 2, to, h / 2)
            }
        };
        self.device
            .swipe(x1, y1, x2, y2, Duration::from_millis(500))
            .await
    }

    async fn click_like(
        &self,
        action: &ActionDescriptor,
        require_checkable: bool,
    ) -> Result<Outcome, EngineError> {
        let Some(query) = action.target.as_deref() else {
            return Ok(Outcome::failed("action has no target"));
        };
        let Some(found) = self.find_with_scroll(query).await? else {
            return Ok(Outcome::failed(format!("'{}' not found on screen", query)));
        };
        if require_checkable && !found.checkable {
            return Ok(Outcome::failed(format!(
                "'{}' resolved to {} which is not checkable",
                query, found.path
            )));
        }
        let (x, y) = found.center;
        match self.device.click(x, y).await {
            Ok(()) => {
                tokio::time::sleep(self.config.settle).await;
                let via = if found.promoted {
                    " via clickable ancestor"
                } else {
                    ""
                };
                Ok(Outcome::ok(format!(
                    "tapped {} at ({}, {}){}",
                    found.path, x, y, via
                )))
            }
            Err(e) => Ok(Outcome::failed(format!("tap failed: {}", e))),
        }
    }

    async fn input(&self, action: &ActionDescriptor) -> Result<Outcome, EngineError> {
        let Some(query) = action.target.as_deref() else {
            return Ok(Outcome::failed("INPUT has no target"));
        };
        let Some(text) = action.param_str("text") else {
            return Ok(Outcome::failed("INPUT has no text parameter"));
        };
        let Some(found) = self.find_with_scroll(query).await? else {
            return Ok(Outcome::failed(format!("'{}' not found on screen", query)));
        };
        if !found.editable {
            return Ok(Outcome::failed(format!(
                "'{}' resolved to {} which is not editable",
                query, found.path
            )));
        }

        let (x, y) = found.center;
        if let Err(e) = self.device.click(x, y).await {
            return Ok(Outcome::failed(format!("focus tap failed: {}", e)));
        }
        tokio::time::sleep(self.config.settle).await;

        // Clear existing content: select all (when the affordance shows),
        // then delete. Both are best-effort; typing proceeds regardless.
        if let Err(e) = self.device.long_press(x, y, Duration::from_secs(1)).await {
            log::warn!("long press for select-all failed: {}", e);
        } else {
            tokio::time::sleep(self.config.settle).await;
            self.tap_select_all().await;
        }
        if let Err(e) = self.device.press_key("DEL").await {
            log::warn!("clearing field failed: {}", e);
        }

        match self.device.set_text(text).await {
            Ok(()) => Ok(Outcome::ok(format!("typed \"{}\" into {}", text, found.path))),
            Err(e) => Ok(Outcome::failed(format!("typing failed: {}", e))),
        }
    }

    /// Tap the select-all affordance if one is visible right now.
    async fn tap_select_all(&self) {
        let Ok(capture) = self.capture().await else {
            return;
        };
        let center = {
            let index = Index::build(&capture.root);
            ["Select all", "全选"]
                .iter()
                .find_map(|label| resolve(label, Strategy::Text, &index))
                .map(|r| r.node.bounds.center())
        };
        if let Some((x, y)) = center {
            if let Err(e) = self.device.click(x, y).await {
                log::warn!("select-all tap failed: {}", e);
            }
            tokio::time::sleep(self.config.settle).await;
        }
    }

    async fn swipe_action(&self, action: &ActionDescriptor) -> Result<Outcome, EngineError> {
        let direction = action.param_str("direction").unwrap_or("up");
        let (w, h) = {
            let size = self.device.screen_size().await?;
            (size.0 as i32, size.1 as i32)
        };
        let (cx, cy) = (w / 2, h / 2);
        let (x1, y1, x2, y2) = match direction.to_lowercase().as_str() {
            "up" => (cx, h * 7 / 10, cx, h * 3 / 10),
            "down" => (cx, h * 3 / 10, cx, h * 7 / 10),
            "left" => (w * 7 / 10, cy, w * 3 / 10, cy),
            "right" => (w * 3 / 10, cy, w * 7 / 10, cy),
            other => {
                return Ok(Outcome::failed(format!("unknown swipe direction '{}'", other)));
            }
        };
        match self
            .device
            .swipe(x1, y1, x2, y2, Duration::from_millis(500))
            .await
        {
            Ok(()) => {
                tokio::time::sleep(self.config.settle).await;
                Ok(Outcome::ok(format!("swiped {}", direction)))
            }
            Err(e) => Ok(Outcome::failed(format!("swipe failed: {}", e))),
        }
    }

    async fn wait_for(&self, action: &ActionDescriptor) -> Result<Outcome, EngineError> {
        let Some(query) = action.target.as_deref() else {
            return Ok(Outcome::failed("WAIT has no target"));
        };
        let timeout = action
            .param_u64("timeout")
            .or_else(|| action.param_u64("timeoutSeconds"))
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_wait_timeout);
        let deadline = Instant::now() + timeout;

        loop {
            // A flaky capture during a wait is just a miss for this poll.
            match self.capture().await {
                Ok(capture) => {
                    let hit = {
                        let index = Index::build(&capture.root);
                        resolve(query, Strategy::Auto, &index).map(|r| r.node.path.clone())
                    };
                    if let Some(path) = hit {
                        return Ok(Outcome::ok(format!("'{}' appeared at {}", query, path)));
                    }
                }
                Err(e) => log::debug!("capture failed while waiting: {}", e),
            }
            if Instant::now() >= deadline {
                return Ok(Outcome::failed(format!(
                    "'{}' did not appear within {:?}",
                    query, timeout
                )));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Return to the launcher. ROMs disagree on what the HOME key does, so
    /// each rung of the ladder is verified before escalating to gesture
    /// navigation swipes.
    async fn go_home(&self) -> Result<Outcome, EngineError> {
        if let Err(e) = self.device.press_key("HOME").await {
            return Ok(Outcome::failed(format!("home key failed: {}", e)));
        }
        tokio::time::sleep(self.config.settle).await;
        if self.at_home().await? {
            return Ok(Outcome::ok("reached home screen via home key"));
        }

        let (w, h) = {
            let size = self.device.screen_size().await?;
            (size.0 as i32, size.1 as i32)
        };
        // gesture navigation: short swipe up from the bottom edge
        let gestures = [
            (h - 10, h / 2, Duration::from_millis(300), "edge swipe"),
            (h - 10, h / 5, Duration::from_millis(800), "long edge swipe"),
        ];
        for (from_y, to_y, duration, name) in gestures {
            if let Err(e) = self.device.swipe(w / 2, from_y, w / 2, to_y, duration).await {
                log::warn!("{} failed: {}", name, e);
                continue;
            }
            tokio::time::sleep(self.config.settle).await;
            if self.at_home().await? {
                return Ok(Outcome::ok(format!("reached home screen via {}", name)));
            }
        }
        Ok(Outcome::failed("could not verify home screen"))
    }

    async fn at_home(&self) -> Result<bool, EngineError> {
        let capture = self.capture().await?;
        let package = capture.app.package.to_lowercase();
        if package.contains("launcher") || package.ends_with(".home") {
            return Ok(true);
        }
        let index = Index::build(&capture.root);
        let workspace = HOME_WORKSPACE_KEYS
            .iter()
            .any(|key| index.by_resource_key.contains_key(*key));
        Ok(workspace || index.by_accessibility_label.contains_key("Home screen"))
    }

    async fn open_app(&self, action: &ActionDescriptor) -> Result<Outcome, EngineError> {
        let Some(target) = action.target.as_deref() else {
            return Ok(Outcome::failed("OPEN has no target"));
        };
        let wanted = target.trim().to_lowercase();
        let package = APP_PACKAGES
            .iter()
            .find(|(name, _)| name.to_lowercase() == wanted)
            .map(|(_, package)| *package);

        if let Some(package) = package {
            return match self.device.launch_app(package).await {
                Ok(()) => {
                    tokio::time::sleep(self.config.settle).await;
                    Ok(Outcome::ok(format!("launched {}", package)))
                }
                Err(e) => Ok(Outcome::failed(format!("launch {} failed: {}", package, e))),
            };
        }

        // Unmapped name: fall back to tapping a matching launcher icon.
        log::debug!("no package mapping for '{}', trying on-screen tap", target);
        self.click_like(action, false).await
    }
}

fn describe(action: &ActionDescriptor) -> String {
    match &action.target {
        Some(target) => format!("{} {}", action.kind, target),
        None => action.kind.to_string(),
    }
}
