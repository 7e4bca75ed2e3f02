pub mod action;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod hierarchy;
pub mod planner;
pub mod resolver;
pub mod retry;

// Re-export common items
pub use action::{ActionDescriptor, ActionKind};
pub use device::{list_devices, AndroidDevice, DeviceOps};
pub use dispatch::{DispatchConfig, Dispatcher, Outcome};
pub use error::EngineError;
pub use hierarchy::{parse, Index, Node};
pub use resolver::{resolve, Strategy};
