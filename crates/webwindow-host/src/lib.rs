pub mod bridge;
pub mod config;
pub mod exports;
pub mod host;
pub mod runtime;

pub use bridge::{Ipc, IpcMessage, SubscriptionId};
pub use config::{ConfigError, HostConfig};
pub use host::{DefaultPlatform, HostError};
pub use runtime::{MessageHandler, MovedHandler, ResizedHandler, WebWindow};
