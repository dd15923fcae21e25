pub mod notifier;
pub mod schedule;
pub mod service;
pub mod types;

mod presence_loop;

pub use presence_loop::{LoopConfig, PresenceLoop};
pub use types::{
    Notifier, NotifierUrl, PresenceEvent, PresenceService, PresenceStatus, ServiceTimeouts,
    UserActiveData,
};
