//! BusTrack core: live location publish/subscribe
//!
//! A driver's fixes flow through a [`Publisher`] into the [`LocationStore`],
//! one last-writer-wins channel per share key. Riders [`Subscriber::track`] a
//! key and get a [`PathView`] holding the driver's current position and the
//! path observed so far. The [`SessionGuard`] keeps the driver's share alive
//! across process restarts.

pub mod config;
pub mod core_channel;
pub mod core_model;
pub mod core_publish;
pub mod core_session;
pub mod core_track;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_channel::{AccessPolicy, LocationStore, OpenAccess, Subscription};
pub use core_model::{ChannelKey, Position};
pub use core_publish::{FixOptions, FixSource, PublishHandle, Publisher, SimulatedFixSource};
pub use core_session::{FileSessionGuard, MemorySessionGuard, Session, SessionGuard};
pub use core_track::{PathState, PathView, Subscriber};
pub use error::{TrackError, TrackResult};
pub use logging::{init_logging, LogLevel};
