//! # concierge-core
//!
//! Presence tracking and topic relay for the concierge.
//!
//! This crate provides the stateful part of the service:
//!
//! - **Clock** - Injectable time source
//! - **Presence** - Last-seen registry with a sliding recency window
//! - **Status** - The relay's own connection status
//! - **Router** - Classifies topics into control, system and game data
//! - **Relay** - Ties the above together and decides what to publish
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Bus events │────▶│ RelayEngine │────▶│ BusCommands │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                       │         │
//!                       ▼         ▼
//!              ┌──────────┐   ┌──────────┐
//!              │  Router  │   │  State   │ status + presence
//!              └──────────┘   └──────────┘
//! ```

pub mod clock;
pub mod presence;
pub mod relay;
pub mod router;
pub mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use presence::{PresenceRegistry, DEFAULT_RECENCY_WINDOW};
pub use relay::{BusCommand, Disposition, DropReason, Outcome, RelayConfig, RelayEngine};
pub use router::{ControlAction, DataKind, Route, TopicRouter};
pub use status::StatusTracker;
