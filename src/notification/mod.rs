//! Turning routed frames into host notifications.

mod dispatcher;

pub use dispatcher::{
    notification, DispatchOutcome, DispatcherStats, DispatcherStatsSnapshot, EventDispatcher,
};
