//! meterwise-types - Shared data types for meterwise
//!
//! This crate contains pure data structures without heavy dependencies.
//! No tokio, no async runtime - just serde-serializable types.
//!
//! Used by:
//! - meterwise-core (forecasting engine, store, collaborators)
//! - meterwise (CLI)

pub mod models;

pub use models::{
    ChatMessage, ChatRole, Reading, ReadingId, Settings, TariffError, TariffMode, TariffSchedule,
    TariffTier, Theme, FALLBACK_CURRENCY,
};
