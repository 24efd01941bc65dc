//! Data models for readings, tariffs, settings and coach chat

pub mod chat;
pub mod reading;
pub mod settings;
pub mod tariff;

pub use chat::{ChatMessage, ChatRole};
pub use reading::{Reading, ReadingId};
pub use settings::{Settings, Theme};
pub use tariff::{TariffError, TariffMode, TariffSchedule, TariffTier, FALLBACK_CURRENCY};
