//! meterwise-core - Core library for meterwise
//!
//! Provides the usage forecasting engine, tariff billing, the reading
//! store, export, and the AI coach / OCR collaborators.

pub mod analytics;
pub mod coach;
pub mod error;
pub mod event;
pub mod export;
pub mod ocr;
pub mod store;
pub mod tariff;

pub use analytics::{Alert, AlertLevel, BudgetStatus, MonthWindow, UsageReport};
pub use coach::{build_prompt, CoachClient, CoachSummary};
pub use error::{CoreError, DegradedState, LoadReport};
pub use event::{DataEvent, EventBus};
pub use export::{export_readings_to_csv, export_readings_to_json, export_report_to_json};
pub use ocr::{extract_meter_value, parse_bill_text, BillFields, MeterCandidate, OcrClient};
pub use store::ReadingStore;
pub use tariff::{compute_bill, Bill};
