//! Dead-letter drain.
//!
//! The bus routes any message that exhausts its delivery budget to the DLQ
//! twin of its topic; this processor consumes all four twins and lands one
//! reviewable record per message in the quarantine area. The DLQ is
//! terminal: records are for operators, never for automatic replay.

pub mod processor;
pub mod record;

pub use processor::DlqProcessor;
pub use record::DeadLetterRecord;
