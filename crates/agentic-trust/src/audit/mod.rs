//! Tamper-evident audit ledger.

pub mod entry;
pub mod ledger;

pub use ledger::{import_json, import_jsonl, AuditLog, AuditQuery, AuditSummary, ExportFormat};
pub use entry::{AuditEntry, GENESIS_HASH};
