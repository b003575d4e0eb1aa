//! # Record Verifier
//!
//! Compares what the API returned with what the database holds, and what
//! an update changed with what it should have left alone. Every check
//! collects all discrepancies and fails once with the full list.

pub mod checks;
pub mod compare;
pub mod postgres;
pub mod query;
pub mod records;
pub mod source;
pub mod update;

pub use checks::{find_key_deep, verify_active_window, verify_field};
pub use compare::{compare_record, is_date_field, local_date, METADATA_FIELDS};
pub use postgres::PgRecordSource;
pub use query::normalize_query_params;
pub use records::{verify_deleted, verify_records, verify_single, VerifyRequest, MAX_SAMPLE_IDS};
pub use source::{MemoryRecordSource, Record, RecordSource};
pub use update::{verify_timestamps, verify_unchanged_fields, verify_updated_fields};
