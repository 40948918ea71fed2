pub mod execution_report;

pub use execution_report::{ReportRetry, consume_execution_reports, handle_report};
