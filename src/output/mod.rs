//! Result output
//!
//! Console printing and file exports for finished result trees.

mod export;
mod junit;
mod text;

pub use export::{export_csv, load_result_xml, save_junit_xml, save_result_xml};
pub use junit::JunitReport;
pub use text::ResultPrinter;
