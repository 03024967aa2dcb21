//! Sheet service abstraction.
//!
//! This module provides a `SheetService` trait for reading and writing WR rows
//! on hosted sheets, with a Smartsheet backend.

mod smartsheet;
mod types;

pub use smartsheet::SmartsheetClient;
pub use types::*;
