//! Sheet capacity: classifying "sheet is full" failures and finding room.

mod classifier;
mod finder;

pub use classifier::{
    is_capacity_error, is_capacity_signal, CAPACITY_ERROR_CODES, CAPACITY_MESSAGE_PATTERNS,
};
pub use finder::{find_sheet_with_capacity, find_sheet_with_capacity_excluding, free_rows};
