//! Job number formats, sequences and WR-to-job assignments.

mod assignment;
mod exclusion;
mod format;

pub use assignment::{Assignment, AssignmentBook, AssignmentSource};
pub use exclusion::ExclusionRules;
pub use format::{parse_job_number, JobFormat, JobSequence};
