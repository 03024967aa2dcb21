//! Job-number formats and the per-department sequence that issues them.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, info};

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)$").unwrap());
static DEPT_NUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^-]+)-(\d+)$").unwrap());
static PREFIX_DEPT_NUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^-]+)-([^-]+)-(\d+)$").unwrap());

const DEFAULT_WIDTH: usize = 3;

/// Shape of the job numbers written to sheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFormat {
    /// `DEPT-001`
    DeptPadded { width: usize },
    /// `DEPT-1`
    DeptPlain,
    /// `PREFIX-DEPT-001`
    Prefixed { prefix: String, width: usize },
    /// `001`, one sequence shared by every department.
    Numeric { width: usize },
}

impl Default for JobFormat {
    fn default() -> Self {
        JobFormat::DeptPadded {
            width: DEFAULT_WIDTH,
        }
    }
}

impl fmt::Display for JobFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobFormat::DeptPadded { width } => write!(f, "DEPT-{}", "#".repeat(*width)),
            JobFormat::DeptPlain => write!(f, "DEPT-N"),
            JobFormat::Prefixed { prefix, width } => {
                write!(f, "{}-DEPT-{}", prefix, "#".repeat(*width))
            }
            JobFormat::Numeric { width } => write!(f, "{}", "#".repeat(*width)),
        }
    }
}

impl JobFormat {
    /// Infer the format from the first existing job number with a known shape.
    ///
    /// Each sample pairs a job number with the department of the row it was
    /// written for, when known. Samples with a department are tried first so
    /// hyphenated departments are not mistaken for a prefix.
    pub fn detect<'a, I>(existing: I) -> Self
    where
        I: IntoIterator<Item = (Option<&'a str>, &'a str)>,
    {
        let mut samples: Vec<(Option<&str>, &str)> = existing.into_iter().collect();
        samples.sort_by_key(|(dept, _)| dept.is_none());

        for (dept, job) in samples {
            let job = job.trim();
            if let Some((prefix, digits)) = dept.and_then(|d| split_for_dept(job, d)) {
                return match prefix {
                    Some(prefix) => JobFormat::Prefixed {
                        prefix: prefix.to_string(),
                        width: digits.len().max(DEFAULT_WIDTH),
                    },
                    None => Self::dept_format(digits.len()),
                };
            }
            if let Some(caps) = NUMERIC.captures(job) {
                return JobFormat::Numeric {
                    width: caps[1].len(),
                };
            }
            if let Some(caps) = DEPT_NUM.captures(job) {
                return Self::dept_format(caps[2].len());
            }
            if let Some(caps) = PREFIX_DEPT_NUM.captures(job) {
                return JobFormat::Prefixed {
                    prefix: caps[1].to_string(),
                    width: caps[3].len().max(DEFAULT_WIDTH),
                };
            }
            debug!(job = %job, "Job number has no recognized shape");
        }
        JobFormat::default()
    }

    fn dept_format(digits: usize) -> Self {
        if digits >= DEFAULT_WIDTH {
            JobFormat::DeptPadded { width: digits }
        } else {
            JobFormat::DeptPlain
        }
    }

    pub fn render(&self, dept: &str, counter: u32) -> String {
        match self {
            JobFormat::DeptPadded { width } => format!("{}-{:0width$}", dept, counter, width = *width),
            JobFormat::DeptPlain => format!("{}-{}", dept, counter),
            JobFormat::Prefixed { prefix, width } => {
                format!("{}-{}-{:0width$}", prefix, dept, counter, width = *width)
            }
            JobFormat::Numeric { width } => format!("{:0width$}", counter, width = *width),
        }
    }

    /// Sequence key for a department. Numeric formats share one sequence.
    fn sequence_key(&self, dept: &str) -> String {
        match self {
            JobFormat::Numeric { .. } => String::new(),
            _ => dept.trim().to_string(),
        }
    }
}

/// Split a job number into its sequence key and counter.
///
/// The trailing numeric segment is the counter; the segment before it is
/// the department. A bare number belongs to the shared sequence.
pub fn parse_job_number(job: &str) -> Option<(String, u32)> {
    let parts: Vec<&str> = job.trim().split('-').collect();
    let counter = parts.last()?.parse::<u32>().ok()?;
    let dept = if parts.len() >= 2 {
        parts[parts.len() - 2].to_string()
    } else {
        String::new()
    };
    Some((dept, counter))
}

/// Split a job number written for `dept` into its prefix, if any, and its
/// counter digits. None when the number does not embed that department.
fn split_for_dept<'a>(job: &'a str, dept: &str) -> Option<(Option<&'a str>, &'a str)> {
    let dept = dept.trim();
    let (head, digits) = job.trim().rsplit_once('-')?;
    if dept.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if head == dept {
        return Some((None, digits));
    }
    let prefix = head.strip_suffix(dept)?.strip_suffix('-')?;
    (!prefix.is_empty()).then_some((Some(prefix), digits))
}

/// Issues sequential job numbers per department.
#[derive(Debug, Clone)]
pub struct JobSequence {
    format: JobFormat,
    counters: HashMap<String, u32>,
    issued: usize,
}

impl JobSequence {
    pub fn new(format: JobFormat) -> Self {
        info!(format = %format, "Using job number format");
        Self {
            format,
            counters: HashMap::new(),
            issued: 0,
        }
    }

    /// Advance counters past an existing job number so it is never re-issued.
    ///
    /// With the row's department known, the counter is filed under it.
    /// Otherwise the department is read from the number itself.
    pub fn observe(&mut self, dept: Option<&str>, job: &str) {
        let known = dept.and_then(|d| {
            let (_, digits) = split_for_dept(job, d)?;
            Some((d.to_string(), digits.parse::<u32>().ok()?))
        });
        if let Some((dept, counter)) = known.or_else(|| parse_job_number(job)) {
            let key = self.format.sequence_key(&dept);
            let entry = self.counters.entry(key).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Issue the next job number for a department.
    pub fn issue(&mut self, dept: &str) -> String {
        let key = self.format.sequence_key(dept);
        let counter = self.counters.entry(key).or_insert(0);
        *counter += 1;
        self.issued += 1;
        self.format.render(dept.trim(), *counter)
    }

    /// How many numbers this sequence has issued.
    pub fn issued(&self) -> usize {
        self.issued
    }
}
