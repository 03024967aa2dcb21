use std::collections::BTreeMap;

use tracing::info;

use super::JobSequence;

/// Where an assignment's job number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentSource {
    /// Already in the persisted map.
    Persisted,
    /// Found on a sheet of the chain and recorded for the first time.
    Adopted,
    /// Newly issued by the sequence.
    Issued,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub job_number: String,
    pub source: AssignmentSource,
}

/// WR number to job number map. Entries are never changed once written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentBook {
    assignments: BTreeMap<String, String>,
}

impl AssignmentBook {
    pub fn new(assignments: BTreeMap<String, String>) -> Self {
        Self { assignments }
    }

    pub fn get(&self, wr_number: &str) -> Option<&str> {
        self.assignments.get(wr_number).map(String::as_str)
    }

    /// Resolve the job number for a WR number, recording it when new.
    ///
    /// Order of precedence: the persisted map, then a job number already
    /// present on a sheet of the chain, then a freshly issued number.
    pub fn resolve(
        &mut self,
        wr_number: &str,
        dept: &str,
        found_in_chain: Option<&str>,
        sequence: &mut JobSequence,
    ) -> Assignment {
        if let Some(job) = self.assignments.get(wr_number) {
            return Assignment {
                job_number: job.clone(),
                source: AssignmentSource::Persisted,
            };
        }

        let (job_number, source) = match found_in_chain {
            Some(job) => (job.to_string(), AssignmentSource::Adopted),
            None => {
                let job = sequence.issue(dept);
                info!(wr_number = %wr_number, dept = %dept, job_number = %job, "Assigned new job number");
                (job, AssignmentSource::Issued)
            }
        };
        self.assignments
            .insert(wr_number.to_string(), job_number.clone());
        Assignment { job_number, source }
    }

    /// Every `(wr_number, job_number)` pair, ordered by WR number.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(wr, job)| (wr.as_str(), job.as_str()))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.assignments.clone()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
