use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::DepartmentEntry;
use crate::domain::{DateWindow, SeedId};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "scheme", rename_all = "kebab-case")]
pub enum DepartmentScheme {
    /// `{code}-{related_collection}-web-{YYYYMM}-{seq:04}`
    CollectionSequence { code: String },
    /// `{prefix}-{seed_id}-{YYYY-MM}`
    SeedMonth { prefix: String },
}

/// The seed attributes a naming policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct NamingInput<'a> {
    pub seed_id: &'a SeedId,
    pub department: Option<&'a str>,
    pub related_collection: Option<&'a str>,
}

/// AIP id synthesis. New departments need only a config entry or a new implementation.
pub trait NamingPolicy {
    /// Whether seeds from this department belong to the institution at all.
    fn is_affiliated(&self, department: Option<&str>) -> bool;

    /// Key of the counter that numbers this seed, if its scheme is sequenced.
    fn sequence_key(&self, input: &NamingInput<'_>) -> Option<String>;

    fn aip_id(&self, input: &NamingInput<'_>, window: &DateWindow, sequence: u32)
    -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct DepartmentNamingPolicy {
    departments: Vec<DepartmentEntry>,
}

impl DepartmentNamingPolicy {
    pub fn new(departments: Vec<DepartmentEntry>) -> Self {
        Self { departments }
    }

    fn scheme(&self, department: Option<&str>) -> Option<&DepartmentScheme> {
        let department = department?.trim();
        self.departments
            .iter()
            .find(|entry| entry.name == department)
            .map(|entry| &entry.scheme)
    }
}

impl NamingPolicy for DepartmentNamingPolicy {
    fn is_affiliated(&self, department: Option<&str>) -> bool {
        self.scheme(department).is_some()
    }

    fn sequence_key(&self, input: &NamingInput<'_>) -> Option<String> {
        match self.scheme(input.department)? {
            DepartmentScheme::CollectionSequence { code } => {
                let collection = non_blank(input.related_collection)?;
                Some(format!("{code}-{collection}"))
            }
            DepartmentScheme::SeedMonth { .. } => None,
        }
    }

    fn aip_id(
        &self,
        input: &NamingInput<'_>,
        window: &DateWindow,
        sequence: u32,
    ) -> Option<String> {
        let (year, month) = window.year_month();
        match self.scheme(input.department)? {
            DepartmentScheme::CollectionSequence { code } => {
                let collection = non_blank(input.related_collection)?;
                Some(format!(
                    "{code}-{collection}-web-{year}{month:02}-{sequence:04}"
                ))
            }
            DepartmentScheme::SeedMonth { prefix } => {
                Some(format!("{prefix}-{}-{year}-{month:02}", input.seed_id))
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Numbers seeds in the given order and returns one AIP id (or `None`) per input.
/// Callers pass seeds in inventory order so that re-derivation is deterministic.
pub fn assign_aip_ids(
    policy: &dyn NamingPolicy,
    window: &DateWindow,
    inputs: &[NamingInput<'_>],
) -> Vec<Option<String>> {
    let mut counters: HashMap<String, u32> = HashMap::new();
    inputs
        .iter()
        .map(|input| {
            let sequence = match policy.sequence_key(input) {
                Some(key) => {
                    let counter = counters.entry(key).or_insert(0);
                    *counter += 1;
                    *counter
                }
                None => 1,
            };
            policy.aip_id(input, window, sequence)
        })
        .collect()
}
