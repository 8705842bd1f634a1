use bastion_core::{JobId, RestrictionId};
use bastion_restrictions::{Category, Restriction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Kinds of job the scheduler knows how to create.
///
/// Adding a variant here forces every `match` on it (marker category,
/// parsing, display) to be updated; which kinds are actually accepted is
/// decided at runtime by [`SupportedJobTypes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Restrict the service to whitelisted callers between start and finish.
    Maintenance,
}

impl JobType {
    /// Category of the shared global restriction a job of this type governs.
    pub fn marker_category(self) -> Category {
        match self {
            JobType::Maintenance => Category::Maintenance,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "maintenance" => Ok(JobType::Maintenance),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

/// The job types accepted by [`crate::MaintenanceScheduler::schedule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedJobTypes(Vec<JobType>);

impl SupportedJobTypes {
    pub fn new(types: Vec<JobType>) -> Self {
        Self(types)
    }

    /// Build the set from configured names. Any unknown name is an
    /// `InvalidType` error so a typo in config fails at startup.
    pub fn from_names(names: &[String]) -> Result<Self> {
        names
            .iter()
            .map(|n| {
                n.parse::<JobType>()
                    .map_err(|_| SchedulerError::InvalidType { value: n.clone() })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Resolve a request's type name against the set.
    pub fn resolve(&self, name: &str) -> Result<JobType> {
        name.parse::<JobType>()
            .ok()
            .filter(|t| self.contains(*t))
            .ok_or_else(|| SchedulerError::InvalidType {
                value: name.to_string(),
            })
    }

    pub fn contains(&self, job_type: JobType) -> bool {
        self.0.contains(&job_type)
    }
}

impl Default for SupportedJobTypes {
    fn default() -> Self {
        Self(vec![JobType::Maintenance])
    }
}

/// Raw schedule request as received from the transport layer.
///
/// Field names follow the admin API: `type` and `whitelist_ip`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub start_at: String,
    pub finish_at: String,
    #[serde(default)]
    pub whitelist_ip: Vec<String>,
}

/// A persisted maintenance window. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub start_at: DateTime<Utc>,
    pub finish_at: DateTime<Utc>,
    /// ISO-8601 timestamp of job creation.
    pub created_at: String,
}

impl Job {
    /// True when `now` falls inside `[start_at, finish_at)`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.finish_at
    }
}

/// Link row: `job_id` governs `restriction_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRestriction {
    pub id: String,
    pub job_id: JobId,
    pub restriction_id: RestrictionId,
    pub created_at: String,
}

/// A job together with its link rows and every restriction it governs, both
/// in link order.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetails {
    pub job: Job,
    pub links: Vec<JobRestriction>,
    pub restrictions: Vec<Restriction>,
}
