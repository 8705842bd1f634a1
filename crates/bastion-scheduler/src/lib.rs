//! `bastion-scheduler` — maintenance windows with SQLite persistence.
//!
//! # Overview
//!
//! A maintenance window is a [`Job`] plus the restrictions it governs: the
//! shared global maintenance marker and one whitelist rule per exempt
//! address. [`MaintenanceScheduler::schedule`] writes all of them in a single
//! transaction and then invalidates the effective-restriction cache.
//! [`WindowActivator`] flips the linked rules on and off as windows open and
//! close.
//!
//! # Tables
//!
//! | Table              | Owner                  | Notes                                  |
//! |--------------------|------------------------|----------------------------------------|
//! | `restrictions`     | `bastion-restrictions` | marker unique per category             |
//! | `jobs`             | [`jobs`]               | `start_at < finish_at` enforced        |
//! | `job_restrictions` | [`links`]              | one row per (job, restriction) pair    |

pub mod activation;
pub mod db;
pub mod error;
pub mod jobs;
pub mod links;
pub mod maintenance;
pub mod types;
pub mod validate;

pub use activation::{ActivationReport, WindowActivator};
pub use error::{FieldError, Result, SchedulerError, ValidationErrors};
pub use maintenance::MaintenanceScheduler;
pub use types::{Job, JobDetails, JobRestriction, JobType, ScheduleRequest, SupportedJobTypes};
pub use validate::ValidatedRequest;
