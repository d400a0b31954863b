//! Read-only view over the task-scheduling service.
//!
//! The live service is reached through COM on Windows ([`connect_local`]);
//! a YAML snapshot of a task tree can stand in for it anywhere
//! ([`snapshot::load`]). Every accessor is a blocking request that may fail,
//! so each one returns a [`HostResult`].

use chrono::NaiveDateTime;
use serde::Deserialize;
use thiserror::Error;

pub mod snapshot;
#[cfg(windows)]
mod windows;

#[derive(Debug, Error)]
#[cfg_attr(not(windows), allow(dead_code))]
pub enum HostError {
    #[error("{call} failed with HRESULT {code:#010x}")]
    Call { call: &'static str, code: i32 },

    #[error("{call} returned no value")]
    Empty { call: &'static str },

    #[error("{0} is not readable")]
    Unreadable(String),

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("task {name} not found in {folder}")]
    TaskNotFound { folder: String, name: String },

    #[error("date value {0} is out of range")]
    DateOutOfRange(f64),

    #[error("failed to load snapshot {path}: {reason}")]
    Snapshot { path: String, reason: String },

    #[error("the task scheduler service is only available on Windows")]
    Unsupported,
}

pub type HostResult<T> = Result<T, HostError>;

/// A collection as the host returns it: the enumeration itself may fail,
/// and so may fetching any single item.
pub type Listing<T> = HostResult<Vec<HostResult<T>>>;

pub trait TaskService {
    /// Looks up a folder by its full path (`\` is the root).
    fn folder(&self, path: &str) -> HostResult<Box<dyn TaskFolder + '_>>;
}

pub trait TaskFolder {
    fn path(&self) -> HostResult<String>;

    /// Tasks directly in this folder in host order. Hidden tasks are listed
    /// only when `include_hidden` is set.
    fn tasks(&self, include_hidden: bool) -> Listing<Box<dyn RegisteredTask + '_>>;

    fn subfolders(&self) -> Listing<Box<dyn TaskFolder + '_>>;

    fn task(&self, name: &str) -> HostResult<Box<dyn RegisteredTask + '_>>;
}

pub trait RegisteredTask {
    fn name(&self) -> HostResult<String>;
    fn state(&self) -> HostResult<i32>;
    fn last_run_time(&self) -> HostResult<NaiveDateTime>;
    fn next_run_time(&self) -> HostResult<NaiveDateTime>;
    fn last_task_result(&self) -> HostResult<i32>;
    fn definition(&self) -> HostResult<Box<dyn TaskDefinition + '_>>;
}

pub trait TaskDefinition {
    /// `Ok(None)` when the registration info carries no description.
    fn description(&self) -> HostResult<Option<String>>;
    fn actions(&self) -> Listing<Action>;
    fn triggers(&self) -> Listing<Trigger>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Exec(ExecAction),
    /// Any non-exec action (COM handler, e-mail, message box).
    Other { kind: i32 },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExecAction {
    pub path: Option<String>,
    pub arguments: Option<String>,
    pub working_directory: Option<String>,
}

/// A trigger with every property the host could read. `None` means the
/// property was absent or its read failed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Trigger {
    pub start_boundary: Option<String>,
    pub enabled: Option<bool>,
    pub schedule: Option<Schedule>,
    pub repetition: Option<RepetitionPattern>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    Daily {
        days_interval: Option<i16>,
    },
    Weekly {
        weeks_interval: Option<i16>,
        days_of_week: Option<i16>,
    },
    Monthly {
        days_of_month: Option<i32>,
        months_of_year: Option<i16>,
        run_on_last_day_of_month: Option<bool>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepetitionPattern {
    pub interval: Option<String>,
    pub duration: Option<String>,
    pub stop_at_duration_end: Option<bool>,
}

/// Connects to the local task-scheduling service with the caller's
/// credentials.
pub fn connect_local() -> HostResult<Box<dyn TaskService>> {
    #[cfg(windows)]
    {
        Ok(Box::new(windows::ComTaskService::connect()?))
    }
    #[cfg(not(windows))]
    {
        Err(HostError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn live_service_is_unsupported_off_windows() {
        assert!(matches!(connect_local(), Err(HostError::Unsupported)));
    }

    #[test]
    fn actions_deserialize_by_type_tag() {
        let actions: Vec<Action> = serde_yaml::from_str(
            "- { type: exec, path: 'C:\\a.exe' }\n- { type: other, kind: 5 }\n",
        )
        .unwrap();
        assert_eq!(
            actions,
            vec![
                Action::Exec(ExecAction {
                    path: Some("C:\\a.exe".to_string()),
                    ..Default::default()
                }),
                Action::Other { kind: 5 },
            ]
        );
    }

    #[test]
    fn schedule_fields_default_to_absent() {
        let schedule: Schedule = serde_yaml::from_str("type: weekly\ndays_of_week: 42\n").unwrap();
        assert_eq!(
            schedule,
            Schedule::Weekly {
                weeks_interval: None,
                days_of_week: Some(42),
            }
        );
    }
}
