//! Task tree captured in a YAML file.
//!
//! A snapshot is a root folder: `tasks` and `folders` are maps keyed by name,
//! kept in file order, which is the order they are enumerated in. Any
//! property listed under `unreadable` fails when read, the way a task deleted
//! mid-enumeration or an access-denied folder fails on the live service.
//! Property names are checked when the file is loaded, so a misspelled one
//! is a load error rather than a silently readable property.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Deserialize;

use super::{
    Action, HostError, HostResult, Listing, RegisteredTask, TaskDefinition, TaskFolder,
    TaskService, Trigger,
};
use crate::utils;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotFolder {
    #[serde(default)]
    pub tasks: IndexMap<String, SnapshotTask>,
    #[serde(default)]
    pub folders: IndexMap<String, SnapshotFolder>,
    #[serde(default)]
    pub unreadable: Vec<FolderProperty>,
}

/// Folder reads that can be made to fail. `TaskCount` fails after the task
/// collection was obtained, which the live service treats as an empty folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FolderProperty {
    Path,
    Tasks,
    TaskCount,
    Folders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TaskProperty {
    Name,
    State,
    LastRunTime,
    NextRunTime,
    LastTaskResult,
    Definition,
    Description,
    Actions,
    Triggers,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotTask {
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub state: i32,
    #[serde(default = "never_run")]
    pub last_run_time: NaiveDateTime,
    #[serde(default = "never_run")]
    pub next_run_time: NaiveDateTime,
    #[serde(default)]
    pub last_result: i32,
    pub description: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub unreadable: Vec<TaskProperty>,
}

// The service reports the zero automation date for tasks that never ran.
fn never_run() -> NaiveDateTime {
    utils::ole_date_to_datetime(0.0).unwrap_or_default()
}

pub struct SnapshotService {
    root: SnapshotFolder,
}

impl SnapshotService {
    pub fn new(root: SnapshotFolder) -> Self {
        SnapshotService { root }
    }

    #[cfg(test)]
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        Ok(SnapshotService::new(serde_yaml::from_str(text)?))
    }
}

/// Reads a snapshot file.
pub fn load(path: &str) -> HostResult<SnapshotService> {
    utils::read_yaml::<SnapshotFolder>(path)
        .map(SnapshotService::new)
        .map_err(|err| HostError::Snapshot {
            path: path.to_string(),
            reason: err.to_string(),
        })
}

fn check<P>(unreadable: &[P], property: P) -> HostResult<()>
where
    P: PartialEq + std::fmt::Debug,
{
    if unreadable.contains(&property) {
        Err(HostError::Unreadable(format!("{:?}", property)))
    } else {
        Ok(())
    }
}

fn find<'a, T>(map: &'a IndexMap<String, T>, name: &str) -> Option<(&'a String, &'a T)> {
    map.iter().find(|(key, _)| key.eq_ignore_ascii_case(name))
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('\\') {
        format!("{}{}", parent, name)
    } else {
        format!("{}\\{}", parent, name)
    }
}

impl TaskService for SnapshotService {
    fn folder(&self, path: &str) -> HostResult<Box<dyn TaskFolder + '_>> {
        let mut current = &self.root;
        let mut canonical = String::from("\\");

        let relative = path.strip_prefix('\\').unwrap_or(path);
        if !relative.is_empty() {
            for segment in relative.split('\\') {
                let (name, folder) = find(&current.folders, segment)
                    .ok_or_else(|| HostError::FolderNotFound(path.to_string()))?;
                canonical = child_path(&canonical, name);
                current = folder;
            }
        }

        Ok(Box::new(SnapshotFolderRef {
            path: canonical,
            folder: current,
        }))
    }
}

struct SnapshotFolderRef<'a> {
    path: String,
    folder: &'a SnapshotFolder,
}

impl TaskFolder for SnapshotFolderRef<'_> {
    fn path(&self) -> HostResult<String> {
        check(&self.folder.unreadable, FolderProperty::Path)?;
        Ok(self.path.clone())
    }

    fn tasks(&self, include_hidden: bool) -> Listing<Box<dyn RegisteredTask + '_>> {
        check(&self.folder.unreadable, FolderProperty::Tasks)?;
        if check(&self.folder.unreadable, FolderProperty::TaskCount).is_err() {
            return Ok(Vec::new());
        }
        Ok(self
            .folder
            .tasks
            .iter()
            .filter(|(_, task)| include_hidden || !task.hidden)
            .map(|(name, task)| {
                Ok(Box::new(SnapshotTaskRef { name, task }) as Box<dyn RegisteredTask + '_>)
            })
            .collect())
    }

    fn subfolders(&self) -> Listing<Box<dyn TaskFolder + '_>> {
        check(&self.folder.unreadable, FolderProperty::Folders)?;
        Ok(self
            .folder
            .folders
            .iter()
            .map(|(name, folder)| {
                Ok(Box::new(SnapshotFolderRef {
                    path: child_path(&self.path, name),
                    folder,
                }) as Box<dyn TaskFolder + '_>)
            })
            .collect())
    }

    fn task(&self, name: &str) -> HostResult<Box<dyn RegisteredTask + '_>> {
        let (name, task) = find(&self.folder.tasks, name).ok_or_else(|| HostError::TaskNotFound {
            folder: self.path.clone(),
            name: name.to_string(),
        })?;
        Ok(Box::new(SnapshotTaskRef { name, task }))
    }
}

struct SnapshotTaskRef<'a> {
    name: &'a str,
    task: &'a SnapshotTask,
}

impl RegisteredTask for SnapshotTaskRef<'_> {
    fn name(&self) -> HostResult<String> {
        check(&self.task.unreadable, TaskProperty::Name)?;
        Ok(self.name.to_string())
    }

    fn state(&self) -> HostResult<i32> {
        check(&self.task.unreadable, TaskProperty::State)?;
        Ok(self.task.state)
    }

    fn last_run_time(&self) -> HostResult<NaiveDateTime> {
        check(&self.task.unreadable, TaskProperty::LastRunTime)?;
        Ok(self.task.last_run_time)
    }

    fn next_run_time(&self) -> HostResult<NaiveDateTime> {
        check(&self.task.unreadable, TaskProperty::NextRunTime)?;
        Ok(self.task.next_run_time)
    }

    fn last_task_result(&self) -> HostResult<i32> {
        check(&self.task.unreadable, TaskProperty::LastTaskResult)?;
        Ok(self.task.last_result)
    }

    fn definition(&self) -> HostResult<Box<dyn TaskDefinition + '_>> {
        check(&self.task.unreadable, TaskProperty::Definition)?;
        Ok(Box::new(SnapshotDefinition(self.task)))
    }
}

struct SnapshotDefinition<'a>(&'a SnapshotTask);

impl TaskDefinition for SnapshotDefinition<'_> {
    fn description(&self) -> HostResult<Option<String>> {
        check(&self.0.unreadable, TaskProperty::Description)?;
        Ok(self.0.description.clone())
    }

    fn actions(&self) -> Listing<Action> {
        check(&self.0.unreadable, TaskProperty::Actions)?;
        Ok(self.0.actions.iter().cloned().map(Ok).collect())
    }

    fn triggers(&self) -> Listing<Trigger> {
        check(&self.0.unreadable, TaskProperty::Triggers)?;
        Ok(self.0.triggers.iter().cloned().map(Ok).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = r#"
tasks:
  Root1: { state: 3 }
folders:
  Microsoft:
    folders:
      Windows:
        tasks:
          Defrag:
            state: 1
            unreadable: [State]
  Locked:
    unreadable: [Tasks]
"#;

    fn service() -> SnapshotService {
        SnapshotService::from_yaml(TREE).unwrap()
    }

    #[test]
    fn root_resolves_from_separator_or_empty_path() {
        let service = service();
        assert_eq!(service.folder("\\").unwrap().path().unwrap(), "\\");
        assert_eq!(service.folder("").unwrap().path().unwrap(), "\\");
    }

    #[test]
    fn folder_lookup_is_case_insensitive_and_canonical() {
        let service = service();
        let folder = service.folder("\\microsoft\\WINDOWS").unwrap();
        assert_eq!(folder.path().unwrap(), "\\Microsoft\\Windows");
    }

    #[test]
    fn missing_folder_is_an_error() {
        assert!(matches!(
            service().folder("\\Nope").err(),
            Some(HostError::FolderNotFound(_))
        ));
    }

    #[test]
    fn subfolders_carry_full_paths() {
        let service = service();
        let root = service.folder("\\").unwrap();
        let paths: Vec<String> = root
            .subfolders()
            .unwrap()
            .into_iter()
            .map(|folder| folder.unwrap().path().unwrap())
            .collect();
        assert_eq!(paths, vec!["\\Microsoft", "\\Locked"]);
    }

    #[test]
    fn unreadable_properties_fail() {
        let service = service();
        let folder = service.folder("\\Microsoft\\Windows").unwrap();
        let task = folder.task("defrag").unwrap();
        assert_eq!(task.name().unwrap(), "Defrag");
        assert!(matches!(task.state(), Err(HostError::Unreadable(_))));
        assert!(service.folder("\\Locked").unwrap().tasks(true).is_err());
    }

    #[test]
    fn hidden_tasks_are_listed_only_on_request() {
        let service = SnapshotService::from_yaml(
            "tasks:\n  Shown: {}\n  Secret: { hidden: true }\n  Also: {}\n",
        )
        .unwrap();
        let root = service.folder("\\").unwrap();
        let listed = |include_hidden| -> Vec<String> {
            root.tasks(include_hidden)
                .unwrap()
                .into_iter()
                .map(|task| task.unwrap().name().unwrap())
                .collect()
        };
        assert_eq!(listed(true), vec!["Shown", "Secret", "Also"]);
        assert_eq!(listed(false), vec!["Shown", "Also"]);
    }

    #[test]
    fn uncountable_task_collection_is_empty() {
        let service =
            SnapshotService::from_yaml("unreadable: [TaskCount]\ntasks:\n  Gone: {}\n").unwrap();
        let root = service.folder("\\").unwrap();
        assert!(root.tasks(true).unwrap().is_empty());
    }

    #[test]
    fn misspelled_unreadable_property_fails_to_load() {
        let task = SnapshotService::from_yaml("tasks:\n  Foo:\n    unreadable: [LastRuntime]\n");
        assert!(task.is_err());
        let folder = SnapshotService::from_yaml("unreadable: [tasks]\n");
        assert!(folder.is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("typo.yml");
        std::fs::write(&file, "tasks:\n  Foo:\n    unreadable: [NextRuntime]\n").unwrap();
        assert!(matches!(
            load(file.to_str().unwrap()).err(),
            Some(HostError::Snapshot { .. })
        ));
    }

    #[test]
    fn never_run_tasks_report_the_zero_date() {
        let service = service();
        let root = service.folder("\\").unwrap();
        let task = root.task("Root1").unwrap();
        assert_eq!(
            utils::format_timestamp(&task.last_run_time().unwrap()),
            "1899/12/30 00:00:00"
        );
    }

    #[test]
    fn load_reports_missing_files() {
        assert!(matches!(
            load("does-not-exist.yml").err(),
            Some(HostError::Snapshot { .. })
        ));
    }
}
