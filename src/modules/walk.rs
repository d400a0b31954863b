use std::io::{self, Write};

use crate::host::TaskFolder;
use crate::modules::format::format_task;
use crate::modules::output::RecordWriter;
use crate::utils::Reporter;

/// Writes every task under `folder` depth-first: the folder's own tasks in
/// host order, then each subfolder in host order. Returns how many records
/// this branch wrote.
///
/// Hidden tasks are included. A folder whose tasks cannot be listed
/// contributes nothing, subfolders included. Only I/O errors on the output
/// abort the walk.
pub fn walk<W: Write>(
    folder: &dyn TaskFolder,
    path: &str,
    writer: &mut RecordWriter<W>,
    reporter: &Reporter,
) -> io::Result<usize> {
    let tasks = match folder.tasks(true) {
        Ok(tasks) => tasks,
        Err(err) => {
            reporter.warn(format!("Skipping folder {}: {}", path, err));
            return Ok(0);
        }
    };

    let mut count = 0;

    for task in tasks {
        match task {
            Ok(task) => {
                writer.push(&format_task(task.as_ref(), path, reporter))?;
                count += 1;
            }
            Err(err) => reporter.warn(format!("Skipping task in {}: {}", path, err)),
        }
    }

    let subfolders = match folder.subfolders() {
        Ok(subfolders) => subfolders,
        Err(err) => {
            reporter.warn(format!("Skipping subfolders of {}: {}", path, err));
            return Ok(count);
        }
    };

    for subfolder in subfolders {
        let subfolder = match subfolder {
            Ok(subfolder) => subfolder,
            Err(err) => {
                reporter.warn(format!("Skipping subfolder of {}: {}", path, err));
                continue;
            }
        };
        match subfolder.path() {
            Ok(sub_path) => count += walk(subfolder.as_ref(), &sub_path, writer, reporter)?,
            Err(err) => reporter.warn(format!("Skipping subfolder of {}: {}", path, err)),
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::snapshot::SnapshotService;
    use crate::host::TaskService;
    use serde_json::Value;

    fn walk_yaml(yaml: &str, root: &str) -> (usize, Value) {
        let service = SnapshotService::from_yaml(yaml).unwrap();
        let folder = service.folder(root).unwrap();
        let mut writer = RecordWriter::new(Vec::new(), false);
        let count = walk(folder.as_ref(), root, &mut writer, &Reporter::default()).unwrap();
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        (count, serde_json::from_str(&text).unwrap())
    }

    fn names(records: &Value) -> Vec<String> {
        records
            .as_array()
            .unwrap()
            .iter()
            .map(|r| {
                let path = r["TaskPath"].as_str().unwrap();
                match r["TaskName"].as_str() {
                    Some(name) => format!("{}|{}", path, name),
                    None => path.to_string(),
                }
            })
            .collect()
    }

    const TREE: &str = r#"
tasks:
  Zeta: {}
  Alpha: {}
folders:
  B:
    tasks:
      InB: {}
    folders:
      Deep:
        tasks:
          InDeep: {}
  A:
    tasks:
      InA: {}
"#;

    #[test]
    fn tasks_come_before_subfolders_in_host_order() {
        let (count, records) = walk_yaml(TREE, "\\");
        assert_eq!(count, 5);
        assert_eq!(
            names(&records),
            vec!["\\|Zeta", "\\|Alpha", "\\B|InB", "\\B\\Deep|InDeep", "\\A|InA"]
        );
    }

    #[test]
    fn walking_a_subfolder_stays_inside_it() {
        let (count, records) = walk_yaml(TREE, "\\B");
        assert_eq!(count, 2);
        assert_eq!(names(&records), vec!["\\B|InB", "\\B\\Deep|InDeep"]);
    }

    #[test]
    fn empty_tree_is_an_empty_array() {
        let (count, records) = walk_yaml("folders:\n  Empty: {}\n", "\\");
        assert_eq!(count, 0);
        assert_eq!(records, Value::Array(Vec::new()));
    }

    #[test]
    fn unlistable_tasks_drop_the_whole_branch() {
        let yaml = r#"
folders:
  Locked:
    unreadable: [Tasks]
    tasks:
      Secret: {}
    folders:
      Inner:
        tasks:
          AlsoSecret: {}
  Open:
    tasks:
      Visible: {}
"#;
        let (count, records) = walk_yaml(yaml, "\\");
        assert_eq!(count, 1);
        assert_eq!(names(&records), vec!["\\Open|Visible"]);
    }

    #[test]
    fn unlistable_subfolders_keep_own_tasks() {
        let yaml = r#"
tasks:
  Top: {}
unreadable: [Folders]
folders:
  Hidden:
    tasks:
      Below: {}
"#;
        let (_, records) = walk_yaml(yaml, "\\");
        assert_eq!(names(&records), vec!["\\|Top"]);
    }

    #[test]
    fn subfolder_without_path_is_skipped() {
        let yaml = r#"
folders:
  NoPath:
    unreadable: [Path]
    tasks:
      Lost: {}
  Fine:
    tasks:
      Found: {}
"#;
        let (_, records) = walk_yaml(yaml, "\\");
        assert_eq!(names(&records), vec!["\\Fine|Found"]);
    }

    #[test]
    fn hidden_tasks_are_walked_in_place() {
        let yaml = r#"
tasks:
  Before: {}
  Hidden: { hidden: true }
  After: {}
"#;
        let (count, records) = walk_yaml(yaml, "\\");
        assert_eq!(count, 3);
        assert_eq!(names(&records), vec!["\\|Before", "\\|Hidden", "\\|After"]);
    }

    #[test]
    fn uncountable_tasks_still_walk_subfolders() {
        let yaml = r#"
unreadable: [TaskCount]
tasks:
  Uncounted: {}
folders:
  Sub:
    tasks:
      Kept: {}
"#;
        let (count, records) = walk_yaml(yaml, "\\");
        assert_eq!(count, 1);
        assert_eq!(names(&records), vec!["\\Sub|Kept"]);
    }

    #[test]
    fn fallback_records_stay_in_order() {
        let yaml = r#"
tasks:
  First: {}
  Broken:
    unreadable: [NextRunTime]
  Last: {}
"#;
        let (count, records) = walk_yaml(yaml, "\\");
        assert_eq!(count, 3);
        assert_eq!(names(&records), vec!["\\|First", "\\", "\\|Last"]);
    }
}
