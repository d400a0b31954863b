pub const ROOT: &str = "\\";
const SEPARATOR: char = '\\';

/// What a command-line path refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Dump every task under this folder, recursively.
    Folder(String),
    /// Dump one task.
    Task { folder: String, name: String },
}

/// `\` or a path ending in `\` selects a folder, anything else a single task
/// split at its last separator.
pub fn resolve(arg: Option<&str>) -> Target {
    let path = match arg {
        Some(path) if !path.is_empty() => path,
        _ => return Target::Folder(ROOT.to_string()),
    };

    if let Some(stripped) = path.strip_suffix(SEPARATOR) {
        if stripped.is_empty() {
            return Target::Folder(ROOT.to_string());
        }
        return Target::Folder(stripped.to_string());
    }

    match path.rsplit_once(SEPARATOR) {
        Some((folder, name)) => Target::Task {
            folder: if folder.is_empty() {
                ROOT.to_string()
            } else {
                folder.to_string()
            },
            name: name.to_string(),
        },
        None => Target::Task {
            folder: ROOT.to_string(),
            name: path.to_string(),
        },
    }
}
