use clap::{Arg, ArgAction, Command as ClapCommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::exit;

mod common;
mod host;
mod modules;
mod utils;

use host::snapshot;
use host::{HostResult, TaskService};
use modules::format::format_task;
use modules::output::RecordWriter;
use modules::resolve::{resolve, Target};
use modules::walk::walk;
use utils::Reporter;

fn open_service(snapshot_file: Option<&str>) -> HostResult<Box<dyn TaskService>> {
    match snapshot_file {
        Some(file) => Ok(Box::new(snapshot::load(file)?)),
        None => host::connect_local(),
    }
}

/// Writes the records `target` selects. A folder or task that cannot be
/// found writes nothing, which leaves `[]` once the writer is finished.
fn dump<W: Write>(
    service: &dyn TaskService,
    target: &Target,
    writer: &mut RecordWriter<W>,
    reporter: &Reporter,
) -> io::Result<()> {
    match target {
        Target::Folder(path) => match service.folder(path) {
            Ok(folder) => {
                walk(folder.as_ref(), path, writer, reporter)?;
            }
            Err(err) => reporter.warn(err),
        },
        Target::Task { folder, name } => {
            let parent = match service.folder(folder) {
                Ok(parent) => parent,
                Err(err) => {
                    reporter.warn(err);
                    return Ok(());
                }
            };
            let task = parent.task(name);
            match task {
                Ok(task) => writer.push(&format_task(task.as_ref(), folder, reporter))?,
                Err(err) => reporter.warn(err),
            }
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = ClapCommand::new("tasksched-json")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Dumps scheduled tasks as JSON")
        .arg(
            Arg::new("path")
                .help("Folder (ending in \\) or task to dump; defaults to the root folder")
                .index(1),
        )
        .arg(
            Arg::new("snapshot")
                .long("snapshot")
                .value_name("FILE")
                .help("Read tasks from a YAML snapshot instead of the task scheduler")
                .num_args(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the JSON to FILE instead of stdout")
                .num_args(1),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .help("Pretty-print each task record")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Report skipped folders and unreadable tasks on stderr")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let reporter = Reporter::new(matches.get_flag("verbose"));
    let target = resolve(matches.get_one::<String>("path").map(|s| s.as_str()));
    let snapshot_file = matches.get_one::<String>("snapshot").map(|s| s.as_str());

    let service = open_service(snapshot_file).unwrap_or_else(|err| {
        reporter.error(format!("Cannot read scheduled tasks: {}", err));
        exit(1);
    });

    let out: Box<dyn Write> = match matches.get_one::<String>("output") {
        Some(file) => Box::new(BufWriter::new(File::create(file)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut writer = RecordWriter::new(out, matches.get_flag("pretty"));
    dump(service.as_ref(), &target, &mut writer, &reporter)?;
    reporter.info(format!("{} task records written", writer.count()));
    writer.finish()?;

    Ok(())
}
