use crate::common::{
    ActionInfo, DailySchedule, HostText, MonthlySchedule, RepetitionInfo, TaskInfo, TaskRecord,
    Timestamp, TriggerInfo, WeeklySchedule,
};
use crate::host::{
    Action, HostResult, RegisteredTask, RepetitionPattern, Schedule, TaskDefinition, Trigger,
};
use crate::utils::Reporter;

/// Builds the output record for one task found in the folder at `path`.
///
/// The five required properties are all-or-nothing: if any of them cannot
/// be read the record shrinks to its `TaskPath`. Everything read from the
/// task definition afterwards is optional and dropped field by field.
pub fn format_task(task: &dyn RegisteredTask, path: &str, reporter: &Reporter) -> TaskRecord {
    let mut info = match read_required(task, path) {
        Ok(info) => info,
        Err(err) => {
            reporter.warn(format!("Task in {}: {}; writing path only", path, err));
            return TaskRecord::PathOnly {
                task_path: HostText::from(path),
            };
        }
    };

    match task.definition() {
        Ok(definition) => {
            let name = info.task_name.0.clone();
            info.description = description(definition.as_ref());
            info.actions = actions(definition.as_ref(), reporter, &name);
            info.triggers = triggers(definition.as_ref(), reporter, &name);
        }
        Err(err) => reporter.warn(format!(
            "Task {}: definition unavailable: {}",
            info.task_name.0, err
        )),
    }

    TaskRecord::Full(info)
}

fn read_required(task: &dyn RegisteredTask, path: &str) -> HostResult<TaskInfo> {
    Ok(TaskInfo {
        task_path: HostText::from(path),
        task_name: HostText(task.name()?),
        state: task.state()?,
        last_run_time: Timestamp(task.last_run_time()?),
        next_run_time: Timestamp(task.next_run_time()?),
        last_result: task.last_task_result()?,
        description: None,
        actions: Vec::new(),
        triggers: Vec::new(),
    })
}

fn description(definition: &dyn TaskDefinition) -> Option<HostText> {
    definition.description().ok().flatten().map(HostText)
}

fn actions(definition: &dyn TaskDefinition, reporter: &Reporter, task: &str) -> Vec<ActionInfo> {
    let actions = match definition.actions() {
        Ok(actions) => actions,
        Err(err) => {
            reporter.warn(format!("Task {}: actions unavailable: {}", task, err));
            return Vec::new();
        }
    };

    actions
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|action| match action {
            Action::Exec(exec) => Some(ActionInfo {
                command: exec.path.map(HostText),
                arguments: exec.arguments.map(HostText),
                working_directory: exec.working_directory.map(HostText),
            }),
            Action::Other { .. } => None,
        })
        .filter(|action| !action.is_empty())
        .collect()
}

fn triggers(definition: &dyn TaskDefinition, reporter: &Reporter, task: &str) -> Vec<TriggerInfo> {
    let triggers = match definition.triggers() {
        Ok(triggers) => triggers,
        Err(err) => {
            reporter.warn(format!("Task {}: triggers unavailable: {}", task, err));
            return Vec::new();
        }
    };

    triggers
        .into_iter()
        .filter_map(Result::ok)
        .map(trigger_info)
        .filter(|trigger| !trigger.is_empty())
        .collect()
}

fn trigger_info(trigger: Trigger) -> TriggerInfo {
    let mut info = TriggerInfo {
        start_boundary: trigger.start_boundary.map(HostText),
        enabled: trigger.enabled,
        repetition: trigger.repetition.and_then(repetition_info),
        ..Default::default()
    };

    match trigger.schedule {
        Some(Schedule::Daily { days_interval }) => {
            info.schedule_by_day =
                days_interval.map(|days_interval| DailySchedule { days_interval });
        }
        Some(Schedule::Weekly {
            weeks_interval,
            days_of_week,
        }) => {
            if weeks_interval.is_some() || days_of_week.is_some() {
                info.schedule_by_week = Some(WeeklySchedule {
                    weeks_interval,
                    days_of_week,
                });
            }
        }
        Some(Schedule::Monthly {
            days_of_month,
            months_of_year,
            run_on_last_day_of_month,
        }) => {
            let run_on_last_day_of_month = run_on_last_day_of_month.filter(|last| *last);
            if days_of_month.is_some()
                || months_of_year.is_some()
                || run_on_last_day_of_month.is_some()
            {
                info.schedule_by_month = Some(MonthlySchedule {
                    days: days_of_month,
                    months: months_of_year,
                    run_on_last_day_of_month,
                });
            }
        }
        None => {}
    }

    info
}

fn repetition_info(pattern: RepetitionPattern) -> Option<RepetitionInfo> {
    let info = RepetitionInfo {
        interval: pattern.interval.map(HostText),
        duration: pattern.duration.map(HostText),
        stop_at_duration_end: pattern.stop_at_duration_end.filter(|stop| *stop),
    };

    if info.interval.is_none() && info.duration.is_none() && info.stop_at_duration_end.is_none() {
        None
    } else {
        Some(info)
    }
}
