use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::utils;

/// Text read from the host. Line breaks of any style serialize as `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostText(pub String);

impl Serialize for HostText {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&utils::normalize_line_breaks(&self.0))
    }
}

impl From<String> for HostText {
    fn from(text: String) -> Self {
        HostText(text)
    }
}

impl From<&str> for HostText {
    fn from(text: &str) -> Self {
        HostText(text.to_string())
    }
}

/// Serializes as `YYYY/MM/DD HH:MM:SS`, no time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(pub NaiveDateTime);

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&utils::format_timestamp(&self.0))
    }
}

/// One element of the output array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskRecord {
    Full(TaskInfo),
    /// Written when any required property of the task could not be read.
    PathOnly {
        #[serde(rename = "TaskPath")]
        task_path: HostText,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskInfo {
    pub task_path: HostText,
    pub task_name: HostText,
    pub state: i32,
    pub last_run_time: Timestamp,
    pub next_run_time: Timestamp,
    pub last_result: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<HostText>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<TriggerInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<HostText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HostText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<HostText>,
}

impl ActionInfo {
    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.arguments.is_none() && self.working_directory.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_boundary: Option<HostText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_by_day: Option<DailySchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_by_week: Option<WeeklySchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_by_month: Option<MonthlySchedule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition: Option<RepetitionInfo>,
}

impl TriggerInfo {
    pub fn is_empty(&self) -> bool {
        self.start_boundary.is_none()
            && self.enabled.is_none()
            && self.schedule_by_day.is_none()
            && self.schedule_by_week.is_none()
            && self.schedule_by_month.is_none()
            && self.repetition.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DailySchedule {
    pub days_interval: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct WeeklySchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weeks_interval: Option<i16>,
    /// Raw bitmask, bit 0 is Sunday.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<i16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonthlySchedule {
    /// Raw bitmask, bit 0 is the first of the month.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months: Option<i16>,
    // Only ever written as `true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_on_last_day_of_month: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepetitionInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<HostText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<HostText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_at_duration_end: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string(value).unwrap()
    }

    #[test]
    fn host_text_escapes_backslashes_and_quotes() {
        assert_eq!(to_json(&HostText::from(r#"C:\a "b""#)), r#""C:\\a \"b\"""#);
    }

    #[test]
    fn host_text_line_breaks_become_backslash_n() {
        assert_eq!(to_json(&HostText::from("a\r\nb")), r#""a\nb""#);
        assert_eq!(to_json(&HostText::from("a\rb")), r#""a\nb""#);
        assert_eq!(to_json(&HostText::from("a\nb")), r#""a\nb""#);
    }

    #[test]
    fn host_text_round_trips_through_json() {
        let original = "say \"hi\"\\there\r\nbye";
        let decoded: String = serde_json::from_str(&to_json(&HostText::from(original))).unwrap();
        assert_eq!(decoded, "say \"hi\"\\there\nbye");
    }

    #[test]
    fn path_only_record_has_a_single_key() {
        let record = TaskRecord::PathOnly {
            task_path: HostText::from("\\Sub"),
        };
        assert_eq!(to_json(&record), r#"{"TaskPath":"\\Sub"}"#);
    }

    #[test]
    fn full_record_keeps_key_order_and_omits_empty_parts() {
        let time = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let record = TaskRecord::Full(TaskInfo {
            task_path: HostText::from("\\"),
            task_name: HostText::from("Foo"),
            state: 3,
            last_run_time: Timestamp(time),
            next_run_time: Timestamp(time),
            last_result: -2147024891,
            description: None,
            actions: Vec::new(),
            triggers: Vec::new(),
        });
        assert_eq!(
            to_json(&record),
            r#"{"TaskPath":"\\","TaskName":"Foo","State":3,"LastRunTime":"2024/01/02 03:04:05","NextRunTime":"2024/01/02 03:04:05","LastResult":-2147024891}"#
        );
    }

    #[test]
    fn trigger_blocks_serialize_with_host_names() {
        let trigger = TriggerInfo {
            enabled: Some(false),
            schedule_by_month: Some(MonthlySchedule {
                days: Some(1),
                months: Some(4095),
                run_on_last_day_of_month: Some(true),
            }),
            repetition: Some(RepetitionInfo {
                interval: Some(HostText::from("PT5M")),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(
            to_json(&trigger),
            r#"{"Enabled":false,"ScheduleByMonth":{"Days":1,"Months":4095,"RunOnLastDayOfMonth":true},"Repetition":{"Interval":"PT5M"}}"#
        );
    }
}
