use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Minutes since midnight, always within `00:00..=23:59`.
///
/// `23:59` is the end-of-day clamp for boxes that would otherwise run past
/// midnight. `00:00` is kept as an ordinary value; only the reflow rules
/// give it special meaning as an end time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self::saturating(0, 0);
    pub const DAY_END: Self = Self::saturating(23, 59);

    /// Builds a time from hour and minute, saturating each at its maximum.
    pub const fn saturating(hour: u16, minute: u16) -> Self {
        let hour = if hour > 23 { 23 } else { hour };
        let minute = if minute > 59 { 59 } else { minute };
        Self {
            minutes: hour * 60 + minute,
        }
    }

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Self::from_minutes(hour * 60 + minute)
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        if minutes >= MINUTES_PER_DAY {
            return None;
        }
        u16::try_from(minutes).ok().map(|minutes| Self { minutes })
    }

    /// Drops seconds; `14:37:59` becomes `14:37`.
    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self::saturating(time.hour() as u16, time.minute() as u16)
    }

    pub fn hour(self) -> u32 {
        u32::from(self.minutes) / 60
    }

    pub fn minute(self) -> u32 {
        u32::from(self.minutes) % 60
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.minutes)
    }

    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        self.minutes()
            .checked_add(minutes)
            .and_then(Self::from_minutes)
    }

    pub fn checked_sub_minutes(self, minutes: u32) -> Option<Self> {
        self.minutes()
            .checked_sub(minutes)
            .and_then(Self::from_minutes)
    }

    /// Adds `minutes`, landing on [`TimeOfDay::DAY_END`] once the sum would
    /// reach 24:00.
    pub fn add_minutes_clamped(self, minutes: u32) -> Self {
        self.checked_add_minutes(minutes).unwrap_or(Self::DAY_END)
    }

    pub fn minutes_until(self, later: Self) -> i64 {
        i64::from(later.minutes) - i64::from(self.minutes)
    }

    pub fn parse_hhmm(value: &str) -> Result<Self, String> {
        let invalid = || format!("'{value}' must be HH:MM");
        let mut split = value.trim().split(':');
        let (Some(hour_str), Some(minute_str), None) = (split.next(), split.next(), split.next())
        else {
            return Err(invalid());
        };
        let hour = hour_str.parse::<u32>().map_err(|_| invalid())?;
        let minute = minute_str.parse::<u32>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timebox {
    pub id: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub label: String,
}

impl Timebox {
    /// An unlabelled box with a fresh id.
    pub fn draft(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start,
            end,
            label: String::new(),
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.start.minutes_until(self.end)
    }

    pub fn has_label(&self) -> bool {
        !self.label.trim().is_empty()
    }
}

/// Partial update for a single box; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeboxPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimeOfDay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TimeboxPatch {
    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }
}

/// Persisted form of a [`Timebox`], shared by the remote service and the
/// local cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeboxRecord {
    pub id: String,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub task: String,
}

impl From<&Timebox> for TimeboxRecord {
    fn from(timebox: &Timebox) -> Self {
        Self {
            id: timebox.id.clone(),
            start_time: timebox.start,
            end_time: timebox.end,
            task: timebox.label.clone(),
        }
    }
}

impl From<TimeboxRecord> for Timebox {
    fn from(record: TimeboxRecord) -> Self {
        Self {
            id: record.id,
            start: record.start_time,
            end: record.end_time,
            label: record.task,
        }
    }
}

/// One saved day: `{date, createdAt, updatedAt, tasks}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDocument {
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tasks: Vec<TimeboxRecord>,
}

impl ScheduleDocument {
    pub fn validate(&self) -> Result<(), String> {
        if self.updated_at < self.created_at {
            return Err("schedule.updatedAt must be >= schedule.createdAt".to_string());
        }
        for task in &self.tasks {
            validate_non_empty(&task.id, "schedule.tasks[].id")?;
            validate_non_empty(&task.task, "schedule.tasks[].task")?;
        }
        Ok(())
    }

    pub fn into_timeboxes(self) -> Vec<Timebox> {
        self.tasks.into_iter().map(Timebox::from).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "u32", into = "u32")]
pub enum SlotDuration {
    FifteenMinutes,
    ThirtyMinutes,
    FortyFiveMinutes,
    #[default]
    OneHour,
    NinetyMinutes,
    TwoHours,
}

impl SlotDuration {
    pub const ALL: [SlotDuration; 6] = [
        Self::FifteenMinutes,
        Self::ThirtyMinutes,
        Self::FortyFiveMinutes,
        Self::OneHour,
        Self::NinetyMinutes,
        Self::TwoHours,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            Self::FifteenMinutes => 15,
            Self::ThirtyMinutes => 30,
            Self::FortyFiveMinutes => 45,
            Self::OneHour => 60,
            Self::NinetyMinutes => 90,
            Self::TwoHours => 120,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::FifteenMinutes => "15 minutes",
            Self::ThirtyMinutes => "30 minutes",
            Self::FortyFiveMinutes => "45 minutes",
            Self::OneHour => "1 hour",
            Self::NinetyMinutes => "1.5 hours",
            Self::TwoHours => "2 hours",
        }
    }
}

impl TryFrom<u32> for SlotDuration {
    type Error = String;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|option| option.minutes() == minutes)
            .ok_or_else(|| {
                format!("settings.defaultSlotDuration must be one of 15, 30, 45, 60, 90, 120 (got {minutes})")
            })
    }
}

impl From<SlotDuration> for u32 {
    fn from(value: SlotDuration) -> Self {
        value.minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub name: String,
    pub remind_before_activity: bool,
    pub remind_on_start: bool,
    pub nudge_during_activity: bool,
    pub congratulate_on_finish: bool,
    pub default_slot_duration: SlotDuration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_linked: Option<bool>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            remind_before_activity: true,
            remind_on_start: true,
            nudge_during_activity: true,
            congratulate_on_finish: true,
            default_slot_duration: SlotDuration::OneHour,
            telegram_linked: None,
        }
    }
}

impl UserSettings {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.name, "settings.name")
    }

    pub fn default_duration_minutes(&self) -> u32 {
        self.default_slot_duration.minutes()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

impl AuthTokens {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.access_token, "auth.access_token")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TelegramLinkCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Result of a save against a store that degrades to local storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
}

impl SaveOutcome {
    pub fn saved(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

pub fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

pub fn parse_date(value: &str, field_name: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_document() -> ScheduleDocument {
        ScheduleDocument {
            date: NaiveDate::from_ymd_opt(2026, 2, 16).expect("valid date"),
            created_at: fixed_time("2026-02-16T08:00:00Z"),
            updated_at: fixed_time("2026-02-16T08:00:00Z"),
            tasks: vec![TimeboxRecord {
                id: "box-1".to_string(),
                start_time: TimeOfDay::saturating(9, 0),
                end_time: TimeOfDay::saturating(10, 30),
                task: "Write".to_string(),
            }],
        }
    }

    #[test]
    fn time_of_day_parses_and_formats_hhmm() {
        let time = TimeOfDay::parse_hhmm("7:05").expect("parse");
        assert_eq!(time.hour(), 7);
        assert_eq!(time.minute(), 5);
        assert_eq!(time.to_string(), "07:05");
        assert_eq!(TimeOfDay::parse_hhmm("23:59").expect("parse"), TimeOfDay::DAY_END);
    }

    #[test]
    fn time_of_day_rejects_out_of_range_values() {
        assert!(TimeOfDay::parse_hhmm("24:00").is_err());
        assert!(TimeOfDay::parse_hhmm("12:60").is_err());
        assert!(TimeOfDay::parse_hhmm("12").is_err());
        assert!(TimeOfDay::parse_hhmm("12:00:00").is_err());
        assert!(TimeOfDay::from_minutes(MINUTES_PER_DAY).is_none());
    }

    #[test]
    fn add_minutes_clamped_stops_at_day_end() {
        let late = TimeOfDay::saturating(23, 0);
        assert_eq!(late.add_minutes_clamped(30), TimeOfDay::saturating(23, 30));
        assert_eq!(late.add_minutes_clamped(60), TimeOfDay::DAY_END);
        assert_eq!(late.add_minutes_clamped(59), TimeOfDay::DAY_END);
    }

    #[test]
    fn schedule_document_wire_shape_matches_backend_contract() {
        let json = serde_json::to_value(sample_document()).expect("serialize");
        assert_eq!(json["date"], "2026-02-16");
        assert_eq!(json["createdAt"], "2026-02-16T08:00:00Z");
        assert_eq!(json["tasks"][0]["startTime"], "09:00");
        assert_eq!(json["tasks"][0]["endTime"], "10:30");
        assert_eq!(json["tasks"][0]["task"], "Write");
    }

    #[test]
    fn schedule_document_parses_backend_payload() {
        let raw = r#"{
            "date": "2026-02-16",
            "createdAt": "2026-02-16T08:00:00.000Z",
            "updatedAt": "2026-02-16T08:05:00.000Z",
            "tasks": [{"id": "a", "startTime": "09:00", "endTime": "23:59", "task": "Focus"}]
        }"#;
        let parsed: ScheduleDocument = serde_json::from_str(raw).expect("parse");
        assert!(parsed.validate().is_ok());
        let boxes = parsed.into_timeboxes();
        assert_eq!(boxes[0].end, TimeOfDay::DAY_END);
        assert_eq!(boxes[0].label, "Focus");
    }

    #[test]
    fn schedule_document_validate_rejects_blank_task() {
        let mut document = sample_document();
        document.tasks[0].task = "  ".to_string();
        assert!(document.validate().is_err());
    }

    #[test]
    fn user_settings_merge_over_defaults() {
        let parsed: UserSettings =
            serde_json::from_str(r#"{"name": "Ada", "remindOnStart": false}"#).expect("parse");
        assert_eq!(parsed.name, "Ada");
        assert!(!parsed.remind_on_start);
        assert!(parsed.remind_before_activity);
        assert_eq!(parsed.default_slot_duration, SlotDuration::OneHour);
    }

    #[test]
    fn user_settings_reject_unknown_slot_duration() {
        let result = serde_json::from_str::<UserSettings>(r#"{"defaultSlotDuration": 20}"#);
        assert!(result.is_err());
    }

    #[test]
    fn user_settings_validate_rejects_blank_name() {
        let settings = UserSettings::default();
        assert!(settings.validate().is_err());
    }

    proptest! {
        #[test]
        fn time_of_day_hhmm_roundtrip(minutes in 0u32..MINUTES_PER_DAY) {
            let time = TimeOfDay::from_minutes(minutes).expect("in range");
            let parsed = TimeOfDay::parse_hhmm(&time.to_string()).expect("parse");
            prop_assert_eq!(parsed, time);
            prop_assert_eq!(parsed.minutes(), minutes);
        }

        #[test]
        fn slot_duration_accepts_only_listed_minutes(minutes in 0u32..200u32) {
            let listed = [15, 30, 45, 60, 90, 120].contains(&minutes);
            prop_assert_eq!(SlotDuration::try_from(minutes).is_ok(), listed);
        }
    }

    #[test]
    fn domain_models_support_serde_roundtrip() {
        let document = sample_document();
        let settings = UserSettings {
            name: "Ada".to_string(),
            telegram_linked: Some(true),
            ..UserSettings::default()
        };

        let document_roundtrip: ScheduleDocument =
            serde_json::from_str(&serde_json::to_string(&document).expect("serialize document"))
                .expect("deserialize document");
        let settings_roundtrip: UserSettings =
            serde_json::from_str(&serde_json::to_string(&settings).expect("serialize settings"))
                .expect("deserialize settings");

        assert_eq!(document_roundtrip, document);
        assert_eq!(settings_roundtrip, settings);
    }
}
