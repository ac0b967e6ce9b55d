//! Editing rules for one day's ordered sequence of timeboxes.
//!
//! Every operation validates before it mutates, so a rejected call leaves the
//! plan exactly as it was. Wall-clock input is passed in explicitly as a
//! [`TimeOfDay`]; nothing here reads the system clock or touches storage.

use crate::domain::models::{ScheduleDocument, TimeOfDay, Timebox, TimeboxPatch, TimeboxRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

const START_ROUNDING_MINUTES: u32 = 5;
const LATEST_ROUNDED_START: TimeOfDay = TimeOfDay::saturating(23, 55);
const PLACEHOLDER_START: TimeOfDay = TimeOfDay::saturating(9, 0);
const PLACEHOLDER_END: TimeOfDay = TimeOfDay::saturating(10, 0);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReflowError {
    #[error("timebox index {index} is out of range for {len} boxes")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("the last remaining timebox cannot be deleted")]
    LastRemainingBox,
    #[error("the schedule already runs to the end of the day")]
    DayEndReached,
    #[error(
        "not enough room: both neighbouring boxes must be longer than {required_minutes} minutes \
         (they are {before_minutes} and {after_minutes} minutes)"
    )]
    InsufficientRoom {
        required_minutes: u32,
        before_minutes: i64,
        after_minutes: i64,
    },
    #[error("cannot make a box from {stolen_minutes} minutes; take at least 2")]
    NothingToSteal { stolen_minutes: u32 },
}

/// True when a box ending at `end` cannot be followed by another box today.
///
/// An end hour of 0 counts as "already wrapped past midnight".
pub fn day_end_reached(end: TimeOfDay) -> bool {
    end >= TimeOfDay::DAY_END || end.hour() == 0
}

/// Whether `add_timebox` would accept a new box after `boxes`.
pub fn can_add_timebox(boxes: &[Timebox]) -> bool {
    boxes.last().is_none_or(|last| !day_end_reached(last.end))
}

/// A fresh box starting at `now` rounded up to the next 5-minute mark.
pub fn now_based_box(now: TimeOfDay, duration_minutes: u32) -> Timebox {
    let rounded = now.minutes().div_ceil(START_ROUNDING_MINUTES) * START_ROUNDING_MINUTES;
    let start = TimeOfDay::from_minutes(rounded).unwrap_or(LATEST_ROUNDED_START);
    Timebox::draft(start, start.add_minutes_clamped(duration_minutes))
}

fn chained_box(after: TimeOfDay, duration_minutes: u32) -> Timebox {
    Timebox::draft(after, after.add_minutes_clamped(duration_minutes))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayPlan {
    boxes: Vec<Timebox>,
}

impl DayPlan {
    /// Adopts `boxes` as-is, in the given order.
    pub fn from_boxes(boxes: Vec<Timebox>) -> Self {
        Self { boxes }
    }

    /// Builds the plan shown when a day is opened.
    ///
    /// Stored boxes are kept in stored order. For today, a plan that has
    /// already fallen behind `now` gets a now-based box appended. An empty
    /// day starts with a single now-based box (today) or a 09:00-10:00
    /// placeholder (any other day).
    pub fn initialize(
        existing: Vec<Timebox>,
        is_today: bool,
        now: TimeOfDay,
        default_duration_minutes: u32,
    ) -> Self {
        if existing.is_empty() {
            let first = if is_today {
                now_based_box(now, default_duration_minutes)
            } else {
                Timebox::draft(PLACEHOLDER_START, PLACEHOLDER_END)
            };
            return Self { boxes: vec![first] };
        }

        let mut plan = Self { boxes: existing };
        if is_today && plan.boxes.last().is_some_and(|last| last.end <= now) {
            plan.boxes.push(now_based_box(now, default_duration_minutes));
        }
        plan
    }

    pub fn boxes(&self) -> &[Timebox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn can_add_timebox(&self) -> bool {
        can_add_timebox(&self.boxes)
    }

    pub fn has_labelled_boxes(&self) -> bool {
        self.boxes.iter().any(Timebox::has_label)
    }

    /// Applies `patch` to the box at `index`.
    ///
    /// When the last box goes from an empty label to a non-empty one and does
    /// not already end the day, a chained empty box is appended. Returns
    /// whether that happened.
    pub fn update_box(
        &mut self,
        index: usize,
        patch: TimeboxPatch,
        default_duration_minutes: u32,
    ) -> Result<bool, ReflowError> {
        let len = self.boxes.len();
        let target = self
            .boxes
            .get_mut(index)
            .ok_or(ReflowError::IndexOutOfRange { index, len })?;

        let was_unlabelled = target.label.is_empty();
        let gains_label = patch.label.as_deref().is_some_and(|label| !label.is_empty());
        if let Some(start) = patch.start {
            target.start = start;
        }
        if let Some(end) = patch.end {
            target.end = end;
        }
        if let Some(label) = patch.label {
            target.label = label;
        }
        let end = target.end;

        let is_last = index + 1 == len;
        if is_last && was_unlabelled && gains_label && !day_end_reached(end) {
            self.boxes.push(chained_box(end, default_duration_minutes));
            return Ok(true);
        }
        Ok(false)
    }

    /// Removes and returns the box at `index`; the plan never drops below one box.
    pub fn delete_box(&mut self, index: usize) -> Result<Timebox, ReflowError> {
        let len = self.boxes.len();
        if index >= len {
            return Err(ReflowError::IndexOutOfRange { index, len });
        }
        if len == 1 {
            return Err(ReflowError::LastRemainingBox);
        }
        Ok(self.boxes.remove(index))
    }

    /// Appends a box after the last one and returns a copy of it.
    ///
    /// A plan that has fallen behind `now` restarts from a now-based box;
    /// otherwise the new box chains off the last box's end.
    pub fn add_timebox(
        &mut self,
        now: TimeOfDay,
        default_duration_minutes: u32,
    ) -> Result<Timebox, ReflowError> {
        let next = match self.boxes.last() {
            None => now_based_box(now, default_duration_minutes),
            Some(last) if day_end_reached(last.end) => return Err(ReflowError::DayEndReached),
            Some(last) if last.end <= now => now_based_box(now, default_duration_minutes),
            Some(last) => chained_box(last.end, default_duration_minutes),
        };
        self.boxes.push(next.clone());
        Ok(next)
    }

    /// Carves a new box out of the boxes at `index_before` and
    /// `index_before + 1`, taking half of `stolen_minutes` from each.
    ///
    /// Both neighbours must be strictly longer than the full
    /// `stolen_minutes`. Returns a copy of the inserted box.
    pub fn insert_between(
        &mut self,
        index_before: usize,
        stolen_minutes: u32,
    ) -> Result<Timebox, ReflowError> {
        let len = self.boxes.len();
        if index_before + 1 >= len {
            return Err(ReflowError::IndexOutOfRange {
                index: index_before,
                len,
            });
        }
        let half = stolen_minutes / 2;
        if half == 0 {
            return Err(ReflowError::NothingToSteal { stolen_minutes });
        }

        let before = &self.boxes[index_before];
        let after = &self.boxes[index_before + 1];
        let before_minutes = before.duration_minutes();
        let after_minutes = after.duration_minutes();
        let no_room = || ReflowError::InsufficientRoom {
            required_minutes: stolen_minutes,
            before_minutes,
            after_minutes,
        };
        let required = i64::from(stolen_minutes);
        if before_minutes <= required || after_minutes <= required {
            return Err(no_room());
        }
        let shrunk_end = before.end.checked_sub_minutes(half).ok_or_else(no_room)?;
        let shrunk_start = after.start.checked_add_minutes(half).ok_or_else(no_room)?;

        let inserted = Timebox::draft(shrunk_end, shrunk_start);
        self.boxes[index_before].end = shrunk_end;
        self.boxes[index_before + 1].start = shrunk_start;
        self.boxes.insert(index_before + 1, inserted.clone());
        Ok(inserted)
    }

    /// The document written on save: labelled boxes only, stamped `saved_at`.
    pub fn to_document(&self, date: NaiveDate, saved_at: DateTime<Utc>) -> ScheduleDocument {
        ScheduleDocument {
            date,
            created_at: saved_at,
            updated_at: saved_at,
            tasks: self
                .boxes
                .iter()
                .filter(|timebox| timebox.has_label())
                .map(TimeboxRecord::from)
                .collect(),
        }
    }
}
