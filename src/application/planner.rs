use crate::domain::models::{ScheduleDocument, TimeOfDay};
use crate::domain::reflow::DayPlan;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Identifies one in-flight load. Only the most recently issued ticket may
/// populate the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    date: NaiveDate,
    generation: u64,
}

impl LoadTicket {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The day currently being edited.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerSession {
    date: NaiveDate,
    plan: DayPlan,
    #[serde(skip)]
    generation: u64,
    loading: bool,
}

impl PlannerSession {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            plan: DayPlan::default(),
            generation: 0,
            loading: false,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn plan(&self) -> &DayPlan {
        &self.plan
    }

    pub fn plan_mut(&mut self) -> &mut DayPlan {
        &mut self.plan
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Switches to `date` and supersedes any load still in flight.
    pub fn begin_load(&mut self, date: NaiveDate) -> LoadTicket {
        self.generation = self.generation.wrapping_add(1);
        self.date = date;
        self.plan = DayPlan::default();
        self.loading = true;
        LoadTicket {
            date,
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.generation == self.generation && ticket.date == self.date
    }

    /// Installs a loaded day if `ticket` is still current. Returns `false`
    /// and leaves the session untouched for a superseded ticket.
    pub fn apply_loaded(
        &mut self,
        ticket: LoadTicket,
        document: Option<ScheduleDocument>,
        today: NaiveDate,
        now: TimeOfDay,
        default_duration_minutes: u32,
    ) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        let existing = document.map(ScheduleDocument::into_timeboxes).unwrap_or_default();
        self.plan = DayPlan::initialize(existing, ticket.date == today, now, default_duration_minutes);
        self.loading = false;
        true
    }

    /// The save payload, or `None` when no box carries a label.
    pub fn document_for_save(&self, saved_at: DateTime<Utc>) -> Option<ScheduleDocument> {
        self.plan
            .has_labelled_boxes()
            .then(|| self.plan.to_document(self.date, saved_at))
    }
}
