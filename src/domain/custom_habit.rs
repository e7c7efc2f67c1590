use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::habit::validate_name;
use crate::error::DomainError;

/// A habit that only runs between two dates, e.g. a 30-day challenge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomHabit {
    pub id: Uuid,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub completed_dates: BTreeSet<NaiveDate>,
}

impl CustomHabit {
    pub fn new(
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, DomainError> {
        let name = validate_name(name.into())?;
        if end_date < start_date {
            return Err(DomainError::validation(
                "end_date",
                "must not be before start_date",
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            start_date,
            end_date,
            completed_dates: BTreeSet::new(),
        })
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn toggle(&mut self, date: NaiveDate) -> Result<bool, DomainError> {
        if !self.covers(date) {
            return Err(DomainError::OutsideHabitRange { id: self.id, date });
        }
        if self.completed_dates.remove(&date) {
            Ok(false)
        } else {
            self.completed_dates.insert(date);
            Ok(true)
        }
    }

    pub fn total_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Fraction of the range checked off, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.completed_dates.len() as f64 / self.total_days() as f64
    }
}
