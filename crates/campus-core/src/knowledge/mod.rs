//! Static campus knowledge: course catalog and academic calendar

pub mod calendar;
pub mod catalog;

pub use calendar::{
    AcademicCalendar, ByCourse, CalendarFacts, CourseSchedule, ExamDates, SemesterDates,
};
pub use catalog::{Course, CourseCatalog, CourseLookup};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Catalog and calendar bundled together, shared by the tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub courses: CourseCatalog,
    #[serde(default)]
    pub schedules: AcademicCalendar,
}

impl KnowledgeBase {
    /// Load from a TOML file with `[[courses]]` and `[[schedules]]` tables.
    /// Dates are quoted `YYYY-MM-DD` strings. A missing table keeps the built-in data.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read knowledge file: {}", path.display()))?;
        let kb: KnowledgeBase = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse knowledge file: {}", path.display()))?;
        info!(
            "Loaded knowledge base from {} ({} courses, {} schedules)",
            path.display(),
            kb.courses.len(),
            kb.schedules.schedules().len()
        );
        Ok(kb)
    }

    pub fn lookup_courses(&self, topic: &str, level: &str, limit: usize) -> CourseLookup {
        self.courses.lookup(topic, level, limit)
    }

    /// Calendar answer using the local date for semester dates
    pub fn lookup_calendar(&self, query: &str) -> CalendarFacts {
        self.lookup_calendar_on(query, Local::now().date_naive())
    }

    pub fn lookup_calendar_on(&self, query: &str, today: NaiveDate) -> CalendarFacts {
        self.schedules.lookup_on(query, &self.courses, today)
    }
}
