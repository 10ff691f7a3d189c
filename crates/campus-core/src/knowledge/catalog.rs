//! Course catalog and topic search

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub code: String,
    pub title: String,
    /// Subject area the topic search matches against
    pub area: String,
    pub level: String,
    /// Why a student would take it
    pub why: String,
}

impl Course {
    fn new(code: &str, title: &str, area: &str, level: &str, why: &str) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            area: area.to_string(),
            level: level.to_string(),
            why: why.to_string(),
        }
    }
}

/// Result of a catalog search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseLookup {
    pub recommendations: Vec<Course>,
    pub count: usize,
    /// ISO-8601 UTC, `Z` suffixed
    pub timestamp: String,
}

/// Ordered list of courses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseCatalog {
    courses: Vec<Course>,
}

impl Default for CourseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CourseCatalog {
    pub fn new(courses: Vec<Course>) -> Self {
        Self { courses }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            Course::new("CS320", "Intro to Machine Learning", "data science", "undergrad", "Intro to supervised learning"),
            Course::new("STAT210", "Applied Statistics", "data science", "undergrad", "Probability and stats foundations"),
            Course::new("CS250", "Data Wrangling", "data science", "undergrad", "ETL & preprocessing for ML"),
            Course::new("CS499", "Data Science Capstone", "data science", "undergrad", "Project-based course"),
            Course::new("CS101", "Introduction to Programming", "computer science", "undergrad", "Programming fundamentals"),
            Course::new("CS201", "Data Structures", "computer science", "undergrad", "Core CS concepts"),
            Course::new("CS301", "Algorithms", "computer science", "undergrad", "Algorithm design and analysis"),
            Course::new("CS401", "Software Engineering", "computer science", "undergrad", "Large-scale software development"),
            Course::new("HUM101", "Creative Writing", "humanities", "undergrad", "Writing skills and creativity"),
            Course::new("MATH201", "Calculus II", "mathematics", "undergrad", "Advanced calculus concepts"),
            Course::new("PHYS101", "General Physics", "physics", "undergrad", "Physics fundamentals"),
        ])
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    /// Find a course by code (case-insensitive)
    pub fn find(&self, code: &str) -> Option<&Course> {
        self.courses
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(code))
    }

    /// Courses whose area contains `topic` at exactly `level`, in catalog order.
    ///
    /// Never comes back empty-handed: with no matches the first `limit`
    /// catalog entries are returned instead. A `limit` of zero is treated as one.
    pub fn lookup(&self, topic: &str, level: &str, limit: usize) -> CourseLookup {
        self.lookup_at(topic, level, limit, Utc::now())
    }

    pub fn lookup_at(
        &self,
        topic: &str,
        level: &str,
        limit: usize,
        now: DateTime<Utc>,
    ) -> CourseLookup {
        let limit = limit.max(1);
        let topic = topic.to_lowercase();

        let mut matches: Vec<&Course> = self
            .courses
            .iter()
            .filter(|c| c.area.to_lowercase().contains(&topic) && c.level == level)
            .collect();

        if matches.is_empty() {
            debug!(
                "No courses for topic '{}' at level '{}', returning catalog head",
                topic, level
            );
            matches = self.courses.iter().collect();
        }

        let recommendations: Vec<Course> = matches.into_iter().take(limit).cloned().collect();

        CourseLookup {
            count: recommendations.len(),
            recommendations,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}
