//! Academic calendar lookups
//!
//! A fixed decision tree over the course schedule table: a course code in the
//! query wins, then exam words, then start words, then the semester overview.

use chrono::{Datelike, NaiveDate};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

use super::catalog::CourseCatalog;

const EXAM_WORDS: &[&str] = &["exam", "final", "midterm"];
const START_WORDS: &[&str] = &["start", "begin", "class"];

/// Meeting times and key dates for one course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSchedule {
    pub code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midterm_exam: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_exam: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midterm_presentation: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_presentation: Option<NaiveDate>,
    pub class_times: String,
    pub location: String,
}

/// Exam and presentation dates for one course
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamDates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midterm: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#final: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midterm_presentation: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_presentation: Option<NaiveDate>,
}

impl ExamDates {
    fn from_schedule(schedule: &CourseSchedule) -> Option<Self> {
        let dates = Self {
            midterm: schedule.midterm_exam,
            r#final: schedule.final_exam,
            midterm_presentation: schedule.midterm_presentation,
            final_presentation: schedule.final_presentation,
        };
        (dates != Self::default()).then_some(dates)
    }
}

/// Semester-wide dates, derived from the current year
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemesterDates {
    pub fall_semester_start: NaiveDate,
    pub fall_semester_end: NaiveDate,
    pub spring_semester_start: NaiveDate,
    pub spring_semester_end: NaiveDate,
    pub final_exams_week: String,
    pub midterm_exams_week: String,
    pub registration_deadline: NaiveDate,
    pub add_drop_deadline: NaiveDate,
}

impl SemesterDates {
    pub fn for_year(year: i32) -> Self {
        Self {
            fall_semester_start: date(year, 9, 3),
            fall_semester_end: date(year, 12, 15),
            spring_semester_start: date(year + 1, 1, 15),
            spring_semester_end: date(year + 1, 5, 10),
            final_exams_week: format!("{} to {}", date(year, 12, 10), date(year, 12, 16)),
            midterm_exams_week: format!("{} to {}", date(year, 10, 15), date(year, 10, 22)),
            registration_deadline: date(year, 8, 25),
            add_drop_deadline: date(year, 9, 15),
        }
    }
}

/// Per-course entries in schedule-table order, serialized as an object keyed by course code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByCourse<T>(Vec<(String, T)>);

impl<T> ByCourse<T> {
    pub fn get(&self, code: &str) -> Option<&T> {
        self.0.iter().find(|(c, _)| c == code).map(|(_, v)| v)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for ByCourse<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for ByCourse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(c, v)| (c, v)))
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ByCourse<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ByCourseVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for ByCourseVisitor<T> {
            type Value = ByCourse<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map keyed by course code")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry::<String, T>()? {
                    entries.push(entry);
                }
                Ok(ByCourse(entries))
            }
        }

        deserializer.deserialize_map(ByCourseVisitor(PhantomData))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamPeriods {
    pub midterm_week: String,
    pub final_week: String,
}

/// Answer to a calendar query; the variant depends on what the query asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CalendarFacts {
    Course {
        query: String,
        course_code: String,
        course_title: String,
        schedule: CourseSchedule,
        semester_dates: SemesterDates,
        notes: String,
    },
    Exams {
        query: String,
        exam_schedules: ByCourse<ExamDates>,
        general_exam_periods: ExamPeriods,
        notes: String,
    },
    StartDates {
        query: String,
        course_start_dates: ByCourse<NaiveDate>,
        semester_start: NaiveDate,
        notes: String,
    },
    General {
        query: String,
        semester_dates: SemesterDates,
        total_courses_available: usize,
        notes: String,
    },
}

/// Course schedule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcademicCalendar {
    schedules: Vec<CourseSchedule>,
}

impl Default for AcademicCalendar {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AcademicCalendar {
    pub fn new(schedules: Vec<CourseSchedule>) -> Self {
        Self { schedules }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            schedule("CS320", (2024, 9, 3), (2024, 12, 15), "MWF 10:00-11:00 AM", "Science Building 201")
                .exams((2024, 10, 15), (2024, 12, 12)),
            schedule("STAT210", (2024, 9, 3), (2024, 12, 15), "TTh 2:00-3:30 PM", "Math Building 105")
                .exams((2024, 10, 18), (2024, 12, 14)),
            schedule("CS250", (2024, 9, 5), (2024, 12, 17), "MW 1:00-2:30 PM", "Computer Lab 301")
                .exams((2024, 10, 20), (2024, 12, 16)),
            schedule("CS499", (2024, 9, 3), (2024, 12, 15), "F 3:00-5:00 PM", "Conference Room A")
                .presentations((2024, 11, 1), (2024, 12, 10)),
            schedule("CS101", (2024, 9, 3), (2024, 12, 15), "MWF 9:00-10:00 AM", "Computer Lab 101")
                .exams((2024, 10, 12), (2024, 12, 11)),
            schedule("CS201", (2024, 9, 3), (2024, 12, 15), "TTh 11:00-12:30 PM", "Computer Lab 201")
                .exams((2024, 10, 17), (2024, 12, 13)),
        ])
    }

    pub fn schedules(&self) -> &[CourseSchedule] {
        &self.schedules
    }

    /// First schedule whose code appears in `query_lower`
    fn course_in(&self, query_lower: &str) -> Option<&CourseSchedule> {
        self.schedules
            .iter()
            .find(|s| query_lower.contains(&s.code.to_lowercase()))
    }

    /// Answer `query` with semester dates taken from `today`'s year
    pub fn lookup_on(&self, query: &str, catalog: &CourseCatalog, today: NaiveDate) -> CalendarFacts {
        let lower = query.to_lowercase();
        let semester = SemesterDates::for_year(today.year());

        if let Some(schedule) = self.course_in(&lower) {
            debug!("Calendar lookup for course {}", schedule.code);
            let course_title = catalog
                .find(&schedule.code)
                .map(|c| c.title.clone())
                .unwrap_or_else(|| "Unknown Course".to_string());
            return CalendarFacts::Course {
                query: query.to_string(),
                course_code: schedule.code.clone(),
                course_title,
                schedule: schedule.clone(),
                semester_dates: semester,
                notes: format!("Schedule for {}. All dates are subject to change.", schedule.code),
            };
        }

        if EXAM_WORDS.iter().any(|w| lower.contains(w)) {
            debug!("Calendar lookup for exam dates");
            let exam_schedules = self
                .schedules
                .iter()
                .filter_map(|s| ExamDates::from_schedule(s).map(|d| (s.code.clone(), d)))
                .collect();
            return CalendarFacts::Exams {
                query: query.to_string(),
                exam_schedules,
                general_exam_periods: ExamPeriods {
                    midterm_week: semester.midterm_exams_week,
                    final_week: semester.final_exams_week,
                },
                notes: "Exam dates for all courses. Check with instructors for room assignments."
                    .to_string(),
            };
        }

        if START_WORDS.iter().any(|w| lower.contains(w)) {
            debug!("Calendar lookup for start dates");
            let course_start_dates = self
                .schedules
                .iter()
                .map(|s| (s.code.clone(), s.start_date))
                .collect();
            return CalendarFacts::StartDates {
                query: query.to_string(),
                course_start_dates,
                semester_start: semester.fall_semester_start,
                notes: "Course start dates may vary. Most courses begin with the semester."
                    .to_string(),
            };
        }

        debug!("Calendar lookup for general semester dates");
        CalendarFacts::General {
            query: query.to_string(),
            semester_dates: semester,
            total_courses_available: catalog.len(),
            notes: "General academic calendar. Use specific course codes for detailed schedules."
                .to_string(),
        }
    }
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

struct ScheduleBuilder(CourseSchedule);

fn schedule(
    code: &str,
    start: (i32, u32, u32),
    end: (i32, u32, u32),
    class_times: &str,
    location: &str,
) -> ScheduleBuilder {
    ScheduleBuilder(CourseSchedule {
        code: code.to_string(),
        start_date: date(start.0, start.1, start.2),
        end_date: date(end.0, end.1, end.2),
        midterm_exam: None,
        final_exam: None,
        midterm_presentation: None,
        final_presentation: None,
        class_times: class_times.to_string(),
        location: location.to_string(),
    })
}

impl ScheduleBuilder {
    fn exams(mut self, midterm: (i32, u32, u32), fin: (i32, u32, u32)) -> CourseSchedule {
        self.0.midterm_exam = Some(date(midterm.0, midterm.1, midterm.2));
        self.0.final_exam = Some(date(fin.0, fin.1, fin.2));
        self.0
    }

    fn presentations(mut self, midterm: (i32, u32, u32), fin: (i32, u32, u32)) -> CourseSchedule {
        self.0.midterm_presentation = Some(date(midterm.0, midterm.1, midterm.2));
        self.0.final_presentation = Some(date(fin.0, fin.1, fin.2));
        self.0
    }
}
