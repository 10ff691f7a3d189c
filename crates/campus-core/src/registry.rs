//! Responder registry: behavioral profile and tool set for each responder

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::tools::{ACADEMIC_CALENDAR_TOOL, COURSE_LOOKUP_TOOL};
use crate::types::ResponderId;

const COURSE_ADVISOR_INSTRUCTIONS: &str = "You are Course Advisor. You answer course selection and \
academic planning questions in a helpful, factual tone. When it helps, call the 'course_lookup' \
tool to fetch recommended courses. Only ask follow-up questions (year, major, preferences) when \
they are needed to recommend better courses.";

const UNIVERSITY_POET_INSTRUCTIONS: &str = "You are University Poet. You respond ONLY with a \
traditional haiku: exactly three lines of five, seven and five syllables, about campus culture \
and social life. Add no other text, explanation or commentary. If asked about schedules or \
courses, decline in haiku form and point to the right assistant.\n\
Example:\n\
Students gather here\n\
Knowledge flows like autumn leaves\n\
Wisdom takes its root";

const SCHEDULING_ASSISTANT_INSTRUCTIONS: &str = "You are Scheduling Assistant. Give class times, \
exam schedules and key academic dates in short factual sentences. Use the 'academic_calendar' \
tool to fetch calendar facts, and include the course code in the query when the user asks \
about a specific course. For general questions give the semester-wide dates. Always format \
dates clearly and mention upcoming deadlines.";

const TRIAGE_AGENT_INSTRUCTIONS: &str = "You are the Triage Agent. You handle greetings, unclear \
requests and general help. Be friendly and conversational. When the user touches a topic \
another assistant covers, guide them:\n\
- Courses: 'I can help you find the right courses! What subject or level are you interested in?'\n\
- Schedules: 'I can help with scheduling information! What dates or deadlines do you need?'\n\
- Creative requests: 'I can help with campus poetry! Would you like a haiku about university life?'\n\
Ask follow-up questions to understand what the user needs.";

/// A responder's identity, instructions and allowed tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderProfile {
    pub id: ResponderId,
    pub instructions: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ResponderProfile {
    pub fn new(id: ResponderId, instructions: impl Into<String>) -> Self {
        Self {
            id,
            instructions: instructions.into(),
            tools: Vec::new(),
            model: None,
            max_tokens: None,
        }
    }

    pub fn with_tools(mut self, tools: &[&str]) -> Self {
        self.tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Profiles only reach the tools they list
    pub fn is_tool_allowed(&self, tool_name: &str) -> bool {
        self.tools.iter().any(|t| t == tool_name)
    }
}

/// Per-responder settings from config, layered over the built-in profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileOverride {
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Immutable map from responder to profile
///
/// Holds exactly one profile per [`ResponderId`], so lookups by id cannot fail.
#[derive(Debug, Clone)]
pub struct ResponderRegistry {
    profiles: [ResponderProfile; 4],
}

impl Default for ResponderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ResponderRegistry {
    /// The four built-in responders
    pub fn builtin() -> Self {
        let profiles = [
            ResponderProfile::new(ResponderId::CourseAdvisor, COURSE_ADVISOR_INSTRUCTIONS)
                .with_tools(&[COURSE_LOOKUP_TOOL]),
            ResponderProfile::new(ResponderId::UniversityPoet, UNIVERSITY_POET_INSTRUCTIONS),
            ResponderProfile::new(
                ResponderId::SchedulingAssistant,
                SCHEDULING_ASSISTANT_INSTRUCTIONS,
            )
            .with_tools(&[ACADEMIC_CALENDAR_TOOL]),
            ResponderProfile::new(ResponderId::TriageAgent, TRIAGE_AGENT_INSTRUCTIONS),
        ];
        info!("ResponderRegistry: initialized {} responders", profiles.len());
        Self { profiles }
    }

    /// Apply config overrides; ids not in the map keep their built-in profile
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (ResponderId, &'a ProfileOverride)>,
    {
        for (id, ov) in overrides {
            let profile = &mut self.profiles[slot(id)];
            if let Some(instructions) = &ov.instructions {
                profile.instructions = instructions.clone();
            }
            if ov.model.is_some() {
                profile.model = ov.model.clone();
            }
            if ov.max_tokens.is_some() {
                profile.max_tokens = ov.max_tokens;
            }
            debug!("ResponderRegistry: applied override for '{}'", id);
        }
        self
    }

    pub fn get(&self, id: ResponderId) -> &ResponderProfile {
        &self.profiles[slot(id)]
    }

    /// Look up a profile by name, falling back to the Triage Agent
    pub fn resolve(&self, name: &str) -> &ResponderProfile {
        match name.parse::<ResponderId>() {
            Ok(id) => self.get(id),
            Err(_) => {
                debug!(
                    "ResponderRegistry: unknown responder '{}', using {}",
                    name,
                    ResponderId::TriageAgent
                );
                self.get(ResponderId::TriageAgent)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResponderProfile> {
        self.profiles.iter()
    }
}

fn slot(id: ResponderId) -> usize {
    match id {
        ResponderId::CourseAdvisor => 0,
        ResponderId::UniversityPoet => 1,
        ResponderId::SchedulingAssistant => 2,
        ResponderId::TriageAgent => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builtin_has_every_responder() {
        let registry = ResponderRegistry::builtin();
        for id in ResponderId::ALL {
            assert_eq!(registry.get(id).id, id);
        }
        assert_eq!(registry.iter().count(), 4);
    }

    #[test]
    fn test_resolve_known_names() {
        let registry = ResponderRegistry::builtin();
        assert_eq!(
            registry.resolve("Scheduling Assistant").id,
            ResponderId::SchedulingAssistant
        );
        assert_eq!(
            registry.resolve("course_advisor").id,
            ResponderId::CourseAdvisor
        );
    }

    #[test]
    fn test_resolve_unknown_falls_back_to_triage() {
        let registry = ResponderRegistry::builtin();
        assert_eq!(registry.resolve("Router Agent").id, ResponderId::TriageAgent);
        assert_eq!(registry.resolve("").id, ResponderId::TriageAgent);
    }

    #[test]
    fn test_tool_sets() {
        let registry = ResponderRegistry::builtin();
        assert!(registry
            .get(ResponderId::CourseAdvisor)
            .is_tool_allowed(COURSE_LOOKUP_TOOL));
        assert!(!registry
            .get(ResponderId::CourseAdvisor)
            .is_tool_allowed(ACADEMIC_CALENDAR_TOOL));
        assert!(registry
            .get(ResponderId::SchedulingAssistant)
            .is_tool_allowed(ACADEMIC_CALENDAR_TOOL));
        assert!(registry.get(ResponderId::UniversityPoet).tools.is_empty());
        assert!(registry.get(ResponderId::TriageAgent).tools.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            ResponderId::UniversityPoet,
            ProfileOverride {
                instructions: Some("Write limericks.".to_string()),
                model: Some("gpt-4o".to_string()),
                max_tokens: None,
            },
        );
        let registry = ResponderRegistry::builtin()
            .with_overrides(overrides.iter().map(|(id, ov)| (*id, ov)));

        let poet = registry.get(ResponderId::UniversityPoet);
        assert_eq!(poet.instructions, "Write limericks.");
        assert_eq!(poet.model.as_deref(), Some("gpt-4o"));
        assert!(poet.max_tokens.is_none());

        // Untouched profiles keep their defaults
        assert!(registry.get(ResponderId::TriageAgent).model.is_none());
    }
}
