//! Responder routing
//!
//! Decides which responder answers a query. Explicit intent keywords are
//! checked first, in a fixed order (poetry, then course, then schedule), so a
//! topical request always switches responders. Only when none of them match
//! does the router look back at the conversation: a follow-up phrase, or a
//! short query carrying a pronoun, stays with the last specialist. Anything
//! else goes to the Triage Agent.
//!
//! The router holds nothing but immutable keyword tables and is safe to share
//! across tasks.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ResponderId, SenderKind, Turn};

const POETRY_KEYWORDS: &[&str] = &["haiku", "poem", "poetry", "verse", "write me a", "compose a"];

const COURSE_KEYWORDS: &[&str] = &[
    "course",
    "courses",
    "class",
    "classes",
    "major",
    "degree",
    "study",
    "studying",
    "academic",
    "curriculum",
    "credit",
    "credits",
    "cs320",
    "stat210",
    "cs250",
    "cs499",
    "computer science",
    "data science",
    "artificial intelligence",
    "machine learning",
    "programming",
    "statistics",
    "undergraduate",
    "graduate",
    "what should i take",
    "recommend",
    "recommendation",
    "subject",
    "subjects",
];

const SCHEDULE_KEYWORDS: &[&str] = &[
    "schedule",
    "time",
    "exam",
    "exams",
    "calendar",
    "date",
    "dates",
    "when",
    "semester",
    "deadline",
    "deadlines",
    "final",
    "finals",
    "midterm",
    "midterms",
    "start",
    "end",
    "begins",
    "registration",
    "when do",
    "when does",
    "when is",
];

const FOLLOW_UP_PHRASES: &[&str] = &[
    "tell me more",
    "more details",
    "what about",
    "can you explain",
    "prerequisites",
    "requirements",
    "how about",
    "what are the",
    "more information",
    "details about",
    "expand on",
    "elaborate",
    "that course",
    "those courses",
    "about it",
    "about that",
];

const PRONOUNS: &[&str] = &["it", "that", "this", "them", "those"];

const MAX_FOLLOW_UP_WORDS: usize = 8;

/// Explicit-intent keyword categories, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentCategory {
    Poetry,
    Course,
    Schedule,
}

impl IntentCategory {
    pub fn responder(&self) -> ResponderId {
        match self {
            Self::Poetry => ResponderId::UniversityPoet,
            Self::Course => ResponderId::CourseAdvisor,
            Self::Schedule => ResponderId::SchedulingAssistant,
        }
    }
}

/// The path that produced a routing decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteReason {
    /// The query carried an explicit intent keyword
    Keyword {
        category: IntentCategory,
        keyword: String,
    },
    /// Follow-up phrase while a specialist was active
    FollowUp { phrase: String },
    /// Short query with a pronoun while a specialist was active
    Pronoun { pronoun: String },
    /// An LLM router named the responder
    Llm,
    /// Nothing matched
    Default,
}

/// Routing output: the responder plus how it was chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub responder: ResponderId,
    pub reason: RouteReason,
}

impl RoutingDecision {
    fn triage() -> Self {
        Self {
            responder: ResponderId::TriageAgent,
            reason: RouteReason::Default,
        }
    }
}

/// Keyword tables driving the router
///
/// Every list is matched as a case-insensitive substring of the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTables {
    pub poetry_keywords: Vec<String>,
    pub course_keywords: Vec<String>,
    pub schedule_keywords: Vec<String>,
    pub follow_up_phrases: Vec<String>,
    pub pronouns: Vec<String>,
    /// Longest query (in words) the pronoun heuristic applies to
    pub max_follow_up_words: usize,
}

impl Default for RoutingTables {
    fn default() -> Self {
        Self {
            poetry_keywords: to_owned(POETRY_KEYWORDS),
            course_keywords: to_owned(COURSE_KEYWORDS),
            schedule_keywords: to_owned(SCHEDULE_KEYWORDS),
            follow_up_phrases: to_owned(FOLLOW_UP_PHRASES),
            pronouns: to_owned(PRONOUNS),
            max_follow_up_words: MAX_FOLLOW_UP_WORDS,
        }
    }
}

impl RoutingTables {
    /// Lowercase and trim every entry, dropping blanks (an empty needle would match everything)
    fn normalized(self) -> Self {
        Self {
            poetry_keywords: normalize(self.poetry_keywords),
            course_keywords: normalize(self.course_keywords),
            schedule_keywords: normalize(self.schedule_keywords),
            follow_up_phrases: normalize(self.follow_up_phrases),
            pronouns: normalize(self.pronouns),
            max_follow_up_words: self.max_follow_up_words,
        }
    }

    fn keywords(&self, category: IntentCategory) -> &[String] {
        match category {
            IntentCategory::Poetry => &self.poetry_keywords,
            IntentCategory::Course => &self.course_keywords,
            IntentCategory::Schedule => &self.schedule_keywords,
        }
    }
}

/// Deterministic keyword/context classifier
#[derive(Debug, Clone)]
pub struct Router {
    tables: RoutingTables,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RoutingTables::default())
    }
}

impl Router {
    pub fn new(tables: RoutingTables) -> Self {
        Self {
            tables: tables.normalized(),
        }
    }

    pub fn tables(&self) -> &RoutingTables {
        &self.tables
    }

    /// Pick the responder for `query` given the turns before it
    pub fn classify(&self, history: &[Turn], query: &str) -> ResponderId {
        self.decide(history, query).responder
    }

    /// Like [`Router::classify`], keeping the decision path
    pub fn decide(&self, history: &[Turn], query: &str) -> RoutingDecision {
        let lower = query.trim().to_lowercase();
        if lower.is_empty() {
            debug!("Empty query, routing to {}", ResponderId::TriageAgent);
            return RoutingDecision::triage();
        }

        if let Some(decision) = self.explicit_intent(&lower) {
            debug!(
                "Explicit intent {:?}, routing to {}",
                decision.reason, decision.responder
            );
            return decision;
        }

        if let Some(last) = last_responder(history).filter(|r| !r.is_triage()) {
            if let Some(reason) = self.carryover(&lower) {
                debug!("Follow-up {:?}, staying with {}", reason, last);
                return RoutingDecision {
                    responder: last,
                    reason,
                };
            }
        }

        debug!("General query, routing to {}", ResponderId::TriageAgent);
        RoutingDecision::triage()
    }

    fn explicit_intent(&self, lower: &str) -> Option<RoutingDecision> {
        [
            IntentCategory::Poetry,
            IntentCategory::Course,
            IntentCategory::Schedule,
        ]
        .into_iter()
        .find_map(|category| {
            find_match(lower, self.tables.keywords(category)).map(|keyword| RoutingDecision {
                responder: category.responder(),
                reason: RouteReason::Keyword {
                    category,
                    keyword: keyword.to_string(),
                },
            })
        })
    }

    fn carryover(&self, lower: &str) -> Option<RouteReason> {
        if let Some(phrase) = find_match(lower, &self.tables.follow_up_phrases) {
            return Some(RouteReason::FollowUp {
                phrase: phrase.to_string(),
            });
        }

        if lower.split_whitespace().count() <= self.tables.max_follow_up_words {
            if let Some(pronoun) = find_match(lower, &self.tables.pronouns) {
                return Some(RouteReason::Pronoun {
                    pronoun: pronoun.to_string(),
                });
            }
        }

        None
    }
}

/// Most recent responder in `history`, skipping user, tool and malformed turns
pub fn last_responder(history: &[Turn]) -> Option<ResponderId> {
    history
        .iter()
        .rev()
        .filter(|turn| !turn.is_malformed())
        .find_map(|turn| match turn.sender_kind() {
            SenderKind::Responder(id) => Some(id),
            _ => None,
        })
}

fn find_match<'a>(haystack: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|needle| haystack.contains(needle.as_str()))
        .map(String::as_str)
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn normalize(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course_history() -> Vec<Turn> {
        vec![
            Turn::user("What courses should I take for computer science?"),
            Turn::responder(
                ResponderId::CourseAdvisor,
                "I recommend CS320 and STAT210 for data science foundations...",
            ),
        ]
    }

    fn poet_history() -> Vec<Turn> {
        vec![
            Turn::user("Write me a haiku about campus life"),
            Turn::responder(
                ResponderId::UniversityPoet,
                "Students gather here\nKnowledge flows like autumn leaves\nWisdom takes its root",
            ),
        ]
    }

    fn schedule_history() -> Vec<Turn> {
        vec![
            Turn::user("When is registration?"),
            Turn::responder(
                ResponderId::SchedulingAssistant,
                "Registration closes on August 25.",
            ),
        ]
    }

    #[test]
    fn test_greeting_routes_to_triage() {
        let router = Router::default();
        assert_eq!(
            router.classify(&[], "Hello, how are you?"),
            ResponderId::TriageAgent
        );
    }

    #[test]
    fn test_empty_and_whitespace_query() {
        let router = Router::default();
        assert_eq!(router.classify(&[], ""), ResponderId::TriageAgent);
        assert_eq!(
            router.classify(&course_history(), "   \t "),
            ResponderId::TriageAgent
        );
        assert_eq!(router.decide(&[], "").reason, RouteReason::Default);
    }

    #[test]
    fn test_poetry_overrides_any_history() {
        let router = Router::default();
        let histories = [vec![], course_history(), poet_history(), schedule_history()];
        for history in &histories {
            for query in [
                "Write me a haiku about campus life",
                "a poem about the cafeteria please",
                "I love poetry",
                "one more verse",
                "compose a limerick",
            ] {
                assert_eq!(
                    router.classify(history, query),
                    ResponderId::UniversityPoet,
                    "query: {query}"
                );
            }
        }
    }

    #[test]
    fn test_poetry_beats_course_keywords() {
        let router = Router::default();
        assert_eq!(
            router.classify(&[], "Write a poem about my computer science class"),
            ResponderId::UniversityPoet
        );
    }

    #[test]
    fn test_course_beats_schedule() {
        let router = Router::default();
        let decision = router.decide(&[], "When is the data science course exam?");
        assert_eq!(decision.responder, ResponderId::CourseAdvisor);
        assert!(matches!(
            decision.reason,
            RouteReason::Keyword {
                category: IntentCategory::Course,
                ..
            }
        ));
    }

    #[test]
    fn test_course_queries() {
        let router = Router::default();
        for query in [
            "What courses should I take next semester if I'm interested in data science?",
            "Can you recommend something for machine learning?",
            "Tell me about CS320",
            "what should I take as a freshman?",
        ] {
            assert_eq!(
                router.classify(&[], query),
                ResponderId::CourseAdvisor,
                "query: {query}"
            );
        }
    }

    #[test]
    fn test_schedule_queries() {
        let router = Router::default();
        for query in [
            "When do exams start this semester?",
            "What's the registration deadline?",
            "Show me the calendar",
        ] {
            assert_eq!(
                router.classify(&[], query),
                ResponderId::SchedulingAssistant,
                "query: {query}"
            );
        }
    }

    #[test]
    fn test_schedule_keyword_wins_over_carryover() {
        let router = Router::default();
        let decision = router.decide(&schedule_history(), "When do exams start?");
        assert_eq!(decision.responder, ResponderId::SchedulingAssistant);
        assert!(matches!(decision.reason, RouteReason::Keyword { .. }));

        // Same outcome when the previous specialist was someone else
        assert_eq!(
            router.classify(&course_history(), "When do exams start?"),
            ResponderId::SchedulingAssistant
        );
    }

    #[test]
    fn test_follow_up_phrase_stays_with_course_advisor() {
        let router = Router::default();
        let decision = router.decide(&course_history(), "What about electives?");
        assert_eq!(decision.responder, ResponderId::CourseAdvisor);
        assert_eq!(
            decision.reason,
            RouteReason::FollowUp {
                phrase: "what about".to_string()
            }
        );
    }

    #[test]
    fn test_follow_up_with_requirements() {
        let router = Router::default();
        let history = vec![
            Turn::user("What are the prerequisites for data science?"),
            Turn::responder(
                ResponderId::CourseAdvisor,
                "For data science, you need MATH210, CS250, and STAT210 as prerequisites...",
            ),
        ];
        assert_eq!(
            router.classify(&history, "Tell me more about those requirements"),
            ResponderId::CourseAdvisor
        );
    }

    #[test]
    fn test_write_another_one_regression() {
        // No poetry keyword is present; "it" is a substring of "write", so the
        // six-word query is carried over by the pronoun heuristic.
        let router = Router::default();
        let decision = router.decide(&poet_history(), "Write another one about the library");
        assert_eq!(decision.responder, ResponderId::UniversityPoet);
        assert_eq!(
            decision.reason,
            RouteReason::Pronoun {
                pronoun: "it".to_string()
            }
        );

        // Without a preceding specialist the same query is a general one
        assert_eq!(
            router.classify(&[], "Write another one about the library"),
            ResponderId::TriageAgent
        );
    }

    #[test]
    fn test_pronoun_heuristic_word_limit() {
        let router = Router::default();
        assert_eq!(
            router.classify(&course_history(), "is this one hard?"),
            ResponderId::CourseAdvisor
        );
        assert_eq!(
            router.classify(
                &course_history(),
                "could you please go over this once more for me again"
            ),
            ResponderId::TriageAgent
        );
    }

    #[test]
    fn test_no_carryover_from_triage() {
        let router = Router::default();
        let history = vec![
            Turn::user("hi"),
            Turn::responder(ResponderId::TriageAgent, "Hello! How can I help?"),
        ];
        assert_eq!(
            router.classify(&history, "tell me more about it"),
            ResponderId::TriageAgent
        );
    }

    #[test]
    fn test_no_carryover_without_signal() {
        let router = Router::default();
        assert_eq!(
            router.classify(&course_history(), "thanks!"),
            ResponderId::TriageAgent
        );
    }

    #[test]
    fn test_carryover_skips_tool_and_user_turns() {
        let router = Router::default();
        let mut history = course_history();
        history.push(Turn::new("tool", r#"{"name":"course_lookup"}"#));
        history.push(Turn::new("You", "hmm"));
        assert_eq!(
            router.classify(&history, "what about electives?"),
            ResponderId::CourseAdvisor
        );
    }

    #[test]
    fn test_carryover_skips_malformed_turns() {
        let router = Router::default();
        let mut history = course_history();
        history.push(Turn::new("", "no sender"));
        history.push(Turn::new("Router Agent", "Course Advisor"));
        history.push(Turn::new(ResponderId::UniversityPoet.as_str(), "   "));
        assert_eq!(last_responder(&history), Some(ResponderId::CourseAdvisor));
        assert_eq!(
            router.classify(&history, "what about electives?"),
            ResponderId::CourseAdvisor
        );
    }

    #[test]
    fn test_history_file_with_null_fields_routes() {
        let history: Vec<Turn> = serde_json::from_str(
            r#"[
                {"sender": "user", "text": "Which data science courses?"},
                {"sender": "Course Advisor", "text": "Try CS320 and STAT210."},
                {"sender": null, "text": "stray"},
                {"sender": "University Poet", "text": null}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            Router::default().classify(&history, "what about electives?"),
            ResponderId::CourseAdvisor
        );
    }

    #[test]
    fn test_last_responder_is_most_recent() {
        let mut history = course_history();
        history.extend(poet_history());
        assert_eq!(last_responder(&history), Some(ResponderId::UniversityPoet));
        assert_eq!(last_responder(&[]), None);
        assert_eq!(last_responder(&[Turn::user("hello")]), None);
    }

    #[test]
    fn test_classify_is_idempotent() {
        let router = Router::default();
        let history = course_history();
        let before = history.clone();
        let first = router.decide(&history, "what about it?");
        let second = router.decide(&history, "what about it?");
        assert_eq!(first, second);
        assert_eq!(history.len(), before.len());
        assert_eq!(history[1].text, before[1].text);
    }

    #[test]
    fn test_case_insensitive() {
        let router = Router::default();
        assert_eq!(router.classify(&[], "HAIKU PLEASE"), ResponderId::UniversityPoet);
        assert_eq!(
            router.classify(&[], "Data Science Electives"),
            ResponderId::CourseAdvisor
        );
    }

    #[test]
    fn test_custom_tables() {
        let tables = RoutingTables {
            poetry_keywords: vec!["  Sonnet ".to_string(), "".to_string()],
            course_keywords: vec!["elective".to_string()],
            schedule_keywords: vec![],
            follow_up_phrases: vec![],
            pronouns: vec!["it".to_string()],
            max_follow_up_words: 2,
        };
        let router = Router::new(tables);
        assert_eq!(router.tables().poetry_keywords, vec!["sonnet".to_string()]);
        assert_eq!(router.classify(&[], "a SONNET"), ResponderId::UniversityPoet);
        assert_eq!(router.classify(&[], "electives?"), ResponderId::CourseAdvisor);
        // "haiku" is no longer a keyword and nothing else matches
        assert_eq!(router.classify(&[], "haiku"), ResponderId::TriageAgent);
        assert_eq!(router.classify(&course_history(), "explain it"), ResponderId::CourseAdvisor);
        assert_eq!(
            router.classify(&course_history(), "explain it again"),
            ResponderId::TriageAgent
        );
    }

    #[test]
    fn test_tables_deserialize_partial() {
        let tables: RoutingTables = toml::from_str("max_follow_up_words = 5").unwrap();
        assert_eq!(tables.max_follow_up_words, 5);
        assert_eq!(tables.poetry_keywords, RoutingTables::default().poetry_keywords);
    }
}
