//! Tool registry, executors and the two knowledge tools

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::knowledge::KnowledgeBase;
use crate::providers::ToolDefinition;
use crate::registry::ResponderProfile;

pub const COURSE_LOOKUP_TOOL: &str = "course_lookup";
pub const ACADEMIC_CALENDAR_TOOL: &str = "academic_calendar";

/// Executes tools by name
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// A single tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Registry of available tools
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `course_lookup` and `academic_calendar`
    pub fn with_knowledge(knowledge: Arc<KnowledgeBase>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CourseLookupTool::new(knowledge.clone())));
        registry.register(Arc::new(AcademicCalendarTool::new(knowledge)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        debug!("Registering tool: {}", name);
        self.tools.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executor limited to the tools `profile` lists; other names are reported as unknown
    pub fn scoped<'a>(&'a self, profile: &'a ResponderProfile) -> ScopedTools<'a> {
        ScopedTools {
            registry: self,
            profile,
        }
    }

    /// Definitions for the named tools, in the order given
    pub fn filter_tools(&self, names: &[String]) -> Vec<ToolDefinition> {
        names
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| handler.definition())
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        debug!("Executing tool: {} with input: {}", tool_name, input);

        let handler = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self.tools.values().map(|h| h.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// View of a [`ToolRegistry`] restricted to one responder's tool set
pub struct ScopedTools<'a> {
    registry: &'a ToolRegistry,
    profile: &'a ResponderProfile,
}

#[async_trait]
impl ToolExecutor for ScopedTools<'_> {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        if !self.profile.is_tool_allowed(tool_name) {
            warn!("Tool {} is not available to {}", tool_name, self.profile.id);
            return Err(anyhow!("Unknown tool: {}", tool_name));
        }
        self.registry.execute(tool_name, input).await
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.filter_tools(&self.profile.tools)
    }
}

/// JSON schema object for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn default_topic() -> String {
    "data science".to_string()
}

fn default_level() -> String {
    "undergrad".to_string()
}

fn default_limit() -> usize {
    4
}

#[derive(Debug, Deserialize)]
struct CourseLookupInput {
    #[serde(default = "default_topic")]
    topic: String,
    #[serde(default = "default_level")]
    level: String,
    #[serde(default = "default_limit")]
    limit: usize,
}

/// Recommends courses by topic and level
pub struct CourseLookupTool {
    knowledge: Arc<KnowledgeBase>,
}

impl CourseLookupTool {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl ToolHandler for CourseLookupTool {
    fn name(&self) -> &str {
        COURSE_LOOKUP_TOOL
    }

    fn description(&self) -> &str {
        "Find recommended courses for a topic and level. Returns matching courses with \
         code, title and why to take them."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "topic": {
                    "type": "string",
                    "description": "Subject area, e.g. 'data science' (default: data science)"
                },
                "level": {
                    "type": "string",
                    "description": "Course level, e.g. 'undergrad' (default: undergrad)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of courses (default: 4)"
                }
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let args: CourseLookupInput = serde_json::from_value(input)
            .map_err(|e| anyhow!("Invalid course_lookup input: {}", e))?;
        let lookup = self
            .knowledge
            .lookup_courses(&args.topic, &args.level, args.limit);
        Ok(serde_json::to_string(&lookup)?)
    }
}

#[derive(Debug, Deserialize)]
struct CalendarInput {
    #[serde(default)]
    query: String,
}

/// Answers class time, exam and semester date questions
pub struct AcademicCalendarTool {
    knowledge: Arc<KnowledgeBase>,
}

impl AcademicCalendarTool {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl ToolHandler for AcademicCalendarTool {
    fn name(&self) -> &str {
        ACADEMIC_CALENDAR_TOOL
    }

    fn description(&self) -> &str {
        "Look up academic calendar facts: a course schedule when the query names a course \
         code, exam dates, course start dates, or the semester overview."
    }

    fn input_schema(&self) -> Value {
        json_schema(
            serde_json::json!({
                "query": {
                    "type": "string",
                    "description": "The scheduling question, including a course code if relevant"
                }
            }),
            vec![],
        )
    }

    async fn execute(&self, input: Value) -> Result<String> {
        let args: CalendarInput = serde_json::from_value(input)
            .map_err(|e| anyhow!("Invalid academic_calendar input: {}", e))?;
        let facts = self.knowledge.lookup_calendar(&args.query);
        Ok(serde_json::to_string(&facts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ResponderRegistry;
    use crate::types::ResponderId;

    fn registry() -> ToolRegistry {
        ToolRegistry::with_knowledge(Arc::new(KnowledgeBase::default()))
    }

    #[tokio::test]
    async fn test_course_lookup_defaults() {
        let out = registry()
            .execute(COURSE_LOOKUP_TOOL, serde_json::json!({}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["count"], 4);
        assert_eq!(value["recommendations"][0]["code"], "CS320");
    }

    #[tokio::test]
    async fn test_course_lookup_with_args() {
        let out = registry()
            .execute(
                COURSE_LOOKUP_TOOL,
                serde_json::json!({"topic": "humanities", "limit": 2}),
            )
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["recommendations"][0]["code"], "HUM101");
    }

    #[tokio::test]
    async fn test_course_lookup_rejects_bad_input() {
        let result = registry()
            .execute(COURSE_LOOKUP_TOOL, serde_json::json!({"limit": "lots"}))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_calendar_tool() {
        let out = registry()
            .execute(ACADEMIC_CALENDAR_TOOL, serde_json::json!({"query": "CS250"}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["course_code"], "CS250");
        assert_eq!(value["course_title"], "Data Wrangling");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = registry().execute("web_search", serde_json::json!({})).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scoped_executor_blocks_other_tools() {
        let registry = registry();
        let responders = ResponderRegistry::builtin();
        let scoped = registry.scoped(responders.get(ResponderId::CourseAdvisor));

        let defs = scoped.list_tools();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, COURSE_LOOKUP_TOOL);

        assert!(scoped
            .execute(COURSE_LOOKUP_TOOL, serde_json::json!({}))
            .await
            .is_ok());
        let err = scoped
            .execute(ACADEMIC_CALENDAR_TOOL, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_toolless_responder_sees_nothing() {
        let registry = registry();
        let responders = ResponderRegistry::builtin();
        let scoped = registry.scoped(responders.get(ResponderId::UniversityPoet));

        assert!(scoped.list_tools().is_empty());
        assert!(scoped
            .execute(COURSE_LOOKUP_TOOL, serde_json::json!({}))
            .await
            .is_err());
    }

    #[test]
    fn test_list_tools_sorted() {
        let names: Vec<String> = registry().list_tools().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![ACADEMIC_CALENDAR_TOOL, COURSE_LOOKUP_TOOL]);
        assert!(registry().filter_tools(&["nope".to_string()]).is_empty());
    }
}
