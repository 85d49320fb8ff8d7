//! Distillation of raw text into atomic, classified units
//!
//! One schema-constrained model call per document. Failures never escape:
//! a bad or missing reply means "nothing to ingest", with the reason kept
//! for the caller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::llm::StructuredOutput;

use super::metadata::SourceContext;

/// Source type of an already-structured multi-turn briefing dialogue
pub const COMPLETE_BRIEFING_SOURCE_TYPE: &str = "strategic-briefing-complete";

/// `dialogue_format` recorded on complete briefing units
pub const STRUCTURED_COMPLETE_FORMAT: &str = "structured_complete";

/// Placeholder replaced with the raw text in the instruction template
pub const SOURCE_DATA_PLACEHOLDER: &str = "{source_data}";

const DISTILL_USER_PROMPT: &str = "Distill the text into the required JSON format.";

/// Default instruction template
pub const DEFAULT_DISTILLATION_TEMPLATE: &str = r#"You are an intelligence analyst who turns raw source material into atomic knowledge units.

Split the source below into self-contained units. Each unit must carry exactly one idea, fact or event, and must make sense when read on its own. Drop boilerplate such as navigation text, advertising, cookie notices and author bios.

For every unit provide:
- title: a short headline
- content: the unit's full text, rewritten only as much as needed to stand alone
- ai_summary: one sentence summarising the unit
- doc_type: what kind of material this is (e.g. news, analysis, opinion, data, interview)
- categories: a few broad subject categories
- key_entities: companies, people, places, institutions and commodities named in the unit, spelled as they would appear in a headline

If the source holds nothing worth keeping, return an empty list.

SOURCE:
{source_data}"#;

/// One distilled unit of knowledge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomicUnit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub ai_summary: String,
    #[serde(default)]
    pub doc_type: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub key_entities: Vec<String>,
    #[serde(skip)]
    pub dialogue_format: Option<String>,
    #[serde(skip)]
    pub session_length: Option<u32>,
}

impl AtomicUnit {
    /// Whole-text unit for a complete briefing dialogue
    pub fn complete_briefing(text: impl Into<String>, session_length: u32) -> Self {
        Self {
            content: text.into(),
            doc_type: "briefing".to_string(),
            dialogue_format: Some(STRUCTURED_COMPLETE_FORMAT.to_string()),
            session_length: Some(session_length),
            ..Default::default()
        }
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// Why a document produced no units
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum NoUnitsReason {
    EmptyInput,
    ModelFailed(String),
    ModelReturnedNone,
}

impl std::fmt::Display for NoUnitsReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "no nodes found: input text is empty"),
            Self::ModelFailed(e) => write!(f, "no nodes found: distillation failed ({})", e),
            Self::ModelReturnedNone => write!(f, "no nodes found"),
        }
    }
}

/// Outcome of distilling one document
#[derive(Debug, Clone, PartialEq)]
pub enum Distillation {
    Units(Vec<AtomicUnit>),
    Nothing(NoUnitsReason),
}

impl Distillation {
    pub fn into_units(self) -> Vec<AtomicUnit> {
        match self {
            Self::Units(units) => units,
            Self::Nothing(_) => Vec::new(),
        }
    }
}

/// JSON Schema the distillation reply must satisfy
pub fn distillation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "classified_nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "content": {"type": "string"},
                        "ai_summary": {"type": "string"},
                        "doc_type": {"type": "string"},
                        "categories": {"type": "array", "items": {"type": "string"}},
                        "key_entities": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["title", "content", "ai_summary", "doc_type", "categories", "key_entities"]
                }
            }
        },
        "required": ["classified_nodes"]
    })
}

#[derive(Deserialize)]
struct DistillationReply {
    classified_nodes: Vec<AtomicUnit>,
}

/// Splits raw text into atomic units through a structured model call
#[derive(Clone)]
pub struct Distiller {
    model: Arc<dyn StructuredOutput>,
    template: String,
}

impl Distiller {
    pub fn new(model: Arc<dyn StructuredOutput>) -> Self {
        Self {
            model,
            template: DEFAULT_DISTILLATION_TEMPLATE.to_string(),
        }
    }

    /// Replace the instruction template; it must contain `{source_data}`
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn render_prompt(&self, raw_text: &str) -> String {
        self.template.replacen(SOURCE_DATA_PLACEHOLDER, raw_text, 1)
    }

    /// Distill `raw_text`, honouring the complete-briefing bypass
    pub async fn distill(&self, raw_text: &str, context: &SourceContext) -> Distillation {
        if raw_text.trim().is_empty() {
            return Distillation::Nothing(NoUnitsReason::EmptyInput);
        }

        if context.source_type() == COMPLETE_BRIEFING_SOURCE_TYPE {
            info!("Complete briefing kept as a single unit");
            return Distillation::Units(vec![AtomicUnit::complete_briefing(
                raw_text,
                context.session_length.unwrap_or(0),
            )]);
        }

        let system_prompt = self.render_prompt(raw_text);
        let schema = distillation_schema();

        let reply = match self
            .model
            .generate_structured(Some(&system_prompt), DISTILL_USER_PROMPT, &schema)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, code = e.code(), "Distillation call failed");
                return Distillation::Nothing(NoUnitsReason::ModelFailed(e.to_string()));
            }
        };

        let units = match serde_json::from_value::<DistillationReply>(reply) {
            Ok(parsed) => parsed.classified_nodes,
            Err(e) => {
                warn!(error = %e, "Distillation reply could not be decoded");
                return Distillation::Nothing(NoUnitsReason::ModelFailed(e.to_string()));
            }
        };

        if units.is_empty() {
            info!("Distiller found nothing worth keeping");
            return Distillation::Nothing(NoUnitsReason::ModelReturnedNone);
        }

        info!(units = units.len(), "Distilled text into atomic units");
        Distillation::Units(units)
    }
}
