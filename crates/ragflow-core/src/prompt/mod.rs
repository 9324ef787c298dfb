//! Prompt template loading and rendering
//!
//! Templates are YAML assets with `system` and `user` handlebars bodies.
//! A template is parsed and compiled once at startup; rendering is a pure
//! function of the question, retrieved documents, and chat history.

use crate::error::{RagFlowError, Result};
use crate::pipeline::ChatTurn;
use crate::search::RetrievedDocument;
use handlebars::Handlebars;
use serde::Deserialize;
use std::path::Path;

/// Built-in chat template shipped with the crate
const DEFAULT_CHAT_TEMPLATE: &str = include_str!("chat.yaml");

/// Rendered system/user prompt pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Deserialize)]
struct TemplateSpec {
    name: String,
    #[serde(default)]
    #[allow(dead_code)]
    description: String,
    system: String,
    user: String,
}

/// Compiled prompt template
#[derive(Debug)]
pub struct PromptTemplate {
    registry: Handlebars<'static>,
    name: String,
}

impl PromptTemplate {
    /// Parse and compile a template from its YAML source.
    ///
    /// Any parse or compile failure here is a startup error; rendering
    /// cannot fail on template syntax afterwards.
    pub fn from_source(source: &str) -> Result<Self> {
        let spec: TemplateSpec = serde_yaml::from_str(source)
            .map_err(|e| RagFlowError::Template(format!("invalid template frontmatter: {e}")))?;

        let mut registry = Handlebars::new();
        // Prompts are plain text for the model, not HTML.
        registry.register_escape_fn(handlebars::no_escape);
        registry
            .register_template_string("system", &spec.system)
            .map_err(|e| RagFlowError::Template(format!("system template: {e}")))?;
        registry
            .register_template_string("user", &spec.user)
            .map_err(|e| RagFlowError::Template(format!("user template: {e}")))?;

        Ok(Self {
            registry,
            name: spec.name,
        })
    }

    /// Load a template asset from disk
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            RagFlowError::Template(format!("cannot read template {}: {e}", path.display()))
        })?;
        Self::from_source(&source)
    }

    /// The built-in chat template
    pub fn default_chat() -> Result<Self> {
        Self::from_source(DEFAULT_CHAT_TEMPLATE)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the prompt. Pure: identical inputs yield identical output,
    /// and document order is preserved into the prompt text.
    pub fn render(
        &self,
        question: &str,
        documents: &[RetrievedDocument],
        history: &[ChatTurn],
    ) -> Result<RenderedPrompt> {
        let values = serde_json::json!({
            "question": question,
            "documents": documents,
            "history": history,
        });

        let system = self
            .registry
            .render("system", &values)
            .map_err(|e| RagFlowError::Template(e.to_string()))?;
        let user = self
            .registry
            .render("user", &values)
            .map_err(|e| RagFlowError::Template(e.to_string()))?;

        Ok(RenderedPrompt { system, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, title: &str) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            title: title.to_string(),
            content: format!("content of {title}"),
            url: format!("https://docs.example/{id}"),
        }
    }

    #[test]
    fn default_template_compiles() {
        let template = PromptTemplate::default_chat().unwrap();
        assert_eq!(template.name(), "chat");
    }

    #[test]
    fn render_is_deterministic() {
        let template = PromptTemplate::default_chat().unwrap();
        let docs = vec![doc("1", "Records"), doc("2", "Billing")];
        let history = vec![ChatTurn {
            question: "hi".into(),
            answer: "hello".into(),
        }];

        let first = template.render("How do I sign up?", &docs, &history).unwrap();
        let second = template.render("How do I sign up?", &docs, &history).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn documents_appear_in_retriever_order() {
        let template = PromptTemplate::default_chat().unwrap();
        let docs = vec![doc("1", "Alpha"), doc("2", "Beta"), doc("3", "Gamma")];
        let rendered = template.render("q", &docs, &[]).unwrap();

        let alpha = rendered.system.find("Alpha").unwrap();
        let beta = rendered.system.find("Beta").unwrap();
        let gamma = rendered.system.find("Gamma").unwrap();
        assert!(alpha < beta && beta < gamma);
    }

    #[test]
    fn empty_document_list_renders() {
        let template = PromptTemplate::default_chat().unwrap();
        let rendered = template.render("q", &[], &[]).unwrap();
        assert!(rendered.user.contains('q'));
    }

    #[test]
    fn history_turns_render_in_order() {
        let template = PromptTemplate::default_chat().unwrap();
        let history = vec![
            ChatTurn {
                question: "first question".into(),
                answer: "first answer".into(),
            },
            ChatTurn {
                question: "second question".into(),
                answer: "second answer".into(),
            },
        ];
        let rendered = template.render("now", &[], &history).unwrap();
        let first = rendered.user.find("first question").unwrap();
        let second = rendered.user.find("second question").unwrap();
        assert!(first < second);
    }

    #[test]
    fn special_characters_render_verbatim() {
        let template = PromptTemplate::default_chat().unwrap();
        let mut coverage = doc("1", "Coverage");
        coverage.content = r#"See the "member portal" <https://portal.example> for A&B plans"#.into();

        let rendered = template.render("Is A&B covered?", &[coverage], &[]).unwrap();
        assert!(rendered.user.contains("Is A&B covered?"));
        assert!(rendered
            .system
            .contains(r#"See the "member portal" <https://portal.example> for A&B plans"#));
        assert!(!rendered.system.contains("&amp;"));
        assert!(!rendered.system.contains("&lt;"));
    }

    #[test]
    fn malformed_template_fails_at_load() {
        let err = PromptTemplate::from_source("system: |\n  {{#each}}").unwrap_err();
        assert!(matches!(err, RagFlowError::Template(_)));
    }
}
