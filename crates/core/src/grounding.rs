use crate::models::PaperMetadata;
use serde::{Deserialize, Serialize};

/// Phrase the assistant uses when an answer is not backed by the paper text.
pub const NOT_IN_PAPER: &str = "could not find this in the paper text";

const DEFAULT_TEMPLATE: &str = "\
You are a helpful AI research assistant.
You are currently discussing the following academic paper:

Title: {title}
Authors: {authors}
Published: {published}

Abstract:
{abstract}

Your goal is to help the user understand this paper.
Keep answers concise, technical where appropriate, and easy to read.
Format your responses using Markdown.";

/// System prompt with `{title}`, `{authors}`, `{published}` and `{abstract}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate(pub String);

impl Default for PromptTemplate {
    fn default() -> Self {
        Self(DEFAULT_TEMPLATE.to_string())
    }
}

impl PromptTemplate {
    pub fn render(&self, paper: &PaperMetadata) -> String {
        let authors = if paper.authors.is_empty() {
            "Unknown".to_string()
        } else {
            paper.authors.join(", ")
        };
        self.0
            .replace("{title}", &paper.title)
            .replace("{authors}", &authors)
            .replace("{published}", paper.published.as_deref().unwrap_or("Unknown"))
            .replace("{abstract}", paper.abstract_text.trim())
    }
}

/// Builds the chat system instruction. Non-blank `context` restricts the
/// assistant to the excerpts; otherwise it is restricted to the abstract
/// and told to say when the paper text was not consulted.
pub fn system_instruction(template: &PromptTemplate, paper: &PaperMetadata, context: Option<&str>) -> String {
    let mut instruction = template.render(paper);
    instruction.push_str("\n\n");

    match context.map(str::trim).filter(|context| !context.is_empty()) {
        Some(context) => {
            instruction.push_str(
                "Answer using only the paper excerpts below. Cite the [PAGE n] markers \
                 of the excerpts you rely on. If the excerpts do not contain the answer, \
                 say that they are insufficient instead of guessing.\n\n",
            );
            instruction.push_str("Paper excerpts:\n");
            instruction.push_str(context);
        }
        None => {
            instruction.push_str(&format!(
                "No excerpts from the full paper text are available. Answer using only the \
                 abstract and metadata above. If the question needs more than that, say you \
                 {NOT_IN_PAPER}."
            ));
        }
    }

    instruction
}
