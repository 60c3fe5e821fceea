//! Prompt/format composition.
//!
//! Templates are plain text with `{{...}}` placeholders. Composition
//! substitutes the unit's word, question type, level, count and the output
//! format body; unknown placeholders pass through untouched so a template
//! author can see their own typos in the recorded prompt.

use serde::{Deserialize, Serialize};

use crate::core::generation::types::{QuestionType, VocabLevel};

/// Values available for substitution when composing one unit's prompt.
#[derive(Debug, Clone)]
pub struct ComposeContext<'a> {
    pub word: &'a str,
    pub question_type: QuestionType,
    pub level: VocabLevel,
    pub count: u32,
    /// Body of the selected format template.
    pub format: &'a str,
}

/// Substitute `{{name}}` tokens from `vars`, leaving unknown tokens intact.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        let token = format!("{{{{{name}}}}}");
        out = out.replace(&token, value);
    }
    out
}

/// Render a prompt template body against one unit's context.
pub fn compose(template: &str, ctx: &ComposeContext<'_>) -> String {
    let count = ctx.count.to_string();
    substitute(
        template,
        &[
            ("word", ctx.word),
            ("qtype", ctx.question_type.as_str()),
            ("questiontype", ctx.question_type.as_str()),
            ("level", ctx.level.as_str()),
            ("count", &count),
            ("format", ctx.format),
        ],
    )
}

/// Default AI-settings bindings stored on a prompt template, merged into a
/// generation request wherever the request leaves the field unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptDefaults {
    pub text_config_id: Option<String>,
    pub image_config_id: Option<String>,
    pub audio_config_id: Option<String>,
    pub video_config_id: Option<String>,
    pub format_id: Option<String>,
    pub question_types: Option<Vec<QuestionType>>,
    pub levels: Option<Vec<VocabLevel>>,
    pub count: Option<u32>,
    pub parent_category_id: Option<String>,
    pub subcat_policy: Option<u32>,
    pub subcat_name: Option<String>,
    pub review: Option<bool>,
    pub maxtries: Option<u32>,
}

impl PromptDefaults {
    /// Parse the JSON blob stored on the template row. An empty blob is an
    /// empty set of defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_known_tokens() {
        let out = substitute("define {{word}} at {{level}}", &[("word", "apple"), ("level", "A2")]);
        assert_eq!(out, "define apple at A2");
    }

    #[test]
    fn test_unknown_tokens_left_intact() {
        let out = substitute("hello {{nobody}}", &[("word", "apple")]);
        assert_eq!(out, "hello {{nobody}}");
    }

    #[test]
    fn test_compose_full_context() {
        let ctx = ComposeContext {
            word: "apple",
            question_type: QuestionType::MultiChoice,
            level: VocabLevel::A2,
            count: 3,
            format: "GIFT",
        };
        let out = compose(
            "Write {{count}} {{qtype}} questions about \"{{word}}\" ({{level}}) in {{format}} format.",
            &ctx,
        );
        assert_eq!(
            out,
            "Write 3 multichoice questions about \"apple\" (A2) in GIFT format."
        );
    }

    #[test]
    fn test_defaults_from_json() {
        let defaults = PromptDefaults::from_json(
            r#"{"count": 5, "review": true, "question_types": ["multichoice"]}"#,
        )
        .unwrap();
        assert_eq!(defaults.count, Some(5));
        assert_eq!(defaults.review, Some(true));
        assert_eq!(
            defaults.question_types,
            Some(vec![QuestionType::MultiChoice])
        );
        assert!(defaults.format_id.is_none());

        let empty = PromptDefaults::from_json("").unwrap();
        assert!(empty.count.is_none());
    }
}
