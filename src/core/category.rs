//! Category resolution.
//!
//! A composable naming policy turns one unit's context into an ordered path
//! of category names under the parent, least to most specific. Creation is
//! idempotent: the storage layer's insert-or-get guarantees the same inputs
//! always land on the same node.

use serde::{Deserialize, Serialize};

use crate::core::error::{GenError, Result};
use crate::core::generation::types::{QuestionType, VocabLevel};
use crate::database::{CategoryOps, Database};

// ============================================================================
// Policy
// ============================================================================

/// Bit-flag naming policy for subcategories under the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubcatPolicy(pub u32);

impl SubcatPolicy {
    pub const NONE: SubcatPolicy = SubcatPolicy(0);
    /// Explicit custom name.
    pub const CUSTOM: SubcatPolicy = SubcatPolicy(1 << 0);
    pub const COURSE: SubcatPolicy = SubcatPolicy(1 << 1);
    pub const SECTION: SubcatPolicy = SubcatPolicy(1 << 2);
    pub const ACTIVITY: SubcatPolicy = SubcatPolicy(1 << 3);
    /// First word of the prompt template's name.
    pub const PROMPT_HEAD: SubcatPolicy = SubcatPolicy(1 << 4);
    /// Last word of the prompt template's name.
    pub const PROMPT_TAIL: SubcatPolicy = SubcatPolicy(1 << 5);
    pub const WORD: SubcatPolicy = SubcatPolicy(1 << 6);
    pub const QUESTION_TYPE: SubcatPolicy = SubcatPolicy(1 << 7);
    pub const LEVEL: SubcatPolicy = SubcatPolicy(1 << 8);

    pub fn contains(&self, other: SubcatPolicy) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for SubcatPolicy {
    type Output = SubcatPolicy;
    fn bitor(self, rhs: SubcatPolicy) -> SubcatPolicy {
        SubcatPolicy(self.0 | rhs.0)
    }
}

// ============================================================================
// Context and path computation
// ============================================================================

/// Contextual values a policy may draw names from.
#[derive(Debug, Clone, Default)]
pub struct CategoryContext {
    pub custom_name: Option<String>,
    pub course_name: String,
    pub section_name: String,
    pub activity_name: String,
    pub prompt_name: String,
    pub word: String,
    pub question_type: Option<QuestionType>,
    pub level: Option<VocabLevel>,
}

/// Compute the ordered subcategory path for `policy`, least to most
/// specific. Empty for `SubcatPolicy::NONE`.
///
/// WORD, QUESTION_TYPE and LEVEL compose a running label so that
/// word="apple", type=multichoice yields `["apple", "apple (multichoice)"]`.
pub fn category_path(policy: SubcatPolicy, ctx: &CategoryContext) -> Vec<String> {
    let mut path = Vec::new();

    if policy.contains(SubcatPolicy::CUSTOM) {
        if let Some(name) = ctx.custom_name.as_deref() {
            if !name.trim().is_empty() {
                path.push(name.trim().to_string());
            }
        }
    }
    if policy.contains(SubcatPolicy::COURSE) && !ctx.course_name.is_empty() {
        path.push(ctx.course_name.clone());
    }
    if policy.contains(SubcatPolicy::SECTION) && !ctx.section_name.is_empty() {
        path.push(ctx.section_name.clone());
    }
    if policy.contains(SubcatPolicy::ACTIVITY) && !ctx.activity_name.is_empty() {
        path.push(ctx.activity_name.clone());
    }
    if policy.contains(SubcatPolicy::PROMPT_HEAD) {
        if let Some(head) = ctx.prompt_name.split_whitespace().next() {
            path.push(head.to_string());
        }
    }
    if policy.contains(SubcatPolicy::PROMPT_TAIL) {
        if let Some(tail) = ctx.prompt_name.split_whitespace().last() {
            path.push(tail.to_string());
        }
    }

    // Running label: each selected dimension refines the previous one and
    // contributes its own level in the tree.
    let mut label = String::new();
    if policy.contains(SubcatPolicy::WORD) && !ctx.word.is_empty() {
        label = ctx.word.clone();
        path.push(label.clone());
    }
    if policy.contains(SubcatPolicy::QUESTION_TYPE) {
        if let Some(qtype) = ctx.question_type {
            label = if label.is_empty() {
                qtype.to_string()
            } else {
                format!("{label} ({qtype})")
            };
            path.push(label.clone());
        }
    }
    if policy.contains(SubcatPolicy::LEVEL) {
        if let Some(level) = ctx.level {
            label = if label.is_empty() {
                level.to_string()
            } else {
                format!("{label} ({level})")
            };
            path.push(label);
        }
    }

    path
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolve the target category for a unit: verify the parent exists, then
/// walk the computed path creating missing nodes in order. Returns the leaf
/// category id (the parent itself for `NONE`).
pub async fn resolve_category(
    db: &Database,
    parent_id: &str,
    policy: SubcatPolicy,
    ctx: &CategoryContext,
) -> Result<String> {
    let parent = db
        .get_category(parent_id)
        .await?
        .ok_or_else(|| GenError::Config(format!("parent category {parent_id} does not exist")))?;

    let mut current = parent.id;
    for name in category_path(policy, ctx) {
        current = db.find_or_create_child(&current, &name).await?.id;
    }
    Ok(current)
}
