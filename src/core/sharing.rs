//! Sharing scopes for assistant configs and templates.
//!
//! Owned items are always visible to their owner; shared items are visible
//! to others when the requesting context falls inside the item's context
//! level and the current time is inside the sharing window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How far a shared item is visible beyond its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    /// Visible only inside one activity instance.
    Activity,
    /// Visible across one course.
    Course,
    /// Visible across one course category.
    Category,
    /// Visible everywhere.
    Site,
}

impl ContextLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextLevel::Activity => "activity",
            ContextLevel::Course => "course",
            ContextLevel::Category => "category",
            ContextLevel::Site => "site",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "activity" => Some(ContextLevel::Activity),
            "course" => Some(ContextLevel::Course),
            "category" => Some(ContextLevel::Category),
            "site" => Some(ContextLevel::Site),
            _ => None,
        }
    }
}

/// Where a request is being made from. Built from the activity row.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub activity_id: String,
    pub course_id: String,
    pub course_category_id: String,
}

/// Rows that carry owner + context level + sharing window columns.
pub trait Shareable {
    fn owner_id(&self) -> &str;
    fn context_level(&self) -> &str;
    fn context_id(&self) -> &str;
    fn shared_from(&self) -> Option<&str>;
    fn shared_until(&self) -> Option<&str>;

    /// Visibility check for `user` in `ctx` at `now`. Unset window ends are
    /// unbounded.
    fn is_visible_to(&self, user_id: &str, ctx: &RequestContext, now: DateTime<Utc>) -> bool {
        if self.owner_id() == user_id {
            return true;
        }

        let in_scope = match ContextLevel::parse(self.context_level()) {
            Some(ContextLevel::Site) => true,
            Some(ContextLevel::Category) => self.context_id() == ctx.course_category_id,
            Some(ContextLevel::Course) => self.context_id() == ctx.course_id,
            Some(ContextLevel::Activity) => self.context_id() == ctx.activity_id,
            None => false,
        };
        if !in_scope {
            return false;
        }

        let after_start = match self.shared_from().and_then(parse_rfc3339) {
            Some(from) => now >= from,
            None => true,
        };
        let before_end = match self.shared_until().and_then(parse_rfc3339) {
            Some(until) => now <= until,
            None => true,
        };
        after_start && before_end
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

macro_rules! impl_shareable {
    ($record:ty) => {
        impl Shareable for $record {
            fn owner_id(&self) -> &str {
                &self.owner_id
            }
            fn context_level(&self) -> &str {
                &self.context_level
            }
            fn context_id(&self) -> &str {
                &self.context_id
            }
            fn shared_from(&self) -> Option<&str> {
                self.shared_from.as_deref()
            }
            fn shared_until(&self) -> Option<&str> {
                self.shared_until.as_deref()
            }
        }
    };
}

impl_shareable!(crate::database::models::AssistantConfigRecord);
impl_shareable!(crate::database::models::PromptTemplateRecord);
impl_shareable!(crate::database::models::FormatTemplateRecord);
