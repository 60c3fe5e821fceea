//! AI assistant configuration and dispatch.
//!
//! The registry resolves which stored backend config is active for a
//! capability; the providers module turns a validated config into a
//! concrete HTTP invoker through a static factory.

pub mod providers;
pub mod types;

pub use providers::{HttpInvokerFactory, InvokerFactory};
pub use types::{
    AiInvoker, AiOutcome, AiPayload, AiRequest, AssistantConfig, AudioParams, Capability,
    CapabilityParams, ImageParams, TextParams, VideoParams,
};

use chrono::{DateTime, Utc};

use crate::core::error::Result;
use crate::core::sharing::{RequestContext, Shareable};
use crate::database::{AssistantOps, Database};

/// Resolves the active assistant config per capability for a given user and
/// context.
#[derive(Clone)]
pub struct AssistantRegistry {
    db: Database,
}

impl AssistantRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Auto-select at most one config: the user's own newest in-scope
    /// config wins; otherwise the newest shared config whose context level
    /// and date window admit this request.
    pub async fn find_active(
        &self,
        capability: Capability,
        user_id: &str,
        ctx: &RequestContext,
        now: DateTime<Utc>,
    ) -> Result<Option<AssistantConfig>> {
        let records = self.db.list_configs_for_capability(capability.as_str()).await?;

        let mut shared = None;
        for record in &records {
            if record.owner_id == user_id {
                return AssistantConfig::from_record(record).map(Some);
            }
            if shared.is_none() && record.is_visible_to(user_id, ctx, now) {
                shared = Some(record);
            }
        }

        match shared {
            Some(record) => AssistantConfig::from_record(record).map(Some),
            None => Ok(None),
        }
    }
}
