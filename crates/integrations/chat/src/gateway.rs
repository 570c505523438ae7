use async_trait::async_trait;
use chrono::{DateTime, Utc};

use triage_core::GroupId;

use crate::error::ChatError;

/// Request to create a responder group.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    /// Display name.
    pub name: String,
    /// Group description.
    pub description: String,
    /// Member addresses to resolve and add. Unresolvable addresses are
    /// skipped; at least one must resolve.
    pub members: Vec<String>,
    /// Owner address.
    pub owner: String,
}

/// A group returned by [`ChatGateway::list_groups`].
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub group_id: GroupId,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// Trait adapting the chat platform's API to internal types.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Create a group with the resolved members. Fails with
    /// [`ChatError::NoMembersResolved`] when every address is unresolvable.
    async fn create_group(&self, spec: &GroupSpec) -> Result<GroupId, ChatError>;

    /// Post an HTML message into the group's primary channel. Waits for
    /// provisioning (bounded poll) after group creation; surfaces
    /// [`ChatError::PartialProvisioning`] when the group never becomes
    /// message-ready.
    async fn post_message(&self, group_id: &GroupId, html_body: &str) -> Result<(), ChatError>;

    /// List groups whose display name starts with `prefix`.
    async fn list_groups(&self, prefix: &str) -> Result<Vec<GroupSummary>, ChatError>;
}
