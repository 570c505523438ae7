use std::sync::Mutex;

use async_trait::async_trait;

use triage_core::GroupId;

use crate::error::ChatError;
use crate::gateway::{ChatGateway, GroupSpec, GroupSummary};

/// A group created through the mock.
#[derive(Debug, Clone)]
pub struct CreatedGroup {
    pub group_id: GroupId,
    pub name: String,
    pub description: String,
    pub members: Vec<String>,
    pub owner: String,
}

#[derive(Default)]
struct Inner {
    groups: Vec<CreatedGroup>,
    messages: Vec<(GroupId, String)>,
    fail_create_with: Option<String>,
    fail_post_with: Option<String>,
    next_id: u64,
}

/// In-memory [`ChatGateway`] for pipeline tests.
#[derive(Default)]
pub struct MockChatGateway {
    inner: Mutex<Inner>,
}

impl MockChatGateway {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `create_group` fail with a transient error.
    pub fn fail_creates(&self, message: impl Into<String>) {
        self.lock().fail_create_with = Some(message.into());
    }

    /// Make every `post_message` fail with a transient error.
    pub fn fail_posts(&self, message: impl Into<String>) {
        self.lock().fail_post_with = Some(message.into());
    }

    /// Groups created so far.
    pub fn created_groups(&self) -> Vec<CreatedGroup> {
        self.lock().groups.clone()
    }

    /// Messages posted so far.
    pub fn posted_messages(&self) -> Vec<(GroupId, String)> {
        self.lock().messages.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("mock chat lock poisoned")
    }
}

#[async_trait]
impl ChatGateway for MockChatGateway {
    async fn create_group(&self, spec: &GroupSpec) -> Result<GroupId, ChatError> {
        let mut inner = self.lock();
        if let Some(ref msg) = inner.fail_create_with {
            return Err(ChatError::Transient(msg.clone()));
        }
        if spec.members.is_empty() {
            return Err(ChatError::NoMembersResolved);
        }
        inner.next_id += 1;
        let group_id = GroupId::new(format!("group-{}", inner.next_id));
        inner.groups.push(CreatedGroup {
            group_id: group_id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            members: spec.members.clone(),
            owner: spec.owner.clone(),
        });
        Ok(group_id)
    }

    async fn post_message(&self, group_id: &GroupId, html_body: &str) -> Result<(), ChatError> {
        let mut inner = self.lock();
        if let Some(ref msg) = inner.fail_post_with {
            return Err(ChatError::Transient(msg.clone()));
        }
        inner
            .messages
            .push((group_id.clone(), html_body.to_owned()));
        Ok(())
    }

    async fn list_groups(&self, prefix: &str) -> Result<Vec<GroupSummary>, ChatError> {
        let inner = self.lock();
        Ok(inner
            .groups
            .iter()
            .filter(|g| g.name.starts_with(prefix))
            .map(|g| GroupSummary {
                group_id: g.group_id.clone(),
                name: g.name.clone(),
                created_at: None,
                description: Some(g.description.clone()),
            })
            .collect())
    }
}
