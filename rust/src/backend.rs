//! Request/response collaborator contract.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::model::{ConversationPage, Message, Profile};

/// The authenticated request/response API the conversation screen talks to.
///
/// Page size is the implementation's business; an empty page means history is
/// exhausted. Requesting the same cursor twice must return the same page.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Newest page of a conversation, ascending or not (the stream sorts).
    async fn get_conversation_details(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<ConversationPage, BackendError>;

    /// Page `page_cursor` counted back from the newest page (0 = newest).
    async fn get_messages(
        &self,
        conversation_id: &str,
        page_cursor: u32,
    ) -> Result<Vec<Message>, BackendError>;

    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        viewer_id: &str,
    ) -> Result<Message, BackendError>;

    /// Mark every message visible to `viewer_id` as read.
    async fn mark_messages_as_read(
        &self,
        conversation_id: &str,
        viewer_id: &str,
    ) -> Result<(), BackendError>;

    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError>;
}
