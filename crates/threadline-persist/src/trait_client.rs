use async_trait::async_trait;
use threadline_types::{
    Message, MessageListParams, ParticipantUpdate, Thread, ThreadAccess, ThreadListParams,
    ThreadParticipant, ThreadShare, ThreadShareResponse, ThreadUpdate,
};

use crate::error::Result;
use crate::models::InviteAcceptance;

/// Trait for thread persistence operations
/// 
/// Implementations talk to the backend that owns threads, participants and
/// message history. Every call is authorized on behalf of the signed-in user.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    /// List threads visible to the user
    async fn list_threads(&self, params: &ThreadListParams) -> Result<Vec<Thread>>;
    
    /// Get a thread by ID
    async fn get_thread(&self, thread_id: &str) -> Result<Thread>;
    
    /// Create a new thread owned by the user
    async fn create_thread(&self, title: &str) -> Result<Thread>;
    
    async fn update_thread(&self, thread_id: &str, update: &ThreadUpdate) -> Result<Thread>;
    
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
    
    /// Message history, oldest first
    async fn list_messages(&self, thread_id: &str, params: &MessageListParams) -> Result<Vec<Message>>;
    
    /// Invite someone to the thread
    async fn share_thread(&self, thread_id: &str, share: &ThreadShare) -> Result<ThreadShareResponse>;
    
    /// Resolve the user's access to a thread, optionally through a share link
    async fn get_thread_access(&self, thread_id: &str, share_id: Option<&str>) -> Result<ThreadAccess>;
    
    async fn accept_invite(&self, thread_id: &str, share_id: &str) -> Result<InviteAcceptance>;
    
    async fn list_participants(&self, thread_id: &str) -> Result<Vec<ThreadParticipant>>;
    
    async fn update_participant(
        &self,
        thread_id: &str,
        user_id: &str,
        update: &ParticipantUpdate,
    ) -> Result<ThreadParticipant>;
    
    async fn remove_participant(&self, thread_id: &str, user_id: &str) -> Result<()>;
}
