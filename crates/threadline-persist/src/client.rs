use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use threadline_types::{
    Message, MessageListParams, ParticipantUpdate, Thread, ThreadAccess, ThreadListParams,
    ThreadParticipant, ThreadShare, ThreadShareResponse, ThreadUpdate,
};

use crate::auth::AuthClient;
use crate::error::Result;
use crate::http::{check_status, decode, decode_list};
use crate::models::InviteAcceptance;
use crate::trait_client::PersistenceClient;

/// [`PersistenceClient`] over the `/agent/threads` REST API
#[derive(Clone)]
pub struct HttpPersistClient {
    auth: Arc<AuthClient>,
}

impl HttpPersistClient {
    pub fn new(auth: Arc<AuthClient>) -> Self {
        Self { auth }
    }
    
    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }
    
    fn url(&self, path: &str) -> String {
        self.auth.url(&format!("/agent/threads{}", path))
    }
}

#[async_trait]
impl PersistenceClient for HttpPersistClient {
    async fn list_threads(&self, params: &ThreadListParams) -> Result<Vec<Thread>> {
        let url = self.url("");
        let response = self
            .auth
            .send_authorized(|http| http.get(&url).query(params))
            .await?;
        decode_list(response).await
    }
    
    async fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        let url = self.url(&format!("/{}", thread_id));
        let response = self.auth.send_authorized(|http| http.get(&url)).await?;
        decode(response).await
    }
    
    async fn create_thread(&self, title: &str) -> Result<Thread> {
        let url = self.url("");
        let body = json!({
            "title": title,
            "context": {},
            "thread_metadata": {},
        });
        let response = self
            .auth
            .send_authorized(|http| http.post(&url).json(&body))
            .await?;
        
        let thread: Thread = decode(response).await?;
        tracing::info!(thread_id = %thread.id, "Thread created");
        Ok(thread)
    }
    
    async fn update_thread(&self, thread_id: &str, update: &ThreadUpdate) -> Result<Thread> {
        let url = self.url(&format!("/{}", thread_id));
        let response = self
            .auth
            .send_authorized(|http| http.patch(&url).json(update))
            .await?;
        decode(response).await
    }
    
    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let url = self.url(&format!("/{}", thread_id));
        let response = self.auth.send_authorized(|http| http.delete(&url)).await?;
        check_status(response).await?;
        tracing::info!(thread_id, "Thread deleted");
        Ok(())
    }
    
    async fn list_messages(&self, thread_id: &str, params: &MessageListParams) -> Result<Vec<Message>> {
        let url = self.url(&format!("/{}/messages", thread_id));
        let response = self
            .auth
            .send_authorized(|http| http.get(&url).query(params))
            .await?;
        decode_list(response).await
    }
    
    async fn share_thread(&self, thread_id: &str, share: &ThreadShare) -> Result<ThreadShareResponse> {
        let url = self.url(&format!("/{}/share", thread_id));
        let response = self
            .auth
            .send_authorized(|http| http.post(&url).json(share))
            .await?;
        decode(response).await
    }
    
    async fn get_thread_access(&self, thread_id: &str, share_id: Option<&str>) -> Result<ThreadAccess> {
        let url = self.url(&format!("/share/{}", thread_id));
        let response = self
            .auth
            .send_authorized(|http| {
                let request = http.get(&url);
                match share_id {
                    Some(share_id) => request.query(&[("share_id", share_id)]),
                    None => request,
                }
            })
            .await?;
        decode(response).await
    }
    
    async fn accept_invite(&self, thread_id: &str, share_id: &str) -> Result<InviteAcceptance> {
        let url = self.url(&format!("/{}/accept-invite", thread_id));
        let body = json!({ "share_id": share_id });
        let response = self
            .auth
            .send_authorized(|http| http.post(&url).json(&body))
            .await?;
        decode(response).await
    }
    
    async fn list_participants(&self, thread_id: &str) -> Result<Vec<ThreadParticipant>> {
        let url = self.url(&format!("/{}/participants", thread_id));
        let response = self.auth.send_authorized(|http| http.get(&url)).await?;
        decode_list(response).await
    }
    
    async fn update_participant(
        &self,
        thread_id: &str,
        user_id: &str,
        update: &ParticipantUpdate,
    ) -> Result<ThreadParticipant> {
        let url = self.url(&format!("/{}/participants/{}", thread_id, user_id));
        let response = self
            .auth
            .send_authorized(|http| http.patch(&url).json(update))
            .await?;
        decode(response).await
    }
    
    async fn remove_participant(&self, thread_id: &str, user_id: &str) -> Result<()> {
        let url = self.url(&format!("/{}/participants/{}", thread_id, user_id));
        let response = self.auth.send_authorized(|http| http.delete(&url)).await?;
        check_status(response).await?;
        Ok(())
    }
}
