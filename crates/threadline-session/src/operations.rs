use threadline_persist::InviteAcceptance;
use threadline_types::{
    ParticipantRole, ParticipantUpdate, Thread, ThreadAccess, ThreadParticipant, ThreadShare,
    ThreadShareResponse, ThreadUpdate,
};

use crate::controller::ThreadSession;
use crate::error::{Result, SessionError};
use crate::notice::Notice;

impl ThreadSession {
    /// Create a thread owned by the local user and put it first in the list
    pub async fn create_thread(&mut self, title: &str) -> Result<Thread> {
        self.require_auth()?;

        match self.persistence.create_thread(title).await {
            Ok(mut thread) => {
                thread.user_role = Some(ParticipantRole::Owner);
                self.threads.insert(0, thread.clone());
                self.notify(Notice::success("Thread created", format!("\"{}\" is ready", thread.title)));
                Ok(thread)
            }
            Err(e) => Err(self.persist_failure("Failed to create thread", e).await),
        }
    }

    /// Patch both the list entry and the open thread
    pub async fn update_thread(&mut self, thread_id: &str, update: &ThreadUpdate) -> Result<Thread> {
        let auth = self.require_auth()?;

        match self.persistence.update_thread(thread_id, update).await {
            Ok(mut thread) => {
                thread.user_role = Some(thread.derive_user_role(&auth.user_id));

                if let Some(entry) = self.threads.iter_mut().find(|t| t.id == thread_id) {
                    entry.apply_update(thread.clone());
                    entry.user_role = thread.user_role;
                }
                if let Some(current) = self.current_thread.as_mut().filter(|t| t.id == thread_id) {
                    current.apply_update(thread.clone());
                }

                self.notify(Notice::success("Thread updated", "Your changes were saved"));
                Ok(thread)
            }
            Err(e) => Err(self.persist_failure("Failed to update thread", e).await),
        }
    }

    /// Delete a thread; closes it first when it is the open one
    pub async fn delete_thread(&mut self, thread_id: &str) -> Result<()> {
        self.require_auth()?;

        match self.persistence.delete_thread(thread_id).await {
            Ok(()) => {
                self.threads.retain(|t| t.id != thread_id);
                if self.current_thread.as_ref().is_some_and(|t| t.id == thread_id) {
                    self.close_thread().await;
                }
                self.notify(Notice::success("Thread deleted", "The thread was removed"));
                Ok(())
            }
            Err(e) => Err(self.persist_failure("Failed to delete thread", e).await),
        }
    }

    pub async fn share_thread(&mut self, thread_id: &str, share: &ThreadShare) -> Result<ThreadShareResponse> {
        self.require_auth()?;

        match self.persistence.share_thread(thread_id, share).await {
            Ok(response) => {
                self.notify(Notice::success(
                    "Thread shared",
                    format!("Invitation sent to {}", share.email),
                ));
                Ok(response)
            }
            Err(e) => Err(self.persist_failure("Failed to share thread", e).await),
        }
    }

    pub async fn get_thread_access(&mut self, thread_id: &str, share_id: Option<&str>) -> Result<ThreadAccess> {
        self.require_auth()?;

        match self.persistence.get_thread_access(thread_id, share_id).await {
            Ok(access) => Ok(access),
            Err(e) => Err(self.persist_failure("Failed to check thread access", e).await),
        }
    }

    /// Join a shared thread and add it to the list
    pub async fn accept_invite(&mut self, thread_id: &str, share_id: &str) -> Result<InviteAcceptance> {
        self.require_auth()?;

        match self.persistence.accept_invite(thread_id, share_id).await {
            Ok(mut accepted) => {
                accepted.thread.user_role = Some(accepted.participant.role);
                if !self.threads.iter().any(|t| t.id == accepted.thread.id) {
                    self.threads.insert(0, accepted.thread.clone());
                }
                self.notify(Notice::success(
                    "Invitation accepted",
                    format!("You joined as {}", accepted.participant.role.as_str()),
                ));
                Ok(accepted)
            }
            Err(e) => Err(self.persist_failure("Failed to accept invitation", e).await),
        }
    }

    pub async fn list_participants(&mut self, thread_id: &str) -> Result<Vec<ThreadParticipant>> {
        self.require_auth()?;

        match self.persistence.list_participants(thread_id).await {
            Ok(participants) => {
                if let Some(current) = self.current_thread.as_mut().filter(|t| t.id == thread_id) {
                    current.participants = participants.clone();
                }
                Ok(participants)
            }
            Err(e) => Err(self.persist_failure("Failed to load participants", e).await),
        }
    }

    /// Change a participant between contributor and viewer. Ownership is
    /// never reassigned this way.
    pub async fn update_participant_role(
        &mut self,
        thread_id: &str,
        user_id: &str,
        role: ParticipantRole,
    ) -> Result<ThreadParticipant> {
        self.require_auth()?;
        if role == ParticipantRole::Owner {
            return Err(SessionError::PermissionDenied(
                "the owner role cannot be assigned".to_string(),
            ));
        }

        match self
            .persistence
            .update_participant(thread_id, user_id, &ParticipantUpdate::role(role))
            .await
        {
            Ok(participant) => {
                if let Some(current) = self.current_thread.as_mut().filter(|t| t.id == thread_id) {
                    if let Some(entry) = current.participants.iter_mut().find(|p| p.user_id == user_id) {
                        *entry = participant.clone();
                    }
                }
                self.notify(Notice::success(
                    "Role updated",
                    format!("Participant is now a {}", role.as_str()),
                ));
                Ok(participant)
            }
            Err(e) => Err(self.persist_failure("Failed to update participant", e).await),
        }
    }

    pub async fn remove_participant(&mut self, thread_id: &str, user_id: &str) -> Result<()> {
        self.require_auth()?;

        match self.persistence.remove_participant(thread_id, user_id).await {
            Ok(()) => {
                if let Some(current) = self.current_thread.as_mut().filter(|t| t.id == thread_id) {
                    current.participants.retain(|p| p.user_id != user_id);
                }
                self.notify(Notice::success("Participant removed", "They no longer have access"));
                Ok(())
            }
            Err(e) => Err(self.persist_failure("Failed to remove participant", e).await),
        }
    }
}
