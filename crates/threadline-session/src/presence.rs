use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use threadline_types::{ParticipantRole, ThreadParticipant};

/// Connected participants and the local user's effective role.
///
/// The local role is unknown until the server pushes `connection_state` after
/// a connect; until then it is treated as viewer.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    local_role: Option<ParticipantRole>,
    participants: BTreeMap<String, ThreadParticipant>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_connection_state(&mut self, role: ParticipantRole) {
        self.local_role = Some(role);
    }

    /// Upsert keyed by user id
    pub fn apply_user_joined(&mut self, user_id: &str, role: ParticipantRole, now: DateTime<Utc>) {
        self.participants
            .entry(user_id.to_string())
            .and_modify(|p| {
                p.role = role;
                p.is_active = true;
                p.last_active_at = Some(now);
            })
            .or_insert_with(|| ThreadParticipant::new(user_id, role).with_last_active(now));
    }

    pub fn apply_user_left(&mut self, user_id: &str) {
        self.participants.remove(user_id);
    }

    pub fn effective_role(&self) -> ParticipantRole {
        self.local_role.unwrap_or(ParticipantRole::Viewer)
    }

    pub fn role_known(&self) -> bool {
        self.local_role.is_some()
    }

    /// The single client-side authority on whether the local user may send
    pub fn can_send_messages(&self) -> bool {
        self.effective_role() != ParticipantRole::Viewer
    }

    pub fn participants(&self) -> impl Iterator<Item = &ThreadParticipant> {
        self.participants.values()
    }

    pub fn participant(&self, user_id: &str) -> Option<&ThreadParticipant> {
        self.participants.get(user_id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Forget everything learned over the current connection
    pub fn reset(&mut self) {
        self.local_role = None;
        self.participants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fails_closed_until_role_pushed() {
        let mut presence = PresenceTracker::new();
        assert!(!presence.can_send_messages());
        assert_eq!(presence.effective_role(), ParticipantRole::Viewer);

        presence.apply_connection_state(ParticipantRole::Contributor);
        assert!(presence.can_send_messages());

        presence.apply_connection_state(ParticipantRole::Viewer);
        assert!(!presence.can_send_messages());
    }

    #[test]
    fn test_join_leave_idempotent() {
        let mut presence = PresenceTracker::new();
        let now = Utc::now();

        presence.apply_user_joined("u2", ParticipantRole::Viewer, now);
        presence.apply_user_joined("u2", ParticipantRole::Contributor, now);
        assert_eq!(presence.participant_count(), 1);
        assert_eq!(presence.participant("u2").map(|p| p.role), Some(ParticipantRole::Contributor));

        presence.apply_user_left("u2");
        presence.apply_user_left("u2");
        assert_eq!(presence.participant_count(), 0);
    }

    #[test]
    fn test_joined_event_does_not_grant_local_role() {
        let mut presence = PresenceTracker::new();
        presence.apply_user_joined("me", ParticipantRole::Owner, Utc::now());
        assert!(!presence.can_send_messages());
    }

    #[test]
    fn test_reset_returns_to_unknown_role() {
        let mut presence = PresenceTracker::new();
        presence.apply_connection_state(ParticipantRole::Owner);
        presence.apply_user_joined("u2", ParticipantRole::Viewer, Utc::now());

        presence.reset();
        assert!(!presence.role_known());
        assert_eq!(presence.participant_count(), 0);
    }
}
