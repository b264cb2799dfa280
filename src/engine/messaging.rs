use chrono::Utc;
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::routing::{is_visible, resolve_addressing};

use super::{Engine, EngineError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageDraft {
    pub sender_id: Ulid,
    pub recipient_ids: Vec<Ulid>,
    pub recipient_roles: Vec<Role>,
    pub location_filter: Option<Location>,
    pub content: String,
    pub parent_message_id: Option<Ulid>,
}

impl Engine {
    pub async fn post_message(&self, draft: MessageDraft) -> Result<Message, EngineError> {
        let sender = self.user(&draft.sender_id)?;
        let content = draft.content.trim();
        if content.is_empty() {
            return Err(EngineError::InvalidRequest("message content is required"));
        }
        if content.len() > MAX_MESSAGE_LEN {
            return Err(EngineError::LimitExceeded("message too long"));
        }
        let location_filter = resolve_addressing(
            &sender,
            &draft.recipient_ids,
            &draft.recipient_roles,
            draft.location_filter,
        )?;
        for id in &draft.recipient_ids {
            self.user(id)?;
        }
        if let Some(parent) = draft.parent_message_id
            && self.store.message(&parent).is_none()
        {
            return Err(EngineError::not_found("message", parent));
        }

        let message = Message {
            id: Ulid::new(),
            sender_id: sender.id,
            sender_name: sender.name,
            sender_role: sender.role,
            recipient_ids: draft.recipient_ids,
            recipient_roles: draft.recipient_roles,
            location_filter,
            content: content.to_string(),
            timestamp: Utc::now(),
            read: false,
            parent_message_id: draft.parent_message_id,
        };
        self.persist_global(Event::MessagePosted(message.clone()))
            .await?;
        tracing::info!(message = %message.id, sender = %message.sender_id, broadcast = message.is_broadcast(), "message posted");
        Ok(message)
    }

    /// Reply to the parent's author. An author following up on their own
    /// message reaches the parent's audience instead.
    pub async fn reply(
        &self,
        parent_id: Ulid,
        sender_id: Ulid,
        content: &str,
    ) -> Result<Message, EngineError> {
        let parent = self
            .store
            .message(&parent_id)
            .ok_or(EngineError::not_found("message", parent_id))?;
        let sender = self.user(&sender_id)?;
        if !is_visible(&parent, &sender) {
            return Err(EngineError::Forbidden("cannot reply to a message you cannot see"));
        }
        let draft = if parent.sender_id == sender_id {
            MessageDraft {
                sender_id,
                recipient_ids: parent.recipient_ids,
                recipient_roles: parent.recipient_roles,
                location_filter: parent.location_filter,
                content: content.to_string(),
                parent_message_id: Some(parent_id),
            }
        } else {
            MessageDraft {
                sender_id,
                recipient_ids: vec![parent.sender_id],
                content: content.to_string(),
                parent_message_id: Some(parent_id),
                ..MessageDraft::default()
            }
        };
        self.post_message(draft).await
    }

    /// Messages `viewer_id` can see, newest first.
    pub fn messages_for(&self, viewer_id: Ulid) -> Result<Vec<Message>, EngineError> {
        let viewer = self.user(&viewer_id)?;
        let mut list: Vec<Message> = self
            .store
            .messages()
            .into_iter()
            .filter(|m| is_visible(m, &viewer))
            .collect();
        list.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(list)
    }

    pub async fn mark_message_read(
        &self,
        id: Ulid,
        viewer_id: Ulid,
    ) -> Result<Message, EngineError> {
        let message = self
            .store
            .message(&id)
            .ok_or(EngineError::not_found("message", id))?;
        let viewer = self.user(&viewer_id)?;
        if !is_visible(&message, &viewer) {
            return Err(EngineError::Forbidden("message not visible to viewer"));
        }
        if message.read {
            return Ok(message);
        }
        self.persist_global(Event::MessageRead { id }).await?;
        Ok(Message {
            read: true,
            ..message
        })
    }
}
