use chrono::Utc;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// The site's `role` holder: earliest registered user scoped to exactly
/// `location`. `ALL`-scope users are never site recipients.
pub fn resolve_recipient<'a>(
    users: impl IntoIterator<Item = &'a User>,
    role: Role,
    location: Location,
) -> Option<Ulid> {
    users
        .into_iter()
        .filter(|u| u.role == role && u.location.site() == Some(location))
        .min_by_key(|u| (u.created_at, u.id))
        .map(|u| u.id)
}

impl Engine {
    pub async fn register_user(
        &self,
        name: &str,
        role: Role,
        location: LocationScope,
    ) -> Result<User, EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidRequest("name is required"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("name too long"));
        }

        let _registry = self.registry_lock.lock().await;
        if self.store.user_count() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        let user = User {
            id: Ulid::new(),
            name: name.to_string(),
            role,
            location,
            created_at: Utc::now(),
        };
        self.persist_global(Event::UserRegistered(user.clone())).await?;
        tracing::info!(user = %user.id, ?role, %location, "user registered");
        Ok(user)
    }

    pub fn get_user(&self, id: Ulid) -> Result<User, EngineError> {
        self.user(&id)
    }

    pub(super) fn recipient(&self, role: Role, location: Location) -> Option<Ulid> {
        resolve_recipient(&self.store.users(), role, location)
    }
}
