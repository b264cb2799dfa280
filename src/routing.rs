//! Message visibility and addressing rules.

use ulid::Ulid;

use crate::engine::EngineError;
use crate::limits::MAX_DIRECT_RECIPIENTS;
use crate::model::*;

fn location_matches(filter: Option<Location>, viewer: &User) -> bool {
    filter.is_none_or(|loc| viewer.location.covers(loc))
}

/// Whether `viewer` may see `message`.
///
/// Authors and direct recipients always see it. Otherwise the location
/// filter must match the viewer's site (or the viewer spans all sites), and
/// the message must either be an open broadcast (no ids, no roles) or name
/// the viewer's role.
pub fn is_visible(message: &Message, viewer: &User) -> bool {
    if message.sender_id == viewer.id || message.recipient_ids.contains(&viewer.id) {
        return true;
    }
    if !location_matches(message.location_filter, viewer) {
        return false;
    }
    let open_broadcast = message.is_broadcast() && message.recipient_roles.is_empty();
    open_broadcast || message.recipient_roles.contains(&viewer.role)
}

/// Check `sender` may address the given audience and return the effective
/// location filter to store on the message.
pub fn resolve_addressing(
    sender: &User,
    recipient_ids: &[Ulid],
    recipient_roles: &[Role],
    location_filter: Option<Location>,
) -> Result<Option<Location>, EngineError> {
    if recipient_ids.len() > MAX_DIRECT_RECIPIENTS {
        return Err(EngineError::LimitExceeded("too many recipients"));
    }
    if recipient_ids.contains(&sender.id) {
        return Err(EngineError::InvalidRequest("cannot message yourself"));
    }
    if !sender.role.is_privileged() {
        if recipient_ids.len() != 1 || !recipient_roles.is_empty() || location_filter.is_some() {
            return Err(EngineError::Forbidden(
                "only admins may broadcast; address exactly one recipient",
            ));
        }
        return Ok(None);
    }

    let broadcast = recipient_ids.is_empty() || !recipient_roles.is_empty();
    if sender.role == Role::SuperAdmin || !broadcast {
        return Ok(location_filter);
    }
    // Admin broadcasts never leave the admin's own site.
    match (sender.location.site(), location_filter) {
        (Some(site), None) => Ok(Some(site)),
        (Some(site), Some(loc)) if loc == site => Ok(Some(site)),
        (Some(_), Some(_)) => Err(EngineError::Forbidden(
            "admins may only broadcast to their own location",
        )),
        (None, Some(loc)) => Ok(Some(loc)),
        (None, None) => Err(EngineError::Forbidden(
            "only super admins may broadcast to everyone",
        )),
    }
}
