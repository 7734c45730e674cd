//! Explicit user-session context.
//!
//! # Responsibility
//! - Carry the authenticated user id and stable device id into every
//!   service and sync call.
//!
//! # Invariants
//! - There is no process-wide "current user"; callers always pass a
//!   session explicitly.
//! - Both identifiers are non-empty and trimmed.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Identity context for one authenticated user on one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    /// User identifier supplied by the authentication collaborator.
    pub user_id: String,
    /// Stable per-install device identifier; conflict tie-break key.
    pub device_id: String,
}

impl UserSession {
    /// Builds a session from raw identifiers.
    ///
    /// # Errors
    /// - `BlankUserId` / `BlankDeviceId` when either input trims to empty.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Result<Self, SessionError> {
        let user_id = user_id.into().trim().to_string();
        let device_id = device_id.into().trim().to_string();

        if user_id.is_empty() {
            return Err(SessionError::BlankUserId);
        }
        if device_id.is_empty() {
            return Err(SessionError::BlankDeviceId);
        }

        Ok(Self { user_id, device_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    BlankUserId,
    BlankDeviceId,
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankUserId => write!(f, "session user id must not be blank"),
            Self::BlankDeviceId => write!(f, "session device id must not be blank"),
        }
    }
}

impl Error for SessionError {}
