/// Session states and the three-valued status other contexts see

use crate::auth::UserIdentity;
use crate::platform::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    Refreshing {
        previous: Option<UserIdentity>,
    },
    Authenticated {
        user: UserIdentity,
        expires_at: Millis,
    },
    /// Credential lapsed and has not been renewed yet
    Expired {
        user: UserIdentity,
    },
    Error {
        message: String,
        /// When the single retry is due; `None` once it has been spent
        retry_at: Option<Millis>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    LoggedIn,
    LoggedOut,
    Error,
}

/// What every execution context is told about the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSnapshot {
    pub status: AuthStatus,
    pub user: Option<UserIdentity>,
}

impl AuthSnapshot {
    pub fn logged_out() -> Self {
        AuthSnapshot {
            status: AuthStatus::LoggedOut,
            user: None,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        match self.status {
            AuthStatus::LoggedIn => self.user.as_ref().map(|u| u.uid.as_str()),
            _ => None,
        }
    }
}

impl SessionState {
    pub fn snapshot(&self) -> AuthSnapshot {
        match self {
            SessionState::Authenticated { user, .. }
            | SessionState::Refreshing {
                previous: Some(user),
            } => AuthSnapshot {
                status: AuthStatus::LoggedIn,
                user: Some(user.clone()),
            },
            SessionState::Error { .. } => AuthSnapshot {
                status: AuthStatus::Error,
                user: None,
            },
            SessionState::Anonymous
            | SessionState::Refreshing { previous: None }
            | SessionState::Expired { .. } => AuthSnapshot::logged_out(),
        }
    }

    /// The user to carry through a refresh so status does not flicker
    pub fn current_user(&self) -> Option<UserIdentity> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user.clone()),
            SessionState::Refreshing { previous } => previous.clone(),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Refreshing { .. } => "refreshing",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Expired { .. } => "expired",
            SessionState::Error { .. } => "error",
        }
    }
}
