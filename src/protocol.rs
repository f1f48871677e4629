/// Messages exchanged between the background worker and the other contexts
///
/// Every message is JSON with a `type` tag. Requests get exactly one
/// [`Response`]; [`Broadcast`]s are fire-and-forget.

use crate::error::Error;
use crate::labels::LabelCollection;
use crate::notes::{Note, NoteBook};
use crate::profiles::{ProfileDirectory, ProfileRecord, ProfileSighting};
use crate::session::AuthSnapshot;
use crate::slack::SlackStatus;
use crate::theme::{ThemeMode, ThemePreference};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GetAuthState,
    SignIn,
    SignOut,
    Refresh,
    VisibilityChanged {
        visible: bool,
    },
    GetLabels,
    AddLabel {
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
    RemoveLabel {
        name: String,
    },
    RenameLabel {
        from: String,
        to: String,
    },
    SetLabelColor {
        name: String,
        color: String,
    },
    AttachLabel {
        name: String,
        profile_id: String,
    },
    DetachLabel {
        name: String,
        profile_id: String,
    },
    GetTheme,
    SetThemeMode {
        mode: ThemeMode,
    },
    SetThemeAccent {
        #[serde(default)]
        accent: Option<String>,
    },
    ProfileSighted {
        sighting: ProfileSighting,
    },
    GetProfile {
        profile_id: String,
    },
    GetNotes {
        profile_id: String,
    },
    AddNote {
        profile_id: String,
        text: String,
    },
    UpdateNote {
        note_id: String,
        text: String,
    },
    DeleteNote {
        note_id: String,
    },
    SlackStatus,
    SlackConnect,
    SlackDisconnect,
    SlackSend {
        #[serde(default)]
        channel: Option<String>,
        text: String,
    },
    ShareProfile {
        profile_id: String,
        #[serde(default)]
        channel: Option<String>,
    },
}

impl Request {
    /// Requests that touch user documents and need a signed-in session
    pub fn needs_session(&self) -> bool {
        !matches!(
            self,
            Request::GetAuthState
                | Request::SignIn
                | Request::SignOut
                | Request::Refresh
                | Request::VisibilityChanged { .. }
                | Request::ProfileSighted { .. }
                | Request::SlackStatus
                | Request::SlackConnect
                | Request::SlackDisconnect
                | Request::SlackSend { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Ok,
    AuthState {
        auth: AuthSnapshot,
    },
    Labels {
        labels: LabelCollection,
    },
    Theme {
        theme: ThemePreference,
    },
    Profile {
        profile_id: String,
        url: String,
        record: Option<ProfileRecord>,
        labels: Vec<String>,
    },
    Notes {
        notes: Vec<Note>,
    },
    Note {
        note: Note,
    },
    SlackStatus {
        status: SlackStatus,
    },
    RefreshSkipped,
    Error {
        message: String,
    },
}

impl From<Error> for Response {
    fn from(error: Error) -> Self {
        Response::Error {
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Broadcast {
    AuthStateChanged { auth: AuthSnapshot },
    LabelsChanged { labels: LabelCollection },
    ThemeChanged { theme: ThemePreference },
    ProfilesChanged { profiles: ProfileDirectory },
    NotesChanged { notes: NoteBook },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthStatus;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request: Request =
            serde_json::from_value(json!({"type": "add_label", "name": "Rust"})).unwrap();

        assert_eq!(
            request,
            Request::AddLabel {
                name: "Rust".to_string(),
                color: None
            }
        );
    }

    #[test]
    fn test_request_with_nested_sighting() {
        let request: Request = serde_json::from_value(json!({
            "type": "profile_sighted",
            "sighting": {"page_url": "https://www.linkedin.com/in/jane-doe/", "name": "Jane"}
        }))
        .unwrap();

        match request {
            Request::ProfileSighted { sighting } => {
                assert_eq!(sighting.name.as_deref(), Some("Jane"));
                assert_eq!(sighting.avatar_url, None);
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_unknown_request_rejected() {
        let result = serde_json::from_value::<Request>(json!({"type": "format_disk"}));

        assert!(result.is_err());
    }

    #[test]
    fn test_theme_mode_request() {
        let request: Request =
            serde_json::from_value(json!({"type": "set_theme_mode", "mode": "dark"})).unwrap();

        assert_eq!(
            request,
            Request::SetThemeMode {
                mode: ThemeMode::Dark
            }
        );
    }

    #[test]
    fn test_needs_session() {
        assert!(Request::GetLabels.needs_session());
        assert!(!Request::GetAuthState.needs_session());
        assert!(!Request::SlackStatus.needs_session());
    }

    #[test]
    fn test_error_response() {
        let response = Response::from(Error::LabelExists("Rust".to_string()));

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"type": "error", "message": "Label already exists: Rust"})
        );
    }

    #[test]
    fn test_broadcast_wire_format() {
        let broadcast = Broadcast::AuthStateChanged {
            auth: AuthSnapshot::logged_out(),
        };

        assert_eq!(
            serde_json::to_value(&broadcast).unwrap(),
            json!({"type": "auth_state_changed", "auth": {"status": "logged_out", "user": null}})
        );
        assert_eq!(AuthSnapshot::logged_out().status, AuthStatus::LoggedOut);
    }
}
