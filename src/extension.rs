/// The background service object
///
/// `Extension` owns the session coordinator, the per-user document mirrors
/// and the optional Slack integration. It is built once from explicit
/// dependencies, wired up by [`Extension::init`] and unwired by
/// [`Extension::teardown`].

use crate::auth::{CredentialCell, CredentialExchange, OAuthProvider, TokenBroker};
use crate::config::ExtensionConfig;
use crate::error::{Error, Result};
use crate::labels::Labels;
use crate::listeners::Subscription;
use crate::notes::Notes;
use crate::platform::{MessageBus, Platform};
use crate::profiles::Profiles;
use crate::protocol::{Broadcast, Request, Response};
use crate::session::{AuthSnapshot, RefreshOutcome, RefreshPolicy, SessionCoordinator};
use crate::slack::{SlackApi, SlackIntegration, SlackStatus};
use crate::store::DocumentStore;
use crate::theme::Theme;
use log::{debug, info, warn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Remote services the extension talks to
pub struct Backends {
    pub oauth: Rc<dyn OAuthProvider>,
    pub identity: Rc<dyn CredentialExchange>,
    pub documents: Rc<dyn DocumentStore>,
    pub slack: Option<Rc<dyn SlackApi>>,
    /// Shared with `documents` so its requests carry the current id token
    pub credentials: CredentialCell,
}

fn send(bus: &Rc<dyn MessageBus>, message: Broadcast) {
    if let Err(e) = bus.broadcast(&message) {
        debug!("Broadcast not delivered: {}", e);
    }
}

pub struct Extension {
    platform: Platform,
    session: SessionCoordinator,
    documents: Rc<dyn DocumentStore>,
    labels: Labels,
    theme: Theme,
    profiles: Profiles,
    notes: Notes,
    slack: Option<SlackIntegration>,
    subscriptions: RefCell<Vec<Subscription>>,
    initialized: Cell<bool>,
}

impl Extension {
    pub fn new(config: ExtensionConfig, platform: Platform, backends: Backends) -> Rc<Self> {
        let clock = platform.clock.clone();
        let attempts = config.documents.max_update_attempts;
        let documents = backends.documents;

        let tokens = TokenBroker::new(
            config.oauth.clone(),
            config.session.expiry_skew_secs,
            backends.oauth,
            &platform,
        );
        let session = SessionCoordinator::new(
            tokens,
            backends.identity,
            clock.clone(),
            backends.credentials,
            RefreshPolicy::from(&config.session),
        );

        let slack = match (config.slack.clone(), backends.slack) {
            (Some(slack_config), Some(api)) => {
                Some(SlackIntegration::new(slack_config, api, &platform))
            }
            _ => None,
        };

        Rc::new(Extension {
            labels: Labels::new(documents.clone(), clock.clone(), attempts),
            theme: Theme::new(documents.clone()),
            profiles: Profiles::new(documents.clone(), clock.clone(), config.site.clone(), attempts),
            notes: Notes::new(documents.clone(), clock, attempts),
            slack,
            session,
            documents,
            platform,
            subscriptions: RefCell::new(Vec::new()),
            initialized: Cell::new(false),
        })
    }

    pub fn session(&self) -> &SessionCoordinator {
        &self.session
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn notes(&self) -> &Notes {
        &self.notes
    }

    /// Wire listeners and pick up a persisted session. Safe to call twice.
    pub async fn init(self: &Rc<Self>) -> Result<AuthSnapshot> {
        if self.initialized.replace(true) {
            return Ok(self.session.snapshot());
        }

        let bus = self.platform.bus.clone();
        let weak = Rc::downgrade(self);
        let mut subscriptions = vec![self.session.subscribe(move |snapshot| {
            if let Some(extension) = weak.upgrade() {
                extension.on_session(snapshot);
            }
        })];

        let labels_bus = bus.clone();
        subscriptions.push(self.labels.on_change(move |labels| {
            send(&labels_bus, Broadcast::LabelsChanged { labels: labels.clone() })
        }));
        let theme_bus = bus.clone();
        subscriptions.push(self.theme.on_change(move |theme| {
            send(&theme_bus, Broadcast::ThemeChanged { theme: theme.clone() })
        }));
        let profiles_bus = bus.clone();
        subscriptions.push(self.profiles.on_change(move |profiles| {
            send(
                &profiles_bus,
                Broadcast::ProfilesChanged {
                    profiles: profiles.clone(),
                },
            )
        }));
        subscriptions.push(self.notes.on_change(move |notes| {
            send(&bus, Broadcast::NotesChanged { notes: notes.clone() })
        }));
        self.subscriptions.borrow_mut().extend(subscriptions);

        match self.session.restore().await {
            Ok(_) => self.sync_documents().await,
            Err(Error::NotSignedIn) => debug!("No stored session to restore"),
            Err(e) => warn!("Session restore failed: {}", e),
        }

        let snapshot = self.session.snapshot();
        info!("Extension initialized ({:?})", snapshot.status);
        Ok(snapshot)
    }

    /// Drop every listener and live document subscription
    pub fn teardown(&self) {
        if !self.initialized.replace(false) {
            return;
        }
        // Subscriptions cancel on drop
        let subscriptions = std::mem::take(&mut *self.subscriptions.borrow_mut());
        drop(subscriptions);
        self.detach_all();
        info!("Extension torn down");
    }

    fn on_session(&self, snapshot: &AuthSnapshot) {
        match snapshot.uid() {
            Some(uid) => self.attach_all(uid),
            None => self.detach_all(),
        }
        send(
            &self.platform.bus,
            Broadcast::AuthStateChanged {
                auth: snapshot.clone(),
            },
        );
    }

    fn attach_all(&self, uid: &str) {
        let results = [
            self.labels.mirror().attach(uid),
            self.theme.mirror().attach(uid),
            self.profiles.mirror().attach(uid),
            self.notes.mirror().attach(uid),
        ];
        for result in results {
            if let Err(e) = result {
                warn!("Could not mirror documents for {}: {}", uid, e);
            }
        }
    }

    fn detach_all(&self) {
        self.labels.mirror().detach();
        self.theme.mirror().detach();
        self.profiles.mirror().detach();
        self.notes.mirror().detach();
    }

    /// Pull fresh snapshots for stores that do not push
    async fn sync_documents(&self) {
        if self.session.snapshot().uid().is_none() {
            return;
        }
        if let Err(e) = self.documents.poll().await {
            warn!("Document poll failed: {}", e);
        }
    }

    pub async fn poll_documents(&self) -> Result<()> {
        self.sync_documents().await;
        Ok(())
    }

    /// Timer entry point: drive the session, then refresh mirrors
    pub async fn tick(&self) -> Result<RefreshOutcome> {
        let outcome = self.session.tick().await;
        self.sync_documents().await;
        outcome
    }

    pub async fn handle(&self, request: Request) -> Response {
        debug!("Handling {:?}", request);
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request failed: {}", e);
                e.into()
            }
        }
    }

    fn slack(&self) -> Result<&SlackIntegration> {
        self.slack.as_ref().ok_or(Error::SlackNotConfigured)
    }

    fn auth_response(&self) -> Response {
        Response::AuthState {
            auth: self.session.snapshot(),
        }
    }

    async fn refresh_response(&self, outcome: RefreshOutcome) -> Response {
        match outcome {
            RefreshOutcome::Skipped => Response::RefreshSkipped,
            RefreshOutcome::Completed(auth) => {
                self.sync_documents().await;
                Response::AuthState { auth }
            }
        }
    }

    fn profile_response(&self, profile_id: String) -> Response {
        Response::Profile {
            url: self.profiles.url_for(&profile_id),
            record: self.profiles.get(&profile_id),
            labels: self.labels.current().labels_for_profile(&profile_id),
            profile_id,
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        if request.needs_session() && self.session.snapshot().uid().is_none() {
            return Err(Error::NotSignedIn);
        }

        let response = match request {
            Request::GetAuthState => self.auth_response(),
            Request::SignIn => {
                self.session.sign_in().await?;
                self.sync_documents().await;
                self.auth_response()
            }
            Request::SignOut => {
                self.session.sign_out().await?;
                self.auth_response()
            }
            Request::Refresh => {
                let outcome = self.session.request_refresh().await?;
                self.refresh_response(outcome).await
            }
            Request::VisibilityChanged { visible } => {
                let outcome = self.session.on_visibility_change(visible).await?;
                self.refresh_response(outcome).await
            }

            Request::GetLabels => Response::Labels {
                labels: self.labels.current(),
            },
            Request::AddLabel { name, color } => Response::Labels {
                labels: self.labels.add_label(&name, color.as_deref()).await?,
            },
            Request::RemoveLabel { name } => Response::Labels {
                labels: self.labels.remove_label(&name).await?,
            },
            Request::RenameLabel { from, to } => Response::Labels {
                labels: self.labels.rename_label(&from, &to).await?,
            },
            Request::SetLabelColor { name, color } => Response::Labels {
                labels: self.labels.set_color(&name, &color).await?,
            },
            Request::AttachLabel { name, profile_id } => Response::Labels {
                labels: self.labels.attach(&name, &profile_id).await?,
            },
            Request::DetachLabel { name, profile_id } => Response::Labels {
                labels: self.labels.detach(&name, &profile_id).await?,
            },

            Request::GetTheme => Response::Theme {
                theme: self.theme.current(),
            },
            Request::SetThemeMode { mode } => Response::Theme {
                theme: self.theme.set_mode(mode).await?,
            },
            Request::SetThemeAccent { accent } => Response::Theme {
                theme: self.theme.set_accent(accent.as_deref()).await?,
            },

            Request::ProfileSighted { sighting } => {
                self.profiles.observe(&sighting).await;
                match self.profiles.profile_id(&sighting.page_url) {
                    Some(profile_id) => self.profile_response(profile_id),
                    None => Response::Ok,
                }
            }
            Request::GetProfile { profile_id } => self.profile_response(profile_id),

            Request::GetNotes { profile_id } => Response::Notes {
                notes: self.notes.notes_for(&profile_id),
            },
            Request::AddNote { profile_id, text } => Response::Note {
                note: self.notes.add_note(&profile_id, &text).await?,
            },
            Request::UpdateNote { note_id, text } => Response::Note {
                note: self.notes.update_note(&note_id, &text).await?,
            },
            Request::DeleteNote { note_id } => {
                self.notes.delete_note(&note_id).await?;
                Response::Ok
            }

            Request::SlackStatus => Response::SlackStatus {
                status: match &self.slack {
                    Some(slack) => slack.status().await?,
                    None => SlackStatus::default(),
                },
            },
            Request::SlackConnect => Response::SlackStatus {
                status: self.slack()?.connect().await?,
            },
            Request::SlackDisconnect => {
                let slack = self.slack()?;
                slack.disconnect().await?;
                Response::SlackStatus {
                    status: slack.status().await?,
                }
            }
            Request::SlackSend { channel, text } => {
                self.slack()?
                    .send_message(channel.as_deref(), &text)
                    .await?;
                Response::Ok
            }
            Request::ShareProfile {
                profile_id,
                channel,
            } => {
                let labels = self.labels.current().labels_for_profile(&profile_id);
                let record = self.profiles.get(&profile_id);
                self.slack()?
                    .share_profile(
                        &self.profiles.url_for(&profile_id),
                        record.as_ref(),
                        &labels,
                        channel.as_deref(),
                    )
                    .await?;
                Response::Ok
            }
        };

        Ok(response)
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StoredToken;
    use crate::auth::token::TOKEN_KEY;
    use crate::config::test_config;
    use crate::session::AuthStatus;
    use crate::store::memory::MemoryDocumentStore;
    use crate::testing::{MockIdentity, MockOAuth, MockSlack, T0, TestPlatform};
    use crate::theme::ThemeMode;
    use futures::executor::block_on;
    use futures::join;
    use serde_json::json;

    const MIRRORS: u32 = 4;

    struct Fixture {
        platform: TestPlatform,
        identity: Rc<MockIdentity>,
        store: Rc<MemoryDocumentStore>,
        slack: Rc<MockSlack>,
        extension: Rc<Extension>,
    }

    fn create_fixture(with_token: bool) -> Fixture {
        let platform = TestPlatform::new();
        if with_token {
            let token = StoredToken {
                access_token: "access-stored".to_string(),
                refresh_token: Some("refresh-stored".to_string()),
                expires_at: T0 + 3600 * 1000,
            };
            platform
                .storage
                .entries
                .borrow_mut()
                .insert(TOKEN_KEY.to_string(), serde_json::to_value(&token).unwrap());
        }

        let identity = Rc::new(MockIdentity::default());
        let store = Rc::new(MemoryDocumentStore::new());
        let slack = Rc::new(MockSlack::default());
        let backends = Backends {
            oauth: Rc::new(MockOAuth::default()),
            identity: identity.clone(),
            documents: store.clone(),
            slack: Some(slack.clone()),
            credentials: CredentialCell::default(),
        };
        let extension = Extension::new(test_config(), platform.platform(), backends);

        Fixture {
            platform,
            identity,
            store,
            slack,
            extension,
        }
    }

    fn signed_in_fixture() -> Fixture {
        let fixture = create_fixture(true);
        block_on(fixture.extension.init()).unwrap();
        fixture
    }

    fn auth_broadcasts(fixture: &Fixture) -> Vec<AuthStatus> {
        fixture
            .platform
            .bus
            .sent
            .borrow()
            .iter()
            .filter_map(|b| match b {
                Broadcast::AuthStateChanged { auth } => Some(auth.status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_init_restores_session_and_mirrors() {
        let fixture = create_fixture(true);

        let snapshot = block_on(fixture.extension.init()).unwrap();

        assert_eq!(snapshot.uid(), Some("uid-1"));
        assert_eq!(fixture.store.active_watchers(), MIRRORS as usize);
        assert_eq!(auth_broadcasts(&fixture), vec![AuthStatus::LoggedIn]);
    }

    #[test]
    fn test_init_twice_wires_once() {
        let fixture = signed_in_fixture();

        block_on(fixture.extension.init()).unwrap();

        assert_eq!(fixture.identity.calls.get(), 1);
        assert_eq!(fixture.store.active_watchers(), MIRRORS as usize);
    }

    #[test]
    fn test_token_failure_leaves_logged_out() {
        let fixture = create_fixture(false);

        let snapshot = block_on(fixture.extension.init()).unwrap();

        assert_eq!(snapshot.status, AuthStatus::LoggedOut);
        assert_eq!(snapshot.user, None);
        assert_eq!(fixture.identity.calls.get(), 0);
        assert_eq!(fixture.store.active_watchers(), 0);
    }

    #[test]
    fn test_document_requests_need_session() {
        let fixture = create_fixture(false);
        block_on(fixture.extension.init()).unwrap();

        let response = block_on(fixture.extension.handle(Request::GetLabels));

        assert_eq!(
            response,
            Response::Error {
                message: "Not signed in".to_string()
            }
        );
    }

    #[test]
    fn test_sign_out_unsubscribes_each_mirror_once() {
        let fixture = signed_in_fixture();

        let response = block_on(fixture.extension.handle(Request::SignOut));
        fixture.extension.teardown();

        assert!(matches!(response, Response::AuthState { auth } if auth.user.is_none()));
        assert_eq!(fixture.store.unsubscribe_count(), MIRRORS);
        assert_eq!(fixture.store.active_watchers(), 0);
        assert_eq!(
            auth_broadcasts(&fixture),
            vec![AuthStatus::LoggedIn, AuthStatus::LoggedOut]
        );
    }

    #[test]
    fn test_teardown_unsubscribes_once() {
        let fixture = signed_in_fixture();

        fixture.extension.teardown();
        fixture.extension.teardown();

        assert_eq!(fixture.store.unsubscribe_count(), MIRRORS);
    }

    #[test]
    fn test_teardown_stops_session_listener() {
        let fixture = signed_in_fixture();
        fixture.extension.teardown();
        let sent = fixture.platform.bus.sent.borrow().len();

        block_on(fixture.extension.session().sign_out()).unwrap();

        assert_eq!(fixture.platform.bus.sent.borrow().len(), sent);
    }

    #[test]
    fn test_add_label_broadcasts_change() {
        let fixture = signed_in_fixture();

        let response = block_on(fixture.extension.handle(Request::AddLabel {
            name: "Rust".to_string(),
            color: None,
        }));

        assert!(matches!(response, Response::Labels { labels } if labels.get_label("Rust").is_some()));
        let sent = fixture.platform.bus.sent.borrow();
        assert!(sent.iter().any(|b| matches!(
            b,
            Broadcast::LabelsChanged { labels } if labels.labels.contains_key("Rust")
        )));
    }

    #[test]
    fn test_duplicate_label_leaves_document_untouched() {
        let fixture = signed_in_fixture();
        let add = || Request::AddLabel {
            name: "Rust".to_string(),
            color: None,
        };
        block_on(fixture.extension.handle(add()));
        let path = fixture.extension.labels().mirror().require_path().unwrap();
        let before = fixture.store.read_raw(&path).unwrap().version;

        let response = block_on(fixture.extension.handle(add()));

        assert!(matches!(response, Response::Error { .. }));
        assert_eq!(fixture.store.read_raw(&path).unwrap().version, before);
    }

    #[test]
    fn test_refresh_within_min_interval_is_skipped() {
        let fixture = signed_in_fixture();
        let sent = fixture.platform.bus.sent.borrow().len();

        let response = block_on(fixture.extension.handle(Request::Refresh));

        assert_eq!(response, Response::RefreshSkipped);
        assert_eq!(fixture.identity.calls.get(), 1);
        assert_eq!(fixture.platform.bus.sent.borrow().len(), sent);
    }

    #[test]
    fn test_concurrent_refresh_requests_share_one_call() {
        let fixture = signed_in_fixture();
        fixture.platform.clock.advance_secs(120);

        let (first, second) = block_on(async {
            join!(
                fixture.extension.handle(Request::Refresh),
                fixture.extension.handle(Request::VisibilityChanged { visible: true })
            )
        });

        assert!(matches!(first, Response::AuthState { .. }));
        assert_eq!(first, second);
        assert_eq!(fixture.identity.calls.get(), 2);
    }

    #[test]
    fn test_tick_refreshes_on_schedule() {
        let fixture = signed_in_fixture();

        assert_eq!(
            block_on(fixture.extension.tick()),
            Ok(RefreshOutcome::Skipped)
        );
        fixture
            .platform
            .clock
            .advance_secs(test_config().session.refresh_interval_secs);
        let outcome = block_on(fixture.extension.tick()).unwrap();

        assert!(matches!(outcome, RefreshOutcome::Completed(_)));
        assert_eq!(fixture.identity.calls.get(), 2);
    }

    #[test]
    fn test_profile_sighting_returns_labels() {
        let fixture = signed_in_fixture();
        block_on(fixture.extension.handle(Request::AddLabel {
            name: "Rust".to_string(),
            color: None,
        }));
        block_on(fixture.extension.handle(Request::AttachLabel {
            name: "Rust".to_string(),
            profile_id: "jane-doe".to_string(),
        }));

        let response = block_on(fixture.extension.handle(Request::ProfileSighted {
            sighting: crate::profiles::ProfileSighting {
                page_url: "https://www.linkedin.com/in/Jane-Doe/".to_string(),
                name: Some("Jane Doe".to_string()),
                avatar_url: None,
            },
        }));

        match response {
            Response::Profile {
                profile_id,
                record,
                labels,
                ..
            } => {
                assert_eq!(profile_id, "jane-doe");
                assert_eq!(record.map(|r| r.name), Some("Jane Doe".to_string()));
                assert_eq!(labels, vec!["Rust".to_string()]);
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_theme_round_trip() {
        let fixture = signed_in_fixture();

        block_on(fixture.extension.handle(Request::SetThemeMode {
            mode: ThemeMode::Dark,
        }));
        let response = block_on(fixture.extension.handle(Request::GetTheme));

        assert!(matches!(response, Response::Theme { theme } if theme.mode == ThemeMode::Dark));
    }

    #[test]
    fn test_notes_flow() {
        let fixture = signed_in_fixture();

        let note = match block_on(fixture.extension.handle(Request::AddNote {
            profile_id: "jane-doe".to_string(),
            text: "Met at RustConf".to_string(),
        })) {
            Response::Note { note } => note,
            other => panic!("unexpected response {:?}", other),
        };
        block_on(fixture.extension.handle(Request::DeleteNote { note_id: note.id }));

        assert_eq!(
            block_on(fixture.extension.handle(Request::GetNotes {
                profile_id: "jane-doe".to_string()
            })),
            Response::Notes { notes: vec![] }
        );
    }

    #[test]
    fn test_share_profile_posts_to_slack() {
        let fixture = signed_in_fixture();
        fixture.platform.flow.push_code("slack-code");
        block_on(fixture.extension.handle(Request::SlackConnect));
        let path = fixture.extension.profiles().mirror().require_path().unwrap();
        fixture.store.write_raw(
            &path,
            json!({"profiles": {"jane-doe": {"name": "Jane Doe", "updated_at": T0}}}),
        );

        let response = block_on(fixture.extension.handle(Request::ShareProfile {
            profile_id: "jane-doe".to_string(),
            channel: None,
        }));

        assert_eq!(response, Response::Ok);
        let posted = fixture.slack.posted.borrow();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "#leads");
        assert!(posted[0].1.contains("|Jane Doe>"));
    }

    #[test]
    fn test_slack_status_unconfigured() {
        let platform = TestPlatform::new();
        let mut config = test_config();
        config.slack = None;
        let extension = Extension::new(
            config,
            platform.platform(),
            Backends {
                oauth: Rc::new(MockOAuth::default()),
                identity: Rc::new(MockIdentity::default()),
                documents: Rc::new(MemoryDocumentStore::new()),
                slack: None,
                credentials: CredentialCell::default(),
            },
        );

        assert_eq!(
            block_on(extension.handle(Request::SlackStatus)),
            Response::SlackStatus {
                status: SlackStatus::default()
            }
        );
        assert_eq!(
            block_on(extension.handle(Request::SlackConnect)),
            Response::from(Error::SlackNotConfigured)
        );
    }
}
