/// Credentials: OAuth token brokering and identity-provider sign-in

pub mod identity;
pub mod oauth;
pub mod token;

pub use identity::{CredentialExchange, HttpIdentityToolkit, ProviderSession, UserIdentity};
pub use oauth::{HttpOAuthProvider, OAuthProvider, TokenGrant};
pub use token::{StoredToken, TokenBroker};

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;

/// Shared slot holding the provider id token of the signed-in user.
/// The session coordinator writes it; the document store reads it as bearer.
#[derive(Clone, Default)]
pub struct CredentialCell(Rc<RefCell<Option<String>>>);

impl CredentialCell {
    pub fn set(&self, token: Option<String>) {
        *self.0.borrow_mut() = token;
    }

    pub fn get(&self) -> Option<String> {
        self.0.borrow().clone()
    }
}

impl std::fmt::Debug for CredentialCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CredentialCell")
            .field(&self.0.borrow().as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Pull the authorization code out of an OAuth redirect, checking `state`
pub(crate) fn authorization_code(redirect: &Url, expected_state: &str) -> Result<String> {
    let mut code = None;
    let mut state = None;

    for (key, value) in redirect.query_pairs() {
        match key.as_ref() {
            "error" => return Err(Error::Provider(value.into_owned())),
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::Provider("OAuth state mismatch".to_string()));
    }

    code.ok_or_else(|| Error::Provider("redirect carried no authorization code".to_string()))
}
