//! Bearer credential handling.
//!
//! The token is a single process-wide value. The config surface publishes it
//! through a [`CredentialPublisher`]; every consumer holds a cheap
//! [`CredentialGate`] that always sees the latest value.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::executor::{HttpRequest, STATUS_UNAUTHORIZED};
use crate::error::{Result, TagError};

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Trims the token; blank input yields `None`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        (!token.is_empty()).then(|| Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

pub fn credential_channel(initial: Option<Credential>) -> (CredentialPublisher, CredentialGate) {
    let (tx, rx) = watch::channel(initial);
    (CredentialPublisher { tx }, CredentialGate { rx })
}

pub struct CredentialPublisher {
    tx: watch::Sender<Option<Credential>>,
}

impl CredentialPublisher {
    pub fn publish(&self, credential: Option<Credential>) {
        self.tx.send_replace(credential);
        tracing::info!("Token updated");
    }

    pub fn gate(&self) -> CredentialGate {
        CredentialGate {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialGate {
    rx: watch::Receiver<Option<Credential>>,
}

impl CredentialGate {
    /// A gate pinned to a single value, with no publisher.
    pub fn fixed(credential: Option<Credential>) -> Self {
        let (_, gate) = credential_channel(credential);
        gate
    }

    pub fn current(&self) -> Option<Credential> {
        self.rx.borrow().clone()
    }

    /// The current credential, or `MissingCredential` before any call is made.
    pub fn require(&self) -> Result<Credential> {
        self.current().ok_or(TagError::MissingCredential)
    }
}

pub fn authorize(request: HttpRequest, credential: &Credential) -> HttpRequest {
    request.header("Authorization", credential.bearer())
}

pub fn is_expired(status: u16) -> bool {
    status == STATUS_UNAUTHORIZED
}
