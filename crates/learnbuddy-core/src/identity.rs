//! Who the current user is, and how changes are observed.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Opaque user identifier. Remote task data is namespaced under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Owner used for the local snapshot store, which has one implicit user.
    pub const LOCAL: &'static str = "local";

    /// Wrap a user id. Surrounding whitespace is dropped; blank ids are
    /// rejected.
    pub fn new(id: impl AsRef<str>) -> Option<Self> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_owned()))
        }
    }

    pub fn local() -> Self {
        Self(Self::LOCAL.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the signed-in identity.
///
/// The sync layer never reads identity from ambient state: it is handed an
/// [`Identity`] at construction, and a session follows changes through
/// [`IdentityProvider::subscribe`].
pub trait IdentityProvider: Send + Sync {
    /// The identity right now, `None` when signed out.
    fn current(&self) -> Option<Identity>;

    /// A receiver that yields every identity transition.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn IdentityProvider) {}
};

/// In-process identity source with explicit sign-in and sign-out.
#[derive(Debug)]
pub struct IdentityHandle {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentityHandle {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(user = %identity, "signed in");
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        if let Some(previous) = self.tx.send_replace(None) {
            tracing::info!(user = %previous, "signed out");
        }
    }
}

impl Default for IdentityHandle {
    fn default() -> Self {
        Self::new(None)
    }
}

impl IdentityProvider for IdentityHandle {
    fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }
}
