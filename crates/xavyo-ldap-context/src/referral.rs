//! Referral handling.
//!
//! A backend surfaces a server referral as [`DirError::Referral`] carrying a
//! [`Referral`]. The caller decides whether to chase it; when it does,
//! [`ManagedContext::follow_referral`] obtains the replacement context with
//! the parent's socket factory in scope (obtaining it usually connects to the
//! referred server) and wraps it in a new managed context.

use std::fmt;
use tracing::debug;

use crate::context::ManagedContext;
use crate::error::{DirError, DirResult};
use crate::socket_scope;
use crate::traits::DirContext;

/// Backend-provided access to the context a referral points at.
pub trait ReferralSource: Send + fmt::Debug {
    /// Referral URLs, in server order.
    fn urls(&self) -> &[String];

    /// Connect to the current referral target.
    fn referral_context(&mut self) -> DirResult<Box<dyn DirContext>>;

    /// Move on to the next URL. Returns `false` when none is left.
    fn skip_referral(&mut self) -> bool {
        false
    }
}

/// Payload of [`DirError::Referral`].
#[derive(Debug)]
pub struct Referral {
    source: Box<dyn ReferralSource>,
}

impl Referral {
    pub fn new(source: impl ReferralSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn urls(&self) -> &[String] {
        self.source.urls()
    }

    /// Obtain the referred context without wrapping it.
    pub fn referral_context(&mut self) -> DirResult<Box<dyn DirContext>> {
        self.source.referral_context()
    }

    pub fn skip_referral(&mut self) -> bool {
        self.source.skip_referral()
    }
}

impl fmt::Display for Referral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "referral to [{}]", self.urls().join(", "))
    }
}

impl From<Referral> for DirError {
    fn from(referral: Referral) -> Self {
        DirError::Referral(referral)
    }
}

impl ManagedContext {
    /// Obtain the context `referral` points at and wrap it.
    ///
    /// The returned context shares this context's socket factory and never
    /// carries its close handler; closing it closes the referred connection.
    /// On failure `referral` stays with the caller, who may
    /// [`skip_referral`](Referral::skip_referral) and try the next URL.
    pub fn follow_referral(&self, referral: &mut Referral) -> DirResult<ManagedContext> {
        if self.is_closed() {
            return Err(DirError::Closed);
        }
        debug!(
            context_id = %self.id(),
            urls = ?referral.urls(),
            "Following referral"
        );

        let _scope = socket_scope::enter(self.socket_factory());
        let context = referral.referral_context()?;
        Ok(ManagedContext::derived(context, self.socket_factory().cloned()))
    }
}
