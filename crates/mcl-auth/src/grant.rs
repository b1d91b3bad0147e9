use async_trait::async_trait;

use crate::errors::Result;
use crate::token::Token;

/// Strategy that obtains the root identity from the OAuth provider.
///
/// `acquire` may block on genuine user interaction (device-code polling,
/// browser completion) for seconds to minutes; the chain resolver invokes it
/// at most once per resolution pass. Implementations must bound the total
/// wait and end in one of three outcomes: a token, an explicit denial
/// ([`crate::AuthError::GrantFlowDenied`]) or a timeout
/// ([`crate::AuthError::GrantFlowTimeout`]), never an unbounded retry.
#[async_trait]
pub trait GrantFlow: Send + Sync {
    /// Obtain a brand-new root identity interactively
    async fn acquire(&self) -> Result<Token>;

    /// Refresh an existing root identity using its refresh secret.
    ///
    /// Any error here is non-fatal: the chain resolver falls back to
    /// [`acquire`](Self::acquire).
    async fn refresh(&self, existing: &Token) -> Result<Token>;
}
