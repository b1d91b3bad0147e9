use thiserror::Error;

use crate::token::Stage;

/// Credential chain error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("failed to obtain {stage} credential")]
    StageFetch {
        stage: Stage,
        #[source]
        source: Box<AuthError>,
    },

    #[error("device authorization timed out before sign-in completed")]
    GrantFlowTimeout,

    #[error("authorization denied by the identity provider: {0}")]
    GrantFlowDenied(String),

    #[error("XSTS authorization denied: {0}")]
    XstsDenied(#[from] XstsDenied),

    #[error("no game profile associated with this account - does the user own the game?")]
    ProfileNotFound,

    #[error("failed to fetch game profile")]
    ProfileFetch(#[source] Box<AuthError>),

    #[error("credential has no refresh secret")]
    MissingRefreshSecret,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AuthError {
    /// Tag a terminal fetch failure with the stage it happened at.
    ///
    /// Grant flow outcomes and already-tagged upstream failures pass through
    /// unchanged so the caller always sees the innermost failing stage.
    pub(crate) fn tag_stage(self, stage: Stage) -> AuthError {
        match self {
            err @ (AuthError::GrantFlowTimeout
            | AuthError::GrantFlowDenied(_)
            | AuthError::StageFetch { .. }) => err,
            other => AuthError::StageFetch {
                stage,
                source: Box::new(other),
            },
        }
    }
}

/// XSTS-specific denial codes from the XErr field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XstsDenied {
    #[error("account doesn't have an Xbox account (XErr: 2148916233)")]
    NoXboxAccount,

    #[error("Xbox Live not available in this country (XErr: 2148916235)")]
    RegionNotSupported,

    #[error("adult verification required on the Xbox page (XErr: 2148916236/2148916237)")]
    AdultVerificationRequired,

    #[error("child account requires a Family (XErr: 2148916238)")]
    ChildAccountRequiresFamily,

    #[error("unknown XSTS error code: {0}")]
    Unknown(u64),
}

impl XstsDenied {
    /// Parse the XErr code from an XSTS error response
    pub fn from_xerr(code: u64) -> Self {
        match code {
            2148916233 => Self::NoXboxAccount,
            2148916235 => Self::RegionNotSupported,
            2148916236 | 2148916237 => Self::AdultVerificationRequired,
            2148916238 => Self::ChildAccountRequiresFamily,
            code => Self::Unknown(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xerr_codes_map_to_variants() {
        assert_eq!(XstsDenied::from_xerr(2148916233), XstsDenied::NoXboxAccount);
        assert_eq!(
            XstsDenied::from_xerr(2148916238),
            XstsDenied::ChildAccountRequiresFamily
        );
        assert_eq!(XstsDenied::from_xerr(42), XstsDenied::Unknown(42));
    }

    #[test]
    fn stage_tagging_keeps_grant_outcomes_distinct() {
        let tagged = AuthError::GrantFlowTimeout.tag_stage(Stage::RootIdentity);
        assert!(matches!(tagged, AuthError::GrantFlowTimeout));

        let tagged = AuthError::InvalidResponse("bad".into()).tag_stage(Stage::Session);
        match tagged {
            AuthError::StageFetch { stage, .. } => assert_eq!(stage, Stage::Session),
            other => panic!("expected StageFetch, got {other:?}"),
        }
    }

    #[test]
    fn stage_tagging_does_not_double_wrap() {
        let inner = AuthError::InvalidResponse("bad".into()).tag_stage(Stage::BrokerIdentity);
        let outer = inner.tag_stage(Stage::Session);
        match outer {
            AuthError::StageFetch { stage, .. } => assert_eq!(stage, Stage::BrokerIdentity),
            other => panic!("expected StageFetch, got {other:?}"),
        }
    }
}
