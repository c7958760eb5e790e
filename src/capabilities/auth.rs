//! OAuth authorization capability.
//!
//! The shell drives the interactive part: it opens the Strava consent
//! page through the PathQuest web redirect broker (the provider only
//! redirects to registered web origins, not app schemes) and returns
//! the authorization code with the PKCE verifier it generated. The code
//! exchange itself happens in the core over plain HTTP.

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthOperation {
    StartAuthorization {
        client_id: String,
        scopes: Vec<String>,
    },
    /// Close any browser session state held by the shell.
    EndSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthOutput {
    Authorized {
        code: String,
        code_verifier: String,
    },
    SessionEnded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AuthError {
    #[error("user cancelled authorization")]
    Cancelled,
    #[error("no browser available for authorization")]
    BrowserUnavailable,
    #[error("authorization failed: {reason}")]
    Failed { reason: String },
}

pub type AuthResult = Result<AuthOutput, AuthError>;

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            // Cancelling is not an error worth surfacing loudly.
            AuthError::Cancelled => {
                AppError::new(ErrorKind::Authentication, "Authorization cancelled")
                    .with_severity(crate::error::ErrorSeverity::Info)
            }
            other => AppError::new(ErrorKind::Authentication, other.to_string()),
        }
    }
}

impl Operation for AuthOperation {
    type Output = AuthResult;
}

pub struct Auth<Ev> {
    context: CapabilityContext<AuthOperation, Ev>,
}

impl<Ev> Auth<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<AuthOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn start_authorization<F>(&self, client_id: String, scopes: Vec<String>, make_event: F)
    where
        F: FnOnce(AuthResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context
                .request_from_shell(AuthOperation::StartAuthorization { client_id, scopes })
                .await;
            context.update_app(make_event(response));
        });
    }

    /// Fire-and-forget; sign-out should not block on the browser.
    pub fn end_session(&self) {
        let context = self.context.clone();
        self.context.spawn(async move {
            let _ = context.request_from_shell(AuthOperation::EndSession).await;
        });
    }
}

impl<Ev> Capability<Ev> for Auth<Ev> {
    type Operation = AuthOperation;
    type MappedSelf<MappedEv> = Auth<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Auth::new(self.context.map_event(f))
    }
}
