//! Push notification capability (APNs / FCM).

use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

use crate::model::{ChallengeId, PeakId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushOperation {
    RequestPermission,
    /// Register with the platform push service; yields a device token.
    Register,
    Unregister,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushOutput {
    Permission { granted: bool },
    Registered { token: String },
    Unregistered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PushError {
    #[error("push notifications not available on this device")]
    NotAvailable,
    #[error("permission denied")]
    PermissionDenied,
    #[error("registration failed: {reason}")]
    RegistrationFailed { reason: String, is_retryable: bool },
    #[error("push service error: {message}")]
    Unknown { message: String },
}

pub type PushResult = Result<PushOutput, PushError>;

/// Payload delivered when the user taps a notification. Drives deep
/// navigation on launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushPayload {
    /// A followed user summited a peak.
    PeakSummited { peak_id: PeakId, by_username: String },
    NewTripReport { peak_id: PeakId },
    ChallengeCompleted { challenge_id: ChallengeId },
}

impl Operation for PushOperation {
    type Output = PushResult;
}

pub struct Push<Ev> {
    context: CapabilityContext<PushOperation, Ev>,
}

impl<Ev> Push<Ev>
where
    Ev: 'static,
{
    #[must_use]
    pub fn new(context: CapabilityContext<PushOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn request_permission<F>(&self, make_event: F)
    where
        F: FnOnce(PushResult) -> Ev + Send + 'static,
    {
        self.run(PushOperation::RequestPermission, make_event);
    }

    pub fn register<F>(&self, make_event: F)
    where
        F: FnOnce(PushResult) -> Ev + Send + 'static,
    {
        self.run(PushOperation::Register, make_event);
    }

    pub fn unregister(&self) {
        let context = self.context.clone();
        self.context.spawn(async move {
            let _ = context.request_from_shell(PushOperation::Unregister).await;
        });
    }

    fn run<F>(&self, operation: PushOperation, make_event: F)
    where
        F: FnOnce(PushResult) -> Ev + Send + 'static,
    {
        let context = self.context.clone();
        self.context.spawn(async move {
            let response = context.request_from_shell(operation).await;
            context.update_app(make_event(response));
        });
    }
}

impl<Ev> Capability<Ev> for Push<Ev> {
    type Operation = PushOperation;
    type MappedSelf<MappedEv> = Push<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static,
    {
        Push::new(self.context.map_event(f))
    }
}
