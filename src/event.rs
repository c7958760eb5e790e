//! The event alphabet of the core.
//!
//! Shell-originated events (taps, navigation, region changes) and
//! effect-completion events (HTTP responses, storage results) arrive
//! through the same enum. Large payloads are boxed to keep the enum
//! small.

#[cfg(feature = "camera")]
use serde::{Deserialize, Serialize};

use crate::capabilities::auth::AuthResult;
use crate::capabilities::storage::StorageResult;
use crate::map::{Route, SheetPosition};
use crate::model::{
    Bounds, ChallengeDetail, ChallengeId, ChallengeSummary, LngLat, OpId, Peak, PeakDetail,
    PeakId, TripReportDraft, UnixTimeMs, UserId,
};
use crate::session::TokenResponse;

#[cfg(feature = "camera")]
use crate::capabilities::camera::CameraResult;
#[cfg(feature = "push")]
use crate::capabilities::push::{PushPayload, PushResult};

pub type HttpResult<T> = crux_http::Result<crux_http::Response<T>>;

/// Phase-one response of the photo upload: where to PUT the bytes.
#[cfg(feature = "camera")]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoUploadTicket {
    pub photo_id: String,
    pub upload_url: String,
}

#[derive(Debug)]
pub enum Event {
    // Lifecycle
    AppStarted,
    Configured(crate::model::ApiConfig),
    AppForegrounded,
    AppBackgrounded,
    NetworkStatusChanged { online: bool },

    // Session
    ConnectRequested,
    AuthorizationResult(Box<AuthResult>),
    TokenExchangeResponse(Box<HttpResult<TokenResponse>>),
    TokenRefreshResponse(Box<HttpResult<TokenResponse>>),
    SignOutRequested,
    DeauthorizeResponse(Box<HttpResult<Vec<u8>>>),
    SessionLoaded(Box<StorageResult>),
    SessionPersisted(Box<StorageResult>),
    SessionCleared(Box<StorageResult>),

    // Map viewport and fetch
    MapRegionChanged { center: LngLat, zoom: f64, bounds: Bounds },
    PeaksFetched { generation: u64, result: Box<HttpResult<Vec<Peak>>> },
    ChallengesFetched { generation: u64, result: Box<HttpResult<Vec<ChallengeSummary>>> },

    // Selection
    PeakMarkerTapped { peak_id: PeakId },
    ChallengeMarkerTapped { challenge_id: ChallengeId },
    SelectionCleared,

    // Focus
    ChallengeFocusRequested { challenge_id: ChallengeId },
    ChallengeDetailFetched { challenge_id: ChallengeId, result: Box<HttpResult<ChallengeDetail>> },
    UserFocusRequested { user_id: UserId },
    UserSummitsFetched { user_id: UserId, result: Box<HttpResult<Vec<Peak>>> },
    PeakFocusRequested { peak_id: PeakId, coords: LngLat },
    FocusCleared,
    PeakDetailFetched { peak_id: PeakId, result: Box<HttpResult<PeakDetail>> },
    RecenterRequested,

    // One-shot camera/sheet command acknowledgements
    FitBoundsConsumed,
    FlyToConsumed,
    SheetSnapConsumed,

    // Navigation and sheet coordination
    RouteChanged(Route),
    SheetMoved(SheetPosition),

    // Submissions
    TripReportSubmitted { peak_id: PeakId, draft: TripReportDraft },
    ManualSummitLogged { peak_id: PeakId, summited_at: UnixTimeMs, notes: Option<String> },
    OutboxFlushRequested,
    SubmissionResponse { op_id: OpId, result: Box<HttpResult<Vec<u8>>> },
    OutboxRestored(Box<StorageResult>),
    OutboxPersisted(Box<StorageResult>),

    // Summit photos
    #[cfg(feature = "camera")]
    PhotoCaptureRequested,
    #[cfg(feature = "camera")]
    PhotoCaptureResult(Box<CameraResult>),
    #[cfg(feature = "camera")]
    StagedPhotoDiscarded,
    #[cfg(feature = "camera")]
    PhotoTicketResponse { op_id: OpId, result: Box<HttpResult<PhotoUploadTicket>> },
    #[cfg(feature = "camera")]
    PhotoUploadResponse { op_id: OpId, result: Box<HttpResult<Vec<u8>>> },

    // Push notifications
    #[cfg(feature = "push")]
    PushPermissionRequested,
    #[cfg(feature = "push")]
    PushRegistrationResult(Box<PushResult>),
    #[cfg(feature = "push")]
    NotificationTapped(Box<PushPayload>),

    // Transient UI
    ToastDismissed,
    ErrorDismissed,
}

impl Event {
    /// Stable name for tracing; payloads stay out of logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AppStarted => "AppStarted",
            Self::Configured(_) => "Configured",
            Self::AppForegrounded => "AppForegrounded",
            Self::AppBackgrounded => "AppBackgrounded",
            Self::NetworkStatusChanged { .. } => "NetworkStatusChanged",
            Self::ConnectRequested => "ConnectRequested",
            Self::AuthorizationResult(_) => "AuthorizationResult",
            Self::TokenExchangeResponse(_) => "TokenExchangeResponse",
            Self::TokenRefreshResponse(_) => "TokenRefreshResponse",
            Self::SignOutRequested => "SignOutRequested",
            Self::DeauthorizeResponse(_) => "DeauthorizeResponse",
            Self::SessionLoaded(_) => "SessionLoaded",
            Self::SessionPersisted(_) => "SessionPersisted",
            Self::SessionCleared(_) => "SessionCleared",
            Self::MapRegionChanged { .. } => "MapRegionChanged",
            Self::PeaksFetched { .. } => "PeaksFetched",
            Self::ChallengesFetched { .. } => "ChallengesFetched",
            Self::PeakMarkerTapped { .. } => "PeakMarkerTapped",
            Self::ChallengeMarkerTapped { .. } => "ChallengeMarkerTapped",
            Self::SelectionCleared => "SelectionCleared",
            Self::ChallengeFocusRequested { .. } => "ChallengeFocusRequested",
            Self::ChallengeDetailFetched { .. } => "ChallengeDetailFetched",
            Self::UserFocusRequested { .. } => "UserFocusRequested",
            Self::UserSummitsFetched { .. } => "UserSummitsFetched",
            Self::PeakFocusRequested { .. } => "PeakFocusRequested",
            Self::FocusCleared => "FocusCleared",
            Self::PeakDetailFetched { .. } => "PeakDetailFetched",
            Self::RecenterRequested => "RecenterRequested",
            Self::FitBoundsConsumed => "FitBoundsConsumed",
            Self::FlyToConsumed => "FlyToConsumed",
            Self::SheetSnapConsumed => "SheetSnapConsumed",
            Self::RouteChanged(_) => "RouteChanged",
            Self::SheetMoved(_) => "SheetMoved",
            Self::TripReportSubmitted { .. } => "TripReportSubmitted",
            Self::ManualSummitLogged { .. } => "ManualSummitLogged",
            Self::OutboxFlushRequested => "OutboxFlushRequested",
            Self::SubmissionResponse { .. } => "SubmissionResponse",
            Self::OutboxRestored(_) => "OutboxRestored",
            Self::OutboxPersisted(_) => "OutboxPersisted",
            #[cfg(feature = "camera")]
            Self::PhotoCaptureRequested => "PhotoCaptureRequested",
            #[cfg(feature = "camera")]
            Self::PhotoCaptureResult(_) => "PhotoCaptureResult",
            #[cfg(feature = "camera")]
            Self::StagedPhotoDiscarded => "StagedPhotoDiscarded",
            #[cfg(feature = "camera")]
            Self::PhotoTicketResponse { .. } => "PhotoTicketResponse",
            #[cfg(feature = "camera")]
            Self::PhotoUploadResponse { .. } => "PhotoUploadResponse",
            #[cfg(feature = "push")]
            Self::PushPermissionRequested => "PushPermissionRequested",
            #[cfg(feature = "push")]
            Self::PushRegistrationResult(_) => "PushRegistrationResult",
            #[cfg(feature = "push")]
            Self::NotificationTapped(_) => "NotificationTapped",
            Self::ToastDismissed => "ToastDismissed",
            Self::ErrorDismissed => "ErrorDismissed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_payload_free() {
        let event = Event::PeakMarkerTapped {
            peak_id: PeakId::from("secret-peak-id"),
        };
        assert_eq!(event.name(), "PeakMarkerTapped");
        assert!(!event.name().contains("secret"));
    }
}
