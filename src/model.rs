//! Domain records and the root [`Model`].

use std::num::NonZeroUsize;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, ErrorKind};
use crate::map::{MapState, Route};
use crate::outbox::Outbox;
use crate::session::SessionState;
use crate::{MAX_SUMMIT_NOTES_LENGTH, MAX_TRIP_REPORT_LENGTH, PEAK_DETAIL_CACHE_SIZE};

/// Newtype IDs so a peak ID can never be passed where a challenge ID is
/// expected.
macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

typed_id!(PeakId);
typed_id!(ChallengeId);
typed_id!(UserId);
typed_id!(OpId);

impl OpId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Millisecond Unix timestamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(crate::get_current_time_ms())
    }

    #[must_use]
    pub fn saturating_add(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeoError {
    #[error("longitude {0} out of range [-180, 180]")]
    InvalidLongitude(String),
    #[error("latitude {0} out of range [-90, 90]")]
    InvalidLatitude(String),
}

/// A WGS84 coordinate, longitude first to match the wire format and the
/// map SDKs on every shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Result<Self, GeoError> {
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(GeoError::InvalidLongitude(lng.to_string()));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat.to_string()));
        }
        Ok(Self { lng, lat })
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        Self::new(self.lng, self.lat).is_ok()
    }
}

/// Axis-aligned geographic box, south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub sw: LngLat,
    pub ne: LngLat,
}

impl Bounds {
    /// Smallest box enclosing every coordinate. `None` for an empty set.
    /// Antimeridian-crossing sets are not special-cased.
    #[must_use]
    pub fn enclosing(coords: impl IntoIterator<Item = LngLat>) -> Option<Self> {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut sw = first;
        let mut ne = first;
        for c in iter {
            sw.lng = sw.lng.min(c.lng);
            sw.lat = sw.lat.min(c.lat);
            ne.lng = ne.lng.max(c.lng);
            ne.lat = ne.lat.max(c.lat);
        }
        Some(Self { sw, ne })
    }

    /// Comma-separated `west,south,east,north` query fragment.
    #[must_use]
    pub fn to_query(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6}",
            self.sw.lng, self.sw.lat, self.ne.lng, self.ne.lat
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub id: PeakId,
    pub name: String,
    pub coords: LngLat,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub summited: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeSummary {
    pub id: ChallengeId,
    pub name: String,
    pub centroid: LngLat,
    pub peak_count: u32,
    #[serde(default)]
    pub completed_count: Option<u32>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeDetail {
    #[serde(flatten)]
    pub summary: ChallengeSummary,
    pub peaks: Vec<Peak>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripReport {
    pub id: String,
    pub author_name: String,
    pub text: String,
    pub created_at: UnixTimeMs,
    #[serde(default)]
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDetail {
    #[serde(flatten)]
    pub peak: Peak,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summit_count: Option<u32>,
    #[serde(default)]
    pub recent_reports: Vec<TripReport>,
    #[serde(default)]
    pub challenges: Vec<ChallengeSummary>,
}

/// User-entered trip report, validated before it enters the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripReportDraft {
    pub text: String,
    pub rating: Option<u8>,
    pub hiked_on: Option<UnixTimeMs>,
}

impl TripReportDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.text.trim().is_empty() {
            return Err(AppError::validation("Report can't be empty"));
        }
        if self.text.len() > MAX_TRIP_REPORT_LENGTH {
            return Err(AppError::validation(format!(
                "Report is too long (max {MAX_TRIP_REPORT_LENGTH} characters)"
            )));
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(AppError::validation("Rating must be between 1 and 5"));
            }
        }
        Ok(())
    }
}

pub fn validate_summit_notes(notes: Option<&str>) -> Result<(), AppError> {
    if let Some(notes) = notes {
        if notes.len() > MAX_SUMMIT_NOTES_LENGTH {
            return Err(AppError::validation(format!(
                "Notes are too long (max {MAX_SUMMIT_NOTES_LENGTH} characters)"
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthleteProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl AthleteProfile {
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.firstname, &self.lastname) {
            (Some(f), Some(l)) => format!("{f} {l}"),
            (Some(f), None) => f.clone(),
            _ => self.username.clone(),
        }
    }
}

pub const DEFAULT_API_BASE: &str = "https://api.pathquest.app";
pub const DEFAULT_STRAVA_CLIENT_ID: &str = "pathquest-mobile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub strava_client_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            strava_client_id: DEFAULT_STRAVA_CLIENT_ID.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| AppError::new(ErrorKind::Validation, format!("Invalid API base: {e}")))?;
        if url.scheme() != "https" && url.host_str() != Some("localhost") {
            return Err(AppError::new(
                ErrorKind::Validation,
                "API base must use https",
            ));
        }
        if self.strava_client_id.trim().is_empty() {
            return Err(AppError::new(
                ErrorKind::Validation,
                "Missing Strava client id",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToastKind {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastMessage {
    pub kind: ToastKind,
    pub message: String,
    pub duration_ms: u64,
}

impl ToastMessage {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
            duration_ms: 3_000,
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Info,
            message: message.into(),
            duration_ms: 3_000,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Warning,
            message: message.into(),
            duration_ms: 5_000,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
            duration_ms: 6_000,
        }
    }
}

/// Photo captured on-device, held in memory until its outbox entry
/// uploads. Never persisted to storage.
#[cfg(feature = "camera")]
#[derive(Clone, PartialEq, Eq)]
pub struct StagedPhoto {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

#[cfg(feature = "camera")]
impl std::fmt::Debug for StagedPhoto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedPhoto")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(feature = "push")]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushState {
    pub permission_granted: bool,
    pub token: Option<String>,
    pub token_synced: bool,
}

pub struct Model {
    pub config: ApiConfig,
    pub session: SessionState,
    pub map: MapState,
    pub route: Route,
    /// Peaks fetched for the current viewport (discovery layer).
    pub peaks: Vec<Peak>,
    pub challenges: Vec<ChallengeSummary>,
    pub peak_details: LruCache<PeakId, PeakDetail>,
    /// Monotonic stamp on viewport queries; stale responses are dropped.
    pub fetch_generation: u64,
    pub is_fetching_viewport: bool,
    pub outbox: Outbox,
    pub network_online: bool,
    #[cfg(feature = "camera")]
    pub staged_photo: Option<StagedPhoto>,
    #[cfg(feature = "push")]
    pub push: PushState,
    pub active_error: Option<AppError>,
    pub active_toast: Option<ToastMessage>,
}

impl Default for Model {
    fn default() -> Self {
        let cache_size =
            NonZeroUsize::new(PEAK_DETAIL_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            config: ApiConfig::default(),
            session: SessionState::default(),
            map: MapState::default(),
            route: Route::Discovery,
            peaks: Vec::new(),
            challenges: Vec::new(),
            peak_details: LruCache::new(cache_size),
            fetch_generation: 0,
            is_fetching_viewport: false,
            outbox: Outbox::default(),
            network_online: true,
            #[cfg(feature = "camera")]
            staged_photo: None,
            #[cfg(feature = "push")]
            push: PushState::default(),
            active_error: None,
            active_toast: None,
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("session", &self.session)
            .field("map", &self.map)
            .field("route", &self.route)
            .field("peaks", &self.peaks.len())
            .field("challenges", &self.challenges.len())
            .field("cached_details", &self.peak_details.len())
            .field("fetch_generation", &self.fetch_generation)
            .field("outbox_pending", &self.outbox.pending_count())
            .field("network_online", &self.network_online)
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Flip the summited flag everywhere the peak appears so the UI
    /// reflects a submission before the server confirms it.
    pub fn mark_peak_summited(&mut self, peak_id: &PeakId) {
        if let Some(peak) = self.peaks.iter_mut().find(|p| &p.id == peak_id) {
            peak.summited = true;
        }
        if let Some(detail) = self.peak_details.peek_mut(peak_id) {
            detail.peak.summited = true;
        }
        if let Some(overlay) = self.map.overlay_peaks() {
            if overlay.iter().any(|p| &p.id == peak_id) {
                let updated: Vec<_> = overlay
                    .iter()
                    .cloned()
                    .map(|mut p| {
                        if &p.id == peak_id {
                            p.summited = true;
                        }
                        p
                    })
                    .collect();
                self.map.update_focus_peaks(updated);
            }
        }
    }
}
