//! Shared core of the PathQuest mobile client.
//!
//! A Crux app: the shell (iOS/Android/Web) renders the view model and
//! executes effects; all state and transition logic lives here. The map
//! focus/selection/viewport model in [`map`] is the heart of the crate.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod error;
pub mod event;
pub mod map;
pub mod model;
pub mod outbox;
pub mod session;
pub mod view;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity};
pub use event::Event;
pub use map::{MapFocus, MapState, SelectionMode};
pub use model::Model;
pub use view::ViewModel;

/// Zoom level below which remote peak/challenge queries are suppressed.
/// Zoom exactly at the threshold still queries.
pub const MIN_SEARCH_ZOOM: f64 = 7.0;
pub const PEAK_FOCUS_ZOOM: f64 = 13.0;
/// Screen-point padding applied when fitting the camera to a peak set.
pub const DEFAULT_FIT_PADDING: f64 = 48.0;

pub const MAX_VIEWPORT_PEAKS: usize = 500;
pub const MAX_VIEWPORT_CHALLENGES: usize = 100;
pub const PEAK_DETAIL_CACHE_SIZE: usize = 64;

pub const MAX_OUTBOX_ENTRIES: usize = 50;
pub const MAX_RETRY_ATTEMPTS: u32 = 5;
pub const BASE_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;
pub const JITTER_MAX_MS: u64 = 1_000;

/// Tokens within this margin of expiry are refreshed before use.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

pub const MAX_TRIP_REPORT_LENGTH: usize = 4096;
pub const MAX_SUMMIT_NOTES_LENGTH: usize = 1024;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Great-circle distance in meters between two coordinates.
#[must_use]
pub fn haversine_distance(a: model::LngLat, b: model::LngLat) -> f64 {
    const EPSILON: f64 = 1e-10;

    if (a.lat - b.lat).abs() < EPSILON && (a.lng - b.lng).abs() < EPSILON {
        return 0.0;
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().asin();

    let result = EARTH_RADIUS_M * c;
    if result.is_finite() {
        result
    } else {
        f64::MAX
    }
}

#[must_use]
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() || meters < 0.0 {
        return "Unknown".to_string();
    }

    if meters < 1000.0 {
        format!("{meters:.0} m")
    } else if meters < 10_000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{:.0} km", meters / 1000.0)
    }
}

#[must_use]
pub fn format_elevation(meters: f64) -> String {
    if !meters.is_finite() {
        return "Unknown".to_string();
    }
    format!("{meters:.0} m")
}

#[must_use]
pub fn format_time_ago(timestamp_ms: u64, now_ms: u64) -> String {
    if timestamp_ms > now_ms {
        return "Just now".into();
    }

    let diff_secs = now_ms.saturating_sub(timestamp_ms) / 1000;

    if diff_secs < 60 {
        return "Just now".into();
    }

    let diff_mins = diff_secs / 60;
    if diff_mins < 60 {
        return format!("{diff_mins}m ago");
    }

    let diff_hours = diff_mins / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h ago");
    }

    let diff_days = diff_hours / 24;
    if diff_days < 7 {
        return format!("{diff_days}d ago");
    }
    if diff_days < 365 {
        return format!("{}w ago", diff_days / 7);
    }

    format!("{}y ago", diff_days / 365)
}
