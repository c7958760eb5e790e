//! Serializable projection of the model for the shells.
//!
//! Everything here is presentation-shaped: pins ready to drop on the
//! map, formatted strings, and the one-shot camera commands awaiting
//! consumption. Shells never see tokens or raw errors.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::map::{
    FocusKind, MapFocus, PendingFitBounds, PendingFlyTo, SelectionMode, SheetPosition,
};
use crate::model::{Model, ToastMessage};
use crate::session::SessionPhase;
use crate::{
    format_distance, format_elevation, format_time_ago, get_current_time_ms, haversine_distance,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionView {
    SignedOut,
    Authorizing,
    SignedIn {
        display_name: String,
        avatar_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakPin {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub summited: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengePin {
    pub id: String,
    pub lng: f64,
    pub lat: f64,
    pub name: String,
    pub peak_count: u32,
    pub selected: bool,
}

/// Compact card shown over the map for a floating selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FloatingCard {
    Peak {
        id: String,
        /// Absent until the detail fetch lands.
        name: Option<String>,
        elevation_text: Option<String>,
        /// Distance from the current viewport center, once one exists.
        distance_text: Option<String>,
        summited: bool,
    },
    Challenge {
        id: String,
        name: String,
        peak_count: u32,
        completed_count: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub focus_kind: FocusKind,
    pub selection_mode: SelectionMode,
    pub peak_pins: Vec<PeakPin>,
    pub challenge_pins: Vec<ChallengePin>,
    pub floating_card: Option<FloatingCard>,
    /// Show the "zoom in to explore" banner.
    pub zoom_gate_active: bool,
    /// A viewport query is outstanding; drive a loading indicator.
    pub is_fetching: bool,
    pub can_recenter: bool,
    pub pending_fit_bounds: Option<PendingFitBounds>,
    pub pending_fly_to: Option<PendingFlyTo>,
    pub pending_sheet_snap: Option<SheetPosition>,
    pub sheet_position: SheetPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripReportView {
    pub author_name: String,
    pub text: String,
    pub age_text: String,
    pub rating: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDetailView {
    pub id: String,
    pub name: String,
    pub elevation_text: String,
    pub summited: bool,
    pub description: Option<String>,
    pub summit_count: Option<u32>,
    pub reports: Vec<TripReportView>,
    pub challenge_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub message: String,
    pub is_retryable: bool,
}

impl From<&AppError> for UserFacingError {
    fn from(err: &AppError) -> Self {
        Self {
            message: err.user_facing_message(),
            is_retryable: err.is_retryable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewModel {
    pub session: SessionView,
    pub map: MapView,
    /// Populated when the current route is a peak detail and its data
    /// has arrived.
    pub peak_detail: Option<PeakDetailView>,
    pub pending_submissions: usize,
    /// Submissions given up on, surfaced so the shell can offer a retry.
    pub failed_submissions: usize,
    pub network_online: bool,
    pub toast: Option<ToastMessage>,
    pub error: Option<UserFacingError>,
}

impl ViewModel {
    #[must_use]
    pub fn build(model: &Model) -> Self {
        Self {
            session: session_view(model),
            map: map_view(model),
            peak_detail: peak_detail_view(model),
            pending_submissions: model.outbox.pending_count(),
            failed_submissions: model.outbox.failed_entries().len(),
            network_online: model.network_online,
            toast: model.active_toast.clone(),
            error: model.active_error.as_ref().map(UserFacingError::from),
        }
    }
}

fn session_view(model: &Model) -> SessionView {
    match model.session.phase {
        SessionPhase::SignedOut => SessionView::SignedOut,
        SessionPhase::Authorizing => SessionView::Authorizing,
        SessionPhase::SignedIn | SessionPhase::Refreshing => {
            model.session.athlete.as_ref().map_or(
                SessionView::SignedIn {
                    display_name: "PathQuest hiker".to_string(),
                    avatar_url: None,
                },
                |athlete| SessionView::SignedIn {
                    display_name: athlete.display_name(),
                    avatar_url: athlete.avatar_url.clone(),
                },
            )
        }
    }
}

fn map_view(model: &Model) -> MapView {
    let map = &model.map;
    let selected_peak = map.selected_peak_id();
    let selected_challenge = map.selected_challenge_id();

    let (peak_pins, challenge_pins) = match map.focus() {
        MapFocus::Discovery => {
            let peaks = model
                .peaks
                .iter()
                .map(|p| PeakPin {
                    id: p.id.to_string(),
                    lng: p.coords.lng,
                    lat: p.coords.lat,
                    summited: p.summited,
                    selected: selected_peak == Some(&p.id),
                })
                .collect();
            let challenges = model
                .challenges
                .iter()
                .map(|c| ChallengePin {
                    id: c.id.to_string(),
                    lng: c.centroid.lng,
                    lat: c.centroid.lat,
                    name: c.name.clone(),
                    peak_count: c.peak_count,
                    selected: selected_challenge == Some(&c.id),
                })
                .collect();
            (peaks, challenges)
        }
        MapFocus::Challenge { peaks, .. } | MapFocus::User { peaks, .. } => {
            let pins = peaks
                .iter()
                .map(|p| PeakPin {
                    id: p.id.to_string(),
                    lng: p.coords.lng,
                    lat: p.coords.lat,
                    summited: p.summited,
                    selected: selected_peak == Some(&p.id),
                })
                .collect();
            (pins, Vec::new())
        }
        MapFocus::Peak { peak_id, coords } => {
            let summited = model
                .peaks
                .iter()
                .find(|p| &p.id == peak_id)
                .map_or_else(
                    || {
                        model
                            .peak_details
                            .peek(peak_id)
                            .is_some_and(|d| d.peak.summited)
                    },
                    |p| p.summited,
                );
            let pin = PeakPin {
                id: peak_id.to_string(),
                lng: coords.lng,
                lat: coords.lat,
                summited,
                selected: true,
            };
            (vec![pin], Vec::new())
        }
    };

    MapView {
        focus_kind: map.focus().kind(),
        selection_mode: map.selection_mode(),
        peak_pins,
        challenge_pins,
        floating_card: floating_card(model),
        zoom_gate_active: map.focus().kind() == FocusKind::Discovery
            && map.is_zoomed_out_too_far(),
        is_fetching: model.is_fetching_viewport,
        can_recenter: map.recenter_target().is_some(),
        pending_fit_bounds: map.pending_fit_bounds().copied(),
        pending_fly_to: map.pending_fly_to().copied(),
        pending_sheet_snap: map.pending_sheet_snap(),
        sheet_position: map.sheet_position(),
    }
}

fn floating_card(model: &Model) -> Option<FloatingCard> {
    if model.map.selection_mode() != SelectionMode::Floating {
        return None;
    }

    let center = model.map.viewport().map(|v| v.center);
    let distance_from_center =
        |coords| center.map(|c| format_distance(haversine_distance(c, coords)));

    if let Some(peak_id) = model.map.selected_peak_id() {
        if let Some(peak) = model.peaks.iter().find(|p| &p.id == peak_id) {
            return Some(FloatingCard::Peak {
                id: peak.id.to_string(),
                name: Some(peak.name.clone()),
                elevation_text: peak.elevation_m.map(format_elevation),
                distance_text: distance_from_center(peak.coords),
                summited: peak.summited,
            });
        }
        if let Some(detail) = model.peak_details.peek(peak_id) {
            return Some(FloatingCard::Peak {
                id: detail.peak.id.to_string(),
                name: Some(detail.peak.name.clone()),
                elevation_text: detail.peak.elevation_m.map(format_elevation),
                distance_text: distance_from_center(detail.peak.coords),
                summited: detail.peak.summited,
            });
        }
        let overlay_hit = model
            .map
            .overlay_peaks()
            .and_then(|peaks| peaks.iter().find(|p| &p.id == peak_id).cloned());
        return Some(FloatingCard::Peak {
            id: peak_id.to_string(),
            name: None,
            elevation_text: None,
            distance_text: overlay_hit
                .as_ref()
                .and_then(|p| distance_from_center(p.coords)),
            summited: overlay_hit.map(|p| p.summited).unwrap_or(false),
        });
    }

    if let Some(challenge_id) = model.map.selected_challenge_id() {
        if let Some(challenge) = model.challenges.iter().find(|c| &c.id == challenge_id) {
            return Some(FloatingCard::Challenge {
                id: challenge.id.to_string(),
                name: challenge.name.clone(),
                peak_count: challenge.peak_count,
                completed_count: challenge.completed_count,
            });
        }
    }

    None
}

fn peak_detail_view(model: &Model) -> Option<PeakDetailView> {
    let crate::map::Route::PeakDetail(peak_id) = &model.route else {
        return None;
    };
    let detail = model.peak_details.peek(peak_id)?;
    let now_ms = get_current_time_ms();

    Some(PeakDetailView {
        id: detail.peak.id.to_string(),
        name: detail.peak.name.clone(),
        elevation_text: detail
            .peak
            .elevation_m
            .map_or_else(|| "Unknown".to_string(), format_elevation),
        summited: detail.peak.summited,
        description: detail.description.clone(),
        summit_count: detail.summit_count,
        reports: detail
            .recent_reports
            .iter()
            .map(|r| TripReportView {
                author_name: r.author_name.clone(),
                text: r.text.clone(),
                age_text: format_time_ago(r.created_at.0, now_ms),
                rating: r.rating,
            })
            .collect(),
        challenge_names: detail.challenges.iter().map(|c| c.name.clone()).collect(),
    })
}
