//! Map focus, selection, and viewport state.
//!
//! One struct, [`MapState`], owns three orthogonal pieces of map state:
//! what the map is *showing* (focus), what the user has *tapped*
//! (selection), and where the camera *is* (viewport), plus one-shot
//! camera commands the shell consumes. Fields are private so every
//! transition goes through a method that upholds the invariants:
//!
//! - at most one of the peak/challenge selection IDs is set;
//! - a floating selection always has a selected entity behind it;
//! - discovery focus carries no selection.

use serde::{Deserialize, Serialize};

use crate::model::{Bounds, ChallengeId, LngLat, Peak, PeakId, UserId};
use crate::{DEFAULT_FIT_PADDING, MIN_SEARCH_ZOOM};

/// The entity set the map is currently scoped to.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MapFocus {
    /// Browsing: markers come from viewport queries.
    #[default]
    Discovery,
    /// A challenge's full peak list, regardless of viewport.
    Challenge {
        challenge_id: ChallengeId,
        peaks: Vec<FocusPeak>,
    },
    /// Every peak a user has summited.
    User {
        user_id: UserId,
        peaks: Vec<FocusPeak>,
    },
    /// A single peak.
    Peak { peak_id: PeakId, coords: LngLat },
}

impl MapFocus {
    #[must_use]
    pub fn kind(&self) -> FocusKind {
        match self {
            Self::Discovery => FocusKind::Discovery,
            Self::Challenge { .. } => FocusKind::Challenge,
            Self::User { .. } => FocusKind::User,
            Self::Peak { .. } => FocusKind::Peak,
        }
    }
}

/// Discriminant of [`MapFocus`] for the view model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusKind {
    Discovery,
    Challenge,
    User,
    Peak,
}

/// Marker payload for challenge and user focus overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusPeak {
    pub id: PeakId,
    pub coords: LngLat,
    pub summited: bool,
}

impl From<&Peak> for FocusPeak {
    fn from(peak: &Peak) -> Self {
        Self {
            id: peak.id.clone(),
            coords: peak.coords,
            summited: peak.summited,
        }
    }
}

/// How the current selection is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionMode {
    #[default]
    None,
    /// Compact card over the map.
    Floating,
    /// Full detail screen.
    Detail,
}

/// Camera state as last reported by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: LngLat,
    pub zoom: f64,
    pub bounds: Bounds,
}

/// One-shot instruction to fit the camera to a box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingFitBounds {
    pub bounds: Bounds,
    pub padding: f64,
}

/// One-shot instruction to animate the camera to a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingFlyTo {
    pub center: LngLat,
    pub zoom: Option<f64>,
}

/// Detents of the bottom sheet overlaying the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SheetPosition {
    #[default]
    Collapsed,
    Halfway,
    Expanded,
}

/// Navigation routes the core coordinates map state with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Route {
    Discovery,
    PeakDetail(PeakId),
    ChallengeDetail(ChallengeId),
    UserProfile(UserId),
}

impl Route {
    #[must_use]
    pub fn is_detail(&self) -> bool {
        matches!(self, Self::PeakDetail(_) | Self::ChallengeDetail(_))
    }
}

/// Where "recenter" should take the camera for the current focus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecenterTarget<'a> {
    Point(LngLat),
    PeakSet(&'a [FocusPeak]),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapState {
    focus: MapFocus,
    selection_mode: SelectionMode,
    selected_peak_id: Option<PeakId>,
    selected_challenge_id: Option<ChallengeId>,
    viewport: Option<Viewport>,
    sheet_position: SheetPosition,
    pending_fit_bounds: Option<PendingFitBounds>,
    pending_fly_to: Option<PendingFlyTo>,
    pending_sheet_snap: Option<SheetPosition>,
}

impl MapState {
    #[must_use]
    pub fn focus(&self) -> &MapFocus {
        &self.focus
    }

    #[must_use]
    pub fn selection_mode(&self) -> SelectionMode {
        self.selection_mode
    }

    #[must_use]
    pub fn selected_peak_id(&self) -> Option<&PeakId> {
        self.selected_peak_id.as_ref()
    }

    #[must_use]
    pub fn selected_challenge_id(&self) -> Option<&ChallengeId> {
        self.selected_challenge_id.as_ref()
    }

    #[must_use]
    pub fn viewport(&self) -> Option<&Viewport> {
        self.viewport.as_ref()
    }

    #[must_use]
    pub fn sheet_position(&self) -> SheetPosition {
        self.sheet_position
    }

    #[must_use]
    pub fn pending_fit_bounds(&self) -> Option<&PendingFitBounds> {
        self.pending_fit_bounds.as_ref()
    }

    #[must_use]
    pub fn pending_fly_to(&self) -> Option<&PendingFlyTo> {
        self.pending_fly_to.as_ref()
    }

    #[must_use]
    pub fn pending_sheet_snap(&self) -> Option<SheetPosition> {
        self.pending_sheet_snap
    }

    /// True until the shell has reported a region, and whenever zoom is
    /// below [`MIN_SEARCH_ZOOM`]. Gates viewport queries.
    #[must_use]
    pub fn is_zoomed_out_too_far(&self) -> bool {
        self.viewport.map_or(true, |v| v.zoom < MIN_SEARCH_ZOOM)
    }

    /// Peaks rendered instead of viewport results, if the focus carries
    /// its own set. Discovery and single-peak focus have none.
    #[must_use]
    pub fn overlay_peaks(&self) -> Option<&[FocusPeak]> {
        match &self.focus {
            MapFocus::Challenge { peaks, .. } | MapFocus::User { peaks, .. } => {
                Some(peaks.as_slice())
            }
            MapFocus::Discovery | MapFocus::Peak { .. } => None,
        }
    }

    #[must_use]
    pub fn recenter_target(&self) -> Option<RecenterTarget<'_>> {
        match &self.focus {
            MapFocus::Discovery => None,
            MapFocus::Peak { coords, .. } => Some(RecenterTarget::Point(*coords)),
            MapFocus::Challenge { peaks, .. } | MapFocus::User { peaks, .. } => {
                Some(RecenterTarget::PeakSet(peaks))
            }
        }
    }

    // --- focus transitions ---

    /// Return to browsing. Clears focus and any selection.
    pub fn focus_discovery(&mut self) {
        self.focus = MapFocus::Discovery;
        self.selected_peak_id = None;
        self.selected_challenge_id = None;
        self.selection_mode = SelectionMode::None;
    }

    /// Scope the map to a challenge's peaks. The challenge becomes the
    /// selected entity; any peak selection is dropped.
    pub fn focus_challenge(&mut self, challenge_id: ChallengeId, peaks: Vec<FocusPeak>) {
        self.selected_peak_id = None;
        self.selected_challenge_id = Some(challenge_id.clone());
        self.focus = MapFocus::Challenge { challenge_id, peaks };
    }

    /// Scope the map to a user's summited peaks. A user is not a
    /// selectable entity, so any selection is dropped.
    pub fn focus_user(&mut self, user_id: UserId, peaks: Vec<FocusPeak>) {
        self.selected_peak_id = None;
        self.selected_challenge_id = None;
        if self.selection_mode == SelectionMode::Floating {
            self.selection_mode = SelectionMode::None;
        }
        self.focus = MapFocus::User { user_id, peaks };
    }

    /// Scope the map to one peak, selecting it.
    pub fn focus_peak(&mut self, peak_id: PeakId, coords: LngLat) {
        self.selected_challenge_id = None;
        self.selected_peak_id = Some(peak_id.clone());
        self.focus = MapFocus::Peak { peak_id, coords };
    }

    /// Replace the peak payload of a challenge or user focus in place,
    /// keeping the focused entity. No-op in other focus states.
    pub fn update_focus_peaks(&mut self, updated: Vec<FocusPeak>) {
        match &mut self.focus {
            MapFocus::Challenge { peaks, .. } | MapFocus::User { peaks, .. } => {
                *peaks = updated;
            }
            MapFocus::Discovery | MapFocus::Peak { .. } => {}
        }
    }

    // --- selection transitions ---

    /// Marker tap: select a peak with a floating card. Focus unchanged.
    pub fn select_peak(&mut self, peak_id: PeakId) {
        self.selected_challenge_id = None;
        self.selected_peak_id = Some(peak_id);
        self.selection_mode = SelectionMode::Floating;
    }

    /// Marker tap: select a challenge with a floating card.
    pub fn select_challenge(&mut self, challenge_id: ChallengeId) {
        self.selected_peak_id = None;
        self.selected_challenge_id = Some(challenge_id);
        self.selection_mode = SelectionMode::Floating;
    }

    pub fn clear_selection(&mut self) {
        self.selected_peak_id = None;
        self.selected_challenge_id = None;
        self.selection_mode = SelectionMode::None;
    }

    // --- route and sheet coordination ---

    /// Navigation landed on a peak detail screen. The routed peak
    /// becomes the selection; an existing floating card (which is what
    /// the user tapped through) keeps its mode.
    pub fn enter_peak_detail(&mut self, peak_id: PeakId) {
        self.selected_challenge_id = None;
        self.selected_peak_id = Some(peak_id);
        if self.selection_mode != SelectionMode::Floating {
            self.selection_mode = SelectionMode::Detail;
        }
    }

    /// Navigation landed on a challenge detail screen.
    pub fn enter_challenge_detail(&mut self, challenge_id: ChallengeId) {
        self.selected_peak_id = None;
        self.selected_challenge_id = Some(challenge_id);
        if self.selection_mode != SelectionMode::Floating {
            self.selection_mode = SelectionMode::Detail;
        }
    }

    /// Navigation returned from a detail screen to the map: clear the
    /// selection and ask the sheet to settle at halfway.
    pub fn return_to_discovery_route(&mut self) {
        self.clear_selection();
        self.pending_sheet_snap = Some(SheetPosition::Halfway);
    }

    /// Shell reported a sheet move. Dragging the sheet open while a
    /// floating card is up dismisses the card.
    pub fn on_sheet_moved(&mut self, position: SheetPosition) {
        if position != SheetPosition::Collapsed
            && self.selection_mode == SelectionMode::Floating
        {
            self.clear_selection();
        }
        self.sheet_position = position;
    }

    // --- viewport and one-shot camera commands ---

    pub fn update_region(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    /// Queue a fit-bounds command. Last writer wins; an unconsumed
    /// command is overwritten, never queued behind.
    pub fn request_fit_bounds(&mut self, bounds: Bounds, padding: f64) {
        self.pending_fit_bounds = Some(PendingFitBounds { bounds, padding });
    }

    pub fn request_fit_to_focus(&mut self) {
        if let Some(bounds) = match &self.focus {
            MapFocus::Challenge { peaks, .. } | MapFocus::User { peaks, .. } => {
                Bounds::enclosing(peaks.iter().map(|p| p.coords))
            }
            MapFocus::Discovery | MapFocus::Peak { .. } => None,
        } {
            self.request_fit_bounds(bounds, DEFAULT_FIT_PADDING);
        }
    }

    pub fn clear_pending_fit_bounds(&mut self) {
        self.pending_fit_bounds = None;
    }

    /// Queue a fly-to command. Last writer wins.
    pub fn request_fly_to(&mut self, center: LngLat, zoom: Option<f64>) {
        self.pending_fly_to = Some(PendingFlyTo { center, zoom });
    }

    pub fn clear_pending_fly_to(&mut self) {
        self.pending_fly_to = None;
    }

    pub fn clear_pending_sheet_snap(&mut self) {
        self.pending_sheet_snap = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak_id(s: &str) -> PeakId {
        PeakId::from(s)
    }

    fn coords(lng: f64, lat: f64) -> LngLat {
        LngLat::new(lng, lat).unwrap()
    }

    fn focus_peaks() -> Vec<FocusPeak> {
        vec![
            FocusPeak {
                id: peak_id("p1"),
                coords: coords(-105.6, 40.25),
                summited: true,
            },
            FocusPeak {
                id: peak_id("p2"),
                coords: coords(-105.5, 40.1),
                summited: false,
            },
        ]
    }

    fn viewport(zoom: f64) -> Viewport {
        let center = coords(-105.5, 40.2);
        Viewport {
            center,
            zoom,
            bounds: Bounds {
                sw: coords(-106.0, 39.8),
                ne: coords(-105.0, 40.6),
            },
        }
    }

    #[test]
    fn selection_ids_are_mutually_exclusive() {
        let mut map = MapState::default();

        map.select_peak(peak_id("p1"));
        assert!(map.selected_peak_id().is_some());
        assert!(map.selected_challenge_id().is_none());

        map.select_challenge(ChallengeId::from("c1"));
        assert!(map.selected_peak_id().is_none());
        assert_eq!(map.selected_challenge_id(), Some(&ChallengeId::from("c1")));

        map.select_peak(peak_id("p2"));
        assert!(map.selected_challenge_id().is_none());
        assert_eq!(map.selected_peak_id(), Some(&peak_id("p2")));
    }

    #[test]
    fn floating_mode_always_has_a_selected_entity() {
        let mut map = MapState::default();
        map.select_peak(peak_id("p1"));
        assert_eq!(map.selection_mode(), SelectionMode::Floating);
        assert!(map.selected_peak_id().is_some() || map.selected_challenge_id().is_some());

        // Shifting to a user focus drops the selection, so floating
        // mode cannot survive it.
        map.focus_user(UserId::from("u1"), focus_peaks());
        assert_eq!(map.selection_mode(), SelectionMode::None);
        assert!(map.selected_peak_id().is_none());
        assert!(map.selected_challenge_id().is_none());
    }

    #[test]
    fn discovery_focus_clears_selection() {
        let mut map = MapState::default();
        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());
        map.select_peak(peak_id("p1"));

        map.focus_discovery();
        assert_eq!(map.focus().kind(), FocusKind::Discovery);
        assert!(map.selected_peak_id().is_none());
        assert!(map.selected_challenge_id().is_none());
        assert_eq!(map.selection_mode(), SelectionMode::None);
    }

    #[test]
    fn overlay_peaks_only_for_challenge_and_user_focus() {
        let mut map = MapState::default();
        assert!(map.overlay_peaks().is_none());

        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());
        assert_eq!(map.overlay_peaks().unwrap().len(), 2);

        map.focus_user(UserId::from("u1"), focus_peaks());
        assert_eq!(map.overlay_peaks().unwrap().len(), 2);

        map.focus_peak(peak_id("p1"), coords(-105.6, 40.25));
        assert!(map.overlay_peaks().is_none());

        map.focus_discovery();
        assert!(map.overlay_peaks().is_none());
    }

    #[test]
    fn peak_focus_does_not_inherit_parent_overlay() {
        // Switching from a challenge focus straight to a peak focus
        // must not leave the challenge's markers behind.
        let mut map = MapState::default();
        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());
        map.focus_peak(peak_id("p1"), coords(-105.6, 40.25));

        assert!(map.overlay_peaks().is_none());
        assert_eq!(map.focus().kind(), FocusKind::Peak);
        assert!(map.selected_challenge_id().is_none());
        assert_eq!(map.selected_peak_id(), Some(&peak_id("p1")));
    }

    #[test]
    fn zoom_gate_thresholds() {
        let mut map = MapState::default();
        // No region reported yet counts as too far out.
        assert!(map.is_zoomed_out_too_far());

        map.update_region(viewport(6.9));
        assert!(map.is_zoomed_out_too_far());

        // Exactly at the threshold still queries.
        map.update_region(viewport(7.0));
        assert!(!map.is_zoomed_out_too_far());

        map.update_region(viewport(12.0));
        assert!(!map.is_zoomed_out_too_far());
    }

    #[test]
    fn pending_commands_are_single_slot_last_write_wins() {
        let mut map = MapState::default();

        map.request_fly_to(coords(-105.6, 40.25), Some(13.0));
        map.request_fly_to(coords(-106.0, 39.0), None);
        let pending = map.pending_fly_to().unwrap();
        assert_eq!(pending.center, coords(-106.0, 39.0));
        assert_eq!(pending.zoom, None);

        map.clear_pending_fly_to();
        assert!(map.pending_fly_to().is_none());

        let b1 = Bounds {
            sw: coords(-106.0, 39.8),
            ne: coords(-105.0, 40.6),
        };
        let b2 = Bounds {
            sw: coords(-120.0, 35.0),
            ne: coords(-119.0, 36.0),
        };
        map.request_fit_bounds(b1, 48.0);
        map.request_fit_bounds(b2, 24.0);
        let pending = map.pending_fit_bounds().unwrap();
        assert_eq!(pending.bounds, b2);
        assert_eq!(pending.padding, 24.0);

        map.clear_pending_fit_bounds();
        assert!(map.pending_fit_bounds().is_none());
    }

    #[test]
    fn recenter_target_per_focus() {
        let mut map = MapState::default();
        assert!(map.recenter_target().is_none());

        let summit = coords(-105.6, 40.25);
        map.focus_peak(peak_id("p1"), summit);
        assert_eq!(map.recenter_target(), Some(RecenterTarget::Point(summit)));

        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());
        match map.recenter_target() {
            Some(RecenterTarget::PeakSet(peaks)) => assert_eq!(peaks.len(), 2),
            other => panic!("expected a peak set, got {other:?}"),
        }
    }

    #[test]
    fn update_focus_peaks_replaces_payload_in_place() {
        let mut map = MapState::default();
        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());

        let mut updated = focus_peaks();
        updated[1].summited = true;
        map.update_focus_peaks(updated);

        let overlay = map.overlay_peaks().unwrap();
        assert!(overlay.iter().all(|p| p.summited));
        assert_eq!(map.selected_challenge_id(), Some(&ChallengeId::from("c1")));

        // No-op outside challenge/user focus.
        map.focus_discovery();
        map.update_focus_peaks(focus_peaks());
        assert!(map.overlay_peaks().is_none());
    }

    #[test]
    fn detail_route_forces_detail_mode_unless_floating() {
        let mut map = MapState::default();

        // Deep link: no prior selection.
        map.enter_peak_detail(peak_id("p1"));
        assert_eq!(map.selection_mode(), SelectionMode::Detail);
        assert_eq!(map.selected_peak_id(), Some(&peak_id("p1")));

        // Tapping through a floating card keeps the floating mode.
        let mut map = MapState::default();
        map.select_peak(peak_id("p2"));
        map.enter_peak_detail(peak_id("p2"));
        assert_eq!(map.selection_mode(), SelectionMode::Floating);
    }

    #[test]
    fn returning_to_discovery_route_snaps_sheet_halfway() {
        let mut map = MapState::default();
        map.enter_peak_detail(peak_id("p1"));

        map.return_to_discovery_route();
        assert!(map.selected_peak_id().is_none());
        assert_eq!(map.selection_mode(), SelectionMode::None);
        assert_eq!(map.pending_sheet_snap(), Some(SheetPosition::Halfway));

        map.clear_pending_sheet_snap();
        assert!(map.pending_sheet_snap().is_none());
    }

    #[test]
    fn opening_sheet_dismisses_floating_card() {
        let mut map = MapState::default();
        map.select_peak(peak_id("p1"));

        map.on_sheet_moved(SheetPosition::Halfway);
        assert_eq!(map.selection_mode(), SelectionMode::None);
        assert!(map.selected_peak_id().is_none());
        assert_eq!(map.sheet_position(), SheetPosition::Halfway);

        // Collapsing never touches the selection.
        map.select_peak(peak_id("p2"));
        map.on_sheet_moved(SheetPosition::Collapsed);
        assert_eq!(map.selection_mode(), SelectionMode::Floating);

        // Detail mode survives sheet movement.
        let mut map = MapState::default();
        map.enter_peak_detail(peak_id("p3"));
        map.on_sheet_moved(SheetPosition::Expanded);
        assert_eq!(map.selection_mode(), SelectionMode::Detail);
    }

    #[test]
    fn clear_selection_keeps_focus() {
        let mut map = MapState::default();
        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());
        map.select_peak(peak_id("p1"));

        map.clear_selection();
        assert_eq!(map.focus().kind(), FocusKind::Challenge);
        assert!(map.overlay_peaks().is_some());
        assert_eq!(map.selection_mode(), SelectionMode::None);
    }

    #[test]
    fn fit_to_focus_encloses_focus_peaks() {
        let mut map = MapState::default();
        map.focus_challenge(ChallengeId::from("c1"), focus_peaks());
        map.request_fit_to_focus();

        let pending = map.pending_fit_bounds().unwrap();
        assert_eq!(pending.bounds.sw, coords(-105.6, 40.1));
        assert_eq!(pending.bounds.ne, coords(-105.5, 40.25));
        assert_eq!(pending.padding, DEFAULT_FIT_PADDING);

        // Nothing to fit in discovery.
        let mut map = MapState::default();
        map.request_fit_to_focus();
        assert!(map.pending_fit_bounds().is_none());
    }
}
