use crux_core::testing::AppTester;
use crux_http::testing::ResponseBuilder;

use pathquest_core::map::{FocusKind, Route, SelectionMode, SheetPosition};
use pathquest_core::model::{
    Bounds, ChallengeDetail, ChallengeId, ChallengeSummary, LngLat, Peak, PeakId,
};
use pathquest_core::{App, Effect, Event, Model};

fn coords(lng: f64, lat: f64) -> LngLat {
    LngLat::new(lng, lat).unwrap()
}

fn region_event(zoom: f64) -> Event {
    Event::MapRegionChanged {
        center: coords(-105.5, 40.1),
        zoom,
        bounds: Bounds {
            sw: coords(-106.0, 39.8),
            ne: coords(-105.0, 40.4),
        },
    }
}

fn peak(id: &str, lng: f64, lat: f64) -> Peak {
    Peak {
        id: PeakId::from(id),
        name: format!("Peak {id}"),
        coords: coords(lng, lat),
        elevation_m: Some(4000.0),
        summited: false,
    }
}

fn challenge_summary(id: &str) -> ChallengeSummary {
    ChallengeSummary {
        id: id.into(),
        name: "Front Range 14ers".into(),
        centroid: coords(-105.6, 39.9),
        peak_count: 2,
        completed_count: Some(1),
        region: Some("Colorado".into()),
    }
}

#[test]
fn region_change_gates_queries_on_zoom() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    // Too far out: no HTTP traffic, just a render.
    let update = app.update(region_event(5.0), &mut model);
    assert!(model.map.is_zoomed_out_too_far());
    assert!(!update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Render(_))));

    // At the threshold exactly, queries go out.
    let update = app.update(region_event(7.0), &mut model);
    assert!(!model.map.is_zoomed_out_too_far());
    let http_count = update
        .effects
        .iter()
        .filter(|e| matches!(e, Effect::Http(_)))
        .count();
    assert_eq!(http_count, 2, "peaks and challenges queries");
}

#[test]
fn offline_region_changes_do_not_query() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    app.update(Event::NetworkStatusChanged { online: false }, &mut model);

    let update = app.update(region_event(11.0), &mut model);
    assert!(!update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert_eq!(model.fetch_generation, 0, "no doomed request was stamped");

    // Connectivity returning refetches the last reported region.
    let update = app.update(Event::NetworkStatusChanged { online: true }, &mut model);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert_eq!(model.fetch_generation, 1);
}

#[test]
fn stale_viewport_responses_are_dropped() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    app.update(region_event(11.0), &mut model);
    let stale_generation = model.fetch_generation;
    app.update(region_event(12.0), &mut model);
    let current_generation = model.fetch_generation;
    assert!(current_generation > stale_generation);

    // The response to the older query arrives late.
    let stale = ResponseBuilder::ok()
        .body(vec![peak("old", -105.5, 40.0)])
        .build();
    app.update(
        Event::PeaksFetched {
            generation: stale_generation,
            result: Box::new(Ok(stale)),
        },
        &mut model,
    );
    assert!(model.peaks.is_empty(), "stale result must not land");

    let fresh = ResponseBuilder::ok()
        .body(vec![peak("new", -105.4, 40.1)])
        .build();
    app.update(
        Event::PeaksFetched {
            generation: current_generation,
            result: Box::new(Ok(fresh)),
        },
        &mut model,
    );
    assert_eq!(model.peaks.len(), 1);
    assert_eq!(model.peaks[0].id, PeakId::from("new"));
}

#[test]
fn marker_tap_floats_a_card_and_fetches_detail() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    model.peaks = vec![peak("p1", -105.6, 40.25)];

    let update = app.update(
        Event::PeakMarkerTapped {
            peak_id: PeakId::from("p1"),
        },
        &mut model,
    );

    assert_eq!(model.map.selection_mode(), SelectionMode::Floating);
    assert_eq!(model.map.selected_peak_id(), Some(&PeakId::from("p1")));
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));

    // Tapping a challenge replaces the peak selection entirely.
    app.update(
        Event::ChallengeMarkerTapped {
            challenge_id: "c1".into(),
        },
        &mut model,
    );
    assert!(model.map.selected_peak_id().is_none());
    assert_eq!(
        model.map.selected_challenge_id(),
        Some(&ChallengeId::from("c1"))
    );

    app.update(Event::SelectionCleared, &mut model);
    assert_eq!(model.map.selection_mode(), SelectionMode::None);
}

#[test]
fn challenge_focus_loads_peaks_and_fits_bounds() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    let update = app.update(
        Event::ChallengeFocusRequested {
            challenge_id: "c1".into(),
        },
        &mut model,
    );
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));

    let detail = ChallengeDetail {
        summary: challenge_summary("c1"),
        peaks: vec![peak("p1", -105.6, 40.25), peak("p2", -105.4, 40.05)],
        description: None,
    };
    let response = ResponseBuilder::ok().body(detail).build();
    app.update(
        Event::ChallengeDetailFetched {
            challenge_id: "c1".into(),
            result: Box::new(Ok(response)),
        },
        &mut model,
    );

    assert_eq!(model.map.focus().kind(), FocusKind::Challenge);
    assert_eq!(model.map.overlay_peaks().unwrap().len(), 2);
    assert_eq!(
        model.map.selected_challenge_id(),
        Some(&ChallengeId::from("c1"))
    );

    let fit = model.map.pending_fit_bounds().unwrap();
    assert_eq!(fit.bounds.sw, coords(-105.6, 40.05));
    assert_eq!(fit.bounds.ne, coords(-105.4, 40.25));

    // Shell consumes the command; it must not fire twice.
    app.update(Event::FitBoundsConsumed, &mut model);
    assert!(model.map.pending_fit_bounds().is_none());
}

#[test]
fn peak_focus_flies_without_inheriting_overlay() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    // Start from a challenge focus.
    let detail = ChallengeDetail {
        summary: challenge_summary("c1"),
        peaks: vec![peak("p1", -105.6, 40.25), peak("p2", -105.4, 40.05)],
        description: None,
    };
    app.update(
        Event::ChallengeDetailFetched {
            challenge_id: "c1".into(),
            result: Box::new(Ok(ResponseBuilder::ok().body(detail).build())),
        },
        &mut model,
    );

    let summit = coords(-105.6, 40.25);
    app.update(
        Event::PeakFocusRequested {
            peak_id: PeakId::from("p1"),
            coords: summit,
        },
        &mut model,
    );

    assert_eq!(model.map.focus().kind(), FocusKind::Peak);
    assert!(model.map.overlay_peaks().is_none());
    let fly = model.map.pending_fly_to().unwrap();
    assert_eq!(fly.center, summit);
    assert!(fly.zoom.is_some());

    app.update(Event::FlyToConsumed, &mut model);
    assert!(model.map.pending_fly_to().is_none());

    // Clearing focus resumes discovery with no leftover selection.
    app.update(Event::FocusCleared, &mut model);
    assert_eq!(model.map.focus().kind(), FocusKind::Discovery);
    assert!(model.map.selected_peak_id().is_none());
}

#[test]
fn back_from_detail_clears_selection_and_snaps_sheet() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    model.peaks = vec![peak("p1", -105.6, 40.25)];

    app.update(
        Event::RouteChanged(Route::PeakDetail(PeakId::from("p1"))),
        &mut model,
    );
    assert_eq!(model.map.selection_mode(), SelectionMode::Detail);

    app.update(Event::RouteChanged(Route::Discovery), &mut model);
    assert_eq!(model.map.selection_mode(), SelectionMode::None);
    assert!(model.map.selected_peak_id().is_none());
    assert_eq!(model.map.pending_sheet_snap(), Some(SheetPosition::Halfway));

    app.update(Event::SheetSnapConsumed, &mut model);
    assert!(model.map.pending_sheet_snap().is_none());
}

#[test]
fn opening_the_sheet_dismisses_a_floating_card() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    model.peaks = vec![peak("p1", -105.6, 40.25)];

    app.update(
        Event::PeakMarkerTapped {
            peak_id: PeakId::from("p1"),
        },
        &mut model,
    );
    assert_eq!(model.map.selection_mode(), SelectionMode::Floating);

    app.update(Event::SheetMoved(SheetPosition::Expanded), &mut model);
    assert_eq!(model.map.selection_mode(), SelectionMode::None);
    assert_eq!(model.map.sheet_position(), SheetPosition::Expanded);
}

#[test]
fn recenter_targets_follow_focus() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();

    // Discovery: nothing to recenter on.
    app.update(Event::RecenterRequested, &mut model);
    assert!(model.map.pending_fly_to().is_none());
    assert!(model.map.pending_fit_bounds().is_none());

    // Single peak: fly to its summit.
    let summit = coords(-105.6, 40.25);
    app.update(
        Event::PeakFocusRequested {
            peak_id: PeakId::from("p1"),
            coords: summit,
        },
        &mut model,
    );
    app.update(Event::FlyToConsumed, &mut model);
    app.update(Event::RecenterRequested, &mut model);
    assert_eq!(model.map.pending_fly_to().unwrap().center, summit);
}

mod invariants {
    use super::*;
    use pathquest_core::map::{FocusPeak, MapState};
    use pathquest_core::model::UserId;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        FocusDiscovery,
        FocusChallenge(u8),
        FocusUser(u8),
        FocusPeak(u8),
        SelectPeak(u8),
        SelectChallenge(u8),
        ClearSelection,
        EnterPeakDetail(u8),
        ReturnToDiscovery,
        SheetMoved(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::FocusDiscovery),
            any::<u8>().prop_map(Op::FocusChallenge),
            any::<u8>().prop_map(Op::FocusUser),
            any::<u8>().prop_map(Op::FocusPeak),
            any::<u8>().prop_map(Op::SelectPeak),
            any::<u8>().prop_map(Op::SelectChallenge),
            Just(Op::ClearSelection),
            any::<u8>().prop_map(Op::EnterPeakDetail),
            Just(Op::ReturnToDiscovery),
            (0u8..3).prop_map(Op::SheetMoved),
        ]
    }

    fn some_peaks(seed: u8) -> Vec<FocusPeak> {
        (0..(seed % 4))
            .map(|i| FocusPeak {
                id: PeakId::new(format!("p{i}")),
                coords: LngLat::new(-105.0 - f64::from(i), 40.0).unwrap(),
                summited: i % 2 == 0,
            })
            .collect()
    }

    fn apply(map: &mut MapState, op: &Op) {
        match op {
            Op::FocusDiscovery => map.focus_discovery(),
            Op::FocusChallenge(s) => {
                map.focus_challenge(ChallengeId::new(format!("c{s}")), some_peaks(*s));
            }
            Op::FocusUser(s) => map.focus_user(UserId::new(format!("u{s}")), some_peaks(*s)),
            Op::FocusPeak(s) => map.focus_peak(
                PeakId::new(format!("p{s}")),
                LngLat::new(-105.5, 40.1).unwrap(),
            ),
            Op::SelectPeak(s) => map.select_peak(PeakId::new(format!("p{s}"))),
            Op::SelectChallenge(s) => map.select_challenge(ChallengeId::new(format!("c{s}"))),
            Op::ClearSelection => map.clear_selection(),
            Op::EnterPeakDetail(s) => map.enter_peak_detail(PeakId::new(format!("p{s}"))),
            Op::ReturnToDiscovery => map.return_to_discovery_route(),
            Op::SheetMoved(s) => map.on_sheet_moved(match s {
                0 => SheetPosition::Collapsed,
                1 => SheetPosition::Halfway,
                _ => SheetPosition::Expanded,
            }),
        }
    }

    proptest! {
        #[test]
        fn any_transition_sequence_preserves_invariants(
            ops in proptest::collection::vec(op_strategy(), 0..40)
        ) {
            let mut map = MapState::default();
            for op in &ops {
                apply(&mut map, op);

                // At most one selected entity.
                prop_assert!(
                    map.selected_peak_id().is_none() || map.selected_challenge_id().is_none()
                );

                // A floating card always has something behind it.
                if map.selection_mode() == SelectionMode::Floating {
                    prop_assert!(
                        map.selected_peak_id().is_some()
                            || map.selected_challenge_id().is_some()
                    );
                }

                // Overlay markers exist only for challenge/user focus.
                match map.focus().kind() {
                    FocusKind::Challenge | FocusKind::User => {
                        prop_assert!(map.overlay_peaks().is_some());
                    }
                    FocusKind::Discovery | FocusKind::Peak => {
                        prop_assert!(map.overlay_peaks().is_none());
                    }
                }

                // No selection means no selection mode, and vice versa.
                if map.selected_peak_id().is_none() && map.selected_challenge_id().is_none() {
                    prop_assert!(map.selection_mode() != SelectionMode::Floating);
                }
            }
        }
    }
}
