//! The update loop: every event lands here, mutates the model, and
//! schedules effects through the capabilities.

use crate::capabilities::auth::AuthOutput;
use crate::capabilities::storage::{StorageKey, StorageOutput, StorageResult};
use crate::capabilities::Capabilities;
use crate::error::{AppError, ErrorKind, ErrorSeverity};
use crate::event::{Event, HttpResult};
use crate::map::{FocusKind, Route, Viewport};
use crate::model::{
    Bounds, ChallengeId, LngLat, Model, OpId, PeakId, ToastMessage, UnixTimeMs, UserId,
};
use crate::outbox::{Outbox, OutboxEntry, OutboxError, OutboxIntent, SubmitError};
use crate::session::{SessionPhase, SessionState};
use crate::view::ViewModel;
use crate::{
    DEFAULT_FIT_PADDING, MAX_VIEWPORT_CHALLENGES, MAX_VIEWPORT_PEAKS, PEAK_FOCUS_ZOOM,
};

#[cfg(feature = "camera")]
use crate::capabilities::camera::CameraError;
#[cfg(feature = "camera")]
use crate::event::PhotoUploadTicket;
#[cfg(feature = "camera")]
use crate::model::StagedPhoto;
#[cfg(feature = "push")]
use crate::capabilities::push::{PushError, PushOutput, PushPayload};

#[cfg(feature = "camera")]
const PHOTO_MAX_DIMENSION: u32 = 2048;
#[cfg(feature = "camera")]
const PHOTO_QUALITY: u8 = 80;

const OAUTH_SCOPES: &[&str] = &["read", "activity:read"];

/// How a submission response should be treated.
enum SubmitOutcome {
    Success,
    Unauthorized,
    RateLimited(Option<u64>),
    Failure(SubmitError),
}

#[derive(Default)]
pub struct App;

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        tracing::debug!(event = event.name(), "update");

        match event {
            Event::AppStarted => {
                caps.storage.get_multi(SessionState::storage_keys(), |r| {
                    Event::SessionLoaded(Box::new(r))
                });
                caps.storage
                    .get(StorageKey::Outbox, |r| Event::OutboxRestored(Box::new(r)));
            }

            Event::Configured(config) => match config.validate() {
                Ok(()) => model.config = config,
                Err(err) => model.active_error = Some(err),
            },

            Event::AppForegrounded => {
                let now_secs = crate::get_current_time_ms() / 1000;
                if model.session.is_authenticated() && model.session.needs_refresh(now_secs) {
                    self.refresh_tokens(model, caps);
                }
                self.refetch_viewport(model, caps);
                self.flush_outbox(model, caps);
            }

            Event::AppBackgrounded => {
                self.persist_outbox(model, caps);
            }

            Event::NetworkStatusChanged { online } => {
                model.network_online = online;
                if online {
                    self.flush_outbox(model, caps);
                    self.refetch_viewport(model, caps);
                }
            }

            // --- session ---
            Event::ConnectRequested => {
                if model.session.is_authenticated() {
                    model.active_toast = Some(ToastMessage::info("Already connected"));
                } else {
                    model.session.phase = SessionPhase::Authorizing;
                    caps.auth.start_authorization(
                        model.config.strava_client_id.clone(),
                        OAUTH_SCOPES.iter().map(ToString::to_string).collect(),
                        |r| Event::AuthorizationResult(Box::new(r)),
                    );
                }
            }

            Event::AuthorizationResult(result) => match *result {
                Ok(AuthOutput::Authorized {
                    code,
                    code_verifier,
                }) => {
                    self.exchange_code(model, caps, &code, &code_verifier);
                }
                Ok(AuthOutput::SessionEnded) => {}
                Err(err) => {
                    model.session.phase = SessionPhase::SignedOut;
                    let app_err = AppError::from(err);
                    if app_err.severity == ErrorSeverity::Info {
                        model.active_toast =
                            Some(ToastMessage::info(app_err.user_facing_message()));
                    } else {
                        model.active_error = Some(app_err);
                    }
                }
            },

            Event::TokenExchangeResponse(result) => {
                self.handle_token_response(model, caps, *result, false);
            }

            Event::TokenRefreshResponse(result) => {
                self.handle_token_response(model, caps, *result, true);
            }

            Event::SignOutRequested => {
                if let Some(bearer) = model.session.bearer() {
                    let url = model.config.api_url("/api/v1/auth/deauthorize");
                    caps.http
                        .post(url)
                        .header("Authorization", bearer.as_str())
                        .send(|r| Event::DeauthorizeResponse(Box::new(r)));
                }
                caps.auth.end_session();
                #[cfg(feature = "push")]
                {
                    caps.push.unregister();
                    model.push = crate::model::PushState::default();
                }
                caps.storage.delete_multi(StorageKey::user_scoped(), |r| {
                    Event::SessionCleared(Box::new(r))
                });

                model.session.reset();
                model.outbox.clear();
                model.peak_details.clear();
                model.peaks.clear();
                model.challenges.clear();
                model.map.focus_discovery();
                #[cfg(feature = "camera")]
                {
                    model.staged_photo = None;
                }
                model.active_toast = Some(ToastMessage::info("Signed out"));
            }

            Event::DeauthorizeResponse(result) => {
                if let Err(err) = *result {
                    tracing::warn!(error = %err, "deauthorize failed, tokens cleared anyway");
                }
            }

            Event::SessionLoaded(result) => match *result {
                Ok(StorageOutput::Multi(values)) => {
                    if model.session.restore(values) {
                        tracing::info!("session restored from storage");
                        let now_secs = crate::get_current_time_ms() / 1000;
                        if model.session.needs_refresh(now_secs) {
                            // A successful refresh flushes and refetches.
                            self.refresh_tokens(model, caps);
                        } else {
                            // The outbox may have restored before the
                            // session; start delivery now that it can.
                            self.flush_outbox(model, caps);
                            self.refetch_viewport(model, caps);
                        }
                    }
                }
                Ok(other) => {
                    tracing::error!(?other, "unexpected storage output for session load");
                }
                Err(err) => {
                    model.active_error = Some(err.into());
                }
            },

            Event::SessionPersisted(result) | Event::SessionCleared(result) => {
                self.note_storage_result(model, *result);
            }

            // --- viewport ---
            Event::MapRegionChanged {
                center,
                zoom,
                bounds,
            } => {
                model.map.update_region(Viewport {
                    center,
                    zoom,
                    bounds,
                });
                if model.map.is_zoomed_out_too_far() {
                    model.is_fetching_viewport = false;
                } else if model.network_online
                    && model.map.focus().kind() == FocusKind::Discovery
                {
                    self.fetch_viewport(model, caps);
                }
            }

            Event::PeaksFetched { generation, result } => {
                if generation == model.fetch_generation {
                    model.is_fetching_viewport = false;
                    match *result {
                        Ok(mut response) if response.status().is_success() => {
                            if let Some(mut peaks) = response.take_body() {
                                peaks.truncate(MAX_VIEWPORT_PEAKS);
                                model.peaks = peaks;
                            }
                        }
                        Ok(response) => {
                            tracing::warn!(status = u16::from(response.status()), "peak query failed");
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "peak query failed");
                        }
                    }
                } else {
                    tracing::debug!(generation, current = model.fetch_generation, "stale peak response dropped");
                }
            }

            Event::ChallengesFetched { generation, result } => {
                if generation == model.fetch_generation {
                    match *result {
                        Ok(mut response) if response.status().is_success() => {
                            if let Some(mut challenges) = response.take_body() {
                                challenges.truncate(MAX_VIEWPORT_CHALLENGES);
                                model.challenges = challenges;
                            }
                        }
                        Ok(response) => {
                            tracing::warn!(status = u16::from(response.status()), "challenge query failed");
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "challenge query failed");
                        }
                    }
                }
            }

            // --- selection ---
            Event::PeakMarkerTapped { peak_id } => {
                model.map.select_peak(peak_id.clone());
                self.ensure_peak_detail(model, caps, &peak_id);
            }

            Event::ChallengeMarkerTapped { challenge_id } => {
                model.map.select_challenge(challenge_id);
            }

            Event::SelectionCleared => {
                model.map.clear_selection();
            }

            // --- focus ---
            Event::ChallengeFocusRequested { challenge_id } => {
                self.fetch_challenge_detail(model, caps, challenge_id);
            }

            Event::ChallengeDetailFetched {
                challenge_id,
                result,
            } => match *result {
                Ok(mut response) if response.status().is_success() => {
                    if let Some(detail) = response.take_body() {
                        let peaks = detail.peaks.iter().map(Into::into).collect();
                        model.map.focus_challenge(challenge_id, peaks);
                        model.map.request_fit_to_focus();
                    }
                }
                Ok(response) => {
                    model.active_error =
                        Some(AppError::from_http_status(u16::from(response.status()), None));
                }
                Err(err) => {
                    model.active_error = Some(AppError::network(err.to_string()));
                }
            },

            Event::UserFocusRequested { user_id } => {
                self.fetch_user_summits(model, caps, user_id);
            }

            Event::UserSummitsFetched { user_id, result } => match *result {
                Ok(mut response) if response.status().is_success() => {
                    if let Some(peaks) = response.take_body() {
                        let peaks = peaks.iter().map(Into::into).collect();
                        model.map.focus_user(user_id, peaks);
                        model.map.request_fit_to_focus();
                    }
                }
                Ok(response) => {
                    model.active_error =
                        Some(AppError::from_http_status(u16::from(response.status()), None));
                }
                Err(err) => {
                    model.active_error = Some(AppError::network(err.to_string()));
                }
            },

            Event::PeakFocusRequested { peak_id, coords } => {
                model.map.focus_peak(peak_id.clone(), coords);
                model.map.request_fly_to(coords, Some(PEAK_FOCUS_ZOOM));
                self.ensure_peak_detail(model, caps, &peak_id);
            }

            Event::FocusCleared => {
                model.map.focus_discovery();
                self.refetch_viewport(model, caps);
            }

            Event::PeakDetailFetched { peak_id, result } => match *result {
                Ok(mut response) if response.status().is_success() => {
                    if let Some(detail) = response.take_body() {
                        model.peak_details.put(peak_id, detail);
                    }
                }
                Ok(response) => {
                    let status = u16::from(response.status());
                    if status == 404 {
                        model.active_error = Some(AppError::new(
                            ErrorKind::NotFound,
                            format!("peak {peak_id} not found"),
                        ));
                    } else {
                        tracing::warn!(status, "peak detail fetch failed");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "peak detail fetch failed");
                }
            },

            Event::RecenterRequested => {
                enum Cmd {
                    Fly(LngLat),
                    Fit(Bounds),
                }
                let cmd = match model.map.recenter_target() {
                    Some(crate::map::RecenterTarget::Point(center)) => Some(Cmd::Fly(center)),
                    Some(crate::map::RecenterTarget::PeakSet(peaks)) => {
                        Bounds::enclosing(peaks.iter().map(|p| p.coords)).map(Cmd::Fit)
                    }
                    None => None,
                };
                match cmd {
                    Some(Cmd::Fly(center)) => {
                        model.map.request_fly_to(center, Some(PEAK_FOCUS_ZOOM));
                    }
                    Some(Cmd::Fit(bounds)) => {
                        model.map.request_fit_bounds(bounds, DEFAULT_FIT_PADDING);
                    }
                    None => {}
                }
            }

            Event::FitBoundsConsumed => model.map.clear_pending_fit_bounds(),
            Event::FlyToConsumed => model.map.clear_pending_fly_to(),
            Event::SheetSnapConsumed => model.map.clear_pending_sheet_snap(),

            // --- navigation and sheet ---
            Event::RouteChanged(route) => {
                let was_detail = model.route.is_detail();
                match &route {
                    Route::PeakDetail(peak_id) => {
                        model.map.enter_peak_detail(peak_id.clone());
                        self.ensure_peak_detail(model, caps, peak_id);
                    }
                    Route::ChallengeDetail(challenge_id) => {
                        model.map.enter_challenge_detail(challenge_id.clone());
                    }
                    Route::UserProfile(_) => {}
                    Route::Discovery => {
                        if was_detail {
                            model.map.return_to_discovery_route();
                        }
                    }
                }
                model.route = route;
            }

            Event::SheetMoved(position) => {
                model.map.on_sheet_moved(position);
            }

            // --- submissions ---
            Event::TripReportSubmitted { peak_id, draft } => {
                if !model.session.is_authenticated() {
                    model.active_error = Some(AppError::new(
                        ErrorKind::Authentication,
                        "Connect to Strava to submit trip reports",
                    ));
                } else if let Err(err) = draft.validate() {
                    model.active_error = Some(err);
                } else {
                    let now = UnixTimeMs::now();
                    let queued = self.enqueue(
                        model,
                        OutboxIntent::SubmitTripReport {
                            peak_id: peak_id.clone(),
                            draft,
                        },
                        now,
                    );
                    if queued {
                        #[cfg(feature = "camera")]
                        if let Some(photo) = model.staged_photo.take() {
                            self.enqueue(
                                model,
                                OutboxIntent::UploadSummitPhoto {
                                    peak_id: peak_id.clone(),
                                    mime_type: photo.mime_type,
                                    data: photo.data,
                                    upload_url: None,
                                    photo_id: None,
                                },
                                now,
                            );
                        }
                        model.mark_peak_summited(&peak_id);
                        if !model.network_online {
                            model.active_toast = Some(ToastMessage::info(
                                "Saved. It will submit when you're back online.",
                            ));
                        }
                        self.persist_outbox(model, caps);
                        self.flush_outbox(model, caps);
                    }
                }
            }

            Event::ManualSummitLogged {
                peak_id,
                summited_at,
                notes,
            } => {
                if !model.session.is_authenticated() {
                    model.active_error = Some(AppError::new(
                        ErrorKind::Authentication,
                        "Connect to Strava to log summits",
                    ));
                } else if let Err(err) = crate::model::validate_summit_notes(notes.as_deref()) {
                    model.active_error = Some(err);
                } else {
                    let now = UnixTimeMs::now();
                    let queued = self.enqueue(
                        model,
                        OutboxIntent::LogManualSummit {
                            peak_id: peak_id.clone(),
                            summited_at,
                            notes,
                        },
                        now,
                    );
                    if queued {
                        model.mark_peak_summited(&peak_id);
                        if !model.network_online {
                            model.active_toast = Some(ToastMessage::info(
                                "Saved. It will submit when you're back online.",
                            ));
                        }
                        self.persist_outbox(model, caps);
                        self.flush_outbox(model, caps);
                    }
                }
            }

            Event::OutboxFlushRequested => {
                self.flush_outbox(model, caps);
            }

            Event::SubmissionResponse { op_id, result } => {
                self.handle_submission_response(model, caps, &op_id, *result);
            }

            Event::OutboxRestored(result) => match *result {
                Ok(StorageOutput::Value(Some(bytes))) => match Outbox::from_cbor(&bytes) {
                    Ok(mut restored) => {
                        restored.recover_interrupted();
                        model.outbox = restored;
                        tracing::info!(
                            pending = model.outbox.pending_count(),
                            "outbox restored"
                        );
                        self.flush_outbox(model, caps);
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "stored outbox unreadable, starting empty");
                    }
                },
                Ok(_) => {}
                Err(err) => {
                    model.active_error = Some(err.into());
                }
            },

            Event::OutboxPersisted(result) => {
                self.note_storage_result(model, *result);
            }

            // --- summit photos ---
            #[cfg(feature = "camera")]
            Event::PhotoCaptureRequested => {
                caps.camera.capture(PHOTO_MAX_DIMENSION, PHOTO_QUALITY, |r| {
                    Event::PhotoCaptureResult(Box::new(r))
                });
            }

            #[cfg(feature = "camera")]
            Event::PhotoCaptureResult(result) => match *result {
                Ok(photo) => {
                    model.staged_photo = Some(StagedPhoto {
                        data: photo.data,
                        mime_type: photo.mime_type,
                        width: photo.width,
                        height: photo.height,
                    });
                }
                Err(CameraError::Cancelled) => {}
                Err(CameraError::PermissionDenied) => {
                    model.active_error = Some(AppError::new(
                        ErrorKind::CameraPermissionDenied,
                        "camera permission denied",
                    ));
                }
                Err(err) => {
                    model.active_error = Some(AppError::new(ErrorKind::Camera, err.to_string()));
                }
            },

            #[cfg(feature = "camera")]
            Event::StagedPhotoDiscarded => {
                model.staged_photo = None;
            }

            #[cfg(feature = "camera")]
            Event::PhotoTicketResponse { op_id, result } => {
                self.handle_photo_ticket_response(model, caps, &op_id, *result);
            }

            #[cfg(feature = "camera")]
            Event::PhotoUploadResponse { op_id, result } => {
                self.handle_submission_response(model, caps, &op_id, *result);
            }

            // --- push ---
            #[cfg(feature = "push")]
            Event::PushPermissionRequested => {
                caps.push
                    .request_permission(|r| Event::PushRegistrationResult(Box::new(r)));
            }

            #[cfg(feature = "push")]
            Event::PushRegistrationResult(result) => match *result {
                Ok(PushOutput::Permission { granted }) => {
                    model.push.permission_granted = granted;
                    if granted {
                        caps.push
                            .register(|r| Event::PushRegistrationResult(Box::new(r)));
                    }
                }
                Ok(PushOutput::Registered { token }) => {
                    model.push.token = Some(token.clone());
                    model.push.token_synced = false;
                    if model.session.is_authenticated() {
                        let now = UnixTimeMs::now();
                        if self.enqueue(model, OutboxIntent::SyncPushToken { token }, now) {
                            self.persist_outbox(model, caps);
                            self.flush_outbox(model, caps);
                        }
                    }
                }
                Ok(PushOutput::Unregistered) => {}
                Err(PushError::PermissionDenied) => {
                    model.push.permission_granted = false;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "push registration failed");
                }
            },

            #[cfg(feature = "push")]
            Event::NotificationTapped(payload) => match *payload {
                PushPayload::PeakSummited { peak_id, .. }
                | PushPayload::NewTripReport { peak_id } => {
                    model.route = Route::PeakDetail(peak_id.clone());
                    model.map.enter_peak_detail(peak_id.clone());
                    self.ensure_peak_detail(model, caps, &peak_id);
                }
                PushPayload::ChallengeCompleted { challenge_id } => {
                    model.route = Route::ChallengeDetail(challenge_id.clone());
                    model.map.enter_challenge_detail(challenge_id.clone());
                    self.fetch_challenge_detail(model, caps, challenge_id);
                }
            },

            // --- transient UI ---
            Event::ToastDismissed => model.active_toast = None,
            Event::ErrorDismissed => model.active_error = None,
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        ViewModel::build(model)
    }
}

impl App {
    fn exchange_code(&self, model: &Model, caps: &Capabilities, code: &str, code_verifier: &str) {
        let url = model.config.api_url("/api/v1/auth/token");
        let payload = serde_json::json!({
            "grant_type": "authorization_code",
            "client_id": model.config.strava_client_id,
            "code": code,
            "code_verifier": code_verifier,
        });
        match caps.http.post(url).body_json(&payload) {
            Ok(builder) => {
                builder
                    .expect_json()
                    .send(|r| Event::TokenExchangeResponse(Box::new(r)));
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to encode token exchange request");
            }
        }
    }

    fn refresh_tokens(&self, model: &mut Model, caps: &Capabilities) {
        if model.session.phase == SessionPhase::Refreshing {
            return;
        }
        let Some(refresh_token) = model.session.refresh_token() else {
            self.force_sign_out(model, caps, "Your session has expired");
            return;
        };
        model.session.phase = SessionPhase::Refreshing;
        let url = model.config.api_url("/api/v1/auth/refresh");
        let payload = serde_json::json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh_token,
        });
        match caps.http.post(url).body_json(&payload) {
            Ok(builder) => {
                builder
                    .expect_json()
                    .send(|r| Event::TokenRefreshResponse(Box::new(r)));
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to encode refresh request");
                model.session.phase = SessionPhase::SignedIn;
            }
        }
    }

    fn handle_token_response(
        &self,
        model: &mut Model,
        caps: &Capabilities,
        result: HttpResult<crate::session::TokenResponse>,
        is_refresh: bool,
    ) {
        match result {
            Ok(mut response) if response.status().is_success() => {
                if let Some(tokens) = response.take_body() {
                    model.session.apply_token_response(tokens);
                    self.persist_session(model, caps);
                    if !is_refresh {
                        model.active_toast = Some(ToastMessage::success("Connected to Strava"));
                        #[cfg(feature = "push")]
                        if !model.push.permission_granted {
                            caps.push
                                .request_permission(|r| Event::PushRegistrationResult(Box::new(r)));
                        }
                    }
                    self.flush_outbox(model, caps);
                    self.refetch_viewport(model, caps);
                } else {
                    model.session.phase = if is_refresh {
                        SessionPhase::SignedIn
                    } else {
                        SessionPhase::SignedOut
                    };
                    model.active_error = Some(AppError::new(
                        ErrorKind::Deserialization,
                        "empty token response",
                    ));
                }
            }
            Ok(response) => {
                let status = u16::from(response.status());
                // A refresh token the server rejects is gone for good.
                if is_refresh && (400..500).contains(&status) {
                    self.force_sign_out(model, caps, "Your session has expired");
                } else if is_refresh {
                    model.session.phase = SessionPhase::SignedIn;
                    tracing::warn!(status, "token refresh failed, will retry");
                } else {
                    model.session.phase = SessionPhase::SignedOut;
                    model.active_error = Some(AppError::from_http_status(status, None));
                }
            }
            Err(err) => {
                if is_refresh {
                    model.session.phase = SessionPhase::SignedIn;
                    tracing::warn!(error = %err, "token refresh failed, will retry");
                } else {
                    model.session.phase = SessionPhase::SignedOut;
                    model.active_error = Some(AppError::network(err.to_string()));
                }
            }
        }
    }

    fn force_sign_out(&self, model: &mut Model, caps: &Capabilities, message: &str) {
        caps.storage
            .delete_multi(SessionState::storage_keys(), |r| {
                Event::SessionCleared(Box::new(r))
            });
        model.session.reset();
        model.active_error = Some(AppError::new(ErrorKind::Authentication, message));
    }

    fn persist_session(&self, model: &Model, caps: &Capabilities) {
        match model.session.storage_entries() {
            Ok(entries) => {
                caps.storage
                    .set_multi(entries, |r| Event::SessionPersisted(Box::new(r)));
            }
            Err(err) => {
                tracing::error!(error = %err, "session not persistable");
            }
        }
    }

    fn persist_outbox(&self, model: &Model, caps: &Capabilities) {
        match model.outbox.to_cbor() {
            Ok(bytes) => {
                caps.storage
                    .set(StorageKey::Outbox, bytes, |r| {
                        Event::OutboxPersisted(Box::new(r))
                    });
            }
            Err(err) => {
                tracing::error!(error = %err, "outbox not persistable");
            }
        }
    }

    fn note_storage_result(&self, model: &mut Model, result: StorageResult) {
        if let Err(err) = result {
            tracing::error!(error = %err, "storage write failed");
            model.active_error = Some(err.into());
        }
    }

    // --- viewport queries ---

    fn refetch_viewport(&self, model: &mut Model, caps: &Capabilities) {
        if model.network_online
            && !model.map.is_zoomed_out_too_far()
            && model.map.focus().kind() == FocusKind::Discovery
        {
            self.fetch_viewport(model, caps);
        }
    }

    fn fetch_viewport(&self, model: &mut Model, caps: &Capabilities) {
        let Some(viewport) = model.map.viewport() else {
            return;
        };
        let query = viewport.bounds.to_query();
        model.fetch_generation += 1;
        model.is_fetching_viewport = true;
        let generation = model.fetch_generation;

        let peaks_url = model.config.api_url(&format!(
            "/api/v1/peaks?bounds={query}&limit={MAX_VIEWPORT_PEAKS}"
        ));
        let challenges_url = model.config.api_url(&format!(
            "/api/v1/challenges?bounds={query}&limit={MAX_VIEWPORT_CHALLENGES}"
        ));
        let bearer = model.session.bearer();

        let builder = caps.http.get(peaks_url);
        let builder = match &bearer {
            Some(b) => builder.header("Authorization", b.as_str()),
            None => builder,
        };
        builder.expect_json().send(move |r| Event::PeaksFetched {
            generation,
            result: Box::new(r),
        });

        let builder = caps.http.get(challenges_url);
        let builder = match &bearer {
            Some(b) => builder.header("Authorization", b.as_str()),
            None => builder,
        };
        builder
            .expect_json()
            .send(move |r| Event::ChallengesFetched {
                generation,
                result: Box::new(r),
            });
    }

    fn ensure_peak_detail(&self, model: &mut Model, caps: &Capabilities, peak_id: &PeakId) {
        if model.peak_details.contains(peak_id) {
            return;
        }
        let url = model
            .config
            .api_url(&format!("/api/v1/peaks/{peak_id}"));
        let bearer = model.session.bearer();
        let builder = caps.http.get(url);
        let builder = match &bearer {
            Some(b) => builder.header("Authorization", b.as_str()),
            None => builder,
        };
        let peak_id = peak_id.clone();
        builder
            .expect_json()
            .send(move |r| Event::PeakDetailFetched {
                peak_id: peak_id.clone(),
                result: Box::new(r),
            });
    }

    fn fetch_challenge_detail(
        &self,
        model: &Model,
        caps: &Capabilities,
        challenge_id: ChallengeId,
    ) {
        let url = model
            .config
            .api_url(&format!("/api/v1/challenges/{challenge_id}"));
        let bearer = model.session.bearer();
        let builder = caps.http.get(url);
        let builder = match &bearer {
            Some(b) => builder.header("Authorization", b.as_str()),
            None => builder,
        };
        builder
            .expect_json()
            .send(move |r| Event::ChallengeDetailFetched {
                challenge_id: challenge_id.clone(),
                result: Box::new(r),
            });
    }

    fn fetch_user_summits(&self, model: &Model, caps: &Capabilities, user_id: UserId) {
        let url = model
            .config
            .api_url(&format!("/api/v1/users/{user_id}/summits"));
        let bearer = model.session.bearer();
        let builder = caps.http.get(url);
        let builder = match &bearer {
            Some(b) => builder.header("Authorization", b.as_str()),
            None => builder,
        };
        builder
            .expect_json()
            .send(move |r| Event::UserSummitsFetched {
                user_id: user_id.clone(),
                result: Box::new(r),
            });
    }

    // --- outbox delivery ---

    fn enqueue(&self, model: &mut Model, intent: OutboxIntent, now: UnixTimeMs) -> bool {
        match model.outbox.push(OutboxEntry::new(intent, now)) {
            Ok(()) => true,
            Err(err @ OutboxError::Full { .. }) => {
                model.active_error = Some(
                    AppError::new(ErrorKind::InvalidState, err.to_string())
                        .with_severity(ErrorSeverity::Warning),
                );
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "enqueue failed");
                false
            }
        }
    }

    fn flush_outbox(&self, model: &mut Model, caps: &Capabilities) {
        if !model.network_online || !model.session.is_authenticated() {
            return;
        }
        let now = UnixTimeMs::now();
        let Some(entry) = model.outbox.next_ready(now) else {
            return;
        };
        let op_id = entry.op_id.clone();
        let idempotency_key = entry.idempotency_key.clone();
        let intent = entry.intent.clone();

        if let Some(entry) = model.outbox.get_mut(&op_id) {
            entry.mark_in_flight(now);
        }
        self.persist_outbox(model, caps);
        self.dispatch(model, caps, op_id, &idempotency_key, intent, now);
    }

    fn dispatch(
        &self,
        model: &mut Model,
        caps: &Capabilities,
        op_id: OpId,
        idempotency_key: &str,
        intent: OutboxIntent,
        now: UnixTimeMs,
    ) {
        let Some(bearer) = model.session.bearer() else {
            return;
        };

        match intent {
            OutboxIntent::SubmitTripReport { peak_id, draft } => {
                let url = model
                    .config
                    .api_url(&format!("/api/v1/peaks/{peak_id}/trip-reports"));
                let payload = serde_json::json!({
                    "text": draft.text,
                    "rating": draft.rating,
                    "hiked_on": draft.hiked_on,
                });
                self.send_submission(model, caps, op_id, idempotency_key, &bearer, &url, &payload, now);
            }
            OutboxIntent::LogManualSummit {
                peak_id,
                summited_at,
                notes,
            } => {
                let url = model
                    .config
                    .api_url(&format!("/api/v1/peaks/{peak_id}/summits"));
                let payload = serde_json::json!({
                    "summited_at": summited_at,
                    "notes": notes,
                });
                self.send_submission(model, caps, op_id, idempotency_key, &bearer, &url, &payload, now);
            }
            #[cfg(feature = "camera")]
            OutboxIntent::UploadSummitPhoto {
                peak_id,
                mime_type,
                data,
                upload_url,
                ..
            } => {
                if let Some(upload_url) = upload_url {
                    // Phase two: PUT the bytes at the presigned URL.
                    caps.http
                        .put(upload_url)
                        .header("Content-Type", mime_type.as_str())
                        .body_bytes(data)
                        .send(move |r| Event::PhotoUploadResponse {
                            op_id: op_id.clone(),
                            result: Box::new(r),
                        });
                } else {
                    // Phase one: ask the API for a presigned URL.
                    let url = model.config.api_url("/api/v1/photos");
                    let payload = serde_json::json!({
                        "peak_id": peak_id,
                        "mime_type": mime_type,
                        "byte_length": data.len(),
                    });
                    match caps.http.post(url).body_json(&payload) {
                        Ok(builder) => {
                            builder
                                .header("Authorization", bearer.as_str())
                                .header("Idempotency-Key", idempotency_key)
                                .expect_json()
                                .send(move |r| Event::PhotoTicketResponse {
                                    op_id: op_id.clone(),
                                    result: Box::new(r),
                                });
                        }
                        Err(err) => {
                            self.fail_entry_encoding(model, &op_id, &err.to_string(), now);
                        }
                    }
                }
            }
            #[cfg(feature = "push")]
            OutboxIntent::SyncPushToken { token } => {
                let url = model.config.api_url("/api/v1/profile/push-token");
                let payload = serde_json::json!({ "token": token });
                self.send_submission(model, caps, op_id, idempotency_key, &bearer, &url, &payload, now);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn send_submission(
        &self,
        model: &mut Model,
        caps: &Capabilities,
        op_id: OpId,
        idempotency_key: &str,
        bearer: &str,
        url: &str,
        payload: &serde_json::Value,
        now: UnixTimeMs,
    ) {
        match caps.http.post(url).body_json(payload) {
            Ok(builder) => {
                builder
                    .header("Authorization", bearer)
                    .header("Idempotency-Key", idempotency_key)
                    .send(move |r| Event::SubmissionResponse {
                        op_id: op_id.clone(),
                        result: Box::new(r),
                    });
            }
            Err(err) => {
                self.fail_entry_encoding(model, &op_id, &err.to_string(), now);
            }
        }
    }

    fn fail_entry_encoding(&self, model: &mut Model, op_id: &OpId, message: &str, now: UnixTimeMs) {
        tracing::error!(error = message, "submission payload not encodable");
        if let Some(entry) = model.outbox.get_mut(op_id) {
            entry.mark_failed(
                SubmitError {
                    message: message.to_string(),
                    http_status: None,
                    is_permanent: true,
                },
                now,
            );
        }
    }

    fn classify<T>(result: HttpResult<T>) -> SubmitOutcome {
        match result {
            Ok(response) => {
                let status = u16::from(response.status());
                match status {
                    // 409: the idempotency key was already consumed, so
                    // the write happened on an earlier attempt.
                    200..=299 | 409 => SubmitOutcome::Success,
                    401 => SubmitOutcome::Unauthorized,
                    429 => {
                        let retry_after = response
                            .header("Retry-After")
                            .and_then(|values| values.last().as_str().parse::<u64>().ok());
                        SubmitOutcome::RateLimited(retry_after)
                    }
                    400..=499 => SubmitOutcome::Failure(SubmitError {
                        message: format!("rejected with status {status}"),
                        http_status: Some(status),
                        is_permanent: true,
                    }),
                    _ => SubmitOutcome::Failure(SubmitError {
                        message: format!("failed with status {status}"),
                        http_status: Some(status),
                        is_permanent: false,
                    }),
                }
            }
            Err(err) => SubmitOutcome::Failure(SubmitError {
                message: err.to_string(),
                http_status: None,
                is_permanent: false,
            }),
        }
    }

    fn handle_submission_response(
        &self,
        model: &mut Model,
        caps: &Capabilities,
        op_id: &OpId,
        result: HttpResult<Vec<u8>>,
    ) {
        self.apply_submission_outcome(model, caps, op_id, Self::classify(result));
    }

    fn apply_submission_outcome(
        &self,
        model: &mut Model,
        caps: &Capabilities,
        op_id: &OpId,
        outcome: SubmitOutcome,
    ) {
        let now = UnixTimeMs::now();
        match outcome {
            SubmitOutcome::Success => {
                let completed_kind = model.outbox.get_mut(op_id).map(|entry| {
                    entry.mark_completed(now);
                    entry.intent.intent_type()
                });
                match completed_kind {
                    Some("submit_trip_report") => {
                        model.active_toast = Some(ToastMessage::success("Trip report submitted"));
                    }
                    Some("log_manual_summit") => {
                        model.active_toast = Some(ToastMessage::success("Summit logged"));
                    }
                    #[cfg(feature = "camera")]
                    Some("upload_summit_photo") => {
                        model.active_toast = Some(ToastMessage::success("Photo uploaded"));
                    }
                    #[cfg(feature = "push")]
                    Some("sync_push_token") => {
                        model.push.token_synced = true;
                    }
                    _ => {}
                }
                model.outbox.gc();
                self.persist_outbox(model, caps);
                // Keep draining the queue.
                self.flush_outbox(model, caps);
            }
            SubmitOutcome::Unauthorized => {
                if let Some(entry) = model.outbox.get_mut(op_id) {
                    entry.mark_failed(
                        SubmitError {
                            message: "unauthorized".into(),
                            http_status: Some(401),
                            is_permanent: false,
                        },
                        now,
                    );
                }
                self.persist_outbox(model, caps);
                self.refresh_tokens(model, caps);
            }
            SubmitOutcome::RateLimited(retry_after) => {
                if let Some(entry) = model.outbox.get_mut(op_id) {
                    entry.mark_rate_limited(retry_after, now);
                }
                self.persist_outbox(model, caps);
            }
            SubmitOutcome::Failure(err) => {
                let gave_up = model.outbox.get_mut(op_id).is_some_and(|entry| {
                    entry.mark_failed(err, now);
                    entry.retry_state == crate::outbox::RetryState::PermanentlyFailed
                });
                if gave_up {
                    model.active_error = Some(
                        AppError::new(
                            ErrorKind::Network,
                            "a queued submission could not be delivered",
                        )
                        .with_severity(ErrorSeverity::Warning),
                    );
                }
                self.persist_outbox(model, caps);
            }
        }
    }

    #[cfg(feature = "camera")]
    fn handle_photo_ticket_response(
        &self,
        model: &mut Model,
        caps: &Capabilities,
        op_id: &OpId,
        result: HttpResult<PhotoUploadTicket>,
    ) {
        let now = UnixTimeMs::now();
        match result {
            Ok(mut response) if response.status().is_success() => {
                let Some(ticket) = response.take_body() else {
                    self.fail_entry_encoding(model, op_id, "empty upload ticket", now);
                    return;
                };
                let mut put_args: Option<(String, String, Vec<u8>)> = None;
                if let Some(entry) = model.outbox.get_mut(op_id) {
                    if let OutboxIntent::UploadSummitPhoto {
                        upload_url,
                        photo_id,
                        mime_type,
                        data,
                        ..
                    } = &mut entry.intent
                    {
                        *upload_url = Some(ticket.upload_url.clone());
                        *photo_id = Some(ticket.photo_id.clone());
                        put_args = Some((ticket.upload_url, mime_type.clone(), data.clone()));
                    }
                }
                self.persist_outbox(model, caps);
                if let Some((url, mime_type, data)) = put_args {
                    let op_id = op_id.clone();
                    caps.http
                        .put(url)
                        .header("Content-Type", mime_type.as_str())
                        .body_bytes(data)
                        .send(move |r| Event::PhotoUploadResponse {
                            op_id: op_id.clone(),
                            result: Box::new(r),
                        });
                }
            }
            other => {
                // Same retry rules as any other submission.
                self.apply_submission_outcome(model, caps, op_id, Self::classify(other));
            }
        }
    }
}
