//! The location sync view: current position, target position and the route between them.

use std::{rc::Rc, str::FromStr};

use drone_rescue_config::{DaemonConfig, RouteFailurePolicy};
use futures::{Stream, StreamExt};
use geoposition::{Bounds, GeoPosition, Padding};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    location::{self, PositionSource, PositioningError, Sample, WatchOptions},
    map::{MapView, MarkerKind},
    routing::{Route, RouteError, RouteSummary, RoutingEngine},
    status::{Severity, Status, StatusIndicator},
    store::{RealtimeStore, Snapshot, StoreError},
    target::TargetRecord,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    /// Center the view on the current position.
    Recenter,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown command `{0}`, expected `recenter`")]
pub struct UnknownCommand(String);

impl FromStr for SessionCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "recenter" | "r" => Ok(SessionCommand::Recenter),
            other => Err(UnknownCommand(other.to_owned())),
        }
    }
}

/// A route computation the session wants done.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteRequest {
    pub seq: u64,
    pub from: GeoPosition,
    pub to: GeoPosition,
}

/// Everything the view shows, mutated only through the `on_*` handlers.
pub struct ViewState<M> {
    map: M,
    status: StatusIndicator,
    current: GeoPosition,
    target: Option<GeoPosition>,
    route_displayed: bool,
    summary: Option<RouteSummary>,
    latest_seq: u64,
    longitude_key: String,
    on_route_failure: RouteFailurePolicy,
    fit_padding: Padding,
    recenter_zoom: u8,
}

impl<M: MapView> ViewState<M> {
    pub fn new(mut map: M, status: StatusIndicator, config: &DaemonConfig) -> Self {
        let current = config.positioning.default_position;

        map.set_view(current, config.map.initial_zoom);
        map.set_marker(MarkerKind::Current, current);
        map.show_coordinates(MarkerKind::Current, current);
        status.set("Initializing...", Severity::Active);

        Self {
            map,
            status,
            current,
            target: None,
            route_displayed: false,
            summary: None,
            latest_seq: 0,
            longitude_key: config.store.longitude_key.clone(),
            on_route_failure: config.on_route_failure,
            fit_padding: config.map.fit_padding,
            recenter_zoom: config.map.recenter_zoom,
        }
    }

    pub fn status(&self) -> &StatusIndicator {
        &self.status
    }

    pub fn on_position(&mut self, update: Result<Sample, PositioningError>) -> Option<RouteRequest> {
        let sample = match update {
            Ok(sample) => sample,
            Err(err) if !err.is_terminal() => {
                log::warn!("{err}");
                self.status.set("Location request timed out", Severity::Error);
                return None;
            }
            Err(err) => {
                log::error!("position tracking stopped: {err}");
                let message = match err {
                    PositioningError::PermissionDenied => {
                        "Location access denied. Using default location."
                    }
                    _ => "Location services unavailable. Using default location.",
                };
                self.status.set(message, Severity::Error);
                return None;
            }
        };

        if !sample.position.is_valid() {
            log::warn!("ignoring invalid fix {}", sample.position);
            return None;
        }

        log::debug!(
            "fix {} (±{:?} m) taken at {}",
            sample.position,
            sample.accuracy_m,
            sample.timestamp
        );
        self.current = sample.position;
        self.map.set_marker(MarkerKind::Current, self.current);
        self.map.show_coordinates(MarkerKind::Current, self.current);
        self.status.set("Tracking location...", Severity::Active);

        self.request_route()
    }

    pub fn on_target(&mut self, update: Result<Snapshot, StoreError>) -> Option<RouteRequest> {
        let record = match update {
            Ok(Some(value)) => TargetRecord::decode(&value, &self.longitude_key),
            Ok(None) => {
                self.status.set("Waiting for target location", Severity::Normal);
                return None;
            }
            Err(err) => Err(err),
        };

        let record = match record {
            Ok(record) => record,
            Err(err) => {
                self.status.set(
                    format!("Firebase connection failed: {err}"),
                    Severity::Error,
                );
                return None;
            }
        };

        log::debug!(
            "target {} ({}) reported at {}",
            record.position,
            record.kind.as_deref().unwrap_or("untyped"),
            record.timestamp
        );
        let target = record.position;
        self.target = Some(target);
        self.map.set_marker(MarkerKind::Target, target);
        self.map.show_coordinates(MarkerKind::Target, target);
        self.status.set("Target location updated", Severity::Active);

        self.request_route()
    }

    /// Clears the displayed route and issues the next request, if both ends are known.
    pub fn request_route(&mut self) -> Option<RouteRequest> {
        let target = self.target?;
        if !self.current.is_valid() || !target.is_valid() {
            return None;
        }

        if std::mem::take(&mut self.route_displayed) {
            self.map.remove_route();
        }

        self.latest_seq += 1;
        Some(RouteRequest {
            seq: self.latest_seq,
            from: self.current,
            to: target,
        })
    }

    /// Applies the outcome of request `seq`, unless a newer request was issued since.
    pub fn on_route(&mut self, seq: u64, result: Result<Route, RouteError>) {
        if seq != self.latest_seq {
            log::debug!(
                "discarding route response {seq}, latest request is {}",
                self.latest_seq
            );
            return;
        }

        match result {
            Ok(route) => {
                let summary = RouteSummary::from(&route);

                self.map.draw_route(&route);
                self.route_displayed = true;
                self.map.show_route_summary(Some(&summary));
                self.map.show_route_status("Route calculated");
                self.summary = Some(summary);

                if let Some(target) = self.target {
                    self.map
                        .fit_bounds(Bounds::from_corners(self.current, target), self.fit_padding);
                }
            }

            Err(err) => {
                log::warn!("routing failed: {err}");
                self.map.show_route_status("Route calculation failed");
                self.status.set("Could not calculate route", Severity::Error);

                if self.on_route_failure == RouteFailurePolicy::Clear {
                    self.summary = None;
                    self.map.show_route_summary(None);
                }
            }
        }
    }

    pub fn recenter(&mut self) {
        self.map.set_view(self.current, self.recenter_zoom);
    }
}

#[cfg(test)]
impl<M> ViewState<M> {
    pub fn current(&self) -> GeoPosition {
        self.current
    }

    pub fn target(&self) -> Option<GeoPosition> {
        self.target
    }

    pub fn summary(&self) -> Option<&RouteSummary> {
        self.summary.as_ref()
    }
}

/// Runs route requests one at a time; a new request aborts the one in flight.
struct RouteDispatcher<R> {
    router: Rc<R>,
    tx: mpsc::UnboundedSender<(u64, Result<Route, RouteError>)>,
    in_flight: Option<JoinHandle<()>>,
}

impl<R: RoutingEngine + 'static> RouteDispatcher<R> {
    fn dispatch(&mut self, request: Option<RouteRequest>) {
        let Some(request) = request else {
            return;
        };

        if let Some(task) = self.in_flight.take() {
            task.abort();
        }

        let router = self.router.clone();
        let tx = self.tx.clone();
        self.in_flight = Some(tokio::task::spawn_local(async move {
            let result = router.route(request.from, request.to).await;
            _ = tx.send((request.seq, result));
        }));
    }
}

impl<R> Drop for RouteDispatcher<R> {
    fn drop(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.abort();
        }
    }
}

/// A running location sync view.
pub struct LocationSync<M, R> {
    state: ViewState<M>,
    dispatcher: RouteDispatcher<R>,
    routes: mpsc::UnboundedReceiver<(u64, Result<Route, RouteError>)>,
    watch_options: WatchOptions,
    target_path: String,
}

impl<M: MapView, R: RoutingEngine + 'static> LocationSync<M, R> {
    pub fn new(map: M, router: R, config: &DaemonConfig) -> Self {
        let status = StatusIndicator::new(config.notifications);
        let (tx, routes) = mpsc::unbounded_channel();

        Self {
            state: ViewState::new(map, status, config),
            dispatcher: RouteDispatcher {
                router: Rc::new(router),
                tx,
                in_flight: None,
            },
            routes,
            watch_options: WatchOptions::from(&config.positioning),
            target_path: config.store.target_path.clone(),
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.state.status().subscribe()
    }

    /// Runs until `shutdown` fires, then releases the position watch, the store
    /// subscription and any route request in flight.
    pub async fn run<P, S, C>(
        self,
        source: P,
        store: S,
        mut commands: C,
        mut shutdown: broadcast::Receiver<()>,
    ) where
        P: PositionSource + 'static,
        S: RealtimeStore,
        C: Stream<Item = SessionCommand> + Unpin,
    {
        let Self {
            mut state,
            mut dispatcher,
            mut routes,
            watch_options,
            target_path,
        } = self;

        let (watcher, mut positions) = location::watch_position(source, watch_options);
        let (subscription, mut targets) = store.subscribe(&target_path);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,

                Some(update) = positions.next() => {
                    dispatcher.dispatch(state.on_position(update));
                }

                Some(update) = targets.next() => {
                    dispatcher.dispatch(state.on_target(update));
                }

                Some((seq, result)) = routes.recv() => {
                    state.on_route(seq, result);
                }

                Some(command) = commands.next() => match command {
                    SessionCommand::Recenter => state.recenter(),
                },
            }
        }

        log::info!("location sync stopping");
        drop(watcher);
        drop(subscription);
        drop(dispatcher);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::task::LocalSet;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    use super::*;
    use crate::{
        location::testing::{fix, ScriptedSource},
        map::testing::RecordingMap,
        routing::testing::{route, ScriptedRouter},
        store::testing::MemoryStore,
    };

    const DEFAULT: GeoPosition = GeoPosition::new(51.505, -0.09);
    const TARGET: GeoPosition = GeoPosition::new(51.51, -0.1);

    fn view(config: &DaemonConfig) -> (ViewState<RecordingMap>, RecordingMap) {
        let map = RecordingMap::default();
        (
            ViewState::new(map.clone(), StatusIndicator::new(false), config),
            map,
        )
    }

    fn target_record(position: GeoPosition) -> Result<Snapshot, StoreError> {
        Ok(Some(json!({
            "lat": position.latitude,
            "long": position.longitude,
            "type": "drone",
        })))
    }

    fn status_of<M: MapView>(state: &ViewState<M>) -> Status {
        state.status().subscribe().borrow().clone()
    }

    #[test]
    fn initial_view() {
        let (state, map) = view(&DaemonConfig::default());

        assert_eq!(map.record().view, Some((DEFAULT, 13)));
        assert_eq!(map.record().markers.get(&MarkerKind::Current), Some(&DEFAULT));
        assert_eq!(
            status_of(&state),
            Status {
                message: "Initializing...".to_owned(),
                severity: Severity::Active,
            }
        );
    }

    #[test]
    fn no_route_without_both_positions() {
        let (mut state, map) = view(&DaemonConfig::default());

        assert_eq!(state.on_position(Ok(fix(48.85, 2.35))), None);
        assert_eq!(state.request_route(), None);

        let out_of_range = Ok(Some(json!({"lat": 123.0, "long": 2.0})));
        assert_eq!(state.on_target(out_of_range), None);
        assert_eq!(state.target(), None);

        let missing_longitude = Ok(Some(json!({"lat": 48.0, "lng": 2.0})));
        assert_eq!(state.on_target(missing_longitude), None);
        assert_eq!(state.target(), None);

        assert_eq!(state.on_position(Ok(fix(f64::NAN, 2.35))), None);
        assert_eq!(state.current(), GeoPosition::new(48.85, 2.35));
        assert!(map.record().draws.is_empty());
    }

    #[test]
    fn example_route_metrics() {
        let (mut state, map) = view(&DaemonConfig::default());

        assert_eq!(state.on_position(Ok(fix(51.505, -0.09))), None);
        let request = state.on_target(target_record(TARGET)).unwrap();
        assert_eq!(request.from, DEFAULT);
        assert_eq!(request.to, TARGET);

        state.on_route(request.seq, Ok(route(1200.0, 180.0)));

        let record = map.record();
        let summary = record.summary.as_ref().unwrap();
        assert_eq!(summary.distance_km, "1.20");
        assert_eq!(summary.duration_min, "3");
        assert_eq!(record.route_status.as_deref(), Some("Route calculated"));
        assert_eq!(
            record.fitted,
            vec![(Bounds::from_corners(DEFAULT, TARGET), Padding::uniform(50))]
        );
        assert_eq!(record.coordinates.get(&MarkerKind::Target), Some(&TARGET));
    }

    #[test]
    fn one_route_visible_at_a_time() {
        let (mut state, map) = view(&DaemonConfig::default());

        let first = state.on_target(target_record(TARGET)).unwrap();
        state.on_route(first.seq, Ok(route(1200.0, 180.0)));
        assert_eq!(map.record().visible_routes, 1);
        assert_eq!(map.record().removals, 0);

        let second = state.on_position(Ok(fix(51.5, -0.08))).unwrap();
        assert_eq!(map.record().removals, 1);
        assert_eq!(map.record().visible_routes, 0);

        state.on_route(second.seq, Ok(route(1500.0, 240.0)));

        let record = map.record();
        assert_eq!(record.removals, 1);
        assert_eq!(record.visible_routes, 1);
        assert_eq!(record.max_visible_routes, 1);
        assert_eq!(record.draws.len(), 2);
    }

    #[test]
    fn identical_target_fires_recompute_twice() {
        let (mut state, map) = view(&DaemonConfig::default());
        let mut summaries = Vec::new();

        for _ in 0..2 {
            let request = state.on_target(target_record(TARGET)).unwrap();
            assert_eq!((request.from, request.to), (DEFAULT, TARGET));
            state.on_route(request.seq, Ok(route(1200.0, 180.0)));
            summaries.push(state.summary().cloned());
        }

        assert_eq!(map.record().draws.len(), 2);
        assert_eq!(summaries[0], summaries[1]);
        assert!(summaries[0].is_some());
    }

    #[test]
    fn denied_positioning_falls_back_to_default() {
        let (mut state, map) = view(&DaemonConfig::default());

        assert_eq!(state.on_position(Err(PositioningError::PermissionDenied)), None);
        assert_eq!(state.current(), DEFAULT);
        assert_eq!(
            status_of(&state),
            Status {
                message: "Location access denied. Using default location.".to_owned(),
                severity: Severity::Error,
            }
        );
        assert!(map.record().draws.is_empty());

        let request = state.on_target(target_record(TARGET)).unwrap();
        assert_eq!(request.from, DEFAULT);
    }

    #[test]
    fn missing_location_service_is_told_apart_from_denial() {
        let (mut state, _map) = view(&DaemonConfig::default());

        let unavailable = PositioningError::Unavailable("no GeoClue on the bus".to_owned());
        assert_eq!(state.on_position(Err(unavailable)), None);
        assert_eq!(state.current(), DEFAULT);
        assert_eq!(
            status_of(&state),
            Status {
                message: "Location services unavailable. Using default location.".to_owned(),
                severity: Severity::Error,
            }
        );
    }

    #[test]
    fn timeout_is_reported_and_tracking_continues() {
        let (mut state, _map) = view(&DaemonConfig::default());

        state.on_position(Err(PositioningError::Timeout(std::time::Duration::from_secs(5))));
        assert_eq!(status_of(&state).message, "Location request timed out");

        state.on_position(Ok(fix(1.0, 2.0)));
        assert_eq!(state.current(), GeoPosition::new(1.0, 2.0));
        assert_eq!(status_of(&state).message, "Tracking location...");
    }

    #[test]
    fn stale_route_responses_are_discarded() {
        let (mut state, map) = view(&DaemonConfig::default());

        let first = state.on_target(target_record(TARGET)).unwrap();
        let second = state.on_position(Ok(fix(51.5, -0.08))).unwrap();
        assert!(second.seq > first.seq);

        state.on_route(second.seq, Ok(route(2000.0, 300.0)));
        state.on_route(first.seq, Ok(route(1200.0, 180.0)));

        let record = map.record();
        assert_eq!(record.draws, vec![route(2000.0, 300.0)]);
        assert_eq!(record.summary.as_ref().unwrap().distance_km, "2.00");
    }

    #[test]
    fn failed_route_retains_metrics_by_default() {
        let (mut state, map) = view(&DaemonConfig::default());

        let first = state.on_target(target_record(TARGET)).unwrap();
        state.on_route(first.seq, Ok(route(1200.0, 180.0)));

        let second = state.on_target(target_record(TARGET)).unwrap();
        state.on_route(second.seq, Err(RouteError::NoRoute("island".to_owned())));

        let record = map.record();
        assert_eq!(record.visible_routes, 0);
        assert_eq!(record.route_status.as_deref(), Some("Route calculation failed"));
        assert_eq!(record.summary.as_ref().unwrap().distance_km, "1.20");
        assert_eq!(state.summary().unwrap().duration_min, "3");
        assert_eq!(
            status_of(&state),
            Status {
                message: "Could not calculate route".to_owned(),
                severity: Severity::Error,
            }
        );
    }

    #[test]
    fn failed_route_clears_metrics_when_configured() {
        let config = DaemonConfig {
            on_route_failure: RouteFailurePolicy::Clear,
            ..DaemonConfig::default()
        };
        let (mut state, map) = view(&config);

        let first = state.on_target(target_record(TARGET)).unwrap();
        state.on_route(first.seq, Ok(route(1200.0, 180.0)));

        let second = state.on_target(target_record(TARGET)).unwrap();
        state.on_route(second.seq, Err(RouteError::Engine("HTTP 502".to_owned())));

        assert_eq!(map.record().summary, None);
        assert_eq!(state.summary(), None);
    }

    #[test]
    fn store_failures_never_fabricate_a_target() {
        let (mut state, _map) = view(&DaemonConfig::default());

        assert_eq!(state.on_target(Ok(None)), None);
        assert_eq!(
            status_of(&state),
            Status {
                message: "Waiting for target location".to_owned(),
                severity: Severity::Normal,
            }
        );

        assert_eq!(
            state.on_target(Err(StoreError::Cancelled("credential expired".to_owned()))),
            None
        );
        assert_eq!(state.target(), None);
        assert_eq!(
            status_of(&state).message,
            "Firebase connection failed: subscription cancelled: credential expired"
        );
        assert_eq!(status_of(&state).severity, Severity::Error);
    }

    #[test]
    fn alternate_longitude_key() {
        let mut config = DaemonConfig::default();
        config.store.longitude_key = "lng".to_owned();
        let (mut state, _map) = view(&config);

        let request = state.on_target(Ok(Some(json!({"lat": 51.51, "lng": -0.1}))));
        assert_eq!(request.map(|r| r.to), Some(TARGET));
    }

    #[test]
    fn parse_session_commands() {
        assert_eq!(" recenter\n".parse::<SessionCommand>().ok(), Some(SessionCommand::Recenter));
        assert!("zoom".parse::<SessionCommand>().is_err());
    }

    #[test]
    fn recenter_uses_current_position() {
        let (mut state, map) = view(&DaemonConfig::default());
        state.on_position(Ok(fix(48.85, 2.35)));
        state.recenter();
        assert_eq!(map.record().view, Some((GeoPosition::new(48.85, 2.35), 15)));
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn refused_subscription_leaves_tracking_running() {
        LocalSet::new()
            .run_until(async {
                let config = DaemonConfig::default();
                let map = RecordingMap::default();
                let router = ScriptedRouter::default();
                let store = MemoryStore::default();
                store.push(&config.store.target_path, target_record(TARGET).unwrap());
                store.refuse_subscriptions(StoreError::Status(401));

                let (source, samples) = ScriptedSource::channel();
                let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

                let sync = LocationSync::new(map.clone(), router.clone(), &config);
                let status = sync.subscribe_status();
                let task = tokio::task::spawn_local(sync.run(
                    source,
                    store.clone(),
                    futures::stream::pending(),
                    shutdown_rx,
                ));
                settle().await;

                assert_eq!(
                    *status.borrow(),
                    Status {
                        message: "Firebase connection failed: server answered 401".to_owned(),
                        severity: Severity::Error,
                    }
                );
                assert_eq!(map.record().markers.get(&MarkerKind::Target), None);

                samples.unbounded_send(fix(48.85, 2.35)).unwrap();
                settle().await;

                assert_eq!(
                    map.record().markers.get(&MarkerKind::Current),
                    Some(&GeoPosition::new(48.85, 2.35))
                );
                assert_eq!(status.borrow().message, "Tracking location...");
                assert!(router.requests().is_empty());
                assert!(map.record().draws.is_empty());

                shutdown_tx.send(()).unwrap();
                task.await.unwrap();
            })
            .await;
    }

    #[tokio::test]
    async fn dropped_subscription_keeps_last_target() {
        LocalSet::new()
            .run_until(async {
                let config = DaemonConfig::default();
                let path = config.store.target_path.clone();
                let map = RecordingMap::default();
                let router = ScriptedRouter::default();
                router.answer(Ok(route(1200.0, 180.0)));
                router.answer(Ok(route(900.0, 120.0)));

                let store = MemoryStore::default();
                store.push(&path, target_record(TARGET).unwrap());

                let (source, samples) = ScriptedSource::channel();
                let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

                let sync = LocationSync::new(map.clone(), router.clone(), &config);
                let status = sync.subscribe_status();
                let task = tokio::task::spawn_local(sync.run(
                    source,
                    store.clone(),
                    futures::stream::pending(),
                    shutdown_rx,
                ));
                settle().await;
                assert_eq!(router.requests(), vec![(DEFAULT, TARGET)]);

                store.fail(&path, StoreError::Cancelled("permission denied".to_owned()));
                settle().await;
                assert_eq!(
                    *status.borrow(),
                    Status {
                        message: "Firebase connection failed: subscription cancelled: permission denied"
                            .to_owned(),
                        severity: Severity::Error,
                    }
                );

                // Nobody is listening any more.
                store.push(&path, target_record(GeoPosition::new(0.0, 0.0)).unwrap());
                settle().await;
                assert_eq!(map.record().markers.get(&MarkerKind::Target), Some(&TARGET));

                let here = GeoPosition::new(51.5, -0.08);
                samples.unbounded_send(fix(here.latitude, here.longitude)).unwrap();
                settle().await;

                assert_eq!(router.requests(), vec![(DEFAULT, TARGET), (here, TARGET)]);
                assert_eq!(
                    map.record().summary.as_ref().map(|s| s.distance_km.as_str()),
                    Some("0.90")
                );

                shutdown_tx.send(()).unwrap();
                task.await.unwrap();
            })
            .await;
    }

    #[tokio::test]
    async fn teardown_releases_every_source() {
        LocalSet::new()
            .run_until(async {
                let config = DaemonConfig::default();
                let map = RecordingMap::default();
                let router = ScriptedRouter::default();
                router.answer(Ok(route(1200.0, 180.0)));
                router.answer(Ok(route(1200.0, 180.0)));

                let store = MemoryStore::default();
                store.push(&config.store.target_path, target_record(TARGET).unwrap());

                let (source, samples) = ScriptedSource::channel();
                let (command_tx, command_rx) = mpsc::unbounded_channel();
                let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

                let sync = LocationSync::new(map.clone(), router.clone(), &config);
                let status = sync.subscribe_status();
                let task = tokio::task::spawn_local(sync.run(
                    source,
                    store.clone(),
                    UnboundedReceiverStream::new(command_rx),
                    shutdown_rx,
                ));

                samples.unbounded_send(fix(51.505, -0.09)).unwrap();
                settle().await;

                assert!(!router.requests().is_empty());
                assert!(router.requests().iter().all(|&(_, to)| to == TARGET));
                assert_eq!(
                    map.record().summary.as_ref().map(|s| s.distance_km.as_str()),
                    Some("1.20")
                );
                assert_eq!(map.record().max_visible_routes, 1);
                assert_eq!(store.subscriber_count(), 1);

                command_tx.send(SessionCommand::Recenter).unwrap();
                settle().await;
                assert_eq!(map.record().view, Some((DEFAULT, 15)));

                shutdown_tx.send(()).unwrap();
                task.await.unwrap();
                settle().await;

                let moves = map.record().marker_moves.len();
                _ = samples.unbounded_send(fix(10.0, 10.0));
                store.push(&config.store.target_path, target_record(DEFAULT).unwrap());
                settle().await;

                assert!(samples.is_closed());
                assert_eq!(store.subscriber_count(), 0);
                assert_eq!(map.record().marker_moves.len(), moves);
                assert_ne!(status.borrow().message, "");
            })
            .await;
    }
}
