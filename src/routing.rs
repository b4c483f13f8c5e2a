use std::{future::Future, time::Duration};

use drone_rescue_config::RoutingConfig;
use geoposition::GeoPosition;
use serde::Deserialize;

/// The first path alternative found by the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub distance_m: f64,
    pub duration_s: f64,
    pub path: Vec<GeoPosition>,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RouteError {
    #[error("no route found: {0}")]
    NoRoute(String),
    #[error("routing engine error: {0}")]
    Engine(String),
}

pub trait RoutingEngine {
    /// Routes from `from` to `to`, in that order.
    fn route(
        &self,
        from: GeoPosition,
        to: GeoPosition,
    ) -> impl Future<Output = Result<Route, RouteError>>;
}

/// Distance and duration as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteSummary {
    /// Kilometers, two decimals.
    pub distance_km: String,
    /// Whole minutes.
    pub duration_min: String,
}

impl From<&Route> for RouteSummary {
    fn from(route: &Route) -> Self {
        Self {
            // Half-up to two decimals.
            distance_km: format!("{:.2}", (route.distance_m / 10.0).round() / 100.0),
            duration_min: format!("{}", (route.duration_s / 60.0).round() as i64),
        }
    }
}

/// Client for an OSRM `route` service.
pub struct Osrm {
    client: reqwest::Client,
    service_url: String,
    profile: String,
}

impl Osrm {
    pub fn new(config: &RoutingConfig) -> Result<Self, RouteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| RouteError::Engine(format!("http client init failed: {err}")))?;

        Ok(Self {
            client,
            service_url: config.service_url.trim_end_matches('/').to_owned(),
            profile: config.profile.clone(),
        })
    }

    fn url(&self, from: GeoPosition, to: GeoPosition) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson&steps=false",
            self.service_url, self.profile, from.longitude, from.latitude, to.longitude, to.latitude
        )
    }
}

impl RoutingEngine for Osrm {
    async fn route(&self, from: GeoPosition, to: GeoPosition) -> Result<Route, RouteError> {
        let url = self.url(from, to);
        log::debug!("requesting {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| RouteError::Engine(format!("request error: {err}")))?;

        // Errors such as NoRoute come back as 400 with a JSON body.
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RouteError::Engine(format!("invalid body: {err}")))?;

        match parse_response(&body) {
            Err(RouteError::Engine(_)) if !status.is_success() => {
                Err(RouteError::Engine(format!("HTTP {status}")))
            }
            result => result,
        }
    }
}

#[derive(Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

fn parse_response(body: &str) -> Result<Route, RouteError> {
    let response: OsrmResponse = serde_json::from_str(body)
        .map_err(|err| RouteError::Engine(format!("invalid response: {err}")))?;

    let message = || response.message.clone().unwrap_or_else(|| response.code.clone());

    match response.code.as_str() {
        "Ok" => (),
        "NoRoute" | "NoSegment" => return Err(RouteError::NoRoute(message())),
        _ => return Err(RouteError::Engine(format!("{}: {}", response.code, message()))),
    }

    let Some(first) = response.routes.first() else {
        return Err(RouteError::NoRoute("no alternatives returned".to_owned()));
    };

    Ok(Route {
        distance_m: first.distance,
        duration_s: first.duration,
        path: first
            .geometry
            .as_ref()
            .map(|geometry| {
                geometry
                    .coordinates
                    .iter()
                    .map(|&[longitude, latitude]| GeoPosition::new(latitude, longitude))
                    .collect()
            })
            .unwrap_or_default(),
    })
}
