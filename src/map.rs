use geoposition::{Bounds, GeoPosition, Padding};

use crate::routing::{Route, RouteSummary};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Current,
    Target,
}

impl MarkerKind {
    pub fn label(self) -> &'static str {
        match self {
            MarkerKind::Current => "Current Location",
            MarkerKind::Target => "Target Location",
        }
    }
}

/// The display a location session draws on.
///
/// At most one route is shown at a time; callers remove the previous one before drawing.
pub trait MapView {
    fn set_view(&mut self, center: GeoPosition, zoom: u8);

    /// Places the marker, creating it on first use.
    fn set_marker(&mut self, kind: MarkerKind, position: GeoPosition);

    fn show_coordinates(&mut self, kind: MarkerKind, position: GeoPosition);

    fn draw_route(&mut self, route: &Route);

    fn remove_route(&mut self);

    /// `None` blanks the distance and duration readout.
    fn show_route_summary(&mut self, summary: Option<&RouteSummary>);

    fn show_route_status(&mut self, status: &str);

    fn fit_bounds(&mut self, bounds: Bounds, padding: Padding);
}

/// Headless map rendering every change to the log.
#[derive(Default)]
pub struct TerminalMap {
    route_visible: bool,
}

impl MapView for TerminalMap {
    fn set_view(&mut self, center: GeoPosition, zoom: u8) {
        log::info!("view centred on {center} at zoom {zoom}");
    }

    fn set_marker(&mut self, kind: MarkerKind, position: GeoPosition) {
        log::debug!("marker {} at {position}", kind.label());
    }

    fn show_coordinates(&mut self, kind: MarkerKind, position: GeoPosition) {
        log::info!(
            "{}: lat {:.6} lng {:.6}",
            kind.label(),
            position.latitude,
            position.longitude
        );
    }

    fn draw_route(&mut self, route: &Route) {
        self.route_visible = true;
        log::info!("route drawn through {} points", route.path.len());
    }

    fn remove_route(&mut self) {
        if std::mem::take(&mut self.route_visible) {
            log::debug!("route removed");
        }
    }

    fn show_route_summary(&mut self, summary: Option<&RouteSummary>) {
        match summary {
            Some(summary) => log::info!(
                "distance {} km, duration {} min",
                summary.distance_km,
                summary.duration_min
            ),
            None => log::info!("distance -- km, duration -- min"),
        }
    }

    fn show_route_status(&mut self, status: &str) {
        log::info!("route: {status}");
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding: Padding) {
        log::info!(
            "view fitted to {} .. {} ({}px, {}px)",
            bounds.south_west,
            bounds.north_east,
            padding.x,
            padding.y
        );
    }
}
