use chrono::{DateTime, Utc};
use futures::StreamExt;
use geoposition::GeoPosition;
use zbus::zvariant::{ObjectPath, OwnedObjectPath};

use crate::location::{Accuracy, PositionSource, PositioningError, Sample, SampleStream};

#[zbus::proxy(
    default_service = "org.freedesktop.GeoClue2",
    interface = "org.freedesktop.GeoClue2.Manager",
    default_path = "/org/freedesktop/GeoClue2/Manager"
)]
trait Manager {
    fn get_client(&self) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    default_service = "org.freedesktop.GeoClue2",
    interface = "org.freedesktop.GeoClue2.Client"
)]
trait Client {
    fn start(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn desktop_id(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn set_desktop_id(&self, id: &str) -> zbus::Result<()>;

    #[zbus(property)]
    fn distance_threshold(&self) -> zbus::Result<u32>;
    #[zbus(property)]
    fn set_distance_threshold(&self, meters: u32) -> zbus::Result<()>;

    #[zbus(property)]
    fn requested_accuracy_level(&self) -> zbus::Result<u32>;
    #[zbus(property)]
    fn set_requested_accuracy_level(&self, level: u32) -> zbus::Result<()>;

    #[zbus(signal)]
    fn location_updated(&self, old: ObjectPath<'_>, new: ObjectPath<'_>) -> zbus::Result<()>;
}

#[zbus::proxy(
    default_service = "org.freedesktop.GeoClue2",
    interface = "org.freedesktop.GeoClue2.Location"
)]
trait Location {
    #[zbus(property)]
    fn latitude(&self) -> zbus::Result<f64>;
    #[zbus(property)]
    fn longitude(&self) -> zbus::Result<f64>;
    #[zbus(property)]
    fn accuracy(&self) -> zbus::Result<f64>;
    /// Seconds and microseconds since the epoch.
    #[zbus(property)]
    fn timestamp(&self) -> zbus::Result<(u64, u64)>;
}

/// Positions from the GeoClue2 service on the system bus.
pub struct GeoClue {
    desktop_id: String,
    distance_threshold: u32,
}

impl GeoClue {
    pub fn new(desktop_id: String, distance_threshold: u32) -> Self {
        Self {
            desktop_id,
            distance_threshold,
        }
    }
}

impl PositionSource for GeoClue {
    async fn open(&self, accuracy: Accuracy) -> Result<SampleStream, PositioningError> {
        let conn = zbus::Connection::system().await.map_err(classify)?;

        let manager = ManagerProxy::new(&conn).await.map_err(classify)?;
        let client_path = manager.get_client().await.map_err(classify)?;
        let client = ClientProxy::builder(&conn)
            .path(client_path)
            .map_err(classify)?
            .build()
            .await
            .map_err(classify)?;

        client
            .set_desktop_id(&self.desktop_id)
            .await
            .map_err(classify)?;
        client
            .set_distance_threshold(self.distance_threshold)
            .await
            .map_err(classify)?;
        client
            .set_requested_accuracy_level(accuracy as u32)
            .await
            .map_err(classify)?;

        let location_updated = client.receive_location_updated().await.map_err(classify)?;

        // Access is only checked once the client starts.
        client.start().await.map_err(classify)?;

        let samples = location_updated
            .then(move |signal| {
                let conn = conn.clone();
                async move {
                    let args = match signal.args() {
                        Ok(args) => args,
                        Err(err) => {
                            log::warn!("malformed LocationUpdated signal: {err:?}");
                            return None;
                        }
                    };

                    match read_location(&conn, args.new()).await {
                        Ok(sample) => Some(sample),
                        Err(err) => {
                            log::warn!("failed to read GeoClue location: {err:?}");
                            None
                        }
                    }
                }
            })
            .filter_map(std::future::ready);

        Ok(samples.boxed_local())
    }
}

async fn read_location(conn: &zbus::Connection, path: &ObjectPath<'_>) -> zbus::Result<Sample> {
    let location = LocationProxy::builder(conn)
        .path(path)?
        .build()
        .await?;

    let latitude = location.latitude().await?;
    let longitude = location.longitude().await?;
    let accuracy_m = location.accuracy().await.ok();
    let timestamp = location
        .timestamp()
        .await
        .ok()
        .and_then(|(secs, micros)| {
            DateTime::from_timestamp(i64::try_from(secs).ok()?, (micros * 1000) as u32)
        })
        .unwrap_or_else(Utc::now);

    Ok(Sample {
        position: GeoPosition::new(latitude, longitude),
        accuracy_m,
        timestamp,
    })
}

fn classify(err: zbus::Error) -> PositioningError {
    match &err {
        zbus::Error::MethodError(name, _, _) if name.as_str().ends_with("AccessDenied") => {
            PositioningError::PermissionDenied
        }
        _ => PositioningError::Unavailable(err.to_string()),
    }
}
