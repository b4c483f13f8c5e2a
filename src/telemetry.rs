//! Simulated cockpit panel. Instruments are fabricated locally; only the power flag and
//! flight mode reach the store.

use std::{fmt, rc::Rc, str::FromStr, time::Duration};

use chrono::{DateTime, Local};
use drone_rescue_config::{StoreConfig, TelemetryConfig};
use futures::{Stream, StreamExt};
use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::store::{write_detached, RealtimeStore};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CockpitError {
    #[error("power on the system first")]
    PoweredOff,
    #[error("unknown flight mode `{0}`")]
    UnknownMode(String),
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
}

/// Flight modes as agreed with the flight controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlightMode {
    Manual,
    Stabilize,
    AltHold,
    Loiter,
    Auto,
    Rtl,
}

impl FlightMode {
    pub const ALL: [FlightMode; 6] = [
        FlightMode::Manual,
        FlightMode::Stabilize,
        FlightMode::AltHold,
        FlightMode::Loiter,
        FlightMode::Auto,
        FlightMode::Rtl,
    ];

    /// The tag written to the store.
    pub fn tag(self) -> &'static str {
        match self {
            FlightMode::Manual => "MANUAL",
            FlightMode::Stabilize => "STABILIZE",
            FlightMode::AltHold => "ALT_HOLD",
            FlightMode::Loiter => "LOITER",
            FlightMode::Auto => "AUTO",
            FlightMode::Rtl => "RTL",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for FlightMode {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        FlightMode::ALL
            .into_iter()
            .find(|mode| mode.tag() == normalized)
            .ok_or_else(|| CockpitError::UnknownMode(s.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Power,
    Mode(FlightMode),
    /// Emergency stop.
    Stop,
    Camera,
    Gimbal,
    Lidar,
    Record,
    Calibrate,
}

impl FromStr for Command {
    type Err = CockpitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let command = match (words.next(), words.next()) {
            (Some("power"), None) => Command::Power,
            (Some("mode"), Some(mode)) => Command::Mode(mode.parse()?),
            (Some("stop"), None) => Command::Stop,
            (Some("camera"), None) => Command::Camera,
            (Some("gimbal"), None) => Command::Gimbal,
            (Some("lidar"), None) => Command::Lidar,
            (Some("record"), None) => Command::Record,
            (Some("cal" | "calibrate"), None) => Command::Calibrate,
            _ => return Err(CockpitError::UnknownCommand(s.trim().to_owned())),
        };

        match words.next() {
            None => Ok(command),
            Some(_) => Err(CockpitError::UnknownCommand(s.trim().to_owned())),
        }
    }
}

/// A value to store at `path`.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreWrite {
    pub path: String,
    pub value: Value,
}

impl StoreWrite {
    /// The engine flag is stored as 1/0.
    pub fn engine(config: &StoreConfig, on: bool) -> Self {
        Self {
            path: config.engine_path.clone(),
            value: json!(u8::from(on)),
        }
    }

    pub fn flight_mode(config: &StoreConfig, mode: FlightMode) -> Self {
        Self {
            path: config.flight_mode_path.clone(),
            value: json!(mode.tag()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruments {
    pub altitude_m: f64,
    pub speed_kmh: f64,
    pub heading_deg: u16,
    pub battery_pct: f64,
    pub flight_time: Duration,
    pub distance_km: f64,
    pub temperature_c: f64,
    pub voltage_v: f64,
    pub current_a: f64,
    pub cpu_pct: u8,
    pub link_pct: u8,
    pub signal_bars: u8,
}

impl Default for Instruments {
    fn default() -> Self {
        Self {
            altitude_m: 0.0,
            speed_kmh: 0.0,
            heading_deg: 0,
            battery_pct: 100.0,
            flight_time: Duration::ZERO,
            distance_km: 0.0,
            temperature_c: 0.0,
            voltage_v: 0.0,
            current_a: 0.0,
            cpu_pct: 0,
            link_pct: 0,
            signal_bars: 0,
        }
    }
}

impl Instruments {
    /// Advances one frame of made-up readings.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) {
        self.altitude_m = rng.gen_range(20.0..170.0);
        self.speed_kmh = rng.gen_range(5.0..85.0);
        self.heading_deg = rng.gen_range(0..360);
        self.battery_pct = (self.battery_pct - rng.gen_range(0.0..0.05)).max(0.0);
        self.flight_time += Duration::from_secs(1);
        self.distance_km += rng.gen_range(0.0..0.015);
        self.temperature_c = rng.gen_range(35.0_f64..50.0).round();
        self.voltage_v = rng.gen_range(11.8..12.6);
        self.current_a = rng.gen_range(3.0..9.0);
        self.cpu_pct = rng.gen_range(30..70);
        self.link_pct = rng.gen_range(90..100);
        self.signal_bars = rng.gen_range(1..=5);
    }

    fn grounded(&mut self) {
        self.altitude_m = 0.0;
        self.speed_kmh = 0.0;
    }
}

const CALIBRATION_TIME: Duration = Duration::from_secs(2);
const CALIBRATED_NOTICE: Duration = Duration::from_millis(1500);

/// Sensor calibration, a fixed-length local routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Calibration {
    Idle,
    Running { remaining: Duration },
    Done { remaining: Duration },
}

impl Calibration {
    fn advance(self, elapsed: Duration) -> Self {
        match self {
            Calibration::Idle => Calibration::Idle,
            Calibration::Running { remaining } if remaining > elapsed => Calibration::Running {
                remaining: remaining - elapsed,
            },
            Calibration::Running { remaining } => {
                Calibration::Done { remaining: CALIBRATED_NOTICE }.advance(elapsed - remaining)
            }
            Calibration::Done { remaining } if remaining > elapsed => Calibration::Done {
                remaining: remaining - elapsed,
            },
            Calibration::Done { .. } => Calibration::Idle,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Calibration::Idle => "-",
            Calibration::Running { .. } => "running",
            Calibration::Done { .. } => "ok",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Peripherals {
    pub camera: bool,
    pub gimbal: bool,
    pub lidar: bool,
    pub recording: bool,
}

pub struct Cockpit {
    store: StoreConfig,
    power: bool,
    emergency: bool,
    mode: Option<FlightMode>,
    peripherals: Peripherals,
    calibration: Calibration,
    instruments: Instruments,
    uptime: Duration,
}

impl Cockpit {
    pub fn new(store: StoreConfig) -> Self {
        Self {
            store,
            power: false,
            emergency: false,
            mode: None,
            peripherals: Peripherals::default(),
            calibration: Calibration::Idle,
            instruments: Instruments::default(),
            uptime: Duration::ZERO,
        }
    }

    pub fn peripherals(&self) -> Peripherals {
        self.peripherals
    }

    /// Applies a control, returning the store write it causes, if any.
    pub fn handle(&mut self, command: Command) -> Result<Option<StoreWrite>, CockpitError> {
        match command {
            Command::Power => {
                self.power = !self.power;
                if self.power {
                    self.emergency = false;
                } else {
                    self.instruments.grounded();
                }
                Ok(Some(StoreWrite::engine(&self.store, self.power)))
            }

            Command::Mode(mode) => {
                self.require_power()?;
                self.mode = Some(mode);
                Ok(Some(StoreWrite::flight_mode(&self.store, mode)))
            }

            Command::Stop => {
                self.power = false;
                self.emergency = true;
                self.peripherals = Peripherals::default();
                self.calibration = Calibration::Idle;
                self.instruments.grounded();
                Ok(Some(StoreWrite::engine(&self.store, false)))
            }

            Command::Camera => self.toggle(|p| &mut p.camera),
            Command::Gimbal => self.toggle(|p| &mut p.gimbal),
            Command::Lidar => self.toggle(|p| &mut p.lidar),
            Command::Record => self.toggle(|p| &mut p.recording),

            Command::Calibrate => {
                self.require_power()?;
                if !matches!(self.calibration, Calibration::Running { .. }) {
                    self.calibration = Calibration::Running {
                        remaining: CALIBRATION_TIME,
                    };
                }
                Ok(None)
            }
        }
    }

    fn require_power(&self) -> Result<(), CockpitError> {
        if self.power {
            Ok(())
        } else {
            Err(CockpitError::PoweredOff)
        }
    }

    fn toggle(
        &mut self,
        field: impl FnOnce(&mut Peripherals) -> &mut bool,
    ) -> Result<Option<StoreWrite>, CockpitError> {
        self.require_power()?;
        let flag = field(&mut self.peripherals);
        *flag = !*flag;
        Ok(None)
    }

    pub fn on_frame<R: Rng>(&mut self, rng: &mut R) {
        if self.power {
            self.instruments.tick(rng);
        }
    }

    pub fn on_clock(&mut self, elapsed: Duration) {
        self.uptime += elapsed;
        self.calibration = self.calibration.advance(elapsed);
    }

    pub fn panel(&self, now: DateTime<Local>) -> String {
        let i = &self.instruments;
        let state = match (self.power, self.emergency) {
            (true, _) => "POWERED ON",
            (false, true) => "EMERGENCY STOP",
            (false, false) => "OFFLINE",
        };
        let on = |flag: bool| if flag { "on" } else { "off" };

        format!(
            "{} up {} | {state} mode {} | alt {:.1} m spd {:.1} km/h hdg {}° | bat {:.1}% | \
             flight {} dist {:.2} km | {:.0}°C {:.1}V {:.1}A cpu {}% link {}% {} | \
             cam {} gimbal {} lidar {} rec {} cal {}",
            now.format("%H:%M:%S"),
            hms(self.uptime),
            self.mode.map_or("--", FlightMode::tag),
            i.altitude_m,
            i.speed_kmh,
            i.heading_deg,
            i.battery_pct,
            ms(i.flight_time),
            i.distance_km,
            i.temperature_c,
            i.voltage_v,
            i.current_a,
            i.cpu_pct,
            i.link_pct,
            signal(i.signal_bars),
            on(self.peripherals.camera),
            on(self.peripherals.gimbal),
            on(self.peripherals.lidar),
            on(self.peripherals.recording),
            self.calibration.label(),
        )
    }
}

#[cfg(test)]
impl Cockpit {
    pub fn is_powered(&self) -> bool {
        self.power
    }

    pub fn mode(&self) -> Option<FlightMode> {
        self.mode
    }

    pub fn instruments(&self) -> &Instruments {
        &self.instruments
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }
}

fn hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, secs % 3600 / 60, secs % 60)
}

fn ms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn signal(bars: u8) -> String {
    let bars = usize::from(bars.min(5));
    format!("{}{}", "●".repeat(bars), "○".repeat(5 - bars))
}

/// Drives the panel until `shutdown` fires. Store writes are not awaited.
pub async fn run<S, C>(
    mut cockpit: Cockpit,
    store: Rc<S>,
    config: &TelemetryConfig,
    mut commands: C,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: RealtimeStore + 'static,
    C: Stream<Item = Command> + Unpin,
{
    let clock_interval = Duration::from_millis(config.clock_interval_ms.max(1));
    let mut clock = tokio::time::interval(clock_interval);
    let mut frame = tokio::time::interval(Duration::from_millis(config.frame_interval_ms.max(1)));
    let mut rng = rand::thread_rng();

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,

            _ = clock.tick() => {
                cockpit.on_clock(clock_interval);
                println!("{}", cockpit.panel(Local::now()));
            }

            _ = frame.tick() => cockpit.on_frame(&mut rng),

            Some(command) = commands.next() => match cockpit.handle(command) {
                Ok(Some(write)) => write_detached(store.clone(), write.path, write.value),
                Ok(None) => log::info!("{command:?}: {:?}", cockpit.peripherals()),
                Err(err) => log::warn!("{command:?} rejected: {err}"),
            },
        }
    }

    log::info!("cockpit stopping");
}
