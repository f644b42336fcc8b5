use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::attitude::{estimate_attitude, AttitudeEstimate};
use crate::config::{SessionConfig, ACCELERATION_INTERVAL, PRESSURE_INTERVAL};
use crate::error::{InstrumentError, Result};
use crate::sensors::{AccelerationSample, PressureSample, SensorStream, Subscription};
use crate::smoothing::AttitudeEaser;
use crate::storage::{FlightLog, LogRecord};
use crate::units::{convert_altitude, convert_velocity, UnitChange, UnitPreference};
use crate::vario::{VarioDirection, VerticalRateDifferentiator};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, sensors not yet subscribed
    Idle,
    /// Receiving samples
    Subscribed,
    /// Torn down; no further samples are processed
    Unsubscribed,
}

/// Snapshot consumed by the instrument widgets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    /// Vertical speed in the preferred unit; `None` until a rate is defined
    pub vertical_rate: Option<f64>,
    pub vertical_rate_mps: Option<f64>,
    /// Altitude in the preferred unit; `None` before the first pressure sample
    pub altitude: Option<f64>,
    pub altitude_m: Option<f64>,
    pub direction: VarioDirection,
    /// Latest instantaneous estimate
    pub attitude: AttitudeEstimate,
    /// Eased attitude for the horizon widget
    pub smoothed_attitude: AttitudeEstimate,
    pub units: UnitPreference,
    pub pressure_samples: u64,
    pub acceleration_samples: u64,
    pub rejected_samples: u64,
    pub failed_appends: u64,
}

struct Readings {
    units: UnitPreference,
    vertical_rate_mps: Option<f64>,
    altitude_m: Option<f64>,
    attitude: AttitudeEstimate,
    easer: AttitudeEaser,
    pressure_samples: u64,
    acceleration_samples: u64,
    rejected_samples: u64,
    failed_appends: u64,
}

type SharedReadings = Arc<Mutex<Readings>>;

fn lock_readings(readings: &SharedReadings) -> Result<std::sync::MutexGuard<'_, Readings>> {
    readings
        .lock()
        .map_err(|_| InstrumentError::Internal("Failed to acquire readings lock".to_string()))
}

/// Per-screen sampling session.
///
/// Owns the two sensor streams, the unit preference and the worker tasks that
/// turn raw samples into display state and flight log records.
pub struct SamplingSession<P, A>
where
    P: SensorStream<Sample = PressureSample>,
    A: SensorStream<Sample = AccelerationSample>,
{
    pressure: P,
    acceleration: A,
    log: Arc<FlightLog>,
    readings: SharedReadings,
    state: SessionState,
    shutdown: Option<watch::Sender<bool>>,
    workers: Vec<JoinHandle<()>>,
}

impl<P, A> SamplingSession<P, A>
where
    P: SensorStream<Sample = PressureSample>,
    A: SensorStream<Sample = AccelerationSample>,
{
    /// Create new session in Idle state
    pub fn new(pressure: P, acceleration: A, log: Arc<FlightLog>, config: SessionConfig) -> Self {
        let readings = Readings {
            units: config.units,
            vertical_rate_mps: None,
            altitude_m: None,
            attitude: AttitudeEstimate::level(),
            easer: AttitudeEaser::new(config.smoothing()),
            pressure_samples: 0,
            acceleration_samples: 0,
            rejected_samples: 0,
            failed_appends: 0,
        };

        SamplingSession {
            pressure,
            acceleration,
            log,
            readings: Arc::new(Mutex::new(readings)),
            state: SessionState::Idle,
            shutdown: None,
            workers: Vec::new(),
        }
    }

    /// Subscribe to both sensors (Idle → Subscribed). Must run inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Subscribed => {
                return Err(InstrumentError::InvalidState("Session already running".to_string()))
            }
            SessionState::Unsubscribed => {
                return Err(InstrumentError::InvalidState(
                    "Session was stopped; create a new one".to_string(),
                ))
            }
        }

        self.pressure.set_update_interval(PRESSURE_INTERVAL);
        self.acceleration.set_update_interval(ACCELERATION_INTERVAL);

        let pressure_sub = self.pressure.subscribe()?;
        // Dropping pressure_sub on error cancels it
        let accel_sub = self.acceleration.subscribe()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.workers.push(tokio::spawn(pressure_worker(
            pressure_sub,
            shutdown_rx.clone(),
            Arc::clone(&self.readings),
            Arc::clone(&self.log),
        )));
        self.workers.push(tokio::spawn(acceleration_worker(
            accel_sub,
            shutdown_rx,
            Arc::clone(&self.readings),
        )));

        self.shutdown = Some(shutdown_tx);
        self.state = SessionState::Subscribed;
        log::info!(
            "Sampling session started (pressure every {:?}, acceleration every {:?})",
            PRESSURE_INTERVAL,
            ACCELERATION_INTERVAL
        );
        Ok(())
    }

    /// Cancel both subscriptions and wait for the workers to exit.
    ///
    /// Idempotent. Once this returns no further sample touches the session.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                log::error!("Sampling worker ended abnormally: {}", e);
            }
        }

        if self.state != SessionState::Unsubscribed {
            log::info!("Sampling session stopped");
        }
        self.state = SessionState::Unsubscribed;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn unit_preference(&self) -> Result<UnitPreference> {
        Ok(lock_readings(&self.readings)?.units)
    }

    /// Applies to subsequent reads and records only
    pub fn set_unit_preference(&self, change: UnitChange) -> Result<()> {
        let mut readings = lock_readings(&self.readings)?;
        readings.units.apply(change);
        log::info!(
            "Units set to {} / {}",
            readings.units.velocity,
            readings.units.altitude
        );
        Ok(())
    }

    /// Get display snapshot
    pub fn display(&self) -> Result<DisplayState> {
        let readings = lock_readings(&self.readings)?;
        let units = readings.units;

        Ok(DisplayState {
            vertical_rate: readings
                .vertical_rate_mps
                .map(|rate| convert_velocity(rate, units.velocity)),
            vertical_rate_mps: readings.vertical_rate_mps,
            altitude: readings
                .altitude_m
                .map(|alt| convert_altitude(alt, units.altitude)),
            altitude_m: readings.altitude_m,
            direction: VarioDirection::from_rate(readings.vertical_rate_mps),
            attitude: readings.attitude,
            smoothed_attitude: readings.easer.sample(Instant::now()),
            units,
            pressure_samples: readings.pressure_samples,
            acceleration_samples: readings.acceleration_samples,
            rejected_samples: readings.rejected_samples,
            failed_appends: readings.failed_appends,
        })
    }

    /// Flight log for review. An unreadable log shows as empty.
    pub async fn logs(&self) -> Vec<LogRecord> {
        match self.log.read_all().await {
            Ok(records) => records,
            Err(e) => {
                log::error!("Failed to load flight log: {}", e);
                Vec::new()
            }
        }
    }
}

impl<P, A> Drop for SamplingSession<P, A>
where
    P: SensorStream<Sample = PressureSample>,
    A: SensorStream<Sample = AccelerationSample>,
{
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        for worker in self.workers.drain(..) {
            worker.abort();
        }
    }
}

async fn pressure_worker(
    mut subscription: Subscription<PressureSample>,
    mut shutdown: watch::Receiver<bool>,
    readings: SharedReadings,
    flight_log: Arc<FlightLog>,
) {
    let mut vario = VerticalRateDifferentiator::new();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            sample = subscription.recv() => match sample {
                Some(sample) => {
                    if let Err(e) = handle_pressure(sample, &mut vario, &readings, &flight_log).await {
                        log::error!("Pressure processing halted: {}", e);
                        break;
                    }
                }
                None => {
                    log::warn!("Pressure stream ended");
                    break;
                }
            },
        }
    }

    subscription.cancel();
}

async fn handle_pressure(
    sample: PressureSample,
    vario: &mut VerticalRateDifferentiator,
    readings: &SharedReadings,
    flight_log: &FlightLog,
) -> Result<()> {
    let (altitude_m, rate_mps) =
        match vario.update_with_altitude(sample.pressure_hpa, sample.timestamp) {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("Skipping pressure sample: {}", e);
                lock_readings(readings)?.rejected_samples += 1;
                return Ok(());
            }
        };

    let units = {
        let mut r = lock_readings(readings)?;
        r.vertical_rate_mps = rate_mps;
        r.altitude_m = Some(altitude_m);
        r.units
    };

    log::debug!(
        "Pressure {:.2} hPa -> {:.2} m, rate {:?}",
        sample.pressure_hpa,
        altitude_m,
        rate_mps
    );

    // Logged on every sample, including the first one without a rate
    let record = LogRecord::from_reading(rate_mps, altitude_m, units, Utc::now());
    let appended = flight_log.append(record).await;

    let mut r = lock_readings(readings)?;
    if let Err(e) = appended {
        log::error!("Dropping flight log record: {}", e);
        r.failed_appends += 1;
    }
    // Counted once the sample is fully handled, log write included
    r.pressure_samples += 1;

    Ok(())
}

async fn acceleration_worker(
    mut subscription: Subscription<AccelerationSample>,
    mut shutdown: watch::Receiver<bool>,
    readings: SharedReadings,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            sample = subscription.recv() => match sample {
                Some(sample) => {
                    let attitude = estimate_attitude(sample.x, sample.y, sample.z);
                    match lock_readings(&readings) {
                        Ok(mut r) => {
                            r.attitude = attitude;
                            r.easer.retarget(attitude, Instant::now());
                            r.acceleration_samples += 1;
                        }
                        Err(e) => {
                            log::error!("{}", e);
                            break;
                        }
                    }
                }
                None => {
                    log::warn!("Acceleration stream ended");
                    break;
                }
            },
        }
    }

    subscription.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::altitude::estimate_altitude;
    use crate::sensors::{ManualFeed, ManualSensor};
    use crate::storage::MemoryStore;
    use crate::units::{AltitudeUnit, VelocityUnit};
    use approx::assert_abs_diff_eq;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::time::Duration;

    type TestSession =
        SamplingSession<ManualSensor<PressureSample>, ManualSensor<AccelerationSample>>;

    struct Harness {
        session: TestSession,
        baro: ManualFeed<PressureSample>,
        accel: ManualFeed<AccelerationSample>,
        store: Arc<MemoryStore>,
    }

    fn harness() -> Harness {
        let (pressure, baro) = ManualSensor::new(16);
        let (acceleration, accel) = ManualSensor::new(16);
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(FlightLog::new(store.clone()));
        let session = SamplingSession::new(pressure, acceleration, log, SessionConfig::default());
        Harness { session, baro, accel, store }
    }

    fn at(ms: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + ChronoDuration::milliseconds(ms)
    }

    async fn wait_for(session: &TestSession, done: impl Fn(&DisplayState) -> bool) -> DisplayState {
        for _ in 0..200 {
            let display = session.display().unwrap();
            if done(&display) {
                return display;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session did not reach expected state");
    }

    #[tokio::test]
    async fn test_session_state_transitions() {
        let mut h = harness();
        assert_eq!(h.session.state(), SessionState::Idle);

        h.session.start().unwrap();
        assert_eq!(h.session.state(), SessionState::Subscribed);
        assert_eq!(h.baro.update_interval(), Some(PRESSURE_INTERVAL));
        assert_eq!(h.accel.update_interval(), Some(ACCELERATION_INTERVAL));

        h.session.stop().await;
        assert_eq!(h.session.state(), SessionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_invalid_state_transitions() {
        let mut h = harness();
        h.session.start().unwrap();
        assert!(matches!(h.session.start(), Err(InstrumentError::InvalidState(_))));

        h.session.stop().await;
        assert!(matches!(h.session.start(), Err(InstrumentError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_cancels_delivery() {
        let mut h = harness();
        h.session.start().unwrap();
        assert!(h.baro.is_subscribed());

        h.session.stop().await;
        h.session.stop().await;

        assert!(!h.baro.is_subscribed());
        assert!(!h.accel.is_subscribed());
        assert!(!h.baro.send(PressureSample::new(1000.0, at(0))).await);
        assert_eq!(h.session.display().unwrap().pressure_samples, 0);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut h = harness();
        h.session.stop().await;
        assert_eq!(h.session.state(), SessionState::Unsubscribed);
    }

    #[tokio::test]
    async fn test_pressure_samples_drive_vario_and_log() {
        let mut h = harness();
        h.session.start().unwrap();

        h.baro.send(PressureSample::new(1013.25, at(0))).await;
        let first = wait_for(&h.session, |d| d.pressure_samples == 1).await;
        assert_eq!(first.vertical_rate, None);
        assert_eq!(first.direction, VarioDirection::Neutral);
        assert_abs_diff_eq!(first.altitude.unwrap(), 0.0, epsilon = 1e-9);

        h.baro.send(PressureSample::new(1010.0, at(1000))).await;
        let second = wait_for(&h.session, |d| d.pressure_samples == 2).await;
        let expected = estimate_altitude(1010.0).unwrap();
        assert_abs_diff_eq!(second.vertical_rate.unwrap(), expected, epsilon = 1e-6);
        assert_eq!(second.direction, VarioDirection::Climbing);

        h.session.stop().await;

        let logs = h.session.logs().await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].speed, "0.00 m/s");
        assert_eq!(logs[0].alt, "0.00 m");
        assert_eq!(logs[1].speed, format!("{:.2} m/s", expected));
    }

    #[tokio::test]
    async fn test_invalid_pressure_is_skipped() {
        let mut h = harness();
        h.session.start().unwrap();

        h.baro.send(PressureSample::new(-3.0, at(0))).await;
        h.baro.send(PressureSample::new(1000.0, at(500))).await;
        let display = wait_for(&h.session, |d| d.pressure_samples == 1).await;
        assert_eq!(display.rejected_samples, 1);

        h.session.stop().await;
        assert_eq!(h.session.logs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_acceleration_updates_attitude() {
        let mut h = harness();
        h.session.start().unwrap();

        h.accel.send(AccelerationSample::new(1.0, 0.0, 0.0, at(0))).await;
        let display = wait_for(&h.session, |d| d.acceleration_samples == 1).await;
        assert_abs_diff_eq!(display.attitude.roll_deg, 90.0, epsilon = 1e-9);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let settled = h.session.display().unwrap();
        assert_abs_diff_eq!(settled.smoothed_attitude.roll_deg, 90.0, epsilon = 1e-9);

        h.session.stop().await;
    }

    #[tokio::test]
    async fn test_unit_change_affects_display_not_history() {
        let mut h = harness();
        h.session.start().unwrap();

        h.baro.send(PressureSample::new(1000.0, at(0))).await;
        let metric = wait_for(&h.session, |d| d.pressure_samples == 1).await;

        h.session
            .set_unit_preference(UnitChange::Altitude(AltitudeUnit::Feet))
            .unwrap();
        let imperial = h.session.display().unwrap();
        assert_eq!(imperial.units.altitude, AltitudeUnit::Feet);
        assert_eq!(imperial.units.velocity, VelocityUnit::MetersPerSecond);
        assert_abs_diff_eq!(
            imperial.altitude.unwrap(),
            metric.altitude.unwrap() * 3.28084,
            epsilon = 1e-9
        );

        h.baro.send(PressureSample::new(1000.0, at(500))).await;
        wait_for(&h.session, |d| d.pressure_samples == 2).await;
        h.session.stop().await;

        let logs = h.session.logs().await;
        assert_eq!(logs[0].alt_unit(), AltitudeUnit::Meters);
        assert_eq!(logs[1].alt_unit(), AltitudeUnit::Feet);
    }

    #[tokio::test]
    async fn test_append_failure_does_not_stop_sampling() {
        let mut h = harness();
        h.session.start().unwrap();
        h.store.set_unavailable(true);

        h.baro.send(PressureSample::new(1000.0, at(0))).await;
        let display = wait_for(&h.session, |d| d.failed_appends == 1).await;
        assert_eq!(display.pressure_samples, 1);
        assert!(h.session.logs().await.is_empty());

        h.store.set_unavailable(false);
        h.baro.send(PressureSample::new(999.0, at(500))).await;
        let display = wait_for(&h.session, |d| d.pressure_samples == 2).await;
        assert_eq!(display.failed_appends, 1);
        assert!(display.vertical_rate.unwrap() > 0.0);

        h.session.stop().await;
        assert_eq!(h.session.logs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_pressure_worker_halts_on_internal_error() {
        let mut h = harness();
        h.session.start().unwrap();
        assert!(h.baro.is_subscribed());

        let readings = Arc::clone(&h.session.readings);
        std::thread::spawn(move || {
            let _guard = readings.lock().unwrap();
            panic!("poisoning readings lock");
        })
        .join()
        .unwrap_err();

        assert!(h.baro.send(PressureSample::new(1000.0, at(0))).await);
        for _ in 0..200 {
            if !h.baro.is_subscribed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!h.baro.is_subscribed());
        assert!(h.session.display().is_err());

        h.session.stop().await;
        assert_eq!(h.session.state(), SessionState::Unsubscribed);
    }
}
