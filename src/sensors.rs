use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::error::{InstrumentError, Result};

/// Barometer reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    pub pressure_hpa: f64,
    pub timestamp: DateTime<Utc>,
}

impl PressureSample {
    pub fn new(pressure_hpa: f64, timestamp: DateTime<Utc>) -> Self {
        Self { pressure_hpa, timestamp }
    }
}

/// Accelerometer reading in g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp: DateTime<Utc>,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: DateTime<Utc>) -> Self {
        Self { x, y, z, timestamp }
    }
}

/// A platform sensor that delivers samples to one subscriber at a time.
pub trait SensorStream: Send {
    type Sample: Send + 'static;

    /// Requested delivery interval; called once before `subscribe`
    fn set_update_interval(&mut self, interval: Duration);

    /// Begin delivery. Must be called from within a tokio runtime.
    fn subscribe(&mut self) -> Result<Subscription<Self::Sample>>;
}

/// Cancellable handle over a sample channel.
///
/// After `cancel` (or drop) the producer can no longer deliver.
pub struct Subscription<T> {
    rx: Receiver<T>,
    producer: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: Receiver<T>, producer: Option<JoinHandle<()>>) -> Self {
        Subscription { rx, producer }
    }

    /// Next sample, or `None` once the producer has gone away
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    pub fn cancel(&mut self) {
        self.rx.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Pushes samples into whatever subscription is current, dropping them when the
/// channel is full. Returns `false` once the subscriber has gone.
fn deliver<T>(tx: &Sender<T>, sample: T, name: &str, count: &mut u64) -> bool {
    match tx.try_send(sample) {
        Ok(_) => {
            *count += 1;
            if *count % 100 == 0 {
                log::debug!("[{}] {} samples", name, count);
            }
            true
        }
        Err(TrySendError::Closed(_)) => {
            log::debug!("[{}] Channel closed after {} samples", name, count);
            false
        }
        Err(TrySendError::Full(_)) => {
            log::trace!("[{}] Channel full, dropping sample", name);
            true
        }
    }
}

/// Simulated barometer: slow thermal cycles of climb and sink around a base pressure.
pub struct SimulatedBarometer {
    base_pressure_hpa: f64,
    update_interval: Duration,
    capacity: usize,
}

impl SimulatedBarometer {
    pub fn new(base_pressure_hpa: f64) -> Self {
        Self {
            base_pressure_hpa,
            update_interval: Duration::from_millis(500),
            capacity: 100,
        }
    }
}

impl SensorStream for SimulatedBarometer {
    type Sample = PressureSample;

    fn set_update_interval(&mut self, interval: Duration) {
        self.update_interval = interval;
    }

    fn subscribe(&mut self) -> Result<Subscription<PressureSample>> {
        if !self.base_pressure_hpa.is_finite() || self.base_pressure_hpa <= 0.0 {
            return Err(InstrumentError::SensorFailed(format!(
                "barometer base pressure {} hPa is not usable",
                self.base_pressure_hpa
            )));
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = tokio::spawn(barometer_loop(tx, self.update_interval, self.base_pressure_hpa));
        Ok(Subscription::new(rx, Some(handle)))
    }
}

async fn barometer_loop(tx: Sender<PressureSample>, period: Duration, base_pressure_hpa: f64) {
    let mut ticker = interval(period);
    let mut sample_count = 0u64;
    let mut step = 0u64;

    loop {
        ticker.tick().await;

        let t = step as f64 * period.as_secs_f64();
        step += 1;
        let sample = PressureSample::new(mock_pressure(base_pressure_hpa, t), Utc::now());

        if !deliver(&tx, sample, "baro", &mut sample_count) {
            break;
        }
    }
}

/// ~0.6 hPa swing (about 5 m) over a 40 s thermal cycle
fn mock_pressure(base_pressure_hpa: f64, t: f64) -> f64 {
    use std::f64::consts::PI;
    base_pressure_hpa - 0.6 * (t * 2.0 * PI / 40.0).sin() + 0.02 * (t * 2.0 * PI / 1.7).sin()
}

/// Simulated accelerometer: gentle rocking around level flight.
pub struct SimulatedAccelerometer {
    update_interval: Duration,
    capacity: usize,
}

impl SimulatedAccelerometer {
    pub fn new() -> Self {
        Self {
            update_interval: Duration::from_millis(100),
            capacity: 500,
        }
    }
}

impl Default for SimulatedAccelerometer {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorStream for SimulatedAccelerometer {
    type Sample = AccelerationSample;

    fn set_update_interval(&mut self, interval: Duration) {
        self.update_interval = interval;
    }

    fn subscribe(&mut self) -> Result<Subscription<AccelerationSample>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = tokio::spawn(accelerometer_loop(tx, self.update_interval));
        Ok(Subscription::new(rx, Some(handle)))
    }
}

async fn accelerometer_loop(tx: Sender<AccelerationSample>, period: Duration) {
    use std::f64::consts::PI;

    let mut ticker = interval(period);
    let mut sample_count = 0u64;
    let mut step = 0u64;

    loop {
        ticker.tick().await;

        let t = step as f64 * period.as_secs_f64();
        step += 1;
        let sample = AccelerationSample::new(
            (t * 2.0 * PI / 6.0).sin() * 0.15,
            (t * 2.0 * PI / 9.0).cos() * 0.08,
            0.98 + (t * PI).sin() * 0.01,
            Utc::now(),
        );

        if !deliver(&tx, sample, "accel", &mut sample_count) {
            break;
        }
    }
}

struct ManualInner<T> {
    sender: Option<Sender<T>>,
    update_interval: Option<Duration>,
}

/// Sensor driven by hand through its paired [`ManualFeed`], for replay and tests.
pub struct ManualSensor<T> {
    inner: Arc<Mutex<ManualInner<T>>>,
    capacity: usize,
}

/// Producer side of a [`ManualSensor`]
pub struct ManualFeed<T> {
    inner: Arc<Mutex<ManualInner<T>>>,
}

impl<T> Clone for ManualFeed<T> {
    fn clone(&self) -> Self {
        ManualFeed { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Send + 'static> ManualSensor<T> {
    pub fn new(capacity: usize) -> (Self, ManualFeed<T>) {
        let inner = Arc::new(Mutex::new(ManualInner {
            sender: None,
            update_interval: None,
        }));
        let feed = ManualFeed { inner: Arc::clone(&inner) };
        (ManualSensor { inner, capacity: capacity.max(1) }, feed)
    }
}

impl<T: Send + 'static> SensorStream for ManualSensor<T> {
    type Sample = T;

    fn set_update_interval(&mut self, interval: Duration) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.update_interval = Some(interval);
        }
    }

    fn subscribe(&mut self) -> Result<Subscription<T>> {
        let mut inner = self.inner.lock().map_err(|_| {
            InstrumentError::Internal("Failed to acquire manual sensor lock".to_string())
        })?;
        let (tx, rx) = mpsc::channel(self.capacity);
        inner.sender = Some(tx);
        Ok(Subscription::new(rx, None))
    }
}

impl<T> ManualFeed<T> {
    /// Deliver a sample; `false` if nobody is subscribed any more
    pub async fn send(&self, sample: T) -> bool {
        let sender = self
            .inner
            .lock()
            .ok()
            .and_then(|inner| inner.sender.clone());

        match sender {
            Some(tx) => tx.send(sample).await.is_ok(),
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.sender.as_ref().map(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    /// Interval most recently requested by the subscriber
    pub fn update_interval(&self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|inner| inner.update_interval)
    }
}
