use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use chrono::{DateTime, TimeZone, Utc};
use flight_instruments::sensors::{ManualFeed, ManualSensor};
use flight_instruments::{
    estimate_altitude, AccelerationSample, AltitudeUnit, DisplayState, FileStore, FlightLog,
    PressureSample, SamplingSession, SessionConfig, UnitChange, VarioDirection,
    VerticalRateDifferentiator,
};

type Session = SamplingSession<ManualSensor<PressureSample>, ManualSensor<AccelerationSample>>;

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_720_000_000_000 + ms).unwrap()
}

fn session_on(dir: &std::path::Path) -> (Session, ManualFeed<PressureSample>) {
    let (pressure, baro) = ManualSensor::new(8);
    let (acceleration, _accel) = ManualSensor::new(8);
    let log = Arc::new(FlightLog::new(Arc::new(FileStore::new(dir))));
    let session = SamplingSession::new(pressure, acceleration, log, SessionConfig::default());
    (session, baro)
}

async fn wait_for_samples(session: &Session, count: u64) -> DisplayState {
    for _ in 0..200 {
        let display = session.display().unwrap();
        if display.pressure_samples >= count {
            return display;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} pressure samples", count);
}

#[test]
fn differentiator_climb_scenario() {
    let mut vario = VerticalRateDifferentiator::new();

    assert_eq!(vario.update(1013.25, at(0)).unwrap(), None);
    let rate = vario.update(1010.0, at(1000)).unwrap().unwrap();

    assert_relative_eq!(rate, estimate_altitude(1010.0).unwrap() - 0.0, epsilon = 1e-9);
    assert_eq!(VarioDirection::from_rate(Some(rate)), VarioDirection::Climbing);
}

#[tokio::test]
async fn flight_log_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (mut first, baro) = session_on(dir.path());
    first.start().unwrap();
    baro.send(PressureSample::new(1013.25, at(0))).await;
    baro.send(PressureSample::new(1010.0, at(1000))).await;
    wait_for_samples(&first, 2).await;
    first.stop().await;
    drop(first);

    let (mut second, baro) = session_on(dir.path());
    assert_eq!(second.logs().await.len(), 2);

    second.start().unwrap();
    baro.send(PressureSample::new(1009.0, at(2000))).await;
    let display = wait_for_samples(&second, 1).await;
    // Fresh session: no rate until a second sample arrives
    assert_eq!(display.vertical_rate, None);
    second.stop().await;

    let logs = second.logs().await;
    assert_eq!(logs.len(), 3);
    assert!(logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn unit_toggle_leaves_persisted_records_alone() {
    let dir = tempfile::tempdir().unwrap();
    let (mut session, baro) = session_on(dir.path());
    session.start().unwrap();

    baro.send(PressureSample::new(980.0, at(0))).await;
    let metric = wait_for_samples(&session, 1).await;
    let before = session.logs().await;

    session
        .set_unit_preference(UnitChange::Altitude(AltitudeUnit::Feet))
        .unwrap();

    let imperial = session.display().unwrap();
    assert_relative_eq!(
        imperial.altitude.unwrap(),
        metric.altitude.unwrap() * 3.28084,
        epsilon = 1e-9
    );
    assert_eq!(session.logs().await, before);
    assert!(before[0].alt.ends_with(" m"));

    session.stop().await;
}

#[tokio::test]
async fn corrupted_log_shows_empty_and_sampling_continues() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("logs.json"), "[{\"speed\": 1}]").unwrap();

    let (mut session, baro) = session_on(dir.path());
    assert!(session.logs().await.is_empty());

    session.start().unwrap();
    baro.send(PressureSample::new(1000.0, at(0))).await;
    baro.send(PressureSample::new(999.5, at(500))).await;
    let display = wait_for_samples(&session, 2).await;
    session.stop().await;

    assert_eq!(display.failed_appends, 2);
    assert!(display.vertical_rate.unwrap() > 0.0);
    // Corrupt data is not overwritten
    let raw = std::fs::read_to_string(dir.path().join("logs.json")).unwrap();
    assert_eq!(raw, "[{\"speed\": 1}]");
}
