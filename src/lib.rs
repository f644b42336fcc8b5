// Flight instrument core
// Barometric vario, altitude and attitude from raw sensor samples, plus a persistent flight log

pub mod altitude;
pub mod attitude;
pub mod config;
pub mod error;
pub mod sensors;
pub mod session;
pub mod smoothing;
pub mod storage;
pub mod units;
pub mod vario;

pub use altitude::{estimate_altitude, SEA_LEVEL_PRESSURE_HPA};
pub use attitude::{estimate_attitude, AttitudeEstimate};
pub use config::SessionConfig;
pub use error::{InstrumentError, Result, StorageError};
pub use sensors::{AccelerationSample, PressureSample, SensorStream, Subscription};
pub use session::{DisplayState, SamplingSession, SessionState};
pub use storage::{FileStore, FlightLog, KeyValueStore, LogRecord, MemoryStore};
pub use units::{
    convert_altitude, convert_velocity, AltitudeUnit, UnitChange, UnitPreference, VelocityUnit,
};
pub use vario::{VarioDirection, VerticalRateDifferentiator};
