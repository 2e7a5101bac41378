pub mod config;
pub mod controller;
pub mod fan;
pub mod history;
pub mod profile;
pub mod pump;
pub mod schedule;
pub mod types;

pub use config::{ConfigUpdate, GreenhouseConfig, RuntimeConfig, TimezoneOption, TIMEZONES};
pub use controller::{GreenhouseController, ToggleError};
pub use history::{HistoryBuffer, HistoryError, HistorySample, HistorySnapshot};
pub use profile::{GrowProfile, ProfileError, GROW_PROFILES};
pub use schedule::{schedule_is_on, LightSchedule};
pub use types::{Actuator, ControllerStatus, LocalTime, RelayChange, RelayState, SensorState};
