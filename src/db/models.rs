use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::control::{CommandSet, Setpoints};

/// A greenhouse and its climate targets. The six `target_*` columns are the
/// setpoints the decision engine regulates against.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Greenhouse {
    pub id: i64,
    pub name: String,
    pub location: String,
    pub target_temp: f64,
    pub target_humidity: f64,
    pub target_soil_moisture_pct: f64,
    pub target_light: f64,
    pub target_co_two: f64,
    pub target_wind_speed: f64,
}

impl Greenhouse {
    /// Snapshot of this greenhouse's targets for one engine decision.
    pub fn setpoints(&self) -> Setpoints {
        Setpoints {
            temp_celsius: self.target_temp,
            humidity_pct: self.target_humidity,
            soil_moisture_pct: self.target_soil_moisture_pct,
            light_lux: self.target_light,
            co_two: self.target_co_two,
            wind_speed: self.target_wind_speed,
        }
    }
}

/// One sensor sample. Measurements are nullable: a sample may carry any
/// subset of the six quantities, and the engine treats a missing value as
/// in-band for that rule.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    pub id: i64,
    pub greenhouse_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub temp_celsius: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub soil_moisture_pct: Option<f64>,
    pub light_lux: Option<f64>,
    pub co_two: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// A durably recorded actuator state. Rows are append-only; `id` and
/// `recorded_at` are non-semantic and excluded from reconciliation equality.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ActuatorStatus {
    pub id: i64,
    pub greenhouse_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub vents_on: bool,
    pub fan_on: bool,
    pub lights_on: bool,
    pub curtains_on: bool,
    pub irrigation_pump_on: bool,
    pub humidifier_pump_on: bool,
    pub heater_on: bool,
}

impl ActuatorStatus {
    /// The seven actuator booleans with identifier and timestamp stripped —
    /// the shape the reconciler compares against an incoming decision.
    pub fn command_set(&self) -> CommandSet {
        CommandSet {
            vents_on: self.vents_on,
            fan_on: self.fan_on,
            lights_on: self.lights_on,
            curtains_on: self.curtains_on,
            irrigation_pump_on: self.irrigation_pump_on,
            humidifier_pump_on: self.humidifier_pump_on,
            heater_on: self.heater_on,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_set_strips_id_and_timestamp() {
        let status = ActuatorStatus {
            id: 42,
            greenhouse_id: 1,
            recorded_at: Utc::now(),
            vents_on: true,
            fan_on: true,
            lights_on: false,
            curtains_on: false,
            irrigation_pump_on: false,
            humidifier_pump_on: true,
            heater_on: false,
        };

        let set = status.command_set();
        assert!(set.vents_on);
        assert!(set.fan_on);
        assert!(set.humidifier_pump_on);
        assert!(!set.lights_on);
        assert!(!set.curtains_on);
        assert!(!set.irrigation_pump_on);
        assert!(!set.heater_on);
    }

    #[test]
    fn setpoints_mirror_target_columns() {
        let g = Greenhouse {
            id: 1,
            name: "North house".into(),
            location: "Field A".into(),
            target_temp: 25.0,
            target_humidity: 60.0,
            target_soil_moisture_pct: 40.0,
            target_light: 500.0,
            target_co_two: 400.0,
            target_wind_speed: 1.0,
        };

        let sp = g.setpoints();
        assert_eq!(sp.temp_celsius, 25.0);
        assert_eq!(sp.humidity_pct, 60.0);
        assert_eq!(sp.soil_moisture_pct, 40.0);
        assert_eq!(sp.light_lux, 500.0);
        assert_eq!(sp.co_two, 400.0);
        assert_eq!(sp.wind_speed, 1.0);
    }
}
