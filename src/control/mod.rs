//! Climate-control decision engine.
//!
//! Maps one sensor [`Reading`] plus a greenhouse's [`Setpoints`] to a
//! [`CommandSet`] of actuator states. Pure and total: no I/O, and every
//! well-formed input produces a full seven-field command set.
//!
//! Each measured quantity has a fixed hysteresis margin around its target.
//! A rule only acts outside the dead-band (strictly above `target + margin`
//! or strictly below `target - margin`); inside the band it assigns nothing,
//! leaving earlier rules' assignments untouched. Rules run in the fixed
//! [`RULES`] order and a later rule's assignment to a shared field wins.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::Reading;

/// Hysteresis margin for temperature, in °C.
pub const TEMP_MARGIN: f64 = 2.0;
/// Hysteresis margin for relative humidity, in percentage points.
pub const HUMIDITY_MARGIN: f64 = 5.0;
/// Hysteresis margin for soil moisture, in percentage points.
pub const SOIL_MOISTURE_MARGIN: f64 = 5.0;
/// Hysteresis margin for light level, in lux.
pub const LIGHT_MARGIN: f64 = 100.0;
/// Hysteresis margin for CO2 concentration, in ppm.
pub const CO2_MARGIN: f64 = 50.0;
/// Hysteresis margin for wind speed, in m/s.
pub const WIND_SPEED_MARGIN: f64 = 0.5;

/// Per-greenhouse climate targets, immutable for the duration of one
/// decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoints {
    pub temp_celsius: f64,
    pub humidity_pct: f64,
    pub soil_moisture_pct: f64,
    pub light_lux: f64,
    pub co_two: f64,
    pub wind_speed: f64,
}

/// One decision's output: the desired on/off state of every actuator.
///
/// Defaults to all-off; a decision always carries all seven fields. Curtains
/// are carried for wire/schema compatibility but never driven by any rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommandSet {
    pub vents_on: bool,
    pub fan_on: bool,
    pub lights_on: bool,
    pub curtains_on: bool,
    pub irrigation_pump_on: bool,
    pub humidifier_pump_on: bool,
    pub heater_on: bool,
}

/// A single hysteresis rule: may flip fields of the accumulator, or leave it
/// untouched when the measurement is missing or inside the dead-band.
pub type Rule = fn(&Reading, &Setpoints, &mut CommandSet);

/// Rule evaluation order. Later rules override earlier assignments to the
/// same field, so this order is part of the control policy, not an
/// implementation detail.
pub const RULES: [Rule; 6] = [
    temperature_rule,
    humidity_rule,
    soil_moisture_rule,
    light_rule,
    co2_rule,
    wind_speed_rule,
];

/// Compute the actuator command set for one reading against one set of
/// targets. Deterministic and side-effect free.
pub fn decide(reading: &Reading, setpoints: &Setpoints) -> CommandSet {
    let mut commands = CommandSet::default();
    for rule in RULES {
        rule(reading, setpoints, &mut commands);
    }
    commands
}

fn temperature_rule(reading: &Reading, setpoints: &Setpoints, commands: &mut CommandSet) {
    let Some(v) = reading.temp_celsius else {
        return;
    };
    if v > setpoints.temp_celsius + TEMP_MARGIN {
        commands.heater_on = false;
        commands.vents_on = true;
        commands.humidifier_pump_on = true;
        commands.fan_on = true;
    } else if v < setpoints.temp_celsius - TEMP_MARGIN {
        commands.heater_on = true;
        commands.vents_on = false;
        commands.humidifier_pump_on = false;
        commands.fan_on = false;
    }
}

fn humidity_rule(reading: &Reading, setpoints: &Setpoints, commands: &mut CommandSet) {
    let Some(v) = reading.humidity_pct else {
        return;
    };
    if v < setpoints.humidity_pct - HUMIDITY_MARGIN {
        commands.humidifier_pump_on = true;
        commands.fan_on = false;
        commands.vents_on = false;
    } else if v > setpoints.humidity_pct + HUMIDITY_MARGIN {
        commands.humidifier_pump_on = false;
        commands.fan_on = true;
        commands.vents_on = true;
    }
}

fn soil_moisture_rule(reading: &Reading, setpoints: &Setpoints, commands: &mut CommandSet) {
    let Some(v) = reading.soil_moisture_pct else {
        return;
    };
    if v < setpoints.soil_moisture_pct - SOIL_MOISTURE_MARGIN {
        commands.irrigation_pump_on = true;
    } else if v > setpoints.soil_moisture_pct + SOIL_MOISTURE_MARGIN {
        commands.irrigation_pump_on = false;
    }
}

fn light_rule(reading: &Reading, setpoints: &Setpoints, commands: &mut CommandSet) {
    let Some(v) = reading.light_lux else {
        return;
    };
    if v < setpoints.light_lux - LIGHT_MARGIN {
        commands.lights_on = true;
    } else if v > setpoints.light_lux + LIGHT_MARGIN {
        commands.lights_on = false;
    }
}

// High CO2 ventilates like high temperature but biases lights off (less
// photosynthesis draw); low CO2 closes up and biases lights on. This can
// disagree with the humidity rule on vents — CO2 runs later and wins.
fn co2_rule(reading: &Reading, setpoints: &Setpoints, commands: &mut CommandSet) {
    let Some(v) = reading.co_two else {
        return;
    };
    if v > setpoints.co_two + CO2_MARGIN {
        commands.vents_on = true;
        commands.fan_on = true;
        commands.lights_on = false;
    } else if v < setpoints.co_two - CO2_MARGIN {
        commands.vents_on = false;
        commands.fan_on = false;
        commands.lights_on = true;
    }
}

fn wind_speed_rule(reading: &Reading, setpoints: &Setpoints, commands: &mut CommandSet) {
    let Some(v) = reading.wind_speed else {
        return;
    };
    if v > setpoints.wind_speed + WIND_SPEED_MARGIN {
        commands.fan_on = true;
    } else if v < setpoints.wind_speed - WIND_SPEED_MARGIN {
        commands.fan_on = false;
    }
}
