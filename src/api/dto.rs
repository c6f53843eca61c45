use serde::Deserialize;
use utoipa::ToSchema;

/// Request body for `POST /api/v1/greenhouse`. Omitted targets fall back to
/// the stock setpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewGreenhouse {
    pub name: String,
    pub location: String,
    pub target_temp: Option<f64>,
    pub target_humidity: Option<f64>,
    pub target_soil_moisture_pct: Option<f64>,
    pub target_light: Option<f64>,
    pub target_co_two: Option<f64>,
    pub target_wind_speed: Option<f64>,
}

/// Request body for `PUT /api/v1/greenhouse/{id}`. Every field is optional;
/// absent fields keep their current value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateGreenhouse {
    pub name: Option<String>,
    pub location: Option<String>,
    pub target_temp: Option<f64>,
    pub target_humidity: Option<f64>,
    pub target_soil_moisture_pct: Option<f64>,
    pub target_light: Option<f64>,
    pub target_co_two: Option<f64>,
    pub target_wind_speed: Option<f64>,
}

/// Request body for `POST /api/v1/readings/{greenhouse_id}`. A sample may
/// carry any subset of the six measurements.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewReading {
    pub temp_celsius: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub soil_moisture_pct: Option<f64>,
    pub light_lux: Option<f64>,
    pub co_two: Option<f64>,
    pub wind_speed: Option<f64>,
}
