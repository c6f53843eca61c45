use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::warn;
use utoipa::OpenApi;

use super::{
    dto::{NewGreenhouse, NewReading, UpdateGreenhouse},
    errors::ApiError,
    AppState,
};
use crate::control::{self, CommandSet};
use crate::db::models::{ActuatorStatus, Greenhouse, Reading};
use crate::reconciler::StatusStore;

const GREENHOUSE_COLUMNS: &str = "id, name, location, target_temp, target_humidity, \
     target_soil_moisture_pct, target_light, target_co_two, target_wind_speed";

const READING_COLUMNS: &str = "id, greenhouse_id, recorded_at, temp_celsius, humidity_pct, \
     soil_moisture_pct, light_lux, co_two, wind_speed";

// ---------------------------------------------------------------------------
// Greenhouses
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/greenhouse",
    request_body = NewGreenhouse,
    responses(
        (status = 201, description = "Greenhouse created", body = Greenhouse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "greenhouse"
)]
pub async fn create_greenhouse(
    State(state): State<AppState>,
    Json(body): Json<NewGreenhouse>,
) -> Result<(StatusCode, Json<Greenhouse>), ApiError> {
    let greenhouse = sqlx::query_as::<_, Greenhouse>(&format!(
        "INSERT INTO greenhouse (name, location, target_temp, target_humidity, \
             target_soil_moisture_pct, target_light, target_co_two, target_wind_speed) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {GREENHOUSE_COLUMNS}"
    ))
    .bind(&body.name)
    .bind(&body.location)
    .bind(body.target_temp.unwrap_or(25.0))
    .bind(body.target_humidity.unwrap_or(60.0))
    .bind(body.target_soil_moisture_pct.unwrap_or(40.0))
    .bind(body.target_light.unwrap_or(500.0))
    .bind(body.target_co_two.unwrap_or(400.0))
    .bind(body.target_wind_speed.unwrap_or(1.0))
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(greenhouse)))
}

#[utoipa::path(
    get,
    path = "/api/v1/greenhouse",
    responses(
        (status = 200, description = "All greenhouses", body = Vec<Greenhouse>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "greenhouse"
)]
pub async fn list_greenhouses(
    State(state): State<AppState>,
) -> Result<Json<Vec<Greenhouse>>, ApiError> {
    let rows = sqlx::query_as::<_, Greenhouse>(&format!(
        "SELECT {GREENHOUSE_COLUMNS} FROM greenhouse ORDER BY id"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/greenhouse/{id}",
    params(("id" = i64, Path, description = "Greenhouse ID")),
    responses(
        (status = 200, description = "Greenhouse", body = Greenhouse),
        (status = 404, description = "Greenhouse not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "greenhouse"
)]
pub async fn get_greenhouse(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Greenhouse>, ApiError> {
    let greenhouse = fetch_greenhouse(&state, id).await?;
    Ok(Json(greenhouse))
}

#[utoipa::path(
    put,
    path = "/api/v1/greenhouse/{id}",
    params(("id" = i64, Path, description = "Greenhouse ID")),
    request_body = UpdateGreenhouse,
    responses(
        (status = 200, description = "Updated greenhouse", body = Greenhouse),
        (status = 404, description = "Greenhouse not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "greenhouse"
)]
pub async fn update_greenhouse(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateGreenhouse>,
) -> Result<Json<Greenhouse>, ApiError> {
    let greenhouse = sqlx::query_as::<_, Greenhouse>(&format!(
        "UPDATE greenhouse SET \
             name = COALESCE($2, name), \
             location = COALESCE($3, location), \
             target_temp = COALESCE($4, target_temp), \
             target_humidity = COALESCE($5, target_humidity), \
             target_soil_moisture_pct = COALESCE($6, target_soil_moisture_pct), \
             target_light = COALESCE($7, target_light), \
             target_co_two = COALESCE($8, target_co_two), \
             target_wind_speed = COALESCE($9, target_wind_speed) \
         WHERE id = $1 \
         RETURNING {GREENHOUSE_COLUMNS}"
    ))
    .bind(id)
    .bind(&body.name)
    .bind(&body.location)
    .bind(body.target_temp)
    .bind(body.target_humidity)
    .bind(body.target_soil_moisture_pct)
    .bind(body.target_light)
    .bind(body.target_co_two)
    .bind(body.target_wind_speed)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("greenhouse"))?;

    Ok(Json(greenhouse))
}

#[utoipa::path(
    delete,
    path = "/api/v1/greenhouse/{id}",
    params(("id" = i64, Path, description = "Greenhouse ID")),
    responses(
        (status = 204, description = "Greenhouse deleted"),
        (status = 404, description = "Greenhouse not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "greenhouse"
)]
pub async fn delete_greenhouse(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let result = sqlx::query("DELETE FROM greenhouse WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("greenhouse"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Readings (ingestion boundary)
// ---------------------------------------------------------------------------

/// Ingest one sensor sample. The reading is persisted first; the decision
/// engine then runs against the greenhouse's setpoints and the resulting
/// command set is published retained on the greenhouse's topic. Publication
/// is best-effort: a bus failure is logged and the stored reading is still
/// acknowledged with 201.
#[utoipa::path(
    post,
    path = "/api/v1/readings/{greenhouse_id}",
    params(("greenhouse_id" = i64, Path, description = "Greenhouse ID")),
    request_body = NewReading,
    responses(
        (status = 201, description = "Reading stored and decision published", body = Reading),
        (status = 404, description = "Greenhouse not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn add_reading(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
    Json(body): Json<NewReading>,
) -> Result<(StatusCode, Json<Reading>), ApiError> {
    // The engine must not run for an unknown greenhouse.
    let greenhouse = fetch_greenhouse(&state, greenhouse_id).await?;

    let reading = sqlx::query_as::<_, Reading>(&format!(
        "INSERT INTO readings (greenhouse_id, temp_celsius, humidity_pct, \
             soil_moisture_pct, light_lux, co_two, wind_speed) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING {READING_COLUMNS}"
    ))
    .bind(greenhouse_id)
    .bind(body.temp_celsius)
    .bind(body.humidity_pct)
    .bind(body.soil_moisture_pct)
    .bind(body.light_lux)
    .bind(body.co_two)
    .bind(body.wind_speed)
    .fetch_one(&state.pool)
    .await?;

    let commands = control::decide(&reading, &greenhouse.setpoints());
    if let Err(e) = state.bus.publish_decision(greenhouse_id, &commands).await {
        // Best-effort side channel: the reading write stands regardless.
        warn!(greenhouse_id, error = %e, "Failed to publish decision — dropping");
    }

    Ok((StatusCode::CREATED, Json(reading)))
}

#[utoipa::path(
    get,
    path = "/api/v1/readings/{greenhouse_id}/all",
    params(("greenhouse_id" = i64, Path, description = "Greenhouse ID")),
    responses(
        (status = 200, description = "All readings, most recent first", body = Vec<Reading>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn get_all_readings(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
) -> Result<Json<Vec<Reading>>, ApiError> {
    let rows = sqlx::query_as::<_, Reading>(&format!(
        "SELECT {READING_COLUMNS} FROM readings \
         WHERE greenhouse_id = $1 ORDER BY recorded_at DESC"
    ))
    .bind(greenhouse_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/readings/{greenhouse_id}/latest",
    params(("greenhouse_id" = i64, Path, description = "Greenhouse ID")),
    responses(
        (status = 200, description = "Most recent reading", body = Reading),
        (status = 404, description = "No readings for this greenhouse"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "readings"
)]
pub async fn get_latest_reading(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
) -> Result<Json<Reading>, ApiError> {
    let reading = sqlx::query_as::<_, Reading>(&format!(
        "SELECT {READING_COLUMNS} FROM readings \
         WHERE greenhouse_id = $1 ORDER BY recorded_at DESC LIMIT 1"
    ))
    .bind(greenhouse_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("reading"))?;

    Ok(Json(reading))
}

// ---------------------------------------------------------------------------
// Actuator status
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/actuator_status/{greenhouse_id}",
    params(("greenhouse_id" = i64, Path, description = "Greenhouse ID")),
    request_body = CommandSet,
    responses(
        (status = 201, description = "Status appended", body = ActuatorStatus),
        (status = 404, description = "Greenhouse not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "actuator_status"
)]
pub async fn add_actuator_status(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
    Json(body): Json<CommandSet>,
) -> Result<(StatusCode, Json<ActuatorStatus>), ApiError> {
    fetch_greenhouse(&state, greenhouse_id).await?;
    let status = state.status_store.append(greenhouse_id, body).await?;
    Ok((StatusCode::CREATED, Json(status)))
}

#[utoipa::path(
    get,
    path = "/api/v1/actuator_status/{greenhouse_id}/all",
    params(("greenhouse_id" = i64, Path, description = "Greenhouse ID")),
    responses(
        (status = 200, description = "Status history, most recent first", body = Vec<ActuatorStatus>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "actuator_status"
)]
pub async fn get_all_actuator_statuses(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
) -> Result<Json<Vec<ActuatorStatus>>, ApiError> {
    let rows = sqlx::query_as::<_, ActuatorStatus>(
        "SELECT id, greenhouse_id, recorded_at, vents_on, fan_on, lights_on, \
                curtains_on, irrigation_pump_on, humidifier_pump_on, heater_on \
         FROM actuator_status \
         WHERE greenhouse_id = $1 ORDER BY recorded_at DESC",
    )
    .bind(greenhouse_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/actuator_status/{greenhouse_id}/latest",
    params(("greenhouse_id" = i64, Path, description = "Greenhouse ID")),
    responses(
        (status = 200, description = "Most recent status", body = ActuatorStatus),
        (status = 404, description = "No status for this greenhouse"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "actuator_status"
)]
pub async fn get_latest_actuator_status(
    State(state): State<AppState>,
    Path(greenhouse_id): Path<i64>,
) -> Result<Json<ActuatorStatus>, ApiError> {
    let status = state
        .status_store
        .latest(greenhouse_id)
        .await?
        .ok_or(ApiError::NotFound("actuator status"))?;
    Ok(Json(status))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is healthy")),
    tag = "system"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn fetch_greenhouse(state: &AppState, id: i64) -> Result<Greenhouse, ApiError> {
    sqlx::query_as::<_, Greenhouse>(&format!(
        "SELECT {GREENHOUSE_COLUMNS} FROM greenhouse WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("greenhouse"))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        create_greenhouse,
        list_greenhouses,
        get_greenhouse,
        update_greenhouse,
        delete_greenhouse,
        add_reading,
        get_all_readings,
        get_latest_reading,
        add_actuator_status,
        get_all_actuator_statuses,
        get_latest_actuator_status,
        health,
    ),
    components(schemas(
        Greenhouse,
        Reading,
        ActuatorStatus,
        CommandSet,
        NewGreenhouse,
        UpdateGreenhouse,
        NewReading,
    )),
    tags(
        (name = "greenhouse", description = "Greenhouse configuration endpoints"),
        (name = "readings", description = "Sensor reading ingestion and history"),
        (name = "actuator_status", description = "Actuator status history"),
        (name = "system", description = "System endpoints"),
    ),
    info(
        title = "Greenhouse Service API",
        version = "0.1.0",
        description = "REST API for greenhouse climate control"
    )
)]
pub struct ApiDoc;
