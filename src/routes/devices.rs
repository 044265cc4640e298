//! In-memory device registry.
//!
//! Reads go through the response cache; every write invalidates `devices:*`.
//! Writes that bypass these handlers leave cached reads stale until TTL.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiError, ApiResult, ErrorDetail};
use crate::http::server::AppState;

const LIST_KEY: &str = "devices:list";
const INVALIDATE_ALL: &str = "devices:*";
const MAX_NAME_LEN: usize = 100;
const MAX_SERIAL_LEN: usize = 64;

fn item_key(id: u64) -> String {
    format!("devices:item:{}", id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub serial: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevicePayload {
    pub name: String,
    pub serial: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl DevicePayload {
    fn validate(&self) -> ApiResult<()> {
        let mut details = Vec::new();

        let name = self.name.trim();
        if name.is_empty() {
            details.push(ErrorDetail::field("name", "must not be empty").with_code("required"));
        } else if name.len() > MAX_NAME_LEN {
            details.push(
                ErrorDetail::field("name", format!("must be at most {} characters", MAX_NAME_LEN))
                    .with_code("too_long"),
            );
        }

        if self.serial.is_empty() {
            details.push(ErrorDetail::field("serial", "must not be empty").with_code("required"));
        } else if self.serial.len() > MAX_SERIAL_LEN
            || !self
                .serial
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            details.push(
                ErrorDetail::field("serial", "must be up to 64 letters, digits or dashes")
                    .with_code("invalid_format"),
            );
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation("Invalid device payload", details))
        }
    }
}

/// Devices keyed by id, with a serial index enforcing uniqueness.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: DashMap<u64, Device>,
    serials: DashMap<String, u64>,
    next_id: AtomicU64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Self::default()
        }
    }

    pub fn list(&self) -> Vec<Device> {
        let mut all: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        all.sort_by_key(|d| d.id);
        all
    }

    pub fn get(&self, id: u64) -> Option<Device> {
        self.devices.get(&id).map(|d| d.value().clone())
    }

    pub fn insert(&self, payload: DevicePayload) -> ApiResult<Device> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.serials.entry(payload.serial.clone()) {
            Entry::Occupied(_) => Err(serial_taken(&payload.serial)),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let device = Device {
                    id,
                    name: payload.name.trim().to_string(),
                    serial: payload.serial,
                    location: payload.location,
                    created_at: now,
                    updated_at: now,
                };
                slot.insert(id);
                self.devices.insert(id, device.clone());
                Ok(device)
            }
        }
    }

    pub fn update(&self, id: u64, payload: DevicePayload) -> ApiResult<Device> {
        let current = self.get(id).ok_or_else(|| device_not_found(id))?;

        if current.serial != payload.serial {
            match self.serials.entry(payload.serial.clone()) {
                Entry::Occupied(_) => return Err(serial_taken(&payload.serial)),
                Entry::Vacant(slot) => {
                    slot.insert(id);
                }
            }
            self.serials.remove(&current.serial);
        }

        let mut stored = self.devices.get_mut(&id).ok_or_else(|| device_not_found(id))?;
        stored.name = payload.name.trim().to_string();
        stored.serial = payload.serial;
        stored.location = payload.location;
        stored.updated_at = Utc::now();
        Ok(stored.value().clone())
    }

    pub fn remove(&self, id: u64) -> Option<Device> {
        let (_, device) = self.devices.remove(&id)?;
        self.serials.remove(&device.serial);
        Some(device)
    }
}

fn device_not_found(id: u64) -> ApiError {
    ApiError::not_found(format!("Device {}", id))
}

fn serial_taken(serial: &str) -> ApiError {
    ApiError::conflict(format!("Serial {} is already registered", serial))
        .with_detail(ErrorDetail::field("serial", "already registered").with_code("duplicate"))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices).post(create_device))
        .route(
            "/api/devices/{id}",
            get(get_device).put(update_device).delete(delete_device),
        )
        .with_state(state)
}

async fn list_devices(State(state): State<AppState>) -> ApiResult<Json<Vec<Device>>> {
    let registry = state.devices.clone();
    state
        .cache
        .get_or_insert_with(LIST_KEY, None, || async move { Ok(registry.list()) })
        .await
        .map(Json)
}

async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Device>> {
    let registry = state.devices.clone();
    state
        .cache
        .get_or_insert_with(&item_key(id), None, || async move {
            registry.get(id).ok_or_else(|| device_not_found(id))
        })
        .await
        .map(Json)
}

async fn create_device(
    State(state): State<AppState>,
    Json(payload): Json<DevicePayload>,
) -> ApiResult<(StatusCode, Json<Device>)> {
    payload.validate()?;
    let device = state.devices.insert(payload)?;
    state.cache.invalidate(INVALIDATE_ALL);
    tracing::info!(device_id = device.id, serial = %device.serial, "Device registered");
    Ok((StatusCode::CREATED, Json(device)))
}

async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(payload): Json<DevicePayload>,
) -> ApiResult<Json<Device>> {
    payload.validate()?;
    let device = state.devices.update(id, payload)?;
    state.cache.invalidate(INVALIDATE_ALL);
    Ok(Json(device))
}

async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state.devices.remove(id).ok_or_else(|| device_not_found(id))?;
    state.cache.invalidate(INVALIDATE_ALL);
    Ok(StatusCode::NO_CONTENT)
}
