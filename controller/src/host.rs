use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use greenhouse_common::{
    history::{HISTORY_CAPACITY, HISTORY_INTERVAL_MS},
    Actuator, ConfigUpdate, GreenhouseConfig, GreenhouseController, HistoryBuffer,
    HistorySample, HistorySnapshot, LocalTime, RelayChange, RuntimeConfig, SensorState,
    ToggleError, GROW_PROFILES,
};

const SENSOR_PERIOD: Duration = Duration::from_secs(2);
const CONTROL_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<GreenhouseController>>,
    history: Arc<Mutex<HistoryBuffer>>,
    time_synced: Arc<AtomicBool>,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    history_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    ok: bool,
    changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ModeResponse {
    ok: bool,
    changed: bool,
}

#[derive(Debug, Serialize)]
struct ChamberApplyResponse {
    ok: bool,
    applied_profile: &'static str,
    chamber_idx: usize,
    chamber_id: usize,
    chamber_name: String,
    label: String,
}

#[derive(Debug, Serialize)]
struct ApplyAllResponse {
    ok: bool,
    applied_profile: &'static str,
}

#[derive(Debug, Serialize)]
struct ProfileView {
    id: usize,
    #[serde(flatten)]
    profile: &'static greenhouse_common::GrowProfile,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    #[serde(rename = "intervalMs")]
    interval_ms: u64,
    samples: Vec<HistorySample>,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    #[serde(rename = "timeSynced")]
    time_synced: bool,
    timezone: &'static str,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = match store.load_runtime_config().await {
        Ok((runtime, repaired)) => {
            if repaired {
                info!("runtime config repaired on load; writing it back");
                if let Err(err) = store.save_runtime_config(&runtime).await {
                    warn!("failed to write repaired runtime config: {err:#}");
                }
            }
            runtime
        }
        Err(err) => {
            warn!("failed to load runtime config from store: {err:#}");
            RuntimeConfig::default()
        }
    };

    let history = store.load_history().await.unwrap_or_else(|err| {
        warn!("failed to load history from store: {err:#}");
        HistoryBuffer::default()
    });
    info!("loaded {} history samples", history.len());

    let app_state = AppState {
        controller: Arc::new(Mutex::new(GreenhouseController::new(runtime.greenhouse))),
        history: Arc::new(Mutex::new(history)),
        time_synced: Arc::new(AtomicBool::new(false)),
        store,
    };

    spawn_sensor_loop(app_state.clone());
    spawn_control_loop(app_state.clone());
    spawn_history_loop(app_state.clone());

    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/toggle", post(handle_toggle))
        .route("/api/mode", post(handle_set_mode))
        .route("/api/grow/apply", post(handle_apply_to_chamber))
        .route("/api/grow/apply-all", post(handle_apply_all))
        .route("/api/profiles", get(handle_get_profiles))
        .route("/api/config", get(handle_get_config).put(handle_put_config))
        .route("/api/history", get(handle_get_history))
        .route("/api/time", get(handle_get_time))
        .fallback_service(ServeDir::new(web_root))
        .with_state(app_state);

    let port = std::env::var("GREENHOUSE_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind greenhouse server at {addr}"))?;

    info!("greenhouse controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Stand-in for the sensor board: slow temperature and humidity swings, soil that dries
/// out over time and recovers while the pump runs.
struct SimulatedSensors {
    started: Instant,
    soil: [f32; 2],
}

impl SimulatedSensors {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            soil: [48.0, 52.0],
        }
    }

    fn read(&mut self, pump_on: bool) -> SensorState {
        let t = self.started.elapsed().as_secs_f32();
        let temperature = 25.0 + 4.0 * (t / 600.0).sin();
        let humidity = 68.0 + 14.0 * (t / 900.0 + 1.0).sin();

        let dry_rates = [0.12, 0.08];
        for (soil, dry_rate) in self.soil.iter_mut().zip(dry_rates) {
            let delta = if pump_on { 2.5 } else { -dry_rate };
            *soil = (*soil + delta).clamp(0.0, 100.0);
        }

        SensorState::from_raw(
            temperature,
            humidity,
            self.soil[0].round() as i32,
            self.soil[1].round() as i32,
        )
    }
}

fn spawn_sensor_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut sensors = SimulatedSensors::new();
        let mut interval = tokio::time::interval(SENSOR_PERIOD);

        loop {
            interval.tick().await;
            let mut controller = app_state.controller.lock().await;
            let reading = sensors.read(controller.relays().pump);
            controller.update_sensors(reading);
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CONTROL_PERIOD);

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let changes = {
                let mut controller = app_state.controller.lock().await;
                let local_now = now_in_timezone(controller.config().timezone().iana);
                app_state
                    .time_synced
                    .store(local_now.is_some(), Ordering::Relaxed);
                let local_time = local_now.map(|now| LocalTime::from_chrono(&now));
                controller.tick(now_ms, local_time)
            };

            drive_relays(&changes);
        }
    });
}

fn spawn_history_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(HISTORY_INTERVAL_MS));
        // The first tick fires immediately; start sampling one interval after boot.
        interval.tick().await;

        loop {
            interval.tick().await;

            let epoch = app_state
                .time_synced
                .load(Ordering::Relaxed)
                .then(|| Utc::now().timestamp());
            let sample = app_state.controller.lock().await.history_sample(epoch);

            let snapshot = {
                let mut history = app_state.history.lock().await;
                history.push(sample);
                history.snapshot()
            };

            if let Err(err) = app_state.store.save_history(&snapshot).await {
                warn!("failed to persist history: {err:#}");
            }
        }
    });
}

/// Host relay sink: there is no hardware here, so transitions are only logged.
fn drive_relays(changes: &[RelayChange]) {
    for change in changes {
        info!(
            "relay output: {} -> {}",
            change.actuator,
            if change.on { "on" } else { "off" }
        );
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    let now_ms = monotonic_ms();
    let time_synced = state.time_synced.load(Ordering::Relaxed);
    let status = state.controller.lock().await.status(now_ms, time_synced);
    Json(status)
}

async fn handle_toggle(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let actuator = match parse_actuator(&params) {
        Ok(actuator) => actuator,
        Err(response) => return response,
    };

    let result = state.controller.lock().await.toggle(actuator);
    let response = match result {
        Ok(on) => {
            drive_relays(&[RelayChange { actuator, on }]);
            ToggleResponse {
                ok: true,
                changed: true,
                state: Some(on),
                reason: None,
            }
        }
        Err(ToggleError::Automatic(_)) => ToggleResponse {
            ok: true,
            changed: false,
            state: None,
            reason: Some("AUTO"),
        },
    };
    Json(response).into_response()
}

async fn handle_set_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let actuator = match parse_actuator(&params) {
        Ok(actuator) => actuator,
        Err(response) => return response,
    };
    let Some(auto) = params.get("auto") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'auto' parameter");
    };
    let automatic = auto == "1";

    let changed = state
        .controller
        .lock()
        .await
        .set_automatic(actuator, automatic);
    if changed {
        info!(
            "{actuator} switched to {} control",
            if automatic { "automatic" } else { "manual" }
        );
        if let Err(err) = persist_config_from_state(&state).await {
            warn!("failed to persist mode update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist configuration",
            );
        }
    }

    Json(ModeResponse { ok: true, changed }).into_response()
}

async fn handle_apply_to_chamber(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(profile_id) = params.get("profile") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'profile' parameter");
    };
    let Ok(profile_id) = profile_id.trim().parse::<i32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid profile id");
    };
    let Some(chamber_idx) = resolve_chamber(&params) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid chamber");
    };

    let applied = {
        let mut controller = state.controller.lock().await;
        controller
            .apply_grow_profile_to_chamber(chamber_idx, profile_id)
            .map(|label| {
                let name = controller
                    .config()
                    .chamber(chamber_idx)
                    .map(|chamber| chamber.name.clone())
                    .unwrap_or_default();
                (label, name)
            })
    };
    let (label, chamber_name) = match applied {
        Ok(applied) => applied,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    info!("applied grow profile {label} to {chamber_name}");
    if let Err(err) = persist_config_from_state(&state).await {
        warn!("failed to persist grow profile: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist configuration",
        );
    }

    Json(ChamberApplyResponse {
        ok: true,
        applied_profile: label,
        chamber_idx,
        chamber_id: chamber_idx + 1,
        label: format!("{label} -> {chamber_name}"),
        chamber_name,
    })
    .into_response()
}

async fn handle_apply_all(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(profile_id) = params.get("profile") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'profile' parameter");
    };
    let Ok(profile_id) = profile_id.trim().parse::<i32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid profile id");
    };

    let result = state.controller.lock().await.apply_grow_profile(profile_id);
    let label = match result {
        Ok(label) => label,
        Err(err) => return error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    };

    info!("applied grow profile {label} to all chambers");
    if let Err(err) = persist_config_from_state(&state).await {
        warn!("failed to persist grow profile: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist configuration",
        );
    }

    Json(ApplyAllResponse {
        ok: true,
        applied_profile: label,
    })
    .into_response()
}

async fn handle_get_profiles() -> impl IntoResponse {
    let profiles: Vec<ProfileView> = GROW_PROFILES
        .iter()
        .enumerate()
        .map(|(id, profile)| ProfileView { id, profile })
        .collect();
    Json(profiles)
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.controller.lock().await.config().clone();
    Json(config)
}

async fn handle_put_config(
    State(state): State<AppState>,
    Json(update): Json<ConfigUpdate>,
) -> impl IntoResponse {
    let changed = state.controller.lock().await.update_config(&update);

    if changed {
        if let Err(err) = persist_config_from_state(&state).await {
            warn!("failed to persist config update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist configuration",
            );
        }
    }

    handle_get_config(State(state)).await.into_response()
}

async fn handle_get_history(State(state): State<AppState>) -> impl IntoResponse {
    let samples = state.history.lock().await.samples().copied().collect();
    Json(HistoryResponse {
        interval_ms: HISTORY_INTERVAL_MS,
        samples,
    })
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let timezone = state.controller.lock().await.config().timezone().label;
    Json(TimeStatus {
        time_synced: state.time_synced.load(Ordering::Relaxed),
        timezone,
        now_epoch: Utc::now().timestamp(),
    })
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("GREENHOUSE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.greenhouse"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            history_path: Arc::new(data_dir.join("history.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the stored configuration. The flag is set when the stored document was
    /// migrated or repaired and should be written back.
    async fn load_runtime_config(&self) -> anyhow::Result<(RuntimeConfig, bool)> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => RuntimeConfig::from_json(&raw).with_context(|| {
                format!("invalid runtime config at {}", self.runtime_path.display())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok((RuntimeConfig::default(), false)),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let payload = serde_json::to_vec_pretty(runtime)?;
        self.write(&self.runtime_path, payload).await
    }

    async fn load_history(&self) -> anyhow::Result<HistoryBuffer> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.history_path.as_ref()).await {
            Ok(raw) => {
                let snapshot = serde_json::from_slice::<HistorySnapshot>(&raw)?;
                Ok(HistoryBuffer::from_snapshot(snapshot, HISTORY_CAPACITY)?)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(HistoryBuffer::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_history(&self, snapshot: &HistorySnapshot) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(snapshot)?;
        self.write(&self.history_path, payload).await
    }

    async fn write(&self, path: &Path, payload: Vec<u8>) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

async fn persist_config_from_state(state: &AppState) -> anyhow::Result<()> {
    let greenhouse: GreenhouseConfig = state.controller.lock().await.config().clone();
    let runtime = RuntimeConfig::new(greenhouse);
    state.store.save_runtime_config(&runtime).await
}

fn parse_actuator(params: &HashMap<String, String>) -> Result<Actuator, axum::response::Response> {
    let Some(id) = params.get("id") else {
        return Err(error_response(StatusCode::BAD_REQUEST, "Missing 'id' parameter"));
    };
    id.parse::<Actuator>()
        .map_err(|err| error_response(StatusCode::BAD_REQUEST, &err.to_string()))
}

/// `chamber` takes an index (0 or 1), with 2 also meaning the second chamber;
/// `chamber_id` takes the 1-based id.
fn resolve_chamber(params: &HashMap<String, String>) -> Option<usize> {
    if let Some(value) = params.get("chamber") {
        return match value.trim().parse::<i32>().ok()? {
            0 => Some(0),
            1 | 2 => Some(1),
            _ => None,
        };
    }
    match params.get("chamber_id")?.trim().parse::<i32>().ok()? {
        1 => Some(0),
        2 => Some(1),
        _ => None,
    }
}

fn now_in_timezone(timezone: &str) -> Option<DateTime<Tz>> {
    let tz: Tz = timezone.parse().ok()?;
    Some(Utc::now().with_timezone(&tz))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn chamber_param_accepts_index_or_id() {
        assert_eq!(resolve_chamber(&params(&[("chamber", "0")])), Some(0));
        assert_eq!(resolve_chamber(&params(&[("chamber", "1")])), Some(1));
        assert_eq!(resolve_chamber(&params(&[("chamber", "2")])), Some(1));
        assert_eq!(resolve_chamber(&params(&[("chamber", "3")])), None);
        assert_eq!(resolve_chamber(&params(&[("chamber_id", "1")])), Some(0));
        assert_eq!(resolve_chamber(&params(&[("chamber_id", "2")])), Some(1));
        assert_eq!(resolve_chamber(&params(&[("chamber_id", "0")])), None);
        assert_eq!(resolve_chamber(&params(&[])), None);
    }

    #[test]
    fn every_configured_timezone_resolves() {
        for option in greenhouse_common::TIMEZONES {
            assert!(now_in_timezone(option.iana).is_some(), "{}", option.iana);
        }
    }

    #[test]
    fn simulated_soil_rises_while_pumping() {
        let mut sensors = SimulatedSensors::new();
        let dry = sensors.read(false);
        let wet = sensors.read(true);

        assert!(dry.temperature_c.is_some());
        assert!(wet.soil1_percent > dry.soil1_percent);
    }
}
