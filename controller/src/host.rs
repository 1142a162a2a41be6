use std::{
    collections::{BTreeMap, HashMap},
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::broadcast::error::RecvError};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use busylight_common::{
    config::CANONICAL_COLOR_KEYS, indicator_topic, AccessoryConfig, MqttConfig, Rgb,
    TOPIC_CMD_POWER, TOPIC_STATE,
};

use crate::{
    light::HttpLightSink,
    poller::{Clock, PollerPhase, PresencePoller},
    slack::{PresenceSource, SlackClient},
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 64;
const STATE_PUBLISH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    poller: PresencePoller,
    config: Arc<ConfigView>,
}

struct AppStore {
    config_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct IndicatorView {
    id: String,
    name: String,
    on: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ConfigView {
    name: String,
    #[serde(rename = "tokenSet")]
    token_set: bool,
    #[serde(rename = "intervalMinutes")]
    interval_minutes: u32,
    #[serde(rename = "startTime")]
    start_time: Option<String>,
    #[serde(rename = "endTime")]
    end_time: Option<String>,
    weekend: bool,
    debug: bool,
    #[serde(rename = "setColorApi")]
    set_color_api: Option<String>,
    #[serde(rename = "offApi")]
    off_api: Option<String>,
    #[serde(rename = "statusColors")]
    status_colors: BTreeMap<String, Rgb>,
    timezone: String,
    #[serde(rename = "mqttEnabled")]
    mqtt_enabled: bool,
}

pub async fn run() -> anyhow::Result<()> {
    let store = AppStore::new();
    let loaded = store.load_config().await;
    let debug = loaded.as_ref().map(|config| config.debug).unwrap_or(false);

    let default_filter = if debug {
        "info,busylight_controller=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = loaded.unwrap_or_else(|err| {
        warn!("failed to load accessory config from store: {err:#}");
        AccessoryConfig::default()
    });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    let (poll_config, warnings) = config.poll_config_builder().build_reporting();
    for warning in &warnings {
        warn!("config: {warning}");
    }

    let source: Option<Arc<dyn PresenceSource>> = match &config.oauth_token {
        Some(token) => {
            let client =
                SlackClient::new(token.clone()).context("failed to build presence api client")?;
            Some(Arc::new(client) as Arc<dyn PresenceSource>)
        }
        None => {
            warn!("no oAuthToken configured; presence polling is disabled");
            None
        }
    };
    let sink = Arc::new(
        HttpLightSink::new(config.set_color_api.clone(), config.off_api.clone())
            .context("failed to build busy light client")?,
    );

    let poller = PresencePoller::new(
        config.name.clone(),
        poll_config,
        source,
        sink,
        timezone_clock(&config.timezone),
    );

    let app_state = AppState {
        config: Arc::new(build_config_view(&config, &poller)),
        poller: poller.clone(),
    };

    if config.mqtt.host.is_empty() {
        info!("mqtt disabled, no broker host configured");
    } else {
        let (mqtt, eventloop) = AsyncClient::new(mqtt_options(&config.mqtt), 64);
        mqtt.subscribe(TOPIC_CMD_POWER, QoS::AtMostOnce)
            .await
            .context("failed to subscribe to power command topic")?;
        spawn_mqtt_loop(poller.clone(), eventloop);
        spawn_indicator_publisher(poller.clone(), mqtt.clone());
        spawn_state_publish_loop(poller.clone(), mqtt);
    }

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/indicators", get(handle_get_indicators))
        .route("/api/power", post(handle_set_power))
        .route("/api/config", get(handle_get_config))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!(
        accessory = %config.name,
        "busy light controller listening on http://{addr}"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    poller.set_master(false).await;
    info!("busy light controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
}

fn apply_env_overrides(config: &mut AccessoryConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("BUSYLIGHT_TOKEN") {
        config.oauth_token = Some(token);
    }
    if let Some(port) = lookup("BUSYLIGHT_HTTP_PORT").and_then(|value| value.parse().ok()) {
        config.http_port = port;
    }
    if let Some(host) = lookup("MQTT_HOST") {
        config.mqtt.host = host;
    }
    if let Some(port) = lookup("MQTT_PORT").and_then(|value| value.parse().ok()) {
        config.mqtt.port = port;
    }
    if let Some(user) = lookup("MQTT_USER") {
        config.mqtt.user = user;
    }
    if let Some(pass) = lookup("MQTT_PASS") {
        config.mqtt.pass = pass;
    }
}

fn mqtt_options(mqtt: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new("busylight-controller", mqtt.host.clone(), mqtt.port);
    options.set_keep_alive(Duration::from_secs(30));
    if !mqtt.user.is_empty() {
        options.set_credentials(mqtt.user.clone(), mqtt.pass.clone());
    }
    options
}

fn spawn_mqtt_loop(poller: PresencePoller, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.topic != TOPIC_CMD_POWER {
                        continue;
                    }
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }

                    let payload = String::from_utf8_lossy(&message.payload);
                    match parse_power(&payload) {
                        Some(on) => {
                            poller.set_master(on).await;
                        }
                        None => warn!("ignoring power command {payload:?}"),
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_indicator_publisher(poller: PresencePoller, mqtt: AsyncClient) {
    let mut changes = poller.subscribe();
    tokio::spawn(async move {
        loop {
            let change = match changes.recv().await {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("indicator publisher lagged, {skipped} change(s) skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let payload = if change.on { "ON" } else { "OFF" };
            if let Err(err) = mqtt
                .publish(indicator_topic(&change.id.key()), QoS::AtLeastOnce, true, payload)
                .await
            {
                warn!("indicator publish failed: {err}");
            }
        }
    });
}

fn spawn_state_publish_loop(poller: PresencePoller, mqtt: AsyncClient) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATE_PUBLISH_INTERVAL);
        loop {
            interval.tick().await;

            match serde_json::to_vec(&poller.status().await) {
                Ok(body) => {
                    if let Err(err) = mqtt.publish(TOPIC_STATE, QoS::AtLeastOnce, true, body).await {
                        warn!("presence state publish failed: {err}");
                    }
                }
                Err(err) => warn!("presence state serialization failed: {err}"),
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.poller.status().await)
}

async fn handle_get_indicators(State(state): State<AppState>) -> impl IntoResponse {
    let name = state.poller.name().to_string();
    let indicators: Vec<IndicatorView> = state
        .poller
        .indicators()
        .await
        .into_iter()
        .map(|(id, on)| IndicatorView {
            id: id.key().to_string(),
            name: id.display_name(&name),
            on,
        })
        .collect();

    Json(indicators)
}

async fn handle_set_power(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Some(on) = parse_power(value) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid power value. Use 'on' or 'off'");
    };

    if state.poller.set_master(on).await == PollerPhase::Stopped && on {
        warn!("power on requested but polling could not start");
    }

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.config.as_ref().clone())
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("BUSYLIGHT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.busylight"));

        Self {
            config_path: data_dir.join("accessory.json"),
        }
    }

    async fn load_config(&self) -> anyhow::Result<AccessoryConfig> {
        match tokio::fs::read(&self.config_path).await {
            Ok(raw) => serde_json::from_slice::<AccessoryConfig>(&raw)
                .with_context(|| format!("malformed {}", self.config_path.display())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(AccessoryConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

fn build_config_view(config: &AccessoryConfig, poller: &PresencePoller) -> ConfigView {
    let effective = poller.config();
    let mut status_colors: BTreeMap<String, Rgb> = CANONICAL_COLOR_KEYS
        .into_iter()
        .filter_map(|key| effective.colors.get(key).map(|rgb| (key.to_string(), rgb)))
        .collect();
    for key in effective.colors.custom_keys() {
        if let Some(rgb) = effective.colors.get(key) {
            status_colors.insert(key.to_string(), rgb);
        }
    }

    ConfigView {
        name: config.name.clone(),
        token_set: config.has_credentials(),
        interval_minutes: effective.interval_minutes,
        start_time: effective.window.start.map(|time| time.to_string()),
        end_time: effective.window.end.map(|time| time.to_string()),
        weekend: effective.weekend_enabled,
        debug: effective.debug,
        set_color_api: config.set_color_api.clone(),
        off_api: config.off_api.clone(),
        status_colors,
        timezone: config.timezone.clone(),
        mqtt_enabled: !config.mqtt.host.is_empty(),
    }
}

fn parse_power(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn timezone_clock(timezone: &str) -> Clock {
    let tz: Tz = timezone.parse().unwrap_or_else(|_| {
        warn!("unknown timezone {timezone:?}, using UTC");
        Tz::UTC
    });
    Arc::new(move || now_in_timezone(tz))
}

fn now_in_timezone(tz: Tz) -> DateTime<FixedOffset> {
    let local = Utc::now().with_timezone(&tz);
    local.with_timezone(&local.offset().fix())
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
