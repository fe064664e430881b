// apiserver.rs

use askama::Template;
use axum::{
    body::Body,
    extract::State,
    http::{header, Response, StatusCode},
    response::{Html, IntoResponse},
    routing::*,
    Json, Router,
};
use axum_macros::debug_handler;

use crate::*;

struct PropertyRow {
    name: String,
    access: String,
    interval_s: u64,
    value: String,
    synced: String,
}

impl From<&PropertySnapshot> for PropertyRow {
    fn from(p: &PropertySnapshot) -> Self {
        PropertyRow {
            name: p.name.clone(),
            access: format!("{:?}", p.access),
            interval_s: p.interval_s,
            value: p.value.map_or_else(|| "-".into(), |v| v.to_string()),
            synced: p
                .synced_ago_s
                .map_or_else(|| "never".into(), |s| format!("{s} s ago")),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html.ask", escape = "html")]
struct IndexTemplate {
    myid: String,
    fw_version: &'static str,
    build_time: &'static str,
    status: String,
    ip: String,
    uptime: String,
    properties: Vec<PropertyRow>,
    config_json: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeviceStatus {
    pub myid: String,
    pub fw_version: &'static str,
    pub wifi: ConnectionStatus,
    pub ip_addr: net::Ipv4Addr,
    pub uptime: Uptime,
}

pub async fn run_api_server(state: SharedState) -> anyhow::Result<()> {
    while !state.wifi_up().await {
        sleep(Duration::from_secs(1)).await;
    }

    let listen = format!("0.0.0.0:{}", state.config.read().await.port);
    let addr = listen.parse::<net::SocketAddr>()?;

    let app = Router::new()
        .route("/", get(get_index))
        .route("/uptime", get(get_uptime))
        .route("/status", get(get_status))
        .route("/properties", get(get_properties))
        .route(
            "/config",
            get(get_config).post(post_config).options(options),
        )
        .route("/reset_config", get(reset_config))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening to {listen}");
    Ok(axum::serve(listener, app.into_make_service()).await?)
}

pub async fn options(State(state): State<SharedState>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} options()");

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "get,post"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "content-type"),
        ],
    )
        .into_response()
}

pub async fn get_index(State(state): State<SharedState>) -> Response<Body> {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_index()");

    let properties: Vec<PropertyRow> = state
        .properties
        .borrow()
        .iter()
        .map(PropertyRow::from)
        .collect();
    let config_json = {
        let config = state.config.read().await;
        serde_json::to_string_pretty(&config.redacted()).unwrap_or_else(|_| "{}".into())
    };
    let index = IndexTemplate {
        myid: state.myid.read().await.clone(),
        fw_version: FW_VERSION,
        build_time: build_timestamp(),
        status: format!("{:?}", *state.wifi_status.read().await),
        ip: state.ip_addr.read().await.to_string(),
        uptime: Uptime::from_secs(*state.uptime.read().await).uptime_s,
        properties,
        config_json,
    };

    match index.render() {
        Err(e) => {
            let err_msg = format!("Index template error: {e:?}\n");
            error!("{err_msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, err_msg).into_response()
        }
        Ok(s) => (StatusCode::OK, Html(s)).into_response(),
    }
}

pub async fn get_uptime(State(state): State<SharedState>) -> (StatusCode, Json<Uptime>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_uptime()");

    (
        StatusCode::OK,
        Json(Uptime::from_secs(*state.uptime.read().await)),
    )
}

pub async fn get_status(State(state): State<SharedState>) -> (StatusCode, Json<DeviceStatus>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_status()");

    let status = DeviceStatus {
        myid: state.myid.read().await.clone(),
        fw_version: FW_VERSION,
        wifi: *state.wifi_status.read().await,
        ip_addr: *state.ip_addr.read().await,
        uptime: Uptime::from_secs(*state.uptime.read().await),
    };
    (StatusCode::OK, Json(status))
}

pub async fn get_properties(
    State(state): State<SharedState>,
) -> (StatusCode, Json<Vec<PropertySnapshot>>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_properties()");

    let props = state.properties.borrow().clone();
    (StatusCode::OK, Json(props))
}

pub async fn get_config(State(state): State<SharedState>) -> (StatusCode, Json<ThingConfig>) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} get_conf()");
    (StatusCode::OK, Json(state.config.read().await.redacted()))
}

#[debug_handler]
pub async fn post_config(
    State(state): State<SharedState>,
    Json(mut config): Json<ThingConfig>,
) -> (StatusCode, String) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} set_conf()");

    config.keep_secret(&*state.config.read().await);
    config.normalize();
    if let Err(e) = config.validate() {
        let msg = format!("{e}");
        error!("{msg}");
        return (StatusCode::BAD_REQUEST, msg);
    }

    info!("Saving new config to nvs...");
    Box::pin(save_conf(state, config)).await
}

pub async fn reset_config(State(state): State<SharedState>) -> (StatusCode, String) {
    let cnt = state.api_cnt.fetch_add(1, Ordering::Relaxed);
    info!("#{cnt} reset_conf()");

    info!("Saving default config to nvs...");
    Box::pin(save_conf(state, ThingConfig::default())).await
}

async fn save_conf(state: SharedState, config: ThingConfig) -> (StatusCode, String) {
    let mut nvs = state.nvs.write().await;
    match config.to_nvs(&mut nvs) {
        Ok(_) => {
            info!("Config saved to nvs. Resetting soon...");
            *state.reset.write().await = true;
            (StatusCode::OK, "OK".to_string())
        }
        Err(e) => {
            let msg = format!("Nvs write error: {e:?}");
            error!("{msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}

// EOF
