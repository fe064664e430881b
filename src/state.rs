// state.rs

use crate::*;

use std::net::{self, Ipv4Addr};

use esp_idf_svc::nvs;

pub struct MyState {
    pub config: RwLock<ThingConfig>,
    pub uptime: RwLock<usize>,
    pub api_cnt: AtomicU32,
    pub wifi_status: RwLock<ConnectionStatus>,
    pub if_index: RwLock<u32>,
    pub ip_addr: RwLock<Ipv4Addr>,
    pub ping_ip: RwLock<Option<Ipv4Addr>>,
    pub myid: RwLock<String>,
    pub properties: watch::Receiver<Vec<PropertySnapshot>>,
    pub nvs: RwLock<nvs::EspNvs<nvs::NvsDefault>>,
    pub reset: RwLock<bool>,
}

impl MyState {
    pub fn new(
        config: ThingConfig,
        properties: watch::Receiver<Vec<PropertySnapshot>>,
        nvs: nvs::EspNvs<nvs::NvsDefault>,
    ) -> Self {
        MyState {
            config: RwLock::new(config),
            uptime: RwLock::new(0),
            api_cnt: AtomicU32::new(0),
            wifi_status: RwLock::new(ConnectionStatus::Init),
            if_index: RwLock::new(0),
            ip_addr: RwLock::new(net::Ipv4Addr::new(0, 0, 0, 0)),
            ping_ip: RwLock::new(None),
            myid: RwLock::new("thermiot".into()),
            properties,
            nvs: RwLock::new(nvs),
            reset: RwLock::new(false),
        }
    }

    pub async fn wifi_up(&self) -> bool {
        *self.wifi_status.read().await == ConnectionStatus::Connected
    }

    pub async fn set_wifi_status(&self, status: ConnectionStatus) {
        let mut s = self.wifi_status.write().await;
        if *s != status {
            info!("Wi-Fi status {:?} -> {status:?}", *s);
            *s = status;
        }
    }
}

pub type SharedState = Arc<Pin<Box<MyState>>>;

// EOF
