// wifi.rs

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_svc::{
    eventloop::{EspEventLoop, System},
    ipv4,
    netif::{self, EspNetif},
    sntp::EspSntp,
    timer::{EspTimerService, Task},
    wifi::{AsyncWifi, EspWifi, WifiDriver},
};

use crate::*;

/// Keeps the single station connection up, built from a network name and password.
pub struct WifiConnectionHandler<'a> {
    pub state: SharedState,
    credentials: WifiCredentials,
    wifi: Option<AsyncWifi<EspWifi<'a>>>,
    _sntp: Option<EspSntp<'static>>,
}

impl<'a> WifiConnectionHandler<'a> {
    pub fn new(state: SharedState, credentials: WifiCredentials) -> Self {
        Self {
            state,
            credentials,
            wifi: None,
            _sntp: None,
        }
    }

    pub async fn run(
        mut self,
        wifidriver: WifiDriver<'a>,
        sysloop: EspEventLoop<System>,
        timer: EspTimerService<Task>,
    ) -> anyhow::Result<()> {
        info!("Initializing Wi-Fi...");

        let ipv4_config = {
            let config = self.state.config.read().await;
            if config.v4dhcp {
                ipv4::ClientConfiguration::DHCP(ipv4::DHCPClientSettings::default())
            } else {
                ipv4::ClientConfiguration::Fixed(ipv4::ClientSettings {
                    ip: config.v4addr,
                    subnet: ipv4::Subnet {
                        gateway: config.v4gw,
                        mask: ipv4::Mask(config.v4mask),
                    },
                    dns: (!config.dns1.is_unspecified()).then_some(config.dns1),
                    secondary_dns: (!config.dns2.is_unspecified()).then_some(config.dns2),
                })
            }
        };

        let net_if = EspNetif::new_with_conf(&netif::NetifConfiguration {
            ip_configuration: Some(ipv4::Configuration::Client(ipv4_config)),
            ..netif::NetifConfiguration::wifi_default_client()
        })?;

        let mac = net_if.get_mac()?;
        *self.state.myid.write().await = format!(
            "thermiot-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5],
        );

        let espwifi = EspWifi::wrap_all(wifidriver, net_if, EspNetif::new(netif::NetifStack::Ap)?)?;
        self.wifi = Some(AsyncWifi::wrap(espwifi, sysloop, timer)?);

        Box::pin(self.configure()).await?;

        self.state.set_wifi_status(ConnectionStatus::Connecting).await;
        if let Err(e) = Box::pin(self.initial_connect()).await {
            error!("WiFi connection failed: {e:?}");
            self.state.set_wifi_status(ConnectionStatus::Error).await;
            error!("Resetting...");
            sleep(Duration::from_secs(5)).await;
            esp_idf_hal::reset::restart();
        }

        let (if_index, ip_info) = {
            let netif = self.wifi()?.wifi().sta_netif();
            (netif.get_index(), netif.get_ip_info()?)
        };
        info!("WiFi got address {ip}", ip = ip_info.ip);
        *self.state.if_index.write().await = if_index;
        *self.state.ip_addr.write().await = ip_info.ip;
        *self.state.ping_ip.write().await = Some(ip_info.subnet.gateway);

        match EspSntp::new_default() {
            Ok(sntp) => self._sntp = Some(sntp),
            Err(e) => error!("SNTP start failed: {e:?}"),
        }
        self.state.set_wifi_status(ConnectionStatus::Connected).await;

        self.stay_connected().await
    }

    fn wifi(&mut self) -> anyhow::Result<&mut AsyncWifi<EspWifi<'a>>> {
        self.wifi.as_mut().ok_or_else(|| anyhow!("WiFi not initialized"))
    }

    pub async fn configure(&mut self) -> anyhow::Result<()> {
        info!("WiFi setting credentials for {:?}", self.credentials);
        let auth_method = if self.credentials.is_open() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let client = ClientConfiguration {
            ssid: self
                .credentials
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("SSID does not fit"))?,
            password: self
                .credentials
                .pass
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Password does not fit"))?,
            auth_method,
            ..Default::default()
        };

        let wifi = self.wifi()?;
        wifi.set_configuration(&Configuration::Client(client))?;

        info!("WiFi driver starting...");
        Box::pin(wifi.start()).await.context("WiFi start")
    }

    pub async fn initial_connect(&mut self) -> anyhow::Result<()> {
        self.do_connect_loop(true).await
    }

    pub async fn stay_connected(mut self) -> anyhow::Result<()> {
        self.do_connect_loop(false).await
    }

    async fn do_connect_loop(&mut self, initial: bool) -> anyhow::Result<()> {
        let state = self.state.clone();
        let wifi = self.wifi()?;
        let timeout = association_timeout(initial);
        loop {
            // Wait for disconnect before trying to connect again.
            if !initial {
                Box::pin(wifi.wifi_wait(|w| w.is_up(), None)).await.ok();
                state.set_wifi_status(ConnectionStatus::Disconnected).await;
            }

            info!("WiFi connecting...");
            state.set_wifi_status(ConnectionStatus::Connecting).await;
            if let Err(e) = Box::pin(wifi.connect()).await {
                error!("WiFi connect error: {e:?}");
                match on_connect_failure(initial) {
                    ConnectFailure::GiveUp => bail!(e),
                    ConnectFailure::RetryAfter(d) => {
                        sleep(d).await;
                        continue;
                    }
                }
            }

            info!("WiFi waiting for association...");
            if let Err(e) = Box::pin(wifi.ip_wait_while(|w| w.is_up().map(|s| !s), timeout)).await {
                error!("WiFi error: {e:?}");
                match on_connect_failure(initial) {
                    ConnectFailure::GiveUp => bail!(e),
                    ConnectFailure::RetryAfter(d) => {
                        sleep(d).await;
                        continue;
                    }
                }
            }

            info!("WiFi connected.");
            if initial {
                return Ok(());
            }
            state.set_wifi_status(ConnectionStatus::Connected).await;
        }
    }
}

// EOF
