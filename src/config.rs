// config.rs

use std::net;

use anyhow::bail;
use crc::{Crc, CRC_32_ISCSI};
use serde::{Deserialize, Serialize};

use crate::{
    secret_pass, secret_ssid, Divider, SteinhartHart, Thermistor, WifiCredentials, ADC_MAX,
    MAX_OVERSAMPLE, MAX_RETRIES,
};

pub const NVS_BUF_SIZE: usize = 512;

const DEFAULT_API_PORT: u16 = 80;
const DEFAULT_SENSOR_RETRIES: u32 = 4;
const DEFAULT_POLL_DELAY: u64 = 10;
const DEFAULT_OVERSAMPLE: u32 = 8;

pub const CONFIG_NAME: &str = "cfg";

/// Stands in for the Wi-Fi password wherever the config leaves the device.
pub const REDACTED_PASS: &str = "********";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThingConfig {
    pub port: u16,
    pub retries: u32,
    pub delay: u64,
    pub oversample: u32,

    pub wifi_ssid: String,
    pub wifi_pass: String,

    pub v4dhcp: bool,
    pub v4addr: net::Ipv4Addr,
    pub v4mask: u8,
    pub v4gw: net::Ipv4Addr,
    pub dns1: net::Ipv4Addr,
    pub dns2: net::Ipv4Addr,

    pub mqtt_enable: bool,
    pub mqtt_url: String,
    pub mqtt_topic: String,

    pub series_ohms: f64,
    pub thermistor_high_side: bool,
    pub coeff_a: f64,
    pub coeff_b: f64,
    pub coeff_c: f64,
}

impl Default for ThingConfig {
    fn default() -> Self {
        let divider = Divider::default();
        let model = SteinhartHart::default();
        Self {
            port: option_env!("API_PORT")
                .unwrap_or("-")
                .parse()
                .unwrap_or(DEFAULT_API_PORT),
            retries: DEFAULT_SENSOR_RETRIES,
            delay: DEFAULT_POLL_DELAY,
            oversample: DEFAULT_OVERSAMPLE,

            wifi_ssid: secret_ssid().into(),
            wifi_pass: secret_pass().into(),

            v4dhcp: true,
            v4addr: net::Ipv4Addr::new(0, 0, 0, 0),
            v4mask: 0,
            v4gw: net::Ipv4Addr::new(0, 0, 0, 0),
            dns1: net::Ipv4Addr::new(0, 0, 0, 0),
            dns2: net::Ipv4Addr::new(0, 0, 0, 0),

            mqtt_enable: false,
            mqtt_url: "mqtt://mqtt.local:1883".into(),
            mqtt_topic: "thermiot".into(),

            series_ohms: divider.series_ohms,
            thermistor_high_side: divider.thermistor_high_side,
            coeff_a: model.a,
            coeff_b: model.b,
            coeff_c: model.c,
        }
    }
}

impl ThingConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.v4mask > 30 {
            bail!("IPv4 mask error: bits must be between 0..30");
        }
        if self.delay == 0 {
            bail!("Sample delay must be at least one second");
        }
        if self.oversample == 0 || self.oversample > MAX_OVERSAMPLE {
            bail!("Oversample count must be between 1..{MAX_OVERSAMPLE}");
        }
        if self.retries > MAX_RETRIES {
            bail!("Sensor retries must be at most {MAX_RETRIES}");
        }
        if !self.series_ohms.is_finite() || self.series_ohms <= 0.0 {
            bail!("Series resistor must be positive");
        }
        if self.mqtt_topic.is_empty() || self.mqtt_topic.contains(['+', '#']) {
            bail!("MQTT topic must be non-empty and without wildcards");
        }
        self.credentials()?;
        Ok(())
    }

    /// Copy safe to log or serve: the Wi-Fi password is masked.
    pub fn redacted(&self) -> Self {
        let mut c = self.clone();
        if !c.wifi_pass.is_empty() {
            c.wifi_pass = REDACTED_PASS.into();
        }
        c
    }

    /// Takes the stored password back when an edited config still carries the mask.
    pub fn keep_secret(&mut self, current: &ThingConfig) {
        if self.wifi_pass == REDACTED_PASS {
            self.wifi_pass = current.wifi_pass.clone();
        }
    }

    /// Clears the static addressing fields when DHCP is in use.
    pub fn normalize(&mut self) {
        if self.v4dhcp {
            self.v4addr = net::Ipv4Addr::new(0, 0, 0, 0);
            self.v4mask = 0;
            self.v4gw = net::Ipv4Addr::new(0, 0, 0, 0);
            self.dns1 = net::Ipv4Addr::new(0, 0, 0, 0);
            self.dns2 = net::Ipv4Addr::new(0, 0, 0, 0);
        }
    }

    pub fn credentials(&self) -> anyhow::Result<WifiCredentials> {
        Ok(WifiCredentials::new(&self.wifi_ssid, &self.wifi_pass)?)
    }

    pub fn thermistor(&self) -> Thermistor {
        Thermistor::new(
            Divider {
                series_ohms: self.series_ohms,
                adc_max: ADC_MAX,
                thermistor_high_side: self.thermistor_high_side,
            },
            SteinhartHart {
                a: self.coeff_a,
                b: self.coeff_b,
                c: self.coeff_c,
            },
        )
    }

    pub fn to_bytes<'a>(&self, buf: &'a mut [u8]) -> anyhow::Result<&'a mut [u8]> {
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::to_slice_crc32(self, buf, digest) {
            Ok(d) => Ok(d),
            Err(e) => bail!("Cannot encode config to buffer {e:?}"),
        }
    }

    pub fn from_bytes(b: &[u8]) -> anyhow::Result<Self> {
        let crc = Crc::<u32>::new(&CRC_32_ISCSI);
        let digest = crc.digest();
        match postcard::from_bytes_crc32::<ThingConfig>(b, digest) {
            Ok(c) => Ok(c),
            Err(e) => bail!("Cannot parse config: {e:?}"),
        }
    }
}

#[cfg(target_os = "espidf")]
mod nvs_store {
    use esp_idf_svc::nvs;
    use log::*;

    use super::*;

    impl ThingConfig {
        pub fn from_nvs(nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> Option<Self> {
            let mut nvsbuf = [0u8; NVS_BUF_SIZE];
            info!("Reading up to {sz} bytes from nvs...", sz = NVS_BUF_SIZE);
            let b = match nvs.get_raw(CONFIG_NAME, &mut nvsbuf) {
                Err(e) => {
                    error!("Nvs read error {e:?}");
                    return None;
                }
                Ok(Some(b)) => b,
                _ => {
                    error!("Nvs key not found");
                    return None;
                }
            };
            info!("Got {sz} bytes from nvs. Parsing config...", sz = b.len());

            match Self::from_bytes(b) {
                Ok(c) => {
                    info!("Successfully parsed config from nvs.");
                    Some(c)
                }
                Err(e) => {
                    error!("{e:?}");
                    None
                }
            }
        }

        pub fn to_nvs(&self, nvs: &mut nvs::EspNvs<nvs::NvsDefault>) -> anyhow::Result<()> {
            let mut nvsbuf = [0u8; NVS_BUF_SIZE];
            let nvsdata = self.to_bytes(&mut nvsbuf)?;
            info!(
                "Encoded config to {sz} bytes. Saving to nvs...",
                sz = nvsdata.len()
            );

            match nvs.set_raw(CONFIG_NAME, nvsdata) {
                Ok(_) => {
                    info!("Config saved.");
                    Ok(())
                }
                Err(e) => bail!("Cannot save to nvs: {e:?}"),
            }
        }
    }
}


// EOF
