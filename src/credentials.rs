// credentials.rs

use std::{fmt, time::Duration};

use serde::Serialize;

pub const SSID_MAX_LEN: usize = 32;
pub const PASS_MAX_LEN: usize = 64;

pub type Ssid = heapless::String<SSID_MAX_LEN>;
pub type Passphrase = heapless::String<PASS_MAX_LEN>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialError {
    EmptySsid,
    SsidTooLong(usize),
    PassTooLong(usize),
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySsid => write!(f, "Wi-Fi SSID is empty"),
            Self::SsidTooLong(n) => write!(f, "Wi-Fi SSID is {n} bytes, max {SSID_MAX_LEN}"),
            Self::PassTooLong(n) => write!(f, "Wi-Fi password is {n} bytes, max {PASS_MAX_LEN}"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Network name and password for the single station connection.
#[derive(Clone, PartialEq, Eq)]
pub struct WifiCredentials {
    pub ssid: Ssid,
    pub pass: Passphrase,
}

// never log the password
impl fmt::Debug for WifiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WifiCredentials")
            .field("ssid", &self.ssid)
            .field("pass", &if self.pass.is_empty() { "" } else { "***" })
            .finish()
    }
}

impl WifiCredentials {
    pub fn new(ssid: &str, pass: &str) -> Result<Self, CredentialError> {
        if ssid.is_empty() {
            return Err(CredentialError::EmptySsid);
        }
        let ssid = Ssid::try_from(ssid).map_err(|_| CredentialError::SsidTooLong(ssid.len()))?;
        let pass =
            Passphrase::try_from(pass).map_err(|_| CredentialError::PassTooLong(pass.len()))?;
        Ok(Self { ssid, pass })
    }

    /// Credentials baked in at build time from `SECRET_SSID` and `SECRET_OPTIONAL_PASS`.
    pub fn from_secrets() -> Result<Self, CredentialError> {
        Self::new(secret_ssid(), secret_pass())
    }

    pub fn is_open(&self) -> bool {
        self.pass.is_empty()
    }
}

pub fn secret_ssid() -> &'static str {
    option_env!("SECRET_SSID").unwrap_or("internet")
}

pub fn secret_pass() -> &'static str {
    option_env!("SECRET_OPTIONAL_PASS").unwrap_or("")
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    #[default]
    Init,
    Connecting,
    Connected,
    Disconnected,
    Error,
}

pub const INITIAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// What the connection loop does after a failed connect or association.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectFailure {
    /// Initial connect failed, the caller restarts the device.
    GiveUp,
    RetryAfter(Duration),
}

/// Upper bound on waiting for association and an address.
pub fn association_timeout(initial: bool) -> Option<Duration> {
    initial.then_some(INITIAL_CONNECT_TIMEOUT)
}

pub fn on_connect_failure(initial: bool) -> ConnectFailure {
    if initial {
        ConnectFailure::GiveUp
    } else {
        ConnectFailure::RetryAfter(RECONNECT_DELAY)
    }
}


// EOF
