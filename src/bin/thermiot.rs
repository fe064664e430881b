// bin/thermiot.rs

#![warn(clippy::large_futures)]

#[cfg(target_os = "espidf")]
esp_idf_sys::esp_app_desc!();

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_hal::{
        adc::{oneshot::AdcChannelDriver, oneshot::AdcDriver},
        delay::FreeRtos,
        gpio::{PinDriver, Pull},
        prelude::Peripherals,
    };
    use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs, timer::EspTaskTimerService, wifi::WifiDriver};
    use esp_idf_sys::esp;
    use thermiot::*;

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    // eventfd is needed by our mio poll implementation.  Note you should set max_fds
    // higher if you have other code that may need eventfd.
    #[allow(clippy::needless_update)]
    let config = esp_idf_sys::esp_vfs_eventfd_config_t {
        max_fds: 1,
        ..Default::default()
    };
    esp! { unsafe { esp_idf_sys::esp_vfs_eventfd_register(&config) } }?;

    info!("Hello.");
    info!("Starting up, firmware {FW_VERSION} built {}", build_timestamp());

    let sysloop = EspSystemEventLoop::take()?;
    let timer = EspTaskTimerService::new()?;
    let nvs_default_partition = nvs::EspDefaultNvsPartition::take()?;

    let ns = env!("CARGO_BIN_NAME");
    let mut nvs = match nvs::EspNvs::new(nvs_default_partition.clone(), ns, true) {
        Ok(nvs) => {
            info!("Got namespace {ns:?} from default partition");
            nvs
        }
        Err(e) => bail!("Could not get namespace {ns}: {e:?}"),
    };

    #[cfg(feature = "reset_settings")]
    let config = {
        let c = ThingConfig::default();
        c.to_nvs(&mut nvs)?;
        c
    };

    #[cfg(not(feature = "reset_settings"))]
    let config = match ThingConfig::from_nvs(&mut nvs) {
        None => {
            error!("Could not read nvs config, using defaults");
            let c = ThingConfig::default();
            c.to_nvs(&mut nvs)?;
            info!("Successfully saved default config to nvs.");
            c
        }

        // using settings saved on nvs if we could find them
        Some(c) => c,
    };
    info!("My config:\n{:#?}", config.redacted());

    let credentials = match config.credentials() {
        Ok(c) => c,
        Err(e) => {
            error!("Stored Wi-Fi credentials unusable ({e}), using build secrets");
            WifiCredentials::from_secrets()?
        }
    };

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    #[cfg(feature = "esp32c3")]
    let (mut button, temp1_pin, temp2_pin) = (PinDriver::input(pins.gpio9)?, pins.gpio0, pins.gpio1);

    #[cfg(feature = "esp32s")]
    let (mut button, temp1_pin, temp2_pin) = (PinDriver::input(pins.gpio0)?, pins.gpio34, pins.gpio35);

    button.set_pull(Pull::Up)?;

    let adc = Arc::new(AdcDriver::new(peripherals.adc1)?);
    let chan_config = thermistor_channel_config();

    let mut registry = PropertyRegistry::new();
    let things = init_properties(&mut registry)?;

    let sensors = vec![
        Sensor {
            id: things.steinhart_temp1,
            name: STEINHART_TEMP1.into(),
            input: Box::new(AdcChannelDriver::new(adc.clone(), temp1_pin, &chan_config)?),
        },
        Sensor {
            id: things.steinhart_temp2,
            name: STEINHART_TEMP2.into(),
            input: Box::new(AdcChannelDriver::new(adc, temp2_pin, &chan_config)?),
        },
    ];

    let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_SIZE);
    let (outbox_tx, outbox_rx) = mpsc::channel(OUTBOX_SIZE);
    let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());

    let wifidriver = WifiDriver::new(
        peripherals.modem,
        sysloop.clone(),
        Some(nvs_default_partition),
    )?;

    let thermistor = config.thermistor();
    let sample_delay = Duration::from_secs(config.delay);
    let (oversample, retries) = (config.oversample, config.retries);

    let shared_state: SharedState = Arc::new(Box::pin(MyState::new(config, snapshot_rx, nvs)));
    let wifi_handler = WifiConnectionHandler::new(shared_state.clone(), credentials);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(Box::pin(async move {
            info!("Entering main loop...");
            tokio::select! {
                res = Box::pin(poll_reset(shared_state.clone(), button)) => { error!("poll_reset() ended: {res:?}"); }
                res = Box::pin(poll_sensors(sensors, thermistor, sample_delay, oversample, retries, inbox_tx.clone())) => { error!("poll_sensors() ended: {res:?}"); }
                res = Box::pin(run_sync(SyncEngine::new(registry), inbox_rx, outbox_tx, snapshot_tx)) => { error!("run_sync() ended: {res:?}"); }
                res = Box::pin(run_mqtt(shared_state.clone(), outbox_rx, inbox_tx)) => { error!("run_mqtt() ended: {res:?}"); }
                res = Box::pin(run_api_server(shared_state.clone())) => { error!("run_api_server() ended: {res:?}"); }
                res = Box::pin(wifi_handler.run(wifidriver, sysloop, timer)) => { error!("wifi_handler.run() ended: {res:?}"); }
                res = Box::pin(pinger(shared_state.clone())) => { error!("pinger() ended: {res:?}"); }
            };
        }));

    // not actually returning from main() but we reboot instead
    info!("main() finished, reboot.");
    FreeRtos::delay_ms(3000);
    esp_idf_hal::reset::restart();
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!(
        "{} {} is ESP-IDF firmware, build it for an espidf target.",
        env!("CARGO_BIN_NAME"),
        thermiot::FW_VERSION
    );
}

// EOF
