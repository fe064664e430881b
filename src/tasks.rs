// tasks.rs

use embedded_hal::digital::InputPin;
use esp_idf_svc::ping;

use crate::*;

const CONFIG_RESET_COUNT: i32 = 9;

pub async fn poll_reset<B: InputPin>(state: SharedState, mut button: B) -> anyhow::Result<()> {
    let mut uptime: usize = 0;
    loop {
        sleep(Duration::from_secs(2)).await;

        uptime += 2;
        *(state.uptime.write().await) = uptime;

        if *state.reset.read().await {
            esp_idf_hal::reset::restart();
        }

        if button.is_low().unwrap_or(false) {
            Box::pin(reset_button(&state, &mut button)).await?;
        }
    }
}

async fn reset_button<B: InputPin>(state: &SharedState, button: &mut B) -> anyhow::Result<()> {
    let mut reset_cnt = CONFIG_RESET_COUNT;

    while button.is_low().unwrap_or(false) {
        // button is pressed and kept down, countdown and factory reset if reach zero
        error!("Reset? {reset_cnt}");

        if reset_cnt == 0 {
            error!("Factory resetting...");

            let new_config = ThingConfig::default();
            new_config.to_nvs(&mut *state.nvs.write().await)?;
            sleep(Duration::from_millis(2000)).await;
            esp_idf_hal::reset::restart();
        }

        reset_cnt -= 1;
        sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

pub async fn pinger(state: SharedState) -> anyhow::Result<()> {
    loop {
        sleep(Duration::from_secs(300)).await;

        if let Some(ping_ip) = *state.ping_ip.read().await {
            let if_idx = *state.if_index.read().await;
            if if_idx > 0 {
                info!("Starting ping {ping_ip} (if_idx {if_idx})");
                let conf = ping::Configuration {
                    count: 3,
                    interval: Duration::from_secs(1),
                    timeout: Duration::from_secs(1),
                    data_size: 64,
                    tos: 0,
                };
                let mut ping = ping::EspPing::new(if_idx);
                let res = ping.ping(ping_ip, &conf)?;
                info!("Pinger result: {res:?}");
                if res.received == 0 {
                    error!("Ping failed, rebooting.");
                    sleep(Duration::from_millis(2000)).await;
                    esp_idf_hal::reset::restart();
                }
            } else {
                error!("No if_index. wat?");
            }
        }
    }
}

// EOF
