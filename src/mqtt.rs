// mqtt.rs

use esp_idf_svc::mqtt::client::{
    EspAsyncMqttClient, EspAsyncMqttConnection, EventPayload, MqttClientConfiguration, QoS,
};

use crate::*;

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

pub async fn run_mqtt(
    state: SharedState,
    mut outbox: mpsc::Receiver<Outgoing>,
    inbox: mpsc::Sender<TelemetryMsg>,
) -> anyhow::Result<()> {
    if !state.config.read().await.mqtt_enable {
        info!("MQTT is disabled.");
        // keep draining, otherwise the sync task sees a full outbox forever
        while let Some(o) = outbox.recv().await {
            debug!("MQTT disabled, not sending {p}: {d}", p = o.property, d = o.payload);
        }
        bail!("Outbox closed.");
    }

    while !state.wifi_up().await {
        sleep(Duration::from_secs(1)).await;
    }

    loop {
        let url = state.config.read().await.mqtt_url.clone();
        let myid = state.myid.read().await.clone();
        let dev_topic = device_topic(&state.config.read().await.mqtt_topic, &myid);

        info!("MQTT connecting to {url}...");
        let (mut client, conn) = match EspAsyncMqttClient::new(
            &url,
            &MqttClientConfiguration {
                client_id: Some(myid.as_str()),
                keep_alive_interval: Some(Duration::from_secs(25)),
                ..Default::default()
            },
        ) {
            Ok(c) => c,
            Err(e) => {
                error!("MQTT connection failed: {e:?}");
                sleep(RECONNECT_DELAY).await;
                continue;
            }
        };

        info!("MQTT connected, device topic {dev_topic}");
        tokio::select! {
            _ = Box::pin(event_loop(conn, &dev_topic, &inbox)) => {}
            res = Box::pin(data_sender(&mut client, &dev_topic, &mut outbox)) => {
                if let Err(e) = res {
                    error!("MQTT sender: {e:?}");
                }
            }
        }
        drop(client);

        sleep(RECONNECT_DELAY).await;
    }
}

async fn event_loop(
    mut conn: EspAsyncMqttConnection,
    dev_topic: &str,
    inbox: &mpsc::Sender<TelemetryMsg>,
) {
    while let Ok(event) = Box::pin(conn.next()).await {
        match event.payload() {
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => match parse_remote(dev_topic, topic, data) {
                Some(msg) => {
                    if inbox.send(msg).await.is_err() {
                        error!("Telemetry inbox closed.");
                        break;
                    }
                }
                None => warn!("MQTT ignoring message on {topic}"),
            },
            other => info!("MQTT event: {other:?}"),
        }
    }
    error!("MQTT connection closed.");
}

async fn data_sender(
    client: &mut EspAsyncMqttClient,
    dev_topic: &str,
    outbox: &mut mpsc::Receiver<Outgoing>,
) -> anyhow::Result<()> {
    let filter = set_filter(dev_topic);
    info!("MQTT subscribing {filter}");
    client.subscribe(&filter, QoS::AtLeastOnce).await?;

    while let Some(o) = outbox.recv().await {
        let topic = property_topic(dev_topic, &o.property);
        info!("MQTT sending {topic}");
        client
            .publish(&topic, QoS::AtLeastOnce, false, o.payload.as_bytes())
            .await?;
    }
    bail!("Outbox closed.")
}

// EOF
