// telemetry.rs

use std::time::Instant;

use anyhow::bail;
use log::*;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch},
    time::{interval, Duration, MissedTickBehavior},
};

use crate::{PropertyError, PropertyId, PropertyRegistry, PropertySnapshot};

pub const OUTBOX_SIZE: usize = 16;
pub const INBOX_SIZE: usize = 16;

const SET_SUFFIX: &str = "set";

/// Everything that changes a property goes through the telemetry task as one of these.
#[derive(Clone, Debug, PartialEq)]
pub enum TelemetryMsg {
    /// Local sample from the sensor side.
    Reading { id: PropertyId, value: i32 },
    /// Write request that arrived from the broker.
    Remote { name: String, value: i32 },
}

/// One property sync, ready to publish below the device topic.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    pub property: String,
    pub payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PropertyPayload {
    pub name: String,
    pub value: i32,
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct SetPayload {
    value: i32,
}

pub fn device_topic(topic: &str, device_id: &str) -> String {
    format!("{topic}/{device_id}")
}

pub fn property_topic(device_topic: &str, property: &str) -> String {
    format!("{device_topic}/{property}")
}

/// Topic filter covering the set requests of every property of the device.
pub fn set_filter(device_topic: &str) -> String {
    format!("{device_topic}/+/{SET_SUFFIX}")
}

/// Parses `<device_topic>/<property>/set` with a payload of either a bare
/// integer or `{"value": n}`.
pub fn parse_remote(device_topic: &str, topic: &str, payload: &[u8]) -> Option<TelemetryMsg> {
    let rest = topic.strip_prefix(device_topic)?.strip_prefix('/')?;
    let name = rest.strip_suffix(SET_SUFFIX)?.strip_suffix('/')?;
    if name.is_empty() || name.contains('/') {
        return None;
    }

    let text = std::str::from_utf8(payload).ok()?.trim();
    let value = match text.parse::<i32>() {
        Ok(v) => v,
        Err(_) => serde_json::from_str::<SetPayload>(text).ok()?.value,
    };
    Some(TelemetryMsg::Remote {
        name: name.to_string(),
        value,
    })
}

pub struct SyncEngine {
    registry: PropertyRegistry,
}

impl SyncEngine {
    pub fn new(registry: PropertyRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    pub fn handle(&mut self, msg: TelemetryMsg) {
        match msg {
            TelemetryMsg::Reading { id, value } => {
                if !self.registry.set(id, value) {
                    error!("Reading for unknown property {id:?}");
                }
            }
            TelemetryMsg::Remote { name, value } => match self.registry.apply_remote(&name, value) {
                Ok(_) => info!("Remote update {name} = {value}"),
                Err(e @ PropertyError::ReadOnly(_)) => warn!("Ignoring remote write: {e}"),
                Err(e) => error!("Remote write failed: {e}"),
            },
        }
    }

    /// Collects the properties whose sync interval has elapsed and marks them synced.
    pub fn collect_due(&mut self, now: Instant, timestamp: i64) -> Vec<Outgoing> {
        let mut out = Vec::new();
        for id in self.registry.due(now) {
            let Some(p) = self.registry.get(id) else {
                continue;
            };
            let Some(value) = p.value else {
                continue;
            };
            let payload = PropertyPayload {
                name: p.name.clone(),
                value,
                timestamp,
            };
            match serde_json::to_string(&payload) {
                Ok(s) => out.push(Outgoing {
                    property: p.name.clone(),
                    payload: s,
                }),
                Err(e) => {
                    error!("Cannot encode {name}: {e}", name = p.name);
                    continue;
                }
            }
            self.registry.mark_synced(id, now);
        }
        out
    }

    pub fn snapshot(&self, now: Instant) -> Vec<PropertySnapshot> {
        self.registry.snapshot(now)
    }
}

pub async fn run_sync(
    mut engine: SyncEngine,
    mut inbox: mpsc::Receiver<TelemetryMsg>,
    outbox: mpsc::Sender<Outgoing>,
    snapshot: watch::Sender<Vec<PropertySnapshot>>,
) -> anyhow::Result<()> {
    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Property sync running for {n} properties.",
        n = engine.registry().len()
    );
    loop {
        tokio::select! {
            msg = inbox.recv() => match msg {
                Some(m) => engine.handle(m),
                None => bail!("Telemetry inbox closed"),
            },
            _ = tick.tick() => {
                let ts = chrono::Utc::now().timestamp();
                for o in engine.collect_due(Instant::now(), ts) {
                    if let Err(e) = outbox.try_send(o) {
                        warn!("Outbox full, dropping sync: {e}");
                    }
                }
            }
        }
        snapshot.send_replace(engine.snapshot(Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{init_properties, Access, ChangeCallback, STEINHART_TEMP1, STEINHART_TEMP2};

    fn engine() -> (SyncEngine, crate::ThingProperties) {
        let mut reg = PropertyRegistry::new();
        let ids = init_properties(&mut reg).unwrap();
        (SyncEngine::new(reg), ids)
    }

    #[test]
    fn topics() {
        let dev = device_topic("thermiot", "thermiot-AA:BB");
        assert_eq!(dev, "thermiot/thermiot-AA:BB");
        assert_eq!(
            property_topic(&dev, STEINHART_TEMP1),
            "thermiot/thermiot-AA:BB/Steinhart_Temp1"
        );
        assert_eq!(set_filter(&dev), "thermiot/thermiot-AA:BB/+/set");
    }

    #[test]
    fn parses_set_requests() {
        let dev = "t/dev";
        assert_eq!(
            parse_remote(dev, "t/dev/Setpoint/set", b" 42 "),
            Some(TelemetryMsg::Remote {
                name: "Setpoint".into(),
                value: 42
            })
        );
        assert_eq!(
            parse_remote(dev, "t/dev/Setpoint/set", br#"{"value":-3}"#),
            Some(TelemetryMsg::Remote {
                name: "Setpoint".into(),
                value: -3
            })
        );
        assert_eq!(parse_remote(dev, "t/dev/Setpoint", b"1"), None);
        assert_eq!(parse_remote(dev, "t/other/Setpoint/set", b"1"), None);
        assert_eq!(parse_remote(dev, "t/dev//set", b"1"), None);
        assert_eq!(parse_remote(dev, "t/dev/Setpoint/set", b"warm"), None);
    }

    #[test]
    fn publishes_only_known_values_once_per_interval() {
        let (mut e, ids) = engine();
        let t0 = Instant::now();
        assert!(e.collect_due(t0, 0).is_empty());

        e.handle(TelemetryMsg::Reading {
            id: ids.steinhart_temp2,
            value: 23,
        });
        let out = e.collect_due(t0, 1_700_000_000);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].property, STEINHART_TEMP2);
        let p: PropertyPayload = serde_json::from_str(&out[0].payload).unwrap();
        assert_eq!((p.name.as_str(), p.value, p.timestamp), (STEINHART_TEMP2, 23, 1_700_000_000));

        // newer reading inside the interval waits for the next sync
        e.handle(TelemetryMsg::Reading {
            id: ids.steinhart_temp2,
            value: 24,
        });
        assert!(e.collect_due(t0 + Duration::from_secs(30), 0).is_empty());
        let out = e.collect_due(t0 + Duration::from_secs(60), 0);
        assert!(out[0].payload.contains("\"value\":24"));
    }

    #[test]
    fn remote_write_cannot_touch_read_only_temperature() {
        let (mut e, ids) = engine();
        e.handle(TelemetryMsg::Reading {
            id: ids.steinhart_temp1,
            value: 20,
        });
        e.handle(TelemetryMsg::Remote {
            name: STEINHART_TEMP1.into(),
            value: 99,
        });
        assert_eq!(e.registry().get(ids.steinhart_temp1).unwrap().value, Some(20));
    }

    fn ignore(_: &str, _: i32) {}

    #[test]
    fn remote_write_updates_read_write_property() {
        let mut reg = PropertyRegistry::new();
        let id = reg
            .add_property(
                "Setpoint",
                Access::ReadWrite,
                Duration::from_secs(60),
                Some(ignore as ChangeCallback),
            )
            .unwrap();
        let mut e = SyncEngine::new(reg);
        e.handle(TelemetryMsg::Remote {
            name: "Setpoint".into(),
            value: 18,
        });
        assert_eq!(e.registry().get(id).unwrap().value, Some(18));
    }

    #[tokio::test]
    async fn sync_task_publishes_readings() {
        let (e, ids) = engine();
        let (in_tx, in_rx) = mpsc::channel(INBOX_SIZE);
        let (out_tx, mut out_rx) = mpsc::channel(OUTBOX_SIZE);
        let (snap_tx, snap_rx) = watch::channel(Vec::new());

        in_tx
            .send(TelemetryMsg::Reading {
                id: ids.steinhart_temp1,
                value: 21,
            })
            .await
            .unwrap();

        tokio::select! {
            res = run_sync(e, in_rx, out_tx, snap_tx) => panic!("sync ended: {res:?}"),
            o = out_rx.recv() => {
                let o = o.unwrap();
                assert_eq!(o.property, STEINHART_TEMP1);
                assert!(o.payload.contains("\"value\":21"));
            }
        }

        let snap = snap_rx.borrow();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].value, Some(21));
    }

    #[test]
    fn dropped_sync_waits_for_next_interval() {
        let (mut e, ids) = engine();
        let t0 = Instant::now();
        for (id, value) in [(ids.steinhart_temp1, 20), (ids.steinhart_temp2, 22)] {
            e.handle(TelemetryMsg::Reading { id, value });
        }

        let (out_tx, mut out_rx) = mpsc::channel(1);
        let dropped = e
            .collect_due(t0, 0)
            .into_iter()
            .filter(|o| out_tx.try_send(o.clone()).is_err())
            .count();
        assert_eq!(dropped, 1);
        assert!(out_rx.try_recv().is_ok());

        // nothing is replayed before the interval is up
        assert!(e.collect_due(t0 + Duration::from_secs(1), 0).is_empty());
        assert_eq!(e.collect_due(t0 + Duration::from_secs(60), 0).len(), 2);
    }

    #[tokio::test]
    async fn sync_task_survives_full_outbox() {
        let (e, ids) = engine();
        let (in_tx, in_rx) = mpsc::channel(INBOX_SIZE);
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let (snap_tx, snap_rx) = watch::channel(Vec::new());

        for (id, value) in [(ids.steinhart_temp1, 20), (ids.steinhart_temp2, 22)] {
            in_tx.send(TelemetryMsg::Reading { id, value }).await.unwrap();
        }

        // outbox is never drained while the task runs
        tokio::select! {
            res = run_sync(e, in_rx, out_tx, snap_tx) => panic!("sync ended: {res:?}"),
            _ = tokio::time::sleep(Duration::from_millis(2500)) => {}
        }

        assert!(out_rx.try_recv().is_ok());
        assert!(out_rx.try_recv().is_err());
        let snap = snap_rx.borrow();
        assert!(snap.iter().all(|p| p.synced_ago_s.is_some()), "{snap:?}");
    }

    #[tokio::test]
    async fn sync_task_ends_when_inbox_closes() {
        let (e, _) = engine();
        let (in_tx, in_rx) = mpsc::channel(INBOX_SIZE);
        let (out_tx, _out_rx) = mpsc::channel(OUTBOX_SIZE);
        let (snap_tx, _snap_rx) = watch::channel(Vec::new());
        drop(in_tx);

        let res = tokio::time::timeout(
            Duration::from_secs(5),
            run_sync(e, in_rx, out_tx, snap_tx),
        )
        .await
        .unwrap();
        assert!(res.is_err());
    }
}

// EOF
