// measure.rs

use log::*;
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};

use crate::{PropertyId, TelemetryMsg, Thermistor};

/// Anything that yields raw ADC counts from a thermistor divider.
pub trait ThermistorInput {
    fn read_raw(&mut self) -> anyhow::Result<u16>;
}

pub const MAX_OVERSAMPLE: u32 = 1024;
pub const MAX_RETRIES: u32 = 16;

pub struct Sensor {
    pub id: PropertyId,
    pub name: String,
    pub input: Box<dyn ThermistorInput>,
}

pub fn oversample(input: &mut dyn ThermistorInput, samples: u32) -> anyhow::Result<u16> {
    let n = u64::from(samples.clamp(1, MAX_OVERSAMPLE));
    let mut sum: u64 = 0;
    for _ in 0..n {
        sum += u64::from(input.read_raw()?);
    }
    Ok(((sum + n / 2) / n) as u16)
}

pub fn read_sensor(
    sensor: &mut Sensor,
    thermistor: &Thermistor,
    samples: u32,
    retries: u32,
) -> anyhow::Result<i32> {
    let retries = retries.min(MAX_RETRIES);
    let mut attempt = 0;
    loop {
        let res = oversample(sensor.input.as_mut(), samples)
            .and_then(|raw| Ok(thermistor.whole_degrees(raw)?));
        match res {
            Ok(t) => return Ok(t),
            Err(e) if attempt < retries => {
                warn!("{name}: read failed ({e}), retrying", name = sensor.name);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reads every sensor once and hands the readings to the telemetry task.
pub async fn sample_once(
    sensors: &mut [Sensor],
    thermistor: &Thermistor,
    samples: u32,
    retries: u32,
    tx: &mpsc::Sender<TelemetryMsg>,
) -> anyhow::Result<usize> {
    let mut sent = 0;
    for sensor in sensors.iter_mut() {
        match read_sensor(sensor, thermistor, samples, retries) {
            Ok(value) => {
                info!("{name}: {value} C", name = sensor.name);
                tx.send(TelemetryMsg::Reading { id: sensor.id, value }).await?;
                sent += 1;
            }
            Err(e) => error!("{name}: no reading: {e}", name = sensor.name),
        }
    }
    Ok(sent)
}

pub async fn poll_sensors(
    mut sensors: Vec<Sensor>,
    thermistor: Thermistor,
    delay: Duration,
    samples: u32,
    retries: u32,
    tx: mpsc::Sender<TelemetryMsg>,
) -> anyhow::Result<()> {
    info!("Sampling {n} thermistors every {delay:?}", n = sensors.len());
    loop {
        // an error here means the telemetry side hung up
        sample_once(&mut sensors, &thermistor, samples, retries, &tx).await?;
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{init_properties, PropertyRegistry};

    struct Fixed(Vec<u16>, usize);

    impl ThermistorInput for Fixed {
        fn read_raw(&mut self) -> anyhow::Result<u16> {
            let v = self.0[self.1 % self.0.len()];
            self.1 += 1;
            Ok(v)
        }
    }

    /// Fails the first `fails` reads.
    struct Flaky {
        fails: u32,
        raw: u16,
    }

    impl ThermistorInput for Flaky {
        fn read_raw(&mut self) -> anyhow::Result<u16> {
            if self.fails > 0 {
                self.fails -= 1;
                anyhow::bail!("adc timeout");
            }
            Ok(self.raw)
        }
    }

    fn sensor(input: Box<dyn ThermistorInput>) -> Sensor {
        let mut reg = PropertyRegistry::new();
        let ids = init_properties(&mut reg).unwrap();
        Sensor {
            id: ids.steinhart_temp1,
            name: "t1".into(),
            input,
        }
    }

    #[test]
    fn oversample_averages() {
        let mut f = Fixed(vec![2000, 2010, 2020, 2030], 0);
        assert_eq!(oversample(&mut f, 4).unwrap(), 2015);
        // zero is treated as a single read
        assert_eq!(oversample(&mut f, 0).unwrap(), 2000);
    }

    #[test]
    fn oversample_is_capped_at_full_scale_reads() {
        let mut f = Fixed(vec![4000], 0);
        assert_eq!(oversample(&mut f, 2_000_000).unwrap(), 4000);
        assert_eq!(f.1, MAX_OVERSAMPLE as usize);
    }

    #[test]
    fn retry_count_is_capped() {
        // would succeed on the next attempt if the cap did not hold
        let mut p = sensor(Box::new(Flaky {
            fails: MAX_RETRIES + 1,
            raw: 2048,
        }));
        assert!(read_sensor(&mut p, &Thermistor::default(), 1, u32::MAX).is_err());
    }

    #[test]
    fn retries_then_succeeds() {
        let mut p = sensor(Box::new(Flaky { fails: 2, raw: 2048 }));
        assert_eq!(read_sensor(&mut p, &Thermistor::default(), 1, 2).unwrap(), 25);
    }

    #[test]
    fn gives_up_after_retries() {
        let mut p = sensor(Box::new(Flaky { fails: 3, raw: 2048 }));
        assert!(read_sensor(&mut p, &Thermistor::default(), 1, 2).is_err());
    }

    #[test]
    fn open_thermistor_is_an_error() {
        let mut p = sensor(Box::new(Fixed(vec![0], 0)));
        assert!(read_sensor(&mut p, &Thermistor::default(), 4, 0).is_err());
    }

    #[tokio::test]
    async fn readings_go_to_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sensors = vec![
            sensor(Box::new(Fixed(vec![2048], 0))),
            sensor(Box::new(Fixed(vec![0], 0))),
        ];
        let sent = sample_once(&mut sensors, &Thermistor::default(), 1, 0, &tx)
            .await
            .unwrap();
        assert_eq!(sent, 1);
        match rx.recv().await {
            Some(TelemetryMsg::Reading { value, .. }) => assert_eq!(value, 25),
            other => panic!("unexpected {other:?}"),
        }
    }
}

// EOF
