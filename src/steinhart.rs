// steinhart.rs

use std::fmt;

use serde::{Deserialize, Serialize};

pub const KELVIN_OFFSET: f64 = 273.15;

pub const DEFAULT_COEFF_A: f64 = 1.009249522e-3;
pub const DEFAULT_COEFF_B: f64 = 2.378405444e-4;
pub const DEFAULT_COEFF_C: f64 = 2.019202697e-7;
pub const DEFAULT_SERIES_OHMS: f64 = 10_000.0;

/// Full scale of the 12-bit one-shot ADC.
pub const ADC_MAX: u16 = 4095;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ThermistorError {
    /// Thermistor reads as infinite resistance.
    Open(u16),
    /// Thermistor reads as zero resistance.
    Shorted(u16),
    AboveFullScale(u16),
    BadResistance(f64),
    BadTemperature(f64),
}

impl fmt::Display for ThermistorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(raw) => write!(f, "thermistor open circuit (raw {raw})"),
            Self::Shorted(raw) => write!(f, "thermistor short circuit (raw {raw})"),
            Self::AboveFullScale(raw) => write!(f, "raw value {raw} above ADC full scale"),
            Self::BadResistance(r) => write!(f, "invalid resistance {r} ohm"),
            Self::BadTemperature(t) => write!(f, "invalid temperature {t} K"),
        }
    }
}

impl std::error::Error for ThermistorError {}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SteinhartHart {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for SteinhartHart {
    fn default() -> Self {
        Self {
            a: DEFAULT_COEFF_A,
            b: DEFAULT_COEFF_B,
            c: DEFAULT_COEFF_C,
        }
    }
}

impl SteinhartHart {
    pub fn kelvin(&self, resistance: f64) -> Result<f64, ThermistorError> {
        if !resistance.is_finite() || resistance <= 0.0 {
            return Err(ThermistorError::BadResistance(resistance));
        }
        let ln_r = resistance.ln();
        let t = 1.0 / (self.a + self.b * ln_r + self.c * ln_r.powi(3));
        if !t.is_finite() || t <= 0.0 {
            return Err(ThermistorError::BadTemperature(t));
        }
        Ok(t)
    }

    pub fn celsius(&self, resistance: f64) -> Result<f64, ThermistorError> {
        Ok(self.kelvin(resistance)? - KELVIN_OFFSET)
    }
}

/// Voltage divider made of the thermistor and a fixed series resistor,
/// with the ADC sampling the junction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Divider {
    pub series_ohms: f64,
    pub adc_max: u16,
    /// Thermistor between supply and the ADC pin, series resistor to ground.
    pub thermistor_high_side: bool,
}

impl Default for Divider {
    fn default() -> Self {
        Self {
            series_ohms: DEFAULT_SERIES_OHMS,
            adc_max: ADC_MAX,
            thermistor_high_side: true,
        }
    }
}

impl Divider {
    pub fn resistance(&self, raw: u16) -> Result<f64, ThermistorError> {
        if raw > self.adc_max {
            return Err(ThermistorError::AboveFullScale(raw));
        }
        let max = f64::from(self.adc_max);
        let v = f64::from(raw);

        let r = if self.thermistor_high_side {
            match raw {
                0 => return Err(ThermistorError::Open(raw)),
                r if r == self.adc_max => return Err(ThermistorError::Shorted(raw)),
                _ => self.series_ohms * (max / v - 1.0),
            }
        } else {
            match raw {
                0 => return Err(ThermistorError::Shorted(raw)),
                r if r == self.adc_max => return Err(ThermistorError::Open(raw)),
                _ => self.series_ohms * v / (max - v),
            }
        };

        if !r.is_finite() || r <= 0.0 {
            return Err(ThermistorError::BadResistance(r));
        }
        Ok(r)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Thermistor {
    pub divider: Divider,
    pub model: SteinhartHart,
}

impl Thermistor {
    pub fn new(divider: Divider, model: SteinhartHart) -> Self {
        Self { divider, model }
    }

    pub fn temperature(&self, raw: u16) -> Result<f64, ThermistorError> {
        self.model.celsius(self.divider.resistance(raw)?)
    }

    /// Temperature rounded to whole degrees Celsius, as published.
    pub fn whole_degrees(&self, raw: u16) -> Result<i32, ThermistorError> {
        Ok(self.temperature(raw)?.round() as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_kilo_ohm_is_room_temperature() {
        let t = SteinhartHart::default().celsius(10_000.0).unwrap();
        assert!((t - 24.7).abs() < 0.2, "got {t}");
    }

    #[test]
    fn ntc_gets_colder_as_resistance_rises() {
        let m = SteinhartHart::default();
        let warm = m.celsius(5_000.0).unwrap();
        let room = m.celsius(10_000.0).unwrap();
        let cold = m.celsius(30_000.0).unwrap();
        assert!(warm > room && room > cold);
    }

    #[test]
    fn rejects_non_positive_resistance() {
        let m = SteinhartHart::default();
        assert_eq!(m.kelvin(0.0), Err(ThermistorError::BadResistance(0.0)));
        assert!(m.kelvin(f64::NAN).is_err());
    }

    #[test]
    fn high_side_divider() {
        let d = Divider::default();
        let r = d.resistance(2048).unwrap();
        assert!((r - 9995.1).abs() < 1.0, "got {r}");
        assert_eq!(d.resistance(0), Err(ThermistorError::Open(0)));
        assert_eq!(d.resistance(ADC_MAX), Err(ThermistorError::Shorted(ADC_MAX)));
        assert_eq!(d.resistance(5000), Err(ThermistorError::AboveFullScale(5000)));
    }

    #[test]
    fn low_side_divider() {
        let d = Divider {
            thermistor_high_side: false,
            ..Default::default()
        };
        let r = d.resistance(1365).unwrap();
        assert!((r - 5000.0).abs() < 5.0, "got {r}");
        assert_eq!(d.resistance(0), Err(ThermistorError::Shorted(0)));
        assert_eq!(d.resistance(ADC_MAX), Err(ThermistorError::Open(ADC_MAX)));
    }

    #[test]
    fn midscale_reads_about_25_degrees() {
        let th = Thermistor::default();
        assert_eq!(th.whole_degrees(2048).unwrap(), 25);
    }

    #[test]
    fn lower_raw_on_high_side_means_colder() {
        let th = Thermistor::default();
        // less current through the thermistor, so higher resistance
        assert!(th.temperature(1000).unwrap() < th.temperature(3000).unwrap());
    }
}

// EOF
