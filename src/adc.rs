// adc.rs

use std::borrow::Borrow;

use esp_idf_hal::adc::{
    attenuation,
    oneshot::{config::AdcChannelConfig, AdcChannelDriver, AdcDriver},
};
use esp_idf_hal::gpio::ADCPin;

use crate::*;

/// Full range input, the divider swings close to the supply rail.
pub fn thermistor_channel_config() -> AdcChannelConfig {
    AdcChannelConfig {
        attenuation: attenuation::DB_11,
        ..Default::default()
    }
}

impl<'d, T, M> ThermistorInput for AdcChannelDriver<'d, T, M>
where
    T: ADCPin,
    M: Borrow<AdcDriver<'d, T::Adc>>,
{
    fn read_raw(&mut self) -> anyhow::Result<u16> {
        Ok(AdcChannelDriver::read_raw(self)?)
    }
}

// EOF
