// things.rs

use std::time::Duration;

use crate::{Access, PropertyError, PropertyId, PropertyRegistry};

pub const SYNC_INTERVAL: Duration = Duration::from_secs(60);

pub const STEINHART_TEMP1: &str = "Steinhart_Temp1";
pub const STEINHART_TEMP2: &str = "Steinhart_Temp2";

/// Ids of the properties this device publishes.
#[derive(Clone, Copy, Debug)]
pub struct ThingProperties {
    pub steinhart_temp1: PropertyId,
    pub steinhart_temp2: PropertyId,
}

pub fn init_properties(registry: &mut PropertyRegistry) -> Result<ThingProperties, PropertyError> {
    Ok(ThingProperties {
        steinhart_temp1: registry.add_property(STEINHART_TEMP1, Access::Read, SYNC_INTERVAL, None)?,
        steinhart_temp2: registry.add_property(STEINHART_TEMP2, Access::Read, SYNC_INTERVAL, None)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_two_read_only_temperatures() {
        let mut reg = PropertyRegistry::new();
        let ids = init_properties(&mut reg).unwrap();
        assert_eq!(reg.len(), 2);

        for (id, name) in [
            (ids.steinhart_temp1, STEINHART_TEMP1),
            (ids.steinhart_temp2, STEINHART_TEMP2),
        ] {
            let p = reg.get(id).unwrap();
            assert_eq!(p.name, name);
            assert_eq!(p.access, Access::Read);
            assert_eq!(p.interval, Duration::from_secs(60));
            assert!(!p.has_callback());
            assert_eq!(p.value, None);
        }
    }

    #[test]
    fn second_init_is_rejected() {
        let mut reg = PropertyRegistry::new();
        init_properties(&mut reg).unwrap();
        assert!(init_properties(&mut reg).is_err());
    }
}

// EOF
