// property.rs

use std::{
    fmt,
    time::{Duration, Instant},
};

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Access {
    /// Device owned, the cloud can only observe it.
    Read,
    /// The cloud may also write it.
    ReadWrite,
}

pub type ChangeCallback = fn(&str, i32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(usize);

impl PropertyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyError {
    EmptyName,
    Duplicate(String),
    ZeroInterval(String),
    CallbackOnReadOnly(String),
    Unknown(String),
    ReadOnly(String),
}

impl fmt::Display for PropertyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "property name is empty"),
            Self::Duplicate(n) => write!(f, "property {n} already registered"),
            Self::ZeroInterval(n) => write!(f, "property {n} has zero sync interval"),
            Self::CallbackOnReadOnly(n) => {
                write!(f, "property {n} is read-only and cannot have a change callback")
            }
            Self::Unknown(n) => write!(f, "no such property {n}"),
            Self::ReadOnly(n) => write!(f, "property {n} is read-only"),
        }
    }
}

impl std::error::Error for PropertyError {}

pub struct Property {
    pub name: String,
    pub access: Access,
    pub interval: Duration,
    pub value: Option<i32>,
    pub last_sync: Option<Instant>,
    callback: Option<ChangeCallback>,
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("interval", &self.interval)
            .field("value", &self.value)
            .field("last_sync", &self.last_sync)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Property {
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    fn is_due(&self, now: Instant) -> bool {
        match (self.value, self.last_sync) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(_), Some(t)) => now.saturating_duration_since(t) >= self.interval,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PropertySnapshot {
    pub name: String,
    pub access: Access,
    pub interval_s: u64,
    pub value: Option<i32>,
    pub synced_ago_s: Option<u64>,
}

#[derive(Debug, Default)]
pub struct PropertyRegistry {
    props: Vec<Property>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(
        &mut self,
        name: &str,
        access: Access,
        interval: Duration,
        callback: Option<ChangeCallback>,
    ) -> Result<PropertyId, PropertyError> {
        if name.is_empty() {
            return Err(PropertyError::EmptyName);
        }
        if self.find(name).is_some() {
            return Err(PropertyError::Duplicate(name.into()));
        }
        if interval.is_zero() {
            return Err(PropertyError::ZeroInterval(name.into()));
        }
        if access == Access::Read && callback.is_some() {
            return Err(PropertyError::CallbackOnReadOnly(name.into()));
        }

        self.props.push(Property {
            name: name.into(),
            access,
            interval,
            value: None,
            last_sync: None,
            callback,
        });
        Ok(PropertyId(self.props.len() - 1))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &Property)> {
        self.props.iter().enumerate().map(|(i, p)| (PropertyId(i), p))
    }

    pub fn get(&self, id: PropertyId) -> Option<&Property> {
        self.props.get(id.0)
    }

    pub fn find(&self, name: &str) -> Option<PropertyId> {
        self.props
            .iter()
            .position(|p| p.name == name)
            .map(PropertyId)
    }

    /// Device side write. Ids come from this registry, so a stale one is a no-op.
    pub fn set(&mut self, id: PropertyId, value: i32) -> bool {
        match self.props.get_mut(id.0) {
            Some(p) => {
                p.value = Some(value);
                true
            }
            None => false,
        }
    }

    /// Cloud side write.
    pub fn apply_remote(&mut self, name: &str, value: i32) -> Result<PropertyId, PropertyError> {
        let id = self
            .find(name)
            .ok_or_else(|| PropertyError::Unknown(name.into()))?;
        let p = &mut self.props[id.0];
        if p.access == Access::Read {
            return Err(PropertyError::ReadOnly(name.into()));
        }

        p.value = Some(value);
        if let Some(cb) = p.callback {
            cb(&p.name, value);
        }
        Ok(id)
    }

    pub fn due(&self, now: Instant) -> Vec<PropertyId> {
        self.iter()
            .filter(|(_, p)| p.is_due(now))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn mark_synced(&mut self, id: PropertyId, now: Instant) {
        if let Some(p) = self.props.get_mut(id.0) {
            p.last_sync = Some(now);
        }
    }

    pub fn snapshot(&self, now: Instant) -> Vec<PropertySnapshot> {
        self.props
            .iter()
            .map(|p| PropertySnapshot {
                name: p.name.clone(),
                access: p.access,
                interval_s: p.interval.as_secs(),
                value: p.value,
                synced_ago_s: p
                    .last_sync
                    .map(|t| now.saturating_duration_since(t).as_secs()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    const MIN: Duration = Duration::from_secs(60);

    #[test]
    fn registration_rules() {
        let mut reg = PropertyRegistry::new();
        let a = reg.add_property("a", Access::Read, MIN, None).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(
            reg.add_property("a", Access::Read, MIN, None),
            Err(PropertyError::Duplicate("a".into()))
        );
        assert_eq!(
            reg.add_property("", Access::Read, MIN, None),
            Err(PropertyError::EmptyName)
        );
        assert_eq!(
            reg.add_property("b", Access::Read, Duration::ZERO, None),
            Err(PropertyError::ZeroInterval("b".into()))
        );
        assert_eq!(
            reg.add_property("c", Access::Read, MIN, Some(on_change as ChangeCallback)),
            Err(PropertyError::CallbackOnReadOnly("c".into()))
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unset_property_is_never_due() {
        let mut reg = PropertyRegistry::new();
        reg.add_property("t", Access::Read, MIN, None).unwrap();
        assert!(reg.due(Instant::now()).is_empty());
    }

    #[test]
    fn due_follows_interval() {
        let mut reg = PropertyRegistry::new();
        let id = reg.add_property("t", Access::Read, MIN, None).unwrap();
        let t0 = Instant::now();

        reg.set(id, 21);
        assert_eq!(reg.due(t0), vec![id]);

        reg.mark_synced(id, t0);
        assert!(reg.due(t0 + Duration::from_secs(59)).is_empty());
        assert_eq!(reg.due(t0 + MIN), vec![id]);
    }

    #[test]
    fn remote_write_to_read_only_is_rejected() {
        let mut reg = PropertyRegistry::new();
        let id = reg.add_property("t", Access::Read, MIN, None).unwrap();
        reg.set(id, 20);
        assert_eq!(
            reg.apply_remote("t", 99),
            Err(PropertyError::ReadOnly("t".into()))
        );
        assert_eq!(reg.get(id).unwrap().value, Some(20));
        assert_eq!(
            reg.apply_remote("nope", 1),
            Err(PropertyError::Unknown("nope".into()))
        );
    }

    static SEEN: AtomicI32 = AtomicI32::new(0);

    fn on_change(_name: &str, value: i32) {
        SEEN.store(value, Ordering::SeqCst);
    }

    #[test]
    fn remote_write_runs_callback() {
        let mut reg = PropertyRegistry::new();
        let id = reg
            .add_property("setpoint", Access::ReadWrite, MIN, Some(on_change as ChangeCallback))
            .unwrap();
        assert_eq!(reg.apply_remote("setpoint", 42), Ok(id));
        assert_eq!(reg.get(id).unwrap().value, Some(42));
        assert_eq!(SEEN.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn snapshot_reports_age() {
        let mut reg = PropertyRegistry::new();
        let id = reg.add_property("t", Access::Read, MIN, None).unwrap();
        let t0 = Instant::now();
        reg.set(id, 5);
        reg.mark_synced(id, t0);

        let snap = reg.snapshot(t0 + Duration::from_secs(7));
        assert_eq!(
            snap,
            vec![PropertySnapshot {
                name: "t".into(),
                access: Access::Read,
                interval_s: 60,
                value: Some(5),
                synced_ago_s: Some(7),
            }]
        );
    }
}

// EOF
