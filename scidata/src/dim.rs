use std::{collections::BTreeMap, fmt};

use parking_lot::{const_rwlock, RwLock};
use tracing::debug;

use crate::errors::{Error, Result};

/// First id handed out to a dimension label registered at runtime
pub const DIM_CUSTOM_START: u16 = 1000;

/// An interned label naming one axis of an array.
///
/// Builtin labels are associated constants and cost nothing to use. Any other name is registered
/// once, process wide, by ``Dim::new`` and keeps its id for the lifetime of the process.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dim(u16);

const BUILTIN: [&str; 12] = [
    "<invalid>",
    "energy",
    "event",
    "group",
    "position",
    "row",
    "temperature",
    "time",
    "wavelength",
    "x",
    "y",
    "z",
];

impl Dim {
    pub const INVALID: Dim = Dim(0);
    pub const ENERGY: Dim = Dim(1);
    pub const EVENT: Dim = Dim(2);
    pub const GROUP: Dim = Dim(3);
    pub const POSITION: Dim = Dim(4);
    pub const ROW: Dim = Dim(5);
    pub const TEMPERATURE: Dim = Dim(6);
    pub const TIME: Dim = Dim(7);
    pub const WAVELENGTH: Dim = Dim(8);
    pub const X: Dim = Dim(9);
    pub const Y: Dim = Dim(10);
    pub const Z: Dim = Dim(11);

    /// Look up the label for ``name``, registering it if it has not been seen before.
    ///
    pub fn new(name: &str) -> Result<Self> {
        if let Some(index) = BUILTIN.iter().position(|builtin| *builtin == name) {
            return Ok(Dim(index as u16));
        }

        if let Some(id) = REGISTRY.read().by_name.get(name) {
            return Ok(Dim(*id));
        }

        let mut registry = REGISTRY.write();
        // Registered by another thread since the read lock was released
        if let Some(id) = registry.by_name.get(name) {
            return Ok(Dim(*id));
        }

        let id = usize::from(DIM_CUSTOM_START) + registry.names.len();
        let id = u16::try_from(id).map_err(|_| {
            Error::Registry(String::from(
                "Exceeded maximum number of different dimension labels.",
            ))
        })?;
        registry.by_name.insert(name.to_string(), id);
        registry.names.push(name.to_string());
        debug!(name, id, "registered dimension label");

        Ok(Dim(id))
    }

    pub fn name(&self) -> String {
        let id = usize::from(self.0);
        if id < BUILTIN.len() {
            return BUILTIN[id].to_string();
        }

        let index = id.saturating_sub(usize::from(DIM_CUSTOM_START));
        REGISTRY
            .read()
            .names
            .get(index)
            .cloned()
            .unwrap_or_else(|| String::from("<unregistered>"))
    }

    pub fn is_builtin(&self) -> bool {
        usize::from(self.0) < BUILTIN.len()
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Bijection between custom names and ids. Lookups take the read lock, registration the write
/// lock.
struct Registry {
    by_name: BTreeMap<String, u16>,
    names: Vec<String>,
}

static REGISTRY: RwLock<Registry> = const_rwlock(Registry {
    by_name: BTreeMap::new(),
    names: Vec::new(),
});

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    #[test]
    fn test_builtin() -> Result<()> {
        assert_eq!(Dim::new("x")?, Dim::X);
        assert_eq!(Dim::new("time")?, Dim::TIME);
        assert_eq!(Dim::Y.name(), "y");
        assert_eq!(Dim::INVALID.name(), "<invalid>");
        assert_eq!(Dim::default(), Dim::INVALID);
        assert!(Dim::Z.is_builtin());

        Ok(())
    }

    #[test]
    fn test_custom() -> Result<()> {
        let dim = Dim::new("detector_id")?;
        assert!(!dim.is_builtin());
        assert_eq!(dim.name(), "detector_id");
        assert_eq!(format!("{dim}"), "detector_id");
        assert_eq!(Dim::new("detector_id")?, dim);
        assert_ne!(Dim::new("spectrum")?, dim);

        Ok(())
    }

    #[test]
    fn test_concurrent_registration() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| Dim::new("concurrent_label")))
            .collect();
        let dims: Vec<Dim> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        assert!(dims.iter().all(|dim| *dim == dims[0]));
    }
}
