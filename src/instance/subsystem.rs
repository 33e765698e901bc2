//! Subsystems hosted by an instance and the registry that loads them.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::str::FromStr;

use serde::Serialize;

use crate::instance::paths::InstancePaths;
use crate::properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemKind {
    Ca,
    Kra,
    Ocsp,
    Tks,
    Tps,
}

impl SubsystemKind {
    /// Load order.
    pub const ALL: [SubsystemKind; 5] = [Self::Ca, Self::Kra, Self::Ocsp, Self::Tks, Self::Tps];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ca => "ca",
            Self::Kra => "kra",
            Self::Ocsp => "ocsp",
            Self::Tks => "tks",
            Self::Tps => "tps",
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubsystemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown subsystem '{s}'"))
    }
}

/// A loaded subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsystem {
    kind: SubsystemKind,
    config: BTreeMap<String, String>,
}

impl Subsystem {
    pub fn new(kind: SubsystemKind, config: BTreeMap<String, String>) -> Self {
        Self { kind, config }
    }

    /// Read the subsystem's `CS.cfg`; a missing file leaves the config empty.
    pub fn load(paths: &InstancePaths, kind: SubsystemKind) -> io::Result<Self> {
        let path = paths.subsystem_conf(kind);
        let mut config = BTreeMap::new();

        if path.exists() {
            tracing::info!(subsystem = %kind, path = %path.display(), "Loading subsystem config");
            properties::load_properties(&path, &mut config)?;
        }

        Ok(Self::new(kind, config))
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}

pub type SubsystemLoader = Box<dyn Fn(&InstancePaths, SubsystemKind) -> io::Result<Subsystem> + Send + Sync>;

/// Maps each subsystem kind to the function that loads it.
pub struct SubsystemRegistry {
    loaders: BTreeMap<SubsystemKind, SubsystemLoader>,
}

impl SubsystemRegistry {
    /// No loaders at all; every installed subsystem is skipped.
    pub fn empty() -> Self {
        Self {
            loaders: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: SubsystemKind, loader: F)
    where
        F: Fn(&InstancePaths, SubsystemKind) -> io::Result<Subsystem> + Send + Sync + 'static,
    {
        self.loaders.insert(kind, Box::new(loader));
    }

    pub fn get(&self, kind: SubsystemKind) -> Option<&SubsystemLoader> {
        self.loaders.get(&kind)
    }
}

impl Default for SubsystemRegistry {
    /// [`Subsystem::load`] for every kind.
    fn default() -> Self {
        let mut registry = Self::empty();
        for kind in SubsystemKind::ALL {
            registry.register(kind, Subsystem::load);
        }
        registry
    }
}

impl fmt::Debug for SubsystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.loaders.keys()).finish()
    }
}
