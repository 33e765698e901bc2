//! Filesystem layout of an instance.

use std::path::{Path, PathBuf};

use crate::instance::subsystem::SubsystemKind;

/// Every path derived from an instance's name and type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancePaths {
    base_dir: PathBuf,
    service_conf: PathBuf,
}

impl InstancePaths {
    /// Layout of `name` under `instances_dir`, with its service environment
    /// file `<sysconfig_dir>/<service_id>`.
    pub fn new(instances_dir: &Path, sysconfig_dir: &Path, name: &str, service_id: &str) -> Self {
        Self {
            base_dir: instances_dir.join(name),
            service_conf: sysconfig_dir.join(service_id),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.base_dir.join("bin")
    }

    pub fn conf_dir(&self) -> PathBuf {
        self.base_dir.join("conf")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.base_dir.join("lib")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.base_dir.join("temp")
    }

    pub fn webapps_dir(&self) -> PathBuf {
        self.base_dir.join("webapps")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.base_dir.join("work")
    }

    pub fn server_xml(&self) -> PathBuf {
        self.conf_dir().join("server.xml")
    }

    pub fn tomcat_conf(&self) -> PathBuf {
        self.conf_dir().join("tomcat.conf")
    }

    pub fn password_conf(&self) -> PathBuf {
        self.conf_dir().join("password.conf")
    }

    /// Per-application deployment descriptors.
    pub fn context_dir(&self) -> PathBuf {
        self.conf_dir().join("Catalina").join("localhost")
    }

    pub fn service_conf(&self) -> &Path {
        &self.service_conf
    }

    /// Marker directory whose presence means the subsystem is installed.
    pub fn subsystem_dir(&self, kind: SubsystemKind) -> PathBuf {
        self.base_dir.join(kind.as_str())
    }

    /// Configuration file of an installed subsystem.
    pub fn subsystem_conf(&self, kind: SubsystemKind) -> PathBuf {
        self.conf_dir().join(kind.as_str()).join("CS.cfg")
    }
}
