//! Instance directory provisioning.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::instance::paths::InstancePaths;

/// Creates and destroys an instance's on-disk footprint.
pub trait Provisioner {
    /// Build the instance skeleton. Without `force` an existing base
    /// directory is an error.
    fn create(&self, paths: &InstancePaths, force: bool) -> io::Result<()>;

    /// Delete everything `create` made. With `force` missing pieces are
    /// ignored.
    fn remove(&self, paths: &InstancePaths, force: bool) -> io::Result<()>;
}

/// Plain directory skeleton on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsProvisioner {
    server_xml_template: Option<PathBuf>,
}

impl FsProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `conf/server.xml` from `template` on create.
    pub fn with_server_xml_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.server_xml_template = Some(template.into());
        self
    }

    fn directories(paths: &InstancePaths) -> [PathBuf; 6] {
        [
            paths.logs_dir(),
            paths.work_dir(),
            paths.webapps_dir(),
            paths.temp_dir(),
            paths.lib_dir(),
            paths.conf_dir(),
        ]
    }
}

impl Provisioner for FsProvisioner {
    fn create(&self, paths: &InstancePaths, force: bool) -> io::Result<()> {
        let base = paths.base_dir();
        if base.exists() && !force {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", base.display()),
            ));
        }

        tracing::info!(path = %base.display(), "Creating instance directory");
        fs::create_dir_all(base)?;
        for dir in Self::directories(paths) {
            fs::create_dir_all(&dir)?;
        }
        fs::create_dir_all(paths.context_dir())?;

        if let Some(template) = &self.server_xml_template {
            let server_xml = paths.server_xml();
            if force || !server_xml.exists() {
                tracing::info!(path = %server_xml.display(), "Creating server.xml");
                fs::copy(template, &server_xml)?;
            }
        }

        let service_conf = paths.service_conf();
        if let Some(parent) = service_conf.parent() {
            fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %service_conf.display(), "Creating service config");
        let mut file = fs::OpenOptions::new().create(true).append(true).open(service_conf)?;
        writeln!(file, "CATALINA_BASE=\"{}\"", base.display())?;

        Ok(())
    }

    fn remove(&self, paths: &InstancePaths, force: bool) -> io::Result<()> {
        remove_path(paths.service_conf(), force)?;
        for dir in Self::directories(paths) {
            remove_path(&dir, force)?;
        }
        remove_path(paths.base_dir(), force)
    }
}

fn remove_path(path: &Path, force: bool) -> io::Result<()> {
    tracing::info!(path = %path.display(), "Removing");

    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };

    match result {
        Err(e) if force && e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
