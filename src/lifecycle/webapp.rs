//! Web application deployment descriptors.
//!
//! Tomcat deploys one application per `<id>.xml` file under
//! `conf/Catalina/localhost`. The id encodes the context path and version:
//! `ROOT` is `/`, `#` separates path segments, `##` starts the version.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::server_config::{Document, ServerConfigError};

/// Id of the web application served at `/`.
pub const ROOT_WEBAPP: &str = "ROOT";

const DESCRIPTOR_SUFFIX: &str = ".xml";

/// Storage for per-application descriptors, keyed by application id.
pub trait DescriptorStore {
    /// Create or overwrite the descriptor of `app_id`.
    fn write(&self, app_id: &str, content: &[u8]) -> io::Result<()>;

    /// Delete the descriptor; `Ok(false)` when there was none.
    fn remove(&self, app_id: &str) -> io::Result<bool>;

    fn exists(&self, app_id: &str) -> bool;

    /// Application ids, sorted.
    fn list(&self) -> io::Result<Vec<String>>;

    fn read(&self, app_id: &str) -> io::Result<Vec<u8>>;

    /// Where the descriptor of `app_id` lives, for display.
    fn location(&self, app_id: &str) -> String;
}

/// Descriptors as files in a context directory.
#[derive(Debug, Clone)]
pub struct FsDescriptorStore {
    dir: PathBuf,
}

impl FsDescriptorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, app_id: &str) -> PathBuf {
        self.dir.join(format!("{app_id}{DESCRIPTOR_SUFFIX}"))
    }
}

impl DescriptorStore for FsDescriptorStore {
    fn write(&self, app_id: &str, content: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(app_id);
        tracing::info!(path = %path.display(), "Creating deployment descriptor");
        fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(crate::properties::DEFAULT_FILE_MODE))?;
        }

        Ok(())
    }

    fn remove(&self, app_id: &str) -> io::Result<bool> {
        let path = self.path(app_id);
        tracing::info!(path = %path.display(), "Removing deployment descriptor");
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exists(&self, app_id: &str) -> bool {
        self.path(app_id).exists()
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(DESCRIPTOR_SUFFIX) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read(&self, app_id: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path(app_id))
    }

    fn location(&self, app_id: &str) -> String {
        self.path(app_id).display().to_string()
    }
}

/// A deployed web application as listed from its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Webapp {
    pub id: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub descriptor: String,
    #[serde(rename = "docBase")]
    pub doc_base: Option<String>,
}

impl Webapp {
    pub fn from_descriptor(id: &str, descriptor: String, content: &[u8]) -> Result<Self, ServerConfigError> {
        let document = Document::parse(content)?;
        let doc_base = document.attribute(document.root(), "docBase").map(str::to_string);

        let (name, version) = match id.split_once("##") {
            Some((name, version)) => (name, Some(version.to_string())),
            None => (id, None),
        };

        Ok(Self {
            id: id.to_string(),
            path: context_path(name),
            version,
            descriptor,
            doc_base,
        })
    }
}

/// Context path Tomcat serves an application name under.
pub fn context_path(name: &str) -> String {
    if name == ROOT_WEBAPP {
        "/".to_string()
    } else {
        format!("/{}", name.replace('#', "/"))
    }
}

/// Path the deploy/undeploy waits probe.
pub fn probe_path(app_id: &str) -> String {
    if app_id == ROOT_WEBAPP {
        "/".to_string()
    } else {
        format!("/{app_id}")
    }
}

/// Rewrite a descriptor, pointing `docBase` at `doc_base` when given.
pub fn render_descriptor(content: &[u8], doc_base: Option<&str>) -> Result<Vec<u8>, ServerConfigError> {
    let mut document = Document::parse(content)?;
    if let Some(doc_base) = doc_base.filter(|d| !d.is_empty()) {
        let root = document.root();
        document.set_attribute(root, "docBase", doc_base);
    }
    Ok(document.to_bytes())
}
