//! The instance aggregate: identity, layered settings, credentials,
//! subsystems and lifecycle control.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::{InstanceConfig, ManagerConfig};
use crate::credentials::{
    normalize_token, CredentialResolver, KeyringSecretService, PasswordStore, TerminalPrompt,
};
use crate::instance::paths::InstancePaths;
use crate::instance::provision::Provisioner;
use crate::instance::subsystem::{Subsystem, SubsystemKind, SubsystemRegistry};
use crate::instance::{InstanceError, InstanceResult};
use crate::lifecycle::{
    DescriptorStore, FsDescriptorStore, HttpProbe, LifecycleController, ReadinessProbe, ServiceManager,
    SystemdServiceManager,
};
use crate::properties;
use crate::server_config::{ServerConfig, ServerConfigError, DEFAULT_CERT_TYPE, DEFAULT_SSL_HOST};

/// Connector carrying the instance's TLS server certificate.
pub const SECURE_CONNECTOR: &str = "Secure";

/// Attribute holding the server certificate nickname.
pub const CERT_KEY_ALIAS: &str = "certificateKeyAlias";

/// Who an instance is and who owns its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceIdentity {
    pub name: String,
    pub instance_type: String,
    pub user: String,
    pub group: String,
}

impl InstanceIdentity {
    pub fn new(name: impl Into<String>, config: &InstanceConfig) -> Self {
        Self {
            name: name.into(),
            instance_type: config.instance_type.clone(),
            user: config.user.clone(),
            group: config.group.clone(),
        }
    }

    /// OS service unit instance, `<type>@<name>`.
    pub fn service_id(&self) -> String {
        format!("{}@{}", self.instance_type, self.name)
    }
}

/// Shared settings files read before the instance's own `tomcat.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayers {
    pub global: PathBuf,
    pub package: PathBuf,
}

impl ConfigLayers {
    pub fn from_settings(settings: &ManagerConfig) -> Self {
        Self {
            global: settings.paths.global_tomcat_conf.clone(),
            package: settings.paths.package_tomcat_conf.clone(),
        }
    }
}

/// A managed server instance.
pub struct InstanceManager<S = SystemdServiceManager, P = HttpProbe, D = FsDescriptorStore> {
    identity: InstanceIdentity,
    paths: InstancePaths,
    layers: ConfigLayers,
    config: BTreeMap<String, String>,
    credentials: CredentialResolver,
    registry: SubsystemRegistry,
    subsystems: BTreeMap<SubsystemKind, Subsystem>,
    lifecycle: LifecycleController<S, P, D>,
}

impl InstanceManager {
    /// Instance `name` wired to systemd, an HTTP probe, the kernel keyring
    /// and, when allowed, the terminal.
    pub fn open(name: &str, settings: &ManagerConfig) -> InstanceResult<Self> {
        let identity = InstanceIdentity::new(name, &settings.instance);
        let service_id = identity.service_id();
        let paths = InstancePaths::new(
            &settings.paths.instances_dir,
            &settings.paths.sysconfig_dir,
            name,
            &service_id,
        );

        let mut credentials = CredentialResolver::new(name, PasswordStore::new(paths.password_conf()));
        if settings.credentials.use_keyring {
            credentials = credentials.with_secret_service(KeyringSecretService::new());
        }
        if settings.credentials.interactive {
            credentials = credentials.with_prompt(TerminalPrompt);
        }

        let lifecycle = LifecycleController::new(
            name,
            &identity.instance_type,
            paths.server_xml(),
            SystemdServiceManager::new(),
            HttpProbe::new()?,
            FsDescriptorStore::new(paths.context_dir()),
        )
        .with_hostname(settings.lifecycle.hostname.clone())
        .with_poll_interval(settings.lifecycle.poll_interval());

        Ok(Self::with_parts(
            identity,
            paths,
            ConfigLayers::from_settings(settings),
            credentials,
            lifecycle,
        ))
    }
}

impl<S, P, D> InstanceManager<S, P, D>
where
    S: ServiceManager,
    P: ReadinessProbe,
    D: DescriptorStore,
{
    pub fn with_parts(
        identity: InstanceIdentity,
        paths: InstancePaths,
        layers: ConfigLayers,
        credentials: CredentialResolver,
        lifecycle: LifecycleController<S, P, D>,
    ) -> Self {
        Self {
            identity,
            paths,
            layers,
            config: BTreeMap::new(),
            credentials,
            registry: SubsystemRegistry::default(),
            subsystems: BTreeMap::new(),
            lifecycle,
        }
    }

    pub fn with_registry(mut self, registry: SubsystemRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn paths(&self) -> &InstancePaths {
        &self.paths
    }

    pub fn exists(&self) -> bool {
        self.paths.base_dir().exists()
    }

    pub fn validate(&self) -> InstanceResult<()> {
        if !self.exists() {
            return Err(InstanceError::InvalidState(format!("Invalid instance: {}", self.name())));
        }
        Ok(())
    }

    /// Settings, credentials, then subsystems.
    pub fn load(&mut self) -> InstanceResult<()> {
        tracing::info!(instance = %self.name(), "Loading instance");
        self.load_config()?;
        self.load_passwords()?;
        self.load_subsystems()
    }

    /// Rebuild the settings map from the global, package and instance
    /// `tomcat.conf` layers, later layers winning.
    pub fn load_config(&mut self) -> InstanceResult<()> {
        self.config.clear();

        for (label, path) in [("global", &self.layers.global), ("package", &self.layers.package)] {
            if path.exists() {
                tracing::info!(layer = label, path = %path.display(), "Loading Tomcat config");
                properties::load_properties(path, &mut self.config)?;
            } else {
                tracing::info!(layer = label, path = %path.display(), "Tomcat config not found, skipping");
            }
        }

        let instance_conf = self.paths.tomcat_conf();
        if instance_conf.exists() {
            tracing::info!(layer = "instance", path = %instance_conf.display(), "Loading Tomcat config");
            properties::load_properties(&instance_conf, &mut self.config)?;
        }

        for value in self.config.values_mut() {
            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                *value = value[1..value.len() - 1].to_string();
            }
        }

        self.config.insert("NAME".to_string(), self.identity.name.clone());
        Ok(())
    }

    /// Seed the credential cache from `password.conf`.
    pub fn load_passwords(&mut self) -> InstanceResult<()> {
        Ok(self.credentials.load()?)
    }

    /// Load every installed subsystem that has a registered loader.
    pub fn load_subsystems(&mut self) -> InstanceResult<()> {
        self.subsystems.clear();

        for kind in SubsystemKind::ALL {
            let dir = self.paths.subsystem_dir(kind);
            let mut entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            if entries.next().is_none() {
                tracing::debug!(subsystem = %kind, "Subsystem directory is empty, skipping");
                continue;
            }

            let Some(loader) = self.registry.get(kind) else {
                tracing::warn!(subsystem = %kind, "No loader registered, skipping");
                continue;
            };

            let subsystem =
                loader(&self.paths, kind).map_err(|source| InstanceError::Subsystem { kind, source })?;
            tracing::info!(subsystem = %kind, "Subsystem loaded");
            self.subsystems.insert(kind, subsystem);
        }

        Ok(())
    }

    pub fn config(&self) -> &BTreeMap<String, String> {
        &self.config
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }

    pub fn subsystems(&self) -> impl Iterator<Item = &Subsystem> {
        self.subsystems.values()
    }

    pub fn subsystem(&self, kind: SubsystemKind) -> Option<&Subsystem> {
        self.subsystems.get(&kind)
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialResolver {
        &mut self.credentials
    }

    pub fn password(&mut self, name: &str) -> InstanceResult<String> {
        Ok(self.credentials.resolve(name)?)
    }

    pub fn token_password(&mut self, token: &str) -> InstanceResult<String> {
        Ok(self.credentials.token_password(token)?)
    }

    /// Write the credential cache to `password.conf`.
    pub fn store_passwords(&self) -> InstanceResult<()> {
        Ok(self.credentials.persist()?)
    }

    pub fn server_config(&self) -> InstanceResult<ServerConfig> {
        Ok(ServerConfig::load(self.paths.server_xml())?)
    }

    pub fn lifecycle(&self) -> &LifecycleController<S, P, D> {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut LifecycleController<S, P, D> {
        &mut self.lifecycle
    }

    /// Nickname of the TLS server certificate, `None` without a secure connector.
    pub fn get_sslserver_cert_nickname(&self) -> InstanceResult<Option<String>> {
        let mut config = self.server_config()?;
        let Some(connector) = config.get_connector(SECURE_CONNECTOR) else {
            return Ok(None);
        };

        let sslhost = config.get_sslhost(connector, DEFAULT_SSL_HOST)?;
        let cert = config.get_sslcert(sslhost, DEFAULT_CERT_TYPE)?;
        Ok(config.get_attribute(cert, CERT_KEY_ALIAS).map(str::to_string))
    }

    /// Point the secure connector at `nickname`, qualified by `token` when
    /// the certificate lives on a hardware token.
    pub fn set_sslserver_cert_nickname(&self, nickname: &str, token: Option<&str>) -> InstanceResult<()> {
        let fullname = match token.and_then(normalize_token) {
            Some(token) => format!("{token}:{nickname}"),
            None => nickname.to_string(),
        };

        let mut config = self.server_config()?;
        let connector = config.get_connector(SECURE_CONNECTOR).ok_or(ServerConfigError::NotFound {
            kind: "Connector",
            key: SECURE_CONNECTOR.to_string(),
        })?;

        let sslhost = config.get_sslhost(connector, DEFAULT_SSL_HOST)?;
        let cert = config.get_sslcert(sslhost, DEFAULT_CERT_TYPE)?;
        config.set_attribute(cert, CERT_KEY_ALIAS, &fullname);
        config.save()?;

        tracing::info!(nickname = %fullname, "Server certificate nickname updated");
        Ok(())
    }

    pub fn create<V: Provisioner>(&self, provisioner: &V, force: bool) -> InstanceResult<()> {
        tracing::info!(instance = %self.name(), "Creating instance");
        Ok(provisioner.create(&self.paths, force)?)
    }

    /// Delete the instance. Consumes the manager so no cached state
    /// outlives the files.
    pub fn remove<V: Provisioner>(self, provisioner: &V, force: bool) -> InstanceResult<()> {
        tracing::info!(instance = %self.name(), "Removing instance");
        Ok(provisioner.remove(&self.paths, force)?)
    }
}

impl<S, P, D> std::fmt::Debug for InstanceManager<S, P, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceManager")
            .field("identity", &self.identity)
            .field("paths", &self.paths)
            .field("config_entries", &self.config.len())
            .field("credentials", &self.credentials)
            .field("subsystems", &self.subsystems.keys().collect::<Vec<_>>())
            .finish()
    }
}
