//! Container configuration loading and rendering
//!
//! A container definition (`<conf_dir>/<name>.yml`) lists pups templates
//! that are layered underneath it. The merged result is a
//! [`ResolvedConfig`], which renders the payloads piped to the runtime:
//! the concatenated YAML consumed by pups inside the container, and the
//! Dockerfile used for the credential-free image build.

use crate::errors::{ConfigError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Separator placed between concatenated template documents
pub const FILE_SEPARATOR: &str = "_FILE_SEPERATOR_";

/// Name of the runtime payload written into the build context
pub const CONFIG_FILE_OUTPUT: &str = "config.yaml";

pub const DEFAULT_BASE_IMAGE: &str = "discourse/base:release";

pub const DEFAULT_BOOT_COMMAND: &str = "/sbin/boot";

const NO_BOOT_COMMAND: &str = "/pups/bin/pups /pups/config.yaml";

/// Environment variables that must never reach an image build
pub const KNOWN_SECRETS: &[&str] = &["DISCOURSE_DB_PASSWORD", "DISCOURSEDB_SOCKET"];

static INVALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[[:upper:]/ !@#$%^&*()+~`=]").expect("valid regex"));

static ENV_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

static HOSTNAME_INVALID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z-]").expect("valid regex"));

pub fn is_secret(key: &str) -> bool {
    KNOWN_SECRETS.contains(&key)
}

/// `<host>-<config>`, the hostname used when the config does not pin one
pub fn default_hostname(config_name: &str) -> String {
    let host = sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string());
    format!("{}-{}", host, config_name)
}

/// Host directory mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
    pub host: String,
    pub guest: String,
}

/// Legacy container link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMapping {
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Deserialize)]
struct VolumeEntry {
    volume: VolumeMapping,
}

#[derive(Debug, Deserialize)]
struct LinkEntry {
    link: LinkMapping,
}

/// Configuration produced by the loader; never mutated by phases
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    pub name: String,
    pub base_image: String,
    pub run_image: Option<String>,
    pub boot_command: Option<String>,
    pub no_boot_command: bool,
    pub docker_args: Option<String>,
    pub templates: Vec<String>,
    pub expose: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub volumes: Vec<VolumeMapping>,
    pub links: Vec<LinkMapping>,
    #[serde(skip)]
    raw_documents: Vec<String>,
}

impl ResolvedConfig {
    /// Empty configuration with defaults, mostly useful to build fixtures in code
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_image: DEFAULT_BASE_IMAGE.to_string(),
            run_image: None,
            boot_command: None,
            no_boot_command: false,
            docker_args: None,
            templates: Vec::new(),
            expose: Vec::new(),
            params: BTreeMap::new(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            volumes: Vec::new(),
            links: Vec::new(),
            raw_documents: Vec::new(),
        }
    }

    /// Runtime payload: every source document, in merge order
    pub fn yaml(&self) -> String {
        self.raw_documents.join(FILE_SEPARATOR)
    }

    pub fn boot_command(&self) -> &str {
        match &self.boot_command {
            Some(cmd) if !cmd.is_empty() => cmd,
            _ if self.no_boot_command => NO_BOOT_COMMAND,
            _ => DEFAULT_BOOT_COMMAND,
        }
    }

    /// Sorted `(key, value)` pairs, optionally dropping known secrets
    pub fn env_pairs(&self, include_secrets: bool) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter(|(k, _)| include_secrets || !is_secret(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Extra runtime flags from `docker_args`, split like a shell would
    pub fn docker_args(&self) -> Result<Vec<String>> {
        match &self.docker_args {
            Some(raw) => shell_words::split(raw).map_err(|e| {
                ConfigError::Syntax {
                    message: format!("docker_args: {}", e),
                }
                .into()
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Container hostname derived from the config or the host's name
    pub fn hostname(&self, default_hostname: &str) -> String {
        let hostname = if self.env.contains_key("DOCKER_USE_HOSTNAME") {
            self.env
                .get("DISCOURSE_HOSTNAME")
                .map(String::as_str)
                .unwrap_or(default_hostname)
        } else {
            default_hostname
        };
        HOSTNAME_INVALID
            .replace_all(hostname, "-")
            .to_lowercase()
    }

    /// Build-time payload fed to `build -f -`
    pub fn dockerfile(&self, pups_args: &str, bake_env: bool) -> String {
        let mut out = String::new();
        out.push_str(&format!("ARG dockerfile_from_image={}\n", self.base_image));
        out.push_str("FROM ${dockerfile_from_image}\n");
        for (key, _) in self.env_pairs(false) {
            out.push_str(&format!("ARG {}\n", key));
        }
        if bake_env {
            for (key, _) in self.env_pairs(false) {
                out.push_str(&format!("ENV {}=${{{}}}\n", key, key));
            }
        }
        let ports: Vec<&str> = self
            .expose
            .iter()
            .map(|p| p.rsplit(':').next().unwrap_or(p.as_str()))
            .collect();
        if !ports.is_empty() {
            out.push_str(&format!("EXPOSE {}\n", ports.join(" ")));
        }
        out.push_str(&format!("COPY {} /temp-config.yaml\n", CONFIG_FILE_OUTPUT));
        out.push_str(&format!(
            "RUN cat /temp-config.yaml | /usr/local/bin/pups {} --stdin && rm /temp-config.yaml\n",
            pups_args
        ));
        out.push_str(&format!("CMD [\"{}\"]", self.boot_command()));
        out
    }

    /// Serialisable copy with secret values masked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for (key, value) in copy.env.iter_mut() {
            if is_secret(key) {
                *value = "****".to_string();
            }
        }
        copy
    }

    fn apply_document(&mut self, doc: &Mapping) -> Result<()> {
        for (key, value) in doc {
            let Some(key) = key.as_str() else { continue };
            match key {
                "base_image" => self.base_image = scalar(value),
                "run_image" => self.run_image = Some(scalar(value)),
                "boot_command" => self.boot_command = Some(scalar(value)),
                "no_boot_command" => self.no_boot_command = value.as_bool().unwrap_or(false),
                "docker_args" => self.docker_args = Some(scalar(value)),
                "templates" => self.templates = string_list(value),
                "expose" => self.expose = string_list(value),
                "params" => merge_map(&mut self.params, value),
                "env" => merge_map(&mut self.env, value),
                "labels" => merge_map(&mut self.labels, value),
                "volumes" => {
                    let entries: Vec<VolumeEntry> = serde_yaml::from_value(value.clone())
                        .map_err(|e| ConfigError::Syntax {
                            message: format!("volumes: {}", e),
                        })?;
                    self.volumes = entries.into_iter().map(|e| e.volume).collect();
                }
                "links" => {
                    let entries: Vec<LinkEntry> = serde_yaml::from_value(value.clone())
                        .map_err(|e| ConfigError::Syntax {
                            message: format!("links: {}", e),
                        })?;
                    self.links = entries.into_iter().map(|e| e.link).collect();
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_sequence()
        .map(|seq| seq.iter().map(scalar).collect())
        .unwrap_or_default()
}

fn merge_map(target: &mut BTreeMap<String, String>, value: &Value) {
    if let Some(map) = value.as_mapping() {
        for (k, v) in map {
            target.insert(scalar(k), scalar(v));
        }
    }
}

/// Source of resolved configurations
pub trait ConfigLoader: Send + Sync {
    /// Resolve the named configuration. With `perform_env_validation` the
    /// templates are layered in and env keys are checked.
    fn load(&self, name: &str, perform_env_validation: bool) -> Result<ResolvedConfig>;
}

/// Loads `<conf_dir>/<name>.yml` and the templates it references
#[derive(Debug, Clone)]
pub struct TemplateConfigLoader {
    conf_dir: PathBuf,
    templates_dir: PathBuf,
}

impl TemplateConfigLoader {
    pub fn new(conf_dir: impl Into<PathBuf>, templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: conf_dir.into(),
            templates_dir: templates_dir.into(),
        }
    }

    fn read(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.display().to_string(),
                }
                .into()
            } else {
                ConfigError::Io(e).into()
            }
        })
    }

    fn resolve(&self, name: &str, perform_env_validation: bool) -> Result<ResolvedConfig> {
        if INVALID_NAME.is_match(name) {
            return Err(ConfigError::InvalidName {
                name: name.to_string(),
            }
            .into());
        }

        let container_path = self.conf_dir.join(format!("{}.yml", name));
        let container_raw = self.read(&container_path)?;
        let container_doc = parse_document(&container_raw, &container_path)?;

        let mut documents = Vec::new();
        if perform_env_validation {
            for template in string_list(container_doc.get("templates").unwrap_or(&Value::Null)) {
                let path = self.templates_dir.join(&template);
                let raw = self.read(&path).map_err(|e| ConfigError::Template {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                let doc = parse_document(&raw, &path)?;
                documents.push((raw, doc));
            }
        }
        documents.push((container_raw, container_doc));

        let mut config = ResolvedConfig::new(name);
        for (raw, doc) in documents {
            config.apply_document(&doc)?;
            config.raw_documents.push(raw);
        }

        if perform_env_validation {
            if let Some(key) = config.env.keys().find(|k| !ENV_KEY.is_match(k)) {
                return Err(ConfigError::InvalidEnv { key: key.clone() }.into());
            }
        }

        debug!(
            "Resolved config {} from {} document(s)",
            name,
            config.raw_documents.len()
        );
        Ok(config)
    }
}

fn parse_document(raw: &str, path: &Path) -> Result<Mapping> {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(ConfigError::Syntax {
            message: format!("{}: top level must be a mapping", path.display()),
        }
        .into()),
        Err(e) => Err(ConfigError::Syntax {
            message: format!("{}: {}", path.display(), e),
        }
        .into()),
    }
}

impl ConfigLoader for TemplateConfigLoader {
    #[instrument(skip(self))]
    fn load(&self, name: &str, perform_env_validation: bool) -> Result<ResolvedConfig> {
        self.resolve(name, perform_env_validation)
    }
}
