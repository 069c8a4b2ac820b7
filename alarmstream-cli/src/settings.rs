//! Settings file loading.
//!
//! The file is YAML (JSON when the extension says so). Cameras come either keyed by name under
//! `hikvision.cams`, which runs only while `hikvision.enabled` is set, or as a flat `cameras`
//! list. `DEBUG`, `HIKVISION_ENABLED` and `HIKVISION_CAMS` (a JSON object of cams) override
//! the file.

use alarmstream::{AuthMethod, CameraConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories searched, relative to the working directory, when no path is given.
const SEARCH_DIRS: &[&str] = &[".", "config"];
/// File names tried in each directory, in order.
const FILE_NAMES: &[&str] = &["config.yaml", "config.yml", "config.json"];

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no settings file found (tried {})", display_paths(.0))]
    NotFound(Vec<PathBuf>),
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("cannot parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },
    #[error("invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

/// One camera under `hikvision.cams`; its name is the map key.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CamEntry {
    #[serde(default)]
    pub address: String,
    #[serde(default, alias = "useHttps")]
    pub https: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "authmethod")]
    pub auth_method: Option<AuthMethod>,
    #[serde(default, alias = "rawtcp")]
    pub raw_tcp: bool,
}

impl CamEntry {
    fn into_config(self, name: String) -> CameraConfig {
        CameraConfig {
            name,
            address: self.address,
            use_https: self.https,
            username: self.username,
            password: self.password,
            auth_method: self.auth_method,
            raw_tcp: self.raw_tcp,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HikvisionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cams: BTreeMap<String, CamEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub hikvision: HikvisionSettings,
}

impl Settings {
    pub fn from_yaml(contents: &str) -> Result<Self, String> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| e.to_string())
    }

    pub fn from_json(contents: &str) -> Result<Self, String> {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    }

    /// Read and parse `path`, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|source| SettingsError::Read { path: path.to_path_buf(), source })?;
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json { Self::from_json(&contents) } else { Self::from_yaml(&contents) };
        parsed.map_err(|reason| SettingsError::Parse { path: path.to_path_buf(), reason })
    }

    /// Apply environment overrides. `var` looks a variable up (`std::env::var` in production).
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var("DEBUG") {
            self.debug = parse_bool("DEBUG", &value)?;
        }
        if let Some(value) = var("HIKVISION_ENABLED") {
            self.hikvision.enabled = parse_bool("HIKVISION_ENABLED", &value)?;
        }
        if let Some(value) = var("HIKVISION_CAMS") {
            self.hikvision.cams = serde_json::from_str(&value)
                .map_err(|e| SettingsError::Env { var: "HIKVISION_CAMS", reason: e.to_string() })?;
        }
        Ok(())
    }

    /// Cams configured under `hikvision` but not run because the section is disabled.
    pub fn disabled_cams(&self) -> usize {
        if self.hikvision.enabled {
            0
        } else {
            self.hikvision.cams.len()
        }
    }

    /// Every camera to supervise: the flat list, then the enabled `hikvision.cams` by name.
    pub fn into_cameras(self) -> Vec<CameraConfig> {
        let mut cameras = self.cameras;
        if self.hikvision.enabled {
            cameras.extend(
                self.hikvision.cams.into_iter().map(|(name, entry)| entry.into_config(name)),
            );
        }
        cameras
    }
}

/// Accepts the spellings Go's `strconv.ParseBool` does.
fn parse_bool(var: &'static str, value: &str) -> Result<bool, SettingsError> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => {
            Err(SettingsError::Env { var, reason: format!("expected a boolean, got {other:?}") })
        }
    }
}

/// `explicit` when given, otherwise the first settings file found under `base`.
pub fn locate(explicit: Option<&Path>, base: &Path) -> Result<PathBuf, SettingsError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let candidates: Vec<PathBuf> = SEARCH_DIRS
        .iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| base.join(dir).join(name)))
        .collect();
    match candidates.iter().find(|path| path.is_file()) {
        Some(path) => Ok(path.clone()),
        None => Err(SettingsError::NotFound(candidates)),
    }
}
