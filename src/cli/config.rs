use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use hotel_price_scout::ScraperConfig;

/// A stored scraping profile
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScoutProfile {
    /// WebDriver endpoint; the `--webdriver` flag takes precedence
    pub webdriver_url: Option<String>,

    pub scraper: ScraperConfig,
}

impl ScoutProfile {
    /// Get the configuration directory
    fn config_dir() -> PathBuf {
        let mut path = if let Some(proj_dirs) = directories::ProjectDirs::from("com", "hotel-price-scout", "hotel-price-scout") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        };

        path.push("sites");
        if !path.exists() {
            if let Err(e) = fs::create_dir_all(&path) {
                error!("Failed to create config directory: {}", e);
            }
        }

        path.pop();
        path
    }

    /// Load the default profile, creating it on first use
    pub fn load_default() -> Result<Self> {
        let config_path = Self::config_dir().join("default.yaml");

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            info!("No default profile found, writing one to {}", config_path.display());
            let profile = Self::default();
            profile.save_to_file(&config_path)?;
            Ok(profile)
        }
    }

    /// Load a site profile by name
    pub fn load_profile(profile: &str) -> Result<Self> {
        let profile_path = Self::profile_path(profile);

        if profile_path.exists() {
            Self::load_from_file(&profile_path)
        } else {
            anyhow::bail!("Profile '{}' not found", profile)
        }
    }

    /// Named profile if given, default profile otherwise
    pub fn resolve(profile: Option<&str>) -> Result<Self> {
        match profile {
            Some(name) => Self::load_profile(name).context(format!("Failed to load profile: {}", name)),
            None => Self::load_default(),
        }
    }

    pub fn profile_path(profile: &str) -> PathBuf {
        Self::config_dir().join("sites").join(format!("{}.yaml", profile))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading profile from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read profile: {}", path.display()))?;

        let profile: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse profile: {}", path.display()))?;

        Ok(profile)
    }

    /// Save as a named site profile
    pub fn save_as_profile(&self, profile: &str) -> Result<PathBuf> {
        let profile_path = Self::profile_path(profile);
        self.save_to_file(&profile_path)?;
        Ok(profile_path)
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving profile to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        fs::write(path, self.to_yaml()?)
            .context(format!("Failed to write profile: {}", path.display()))?;

        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize profile")
    }

    /// List all available site profiles
    pub fn list_profiles() -> Result<Vec<String>> {
        let sites_dir = Self::config_dir().join("sites");

        if !sites_dir.exists() {
            return Ok(vec![]);
        }

        let mut profiles = Vec::new();

        for entry in fs::read_dir(sites_dir)? {
            let path = entry?.path();

            if path.is_file() && path.extension().map_or(false, |ext| ext == "yaml") {
                if let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) {
                    profiles.push(name.to_string());
                }
            }
        }

        profiles.sort();
        Ok(profiles)
    }
}
