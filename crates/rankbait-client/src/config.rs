//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the engine can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on a single persistence call issued by the optimistic
    /// coordinator. Elapsed calls take the rollback path.
    /// Env: `RANKBAIT_WRITE_TIMEOUT_MS`
    /// Default: 15 000 ms
    pub write_timeout: Duration,

    /// Directory holding the local settings database.
    /// Env: `RANKBAIT_DATA_DIR`
    /// Default: platform data directory.
    pub data_dir: Option<PathBuf>,

    /// How many invite codes to try before giving up on group creation.
    /// Env: `RANKBAIT_INVITE_ATTEMPTS`
    /// Default: `5`
    pub invite_code_attempts: usize,

    /// Cloudinary cloud name used for image uploads.
    /// Env: `CLOUDINARY_CLOUD_NAME`
    /// Default: empty (uploads disabled).
    pub cloudinary_cloud_name: String,

    /// Unsigned Cloudinary upload preset.
    /// Env: `CLOUDINARY_UPLOAD_PRESET`
    /// Default: empty (uploads disabled).
    pub cloudinary_upload_preset: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(15),
            data_dir: None,
            invite_code_attempts: 5,
            cloudinary_cloud_name: String::new(),
            cloudinary_upload_preset: String::new(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("RANKBAIT_WRITE_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.write_timeout = Duration::from_millis(ms),
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid RANKBAIT_WRITE_TIMEOUT_MS, using default"
                    );
                }
            }
        }

        if let Some(dir) = lookup("RANKBAIT_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(val) = lookup("RANKBAIT_INVITE_ATTEMPTS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.invite_code_attempts = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid RANKBAIT_INVITE_ATTEMPTS, using default"
                    );
                }
            }
        }

        if let Some(name) = lookup("CLOUDINARY_CLOUD_NAME") {
            config.cloudinary_cloud_name = name;
        }

        if let Some(preset) = lookup("CLOUDINARY_UPLOAD_PRESET") {
            config.cloudinary_upload_preset = preset;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// Whether image uploads can be attempted.
    pub fn uploads_enabled(&self) -> bool {
        !self.cloudinary_cloud_name.is_empty() && !self.cloudinary_upload_preset.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.write_timeout, Duration::from_secs(15));
        assert_eq!(config.invite_code_attempts, 5);
        assert!(!config.uploads_enabled());
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("RANKBAIT_WRITE_TIMEOUT_MS", "2500"),
            ("RANKBAIT_DATA_DIR", "/tmp/rankbait"),
            ("RANKBAIT_INVITE_ATTEMPTS", "9"),
            ("CLOUDINARY_CLOUD_NAME", "demo"),
            ("CLOUDINARY_UPLOAD_PRESET", "unsigned"),
        ]));
        assert_eq!(config.write_timeout, Duration::from_millis(2500));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/rankbait")));
        assert_eq!(config.invite_code_attempts, 9);
        assert!(config.uploads_enabled());
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("RANKBAIT_WRITE_TIMEOUT_MS", "soon"),
            ("RANKBAIT_INVITE_ATTEMPTS", "0"),
        ]));
        assert_eq!(config.write_timeout, Duration::from_secs(15));
        assert_eq!(config.invite_code_attempts, 5);
    }
}
