use std::path::PathBuf;

/// Process-level settings for the demo binary. Engine tuning lives in
/// [`crate::fluency::config::EngineConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Enables the engine and audit log files when set.
    pub log_dir: Option<PathBuf>,
    pub database_url: Option<String>,
    pub engine_config_path: Option<PathBuf>,
    pub demo_sessions: u32,
    pub demo_student: String,
    pub demo_accuracy: f64,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_level = non_empty("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let log_dir = non_empty("FLUENCY_LOG_DIR").map(PathBuf::from);
        let database_url = non_empty("FLUENCY_DATABASE_URL");
        let engine_config_path = non_empty("FLUENCY_CONFIG_PATH").map(PathBuf::from);
        let demo_sessions = non_empty("FLUENCY_DEMO_SESSIONS")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(6);
        let demo_student = non_empty("FLUENCY_DEMO_STUDENT").unwrap_or_else(|| "demo-student".to_string());
        let demo_accuracy = non_empty("FLUENCY_DEMO_ACCURACY")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| (0.0..=1.0).contains(v))
            .unwrap_or(0.9);

        Self {
            log_level,
            log_dir,
            database_url,
            engine_config_path,
            demo_sessions,
            demo_student,
            demo_accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert!(config.log_dir.is_none());
        assert!(config.engine_config_path.is_none());
        assert_eq!(config.demo_sessions, 6);
        assert!((config.demo_accuracy - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = Config::from_lookup(|key| match key {
            "FLUENCY_DEMO_SESSIONS" => Some("many".to_string()),
            "FLUENCY_DEMO_ACCURACY" => Some("1.5".to_string()),
            "FLUENCY_DATABASE_URL" => Some("  ".to_string()),
            "FLUENCY_LOG_DIR" => Some("/var/log/fluency".to_string()),
            _ => None,
        });
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/fluency")));
        assert_eq!(config.demo_sessions, 6);
        assert!((config.demo_accuracy - 0.9).abs() < 1e-9);
        assert!(config.database_url.is_none());
    }
}
