use std::path::PathBuf;

use envconfig::Envconfig;
use lazy_static::lazy_static;

#[derive(Debug, Envconfig)]
pub struct Config {
    #[envconfig(from = "DFILE_LOG_LEVEL", default = "info")]
    pub log_level: String,
    /// Directory the .dff/.dfa files are written to when no `-d` is given
    #[envconfig(from = "DFILE_OUTPUT_DIR", default = ".")]
    pub output_dir: PathBuf,
    /// Model name used when neither `-m` nor `-o` is given
    #[envconfig(from = "DFILE_DEFAULT_MODEL")]
    pub default_model: Option<String>,
}

impl Config {
    pub fn init() -> Config {
        Config::init_from_env().expect("Failed to load config")
    }
}

lazy_static! {
    pub static ref CONFIG: Config = Config::init();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use envconfig::Envconfig;

    use super::Config;

    #[test]
    fn defaults_apply_without_environment() {
        let config = Config::init_from_hashmap(&HashMap::new()).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.output_dir, std::path::PathBuf::from("."));
        assert!(config.default_model.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut env = HashMap::new();
        env.insert("DFILE_LOG_LEVEL".to_string(), "debug".to_string());
        env.insert("DFILE_OUTPUT_DIR".to_string(), "/tmp/out".to_string());
        env.insert("DFILE_DEFAULT_MODEL".to_string(), "soils".to_string());

        let config = Config::init_from_hashmap(&env).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.output_dir, std::path::PathBuf::from("/tmp/out"));
        assert_eq!(config.default_model.as_deref(), Some("soils"));
    }
}
