//! Module option loading.
//!
//! Hardware modules are configured with a flat table of options. The table can sit
//! at the top level of a TOML file or under `[<module>.options]`, mirroring how a
//! station file lists several modules:
//!
//! ```toml
//! [hamamatsu_imagem_x2.options]
//! dll_location = 'C:\dcam\dlls'
//! default_exposure = 0.5
//! ```
//!
//! Values are merged in order: serde defaults, then the file, then environment
//! variables with the module's prefix (e.g. `DAQ_IMAGEM_DEFAULT_GAIN=2.0`).

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::debug;

/// Options that can be checked after extraction.
pub trait ValidateOptions {
    /// Reject values that parse but are unusable.
    fn validate(&self) -> AppResult<()>;
}

/// Build the figment for a module's options.
///
/// `section` selects the `[<section>.options]` table when present; otherwise the
/// whole file is used as the option table.
pub fn module_figment(path: &Path, section: &str, env_prefix: &str) -> Figment {
    let file = Figment::from(Toml::file(path));
    let nested = format!("{}.options", section);
    let base = if file.find_value(&nested).is_ok() {
        file.focus(&nested)
    } else {
        file
    };
    base.merge(Env::prefixed(env_prefix))
}

/// Load and validate a module's options from a TOML file.
pub fn load_options<T>(path: &Path, section: &str, env_prefix: &str) -> AppResult<T>
where
    T: DeserializeOwned + ValidateOptions,
{
    if !path.exists() {
        return Err(DaqError::Configuration(format!(
            "config file not found: {}",
            path.display()
        )));
    }

    debug!("Loading '{}' options from {}", section, path.display());
    let options: T = module_figment(path, section, env_prefix).extract()?;
    options.validate()?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Options {
        port: String,
        #[serde(default = "default_rate")]
        rate: f64,
    }

    fn default_rate() -> f64 {
        1.0
    }

    impl ValidateOptions for Options {
        fn validate(&self) -> AppResult<()> {
            if self.rate <= 0.0 {
                return Err(DaqError::Configuration("rate must be positive".into()));
            }
            Ok(())
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_top_level_table() {
        let file = write_config("port = \"COM3\"\n");
        let opts: Options = load_options(file.path(), "dev", "DAQ_TEST_TOP_").unwrap();
        assert_eq!(opts.port, "COM3");
        assert!((opts.rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn loads_nested_options_table() {
        let file = write_config("[dev.options]\nport = \"COM4\"\nrate = 2.5\n");
        let opts: Options = load_options(file.path(), "dev", "DAQ_TEST_NESTED_").unwrap();
        assert_eq!(opts.port, "COM4");
        assert!((opts.rate - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn environment_overrides_file() {
        let mut table = toml::Table::new();
        table.insert("port".into(), "COM5".into());
        table.insert("rate".into(), 4.0.into());
        let file = write_config(&toml::to_string(&table).unwrap());

        std::env::set_var("DAQ_TEST_ENV_RATE", "8.0");
        let opts: Options = load_options(file.path(), "dev", "DAQ_TEST_ENV_").unwrap();
        std::env::remove_var("DAQ_TEST_ENV_RATE");

        assert_eq!(opts.port, "COM5");
        assert!((opts.rate - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_required_key_is_config_error() {
        let file = write_config("rate = 2.0\n");
        let err = load_options::<Options>(file.path(), "dev", "DAQ_TEST_MISSING_").unwrap_err();
        assert!(matches!(err, DaqError::Config(_)));
    }

    #[test]
    fn validation_runs_after_extract() {
        let file = write_config("port = \"COM3\"\nrate = -1.0\n");
        let err = load_options::<Options>(file.path(), "dev", "DAQ_TEST_INVALID_").unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_options::<Options>(
            Path::new("/nonexistent/dev.toml"),
            "dev",
            "DAQ_TEST_NOFILE_",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
