//! Configuration bootstrap shared by every entry point.

use std::path::Path;

use crate::{Config, Error, Result};

/// Resolve the config file path: explicit > env var > CWD > /config/ mount
fn config_path(explicit: Option<&Path>) -> Option<String> {
    if let Some(path) = explicit {
        return Some(path.to_string_lossy().into_owned());
    }

    std::env::var("GRAMGRAB_CONFIG_PATH")
        .ok()
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            ["config.yaml", "/config/config.yaml"]
                .into_iter()
                .find(|p| Path::new(p).exists())
                .map(str::to_string)
        })
}

/// Load and validate configuration.
///
/// Logging is not initialised yet when this runs, so progress is reported
/// on stderr.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match config_path(explicit) {
        Some(path) => {
            if !Path::new(&path).exists() {
                return Err(Error::InvalidConfig(format!("config file {path} does not exist")));
            }
            eprintln!("Loading config from {path}");
            Config::from_file(&path)?
        }
        None => Config::from_env()?,
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("Config validation error: {error}");
        }
        return Err(Error::InvalidConfig(format!(
            "validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        )));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/gramgrab.yaml"))).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "logging:\n  level: loud").unwrap();

        let err = load_config(Some(file.path())).unwrap_err();
        match err {
            Error::InvalidConfig(msg) => assert!(msg.contains("logging.level")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
