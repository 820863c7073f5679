//! Edits the `ingress` rules of a cloudflared config file.
//!
//! Every operation reads the file fresh, changes the rule list and writes the
//! whole document back. On the way out the list is normalized so that exactly
//! one `http_status:404` catch-all rule sits at the end.

use std::{fs, io::ErrorKind, path::Path};

use tracing::{debug, info};

mod config;
mod error;
mod util;

pub use config::{CatchAll, IngressRule, LocalConfig, Route, CATCH_ALL_SERVICE};
pub use error::Error;

/// Reads the config at `path`, or an empty one if the file doesn't exist.
///
/// Content that can't be parsed is an error; it is never replaced by defaults.
pub fn load(path: &Path) -> Result<LocalConfig, Error> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let config = LocalConfig::parse(path, &contents)?;
            debug!(
                path = %path.display(),
                rules = config.rules().len(),
                "Loaded ingress config"
            );
            Ok(config)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config found, starting empty");
            Ok(LocalConfig::default())
        }
        Err(source) => Err(Error::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Normalizes the catch-all rule and replaces the file at `path`.
pub fn save(path: &Path, mut config: LocalConfig) -> Result<(), Error> {
    config.normalize();
    let contents = config.to_yaml_string()?;
    util::write_atomic(path, contents.as_bytes())?;
    debug!(
        path = %path.display(),
        rules = config.rules().len(),
        "Wrote ingress config"
    );
    Ok(())
}

/// Routes `hostname` to `service`, replacing any existing rule for it.
///
/// The new rule is placed ahead of every other rule.
pub fn upsert_route(path: &Path, hostname: &str, service: &str) -> Result<(), Error> {
    let mut config = load(path)?;
    config.upsert(hostname, service);
    save(path, config)?;
    info!(hostname, service, "Added route");
    Ok(())
}

/// Removes every rule for `hostname`. A hostname with no rules is not an error.
pub fn remove_route(path: &Path, hostname: &str) -> Result<(), Error> {
    let mut config = load(path)?;
    let removed = config.remove(hostname);
    save(path, config)?;
    info!(hostname, removed, "Removed route");
    Ok(())
}
