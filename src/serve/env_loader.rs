//! `.env` file loading.

use std::path::Path;

use tracing::debug;

/// Load `.env`, then `.env.<environment>`, from the application root.
///
/// `environment` is asked for the name only after `.env` is applied, so
/// `.env` may select the environment. Variables already set in the
/// process win over `.env`; the environment-specific file overrides both.
/// Returns how many variables were set.
pub fn load_env_files<F>(folder: &Path, environment: F) -> usize
where
    F: FnOnce() -> String,
{
    let base = load_env_file(folder, ".env", false);
    let name = environment();
    base + load_env_file(folder, &format!(".env.{}", name), true)
}

/// Load a single env file. A missing or unreadable file sets nothing.
pub fn load_env_file(folder: &Path, filename: &str, override_existing: bool) -> usize {
    let Ok(content) = std::fs::read_to_string(folder.join(filename)) else {
        return 0;
    };

    let mut applied = 0;
    for (key, value) in parse_env(&content) {
        if override_existing || std::env::var(&key).is_err() {
            std::env::set_var(&key, value);
            applied += 1;
        }
    }
    debug!("Loaded {} variable(s) from {}", applied, filename);
    applied
}

/// `KEY=value` pairs, skipping blanks and `#` comments. Values may be
/// quoted and lines may start with `export`.
pub fn parse_env(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            let value = value.trim().trim_matches('"').trim_matches('\'');
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
