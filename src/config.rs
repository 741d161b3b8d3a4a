//! INI-backed configuration for the filtering engine and the drain.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use dirveil_hook::{DrainConfig, FailMode, resolve::LINK_HOP_BOUND};

const SECTION: &str = "dirveil";

#[derive(Debug, Clone)]
pub struct Config {
    /// What an unresolvable path contributes to the hide decision.
    /// `Open` (the default) keeps such records visible.
    pub fail_mode: FailMode,
    /// Cap on indirection-chain resolution.
    pub max_link_hops: usize,
    /// Sleep between drain polls during uninstall.
    pub drain_poll: Duration,
    /// Optional upper bound on the drain; exceeded means a leaked
    /// in-flight call. Meant for test deployments, unbounded by default.
    pub drain_bound: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fail_mode: FailMode::Open,
            max_link_hops: LINK_HOP_BOUND,
            drain_poll: Duration::from_millis(2),
            drain_bound: None,
        }
    }
}

impl Config {
    /// Load the `[dirveil]` section of an INI file; missing keys keep
    /// their defaults, unknown keys are rejected.
    pub fn from_file(path: &str) -> Result<Self> {
        let ini = ini::Ini::load_from_file(path)
            .with_context(|| format!("Error loading configuration from {path}"))?;

        let mut config = Config::default();
        let Some(section) = ini.section(Some(SECTION)) else {
            return Ok(config);
        };
        for (key, value) in section.iter() {
            log::debug!("{SECTION}.{key}={value}");
            match key {
                "fail_mode" => config.fail_mode = parse_fail_mode(value)?,
                "max_link_hops" => {
                    config.max_link_hops = value
                        .parse()
                        .with_context(|| format!("invalid max_link_hops {value:?}"))?;
                }
                "drain_poll_ms" => {
                    let ms: u64 = value
                        .parse()
                        .with_context(|| format!("invalid drain_poll_ms {value:?}"))?;
                    config.drain_poll = Duration::from_millis(ms);
                }
                "drain_bound_ms" => {
                    let ms: u64 = value
                        .parse()
                        .with_context(|| format!("invalid drain_bound_ms {value:?}"))?;
                    config.drain_bound = Some(Duration::from_millis(ms));
                }
                other => bail!("unknown configuration key {other:?}"),
            }
        }
        Ok(config)
    }

    pub fn drain(&self) -> DrainConfig {
        DrainConfig {
            poll: self.drain_poll,
            bound: self.drain_bound,
        }
    }
}

fn parse_fail_mode(value: &str) -> Result<FailMode> {
    match value {
        "open" => Ok(FailMode::Open),
        "closed" => Ok(FailMode::Closed),
        other => bail!("invalid fail_mode {other:?}, expected \"open\" or \"closed\""),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{env, fs};

    fn write_config(name: &str, contents: &str) -> String {
        let path = env::temp_dir().join(format!("dirveil-{}-{name}.ini", std::process::id()));
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn defaults_apply_when_section_is_missing() {
        let path = write_config("empty", "[other]\nkey=value\n");
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.fail_mode, FailMode::Open);
        assert_eq!(config.max_link_hops, LINK_HOP_BOUND);
        assert_eq!(config.drain_bound, None);
    }

    #[test]
    fn keys_override_defaults() {
        let path = write_config(
            "full",
            "[dirveil]\nfail_mode=closed\nmax_link_hops=10\ndrain_poll_ms=5\ndrain_bound_ms=2000\n",
        );
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.fail_mode, FailMode::Closed);
        assert_eq!(config.max_link_hops, 10);
        assert_eq!(config.drain_poll, Duration::from_millis(5));
        assert_eq!(config.drain_bound, Some(Duration::from_millis(2000)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_config("unknown", "[dirveil]\nmystery=1\n");
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn invalid_fail_mode_is_rejected() {
        let path = write_config("badmode", "[dirveil]\nfail_mode=maybe\n");
        assert!(Config::from_file(&path).is_err());
    }
}
