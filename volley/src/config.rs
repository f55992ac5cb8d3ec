use std::{env, fmt::Display, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::ConfigError;

pub const DEFAULT_VIRTUAL_USERS: usize = 1;
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);

/// How many virtual users run, for how long, and how fast each of them loops.
///
/// Created once before the run and read-only afterwards.
///
/// ```rust
/// use std::time::Duration;
/// use volley::RunConfig;
///
/// let config = RunConfig::builder()
///     .virtual_users(20)
///     .duration(Duration::from_secs(20))
///     .pacing(Duration::from_millis(250))
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct RunConfig {
    /// Number of concurrent workers. Must be at least 1.
    pub virtual_users: usize,
    /// Wall-clock length of the run. A zero duration yields an empty run.
    pub duration: Duration,
    /// Delay each worker waits between two of its own iterations.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub pacing: Option<Duration>,
    /// Base seed for the per-worker random parameter generators.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            virtual_users: DEFAULT_VIRTUAL_USERS,
            duration: DEFAULT_DURATION,
            pacing: None,
            seed: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virtual_users == 0 {
            return Err(ConfigError::NoVirtualUsers);
        }
        Ok(())
    }

    /// Reads `<PREFIX>_VUS`, `<PREFIX>_DURATION_MS`, `<PREFIX>_PACING_MS` and
    /// `<PREFIX>_SEED` from the process environment. Missing variables fall
    /// back to the defaults.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |name| env::var(name).ok())
    }

    /// Same as [`RunConfig::from_env`] but with a custom variable source.
    pub fn from_lookup<L>(prefix: &str, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| format!("{prefix}_{suffix}");

        let virtual_users =
            parse_var::<usize, _>(&var("VUS"), &lookup)?.unwrap_or(DEFAULT_VIRTUAL_USERS);
        let duration = parse_var::<u64, _>(&var("DURATION_MS"), &lookup)?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DURATION);
        let pacing = parse_var::<u64, _>(&var("PACING_MS"), &lookup)?.map(Duration::from_millis);
        let seed = parse_var::<u64, _>(&var("SEED"), &lookup)?;

        let config = Self {
            virtual_users,
            duration,
            pacing,
            seed,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, L>(name: &str, lookup: &L) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    L: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Env {
                name: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn builder_defaults_leave_pacing_and_seed_empty() {
        let config = RunConfig::builder()
            .virtual_users(3)
            .duration(Duration::from_secs(1))
            .build();

        assert_eq!(config.pacing, None);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn zero_virtual_users_is_rejected() {
        let config = RunConfig::builder()
            .virtual_users(0)
            .duration(Duration::from_secs(1))
            .build();

        assert_eq!(config.validate(), Err(ConfigError::NoVirtualUsers));
    }

    #[test]
    fn zero_duration_is_accepted() {
        let config = RunConfig::builder()
            .virtual_users(5)
            .duration(Duration::ZERO)
            .build();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_values_override_defaults() {
        let config = RunConfig::from_lookup(
            "LOAD",
            lookup(&[
                ("LOAD_VUS", "20"),
                ("LOAD_DURATION_MS", "20000"),
                ("LOAD_PACING_MS", " 50 "),
                ("LOAD_SEED", "7"),
            ]),
        )
        .expect("config should build");

        assert_eq!(config.virtual_users, 20);
        assert_eq!(config.duration, Duration::from_secs(20));
        assert_eq!(config.pacing, Some(Duration::from_millis(50)));
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn missing_env_falls_back_to_defaults() {
        let config = RunConfig::from_lookup("LOAD", lookup(&[])).expect("config should build");

        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn unparsable_env_names_the_variable() {
        let err = RunConfig::from_lookup("LOAD", lookup(&[("LOAD_VUS", "many")]))
            .expect_err("expected a parse error");

        assert!(matches!(err, ConfigError::Env { ref name, .. } if name == "LOAD_VUS"));
    }

    #[test]
    fn env_with_zero_users_fails_validation() {
        let err = RunConfig::from_lookup("LOAD", lookup(&[("LOAD_VUS", "0")]))
            .expect_err("expected validation error");

        assert_eq!(err, ConfigError::NoVirtualUsers);
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let config: RunConfig =
            serde_json::from_str(r#"{"virtual_users":2,"duration":{"secs":1,"nanos":0}}"#)
                .expect("valid json");

        assert_eq!(config.virtual_users, 2);
        assert_eq!(config.pacing, None);
    }
}
