//! Executor configuration
//!
//! Priority: environment variables > config file > defaults.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Environment variable selecting the execution mode
pub const ENV_MODE: &str = "DUET_MODE";
/// Environment variable enabling cross-checking of both modes
pub const ENV_CROSS_CHECK: &str = "DUET_CROSS_CHECK";
/// Environment variable capping the membership bitset span
pub const ENV_MAX_BITSET_BITS: &str = "DUET_MAX_BITSET_BITS";
/// Environment variable selecting the code generator optimization level
pub const ENV_OPT_LEVEL: &str = "DUET_OPT_LEVEL";
/// Environment variable enabling the IR verifier
pub const ENV_VERIFY_IR: &str = "DUET_VERIFY_IR";

/// Default cap on the span of a membership bitset (512 MiB of words)
pub const DEFAULT_MAX_BITSET_BITS: u64 = 1 << 32;

/// How queries are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Tree-walking interpretation, one row combination at a time
    #[default]
    Interpret,
    /// One native function per query
    Compile,
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpret" | "interpreted" | "t" => Ok(Self::Interpret),
            "compile" | "compiled" | "jit" | "l" => Ok(Self::Compile),
            other => Err(Error::config(format!("unknown execution mode `{other}`"))),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpret => write!(f, "interpret"),
            Self::Compile => write!(f, "compile"),
        }
    }
}

/// Code generator optimization level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    /// No optimization
    None,
    /// Optimize for speed
    #[default]
    Speed,
    /// Optimize for speed and code size
    SpeedAndSize,
}

impl OptLevel {
    /// Value of the `opt_level` code generator setting
    pub fn as_setting(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Speed => "speed",
            Self::SpeedAndSize => "speed_and_size",
        }
    }
}

impl FromStr for OptLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(Self::None),
            "1" | "2" | "speed" => Ok(Self::Speed),
            "3" | "speed_and_size" => Ok(Self::SpeedAndSize),
            other => Err(Error::config(format!("unknown optimization level `{other}`"))),
        }
    }
}

/// Code generator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Optimization level
    pub opt_level: OptLevel,
    /// Run the IR verifier on every generated function
    pub verify: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::Speed,
            verify: cfg!(debug_assertions),
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Execution mode
    pub mode: ExecutionMode,
    /// Run both modes and fail on any difference
    pub cross_check: bool,
    /// Largest bit span a membership bitset may cover
    pub max_bitset_bits: u64,
    /// Code generator settings
    pub jit: JitConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Interpret,
            cross_check: false,
            max_bitset_bits: DEFAULT_MAX_BITSET_BITS,
            jit: JitConfig::default(),
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("{name}: expected a boolean, got `{other}`"))),
    }
}

impl ExecutorConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!("Loaded executor configuration from {:?}", path);
        Ok(config)
    }

    /// Defaults overridden by `DUET_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Config file (when given and present) overridden by environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::debug!("Executor config file not found: {:?}", path);
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `DUET_*` environment variables on top of the current values
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(cross_check) = lookup(ENV_CROSS_CHECK) {
            self.cross_check = parse_bool(ENV_CROSS_CHECK, &cross_check)?;
        }
        if let Some(bits) = lookup(ENV_MAX_BITSET_BITS) {
            self.max_bitset_bits = bits.trim().parse().map_err(|e| {
                Error::config(format!("{ENV_MAX_BITSET_BITS}: invalid value `{bits}`: {e}"))
            })?;
        }
        if let Some(level) = lookup(ENV_OPT_LEVEL) {
            self.jit.opt_level = level.parse()?;
        }
        if let Some(verify) = lookup(ENV_VERIFY_IR) {
            self.jit.verify = parse_bool(ENV_VERIFY_IR, &verify)?;
        }
        self.validate()
    }

    /// Reject values no query could run with
    pub fn validate(&self) -> Result<()> {
        if self.max_bitset_bits == 0 {
            return Err(Error::config("max_bitset_bits must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.mode, ExecutionMode::Interpret);
        assert!(!config.cross_check);
        assert_eq!(config.max_bitset_bits, 1 << 32);
        assert_eq!(config.jit.opt_level, OptLevel::Speed);
    }

    #[test]
    fn test_toml_partial_document() {
        let config = ExecutorConfig::from_toml_str(
            r#"
            mode = "compile"

            [jit]
            opt_level = "speed_and_size"
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, ExecutionMode::Compile);
        assert_eq!(config.jit.opt_level, OptLevel::SpeedAndSize);
        assert!(!config.cross_check);
        assert_eq!(config.max_bitset_bits, DEFAULT_MAX_BITSET_BITS);
    }

    #[test]
    fn test_toml_invalid_mode() {
        let err = ExecutorConfig::from_toml_str(r#"mode = "vectorized""#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_zero_bitset_cap_rejected() {
        let err = ExecutorConfig::from_toml_str("max_bitset_bits = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_bitset_bits = 0").unwrap();
        let err = ExecutorConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_file_then_env_priority() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode = \"compile\"\ncross_check = true\nmax_bitset_bits = 4096").unwrap();

        let mut config = ExecutorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.mode, ExecutionMode::Compile);
        assert_eq!(config.max_bitset_bits, 4096);

        let env = vars(&[(ENV_MODE, "interpret"), (ENV_OPT_LEVEL, "0")]);
        config.apply_overrides(|name| env.get(name).cloned()).unwrap();
        assert_eq!(config.mode, ExecutionMode::Interpret);
        assert_eq!(config.jit.opt_level, OptLevel::None);
        // untouched by the environment
        assert!(config.cross_check);
        assert_eq!(config.max_bitset_bits, 4096);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExecutorConfig::load(Some(&dir.path().join("duet.toml"))).unwrap();
        assert_eq!(config.max_bitset_bits, DEFAULT_MAX_BITSET_BITS);
    }

    #[test]
    fn test_env_overrides() {
        let env = vars(&[
            (ENV_MODE, "l"),
            (ENV_CROSS_CHECK, "yes"),
            (ENV_MAX_BITSET_BITS, "1024"),
            (ENV_OPT_LEVEL, "3"),
            (ENV_VERIFY_IR, "true"),
        ]);
        let mut config = ExecutorConfig::default();
        config.apply_overrides(|name| env.get(name).cloned()).unwrap();
        assert_eq!(config.mode, ExecutionMode::Compile);
        assert!(config.cross_check);
        assert_eq!(config.max_bitset_bits, 1024);
        assert_eq!(config.jit.opt_level, OptLevel::SpeedAndSize);
        assert!(config.jit.verify);
    }

    #[test]
    fn test_invalid_env_values() {
        for (name, value) in [
            (ENV_MODE, "fast"),
            (ENV_CROSS_CHECK, "maybe"),
            (ENV_MAX_BITSET_BITS, "-1"),
            (ENV_MAX_BITSET_BITS, "0"),
            (ENV_OPT_LEVEL, "7"),
        ] {
            let env = vars(&[(name, value)]);
            let err = ExecutorConfig::default()
                .apply_overrides(|n| env.get(n).cloned())
                .unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{name}={value}");
        }
    }

    #[test]
    fn test_opt_level_setting_names() {
        assert_eq!(OptLevel::None.as_setting(), "none");
        assert_eq!("2".parse::<OptLevel>().unwrap().as_setting(), "speed");
        assert_eq!(OptLevel::SpeedAndSize.as_setting(), "speed_and_size");
    }
}
