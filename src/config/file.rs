use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

use crate::session::Limits;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const CODE_ALPHABET: u128 = 26;
const MAX_CODE_LENGTH: usize = 16;

// -----------------------------------------------------------------------------
// ----- FileConfig ------------------------------------------------------------

/// Contents of the optional TOML file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub limits: Limits,
}

// -----------------------------------------------------------------------------
// ----- FileConfig: Static ----------------------------------------------------

impl FileConfig {
    /// Init-time load: the caller panics on error. Do not continue with a bad state.
    pub async fn from_file_async(path: &Path) -> Result<FileConfig, ConfigError> {
        let raw = fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<FileConfig, ConfigError> {
        let doc: ConfigFile = toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;

        let defaults = Limits::default();
        let section = doc.limits;

        let limits = Limits {
            max_sessions: section.max_sessions.unwrap_or(defaults.max_sessions),
            max_members_per_session: section
                .max_members_per_session
                .unwrap_or(defaults.max_members_per_session),
            outbound_queue: section.outbound_queue.unwrap_or(defaults.outbound_queue),
            code_length: section.code_length.unwrap_or(defaults.code_length),
            rejection_grace: section.rejection_grace.unwrap_or(defaults.rejection_grace),
        };

        validate(&limits)?;

        Ok(FileConfig { limits })
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    limits: LimitsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitsSection {
    #[serde(default)]
    max_sessions: Option<usize>,

    #[serde(default, alias = "max_members")]
    max_members_per_session: Option<usize>,

    #[serde(default)]
    outbound_queue: Option<usize>,

    #[serde(default)]
    code_length: Option<usize>,

    // humantime, e.g. "5s" or "250ms"
    #[serde(default, deserialize_with = "de_humantime")]
    rejection_grace: Option<Duration>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate(limits: &Limits) -> Result<(), ConfigError> {
    let positive = [
        ("max_sessions", limits.max_sessions),
        ("max_members_per_session", limits.max_members_per_session),
        ("outbound_queue", limits.outbound_queue),
        ("code_length", limits.code_length),
    ];

    for (field, value) in positive {
        if value == 0 {
            return Err(ConfigError::InvalidField(field.into()));
        }
    }

    if limits.code_length > MAX_CODE_LENGTH {
        return Err(ConfigError::InvalidField("code_length".into()));
    }

    // Generation only terminates quickly when most codes are free.
    let space = CODE_ALPHABET.pow(limits.code_length as u32);
    if space < (limits.max_sessions as u128) * 2 {
        return Err(ConfigError::CodeSpaceTooSmall {
            code_length: limits.code_length,
            max_sessions: limits.max_sessions,
        });
    }

    Ok(())
}

fn de_humantime<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<String> = Option::deserialize(d)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(D::Error::custom))
        .transpose()
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid or zero field '{0}'")]
    InvalidField(String),

    #[error("code_length {code_length} leaves too few codes for {max_sessions} sessions")]
    CodeSpaceTooSmall {
        code_length: usize,
        max_sessions: usize,
    },

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn reads_every_limit() {
        let toml = r#"
            [limits]
            max_sessions = 20
            max_members_per_session = 8
            outbound_queue = 32
            code_length = 6
            rejection_grace = "250ms"
        "#;

        let tmp = write_tmp(toml);
        let cfg = FileConfig::from_file_async(tmp.path()).await.unwrap();

        assert_eq!(
            cfg.limits,
            Limits {
                max_sessions: 20,
                max_members_per_session: 8,
                outbound_queue: 32,
                code_length: 6,
                rejection_grace: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn missing_keys_take_defaults() {
        let cfg = FileConfig::parse("[limits]\nmax_sessions = 3\n").unwrap();

        assert_eq!(cfg.limits.max_sessions, 3);
        assert_eq!(cfg.limits.max_members_per_session, 5);
        assert_eq!(cfg.limits.rejection_grace, Duration::from_secs(5));

        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::default());
    }

    #[test]
    fn short_alias_for_members() {
        let cfg = FileConfig::parse("[limits]\nmax_members = 2\n").unwrap();
        assert_eq!(cfg.limits.max_members_per_session, 2);
    }

    #[test]
    fn zero_values_are_rejected() {
        for field in ["max_sessions", "max_members_per_session", "outbound_queue", "code_length"] {
            let raw = format!("[limits]\n{field} = 0\n");
            let err = FileConfig::parse(&raw).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidField(ref f) if f == field), "{field}: {err}");
        }
    }

    #[test]
    fn tiny_code_space_is_rejected() {
        let err = FileConfig::parse("[limits]\ncode_length = 1\nmax_sessions = 20\n").unwrap_err();
        assert!(matches!(err, ConfigError::CodeSpaceTooSmall { .. }));

        assert!(FileConfig::parse("[limits]\ncode_length = 1\nmax_sessions = 13\n").is_ok());
    }

    #[test]
    fn bad_duration_and_unknown_keys_fail() {
        let err = FileConfig::parse("[limits]\nrejection_grace = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));

        let err = FileConfig::parse("[limits]\nmax_rooms = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = FileConfig::from_file_async(Path::new("/definitely/not/here.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
