//! Execution profiles, loaded from TOML.
//!
//! Three profiles cover the three kinds of runs the worker performs:
//! `submission` for candidate code, `compile` for the parse-and-lookup
//! gate, and `generator` for trusted problem-authored scripts.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::executer::ExecutionLimits;

/// Baked-in profile definitions, used when no override path is given
const DEFAULT_PROFILES: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/profiles.toml"));

#[derive(Debug, Deserialize)]
struct RawProfile {
    time_ms: u32,
    max_output_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct RawProfiles {
    submission: RawProfile,
    compile: RawProfile,
    generator: RawProfile,
}

impl From<RawProfile> for ExecutionLimits {
    fn from(raw: RawProfile) -> Self {
        ExecutionLimits {
            time_ms: raw.time_ms,
            max_output_bytes: raw.max_output_bytes,
        }
    }
}

/// Limits per kind of run
#[derive(Debug, Clone)]
pub struct Profiles {
    pub submission: ExecutionLimits,
    pub compile: ExecutionLimits,
    pub generator: ExecutionLimits,
}

static PROFILES: OnceLock<Profiles> = OnceLock::new();

/// Initialize the global profiles, from a TOML file when a path is given,
/// otherwise from the baked-in defaults.
pub fn init_profiles(path: Option<&str>) -> Result<()> {
    let profiles = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read profiles config: {}", path))?;
            parse_profiles(&content)
                .with_context(|| format!("Failed to parse profiles config: {}", path))?
        }
        None => parse_profiles(DEFAULT_PROFILES).context("Failed to parse built-in profiles")?,
    };
    PROFILES
        .set(profiles)
        .map_err(|_| anyhow::anyhow!("Profiles already initialized"))
}

fn parse_profiles(content: &str) -> Result<Profiles> {
    let raw: RawProfiles = toml::from_str(content)?;
    Ok(Profiles {
        submission: raw.submission.into(),
        compile: raw.compile.into(),
        generator: raw.generator.into(),
    })
}

/// Get the active profiles, falling back to the baked-in defaults when
/// `init_profiles` was never called.
pub fn get_profiles() -> &'static Profiles {
    PROFILES.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<Profiles> = OnceLock::new();
        DEFAULT.get_or_init(|| {
            parse_profiles(DEFAULT_PROFILES).unwrap_or_else(|e| {
                warn!("Built-in profiles failed to parse ({}), using hard defaults", e);
                Profiles::hard_defaults()
            })
        })
    })
}

impl Profiles {
    fn hard_defaults() -> Self {
        Profiles {
            submission: ExecutionLimits {
                time_ms: 5_000,
                max_output_bytes: 1 << 20,
            },
            compile: ExecutionLimits {
                time_ms: 2_000,
                max_output_bytes: 64 * 1024,
            },
            generator: ExecutionLimits {
                time_ms: 30_000,
                max_output_bytes: 8 << 20,
            },
        }
    }
}
