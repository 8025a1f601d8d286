// src/tracker/filter.rs

use std::fmt;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::{FleetError, Result};

/// Compiled set of program-path globs that are never tracked
/// (controller system libraries and the like).
#[derive(Clone)]
pub struct ProgramFilter {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for ProgramFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramFilter")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl ProgramFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                FleetError::ConfigError(format!("invalid skip_program_globs entry '{pattern}': {e}"))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| FleetError::ConfigError(format!("building program filter: {e}")))?;

        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    /// Filter that skips nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// `*` also matches across `/`, so a `DIR/*` pattern covers the whole
    /// subtree.
    pub fn is_skipped(&self, program_path: &str) -> bool {
        self.set.is_match(program_path)
    }
}

/// Last segment of a controller program path: `//CNC_MEM/USER/O1234` → `O1234`.
///
/// A path ending in `/` names no program and yields `""`.
pub fn program_name(program_path: &str) -> &str {
    program_path
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim()
}
