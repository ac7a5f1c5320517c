use std::{
    convert::Infallible,
    fmt,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    str::FromStr,
};

use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_SEARCH_PATH: Lazy<SearchPath> = Lazy::new(|| SearchPath::from("/bin:/usr/bin"));

/// Ordered directories a bare program name is looked up in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// First executable `dir/program` in listed order. Names containing a
    /// slash bypass the lookup.
    pub fn resolve(&self, program: &str) -> Option<PathBuf> {
        if program.is_empty() {
            return None;
        }

        if program.contains('/') {
            return Some(PathBuf::from(program));
        }

        self.dirs
            .iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    /// Value for the `PATH` variable handed to children.
    pub fn to_env(&self) -> String {
        self.dirs.iter().map(|dir| dir.display()).join(":")
    }
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

impl Default for SearchPath {
    fn default() -> Self {
        DEFAULT_SEARCH_PATH.clone()
    }
}

impl From<&str> for SearchPath {
    fn from(value: &str) -> Self {
        Self::new(value.split(':').filter(|dir| !dir.is_empty()))
    }
}

impl From<String> for SearchPath {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<SearchPath> for String {
    fn from(value: SearchPath) -> Self {
        value.to_env()
    }
}

impl FromStr for SearchPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_env())
    }
}
