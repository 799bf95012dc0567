//! Ready units and the in-flight set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// A document unit that passed debounce and pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyUnit {
    /// A single document.
    Single(PathBuf),
    /// A primary document with its companion metadata file.
    Pair {
        primary: PathBuf,
        companion: PathBuf,
    },
}

impl ReadyUnit {
    /// All paths in this unit.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            Self::Single(path) => vec![path.as_path()],
            Self::Pair { primary, companion } => vec![primary.as_path(), companion.as_path()],
        }
    }

    /// The document that names the unit in logs.
    #[must_use]
    pub fn primary(&self) -> &Path {
        match self {
            Self::Single(path) => path,
            Self::Pair { primary, .. } => primary,
        }
    }

    /// Whether the unit contains `path`.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths().contains(&path)
    }

    /// Whether this is a matched pair.
    #[must_use]
    pub const fn is_pair(&self) -> bool {
        matches!(self, Self::Pair { .. })
    }
}

/// Paths currently handed to the processing collaborator.
///
/// Shared by every tracker of an engine so that a unit still being
/// processed is excluded from detection even across a watch restart.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    inner: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlightSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` is in flight.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.inner.lock().contains(path)
    }

    /// Claim every path of `unit`, or none if any is already claimed.
    #[must_use]
    pub fn try_claim(&self, unit: &ReadyUnit) -> bool {
        let mut set = self.inner.lock();
        let paths = unit.paths();
        if paths.iter().any(|p| set.contains(*p)) {
            return false;
        }
        for path in paths {
            set.insert(path.to_path_buf());
        }
        true
    }

    /// Release every path of `unit`.
    pub fn release(&self, unit: &ReadyUnit) {
        let mut set = self.inner.lock();
        for path in unit.paths() {
            set.remove(path);
        }
    }

    /// Number of paths in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Releases a claimed unit when dropped, whatever the processing outcome.
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    unit: ReadyUnit,
}

impl InFlightGuard {
    /// Take ownership of an already claimed unit.
    #[must_use]
    pub const fn adopt(set: InFlightSet, unit: ReadyUnit) -> Self {
        Self { set, unit }
    }

    /// The guarded unit.
    #[must_use]
    pub const fn unit(&self) -> &ReadyUnit {
        &self.unit
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.release(&self.unit);
    }
}
