//! File name filtering with glob patterns.

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::WatcherError;
use crate::store::{PairRole, PairingRule};
use crate::Result;

/// Decides which files of a hotfolder are tracked.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    globs: GlobSet,
    pairing: Option<PairingRule>,
}

impl PatternFilter {
    /// Build a filter from the folder's patterns.
    ///
    /// Patterns match the file name case-insensitively. An empty list
    /// matches every file. With pairing on, a companion is accepted when
    /// its primary counterpart's name matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid glob.
    pub fn new(patterns: &[String], pairing: Option<&PairingRule>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        let defaults = ["*".to_string()];
        let patterns = if patterns.is_empty() {
            &defaults[..]
        } else {
            patterns
        };

        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| WatcherError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
            builder.add(glob);
        }

        let globs = builder.build().map_err(|e| WatcherError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            globs,
            pairing: pairing.cloned(),
        })
    }

    /// Check whether a path should be tracked.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };

        if self.globs.is_match(name) {
            return true;
        }

        let Some(rule) = &self.pairing else {
            return false;
        };

        if rule.role(path) != Some(PairRole::Companion) {
            return false;
        }

        rule.partner_candidates(path)
            .iter()
            .filter_map(|p| p.file_name())
            .any(|primary_name| self.globs.is_match(primary_name))
    }

    /// Pairing rule in effect, if any.
    #[must_use]
    pub const fn pairing(&self) -> Option<&PairingRule> {
        self.pairing.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_matches_case_insensitive() {
        let filter = PatternFilter::new(&patterns(&["*.pdf"]), None).unwrap();

        assert!(filter.matches(Path::new("/in/invoice.pdf")));
        assert!(filter.matches(Path::new("/in/INVOICE.PDF")));
        assert!(!filter.matches(Path::new("/in/invoice.xml")));
        assert!(!filter.matches(Path::new("/in/invoice.pdf.part")));
    }

    #[test]
    fn test_matches_file_name_in_subfolders() {
        let filter = PatternFilter::new(&patterns(&["scan_*.pdf"]), None).unwrap();

        assert!(filter.matches(Path::new("/in/2024/q1/scan_001.pdf")));
        assert!(!filter.matches(Path::new("/in/scan_dir/other.pdf")));
    }

    #[test]
    fn test_empty_patterns_match_everything() {
        let filter = PatternFilter::new(&[], None).unwrap();
        assert!(filter.matches(Path::new("/in/anything.bin")));
    }

    #[test]
    fn test_companion_accepted_through_primary_pattern() {
        let rule = PairingRule::default();
        let filter = PatternFilter::new(&patterns(&["RE_*.pdf"]), Some(&rule)).unwrap();

        assert!(filter.matches(Path::new("/in/RE_1.xml")));
        assert!(filter.matches(Path::new("/in/re_2.XML")));
        assert!(!filter.matches(Path::new("/in/other.xml")));
    }

    #[test]
    fn test_companion_rejected_without_pairing() {
        let filter = PatternFilter::new(&patterns(&["*.pdf"]), None).unwrap();
        assert!(!filter.matches(Path::new("/in/a.xml")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PatternFilter::new(&patterns(&["[unclosed"]), None).unwrap_err();
        assert!(err.to_string().contains("invalid file pattern"));
    }
}
