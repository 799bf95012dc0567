//! Hotfolder descriptors and their enabled/disabled state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque hotfolder identity.
pub type FolderId = String;

/// Why a folder is not watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// Turned off by the user in the editor.
    UserConfigured,
    /// Turned off by the engine because no valid license is installed.
    LicenseInvalid,
}

/// Tagged view over a descriptor's `enabled` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderState {
    Enabled,
    Disabled { reason: DisabledReason },
}

/// Extension pair used to match a primary document with its companion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRule {
    /// Extension of the primary document, without the dot.
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Extension of the companion metadata file, without the dot.
    #[serde(default = "default_companion")]
    pub companion: String,
}

fn default_primary() -> String {
    "pdf".to_string()
}

fn default_companion() -> String {
    "xml".to_string()
}

impl Default for PairingRule {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            companion: default_companion(),
        }
    }
}

/// Role a file plays within a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairRole {
    Primary,
    Companion,
}

impl PairingRule {
    /// Classify a path by its extension (case-insensitive).
    #[must_use]
    pub fn role(&self, path: &Path) -> Option<PairRole> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case(&self.primary) {
            Some(PairRole::Primary)
        } else if ext.eq_ignore_ascii_case(&self.companion) {
            Some(PairRole::Companion)
        } else {
            None
        }
    }

    /// Candidate partner paths for `path`, same case style first.
    ///
    /// Returns an empty list when the path has no pairing role.
    #[must_use]
    pub fn partner_candidates(&self, path: &Path) -> Vec<PathBuf> {
        let Some(role) = self.role(path) else {
            return Vec::new();
        };
        let observed = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let target = match role {
            PairRole::Primary => &self.companion,
            PairRole::Companion => &self.primary,
        };

        let upper = target.to_ascii_uppercase();
        let lower = target.to_ascii_lowercase();
        let uppercase_style = !observed.is_empty() && observed == observed.to_ascii_uppercase();

        let mut candidates = if uppercase_style {
            vec![path.with_extension(&upper), path.with_extension(&lower)]
        } else {
            vec![path.with_extension(&lower), path.with_extension(&upper)]
        };
        candidates.dedup();
        candidates
    }
}

/// A configured hotfolder.
///
/// Field names follow the configuration editor's on-disk format. Keys the
/// engine does not understand are kept in `extra` so that persisting a
/// license transition never drops editor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    pub id: FolderId,
    #[serde(default)]
    pub name: String,
    pub input_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<DisabledReason>,
    #[serde(rename = "process_pairs", default = "default_true")]
    pub pair_enabled: bool,
    #[serde(rename = "file_patterns", default = "default_patterns")]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub pairing: PairingRule,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const fn default_true() -> bool {
    true
}

fn default_patterns() -> Vec<String> {
    vec!["*.pdf".to_string()]
}

impl FolderDescriptor {
    /// Create an enabled descriptor with the editor's defaults.
    pub fn new(id: impl Into<FolderId>, input_path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            input_path: input_path.into(),
            output_path: None,
            enabled: true,
            disabled_reason: None,
            pair_enabled: true,
            patterns: default_patterns(),
            pairing: PairingRule::default(),
            extra: Map::new(),
        }
    }

    /// Set the file patterns.
    #[must_use]
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable pairing.
    #[must_use]
    pub const fn with_pairing(mut self, enabled: bool) -> Self {
        self.pair_enabled = enabled;
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output.into());
        self
    }

    /// Set the initial state.
    #[must_use]
    pub fn with_state(mut self, state: FolderState) -> Self {
        self.set_state(state);
        self
    }

    /// Current state.
    ///
    /// A disabled descriptor without a recorded reason was turned off in
    /// the editor.
    #[must_use]
    pub fn state(&self) -> FolderState {
        if self.enabled {
            FolderState::Enabled
        } else {
            FolderState::Disabled {
                reason: self
                    .disabled_reason
                    .unwrap_or(DisabledReason::UserConfigured),
            }
        }
    }

    /// Replace the state, keeping `enabled` and `disabled_reason` in step.
    pub fn set_state(&mut self, state: FolderState) {
        match state {
            FolderState::Enabled => {
                self.enabled = true;
                self.disabled_reason = None;
            }
            FolderState::Disabled { reason } => {
                self.enabled = false;
                self.disabled_reason = Some(reason);
            }
        }
    }

    /// Whether the folder should be watched.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pairing rule when pairing is switched on.
    #[must_use]
    pub const fn active_pairing(&self) -> Option<&PairingRule> {
        if self.pair_enabled {
            Some(&self.pairing)
        } else {
            None
        }
    }

    /// Label for log output.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Apply the license gate to a descriptor list.
///
/// Unlicensed: enabled folders become `Disabled{LicenseInvalid}`.
/// Licensed: folders disabled for license reasons are re-enabled.
/// Folders the user disabled are never touched. Returns how many changed.
pub fn apply_license(descriptors: &mut [FolderDescriptor], licensed: bool) -> usize {
    let mut changed = 0;
    for descriptor in descriptors.iter_mut() {
        let next = match (licensed, descriptor.state()) {
            (false, FolderState::Enabled) => FolderState::Disabled {
                reason: DisabledReason::LicenseInvalid,
            },
            (
                true,
                FolderState::Disabled {
                    reason: DisabledReason::LicenseInvalid,
                },
            ) => FolderState::Enabled,
            _ => continue,
        };
        tracing::info!(
            folder = %descriptor.label(),
            licensed,
            "Hotfolder state changed by license check"
        );
        descriptor.set_state(next);
        changed += 1;
    }
    changed
}
