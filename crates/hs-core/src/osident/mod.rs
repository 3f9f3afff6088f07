//! OS identity resolution.
//!
//! Linux distributions expose identity facts through several competing
//! channels: a distribution-specific `/etc/system-release`, the
//! freedesktop `/etc/os-release` standard, the `lsb_release` command,
//! the legacy `/etc/lsb-release` file, and a long tail of
//! `/etc/*-release` variants. No single source is reliable across
//! distributions, so identity is resolved by an ordered cascade.
//!
//! The cascade is an explicit list of pure strategy functions folded
//! left-to-right over a draft. Each strategy fills only fields that are
//! still unset; once a field is set, no later strategy may change it.
//! The strategy order encodes empirically decreasing reliability and
//! must be preserved: downstream consumers depend on the exact
//! family/version strings each source produces.
//!
//! Resolution never fails. Every strategy swallows missing files and
//! commands as "no contribution"; the worst case is an identity with
//! only the kernel-release version fallback.

mod family;

use crate::source::RawSourceAdapter;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Resolved operating system identity.
///
/// Any field may be empty if no source supplied it. Immutable once
/// returned; OS facts are assumed stable for the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsIdentity {
    /// Distribution family, e.g. "Ubuntu" or "Red Hat Linux".
    pub family: String,

    /// Version identifier, e.g. "14.04.4 LTS".
    pub version: String,

    /// Release code name, e.g. "Trusty Tahr".
    pub code_name: String,

    /// Kernel build identifier from /proc/version.
    pub build_number: String,
}

/// Partially resolved identity accumulated across the cascade.
///
/// `None` means no strategy has supplied the field yet; strategies
/// write through [`IdentityDraft::fill_*`] which never overwrite.
#[derive(Debug, Clone, Default)]
pub struct IdentityDraft {
    family: Option<String>,
    version: Option<String>,
    code_name: Option<String>,
    build_number: Option<String>,
    /// Filename chosen by the generic release-file strategy; feeds the
    /// family-from-filename fallback.
    fallback_file: Option<String>,
}

impl IdentityDraft {
    /// Whether the required fields are resolved and the cascade can stop.
    fn is_satisfied(&self) -> bool {
        self.family.is_some() && self.version.is_some()
    }

    fn fill_family(&mut self, value: &str) {
        let value = value.trim();
        if self.family.is_none() && !value.is_empty() {
            self.family = Some(value.to_string());
        }
    }

    fn fill_version(&mut self, value: &str) {
        let value = value.trim();
        if self.version.is_none() && !value.is_empty() {
            self.version = Some(value.to_string());
        }
    }

    fn fill_code_name(&mut self, value: &str) {
        let value = value.trim();
        if self.code_name.is_none() && !value.is_empty() {
            self.code_name = Some(value.to_string());
        }
    }
}

/// One identity-extraction strategy: fills unset draft fields from a
/// single source, contributing nothing when the source is unavailable.
type Strategy = fn(&dyn RawSourceAdapter, IdentityDraft) -> IdentityDraft;

/// The cascade, in strict precedence order.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("system-release", from_system_release),
    ("os-release", from_os_release),
    ("lsb_release-command", from_lsb_release_command),
    ("lsb-release-file", from_lsb_release_file),
    ("generic-release-file", from_generic_release_file),
];

/// Resolve the OS identity. Never fails; missing sources degrade to
/// empty fields, with the kernel release as the final version fallback.
pub fn resolve_os_identity(adapter: &dyn RawSourceAdapter) -> OsIdentity {
    let mut draft = IdentityDraft::default();
    for (name, strategy) in STRATEGIES {
        if draft.is_satisfied() {
            break;
        }
        draft = strategy(adapter, draft);
        debug!(
            strategy = name,
            family = draft.family.as_deref().unwrap_or(""),
            version = draft.version.as_deref().unwrap_or(""),
            "identity cascade step"
        );
    }
    draft = fill_build_number(adapter, draft);

    let family = draft.family.unwrap_or_else(|| {
        let filename = draft.fallback_file.as_deref().unwrap_or("/etc/issue");
        family::filename_to_family(&family::filename_stem(filename))
    });
    let version = draft
        .version
        .or_else(|| kernel_release(adapter))
        .unwrap_or_default();

    OsIdentity {
        family,
        version,
        code_name: draft.code_name.unwrap_or_default(),
        build_number: draft.build_number.unwrap_or_default(),
    }
}

/// Strip surrounding double quotes from a key=value payload.
fn unquote(value: &str) -> &str {
    value.trim().trim_matches('"').trim()
}

/// Split a version payload into (version, code name).
///
/// `"14.04.4 LTS, Trusty Tahr"` and `"17 (Beefy Miracle)"` are the two
/// styles seen in the wild: a parenthesized suffix is preferred, then
/// the comma-separated form.
fn split_version_code(payload: &str) -> (Option<String>, Option<String>) {
    if let Some(open) = payload.find('(') {
        let version = payload[..open].trim();
        let rest = &payload[open + 1..];
        let code = match rest.find(')') {
            Some(close) => rest[..close].trim(),
            None => rest.trim(),
        };
        return (
            Some(version.to_string()).filter(|v| !v.is_empty()),
            Some(code.to_string()).filter(|c| !c.is_empty()),
        );
    }
    if let Some((version, code)) = payload.split_once(", ") {
        return (
            Some(version.trim().to_string()).filter(|v| !v.is_empty()),
            Some(code.trim().to_string()).filter(|c| !c.is_empty()),
        );
    }
    (
        Some(payload.trim().to_string()).filter(|v| !v.is_empty()),
        None,
    )
}

/// Parse a `"<family> release <version> (<codeName>)"` line (or the
/// `" VERSION "` variant), filling unset fields.
///
/// Returns true when a version was extracted, which ends the scan of a
/// distrib-release file.
fn apply_distrib_release_line(line: &str, draft: &mut IdentityDraft) -> bool {
    let token = if line.contains(" release ") {
        " release "
    } else if line.contains(" VERSION ") {
        " VERSION "
    } else {
        return false;
    };
    let Some((family, remainder)) = line.split_once(token) else {
        return false;
    };
    draft.fill_family(family);
    let (version, code_name) = split_version_code(remainder);
    if let Some(version) = &version {
        draft.fill_version(version);
    }
    if let Some(code_name) = &code_name {
        draft.fill_code_name(code_name);
    }
    version.is_some()
}

/// Strategy 1: `/etc/system-release`, which carries more detail than
/// os-release on Red Hat derivatives.
fn from_system_release(adapter: &dyn RawSourceAdapter, draft: IdentityDraft) -> IdentityDraft {
    read_distrib_release(adapter, "/etc/system-release", draft)
}

fn read_distrib_release(
    adapter: &dyn RawSourceAdapter,
    path: &str,
    mut draft: IdentityDraft,
) -> IdentityDraft {
    let Ok(lines) = adapter.read_text_file(path) else {
        return draft;
    };
    for line in lines {
        if apply_distrib_release_line(&line, &mut draft) {
            break;
        }
    }
    draft
}

/// Strategy 2: the freedesktop `/etc/os-release` standard.
///
/// `VERSION=` carries both version and code name and takes precedence
/// over the bare `VERSION_ID=`, regardless of line order in the file.
fn from_os_release(adapter: &dyn RawSourceAdapter, mut draft: IdentityDraft) -> IdentityDraft {
    let Ok(lines) = adapter.read_text_file("/etc/os-release") else {
        return draft;
    };
    for line in &lines {
        if let Some(payload) = line.strip_prefix("VERSION=") {
            let (version, code_name) = split_version_code(unquote(payload));
            if let Some(version) = version {
                draft.fill_version(&version);
            }
            if let Some(code_name) = code_name {
                draft.fill_code_name(&code_name);
            }
        } else if let Some(payload) = line.strip_prefix("NAME=") {
            draft.fill_family(unquote(payload));
        }
    }
    for line in &lines {
        if let Some(payload) = line.strip_prefix("VERSION_ID=") {
            draft.fill_version(unquote(payload));
        }
    }
    draft
}

/// Strategy 3: the `lsb_release -a` command.
///
/// A `Description:` line in distrib-release form is primary; the
/// discrete `Distributor ID:`/`Release:`/`Codename:` lines fill any
/// remaining gaps, first found wins.
fn from_lsb_release_command(
    adapter: &dyn RawSourceAdapter,
    mut draft: IdentityDraft,
) -> IdentityDraft {
    let Ok(lines) = adapter.run_command(&["lsb_release", "-a"]) else {
        return draft;
    };
    // Description is preferred over the discrete lines whatever order
    // the command prints them in.
    for line in &lines {
        if let Some(payload) = line.strip_prefix("Description:") {
            apply_distrib_release_line(payload.trim(), &mut draft);
        }
    }
    for line in &lines {
        if let Some(payload) = line.strip_prefix("Distributor ID:") {
            draft.fill_family(payload);
        } else if let Some(payload) = line.strip_prefix("Release:") {
            draft.fill_version(payload);
        } else if let Some(payload) = line.strip_prefix("Codename:") {
            draft.fill_code_name(payload);
        }
    }
    draft
}

/// Strategy 4: the legacy `/etc/lsb-release` key/value file.
fn from_lsb_release_file(
    adapter: &dyn RawSourceAdapter,
    mut draft: IdentityDraft,
) -> IdentityDraft {
    let Ok(lines) = adapter.read_text_file("/etc/lsb-release") else {
        return draft;
    };
    for line in &lines {
        if let Some(payload) = line.strip_prefix("DISTRIB_DESCRIPTION=") {
            apply_distrib_release_line(unquote(payload), &mut draft);
        }
    }
    for line in &lines {
        if let Some(payload) = line.strip_prefix("DISTRIB_ID=") {
            draft.fill_family(unquote(payload));
        } else if let Some(payload) = line.strip_prefix("DISTRIB_RELEASE=") {
            draft.fill_version(unquote(payload));
        } else if let Some(payload) = line.strip_prefix("DISTRIB_CODENAME=") {
            draft.fill_code_name(unquote(payload));
        }
    }
    draft
}

/// Whether a filename matches the generic release-file glob, excluding
/// the files earlier strategies already tried.
fn is_generic_release_filename(name: &str) -> bool {
    let matches_glob = name.ends_with("-release")
        || name.ends_with("-version")
        || name.ends_with("_release")
        || name.ends_with("_version");
    let already_tried = name.ends_with("os-release")
        || name.ends_with("lsb-release")
        || name.ends_with("system-release");
    matches_glob && !already_tried
}

/// Strategy 5: scan `/etc` for any remaining `*-release`/`*-version`
/// file and parse it in distrib-release form. Falls back to
/// `/etc/release`, then `/etc/issue`. Records the chosen filename for
/// the family-from-filename fallback even when parsing contributes
/// nothing.
fn from_generic_release_file(
    adapter: &dyn RawSourceAdapter,
    mut draft: IdentityDraft,
) -> IdentityDraft {
    let candidate = adapter
        .list_directory("/etc")
        .ok()
        .and_then(|entries| {
            entries
                .into_iter()
                .find(|name| is_generic_release_filename(name))
        })
        .map(|name| format!("/etc/{}", name))
        .or_else(|| {
            adapter
                .read_text_file("/etc/release")
                .ok()
                .map(|_| "/etc/release".to_string())
        })
        .unwrap_or_else(|| "/etc/issue".to_string());

    draft.fallback_file = Some(candidate.clone());
    read_distrib_release(adapter, &candidate, draft)
}

/// Build number: the first `/proc/version` token that is neither
/// "Linux" nor "version".
fn fill_build_number(adapter: &dyn RawSourceAdapter, mut draft: IdentityDraft) -> IdentityDraft {
    if draft.build_number.is_some() {
        return draft;
    }
    let Ok(lines) = adapter.read_text_file("/proc/version") else {
        return draft;
    };
    if let Some(first) = lines.first() {
        for token in first.split_whitespace() {
            if token != "Linux" && token != "version" {
                draft.build_number = Some(token.to_string());
                break;
            }
        }
    }
    draft
}

/// Final version fallback: the host environment's kernel release.
fn kernel_release(adapter: &dyn RawSourceAdapter) -> Option<String> {
    adapter
        .run_command(&["uname", "-r"])
        .ok()
        .and_then(|lines| lines.into_iter().next())
        .map(|line| line.trim().to_string())
        .filter(|release| !release.is_empty())
}
