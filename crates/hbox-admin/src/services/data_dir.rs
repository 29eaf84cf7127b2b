// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 The HBox Registry Contributors
//
// Data directory resolution.

use std::path::PathBuf;

const APP_DIR: &str = "hbox-registry";

/// Directory holding the registry documents, uploads and audit log.
///
/// An explicit `--data-dir` wins; otherwise the XDG data home is used.
pub fn resolve(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| base_dir().join(APP_DIR))
}

fn base_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        assert_eq!(
            resolve(Some(PathBuf::from("/srv/hbox"))),
            PathBuf::from("/srv/hbox")
        );
    }

    #[test]
    fn default_dir_is_named_after_app() {
        assert!(resolve(None).ends_with(APP_DIR));
    }
}
