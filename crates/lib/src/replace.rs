//! Textual placeholder replacement over a directory tree.
//!
//! Bundles are built with `{{ KEY }}` style placeholders whose values are only
//! known at deploy time. [`apply_replacements`] rewrites every file matched by
//! a rule's glob, in rule order. It runs against the extracted copy of an
//! uploaded artifact, never against the source bundle.
//!
//! Globs use gitignore-style matching over paths relative to the root: a
//! pattern without a slash (`*.js`) matches at any depth, `**` spans
//! directories, and a pattern with a slash is anchored to the root.

use std::fs;
use std::path::{Path, PathBuf};

use ignore::overrides::{Override, OverrideBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ReplaceError {
  #[error("invalid file pattern '{pattern}': {message}")]
  InvalidPattern { pattern: String, message: String },

  #[error("failed to walk {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("failed to rewrite {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Replace every `search` with `replace` in files matching `files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementRule {
  pub files: String,
  pub search: String,
  pub replace: String,
}

impl ReplacementRule {
  pub fn new(files: &str, search: &str, replace: &str) -> Self {
    Self {
      files: files.to_string(),
      search: search.to_string(),
      replace: replace.to_string(),
    }
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
  pub files_scanned: usize,
  /// Relative paths of files whose content changed, in walk order.
  pub files_modified: Vec<String>,
  pub replacements: usize,
}

fn matcher(root: &Path, pattern: &str) -> Result<Override, ReplaceError> {
  let invalid = |e: ignore::Error| ReplaceError::InvalidPattern {
    pattern: pattern.to_string(),
    message: e.to_string(),
  };
  let mut builder = OverrideBuilder::new(root);
  builder.add(pattern).map_err(invalid)?;
  builder.build().map_err(invalid)
}

/// Apply `rules` to every matching file under `root`.
///
/// A pattern matching no files is not an error. Files that are not valid
/// UTF-8 are skipped with a warning. Files are only rewritten when at least
/// one replacement happened.
pub fn apply_replacements(root: &Path, rules: &[ReplacementRule]) -> Result<ReplaceReport, ReplaceError> {
  let matchers = rules
    .iter()
    .map(|rule| Ok((rule, matcher(root, &rule.files)?)))
    .collect::<Result<Vec<_>, ReplaceError>>()?;

  let mut report = ReplaceReport::default();

  for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| ReplaceError::Walk {
      path: root.to_path_buf(),
      message: e.to_string(),
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    report.files_scanned += 1;

    let path = entry.path();
    let applicable: Vec<&ReplacementRule> = matchers
      .iter()
      .filter(|(_, m)| m.matched(path, false).is_whitelist())
      .map(|(rule, _)| *rule)
      .collect();
    if applicable.is_empty() {
      continue;
    }

    let original = match fs::read_to_string(path) {
      Ok(content) => content,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "skipping unreadable file");
        continue;
      }
    };

    let mut content = original.clone();
    let mut count = 0;
    for rule in applicable {
      if rule.search.is_empty() {
        continue;
      }
      let hits = content.matches(rule.search.as_str()).count();
      if hits > 0 {
        content = content.replace(rule.search.as_str(), &rule.replace);
        count += hits;
      }
    }

    if content != original {
      fs::write(path, &content).map_err(|source| ReplaceError::Write {
        path: path.to_path_buf(),
        source,
      })?;
      let rel = crate::util::hash::relative_slash_path(root, path);
      debug!(file = %rel, replacements = count, "rewrote file");
      report.files_modified.push(rel);
      report.replacements += count;
    }
  }

  info!(
    root = %root.display(),
    rules = rules.len(),
    scanned = report.files_scanned,
    modified = report.files_modified.len(),
    "applied replacements"
  );
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
  }

  #[test]
  fn only_matching_files_are_modified() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.js", "const url = \"{{ KEY }}\";");
    write(temp.path(), "b.mjs", "const url = \"{{ KEY }}\";");

    let rules = [ReplacementRule::new("*.js", "{{ KEY }}", "value")];
    let report = apply_replacements(temp.path(), &rules).unwrap();

    assert_eq!(read(temp.path(), "a.js"), "const url = \"value\";");
    assert_eq!(read(temp.path(), "b.mjs"), "const url = \"{{ KEY }}\";");
    assert_eq!(report.files_modified, vec!["a.js".to_string()]);
    assert_eq!(report.replacements, 1);
  }

  #[test]
  fn double_star_reaches_nested_files() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "src/deep/handler.js", "{{ A }} and {{ A }}");

    let rules = [ReplacementRule::new("**/*.js", "{{ A }}", "x")];
    let report = apply_replacements(temp.path(), &rules).unwrap();

    assert_eq!(read(temp.path(), "src/deep/handler.js"), "x and x");
    assert_eq!(report.replacements, 2);
  }

  #[test]
  fn anchored_pattern_only_matches_root_file() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "index-wrapper.mjs", "TOKEN");
    write(temp.path(), "nested/index-wrapper.mjs", "TOKEN");

    let rules = [ReplacementRule::new("/index-wrapper.mjs", "TOKEN", "done")];
    apply_replacements(temp.path(), &rules).unwrap();

    assert_eq!(read(temp.path(), "index-wrapper.mjs"), "done");
    assert_eq!(read(temp.path(), "nested/index-wrapper.mjs"), "TOKEN");
  }

  #[test]
  fn rules_apply_in_insertion_order() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.js", "{{ A }}");

    let rules = [
      ReplacementRule::new("*.js", "{{ A }}", "{{ B }}"),
      ReplacementRule::new("**/*.js", "{{ B }}", "final"),
    ];
    apply_replacements(temp.path(), &rules).unwrap();

    assert_eq!(read(temp.path(), "a.js"), "final");
  }

  #[test]
  fn pattern_matching_nothing_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.txt", "{{ KEY }}");

    let rules = [ReplacementRule::new("**/*.cjs", "{{ KEY }}", "v")];
    let report = apply_replacements(temp.path(), &rules).unwrap();

    assert!(report.files_modified.is_empty());
    assert_eq!(report.files_scanned, 1);
  }

  #[test]
  fn untouched_files_are_not_rewritten() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a.js", "no tokens");

    let rules = [ReplacementRule::new("*.js", "{{ KEY }}", "v")];
    let report = apply_replacements(temp.path(), &rules).unwrap();

    assert!(report.files_modified.is_empty());
    assert_eq!(report.replacements, 0);
  }

  #[test]
  fn binary_files_are_skipped() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("blob.js"), [0xff, 0xfe, 0x00]).unwrap();

    let rules = [ReplacementRule::new("*.js", "{{ KEY }}", "v")];
    let report = apply_replacements(temp.path(), &rules).unwrap();

    assert!(report.files_modified.is_empty());
    assert_eq!(fs::read(temp.path().join("blob.js")).unwrap(), vec![0xff, 0xfe, 0x00]);
  }

  #[test]
  fn invalid_glob_is_reported() {
    let temp = TempDir::new().unwrap();
    let rules = [ReplacementRule::new("src/[", "x", "y")];
    assert!(matches!(
      apply_replacements(temp.path(), &rules),
      Err(ReplaceError::InvalidPattern { .. })
    ));
  }

  #[test]
  fn rules_serialize_with_wire_field_names() {
    let rule = ReplacementRule::new("**/*.js", "{{ A }}", "1");
    assert_eq!(
      serde_json::to_value(&rule).unwrap(),
      serde_json::json!({ "files": "**/*.js", "search": "{{ A }}", "replace": "1" })
    );
  }
}
