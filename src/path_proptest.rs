//! Property-based tests for path handling and exclusion filtering.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::exclude::ExclusionFilter;
    use crate::path::{escape_url, normalize, resolve_within, unescape_url, PathMatcher};
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::fs;
    use std::path::{Component, Path};

    // ============================================================================
    // escape_url property tests
    // ============================================================================

    proptest! {
        /// Property: escaped names never contain filesystem-unsafe characters
        #[test]
        fn escape_url_never_produces_unsafe_chars(input in ".*") {
            let result = escape_url(&input);
            let unsafe_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '.', ' '];
            for ch in unsafe_chars {
                prop_assert!(
                    !result.contains(ch),
                    "escape_url produced unsafe character '{}' from input '{}'",
                    ch,
                    input
                );
            }
        }

        /// Property: escaping is reversible, so distinct URLs get distinct mirrors
        #[test]
        fn escape_url_round_trips(input in ".*") {
            prop_assert_eq!(unescape_url(&escape_url(&input)), Some(input));
        }

        /// Property: the unreserved set passes through untouched
        #[test]
        fn escape_url_preserves_unreserved(input in "[a-zA-Z0-9_-]+") {
            prop_assert_eq!(escape_url(&input), input);
        }
    }

    // ============================================================================
    // normalize / resolve_within property tests
    // ============================================================================

    proptest! {
        /// Property: normalized relative paths have no `.` and only leading `..`
        #[test]
        fn normalize_leaves_only_leading_parent_dirs(
            segments in prop::collection::vec(prop_oneof!["[a-z]{1,4}", Just("..".to_string()), Just(".".to_string())], 0..8)
        ) {
            let path = segments.join("/");
            let normalized = normalize(Path::new(&path));
            let mut seen_normal = false;
            for component in normalized.components() {
                match component {
                    Component::CurDir => prop_assert!(false, "'.' left in {:?}", normalized),
                    Component::ParentDir => prop_assert!(!seen_normal, "inner '..' in {:?}", normalized),
                    _ => seen_normal = true,
                }
            }
        }

        /// Property: whatever resolve_within accepts stays under the workdir
        #[test]
        fn resolve_within_never_escapes(
            segments in prop::collection::vec(prop_oneof!["[a-z]{1,4}", Just("..".to_string())], 1..6)
        ) {
            let workdir = Path::new("/work/dir");
            let pattern = segments.join("/");
            if let Ok(relative) = resolve_within(workdir, &pattern) {
                prop_assert!(normalize(&workdir.join(&relative)).starts_with(workdir));
                prop_assert!(!relative.components().any(|c| c == Component::ParentDir));
            }
        }
    }

    // ============================================================================
    // PathMatcher property tests
    // ============================================================================

    proptest! {
        /// Property: a pattern without wildcards matches exactly itself
        #[test]
        fn literal_pattern_matches_only_itself(
            path in "[a-z]{1,5}(/[a-z]{1,5}){0,3}",
            other in "[a-z]{1,5}(/[a-z]{1,5}){0,3}"
        ) {
            let matcher = PathMatcher::new(&path).unwrap();
            prop_assert!(matcher.matches(Path::new(&path)));
            prop_assert_eq!(matcher.matches(Path::new(&other)), path == other);
        }

        /// Property: `dir/**` matches everything strictly below `dir`
        #[test]
        fn recursive_pattern_matches_all_descendants(
            dir in "[a-z]{1,5}",
            rest in "[a-z]{1,5}(/[a-z]{1,5}){0,3}"
        ) {
            let matcher = PathMatcher::new(&format!("{}/**", dir)).unwrap();
            let descendant = format!("{}/{}", dir, rest);
            let sibling = format!("{}2/{}", dir, rest);
            prop_assert!(matcher.matches(Path::new(&descendant)));
            prop_assert!(!matcher.matches(Path::new(&dir)));
            prop_assert!(!matcher.matches(Path::new(&sibling)));
        }
    }

    // ============================================================================
    // Exclusion filtering property tests
    // ============================================================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Property: a second filtering pass leaves the tree unchanged
        #[test]
        fn exclusion_is_idempotent(
            files in prop::collection::btree_set("[a-c]{1,2}(/[a-c]{1,2}){0,2}\\.(txt|java)", 1..12),
            patterns in prop::collection::vec(prop_oneof![
                Just("a/**".to_string()),
                Just("**/*.java".to_string()),
                Just("b/**/*.txt".to_string()),
                Just("c.txt".to_string()),
            ], 1..3)
        ) {
            let temp_dir = tempfile::TempDir::new().unwrap();
            let root = temp_dir.path();
            for file in &files {
                let path = root.join(file);
                // A generated file may shadow a generated directory; skip clashes
                if path.parent().is_some_and(|p| p.is_file()) || path.is_dir() {
                    continue;
                }
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, file.as_bytes()).unwrap();
            }

            let filter = ExclusionFilter::new(patterns).unwrap();
            let _ = filter.apply(root);
            let once = snapshot(root);
            let _ = filter.apply(root);
            prop_assert_eq!(snapshot(root), once);
        }
    }

    fn snapshot(root: &Path) -> BTreeSet<String> {
        walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }
}
