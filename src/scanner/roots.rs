//! Root-set normalisation.
//!
//! A root nested inside another root would be walked twice and every file
//! under it would be reported as its own duplicate. Roots are therefore
//! reduced so that no root is a descendant of another.

use std::path::PathBuf;

/// Remove roots that are equal to, or descendants of, another root.
///
/// Roots are considered shortest first; a root is dropped if an already
/// kept root is a prefix of it. Prefix matching is component-wise, so
/// `/a/bc` is not inside `/a/b`. Surviving roots keep the caller's order.
///
/// # Example
///
/// ```
/// use dicomdupe::scanner::non_overlapping_roots;
/// use std::path::PathBuf;
///
/// let roots = vec![
///     PathBuf::from("/a/b"),
///     PathBuf::from("/a"),
///     PathBuf::from("/a/bc"),
///     PathBuf::from("/z"),
/// ];
/// assert_eq!(
///     non_overlapping_roots(roots),
///     vec![PathBuf::from("/a"), PathBuf::from("/z")]
/// );
/// ```
#[must_use]
pub fn non_overlapping_roots(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut by_length: Vec<usize> = (0..roots.len()).collect();
    by_length.sort_by_key(|&i| roots[i].as_os_str().len());

    let mut kept: Vec<usize> = Vec::with_capacity(roots.len());
    for idx in by_length {
        let candidate = &roots[idx];
        if let Some(&parent) = kept.iter().find(|&&k| candidate.starts_with(&roots[k])) {
            log::debug!(
                "Dropping root {} (covered by {})",
                candidate.display(),
                roots[parent].display()
            );
            continue;
        }
        kept.push(idx);
    }

    kept.sort_unstable();
    kept.into_iter().map(|i| roots[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_no_overlap() {
        let roots = paths(&["/home/user/photos", "/home/user/docs", "/var/data"]);
        let result = non_overlapping_roots(roots.clone());
        assert_eq!(result, roots);
    }

    #[test]
    fn test_descendants_removed() {
        let result = non_overlapping_roots(paths(&["/a", "/a/b", "/a/bc"]));
        assert_eq!(result, paths(&["/a"]));
    }

    #[test]
    fn test_child_given_before_parent() {
        let result = non_overlapping_roots(paths(&["/home/user/docs", "/var/data", "/home/user"]));
        assert_eq!(result, paths(&["/var/data", "/home/user"]));
    }

    #[test]
    fn test_sibling_with_shared_string_prefix_kept() {
        let result = non_overlapping_roots(paths(&["/a/b", "/a/bc"]));
        assert_eq!(result, paths(&["/a/b", "/a/bc"]));
    }

    #[test]
    fn test_exact_duplicates_collapse() {
        let result = non_overlapping_roots(paths(&["/data", "/data", "/data/"]));
        assert_eq!(result, paths(&["/data"]));
    }

    #[test]
    fn test_no_pair_is_prefix_of_another() {
        let result = non_overlapping_roots(paths(&[
            "/x/y/z", "/x", "/q/r", "/q/rs", "/q/r/s", "/x/y",
        ]));
        for (i, a) in result.iter().enumerate() {
            for (j, b) in result.iter().enumerate() {
                if i != j {
                    assert!(!a.starts_with(b), "{} is inside {}", a.display(), b.display());
                }
            }
        }
        assert_eq!(result, paths(&["/x", "/q/r", "/q/rs"]));
    }

    #[test]
    fn test_empty() {
        assert!(non_overlapping_roots(Vec::new()).is_empty());
    }
}
