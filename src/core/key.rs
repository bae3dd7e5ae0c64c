use serde::{Deserialize, Serialize};

/// Hierarchical key identifying one cached read.
///
/// The first segment is the resource name, the remaining segments are filter
/// parameters, e.g. `["golden", "my_function"]`. Equality is structural, and
/// a key is a prefix of another when its segments lead the other's, which is
/// what bulk invalidation matches on: invalidating `["golden"]` marks every
/// filtered variant of the golden listing stale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    /// Create a key for a resource with no filter parameters.
    pub fn new(resource: impl Into<String>) -> Self {
        QueryKey(vec![resource.into()])
    }

    /// Append a filter parameter segment.
    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// The resource name (first segment).
    pub fn resource(&self) -> &str {
        &self.0[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Key covering the whole resource, with filter segments stripped.
    pub fn root(&self) -> QueryKey {
        QueryKey(vec![self.0[0].clone()])
    }

    /// True if `prefix`'s segments lead this key's segments.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl From<Vec<String>> for QueryKey {
    fn from(mut segments: Vec<String>) -> Self {
        if segments.is_empty() {
            segments.push(String::new());
        }
        QueryKey(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix_matching() {
        let root = QueryKey::new("golden");
        let filtered = QueryKey::new("golden").with("my_function");

        assert!(filtered.starts_with(&root));
        assert!(root.starts_with(&root));
        assert!(!root.starts_with(&filtered));
        assert!(!filtered.starts_with(&QueryKey::new("widgets")));
    }

    #[test]
    fn test_key_structural_equality() {
        let a = QueryKey::new("healer").with("fn_a");
        let b = QueryKey::new("healer").with("fn_a");
        assert_eq!(a, b);
        assert_ne!(a, QueryKey::new("healer").with("fn_b"));
    }

    #[test]
    fn test_key_display_and_root() {
        let key = QueryKey::new("golden").with("my_function");
        assert_eq!(key.to_string(), "golden/my_function");
        assert_eq!(key.root(), QueryKey::new("golden"));
        assert_eq!(key.resource(), "golden");
    }
}
