//! Cache keys.
//!
//! A [`Fingerprint`] names a request by resource and ordered parameters.
//! Equality is structural: the same resource with the same parameters is the
//! same cache entry.

use std::fmt;

use inclusa_api::QueryParams;

/// One parameter of a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Int(i64),
    Text(String),
    /// Canonical (sorted, de-duplicated) query-string parameters.
    Query(Vec<(String, String)>),
}

impl From<i64> for KeyPart {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for KeyPart {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&QueryParams> for KeyPart {
    fn from(q: &QueryParams) -> Self {
        Self::Query(q.canonical())
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Query(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, "&")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Identity of a cached request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    resource: String,
    parts: Vec<KeyPart>,
}

impl Fingerprint {
    /// Fingerprint of a resource with no parameters.
    ///
    /// Also usable as a filter matching every entry of that resource.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            parts: Vec::new(),
        }
    }

    /// Append a parameter.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// Whether this fingerprint is selected by `filter`: same resource, and the
    /// filter's parameters are a prefix of this one's.
    pub fn matches(&self, filter: &Fingerprint) -> bool {
        self.resource == filter.resource && self.parts.starts_with(&filter.parts)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        for part in &self.parts {
            write!(f, "/{}", part)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_query_parameters_distinguish_entries() {
        let sp: QueryParams = [("estado", "SP")].into_iter().collect();
        let rj: QueryParams = [("estado", "RJ")].into_iter().collect();

        let a = Fingerprint::new("users").with(&sp);
        let b = Fingerprint::new("users").with(&rj);

        assert_ne!(a, b);
        assert!(a.matches(&Fingerprint::new("users")));
        assert!(b.matches(&Fingerprint::new("users")));
        assert!(!a.matches(&b));
    }

    #[test]
    fn test_resource_must_match() {
        let post = Fingerprint::new("post").with(42);
        assert!(!post.matches(&Fingerprint::new("posts")));
        assert!(post.matches(&Fingerprint::new("post")));
        assert!(post.matches(&Fingerprint::new("post").with(42)));
        assert!(!post.matches(&Fingerprint::new("post").with(43)));
    }

    #[test]
    fn test_display() {
        let q: QueryParams = [("limit", "10"), ("estado", "SP")].into_iter().collect();
        let key = Fingerprint::new("users").with(&q);
        assert_eq!(key.to_string(), "users/{estado=SP&limit=10}");
        assert_eq!(Fingerprint::new("comments").with(7).to_string(), "comments/7");
    }

    proptest! {
        #[test]
        fn prop_matches_is_reflexive(resource in "[a-z]{1,8}", ids in prop::collection::vec(any::<i64>(), 0..4)) {
            let key = ids.iter().fold(Fingerprint::new(resource), |k, id| k.with(*id));
            prop_assert!(key.matches(&key));
        }

        #[test]
        fn prop_prefix_filter_matches(resource in "[a-z]{1,8}", ids in prop::collection::vec(any::<i64>(), 1..4), cut in 0usize..4) {
            let key = ids.iter().fold(Fingerprint::new(resource.clone()), |k, id| k.with(*id));
            let cut = cut.min(ids.len());
            let filter = ids[..cut].iter().fold(Fingerprint::new(resource), |k, id| k.with(*id));
            prop_assert!(key.matches(&filter));
        }

        #[test]
        fn prop_param_order_does_not_matter(pairs in prop::collection::vec(("[a-z]{1,5}", "[A-Z]{1,3}"), 0..5)) {
            let forward: QueryParams = pairs.iter().cloned().collect();
            let backward: QueryParams = pairs.iter().rev().cloned().collect();
            prop_assert_eq!(
                Fingerprint::new("users").with(&forward),
                Fingerprint::new("users").with(&backward)
            );
        }
    }
}
