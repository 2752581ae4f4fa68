//! Bucket coordinates: `(bucket_prefix, object_prefix)` pairs identifying
//! a logical database location in the object store.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOptions {
    pub bucket_prefix: String,
    pub object_prefix: String,
}

impl BucketOptions {
    pub fn new(bucket_prefix: impl Into<String>, object_prefix: impl Into<String>) -> Self {
        Self {
            bucket_prefix: bucket_prefix.into(),
            object_prefix: object_prefix.into(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// A bucket coordinate is "configured" once it names a bucket; an
    /// empty `bucket_prefix` means "no cloud interaction for this side".
    pub fn is_empty(&self) -> bool {
        self.bucket_prefix.is_empty()
    }

    pub fn trimmed_object_prefix(&self) -> &str {
        self.object_prefix.trim_end_matches('/')
    }

    /// Build the object-store key for a path relative to this coordinate.
    pub fn object_path(&self, relative: &str) -> String {
        if self.object_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.trimmed_object_prefix(), relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_path_joins_prefix_and_relative_name() {
        let b = BucketOptions::new("my-bucket", "db/prefix/");
        assert_eq!(b.object_path("CURRENT"), "db/prefix/CURRENT");
    }

    #[test]
    fn empty_bucket_has_no_object_prefix_join() {
        let b = BucketOptions::empty();
        assert!(b.is_empty());
        assert_eq!(b.object_path("CURRENT"), "CURRENT");
    }
}
