//! Per-file Loki label sets
//!
//! Object keys follow `<namespace>/<distribution>/<rest>`. The first two
//! segments become the `namespace` and `cloudfront` labels, the configured
//! cluster becomes `cluster`, and `index` is synthesized as
//! `<cluster>-<namespace>`. Static labels from configuration are applied last
//! and win over any of these.

use std::collections::BTreeMap;

use crate::error::{ShipperError, ShipperResult};

/// Labels attached to every line shipped from one file
pub type LabelSet = BTreeMap<String, String>;

pub const NAMESPACE_LABEL: &str = "namespace";
pub const SOURCE_LABEL: &str = "cloudfront";
pub const CLUSTER_LABEL: &str = "cluster";
pub const INDEX_LABEL: &str = "index";

/// Namespace and source segments of an object key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParts<'a> {
    pub namespace: &'a str,
    pub source: &'a str,
}

/// Split `key` into its namespace and source segments.
///
/// Both segments must be present and non-empty.
pub fn split_key(key: &str) -> ShipperResult<KeyParts<'_>> {
    let mut segments = key.split('/');
    match (segments.next(), segments.next()) {
        (Some(namespace), Some(source)) if !namespace.is_empty() && !source.is_empty() => {
            Ok(KeyParts { namespace, source })
        },
        _ => Err(ShipperError::InvalidKey(key.to_string())),
    }
}

/// Build the label set for the file at `key`.
pub fn build_labels(
    key: &str,
    cluster: &str,
    static_labels: &BTreeMap<String, String>,
) -> ShipperResult<LabelSet> {
    let parts = split_key(key)?;

    let mut labels = LabelSet::new();
    labels.insert(NAMESPACE_LABEL.to_string(), parts.namespace.to_string());
    labels.insert(SOURCE_LABEL.to_string(), parts.source.to_string());
    labels.insert(CLUSTER_LABEL.to_string(), cluster.to_string());
    labels.insert(
        INDEX_LABEL.to_string(),
        format!("{}-{}", cluster, parts.namespace),
    );

    labels.extend(
        static_labels
            .iter()
            .map(|(name, value)| (name.clone(), value.clone())),
    );

    Ok(labels)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn statics(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_split_key() {
        let parts = split_key("teamA/dist123/2024010100.log.gz").unwrap();
        assert_eq!(parts.namespace, "teamA");
        assert_eq!(parts.source, "dist123");

        let parts = split_key("teamA/dist123").unwrap();
        assert_eq!(parts.source, "dist123");
    }

    #[test]
    fn test_split_key_rejects_short_keys() {
        assert!(matches!(
            split_key("lonely.gz"),
            Err(ShipperError::InvalidKey(k)) if k == "lonely.gz"
        ));
        assert!(split_key("/dist/file.gz").is_err());
        assert!(split_key("ns//file.gz").is_err());
    }

    #[test]
    fn test_build_labels_dynamic() {
        let labels = build_labels("teamA/dist123/x.gz", "prod", &BTreeMap::new()).unwrap();

        assert_eq!(labels.len(), 4);
        assert_eq!(labels["namespace"], "teamA");
        assert_eq!(labels["cloudfront"], "dist123");
        assert_eq!(labels["cluster"], "prod");
        assert_eq!(labels["index"], "prod-teamA");
    }

    #[test]
    fn test_static_labels_extend_and_override() {
        let labels = build_labels(
            "teamA/dist123/x.gz",
            "prod",
            &statics(&[("env", "live"), ("cluster", "override"), ("index", "fixed")]),
        )
        .unwrap();

        assert_eq!(labels["env"], "live");
        assert_eq!(labels["cluster"], "override");
        assert_eq!(labels["index"], "fixed");
        assert_eq!(labels["namespace"], "teamA");
    }

    #[test]
    fn test_static_override_of_index_base() {
        let labels = build_labels(
            "teamA/dist123/x.gz",
            "prod",
            &statics(&[("cluster", "other")]),
        )
        .unwrap();

        assert_eq!(labels["cluster"], "other");
        // index is derived from the configured cluster, before overrides
        assert_eq!(labels["index"], "prod-teamA");
    }
}
