//! The content-hashed, feature-keyed snapshot of a [`ProductSpec`](crate::spec::ProductSpec).

use crate::error::AutoError;
use crate::hash::hash_feature;
use crate::ids::FeatureId;
use crate::spec::ProductSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SPEC_LOCK_VERSION: &str = "1";

/// One locked feature entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    pub hash: String,
    pub openapi_path: String,
    pub test_paths: Vec<String>,
}

/// `{version, features: {<featureID>: {hash, openapi_path, test_paths}}}`.
///
/// The mapping is keyed — iteration order is irrelevant to equality or to
/// the hash of any individual entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecLock {
    pub version: String,
    pub features: BTreeMap<FeatureId, LockEntry>,
}

impl SpecLock {
    /// Hash every feature of `spec` and produce the locked snapshot.
    ///
    /// `openapi_path` and `test_paths` are derived deterministically from the
    /// feature id (`openapi/<id>.yaml`, `tests/<id>_test.rs`) — the spec
    /// leaves their provenance open; this is the resolved convention.
    pub fn generate(spec: &ProductSpec) -> Self {
        let mut features = BTreeMap::new();
        for feature in &spec.features {
            let entry = LockEntry {
                hash: hash_feature(feature),
                openapi_path: format!("openapi/{}.yaml", feature.id),
                test_paths: vec![format!("tests/{}_test.rs", feature.id)],
            };
            features.insert(feature.id.clone(), entry);
        }
        SpecLock {
            version: SPEC_LOCK_VERSION.to_string(),
            features,
        }
    }

    pub fn entry(&self, id: &FeatureId) -> Result<&LockEntry, AutoError> {
        self.features
            .get(id)
            .ok_or_else(|| AutoError::MissingLockEntry(id.to_string()))
    }
}
