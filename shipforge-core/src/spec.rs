//! The product specification the core consumes: [`ProductSpec`] and [`Feature`].

use crate::error::AutoError;
use crate::ids::{FeatureId, Priority};
use serde::{Deserialize, Serialize};

/// HTTP method, closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "PATCH")]
    Patch,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "HEAD")]
    Head,
    #[serde(rename = "OPTIONS")]
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

/// A single API endpoint declared by a [`Feature`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Api {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Api {
    pub fn validate(&self) -> Result<(), String> {
        if !self.path.starts_with('/') {
            return Err(format!("api path must begin with '/': {}", self.path));
        }
        Ok(())
    }
}

/// A single product feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub title: String,
    pub desc: String,
    pub priority: Priority,
    #[serde(default)]
    pub api: Vec<Api>,
    pub success: Vec<String>,
    #[serde(default)]
    pub trace: Vec<String>,
    #[serde(default)]
    pub refs: Vec<String>,
}

impl Feature {
    pub fn validate(&self) -> Result<(), AutoError> {
        if self.success.is_empty() {
            return Err(AutoError::InvalidProductSpec(format!(
                "feature '{}' must declare at least one success criterion",
                self.id
            )));
        }
        for api in &self.api {
            api.validate()
                .map_err(|reason| AutoError::InvalidProductSpec(format!("feature '{}': {reason}", self.id)))?;
        }
        Ok(())
    }
}

/// A milestone references an ordered set of features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    #[serde(default)]
    pub features: Vec<FeatureId>,
}

/// Non-functional requirements, free-form text bucketed by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NonFunctional {
    #[serde(default)]
    pub items: Vec<String>,
}

/// The input product specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub product: String,
    pub goals: Vec<String>,
    pub features: Vec<Feature>,
    #[serde(default)]
    pub non_functional: NonFunctional,
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl ProductSpec {
    /// Validate the structural invariants spelled out in the data model.
    pub fn validate(&self) -> Result<(), AutoError> {
        if self.product.trim().is_empty() {
            return Err(AutoError::InvalidProductSpec("product name must not be empty".into()));
        }
        if self.goals.is_empty() {
            return Err(AutoError::InvalidProductSpec("at least one goal is required".into()));
        }
        if self.features.is_empty() {
            return Err(AutoError::InvalidProductSpec("at least one feature is required".into()));
        }
        if self.acceptance.is_empty() {
            return Err(AutoError::InvalidProductSpec("at least one acceptance criterion is required".into()));
        }
        for feature in &self.features {
            feature.validate()?;
        }
        let known: std::collections::HashSet<&FeatureId> = self.features.iter().map(|f| &f.id).collect();
        for milestone in &self.milestones {
            for fid in &milestone.features {
                if !known.contains(fid) {
                    return Err(AutoError::InvalidProductSpec(format!(
                        "milestone '{}' references unknown feature '{}'",
                        milestone.name, fid
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.iter().find(|f| &f.id == id)
    }
}
