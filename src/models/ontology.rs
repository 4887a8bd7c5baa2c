//! Ontology document - the controlled vocabulary consumed by downstream
//! captioning. The curation pipeline itself never reads it; it is loaded and
//! validated up front so a malformed document aborts a run before any asset
//! work starts.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use crate::common::errors::PipelineError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ontology {
    pub version: String,
    pub buckets: BTreeMap<String, Bucket>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bucket {
    #[serde(default)]
    pub description: String,
    pub tokens: Vec<TokenEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenEntry {
    pub token: String,
    #[serde(default)]
    pub description: String,
}

impl Ontology {
    /// Structural validation beyond what deserialization enforces: at least
    /// one bucket, no empty bucket, token names unique within a bucket.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.buckets.is_empty() {
            return Err(PipelineError::Configuration(
                "ontology must contain at least one bucket".into(),
            ));
        }

        for (name, bucket) in &self.buckets {
            if bucket.tokens.is_empty() {
                return Err(PipelineError::Configuration(format!(
                    "ontology bucket `{}` cannot be empty",
                    name
                )));
            }
            let mut seen = HashSet::new();
            for entry in &bucket.tokens {
                if !seen.insert(entry.token.as_str()) {
                    return Err(PipelineError::Configuration(format!(
                        "token `{}` appears more than once in bucket `{}`",
                        entry.token, name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Flat set of every token name across all buckets.
    pub fn all_tokens(&self) -> BTreeSet<&str> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.tokens.iter().map(|entry| entry.token.as_str()))
            .collect()
    }
}

/// Load and validate an ontology from a JSON document. Every failure mode
/// here is a `Configuration` error and fatal to the run.
pub fn load_ontology(path: &Path) -> Result<Ontology> {
    let raw = fs::read_to_string(path).map_err(|e| {
        PipelineError::Configuration(format!("ontology file {:?} unreadable: {}", path, e))
    })?;

    let ontology: Ontology = serde_json::from_str(&raw).map_err(|e| {
        PipelineError::Configuration(format!("ontology file {:?} malformed: {}", path, e))
    })?;

    ontology.validate()?;
    Ok(ontology)
}
