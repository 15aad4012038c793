// src/model/query.rs
use crate::planner::relation::RelationId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read query file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse query JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse query TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("Duplicate relation: {0}")]
    DuplicateRelation(String),

    #[error("Relation {0} has an invalid row count")]
    InvalidRows(String),

    #[error("Predicate {left} = {right} has selectivity {selectivity}, expected a value in (0, 1]")]
    InvalidSelectivity {
        left: String,
        right: String,
        selectivity: f64,
    },

    #[error("Predicate joins {0} with itself")]
    SelfJoin(String),
}

/// A base relation and its estimated row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub rows: f64,
}

/// An equi-join predicate between two relations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinPredicate {
    pub left: String,
    pub right: String,
    #[serde(default = "default_selectivity")]
    pub selectivity: f64,
}

fn default_selectivity() -> f64 {
    0.1
}

/// `relation` may only be joined once every relation in `requires` is
/// already part of the same join (the inner side of an outer join, say).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingRestriction {
    pub relation: String,
    pub requires: Vec<String>,
}

/// The relations of one query and the predicates between them.
///
/// Relations are numbered by their position in `relations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryGraph {
    pub relations: Vec<RelationDef>,
    #[serde(default)]
    pub predicates: Vec<JoinPredicate>,
    #[serde(default)]
    pub restrictions: Vec<OrderingRestriction>,
}

impl QueryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relations `r0..rN` joined in a line, `r{i}` with `r{i+1}`.
    pub fn chain(rows: &[f64], selectivity: f64) -> Self {
        let mut query = Self::new();
        for (i, &count) in rows.iter().enumerate() {
            query.add_relation(&format!("r{}", i), count);
        }
        for i in 1..rows.len() {
            query.add_predicate(&format!("r{}", i - 1), &format!("r{}", i), selectivity);
        }
        query
    }

    pub fn add_relation(&mut self, name: &str, rows: f64) -> RelationId {
        self.relations.push(RelationDef {
            name: name.to_string(),
            rows,
        });
        self.relations.len() - 1
    }

    pub fn add_predicate(&mut self, left: &str, right: &str, selectivity: f64) -> &mut Self {
        self.predicates.push(JoinPredicate {
            left: left.to_string(),
            right: right.to_string(),
            selectivity,
        });
        self
    }

    pub fn add_restriction(&mut self, relation: &str, requires: &[&str]) -> &mut Self {
        self.restrictions.push(OrderingRestriction {
            relation: relation.to_string(),
            requires: requires.iter().map(|r| r.to_string()).collect(),
        });
        self
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn relation_id(&self, name: &str) -> Option<RelationId> {
        self.relations.iter().position(|r| r.name == name)
    }

    pub fn relation_name(&self, id: RelationId) -> Option<&str> {
        self.relations.get(id).map(|r| r.name.as_str())
    }

    /// Look a relation up by name.
    pub fn resolve(&self, name: &str) -> Result<RelationId, ModelError> {
        self.relation_id(name)
            .ok_or_else(|| ModelError::UnknownRelation(name.to_string()))
    }

    /// Check names, row counts and selectivities.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut seen = HashSet::new();
        for relation in &self.relations {
            if !seen.insert(relation.name.as_str()) {
                return Err(ModelError::DuplicateRelation(relation.name.clone()));
            }
            if !relation.rows.is_finite() || relation.rows < 0.0 {
                return Err(ModelError::InvalidRows(relation.name.clone()));
            }
        }

        for predicate in &self.predicates {
            let left = self.resolve(&predicate.left)?;
            let right = self.resolve(&predicate.right)?;
            if left == right {
                return Err(ModelError::SelfJoin(predicate.left.clone()));
            }
            if !(predicate.selectivity > 0.0 && predicate.selectivity <= 1.0) {
                return Err(ModelError::InvalidSelectivity {
                    left: predicate.left.clone(),
                    right: predicate.right.clone(),
                    selectivity: predicate.selectivity,
                });
            }
        }

        for restriction in &self.restrictions {
            self.resolve(&restriction.relation)?;
            for name in &restriction.requires {
                self.resolve(name)?;
            }
        }
        Ok(())
    }

    pub fn from_json(content: &str) -> Result<Self, ModelError> {
        let query: QueryGraph = serde_json::from_str(content)?;
        query.validate()?;
        Ok(query)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let query: QueryGraph = toml::from_str(content)?;
        query.validate()?;
        Ok(query)
    }

    /// Load a query; `.toml` files are read as TOML, anything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json(&content),
        }
    }
}
