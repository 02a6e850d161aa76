//! Entity classification lookups.
//!
//! The synthesizer only needs a [`ClassificationResolver`]; where the facts
//! come from is the caller's business. [`LookupResolver`] is the in-memory
//! implementation backed by a classification file, which is what the binary
//! uses and what tests stand in for with fixtures.
//!
//! ```rust,ignore
//! use debt_charts::classify::{ClassFilter, LookupResolver};
//!
//! let resolver = LookupResolver::from_path("raw_data/classifications.csv")?;
//! let africa = ClassFilter::region("Africa").excluding_income("High income");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::error::ClassificationError;
use crate::parser::read_records;

// =============================================================================
// Resolver interface
// =============================================================================

/// Identifier kinds a resolver converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    EntityCode,
    Name,
    Iso3Code,
    Region,
    IncomeLevel,
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdType::EntityCode => "entity_code",
            IdType::Name => "name",
            IdType::Iso3Code => "iso3_code",
            IdType::Region => "region",
            IdType::IncomeLevel => "income_level",
        };
        f.write_str(name)
    }
}

/// What to do when an identifier has no match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnNotFound {
    #[default]
    Ignore,
    Error,
}

/// Classification of one entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassificationFact {
    pub entity_code: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub iso3_code: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub income_level: Option<String>,
}

/// Converts entity identifiers between [`IdType`]s.
pub trait ClassificationResolver {
    /// Resolve every id, positionally. Unmatched ids are `None` under
    /// [`OnNotFound::Ignore`] and an error under [`OnNotFound::Error`].
    fn resolve(
        &self,
        ids: &[String],
        from: IdType,
        to: IdType,
        on_not_found: OnNotFound,
    ) -> Result<Vec<Option<String>>, ClassificationError>;

    /// Full facts for a batch of entity codes. An entity with no iso3 code,
    /// region or income level is unresolvable and maps to `None`.
    fn classify(
        &self,
        entity_codes: &[String],
    ) -> Result<Vec<Option<ClassificationFact>>, ClassificationError> {
        let lookup = |to| self.resolve(entity_codes, IdType::EntityCode, to, OnNotFound::Ignore);
        let iso3 = lookup(IdType::Iso3Code)?;
        let region = lookup(IdType::Region)?;
        let income = lookup(IdType::IncomeLevel)?;

        let facts = entity_codes
            .iter()
            .zip(iso3)
            .zip(region)
            .zip(income)
            .map(|(((code, iso3_code), region), income_level)| {
                if iso3_code.is_none() && region.is_none() && income_level.is_none() {
                    return None;
                }
                Some(ClassificationFact {
                    entity_code: code.clone(),
                    entity_name: None,
                    iso3_code,
                    region,
                    income_level,
                })
            })
            .collect();
        Ok(facts)
    }
}

// =============================================================================
// Lookup-table resolver
// =============================================================================

/// Resolver over an in-memory list of facts.
///
/// Names match case-insensitively; codes match exactly.
#[derive(Debug, Clone, Default)]
pub struct LookupResolver {
    facts: Vec<ClassificationFact>,
    by_code: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_iso3: HashMap<String, usize>,
}

impl LookupResolver {
    pub fn new(facts: Vec<ClassificationFact>) -> Self {
        let mut resolver = Self {
            facts: Vec::with_capacity(facts.len()),
            ..Self::default()
        };
        for fact in facts {
            resolver.insert(fact);
        }
        resolver
    }

    /// Load facts from a CSV or JSON classification file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ClassificationError> {
        let facts: Vec<ClassificationFact> = read_records(path.as_ref())?;
        Ok(Self::new(facts))
    }

    fn insert(&mut self, fact: ClassificationFact) {
        let idx = self.facts.len();
        self.by_code.insert(fact.entity_code.clone(), idx);
        if let Some(name) = &fact.entity_name {
            self.by_name.insert(name.to_lowercase(), idx);
        }
        if let Some(iso3) = &fact.iso3_code {
            self.by_iso3.insert(iso3.clone(), idx);
        }
        self.facts.push(fact);
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    fn find(&self, id: &str, from: IdType) -> Option<&ClassificationFact> {
        let idx = match from {
            IdType::EntityCode => self.by_code.get(id),
            IdType::Name => self.by_name.get(&id.to_lowercase()),
            IdType::Iso3Code => self.by_iso3.get(id),
            // Regions and income levels are not unique keys.
            IdType::Region | IdType::IncomeLevel => None,
        }?;
        self.facts.get(*idx)
    }
}

fn project(fact: &ClassificationFact, to: IdType) -> Option<String> {
    match to {
        IdType::EntityCode => Some(fact.entity_code.clone()),
        IdType::Name => fact.entity_name.clone(),
        IdType::Iso3Code => fact.iso3_code.clone(),
        IdType::Region => fact.region.clone(),
        IdType::IncomeLevel => fact.income_level.clone(),
    }
}

impl ClassificationResolver for LookupResolver {
    fn resolve(
        &self,
        ids: &[String],
        from: IdType,
        to: IdType,
        on_not_found: OnNotFound,
    ) -> Result<Vec<Option<String>>, ClassificationError> {
        ids.iter()
            .map(|id| {
                let resolved = self.find(id, from).and_then(|fact| project(fact, to));
                match (resolved, on_not_found) {
                    (None, OnNotFound::Error) => Err(ClassificationError::NotFound {
                        id: id.clone(),
                        from: from.to_string(),
                    }),
                    (resolved, _) => Ok(resolved),
                }
            })
            .collect()
    }
}

// =============================================================================
// Predicates
// =============================================================================

/// Decides whether a classified entity belongs to a synthetic aggregate.
pub trait EntityPredicate {
    fn matches(&self, fact: &ClassificationFact) -> bool;
}

impl<F> EntityPredicate for F
where
    F: Fn(&ClassificationFact) -> bool,
{
    fn matches(&self, fact: &ClassificationFact) -> bool {
        self(fact)
    }
}

/// Declarative predicate on region and income level.
///
/// An empty `include_income_levels` accepts every income level not listed in
/// `exclude_income_levels`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassFilter {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub include_income_levels: Vec<String>,
    #[serde(default)]
    pub exclude_income_levels: Vec<String>,
}

impl ClassFilter {
    pub fn region(region: impl Into<String>) -> Self {
        Self {
            region: Some(region.into()),
            ..Self::default()
        }
    }

    pub fn including_income(mut self, level: impl Into<String>) -> Self {
        self.include_income_levels.push(level.into());
        self
    }

    pub fn excluding_income(mut self, level: impl Into<String>) -> Self {
        self.exclude_income_levels.push(level.into());
        self
    }
}

impl EntityPredicate for ClassFilter {
    fn matches(&self, fact: &ClassificationFact) -> bool {
        if let Some(region) = &self.region {
            if fact.region.as_deref() != Some(region.as_str()) {
                return false;
            }
        }

        let income = fact.income_level.as_deref();
        if !self.include_income_levels.is_empty()
            && !self.include_income_levels.iter().any(|l| Some(l.as_str()) == income)
        {
            return false;
        }

        // An unknown income level is not an excluded one.
        !self.exclude_income_levels.iter().any(|l| Some(l.as_str()) == income)
    }
}
