//! Reference Resolver - materializes every model a tree refers to
//!
//! Resolution algorithm:
//! 1. Decompose the submitted tree; its units are materialized as-is
//! 2. Depth-first over references not yet materialized: look each one up
//! 3. Exactly one hit binds the reference; zero is dangling, more is ambiguous
//! 4. Units looked up are decomposed in turn and their references followed
//!
//! A URI is looked up at most once per resolution. A reference back to a
//! materialized unit (including a cycle) reuses that unit. Chains longer
//! than the hop limit fail instead of recursing further.

use std::collections::{BTreeMap, BTreeSet};
use crate::model::{ComponentModel, ModelUnit};
use crate::uri::ModelUri;
use crate::{Error, Result};

pub use crate::storage::DEFAULT_MAX_HOPS;

/// Source of models for references missing from a tree.
///
/// Implemented for any `FnMut(&ModelUri) -> Result<Vec<ComponentModel>>`.
pub trait ModelLookup {
    /// Every model stored under `uri`
    fn lookup(&mut self, uri: &ModelUri) -> Result<Vec<ComponentModel>>;
}

impl<F> ModelLookup for F
where
    F: FnMut(&ModelUri) -> Result<Vec<ComponentModel>>,
{
    fn lookup(&mut self, uri: &ModelUri) -> Result<Vec<ComponentModel>> {
        self(uri)
    }
}

/// Request-scoped bookkeeping of one resolution.
#[derive(Debug, Default)]
struct ResolutionContext {
    units: BTreeMap<ModelUri, ModelUnit>,
    lookups: usize,
}

impl ResolutionContext {
    fn is_resolved(&self, uri: &ModelUri) -> bool {
        self.units.contains_key(uri)
    }

    /// Materialize a unit; returns the references to follow when it is new
    fn materialize(&mut self, unit: ModelUnit) -> Vec<ModelUri> {
        if self.is_resolved(&unit.uri) {
            return Vec::new();
        }
        let references = unit.references().cloned().collect();
        self.units.insert(unit.uri.clone(), unit);
        references
    }
}

/// Outcome of a resolution: every reachable unit exactly once.
#[derive(Debug, Clone)]
pub struct ResolvedTree {
    root: ModelUri,
    units: BTreeMap<ModelUri, ModelUnit>,
    submitted: BTreeSet<ModelUri>,
    lookups: usize,
}

impl ResolvedTree {
    pub fn root(&self) -> &ModelUri {
        &self.root
    }

    pub fn root_unit(&self) -> Option<&ModelUnit> {
        self.units.get(&self.root)
    }

    pub fn get(&self, uri: &ModelUri) -> Option<&ModelUnit> {
        self.units.get(uri)
    }

    /// Units ordered by URI
    pub fn units(&self) -> impl Iterator<Item = &ModelUnit> {
        self.units.values()
    }

    pub fn into_units(self) -> Vec<ModelUnit> {
        self.units.into_values().collect()
    }

    /// Units decomposed from the tree itself, ordered by URI
    pub fn submitted_units(&self) -> impl Iterator<Item = &ModelUnit> {
        self.units.values().filter(|unit| self.submitted.contains(&unit.uri))
    }

    /// Whether `uri` came from the tree rather than a lookup
    pub fn is_submitted(&self, uri: &ModelUri) -> bool {
        self.submitted.contains(uri)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of lookup calls the resolution made
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

/// Resolver for references between component models
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    max_hops: usize,
}

impl Default for ReferenceResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceResolver {
    pub fn new() -> Self {
        Self { max_hops: DEFAULT_MAX_HOPS }
    }

    pub fn with_max_hops(max_hops: usize) -> Self {
        Self { max_hops }
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Resolve every reference reachable from `tree`
    pub fn resolve<L>(&self, tree: &ComponentModel, lookup: &mut L) -> Result<ResolvedTree>
    where
        L: ModelLookup + ?Sized,
    {
        let root = tree.primary_uri()?;
        let mut ctx = ResolutionContext::default();

        let mut pending = Vec::new();
        let mut submitted = BTreeSet::new();
        for unit in tree.decompose()? {
            submitted.insert(unit.uri.clone());
            pending.extend(ctx.materialize(unit));
        }

        for uri in pending {
            self.resolve_reference(&uri, 1, &mut ctx, lookup)?;
        }

        tracing::debug!(
            "Resolved {} into {} units with {} lookups",
            root,
            ctx.units.len(),
            ctx.lookups
        );

        Ok(ResolvedTree {
            root,
            units: ctx.units,
            submitted,
            lookups: ctx.lookups,
        })
    }

    fn resolve_reference<L>(
        &self,
        uri: &ModelUri,
        hops: usize,
        ctx: &mut ResolutionContext,
        lookup: &mut L,
    ) -> Result<()>
    where
        L: ModelLookup + ?Sized,
    {
        if ctx.is_resolved(uri) {
            return Ok(());
        }
        if hops > self.max_hops {
            return Err(Error::ReferenceCycleExceeded {
                uri: uri.to_uri_string(),
                limit: self.max_hops,
            });
        }

        ctx.lookups += 1;
        tracing::debug!("Looking up {} (hop {})", uri, hops);
        let mut hits = lookup.lookup(uri)?;
        let model = match hits.len() {
            0 => return Err(Error::DanglingReference(uri.to_uri_string())),
            1 => hits.remove(0),
            n => {
                return Err(Error::AmbiguousReference {
                    uri: uri.to_uri_string(),
                    matches: n,
                })
            }
        };

        let units = model.decompose()?;
        if !units.iter().any(|unit| &unit.uri == uri) {
            return Err(Error::DanglingReference(format!(
                "{} (lookup returned {})",
                uri,
                model.primary_uri()?
            )));
        }

        let mut next = Vec::new();
        for unit in units {
            next.extend(ctx.materialize(unit));
        }
        for reference in next {
            self.resolve_reference(&reference, hops + 1, ctx, lookup)?;
        }
        Ok(())
    }
}
