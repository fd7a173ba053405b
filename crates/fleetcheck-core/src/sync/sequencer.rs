//! Entity-type dependency ordering and foreign-reference repair

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::models::{EntityKind, ForeignKeyed, RecordId};

/// Static reference graph between entity types.
///
/// An edge `child -> parent` means the child type carries foreign ids into
/// the parent type, so the parent must be synced and committed first.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<EntityKind>,
    parents: HashMap<EntityKind, Vec<EntityKind>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type with no dependencies (yet).
    #[must_use]
    pub fn with_node(mut self, kind: EntityKind) -> Self {
        if !self.nodes.contains(&kind) {
            self.nodes.push(kind);
        }
        self
    }

    /// Declare that `child` references `parent` by foreign id.
    #[must_use]
    pub fn with_dependency(mut self, child: EntityKind, parent: EntityKind) -> Self {
        self = self.with_node(parent).with_node(child);
        let parents = self.parents.entry(child).or_default();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
        self
    }

    /// Topologically sorted entity types, parents before children.
    ///
    /// Ties keep registration order so the sequence is deterministic.
    pub fn sorted(&self) -> Result<Vec<EntityKind>> {
        let mut remaining: Vec<EntityKind> = self.nodes.clone();
        let mut done: HashSet<EntityKind> = HashSet::new();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let ready = remaining.iter().position(|kind| {
                self.parents
                    .get(kind)
                    .is_none_or(|parents| parents.iter().all(|parent| done.contains(parent)))
            });
            match ready {
                Some(index) => {
                    let kind = remaining.remove(index);
                    done.insert(kind);
                    order.push(kind);
                }
                None => {
                    let stuck: Vec<&str> = remaining.iter().map(|kind| kind.key()).collect();
                    return Err(Error::DependencyCycle(stuck.join(", ")));
                }
            }
        }

        Ok(order)
    }
}

/// Ids committed by already-synced parent types within the current cycle.
#[derive(Debug, Default)]
pub struct ParentIndex {
    ids: HashMap<EntityKind, HashSet<RecordId>>,
}

impl ParentIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the committed ids of a parent type after its sync step.
    pub fn insert_ids(&mut self, kind: EntityKind, ids: impl IntoIterator<Item = RecordId>) {
        self.ids.entry(kind).or_default().extend(ids);
    }

    /// Whether `id` resolves within `kind`.
    ///
    /// A kind that was never indexed cannot be judged, so its references are
    /// treated as resolvable rather than repaired on no evidence.
    #[must_use]
    pub fn resolves(&self, kind: EntityKind, id: &RecordId) -> bool {
        self.ids
            .get(&kind)
            .is_none_or(|known| known.contains(id))
    }
}

/// Repair dangling foreign references against the committed parent index.
///
/// Optional references are cleared; mandatory ones receive the placeholder
/// parent id. Records are never dropped over a dangling reference, and each
/// repair is logged as a data-quality event.
pub fn repair_foreign_refs<R: ForeignKeyed>(
    records: Vec<R>,
    entity: EntityKind,
    parents: &ParentIndex,
) -> (Vec<R>, usize) {
    let mut repaired = 0_usize;

    let records = records
        .into_iter()
        .map(|record| {
            let mut current = record;
            for foreign in current.foreign_refs() {
                let Some(id) = &foreign.id else { continue };
                if id.is_placeholder() || parents.resolves(foreign.target, id) {
                    continue;
                }

                tracing::warn!(
                    "Dangling {} reference on {} record {}: {} not found, {}",
                    foreign.target,
                    entity,
                    current.record_id(),
                    id,
                    if foreign.mandatory {
                        "substituting placeholder parent"
                    } else {
                        "clearing optional reference"
                    }
                );
                current = current.with_repaired_ref(foreign.target, None);
                repaired += 1;
            }
            current
        })
        .collect();

    (records, repaired)
}
