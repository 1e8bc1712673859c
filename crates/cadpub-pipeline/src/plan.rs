use std::collections::{BTreeMap, BTreeSet, VecDeque};

use cadpub_types::ArtifactKind;

use crate::error::{PipelineError, PipelineResult};

/// The kinds a revision publishes, ordered producers first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishPlan {
    order: Vec<ArtifactKind>,
    requested: BTreeSet<ArtifactKind>,
}

impl PublishPlan {
    /// Plan the requested kinds plus, transitively, every kind they are
    /// converted from.
    ///
    /// The source model is uploaded by the coordinator itself and cannot be
    /// requested.
    pub fn build(kinds: impl IntoIterator<Item = ArtifactKind>) -> PipelineResult<Self> {
        let requested: BTreeSet<ArtifactKind> = kinds.into_iter().collect();
        if requested.contains(&ArtifactKind::SourceModel) {
            return Err(PipelineError::InvalidArgument(
                "the source model is not a derivative and cannot be requested".into(),
            ));
        }

        let mut nodes = BTreeSet::new();
        let mut pending: Vec<ArtifactKind> = requested.iter().copied().collect();
        while let Some(kind) = pending.pop() {
            if nodes.insert(kind) {
                pending.extend(kind.dependencies().iter().copied());
            }
        }

        let order = topological_order(&nodes)?;
        Ok(Self { order, requested })
    }

    /// Kinds in dispatch order.
    pub fn order(&self) -> &[ArtifactKind] {
        &self.order
    }

    /// Whether `kind` is part of the plan, requested or not.
    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.order.contains(&kind)
    }

    /// Whether the caller asked for `kind` explicitly.
    pub fn is_requested(&self, kind: ArtifactKind) -> bool {
        self.requested.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Kahn's algorithm over the dependency edges within `nodes`. Ties are broken
/// by kind order so plans are deterministic.
fn topological_order(nodes: &BTreeSet<ArtifactKind>) -> PipelineResult<Vec<ArtifactKind>> {
    let mut in_degree: BTreeMap<ArtifactKind, usize> = BTreeMap::new();
    let mut consumers: BTreeMap<ArtifactKind, Vec<ArtifactKind>> = BTreeMap::new();
    for &kind in nodes {
        let deps: Vec<_> = kind.dependencies().iter().filter(|d| nodes.contains(*d)).collect();
        in_degree.insert(kind, deps.len());
        for &dep in deps {
            consumers.entry(dep).or_default().push(kind);
        }
    }

    let mut queue: VecDeque<ArtifactKind> = in_degree
        .iter()
        .filter(|&(_, &deg)| deg == 0)
        .map(|(&kind, _)| kind)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(current) = queue.pop_front() {
        order.push(current);
        for consumer in consumers.get(&current).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(consumer) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(*consumer);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(PipelineError::Config(
            "artifact dependencies form a cycle".into(),
        ));
    }
    Ok(order)
}
