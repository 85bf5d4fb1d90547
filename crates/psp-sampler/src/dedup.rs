//! Collapses chains that explore the same region into one representative.
//!
//! Chains are grouped by exact pattern equality first. Within a pattern group
//! a greedy pass compares each chain against the first member of every group
//! formed so far, in creation order, and joins the first group whose
//! representative intersects it. The pass is order dependent and not
//! transitive: a chain that only overlaps a non-representative member starts
//! its own group.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use psp_core::{Chain, Pattern, PspError};
use serde::{Deserialize, Serialize};

use crate::config::Options;
use crate::diagnostics::DiagnosticSink;
use crate::intersect::{intersects, Ellipsoid};

/// Counts describing one deduplication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupSummary {
    /// Chains present before the pass.
    pub chains_before: usize,
    /// Groups formed, one per surviving chain.
    pub groups: usize,
    /// Chains whose samples were appended to a representative.
    pub merged: usize,
    /// Chains deleted from the collection.
    pub removed: usize,
}

/// Partitions chain indices by exact pattern equality, in first-seen order.
pub fn group_by_pattern<P: Pattern>(chains: &[Chain<P>]) -> Vec<Vec<usize>> {
    let mut groups: IndexMap<&P, Vec<usize>> = IndexMap::new();
    for (index, chain) in chains.iter().enumerate() {
        groups.entry(chain.pattern()).or_default().push(index);
    }
    groups.into_values().collect()
}

/// Greedy first-member clustering of `indices` by ellipsoid overlap.
pub fn get_group_indices<P: Pattern>(
    chains: &[Chain<P>],
    indices: &[usize],
    scale: f64,
    variance_floor: f64,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<Vec<usize>>, PspError> {
    let Some((&first, rest)) = indices.split_first() else {
        return Ok(Vec::new());
    };
    if rest.is_empty() {
        return Ok(vec![vec![first]]);
    }
    let ellipsoid = |index: usize| -> Result<Ellipsoid, PspError> {
        Ellipsoid::from_chain(&chains[index], variance_floor)
            .map_err(|err| err.with_context("chain", index))
    };

    // (representative ellipsoid, members)
    let mut groups: Vec<(Ellipsoid, Vec<usize>)> = vec![(ellipsoid(first)?, vec![first])];
    for &index in rest {
        let candidate = ellipsoid(index)?;
        let mut placed = false;
        for (representative, members) in groups.iter_mut() {
            if intersects(representative, &candidate, scale, sink)? {
                members.push(index);
                placed = true;
                break;
            }
        }
        if !placed {
            groups.push((candidate, vec![index]));
        }
    }
    Ok(groups.into_iter().map(|(_, members)| members).collect())
}

fn pair_mut<P>(chains: &mut [Chain<P>], target: usize, donor: usize) -> (&mut Chain<P>, &Chain<P>) {
    if target < donor {
        let (head, tail) = chains.split_at_mut(donor);
        (&mut head[target], &tail[0])
    } else {
        let (head, tail) = chains.split_at_mut(target);
        (&mut tail[0], &head[donor])
    }
}

/// Appends up to `max_merge` extra members of each group to the group's first
/// member. Returns the number of chains merged.
pub fn merge_chains<P>(chains: &mut [Chain<P>], groups: &[Vec<usize>], max_merge: usize) -> usize {
    if max_merge == 0 {
        return 0;
    }
    let mut merged = 0;
    for group in groups {
        let Some((&representative, rest)) = group.split_first() else {
            continue;
        };
        for &donor in rest.iter().take(max_merge) {
            if donor == representative {
                continue;
            }
            let (target, source) = pair_mut(chains, representative, donor);
            target.absorb(source);
            merged += 1;
        }
    }
    merged
}

/// Deletes every non-representative member of every group. Returns the number
/// of chains removed.
pub fn remove_redundant_chains<P>(chains: &mut Vec<Chain<P>>, groups: &[Vec<usize>]) -> usize {
    let keep: BTreeSet<usize> = groups.iter().filter_map(|group| group.first().copied()).collect();
    let doomed: BTreeSet<usize> = groups
        .iter()
        .flat_map(|group| group.iter().skip(1).copied())
        .filter(|index| !keep.contains(index) && *index < chains.len())
        .collect();
    if doomed.is_empty() {
        return 0;
    }
    let mut position = 0usize;
    chains.retain(|_| {
        let retain = !doomed.contains(&position);
        position += 1;
        retain
    });
    doomed.len()
}

/// Groups, merges and prunes `chains` in place, leaving one chain per region.
///
/// Invalid options are rejected up front. All groups are computed before the
/// collection is touched, so an error leaves `chains` unchanged.
pub fn make_unique<P: Pattern>(
    chains: &mut Vec<Chain<P>>,
    options: &Options,
    sink: &dyn DiagnosticSink,
) -> Result<DedupSummary, PspError> {
    options.validate()?;
    let chains_before = chains.len();
    let mut groups = Vec::new();
    for pattern_group in group_by_pattern(chains) {
        groups.extend(get_group_indices(
            chains,
            &pattern_group,
            options.intersection_scale,
            options.variance_floor,
            sink,
        )?);
    }
    let merged = merge_chains(chains, &groups, options.max_merge);
    let removed = remove_redundant_chains(chains, &groups);
    tracing::debug!(
        chains_before,
        groups = groups.len(),
        merged,
        removed,
        "deduplication pass"
    );
    Ok(DedupSummary {
        chains_before,
        groups: groups.len(),
        merged,
        removed,
    })
}
