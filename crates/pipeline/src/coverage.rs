//! CoverageValidator: find upstream entities no output references.

use std::collections::{BTreeSet, HashSet};

/// Indices in `0..upstream_len` not present in any reference list.
pub fn find_gaps<'a, I>(upstream_len: usize, references: I) -> Vec<usize>
where
    I: IntoIterator<Item = &'a [usize]>,
{
    let covered: BTreeSet<usize> = references.into_iter().flatten().copied().collect();
    (0..upstream_len).filter(|i| !covered.contains(i)).collect()
}

/// Remap indices that refer to the gap list into indices of the full
/// upstream list. Indices past the gap list are dropped.
pub fn remap_to_full(indices: &[usize], gaps: &[usize]) -> Vec<usize> {
    indices.iter().filter_map(|&i| gaps.get(i).copied()).collect()
}

/// Whether a persona set is too uniform: fewer than 3 distinct industries or
/// fewer than 4 distinct roles. Each threshold only applies when `target`
/// personas could reach it.
pub fn lacks_diversity<'a, I>(personas: I, target: usize) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut industries = HashSet::new();
    let mut roles = HashSet::new();
    for (industry, role) in personas {
        industries.insert(industry.trim().to_lowercase());
        roles.insert(role.trim().to_lowercase());
    }
    (target >= 3 && industries.len() < 3) || (target >= 4 && roles.len() < 4)
}
