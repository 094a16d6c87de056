//! Reconciler: merge preserved rows with fresh candidates into one
//! contiguous, 0-based ordering.

use std::collections::HashSet;

use goldi_storage::{PainPointRecord, PersonaRecord, SolutionRecord, UserStoryRecord};
use tracing::warn;

/// A row that lives at an ordinal position inside its scope.
pub trait Positioned {
    fn id(&self) -> &str;
    fn position(&self) -> u32;
    fn set_position(&mut self, position: u32);
    /// Whether the row survives regeneration without being named in the
    /// request (the stored locked flag, or the edited flag for stories).
    fn is_preserved(&self) -> bool;
}

macro_rules! positioned {
    ($ty:ty, $flag:ident) => {
        impl Positioned for $ty {
            fn id(&self) -> &str {
                &self.id
            }
            fn position(&self) -> u32 {
                self.position
            }
            fn set_position(&mut self, position: u32) {
                self.position = position;
            }
            fn is_preserved(&self) -> bool {
                self.$flag
            }
        }
    };
}

positioned!(PersonaRecord, is_locked);
positioned!(PainPointRecord, is_locked);
positioned!(SolutionRecord, is_locked);
positioned!(UserStoryRecord, is_edited);

/// Split the rows currently in scope into (preserved, replaced).
///
/// Preserved = rows named in `requested` plus rows already flagged. Requested
/// ids that are not in scope are ignored with a warning. Preserved rows come
/// back in their prior relative order.
pub fn partition_locked<T: Positioned>(existing: Vec<T>, requested: &[String]) -> (Vec<T>, Vec<T>) {
    let in_scope: HashSet<&str> = existing.iter().map(|r| r.id()).collect();
    let unknown: Vec<&String> = requested
        .iter()
        .filter(|id| !in_scope.contains(id.as_str()))
        .collect();
    if !unknown.is_empty() {
        warn!(ids = ?unknown, "ignoring locked ids that are not in scope");
    }

    let requested: HashSet<&str> = requested.iter().map(String::as_str).collect();
    let (mut locked, replaced): (Vec<T>, Vec<T>) = existing
        .into_iter()
        .partition(|r| r.is_preserved() || requested.contains(r.id()));
    locked.sort_by_key(|r| r.position());
    (locked, replaced)
}

/// The merged ordering of one run.
#[derive(Debug)]
pub struct Reconciliation<T, C> {
    /// Preserved rows with compacted positions `0..L`.
    pub locked: Vec<T>,
    /// Fresh candidates with their positions `L..L+N`, in generation order.
    pub fresh: Vec<(u32, C)>,
}

impl<T: Positioned, C> Reconciliation<T, C> {
    pub fn len(&self) -> usize {
        self.locked.len() + self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn locked_ids(&self) -> Vec<String> {
        self.locked.iter().map(|r| r.id().to_string()).collect()
    }
}

/// Assign positions: locked rows first in their prior relative order, then
/// candidates in generation order.
pub fn reconcile<T: Positioned, C>(mut locked: Vec<T>, candidates: Vec<C>) -> Reconciliation<T, C> {
    locked.sort_by_key(|r| r.position());
    for (i, row) in locked.iter_mut().enumerate() {
        row.set_position(i as u32);
    }
    let offset = locked.len() as u32;
    let fresh = candidates
        .into_iter()
        .enumerate()
        .map(|(i, c)| (offset + i as u32, c))
        .collect();
    Reconciliation { locked, fresh }
}

/// Resolves the zero-based indices a model used for upstream entities into
/// persisted ids. Lives for one run.
#[derive(Debug, Clone, Default)]
pub struct OrdinalResolver {
    ids: Vec<String>,
}

impl OrdinalResolver {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }

    pub fn from_rows<T: Positioned>(rows: &[T]) -> Self {
        Self::new(rows.iter().map(|r| r.id().to_string()).collect())
    }

    pub fn resolve(&self, index: usize) -> Option<&str> {
        self.ids.get(index).map(String::as_str)
    }

    /// Resolve every index, skipping ones without an id.
    pub fn resolve_all(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .filter_map(|&i| self.resolve(i))
            .map(str::to_string)
            .collect()
    }

    /// Reverse lookup: index of an id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|x| x == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: String,
        position: u32,
        locked: bool,
    }

    impl Positioned for Row {
        fn id(&self) -> &str {
            &self.id
        }
        fn position(&self) -> u32 {
            self.position
        }
        fn set_position(&mut self, position: u32) {
            self.position = position;
        }
        fn is_preserved(&self) -> bool {
            self.locked
        }
    }

    fn row(id: &str, position: u32, locked: bool) -> Row {
        Row {
            id: id.to_string(),
            position,
            locked,
        }
    }

    #[test]
    fn locked_rows_first_then_fresh() {
        let locked = vec![row("s2", 3, true), row("s1", 1, true)];
        let r = reconcile(locked, vec!["a", "b", "c"]);
        assert_eq!(r.locked_ids(), vec!["s1", "s2"]);
        assert_eq!(r.locked[0].position, 0);
        assert_eq!(r.locked[1].position, 1);
        assert_eq!(r.fresh, vec![(2, "a"), (3, "b"), (4, "c")]);
        assert_eq!(r.len(), 5);
    }

    #[test]
    fn partition_unions_request_and_flags() {
        let existing = vec![
            row("a", 0, false),
            row("b", 1, true),
            row("c", 2, false),
            row("d", 3, false),
        ];
        let (locked, replaced) =
            partition_locked(existing, &["c".to_string(), "ghost".to_string()]);
        let locked: Vec<&str> = locked.iter().map(|r| r.id.as_str()).collect();
        let replaced: Vec<&str> = replaced.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(locked, vec!["b", "c"]);
        assert_eq!(replaced, vec!["a", "d"]);
    }

    #[test]
    fn no_locks_means_everything_replaced() {
        let (locked, replaced) = partition_locked(vec![row("a", 0, false)], &[]);
        assert!(locked.is_empty());
        assert_eq!(replaced.len(), 1);
    }

    #[test]
    fn resolver_maps_indices_and_skips_unknown() {
        let resolver = OrdinalResolver::new(vec!["pp-0".into(), "pp-1".into()]);
        assert_eq!(resolver.resolve(1), Some("pp-1"));
        assert_eq!(resolver.resolve(2), None);
        assert_eq!(resolver.resolve_all(&[1, 5, 0]), vec!["pp-1", "pp-0"]);
        assert_eq!(resolver.index_of("pp-1"), Some(1));
    }
}
