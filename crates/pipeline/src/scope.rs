//! In-process mutual exclusion of workflow runs per scope.
//!
//! Scopes are `/`-separated paths. Two scopes conflict when they are equal
//! or one is an ancestor of the other, so a run over a project's personas
//! excludes every run over a single persona of that project.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::WorkflowError;

/// Registry of busy scopes. Cloning shares the registry.
#[derive(Debug, Clone, Default)]
pub struct ScopeLocks {
    busy: Arc<Mutex<HashSet<String>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `scope` for the lifetime of the returned guard, or fail with
    /// `ScopeBusy` if a run holds an overlapping scope.
    pub fn try_acquire(&self, scope: impl Into<String>) -> Result<ScopeGuard, WorkflowError> {
        let scope = scope.into();
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if busy.iter().any(|held| overlaps(held, &scope)) {
            return Err(WorkflowError::ScopeBusy { scope });
        }
        busy.insert(scope.clone());
        Ok(ScopeGuard {
            busy: self.busy.clone(),
            scope,
        })
    }

    /// Whether acquiring `scope` would fail right now.
    pub fn is_busy(&self, scope: &str) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|held| overlaps(held, scope))
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    fn within(outer: &str, inner: &str) -> bool {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
    within(a, b) || within(b, a)
}

/// Releases its scope on drop.
#[derive(Debug)]
pub struct ScopeGuard {
    busy: Arc<Mutex<HashSet<String>>>,
    scope: String,
}

impl ScopeGuard {
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.scope);
    }
}

/// Every persona of a project, and everything hanging off them.
pub fn personas(project_id: &str) -> String {
    format!("project/{project_id}/personas")
}

/// One persona's pain points and solutions. Both workflows share it.
pub fn persona(project_id: &str, persona_id: &str) -> String {
    format!("project/{project_id}/personas/{persona_id}")
}

pub fn user_stories(project_id: &str) -> String {
    format!("project/{project_id}/user_stories")
}

pub fn architecture(project_id: &str) -> String {
    format!("project/{project_id}/architecture")
}

pub fn problem(project_id: &str) -> String {
    format!("project/{project_id}/problem")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_busy_until_release() {
        let locks = ScopeLocks::new();
        let guard = locks.try_acquire(persona("p1", "per-1")).unwrap();
        assert_eq!(guard.scope(), "project/p1/personas/per-1");

        let err = locks.try_acquire(persona("p1", "per-1")).unwrap_err();
        assert!(
            matches!(err, WorkflowError::ScopeBusy { ref scope } if scope == "project/p1/personas/per-1")
        );

        drop(guard);
        assert!(!locks.is_busy(&persona("p1", "per-1")));
        assert!(locks.try_acquire(persona("p1", "per-1")).is_ok());
    }

    #[test]
    fn persona_list_excludes_single_persona_runs() {
        let locks = ScopeLocks::new();
        let one = locks.try_acquire(persona("p1", "per-1")).unwrap();
        assert!(locks.try_acquire(personas("p1")).is_err());
        drop(one);

        let _all = locks.try_acquire(personas("p1")).unwrap();
        assert!(locks.try_acquire(persona("p1", "per-2")).is_err());
        assert!(locks.is_busy(&persona("p1", "per-9")));
    }

    #[test]
    fn unrelated_scopes_do_not_conflict() {
        let locks = ScopeLocks::new();
        let _a = locks.try_acquire(persona("p1", "per-1")).unwrap();
        let _b = locks.try_acquire(persona("p1", "per-2")).unwrap();
        let _c = locks.try_acquire(personas("p2")).unwrap();
        let _d = locks.try_acquire(user_stories("p1")).unwrap();
        let _e = locks.try_acquire(architecture("p1")).unwrap();
        assert!(!locks.is_busy(&problem("p1")));
    }

    #[test]
    fn prefix_must_end_on_a_segment() {
        assert!(overlaps("project/p1", "project/p1/personas"));
        assert!(!overlaps("project/p1", "project/p10/personas"));
        assert!(!overlaps("project/p1/personas", "project/p1/personas2"));
    }

    #[test]
    fn clones_share_registry() {
        let locks = ScopeLocks::new();
        let other = locks.clone();
        let _g = locks.try_acquire(user_stories("p")).unwrap();
        assert!(other.try_acquire(user_stories("p")).is_err());
    }
}
