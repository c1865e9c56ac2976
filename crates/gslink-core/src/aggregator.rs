//! Fragmented-response aggregation
//!
//! Bulk queries may be answered by the backend in several partial
//! deliveries, each resolving or disclaiming a subset of the requested
//! ids. [`AggregationJob`] folds those deliveries over two independently
//! keyed collections and reports completion only when both are fully
//! accounted for.

use hashbrown::{HashMap, HashSet};

// ----------------------------------------------------------------------------
// Collection State
// ----------------------------------------------------------------------------

/// Accumulator for one keyed collection of a bulk query
#[derive(Debug, Clone)]
pub struct CollectionState<V> {
    outstanding: HashSet<u32>,
    resolved: HashMap<u32, V>,
    unknown: Vec<u32>,
}

impl<V> CollectionState<V> {
    pub fn new<I: IntoIterator<Item = u32>>(ids: I) -> Self {
        Self {
            outstanding: ids.into_iter().collect(),
            resolved: HashMap::new(),
            unknown: Vec::new(),
        }
    }

    /// Record a resolved entry.
    ///
    /// A later delivery supersedes an earlier "unknown" report for the
    /// same id.
    pub fn resolve(&mut self, id: u32, value: V) {
        self.outstanding.remove(&id);
        self.unknown.retain(|u| *u != id);
        self.resolved.insert(id, value);
    }

    /// Record an id the backend reported as unknown
    pub fn mark_unknown(&mut self, id: u32) {
        self.outstanding.remove(&id);
        if !self.resolved.contains_key(&id) && !self.unknown.contains(&id) {
            self.unknown.push(id);
        }
    }

    /// Whether every requested id is resolved or reported unknown
    pub fn is_complete(&self) -> bool {
        self.outstanding.is_empty()
    }

    pub fn outstanding(&self) -> &HashSet<u32> {
        &self.outstanding
    }

    pub fn resolved(&self) -> &HashMap<u32, V> {
        &self.resolved
    }

    pub fn unknown(&self) -> &[u32] {
        &self.unknown
    }

    fn finish(self) -> (HashMap<u32, V>, Vec<u32>) {
        (self.resolved, self.unknown)
    }
}

// ----------------------------------------------------------------------------
// Aggregation Job
// ----------------------------------------------------------------------------

/// Final outcome of an aggregated bulk query
#[derive(Debug, Clone)]
pub struct AggregationResult<A, P> {
    pub apps: HashMap<u32, A>,
    pub unknown_apps: Vec<u32>,
    pub packages: HashMap<u32, P>,
    pub unknown_packages: Vec<u32>,
}

/// Two-collection accumulator for one logical bulk query.
///
/// The job completes only when both collections are simultaneously
/// complete; deliveries arriving after partial completion keep folding in.
#[derive(Debug, Clone)]
pub struct AggregationJob<A, P> {
    pub apps: CollectionState<A>,
    pub packages: CollectionState<P>,
}

impl<A, P> AggregationJob<A, P> {
    pub fn new<I, J>(app_ids: I, package_ids: J) -> Self
    where
        I: IntoIterator<Item = u32>,
        J: IntoIterator<Item = u32>,
    {
        Self {
            apps: CollectionState::new(app_ids),
            packages: CollectionState::new(package_ids),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.apps.is_complete() && self.packages.is_complete()
    }

    pub fn finish(self) -> AggregationResult<A, P> {
        let (apps, unknown_apps) = self.apps.finish();
        let (packages, unknown_packages) = self.packages.finish();
        AggregationResult {
            apps,
            unknown_apps,
            packages,
            unknown_packages,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_collection_lifecycle() {
        let mut state: CollectionState<&str> = CollectionState::new([1, 2, 3]);
        assert!(!state.is_complete());

        state.resolve(1, "one");
        state.mark_unknown(2);
        assert!(!state.is_complete());

        state.resolve(3, "three");
        assert!(state.is_complete());
        assert_eq!(state.resolved().len(), 2);
        assert_eq!(state.unknown(), &[2]);
    }

    #[test]
    fn test_later_delivery_supersedes_unknown() {
        let mut state: CollectionState<&str> = CollectionState::new([5]);
        state.mark_unknown(5);
        assert!(state.is_complete());
        assert_eq!(state.unknown(), &[5]);

        state.resolve(5, "five");
        assert!(state.unknown().is_empty());
        assert_eq!(state.resolved().get(&5), Some(&"five"));
    }

    #[test]
    fn test_unknown_after_resolve_is_ignored() {
        let mut state: CollectionState<&str> = CollectionState::new([7]);
        state.resolve(7, "seven");
        state.mark_unknown(7);
        assert!(state.unknown().is_empty());
        assert_eq!(state.resolved().get(&7), Some(&"seven"));
    }

    #[test]
    fn test_completion_requires_both_collections() {
        // Requesting apps {10, 20} and packages {5}: the first delivery
        // resolves app 10 and reports package 5 unknown, the second
        // resolves app 20 and package 5.
        let mut job: AggregationJob<&str, &str> = AggregationJob::new([10, 20], [5]);

        job.apps.resolve(10, "app-ten");
        job.packages.mark_unknown(5);
        assert!(!job.is_complete());

        job.apps.resolve(20, "app-twenty");
        job.packages.resolve(5, "pkg-five");
        assert!(job.is_complete());

        let result = job.finish();
        assert_eq!(result.apps.len(), 2);
        assert!(result.unknown_apps.is_empty());
        assert_eq!(result.packages.get(&5), Some(&"pkg-five"));
        assert!(result.unknown_packages.is_empty());
    }

    #[test]
    fn test_empty_query_is_immediately_complete() {
        let job: AggregationJob<(), ()> = AggregationJob::new([], []);
        assert!(job.is_complete());
    }
}
