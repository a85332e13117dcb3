use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use strata_eval::EvaluationResult;
use strata_merge::Snapshot;
use strata_types::ConfigId;
use strata_vars::VariableRegistry;

/// The snapshot readers observe: built in full by one refresh and swapped in
/// atomically.
#[derive(Clone, Debug)]
pub struct ActiveState {
    pub snapshot: Arc<Snapshot>,
    pub variables: Arc<VariableRegistry>,
    /// Number of completed refreshes.
    pub generation: u64,
    /// Latest valid evaluation of every top-level element.
    pub results: BTreeMap<ConfigId, EvaluationResult>,
    /// Elements awaiting re-evaluation: invalid, failed, or carrying
    /// references that may resolve later.
    pub deferred: BTreeSet<ConfigId>,
}

impl ActiveState {
    /// State before the first refresh: nothing loaded.
    pub fn empty(variables: VariableRegistry) -> Self {
        Self {
            snapshot: Arc::new(Snapshot::new()),
            variables: Arc::new(variables),
            generation: 0,
            results: BTreeMap::new(),
            deferred: BTreeSet::new(),
        }
    }

    pub fn result(&self, identity: &ConfigId) -> Option<&EvaluationResult> {
        self.results.get(identity)
    }
}

/// What one refresh did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RefreshReport {
    /// Generation of the state this refresh installed.
    pub generation: u64,
    /// Variables whose resolved value changed.
    pub variables_changed: Vec<String>,
    /// Objects whose stored properties changed.
    pub updated: Vec<ConfigId>,
    /// Objects deleted from the store.
    pub deleted: Vec<ConfigId>,
    /// Top-level elements that evaluated but are not valid.
    pub invalid: Vec<ConfigId>,
    /// Top-level elements whose evaluation failed, with the error.
    pub failed: Vec<(ConfigId, String)>,
    /// Elements kept for re-evaluation.
    pub deferred: Vec<ConfigId>,
    /// `true` when notifications were still running at the timeout.
    pub notifications_timed_out: bool,
}

impl RefreshReport {
    /// Nothing was written or deleted.
    pub fn is_noop(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }
}
