use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use strata_diff::{compute_delta, ConfigDelta, DeltaKind, DeltaReason};
use strata_eval::{identity_for, ConfigEvaluator, EvaluationResult};
use strata_merge::{ConfigLoader, DocumentParser, DocumentSource, JsonDocumentParser, Snapshot};
use strata_model::ConfigElement;
use strata_schema::{RegistryEntry, SchemaRegistry};
use strata_store::{ConfigEvent, ConfigNotifier, EventKind, NoOpNotifier, PersistentStore};
use strata_types::{ConfigId, OnError};
use strata_vars::{EnvironmentSource, ProcessEnvironment, VariableRegistry};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::state::{ActiveState, RefreshReport};

/// One top-level element queued for evaluation.
struct Work {
    identity: ConfigId,
    element: ConfigElement,
    entry: Option<Arc<RegistryEntry>>,
    reason: &'static str,
}

impl Work {
    fn new(element: ConfigElement, entry: Option<Arc<RegistryEntry>>, reason: &'static str) -> Self {
        Self {
            identity: identity_for(&element, entry.as_deref()),
            element,
            entry,
            reason,
        }
    }
}

fn delta_reason(delta: &ConfigDelta) -> &'static str {
    match (delta.kind, delta.reason) {
        (DeltaKind::Added, _) => "added",
        (DeltaKind::Removed, _) => "removed",
        (DeltaKind::Modified, DeltaReason::PropertiesUpdate) => "properties updated",
        (DeltaKind::Modified, DeltaReason::NestedUpdateOnly) => "nested elements updated",
    }
}

/// Drives refreshes: load documents, diff against the active snapshot,
/// evaluate what changed, persist, notify, then swap the new snapshot in.
///
/// Refreshes are serialized by an async lock. Readers call
/// [`state`](Self::state) at any time and always see a complete snapshot.
pub struct ConfigRuntime {
    config: RuntimeConfig,
    registry: Arc<dyn SchemaRegistry>,
    store: Arc<dyn PersistentStore>,
    notifier: Arc<dyn ConfigNotifier>,
    source: Arc<dyn DocumentSource>,
    parser: Arc<dyn DocumentParser>,
    environment: Arc<dyn EnvironmentSource>,
    state: ArcSwap<ActiveState>,
    refresh_lock: Mutex<()>,
}

impl ConfigRuntime {
    pub fn new(
        config: RuntimeConfig,
        registry: Arc<dyn SchemaRegistry>,
        store: Arc<dyn PersistentStore>,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        let environment: Arc<dyn EnvironmentSource> = Arc::new(ProcessEnvironment);
        let initial = ActiveState::empty(VariableRegistry::with_environment(environment.clone()));
        Self {
            config,
            registry,
            store,
            notifier: Arc::new(NoOpNotifier),
            source,
            parser: Arc::new(JsonDocumentParser),
            environment,
            state: ArcSwap::from_pointee(initial),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ConfigNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Read environment variables from `environment` instead of the process.
    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentSource>) -> Self {
        self.state = ArcSwap::from_pointee(ActiveState::empty(VariableRegistry::with_environment(
            environment.clone(),
        )));
        self.environment = environment;
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<dyn SchemaRegistry> {
        &self.registry
    }

    /// The currently active state.
    pub fn state(&self) -> Arc<ActiveState> {
        self.state.load_full()
    }

    /// Run the full pipeline against the current documents.
    ///
    /// On error nothing is swapped in; objects already persisted by an
    /// earlier refresh are left as they are.
    pub async fn refresh(&self) -> RuntimeResult<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.state.load_full();

        let (snapshot, variables) = self.load()?;
        let (snapshot, variables) = (Arc::new(snapshot), Arc::new(variables));
        let delta = compute_delta(&current.snapshot, &current.variables, &snapshot, &variables, &*self.registry)?;

        let mut work = Vec::new();
        let mut removed = Vec::new();
        for change in &delta.elements {
            if change.kind == DeltaKind::Removed {
                removed.extend(change.walk().into_iter().map(|d| d.identity.clone()));
                continue;
            }
            removed.extend(
                change
                    .walk()
                    .into_iter()
                    .filter(|d| d.kind == DeltaKind::Removed)
                    .map(|d| d.identity.clone()),
            );
            work.push(Work::new(change.element.clone(), change.entry.clone(), delta_reason(change)));
        }

        let queued: HashSet<ConfigId> = work.iter().map(|w| w.identity.clone()).collect();
        let mut deferred = current.deferred.clone();
        for identity in &current.deferred {
            if queued.contains(identity) || removed.contains(identity) {
                continue;
            }
            match self.merged_element(&snapshot, identity)? {
                Some((element, entry)) => work.push(Work::new(element, entry, "retry")),
                None => {
                    deferred.remove(identity);
                }
            }
        }

        let report = RefreshReport {
            variables_changed: delta.variables.keys().cloned().collect(),
            ..Default::default()
        };
        let (state, report) = self
            .apply(&current, snapshot, variables, deferred, work, removed, report)
            .await?;
        self.state.store(Arc::new(state));
        info!(
            generation = report.generation,
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            deferred = report.deferred.len(),
            "refresh complete"
        );
        Ok(report)
    }

    /// Re-evaluate every deferred element against the current snapshot,
    /// after the schema registry gained or lost entries.
    pub async fn registry_changed(&self) -> RuntimeResult<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.state.load_full();

        let mut deferred = current.deferred.clone();
        let mut work = Vec::new();
        for identity in &current.deferred {
            match self.merged_element(&current.snapshot, identity)? {
                Some((element, entry)) => work.push(Work::new(element, entry, "retry")),
                None => {
                    deferred.remove(identity);
                }
            }
        }
        debug!(elements = work.len(), "re-evaluating deferred elements");

        let (state, report) = self
            .apply(
                &current,
                current.snapshot.clone(),
                current.variables.clone(),
                deferred,
                work,
                Vec::new(),
                RefreshReport::default(),
            )
            .await?;
        self.state.store(Arc::new(state));
        Ok(report)
    }

    /// Load and merge the configured documents without evaluating or
    /// persisting anything.
    pub fn load(&self) -> RuntimeResult<(Snapshot, VariableRegistry)> {
        let loader = ConfigLoader::new(&*self.source, &*self.parser).with_on_error(self.config.on_error);
        let snapshot = loader.load(&self.config.root_document, &self.config.default_documents())?;
        let variables = self.build_variables(&snapshot)?;
        Ok((snapshot, variables))
    }

    fn build_variables(&self, snapshot: &Snapshot) -> RuntimeResult<VariableRegistry> {
        let mut variables = VariableRegistry::with_environment(self.environment.clone());
        for (name, variable) in snapshot.merged_variables()? {
            let declared = variable
                .value
                .as_ref()
                .map(|v| variables.set_file_value(name.as_str(), v.as_str()))
                .transpose()
                .and_then(|_| {
                    variable
                        .default_value
                        .as_ref()
                        .map(|d| variables.set_default(name.as_str(), d.as_str()))
                        .transpose()
                });
            if let Err(e) = declared {
                warn!(variable = %name, document = %variable.document, error = %e, "ignoring variable");
            }
        }
        for (name, value) in &self.config.variables {
            variables.set_explicit(name.as_str(), value.as_str())?;
        }
        Ok(variables)
    }

    /// Enabled merged element for a top-level identity.
    fn merged_element(
        &self,
        snapshot: &Snapshot,
        identity: &ConfigId,
    ) -> RuntimeResult<Option<(ConfigElement, Option<Arc<RegistryEntry>>)>> {
        let entry = self.registry.entry_by_name(identity.type_name());
        let names: Vec<&str> = match &entry {
            Some(e) => std::iter::once(e.pid.as_str()).chain(e.alias.as_deref()).collect(),
            None => vec![identity.type_name()],
        };
        let element = match identity.id() {
            Some(id) => snapshot.merged_factory(&names, id)?,
            None => snapshot.merged_singleton(&names)?,
        };
        Ok(element.filter(ConfigElement::is_enabled).map(|e| (e, entry)))
    }

    /// Evaluate `work`, then persist, delete and notify.
    ///
    /// Under on-error FAIL the first failed or invalid element returns
    /// before anything is written, and records created for this refresh
    /// are removed again.
    #[allow(clippy::too_many_arguments)]
    async fn apply(
        &self,
        base: &ActiveState,
        snapshot: Arc<Snapshot>,
        variables: Arc<VariableRegistry>,
        mut deferred: BTreeSet<ConfigId>,
        work: Vec<Work>,
        removed: Vec<ConfigId>,
        mut report: RefreshReport,
    ) -> RuntimeResult<(ActiveState, RefreshReport)> {
        let known: HashSet<String> = self.store.list_all()?.into_iter().map(|c| c.pid).collect();
        for item in &work {
            self.store.lookup_or_create(&item.identity)?;
        }

        let mut evaluated: Vec<(EvaluationResult, &'static str)> = Vec::new();
        {
            let evaluator = ConfigEvaluator::new(&*self.registry, &*self.store, &variables, &snapshot);
            for item in work {
                deferred.remove(&item.identity);
                match evaluator.evaluate(&item.element, item.entry.clone()) {
                    Ok(result) if !result.valid => {
                        if self.config.on_error == OnError::Fail {
                            self.discard_created(&known);
                            return Err(RuntimeError::Invalid {
                                identity: item.identity,
                                reasons: result.warnings,
                            });
                        }
                        warn!(identity = %item.identity, warnings = ?result.warnings, "element is invalid, not updating");
                        report.invalid.push(item.identity.clone());
                        deferred.insert(item.identity);
                    }
                    Ok(result) => {
                        if result.is_deferred() {
                            debug!(identity = %item.identity, "unresolved references, will retry");
                            deferred.insert(item.identity.clone());
                        }
                        evaluated.push((result, item.reason));
                    }
                    Err(source) => {
                        match self.config.on_error {
                            OnError::Fail => {
                                self.discard_created(&known);
                                return Err(RuntimeError::Eval {
                                    identity: item.identity,
                                    source,
                                })
                            }
                            OnError::Warn => warn!(identity = %item.identity, error = %source, "evaluation failed"),
                            OnError::Ignore => debug!(identity = %item.identity, error = %source, "evaluation failed"),
                        }
                        report.failed.push((item.identity.clone(), source.to_string()));
                        deferred.insert(item.identity);
                    }
                }
            }
        }

        let mut results = base.results.clone();
        let mut events = Vec::new();
        for identity in removed {
            results.remove(&identity);
            deferred.remove(&identity);
            let Some(pid) = self.store.lookup(&identity)? else {
                continue;
            };
            if self.store.delete(&pid)? {
                report.deleted.push(identity.clone());
                events.push(ConfigEvent {
                    identity,
                    pid,
                    kind: EventKind::Deleted,
                    properties: None,
                    reason: "removed".into(),
                });
            }
        }
        for (result, reason) in evaluated {
            for written in result.walk() {
                if self
                    .store
                    .write_properties(&written.pid, &written.properties, &written.references)?
                {
                    report.updated.push(written.identity.clone());
                    events.push(ConfigEvent {
                        identity: written.identity.clone(),
                        pid: written.pid.clone(),
                        kind: EventKind::Updated,
                        properties: Some(written.properties.clone()),
                        reason: reason.into(),
                    });
                }
            }
            results.insert(result.identity.clone(), result);
        }

        report.notifications_timed_out = self.dispatch(events).await;
        report.generation = base.generation + 1;
        report.deferred = deferred.iter().cloned().collect();

        let state = ActiveState {
            snapshot,
            variables,
            generation: report.generation,
            results,
            deferred,
        };
        Ok((state, report))
    }

    /// Remove records whose pid is not in `known`. Used when a refresh is
    /// abandoned after persistent ids were handed out.
    fn discard_created(&self, known: &HashSet<String>) {
        let created = match self.store.list_all() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "cannot list records to roll back");
                return;
            }
        };
        for record in created.into_iter().filter(|r| !known.contains(&r.pid)) {
            match self.store.delete(&record.pid) {
                Ok(_) => debug!(identity = %record.identity, pid = %record.pid, "discarded record of abandoned refresh"),
                Err(e) => warn!(identity = %record.identity, error = %e, "cannot discard record of abandoned refresh"),
            }
        }
    }

    /// Deliver `events` concurrently and wait for them up to the
    /// notification timeout. Returns `true` on timeout; unfinished
    /// deliveries keep running in the background.
    async fn dispatch(&self, events: Vec<ConfigEvent>) -> bool {
        if events.is_empty() {
            return false;
        }
        let mut tasks = JoinSet::new();
        for event in events {
            let notifier = Arc::clone(&self.notifier);
            tasks.spawn(async move {
                let identity = event.identity.clone();
                notifier.notify(event).await.map_err(|e| (identity, e))
            });
        }

        let join_all = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err((identity, e))) => warn!(identity = %identity, error = %e, "notification failed"),
                    Err(e) => warn!(error = %e, "notification task failed"),
                }
            }
        };
        let finished = tokio::time::timeout(self.config.notification_timeout, join_all).await;
        match finished {
            Ok(()) => false,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.notification_timeout.as_millis() as u64,
                    pending = tasks.len(),
                    "notifications still running at timeout"
                );
                tasks.detach_all();
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use strata_merge::InMemoryDocumentSource;
    use strata_schema::{AttributeDefinition, AttributeType, InMemorySchemaRegistry};
    use strata_store::{ChannelNotifier, InMemoryStore, NotifyResult};
    use strata_types::PropertyValue;
    use strata_vars::MapEnvironment;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;

    struct Harness {
        source: Arc<InMemoryDocumentSource>,
        registry: Arc<InMemorySchemaRegistry>,
        store: Arc<InMemoryStore>,
        events: UnboundedReceiver<ConfigEvent>,
        runtime: ConfigRuntime,
    }

    fn harness(config: RuntimeConfig, document: &str) -> Harness {
        let source = Arc::new(InMemoryDocumentSource::new());
        source.insert("server.json", document);
        let registry = Arc::new(InMemorySchemaRegistry::new());
        registry
            .register(
                RegistryEntry::factory("httpEndpoint")
                    .with_attribute(AttributeDefinition::new("port", AttributeType::Integer).with_default(["9080"])),
            )
            .unwrap();
        let store = Arc::new(InMemoryStore::new());
        let (notifier, events) = ChannelNotifier::new();
        let runtime = ConfigRuntime::new(config, registry.clone(), store.clone(), source.clone())
            .with_notifier(Arc::new(notifier))
            .with_environment(Arc::new(MapEnvironment::new()));
        Harness {
            source,
            registry,
            store,
            events,
            runtime,
        }
    }

    fn endpoints(port: &str) -> String {
        format!(
            r#"{{ "entries": [
                {{ "element": {{ "name": "httpEndpoint", "attributes": {{ "id": "default", "port": "{}" }} }} }},
                {{ "element": {{ "name": "httpEndpoint", "attributes": {{ "id": "admin" }} }} }}
            ] }}"#,
            port
        )
    }

    fn default_endpoint() -> ConfigId {
        ConfigId::factory("httpEndpoint", "default")
    }

    fn stored_port(h: &Harness, identity: &ConfigId) -> Option<PropertyValue> {
        let pid = h.store.lookup(identity).unwrap()?;
        h.store.read_properties(&pid).unwrap()?.properties.get("port").cloned()
    }

    #[tokio::test]
    async fn first_refresh_persists_and_notifies() {
        let mut h = harness(RuntimeConfig::default(), &endpoints("80"));
        let report = h.runtime.refresh().await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.updated.len(), 2);
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(80)));
        assert_eq!(
            stored_port(&h, &ConfigId::factory("httpEndpoint", "admin")),
            Some(PropertyValue::Integer(9080))
        );

        let first = h.events.recv().await.unwrap();
        let second = h.events.recv().await.unwrap();
        assert!(first.kind == EventKind::Updated && second.kind == EventKind::Updated);

        let state = h.runtime.state();
        assert_eq!(state.generation, 1);
        assert_eq!(state.result(&default_endpoint()).unwrap().properties["port"], PropertyValue::Integer(80));
    }

    #[tokio::test]
    async fn unchanged_documents_do_nothing() {
        let h = harness(RuntimeConfig::default(), &endpoints("80"));
        h.runtime.refresh().await.unwrap();
        let report = h.runtime.refresh().await.unwrap();
        assert!(report.is_noop());
        assert_eq!(report.generation, 2);
    }

    #[tokio::test]
    async fn changed_attribute_updates_only_that_element() {
        let mut h = harness(RuntimeConfig::default(), &endpoints("80"));
        h.runtime.refresh().await.unwrap();
        while h.events.try_recv().is_ok() {}

        h.source.insert("server.json", endpoints("8080"));
        let report = h.runtime.refresh().await.unwrap();
        assert_eq!(report.updated, vec![default_endpoint()]);
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(8080)));

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.identity, default_endpoint());
        assert_eq!(event.reason, "properties updated");
        assert_eq!(event.properties.unwrap()["port"], PropertyValue::Integer(8080));
    }

    #[tokio::test]
    async fn removed_element_is_deleted() {
        let mut h = harness(RuntimeConfig::default(), &endpoints("80"));
        h.runtime.refresh().await.unwrap();
        while h.events.try_recv().is_ok() {}

        h.source.insert(
            "server.json",
            r#"{ "entries": [ { "element": { "name": "httpEndpoint", "attributes": { "id": "admin" } } } ] }"#,
        );
        let report = h.runtime.refresh().await.unwrap();
        assert_eq!(report.deleted, vec![default_endpoint()]);
        assert_eq!(h.store.lookup(&default_endpoint()).unwrap(), None);
        assert_eq!(h.events.recv().await.unwrap().kind, EventKind::Deleted);
        assert!(h.runtime.state().result(&default_endpoint()).is_none());
    }

    #[tokio::test]
    async fn fail_policy_keeps_previous_snapshot() {
        let config = RuntimeConfig {
            on_error: OnError::Fail,
            ..Default::default()
        };
        let h = harness(config, &endpoints("80"));
        h.registry
            .register(
                RegistryEntry::factory("pool").with_attribute(AttributeDefinition::new("size", AttributeType::Integer)),
            )
            .unwrap();
        h.runtime.refresh().await.unwrap();

        h.source.insert(
            "server.json",
            r#"{ "entries": [
                { "element": { "name": "httpEndpoint", "attributes": { "id": "default", "port": "81" } } },
                { "element": { "name": "pool", "attributes": { "id": "p", "size": "big" } } }
            ] }"#,
        );
        match h.runtime.refresh().await {
            Err(RuntimeError::Eval { identity, .. }) => assert_eq!(identity, ConfigId::factory("pool", "p")),
            other => panic!("expected Eval, got {:?}", other),
        }
        assert_eq!(h.runtime.state().generation, 1);
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(80)));
    }

    #[tokio::test]
    async fn fail_policy_aborts_on_missing_required_attribute() {
        let config = RuntimeConfig {
            on_error: OnError::Fail,
            ..Default::default()
        };
        let h = harness(config, &endpoints("80"));
        h.registry
            .register(
                RegistryEntry::factory("pool")
                    .with_attribute(AttributeDefinition::new("size", AttributeType::Integer).required()),
            )
            .unwrap();
        h.runtime.refresh().await.unwrap();

        h.source.insert(
            "server.json",
            r#"{ "entries": [
                { "element": { "name": "httpEndpoint", "attributes": { "id": "default", "port": "81" } } },
                { "element": { "name": "pool", "attributes": { "id": "p" } } }
            ] }"#,
        );
        match h.runtime.refresh().await {
            Err(RuntimeError::Invalid { identity, reasons }) => {
                assert_eq!(identity, ConfigId::factory("pool", "p"));
                assert!(reasons.iter().any(|r| r.contains("size")));
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
        assert_eq!(h.runtime.state().generation, 1);
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(80)));
    }

    #[tokio::test]
    async fn aborted_refresh_leaves_no_new_records() {
        let config = RuntimeConfig {
            on_error: OnError::Fail,
            ..Default::default()
        };
        let h = harness(config, &endpoints("80"));
        h.registry
            .register(
                RegistryEntry::factory("pool").with_attribute(AttributeDefinition::new("size", AttributeType::Integer)),
            )
            .unwrap();
        h.runtime.refresh().await.unwrap();
        let before = h.store.list_all().unwrap().len();

        h.source.insert(
            "server.json",
            r#"{ "entries": [
                { "element": { "name": "httpEndpoint", "attributes": { "id": "default", "port": "80" } } },
                { "element": { "name": "httpEndpoint", "attributes": { "id": "admin" } } },
                { "element": { "name": "httpEndpoint", "attributes": { "id": "fresh" } } },
                { "element": { "name": "pool", "attributes": { "id": "p", "size": "big" } } }
            ] }"#,
        );
        assert!(matches!(h.runtime.refresh().await, Err(RuntimeError::Eval { .. })));
        assert_eq!(h.store.list_all().unwrap().len(), before);
        assert_eq!(h.store.lookup(&ConfigId::factory("httpEndpoint", "fresh")).unwrap(), None);
        assert_eq!(h.store.lookup(&ConfigId::factory("pool", "p")).unwrap(), None);
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(80)));
    }

    #[tokio::test]
    async fn warn_policy_skips_failed_elements() {
        let h = harness(RuntimeConfig::default(), &endpoints("80"));
        h.registry
            .register(
                RegistryEntry::factory("pool").with_attribute(AttributeDefinition::new("size", AttributeType::Integer)),
            )
            .unwrap();
        h.source.insert(
            "server.json",
            r#"{ "entries": [
                { "element": { "name": "httpEndpoint", "attributes": { "id": "default", "port": "81" } } },
                { "element": { "name": "pool", "attributes": { "id": "p", "size": "big" } } }
            ] }"#,
        );
        let report = h.runtime.refresh().await.unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ConfigId::factory("pool", "p"));
        assert!(report.deferred.contains(&ConfigId::factory("pool", "p")));
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(81)));
    }

    #[tokio::test]
    async fn variable_change_reevaluates_readers() {
        let doc = |port: &str| {
            format!(
                r#"{{ "entries": [
                    {{ "variable": {{ "name": "httpPort", "value": "{}" }} }},
                    {{ "element": {{ "name": "httpEndpoint", "attributes": {{ "id": "default", "port": "${{httpPort}}" }} }} }},
                    {{ "element": {{ "name": "httpEndpoint", "attributes": {{ "id": "admin" }} }} }}
                ] }}"#,
                port
            )
        };
        let h = harness(RuntimeConfig::default(), &doc("80"));
        h.runtime.refresh().await.unwrap();
        h.source.insert("server.json", doc("8080"));
        let report = h.runtime.refresh().await.unwrap();
        assert_eq!(report.variables_changed, vec!["httpPort".to_string()]);
        assert_eq!(report.updated, vec![default_endpoint()]);
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(8080)));
    }

    #[tokio::test]
    async fn explicit_variables_outrank_documents() {
        let mut config = RuntimeConfig::default();
        config.variables.insert("httpPort".into(), "9443".into());
        let h = harness(
            config,
            r#"{ "entries": [
                { "variable": { "name": "httpPort", "value": "80" } },
                { "element": { "name": "httpEndpoint", "attributes": { "id": "default", "port": "${httpPort}" } } }
            ] }"#,
        );
        h.runtime.refresh().await.unwrap();
        assert_eq!(stored_port(&h, &default_endpoint()), Some(PropertyValue::Integer(9443)));
    }

    #[tokio::test]
    async fn deferred_reference_resolves_after_registry_change() {
        let h = harness(
            RuntimeConfig::default(),
            r#"{ "entries": [
                { "element": { "name": "ssl", "attributes": { "id": "s", "keyStore": "ks" } } },
                { "element": { "name": "keyStore", "attributes": { "id": "ks" } } }
            ] }"#,
        );
        h.registry
            .register(
                RegistryEntry::factory("ssl")
                    .with_attribute(AttributeDefinition::new("keyStore", AttributeType::Pid).with_service("keys")),
            )
            .unwrap();
        let ssl = ConfigId::factory("ssl", "s");

        let report = h.runtime.refresh().await.unwrap();
        assert!(report.deferred.contains(&ssl));

        h.registry
            .register(RegistryEntry::factory("keyStore").with_service("keys"))
            .unwrap();
        let report = h.runtime.registry_changed().await.unwrap();
        assert!(report.updated.contains(&ssl));
        assert!(report.deferred.is_empty());

        let key_store = h.store.lookup(&ConfigId::factory("keyStore", "ks")).unwrap().unwrap();
        let pid = h.store.lookup(&ssl).unwrap().unwrap();
        let stored = h.store.read_properties(&pid).unwrap().unwrap();
        assert_eq!(stored.properties["keyStore"], PropertyValue::String(key_store));
    }

    struct SlowNotifier;

    #[async_trait]
    impl ConfigNotifier for SlowNotifier {
        async fn notify(&self, _event: ConfigEvent) -> NotifyResult<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn slow_notifications_do_not_block_refresh() {
        let config = RuntimeConfig {
            notification_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let h = harness(config, &endpoints("80"));
        let runtime = h.runtime.with_notifier(Arc::new(SlowNotifier));
        let report = runtime.refresh().await.unwrap();
        assert!(report.notifications_timed_out);
        assert_eq!(runtime.state().generation, 1);
    }
}
