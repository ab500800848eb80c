//! Model Repository - the public API over a backing store
//!
//! Operations:
//! - `list_models`: models of a domain
//! - `list_versions`: versions of one model
//! - `fetch_model`: one model with its sub-models expanded
//! - `store_model`: stamp, validate, resolve and commit a model tree
//!
//! Domains are uppercased at every entry point. Each operation is
//! self-contained; the only state kept between calls is the store's working
//! graph and path.

use std::path::Path;
use chrono::{DateTime, Local};
use serde::Serialize;
use crate::model::{ComponentModel, ModelUnit, COMPONENT_MODEL_TYPE, DATE_FORMAT};
use crate::property::PropertySchema;
use crate::resolver::ReferenceResolver;
use crate::storage::{BackingStore, PropertyFilter, Record, RecursionDepth};
use crate::uri::ModelUri;
use crate::{Error, Result};

/// Expansion depth of a limited fetch
pub const DEFAULT_FETCH_DEPTH_LIMIT: u32 = 3;

/// One entry of a model listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub model_type: Option<String>,
}

/// Repository of component models on top of a backing store
pub struct ModelRepository<S> {
    store: S,
    schema: PropertySchema,
    resolver: ReferenceResolver,
    fetch_depth_limit: u32,
}

impl<S: BackingStore> ModelRepository<S> {
    /// Create a repository over `store` validating against `schema`
    pub fn new(mut store: S, schema: PropertySchema) -> Self {
        let resolver = ReferenceResolver::new();
        store.set_max_hops(resolver.max_hops());
        Self {
            store,
            schema,
            resolver,
            fetch_depth_limit: DEFAULT_FETCH_DEPTH_LIMIT,
        }
    }

    /// Replace the resolver; its hop bound also caps store-side expansion
    pub fn with_resolver(mut self, resolver: ReferenceResolver) -> Self {
        self.store.set_max_hops(resolver.max_hops());
        self.resolver = resolver;
        self
    }

    pub fn with_fetch_depth_limit(mut self, depth: u32) -> Self {
        self.fetch_depth_limit = depth;
        self
    }

    /// The schema models are validated against
    pub fn schema(&self) -> &PropertySchema {
        &self.schema
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn set_working_graph(&mut self, name: &str) {
        self.store.set_working_graph(name);
    }

    pub fn set_working_db_path(&mut self, path: &Path) -> Result<()> {
        self.store.set_working_db_path(path)
    }

    // ========== Queries ==========

    /// All models stored in `domain`, one entry per stored version
    pub fn list_models(&self, domain: &str) -> Result<Vec<ModelSummary>> {
        let filter = PropertyFilter::new().with("domain", domain.to_uppercase());
        let records = self.store.find(COMPONENT_MODEL_TYPE, &filter, RecursionDepth::Limited(0))?;

        records
            .iter()
            .map(|record| -> Result<ModelSummary> {
                require_version(record)?;
                Ok(ModelSummary {
                    name: required_property(record, "name")?.to_string(),
                    model_type: record.properties.get("type").cloned(),
                })
            })
            .collect()
    }

    /// Version strings stored for `domain`/`name`
    pub fn list_versions(&self, domain: &str, name: &str) -> Result<Vec<String>> {
        let filter = PropertyFilter::new()
            .with("domain", domain.to_uppercase())
            .with("name", name);
        let records = self.store.find(COMPONENT_MODEL_TYPE, &filter, RecursionDepth::Limited(0))?;

        records
            .iter()
            .map(|record| require_version(record).map(str::to_string))
            .collect()
    }

    /// Fetch one model.
    ///
    /// Empty `name`/`version` do not constrain the query. With `limited`
    /// sub-models are expanded `fetch_depth_limit` levels deep and the rest
    /// stay references; otherwise the whole tree is expanded and every
    /// remaining reference is checked against the store. When several
    /// records match, the greatest version (lexicographically) wins.
    pub fn fetch_model(
        &self,
        domain: &str,
        name: &str,
        version: Option<&str>,
        limited: bool,
    ) -> Result<ComponentModel> {
        let mut filter = PropertyFilter::new().with("domain", domain.to_uppercase());
        if !name.is_empty() {
            filter = filter.with("name", name);
        }
        if let Some(v) = version.filter(|v| !v.is_empty()) {
            filter = filter.with("version", v);
        }

        let depth = if limited {
            RecursionDepth::Limited(self.fetch_depth_limit)
        } else {
            RecursionDepth::Unlimited
        };

        let records = self.store.find(COMPONENT_MODEL_TYPE, &filter, depth)?;
        if records.len() > 1 {
            tracing::debug!("{} records match {}; picking the greatest version", records.len(), filter);
        }
        let record = records
            .iter()
            .max_by(|a, b| {
                let key = |r: &Record| (r.properties.get("version").cloned(), r.uri.clone());
                key(a).cmp(&key(b))
            })
            .ok_or_else(|| Error::ModelNotFound(filter.to_string()))?;

        let model = ComponentModel::from_record(record)?;
        if !limited {
            let store = &self.store;
            self.resolver
                .resolve(&model, &mut |uri: &ModelUri| lookup_in(store, uri))?;
        }
        Ok(model)
    }

    // ========== Writes ==========

    /// Check every model of a tree against the schema
    pub fn validate(&self, tree: &ComponentModel) -> Result<()> {
        tree.walk(&mut |model: &ComponentModel| -> Result<()> {
            if model.versions.is_empty() {
                return self.schema.validate(&model.property_map(None));
            }
            for version in &model.versions {
                self.schema.validate(&model.property_map(Some(version)))?;
            }
            Ok(())
        })
    }

    /// Store a model tree stamped with the current local time
    pub fn store_model(&mut self, tree: ComponentModel) -> Result<Vec<ModelUri>> {
        self.store_model_at(tree, Local::now())
    }

    /// Store a model tree stamped with `now`.
    ///
    /// Returns the URIs of the committed units: those decomposed from `tree`.
    /// Units reached through a lookup are already stored and are only
    /// checked, never rewritten. Nothing is written unless validation and
    /// resolution succeed; a failed commit is reported as `StoreFailure` and
    /// leaves the store as it was.
    pub fn store_model_at(&mut self, mut tree: ComponentModel, now: DateTime<Local>) -> Result<Vec<ModelUri>> {
        tree.normalize_domains();
        self.validate(&tree)?;

        let date = now.format(DATE_FORMAT).to_string();
        tree.stamp_dates(&date);

        let resolved = {
            let store = &self.store;
            self.resolver
                .resolve(&tree, &mut |uri: &ModelUri| lookup_in(store, uri))?
        };

        let records = resolved
            .submitted_units()
            .map(ModelUnit::to_record)
            .collect::<Result<Vec<_>>>()?;

        self.store
            .commit(&records)
            .map_err(|e| Error::StoreFailure(Box::new(e)))?;

        tracing::info!(
            "Stored {} as {} units ({} looked up)",
            resolved.root(),
            records.len(),
            resolved.lookups()
        );
        Ok(resolved.submitted_units().map(|unit| unit.uri.clone()).collect())
    }
}

/// Lookup used by the resolver: exact URI match, no expansion
fn lookup_in<S: BackingStore>(store: &S, uri: &ModelUri) -> Result<Vec<ComponentModel>> {
    let filter = PropertyFilter::new().with("uri", uri.to_uri_string());
    store
        .find(COMPONENT_MODEL_TYPE, &filter, RecursionDepth::Limited(0))?
        .iter()
        .map(ComponentModel::from_record)
        .collect()
}

fn require_version(record: &Record) -> Result<&str> {
    record.properties.get("version").map(String::as_str).ok_or_else(|| {
        Error::SchemaViolation(format!("{} record {} has no 'version' property", record.type_name, record.uri))
    })
}

fn required_property<'a>(record: &'a Record, key: &str) -> Result<&'a str> {
    record.properties.get(key).map(String::as_str).ok_or_else(|| {
        Error::SchemaViolation(format!("{} record {} has no '{}' property", record.type_name, record.uri, key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubModel;
    use crate::storage::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn repo() -> ModelRepository<MemoryStore> {
        ModelRepository::new(MemoryStore::new(), PropertySchema::component_model())
    }

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, hour, 5, 9).unwrap()
    }

    fn joint(version: &str) -> ComponentModel {
        ComponentModel::new("MECHANICS", "joint", version).with_type("actuator")
    }

    fn arm() -> ComponentModel {
        ComponentModel::new("assembly", "arm", "1.0")
            .with_type("manipulator")
            .with_part("shoulder", SubModel::inline(joint("2.0")))
    }

    /// Store that refuses every commit
    struct FailingStore(MemoryStore);

    impl BackingStore for FailingStore {
        fn find(&self, type_name: &str, filter: &PropertyFilter, depth: RecursionDepth) -> Result<Vec<Record>> {
            self.0.find(type_name, filter, depth)
        }
        fn get(&self, uri: &str) -> Result<Record> {
            self.0.get(uri)
        }
        fn commit(&mut self, _records: &[Record]) -> Result<()> {
            Err(Error::Io(std::io::Error::other("connection lost")))
        }
        fn set_working_graph(&mut self, name: &str) {
            self.0.set_working_graph(name)
        }
        fn set_working_db_path(&mut self, path: &Path) -> Result<()> {
            self.0.set_working_db_path(path)
        }
        fn working_graph(&self) -> &str {
            self.0.working_graph()
        }
        fn set_max_hops(&mut self, max_hops: usize) {
            self.0.set_max_hops(max_hops)
        }
    }

    #[test]
    fn test_store_decomposes_and_stamps() {
        let mut repo = repo();
        let uris = repo.store_model_at(arm(), at(10)).unwrap();
        assert_eq!(
            uris,
            vec![ModelUri::new("ASSEMBLY", "arm", "1.0"), ModelUri::new("MECHANICS", "joint", "2.0")]
        );

        let joint = repo.store().get("cm://MECHANICS/joint/2.0").unwrap();
        assert_eq!(joint.document["versions"][0]["date"], "14-03-2026 10-05-09");
        let arm = repo.store().get("cm://ASSEMBLY/arm/1.0").unwrap();
        assert_eq!(arm.properties["domain"], "ASSEMBLY");
        assert_eq!(
            arm.document["versions"][0]["components"]["nodes"][0]["model"],
            json!({ "uri": "cm://MECHANICS/joint/2.0" })
        );
    }

    #[test]
    fn test_caller_date_is_overwritten() {
        let mut repo = repo();
        let mut model = joint("1.0");
        model.versions[0].date = Some("01-01-1970 00-00-00".to_string());
        repo.store_model_at(model, at(8)).unwrap();

        let fetched = repo.fetch_model("mechanics", "joint", Some("1.0"), false).unwrap();
        assert_eq!(fetched.versions[0].date.as_deref(), Some("14-03-2026 08-05-09"));
    }

    #[test]
    fn test_fetch_expands_sub_models() {
        let mut repo = repo();
        repo.store_model_at(arm(), at(10)).unwrap();

        let fetched = repo.fetch_model("Assembly", "arm", Some("1.0"), false).unwrap();
        let SubModel::Inline(sub) = &fetched.versions[0].parts()[0].model else {
            panic!("sub-model should be expanded");
        };
        assert_eq!(sub.name, "joint");
        assert_eq!(sub.model_type.as_deref(), Some("actuator"));
    }

    #[test]
    fn test_limited_fetch_stops_at_depth() {
        let mut repo = repo().with_fetch_depth_limit(1);
        let tree = ComponentModel::new("ASSEMBLY", "robot", "1").with_part(
            "arm",
            SubModel::inline(ComponentModel::new("ASSEMBLY", "arm", "1").with_part("j", SubModel::inline(joint("1")))),
        );
        repo.store_model_at(tree, at(9)).unwrap();

        let fetched = repo.fetch_model("ASSEMBLY", "robot", None, true).unwrap();
        let SubModel::Inline(arm) = &fetched.versions[0].parts()[0].model else {
            panic!("first level should be expanded");
        };
        assert!(matches!(arm.versions[0].parts()[0].model, SubModel::Reference(_)));
    }

    #[test]
    fn test_fetch_missing_model() {
        let repo = repo();
        let err = repo.fetch_model("x", "missing", Some("1.0"), false).unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(_)));
    }

    #[test]
    fn test_fetch_without_version_picks_greatest() {
        let mut repo = repo();
        for v in ["1.0", "2.0", "1.5"] {
            repo.store_model_at(joint(v), at(7)).unwrap();
        }
        let fetched = repo.fetch_model("MECHANICS", "joint", None, true).unwrap();
        assert_eq!(fetched.versions[0].name, "2.0");
        let also = repo.fetch_model("MECHANICS", "joint", Some(""), true).unwrap();
        assert_eq!(also, fetched);
    }

    #[test]
    fn test_invalid_property_writes_nothing() {
        let mut repo = repo();
        let bad = arm().with_property("maturity", "SOMEDAY");
        let err = repo.store_model_at(bad, at(10)).unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "maturity"));
        assert!(repo.store().is_empty());

        let mut nested = arm();
        nested.versions[0].push_part("bad", SubModel::inline(ComponentModel::new("ROBOTS", "x", "1")));
        let err = repo.store_model_at(nested, at(10)).unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "domain"));
        assert!(repo.store().is_empty());
    }

    #[test]
    fn test_dangling_reference_writes_nothing() {
        let mut repo = repo();
        repo.store_model_at(joint("1.0"), at(6)).unwrap();
        let before = repo.store().records();

        let tree = ComponentModel::new("ASSEMBLY", "arm", "1.0")
            .with_part("ghost", SubModel::reference(ModelUri::new("MECHANICS", "ghost", "9")));
        let err = repo.store_model_at(tree, at(7)).unwrap_err();
        assert!(matches!(err, Error::DanglingReference(_)));
        assert_eq!(repo.store().records(), before);
    }

    #[test]
    fn test_reference_to_stored_model_is_resolved() {
        let mut repo = repo();
        repo.store_model_at(joint("2.0"), at(6)).unwrap();

        let tree = ComponentModel::new("ASSEMBLY", "arm", "1.0")
            .with_part("shoulder", SubModel::reference(ModelUri::new("mechanics", "joint", "2.0")));
        let uris = repo.store_model_at(tree, at(7)).unwrap();
        assert_eq!(uris, vec![ModelUri::new("ASSEMBLY", "arm", "1.0")]);

        // the referenced unit keeps its stored content
        let joint = repo.fetch_model("MECHANICS", "joint", Some("2.0"), false).unwrap();
        assert_eq!(joint.versions[0].date.as_deref(), Some("14-03-2026 06-05-09"));
    }

    /// Store whose reads come from an older snapshot than its writes
    struct LaggingStore {
        current: MemoryStore,
        snapshot: MemoryStore,
    }

    impl BackingStore for LaggingStore {
        fn find(&self, type_name: &str, filter: &PropertyFilter, depth: RecursionDepth) -> Result<Vec<Record>> {
            self.snapshot.find(type_name, filter, depth)
        }
        fn get(&self, uri: &str) -> Result<Record> {
            self.snapshot.get(uri)
        }
        fn commit(&mut self, records: &[Record]) -> Result<()> {
            self.current.commit(records)
        }
        fn set_working_graph(&mut self, name: &str) {
            self.current.set_working_graph(name);
            self.snapshot.set_working_graph(name);
        }
        fn set_working_db_path(&mut self, path: &Path) -> Result<()> {
            self.current.set_working_db_path(path)?;
            self.snapshot.set_working_db_path(path)
        }
        fn working_graph(&self) -> &str {
            self.current.working_graph()
        }
        fn set_max_hops(&mut self, max_hops: usize) {
            self.current.set_max_hops(max_hops);
            self.snapshot.set_max_hops(max_hops);
        }
    }

    fn commit_units(store: &mut MemoryStore, model: ComponentModel) {
        let records: Vec<Record> = model.decompose().unwrap().iter().map(|u| u.to_record().unwrap()).collect();
        store.commit(&records).unwrap();
    }

    #[test]
    fn test_looked_up_units_are_not_rewritten() {
        let mut snapshot = MemoryStore::new();
        commit_units(&mut snapshot, joint("2.0"));
        let mut current = MemoryStore::new();
        commit_units(&mut current, joint("2.0").with_type("servo"));

        let mut repo = ModelRepository::new(LaggingStore { current, snapshot }, PropertySchema::component_model());
        let tree = ComponentModel::new("ASSEMBLY", "arm", "1.0")
            .with_part("shoulder", SubModel::reference(ModelUri::new("MECHANICS", "joint", "2.0")));
        repo.store_model_at(tree, at(7)).unwrap();

        let store = repo.into_store();
        assert_eq!(store.current.get("cm://MECHANICS/joint/2.0").unwrap().properties["type"], "servo");
        assert!(store.current.get("cm://ASSEMBLY/arm/1.0").is_ok());
    }

    /// n0 -> n1 -> ... -> n{len-1}, committed unit by unit
    fn commit_chain(repo: &mut ModelRepository<MemoryStore>, len: usize) {
        for i in 0..len {
            let mut model = ComponentModel::new("SOFTWARE", format!("n{}", i), "1");
            if i + 1 < len {
                model = model.with_part("next", SubModel::reference(ModelUri::new("SOFTWARE", format!("n{}", i + 1), "1")));
            }
            commit_units(repo.store_mut(), model);
        }
    }

    #[test]
    fn test_chain_longer_than_hop_bound() {
        let mut repo = repo().with_resolver(ReferenceResolver::with_max_hops(4));
        commit_chain(&mut repo, 10);

        let err = repo.fetch_model("SOFTWARE", "n0", Some("1"), false).unwrap_err();
        assert!(matches!(err, Error::ReferenceCycleExceeded { limit: 4, ref uri } if uri == "cm://SOFTWARE/n5/1"));

        let tail = repo.fetch_model("SOFTWARE", "n6", Some("1"), false).unwrap();
        assert_eq!(tail.versions[0].parts()[0].name, "next");

        let tree = ComponentModel::new("SOFTWARE", "root", "1")
            .with_part("head", SubModel::reference(ModelUri::new("SOFTWARE", "n0", "1")));
        let err = repo.store_model_at(tree, at(5)).unwrap_err();
        assert!(matches!(err, Error::ReferenceCycleExceeded { limit: 4, .. }));
        assert!(repo.store().get("cm://SOFTWARE/root/1").is_err());
    }

    #[test]
    fn test_default_bound_fails_instead_of_overflowing() {
        let mut repo = repo();
        commit_chain(&mut repo, crate::resolver::DEFAULT_MAX_HOPS * 3);

        let err = repo.fetch_model("SOFTWARE", "n0", Some("1"), false).unwrap_err();
        assert!(matches!(err, Error::ReferenceCycleExceeded { .. }));
    }

    #[test]
    fn test_padded_name_is_rejected() {
        let mut repo = repo();
        let err = repo
            .store_model_at(ComponentModel::new("MECHANICS", " joint ", "1.0"), at(5))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidProperty { ref name, .. } if name == "name"));
        assert!(repo.store().is_empty());
    }

    #[test]
    fn test_commit_failure_is_store_failure() {
        let mut repo = ModelRepository::new(FailingStore(MemoryStore::new()), PropertySchema::component_model());
        let err = repo.store_model_at(arm(), at(10)).unwrap_err();
        match err {
            Error::StoreFailure(cause) => assert!(matches!(*cause, Error::Io(_))),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(repo.into_store().0.is_empty());
    }

    #[test]
    fn test_list_models_and_versions() {
        let mut repo = repo();
        repo.store_model_at(joint("1.0"), at(1)).unwrap();
        repo.store_model_at(joint("2.0"), at(1)).unwrap();

        for domain in ["mechanics", "MECHANICS", "Mechanics"] {
            let models = repo.list_models(domain).unwrap();
            assert_eq!(models.len(), 2);
            assert!(models.iter().all(|m| m.name == "joint" && m.model_type.as_deref() == Some("actuator")));
        }
        assert_eq!(repo.list_versions("mechanics", "joint").unwrap(), vec!["1.0", "2.0"]);
        assert!(repo.list_models("software").unwrap().is_empty());
    }

    #[test]
    fn test_list_reports_versionless_record() {
        let mut repo = repo();
        let record = Record {
            uri: "cm://SOFTWARE/broken/1".to_string(),
            type_name: COMPONENT_MODEL_TYPE.to_string(),
            properties: [("domain", "SOFTWARE"), ("name", "broken")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            document: json!({ "domain": "SOFTWARE", "name": "broken" }),
        };
        repo.store_mut().commit(&[record]).unwrap();

        assert!(matches!(repo.list_models("software"), Err(Error::SchemaViolation(_))));
        assert!(matches!(repo.list_versions("software", "broken"), Err(Error::SchemaViolation(_))));
    }

    #[test]
    fn test_working_graph_pass_through() {
        let mut repo = repo();
        repo.store_model_at(joint("1.0"), at(1)).unwrap();
        repo.set_working_graph("scratch");
        assert!(repo.list_models("MECHANICS").unwrap().is_empty());
        assert_eq!(repo.store().working_graph(), "scratch");
    }
}
