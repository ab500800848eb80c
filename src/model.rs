//! Component model tree and its decomposition into storable units
//!
//! The interchange document of a model looks like:
//!
//! ```json
//! {
//!   "domain": "ASSEMBLY",
//!   "name": "arm",
//!   "type": "manipulator",
//!   "versions": [
//!     {
//!       "name": "1.0",
//!       "date": "16-10-2026 09-30-00",
//!       "interfaces": [],
//!       "components": {
//!         "nodes": [
//!           { "name": "shoulder", "model": { "uri": "cm://MECHANICS/joint/2.0" } },
//!           { "name": "elbow", "model": { "domain": "MECHANICS", "name": "joint", "versions": [...] } }
//!         ]
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! A part's `model` is either a reference node (`{"uri": ...}`) or an inline
//! model. A stored unit always holds exactly one version and only reference
//! nodes.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::storage::Record;
use crate::uri::ModelUri;
use crate::{Error, Result};

/// Type name under which component models are stored
pub const COMPONENT_MODEL_TYPE: &str = "ComponentModel";

/// Date format stamped on version elements at store time
pub const DATE_FORMAT: &str = "%d-%m-%Y %H-%M-%S";

/// A component model tree as exchanged with callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentModel {
    pub domain: String,
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// Derived identifier; only meaningful on single-version units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<ModelUri>,
    #[serde(default)]
    pub versions: Vec<ModelVersion>,
    /// Remaining top-level properties, kept verbatim
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

/// One element of a model's `versions` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// The version string
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sub-component graph of a version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Part>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A named use of another model inside a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: String,
    pub model: SubModel,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Either a bare reference or a fully materialized sub-model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubModel {
    Reference(ModelReference),
    Inline(Box<ComponentModel>),
}

/// Reference node: `{"uri": "cm://..."}` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelReference {
    pub uri: ModelUri,
}

impl ModelVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date: None,
            interfaces: None,
            components: None,
            extra: Map::new(),
        }
    }

    /// Append a part to this version's component graph
    pub fn push_part(&mut self, name: impl Into<String>, model: SubModel) {
        self.components.get_or_insert_with(Components::default).nodes.push(Part {
            name: name.into(),
            model,
            extra: Map::new(),
        });
    }

    /// Parts of this version, empty when it has no component graph
    pub fn parts(&self) -> &[Part] {
        self.components.as_ref().map(|c| c.nodes.as_slice()).unwrap_or(&[])
    }

    fn parts_mut(&mut self) -> impl Iterator<Item = &mut Part> {
        self.components.iter_mut().flat_map(|c| c.nodes.iter_mut())
    }
}

impl SubModel {
    pub fn reference(uri: ModelUri) -> Self {
        SubModel::Reference(ModelReference { uri })
    }

    pub fn inline(model: ComponentModel) -> Self {
        SubModel::Inline(Box::new(model))
    }
}

impl ComponentModel {
    /// Create a model with a single, empty version
    pub fn new(domain: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            model_type: None,
            uri: None,
            versions: vec![ModelVersion::new(version)],
            properties: Map::new(),
        }
    }

    pub fn with_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Append a part to the first version
    pub fn with_part(mut self, name: impl Into<String>, model: SubModel) -> Self {
        if let Some(first) = self.versions.first_mut() {
            first.push_part(name, model);
        }
        self
    }

    /// Decode a model from its JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode the document of a stored record
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(serde_json::from_value(record.document.clone())?)
    }

    /// URI of this model at the given version
    pub fn uri_for(&self, version: &str) -> ModelUri {
        ModelUri::new(&self.domain, self.name.clone(), version)
    }

    /// URI this model is referenced by: its first version
    pub fn primary_uri(&self) -> Result<ModelUri> {
        self.versions
            .first()
            .map(|v| self.uri_for(&v.name))
            .ok_or_else(|| {
                Error::invalid_property("version", format!("model {}/{} has no versions", self.domain, self.name))
            })
    }

    /// Flat property map of this model at one version
    ///
    /// Contains `domain`, `name`, `version`, `type` when set, and every
    /// scalar top-level property.
    pub fn property_map(&self, version: Option<&ModelVersion>) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (key, value) in &self.properties {
            let scalar = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            map.insert(key.clone(), scalar);
        }
        map.insert("domain".to_string(), self.domain.clone());
        map.insert("name".to_string(), self.name.clone());
        if let Some(t) = &self.model_type {
            map.insert("type".to_string(), t.clone());
        }
        if let Some(v) = version {
            map.insert("version".to_string(), v.name.clone());
        }
        map
    }

    /// Visit this model and every inline sub-model, depth-first
    pub fn walk<F>(&self, visit: &mut F) -> Result<()>
    where
        F: FnMut(&ComponentModel) -> Result<()>,
    {
        visit(self)?;
        for version in &self.versions {
            for part in version.parts() {
                if let SubModel::Inline(sub) = &part.model {
                    sub.walk(visit)?;
                }
            }
        }
        Ok(())
    }

    fn walk_mut<F>(&mut self, visit: &mut F)
    where
        F: FnMut(&mut ComponentModel),
    {
        visit(self);
        for version in &mut self.versions {
            for part in version.parts_mut() {
                if let SubModel::Inline(sub) = &mut part.model {
                    sub.walk_mut(visit);
                }
            }
        }
    }

    /// Uppercase `domain` on this model and all inline sub-models
    pub fn normalize_domains(&mut self) {
        self.walk_mut(&mut |model| model.domain = model.domain.to_uppercase());
    }

    /// Set `date` on every version element in the tree
    pub fn stamp_dates(&mut self, date: &str) {
        self.walk_mut(&mut |model| {
            for version in &mut model.versions {
                version.date = Some(date.to_string());
            }
        });
    }

    /// Split the tree into single-version units.
    ///
    /// Units come out depth-first; inline sub-models are replaced by
    /// reference nodes to their first version. A URI that occurs more than
    /// once keeps its first occurrence.
    pub fn decompose(&self) -> Result<Vec<ModelUnit>> {
        let mut units = Vec::new();
        self.decompose_into(&mut units)?;

        let mut seen = std::collections::HashSet::new();
        units.retain(|unit: &ModelUnit| seen.insert(unit.uri.clone()));
        Ok(units)
    }

    fn decompose_into(&self, units: &mut Vec<ModelUnit>) -> Result<()> {
        if self.versions.is_empty() {
            return Err(Error::invalid_property(
                "version",
                format!("model {}/{} has no versions", self.domain, self.name),
            ));
        }

        let mut inline = Vec::new();
        for version in &self.versions {
            let mut unit_version = version.clone();
            for part in unit_version.parts_mut() {
                if let SubModel::Inline(sub) = &part.model {
                    let target = sub.primary_uri()?;
                    inline.push(sub.as_ref().clone());
                    part.model = SubModel::reference(target);
                }
            }

            let uri = self.uri_for(&version.name);
            units.push(ModelUnit {
                uri: uri.clone(),
                model: ComponentModel {
                    domain: self.domain.clone(),
                    name: self.name.clone(),
                    model_type: self.model_type.clone(),
                    uri: Some(uri),
                    versions: vec![unit_version],
                    properties: self.properties.clone(),
                },
            });
        }

        for sub in &inline {
            sub.decompose_into(units)?;
        }
        Ok(())
    }
}

/// A persisted unit: one model at exactly one version, parts by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUnit {
    pub uri: ModelUri,
    model: ComponentModel,
}

impl ModelUnit {
    pub fn model(&self) -> &ComponentModel {
        &self.model
    }

    pub fn into_model(self) -> ComponentModel {
        self.model
    }

    /// The unit's single version
    pub fn version(&self) -> &ModelVersion {
        // decompose never builds a unit without its version
        &self.model.versions[0]
    }

    /// URIs this unit references
    pub fn references(&self) -> impl Iterator<Item = &ModelUri> {
        self.version().parts().iter().filter_map(|part| match &part.model {
            SubModel::Reference(r) => Some(&r.uri),
            SubModel::Inline(_) => None,
        })
    }

    /// Filterable properties of the unit, including `uri`
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut map = self.model.property_map(Some(self.version()));
        map.insert("uri".to_string(), self.uri.to_uri_string());
        map
    }

    /// Encode the unit as a backing-store record
    pub fn to_record(&self) -> Result<Record> {
        Ok(Record {
            uri: self.uri.to_uri_string(),
            type_name: COMPONENT_MODEL_TYPE.to_string(),
            properties: self.properties(),
            document: serde_json::to_value(&self.model)?,
        })
    }
}
