//! The contract: the single object shape every store write deals in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use typed_builder::TypedBuilder;

use super::id::Id;

/// Fields the store rewrites on every write. Two contracts that differ only
/// in these are the same observable object.
pub const VOLATILE_FIELDS: [&str; 4] = ["created_at", "updated_at", "linked_at", "links"];

/// Slug of the meta type whose instances define other types.
pub const TYPE_SLUG: &str = "type";

pub type ContractId = Id<Contract>;

/// A versioned, schema-validated object as returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub slug: String,
    /// `slug@version` reference to the type contract.
    #[serde(rename = "type")]
    pub type_ref: String,
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub markers: Vec<String>,
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Populated by the store; read-only for everything else.
    #[serde(default)]
    pub links: Map<String, Value>,
    #[serde(default)]
    pub linked_at: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

fn empty_object() -> Value {
    json!({})
}

impl Contract {
    /// `slug@version` of this contract.
    pub fn versioned_slug(&self) -> String {
        format!("{}@{}", self.slug, self.version)
    }

    /// Slug part of the type reference (`card@1.0.0` -> `card`).
    pub fn type_slug(&self) -> &str {
        self.type_ref
            .split_once('@')
            .map_or(self.type_ref.as_str(), |(slug, _)| slug)
    }

    pub fn is_type_definition(&self) -> bool {
        self.type_slug() == TYPE_SLUG
    }

    /// The JSON schema carried by a type contract, if any.
    pub fn schema(&self) -> Option<&Value> {
        self.data.get("schema").filter(|schema| !schema.is_null())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Structural equality ignoring [`VOLATILE_FIELDS`].
    pub fn observably_equal(&self, other: &Contract) -> bool {
        strip_volatile(self.to_value()) == strip_volatile(other.to_value())
    }
}

/// Removes [`VOLATILE_FIELDS`] from a serialized contract.
pub fn strip_volatile(mut value: Value) -> Value {
    if let Some(object) = value.as_object_mut() {
        for field in VOLATILE_FIELDS {
            object.remove(field);
        }
    }
    value
}

/// Insert/replace payload: a contract without store-assigned fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ContractDraft {
    pub slug: String,
    #[serde(rename = "type")]
    pub type_ref: String,
    #[builder(default = "1.0.0".to_string())]
    #[serde(default = "default_version")]
    pub version: String,
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub name: Option<String>,
    #[builder(default = true)]
    #[serde(default = "default_active")]
    pub active: bool,
    #[builder(default)]
    #[serde(default)]
    pub tags: Vec<String>,
    #[builder(default)]
    #[serde(default)]
    pub markers: Vec<String>,
    #[builder(default = empty_object())]
    #[serde(default = "empty_object")]
    pub data: Value,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl ContractDraft {
    pub fn versioned_slug(&self) -> String {
        format!("{}@{}", self.slug, self.version)
    }

    /// Materializes the draft with store-assigned identity and timestamps.
    pub fn into_contract(self, id: ContractId, created_at: DateTime<Utc>) -> Contract {
        Contract {
            id,
            slug: self.slug,
            type_ref: self.type_ref,
            version: self.version,
            name: self.name,
            active: self.active,
            tags: self.tags,
            markers: self.markers,
            data: self.data,
            links: Map::new(),
            linked_at: Map::new(),
            created_at,
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Contract {
        ContractDraft::builder()
            .slug("card-1")
            .type_ref("card@1.0.0")
            .data(json!({ "title": "hello" }))
            .build()
            .into_contract(ContractId::new(), Utc::now())
    }

    #[test]
    fn type_slug_strips_version() {
        let card = card();
        assert_eq!(card.type_slug(), "card");
        assert!(!card.is_type_definition());
    }

    #[test]
    fn type_slug_without_version() {
        let mut card = card();
        card.type_ref = "type".to_string();
        assert_eq!(card.type_slug(), "type");
        assert!(card.is_type_definition());
    }

    #[test]
    fn volatile_fields_do_not_affect_equality() {
        let before = card();
        let mut after = before.clone();
        after.updated_at = Some(Utc::now());
        after
            .links
            .insert("is attached to".to_string(), json!([{ "slug": "x" }]));
        assert!(before.observably_equal(&after));

        after.data = json!({ "title": "changed" });
        assert!(!before.observably_equal(&after));
    }

    #[test]
    fn draft_builder_defaults_and_optional_name() {
        let draft = ContractDraft::builder()
            .slug("card-1")
            .type_ref("card@1.0.0")
            .name("Card one".to_string())
            .build();
        assert_eq!(draft.name.as_deref(), Some("Card one"));
        assert_eq!(draft.version, "1.0.0");
        assert!(draft.active);
        assert_eq!(draft.data, json!({}));

        let unnamed = ContractDraft::builder().slug("card-2").type_ref("card@1.0.0").build();
        assert_eq!(unnamed.name, None);
    }

    #[test]
    fn contract_deserializes_with_defaults() {
        let value = json!({
            "id": ContractId::new(),
            "slug": "card-2",
            "type": "card@1.0.0",
            "version": "1.0.0",
            "created_at": "2018-01-01T00:00:00Z"
        });
        let contract: Contract = serde_json::from_value(value).unwrap();
        assert!(contract.active);
        assert!(contract.markers.is_empty());
        assert_eq!(contract.data, json!({}));
    }

    #[test]
    fn schema_ignores_null() {
        let mut contract = card();
        contract.data = json!({ "schema": null });
        assert!(contract.schema().is_none());
        contract.data = json!({ "schema": { "type": "object" } });
        assert!(contract.schema().is_some());
    }
}
