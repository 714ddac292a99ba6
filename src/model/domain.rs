//! Domain-language model: entities, value objects, aggregates, services,
//! events and business rules.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Attribute of an entity or value object
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Property {
    pub name: String,
    /// Type name; `ENUM` when `enum_values` is set
    #[serde(rename = "type")]
    pub property_type: String,
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Entity {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub identified_by: String,
    #[serde(default)]
    pub lifecycle: String,
    #[serde(default)]
    pub aggregate_root: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_name: Option<String>,
    #[serde(default)]
    pub stereotypes: Vec<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub business_rules: Vec<String>,
    #[serde(default)]
    pub domain_events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ValueObject {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Aggregate {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Name of the root entity
    pub aggregate_root: String,
    #[serde(default)]
    pub included_entities: Vec<String>,
    #[serde(default)]
    pub invariants: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub return_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DomainService {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DomainEvent {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub occurred_when: String,
    /// Payload field name → type
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BusinessRule {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

/// A complete domain-language document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DomainLanguage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub value_objects: Vec<ValueObject>,
    #[serde(default)]
    pub aggregates: Vec<Aggregate>,
    #[serde(default)]
    pub domain_services: Vec<DomainService>,
    #[serde(default)]
    pub domain_events: Vec<DomainEvent>,
    #[serde(default)]
    pub business_rules: Vec<BusinessRule>,
}

impl DomainLanguage {
    /// Number of top-level items across all sections
    pub fn item_count(&self) -> usize {
        self.entities.len()
            + self.value_objects.len()
            + self.aggregates.len()
            + self.domain_services.len()
            + self.domain_events.len()
            + self.business_rules.len()
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check that entity root flags and aggregate roots agree.
    ///
    /// An entity may be the root of at most one aggregate, an aggregate's root
    /// must not be an entity declared as non-root, and an entity that names its
    /// aggregate while claiming to be root must be that aggregate's root.
    pub fn aggregate_consistency_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let mut roots: HashMap<&str, Vec<&str>> = HashMap::new();
        for aggregate in &self.aggregates {
            roots
                .entry(aggregate.aggregate_root.as_str())
                .or_default()
                .push(aggregate.name.as_str());
        }

        let mut multi_root: Vec<(&&str, &Vec<&str>)> =
            roots.iter().filter(|(_, aggs)| aggs.len() > 1).collect();
        multi_root.sort_by(|a, b| a.0.cmp(b.0));
        for (root, aggregates) in multi_root {
            errors.push(format!(
                "エンティティ '{}' が複数の集約のルートになっています: {}",
                root,
                aggregates.join(", ")
            ));
        }

        for aggregate in &self.aggregates {
            if let Some(entity) = self.entity(&aggregate.aggregate_root) {
                if !entity.aggregate_root {
                    errors.push(format!(
                        "集約 '{}' のルート '{}' は集約ルートとして宣言されていません",
                        aggregate.name, entity.name
                    ));
                }
            }
        }

        for entity in self.entities.iter().filter(|e| e.aggregate_root) {
            let Some(aggregate_name) = &entity.aggregate_name else {
                continue;
            };
            if let Some(aggregate) = self.aggregates.iter().find(|a| &a.name == aggregate_name) {
                if aggregate.aggregate_root != entity.name {
                    errors.push(format!(
                        "エンティティ '{}' は集約 '{}' のルートを宣言していますが、集約のルートは '{}' です",
                        entity.name, aggregate.name, aggregate.aggregate_root
                    ));
                }
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_entity(name: &str, aggregate: &str) -> Entity {
        Entity {
            name: name.to_string(),
            display_name: name.to_string(),
            aggregate_root: true,
            aggregate_name: Some(aggregate.to_string()),
            ..Default::default()
        }
    }

    fn aggregate(name: &str, root: &str) -> Aggregate {
        Aggregate {
            name: name.to_string(),
            aggregate_root: root.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_consistent_aggregates_have_no_errors() {
        let model = DomainLanguage {
            entities: vec![root_entity("Project", "ProjectAggregate")],
            aggregates: vec![aggregate("ProjectAggregate", "Project")],
            ..Default::default()
        };
        assert!(model.aggregate_consistency_errors().is_empty());
    }

    #[test]
    fn test_entity_root_of_two_aggregates() {
        let model = DomainLanguage {
            entities: vec![root_entity("Project", "ProjectAggregate")],
            aggregates: vec![aggregate("ProjectAggregate", "Project"), aggregate("Other", "Project")],
            ..Default::default()
        };
        let errors = model.aggregate_consistency_errors();
        assert!(errors.iter().any(|e| e.contains("複数の集約")));
    }

    #[test]
    fn test_aggregate_root_not_declared_on_entity() {
        let mut entity = root_entity("Task", "TaskAggregate");
        entity.aggregate_root = false;
        let model = DomainLanguage {
            entities: vec![entity],
            aggregates: vec![aggregate("TaskAggregate", "Task")],
            ..Default::default()
        };
        assert_eq!(model.aggregate_consistency_errors().len(), 1);
    }

    #[test]
    fn test_item_count() {
        let model = DomainLanguage {
            entities: vec![Entity::default()],
            value_objects: vec![ValueObject::default(), ValueObject::default()],
            ..Default::default()
        };
        assert_eq!(model.item_count(), 3);
    }
}
