use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::gateway::{ApiClient, CallOptions};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: u64,
    pub name: String,
}

/// Id to name lookup over the relationship reference list.
///
/// The list is fetched once per session; a new list means a new resolver.
#[derive(Debug, Clone, Default)]
pub struct RelationshipResolver {
    names: HashMap<u64, String>,
    formatted: HashMap<u64, String>,
}

impl RelationshipResolver {
    pub fn new(relationships: Vec<Relationship>) -> Self {
        let mut names = HashMap::with_capacity(relationships.len());
        let mut formatted = HashMap::with_capacity(relationships.len());
        for rel in relationships {
            formatted.insert(rel.id, title_case(&rel.name));
            names.insert(rel.id, rel.name);
        }
        Self { names, formatted }
    }

    pub async fn fetch(client: &ApiClient) -> Result<Self, ApiError> {
        let relationships: Vec<Relationship> = client
            .call_strict("relationships", CallOptions::get())
            .await?;
        info!("Loaded {} relationships", relationships.len());
        Ok(Self::new(relationships))
    }

    pub fn is_ready(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Formatted names ordered by id.
    pub fn entries(&self) -> Vec<(u64, &str)> {
        let mut entries: Vec<_> = self.formatted.iter().map(|(id, name)| (*id, name.as_str())).collect();
        entries.sort_unstable_by_key(|(id, _)| *id);
        entries
    }

    pub fn get_relationship_name(&self, id: u64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn get_formatted_relationship_name(&self, id: u64) -> Option<&str> {
        self.formatted.get(&id).map(String::as_str)
    }
}

/// `"SON_IN_LAW"` -> `"Son In Law"`, `"step-daughter"` -> `"Step-Daughter"`.
pub fn title_case(raw: &str) -> String {
    raw.replace('_', " ")
        .split_whitespace()
        .map(|word| {
            word.split('-')
                .map(capitalize)
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Vec<Relationship> {
        vec![
            Relationship { id: 1, name: "spouse".into() },
            Relationship { id: 2, name: "SON_IN_LAW".into() },
            Relationship { id: 3, name: "step-daughter".into() },
            Relationship { id: 4, name: "  civil   partner ".into() },
            Relationship { id: 5, name: "Friend".into() },
        ]
    }

    #[test]
    fn test_formatted_names_match_table() {
        let resolver = RelationshipResolver::new(reference());

        let expected = [
            (1, "Spouse"),
            (2, "Son In Law"),
            (3, "Step-Daughter"),
            (4, "Civil Partner"),
            (5, "Friend"),
        ];
        for (id, name) in expected {
            assert_eq!(resolver.get_formatted_relationship_name(id), Some(name));
        }
        assert_eq!(resolver.get_relationship_name(2), Some("SON_IN_LAW"));
    }

    #[test]
    fn test_unknown_ids() {
        let resolver = RelationshipResolver::new(reference());
        assert_eq!(resolver.get_formatted_relationship_name(99), None);
        assert_eq!(resolver.get_relationship_name(0), None);
    }

    #[test]
    fn test_readiness() {
        assert!(!RelationshipResolver::default().is_ready());
        assert!(!RelationshipResolver::new(Vec::new()).is_ready());

        let resolver = RelationshipResolver::new(reference());
        assert!(resolver.is_ready());
        assert_eq!(resolver.len(), 5);
        assert_eq!(resolver.entries().first(), Some(&(1, "Spouse")));
    }

    #[test]
    fn test_title_case_edges() {
        assert_eq!(title_case(""), "");
        assert_eq!(title_case("__"), "");
        assert_eq!(title_case("grand-"), "Grand-");
    }
}
