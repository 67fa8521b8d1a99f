//! Sender identity resolution.

use crate::records::{RecordId, Reference, ReferenceKind};
use std::collections::HashMap;

/// Mapping from actor id to display name, built from user references.
/// Resolution never fails: unmapped ids get a stable textual fallback.
#[derive(Debug, Default)]
pub struct IdentityMap {
    names: HashMap<RecordId, String>,
}

impl IdentityMap {
    pub fn from_references(references: &[Reference]) -> IdentityMap {
        let mut names = HashMap::new();
        for reference in references {
            if reference.kind == ReferenceKind::User {
                if let Some(name) = &reference.full_name {
                    names.insert(reference.id, name.clone());
                }
            }
        }
        IdentityMap { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Display name for an actor id.
    pub fn resolve(&self, id: RecordId) -> String {
        match self.names.get(&id) {
            Some(name) => name.clone(),
            None => format!("User ID: {id}"),
        }
    }

    /// Display name for a message's (optional) sender.
    pub fn display_sender(&self, sender_id: Option<RecordId>) -> String {
        match sender_id {
            Some(id) => self.resolve(id),
            None => "Unknown sender".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64, name: Option<&str>) -> Reference {
        Reference {
            kind: ReferenceKind::User,
            id: RecordId(id),
            full_name: name.map(String::from),
        }
    }

    #[test]
    fn test_resolves_known_user() {
        let map = IdentityMap::from_references(&[user(7, Some("Grace Hopper"))]);
        assert_eq!(map.resolve(RecordId(7)), "Grace Hopper");
    }

    #[test]
    fn test_unknown_id_gets_fallback_literal() {
        let map = IdentityMap::from_references(&[]);
        assert_eq!(map.resolve(RecordId(42)), "User ID: 42");
    }

    #[test]
    fn test_nameless_user_reference_still_falls_back() {
        let map = IdentityMap::from_references(&[user(7, None)]);
        assert_eq!(map.resolve(RecordId(7)), "User ID: 7");
    }

    #[test]
    fn test_missing_sender() {
        let map = IdentityMap::from_references(&[]);
        assert_eq!(map.display_sender(None), "Unknown sender");
        assert_eq!(map.display_sender(Some(RecordId(3))), "User ID: 3");
    }
}
