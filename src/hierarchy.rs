//! Reply-tree construction.
//!
//! Converts a reconciled canonical set into a forest of reply trees. The
//! forest is a derived, disposable view: it is rebuilt from scratch on every
//! call and the ordering invariants hold no matter what order records arrived
//! in. A reply whose parent is missing from the set is promoted to a root and
//! counted, never dropped.

use crate::reconcile::CanonicalSet;
use crate::records::{Message, RecordId};
use std::collections::HashMap;

/// The output of hierarchy construction: ordered roots with nested replies.
#[derive(Debug, Default)]
pub struct Forest {
    /// Root messages, newest thread first, each with `children` populated
    /// oldest reply first.
    pub roots: Vec<Message>,
    /// Messages whose reply target did not resolve within the scope.
    pub missing_parents: usize,
}

/// Build the reply forest for one scope.
pub fn build_forest(set: CanonicalSet) -> Forest {
    let mut map = set.into_map();
    let mut children_of: HashMap<RecordId, Vec<RecordId>> = HashMap::new();
    let mut root_ids: Vec<RecordId> = Vec::new();
    let mut missing_parents = 0;

    for (id, message) in &map {
        match message.replied_to_id {
            Some(parent) if parent != *id && map.contains_key(&parent) => {
                children_of.entry(parent).or_default().push(*id);
            }
            Some(_) => {
                missing_parents += 1;
                root_ids.push(*id);
            }
            None => root_ids.push(*id),
        }
    }

    // Replies oldest first; ties break on id so rebuilds are identical.
    for ids in children_of.values_mut() {
        ids.sort_by_key(|id| (map[id].timestamp(), id.0));
    }

    root_ids.sort_by_key(|id| id.0);
    let mut roots: Vec<Message> = Vec::with_capacity(root_ids.len());
    for id in root_ids {
        if let Some(message) = map.remove(&id) {
            roots.push(attach(message, &mut map, &children_of));
        }
    }

    // Members of a reply cycle can never reach a root through their parent
    // chain; promote them in id order and count them as unresolved.
    if !map.is_empty() {
        let mut leftover: Vec<RecordId> = map.keys().copied().collect();
        leftover.sort_by_key(|id| id.0);
        for id in leftover {
            if let Some(message) = map.remove(&id) {
                missing_parents += 1;
                roots.push(attach(message, &mut map, &children_of));
            }
        }
    }

    // Newest thread first.
    roots.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| b.id.cmp(&a.id))
    });

    Forest {
        roots,
        missing_parents,
    }
}

fn attach(
    mut message: Message,
    map: &mut HashMap<RecordId, Message>,
    children_of: &HashMap<RecordId, Vec<RecordId>>,
) -> Message {
    if let Some(child_ids) = children_of.get(&message.id) {
        for child_id in child_ids {
            if let Some(child) = map.remove(child_id) {
                message.children.push(attach(child, map, children_of));
            }
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, replied_to: Option<u64>, created_at: &str) -> Message {
        let mut m = Message::stub(RecordId(id));
        m.replied_to_id = replied_to.map(RecordId);
        if !created_at.is_empty() {
            m.created_at = Some(created_at.to_string());
        }
        m.body.plain = Some(format!("message {id}"));
        m
    }

    fn set_of(messages: Vec<Message>) -> CanonicalSet {
        let mut set = CanonicalSet::new();
        for m in messages {
            set.insert(m);
        }
        set
    }

    #[test]
    fn test_roots_newest_first() {
        let forest = build_forest(set_of(vec![
            message(1, None, "2025/01/01 00:00:00 +0000"),
            message(2, None, "2025/02/01 00:00:00 +0000"),
        ]));
        let ids: Vec<u64> = forest.roots.iter().map(|m| m.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(forest.missing_parents, 0);
    }

    #[test]
    fn test_replies_oldest_first() {
        let forest = build_forest(set_of(vec![
            message(1, None, "2025/01/01 09:00:00 +0000"),
            message(3, Some(1), "2025/01/01 11:00:00 +0000"),
            message(2, Some(1), "2025/01/01 10:00:00 +0000"),
        ]));
        assert_eq!(forest.roots.len(), 1);
        let child_ids: Vec<u64> = forest.roots[0].children.iter().map(|m| m.id.0).collect();
        assert_eq!(child_ids, vec![2, 3]);
    }

    #[test]
    fn test_missing_parent_becomes_root_and_is_counted() {
        let forest = build_forest(set_of(vec![
            message(1, None, "2025/01/01 00:00:00 +0000"),
            message(2, Some(999), "2025/01/02 00:00:00 +0000"),
        ]));
        assert_eq!(forest.roots.len(), 2);
        assert_eq!(forest.missing_parents, 1);
        // The orphan sorts among true roots by its own timestamp.
        assert_eq!(forest.roots[0].id, RecordId(2));
    }

    #[test]
    fn test_nested_replies() {
        let forest = build_forest(set_of(vec![
            message(1, None, "2025/01/01 00:00:00 +0000"),
            message(2, Some(1), "2025/01/02 00:00:00 +0000"),
            message(3, Some(2), "2025/01/03 00:00:00 +0000"),
        ]));
        assert_eq!(forest.roots.len(), 1);
        assert_eq!(forest.roots[0].children[0].id, RecordId(2));
        assert_eq!(forest.roots[0].children[0].children[0].id, RecordId(3));
    }

    #[test]
    fn test_self_reply_is_promoted() {
        let forest = build_forest(set_of(vec![message(1, Some(1), "")]));
        assert_eq!(forest.roots.len(), 1);
        assert_eq!(forest.missing_parents, 1);
    }

    #[test]
    fn test_reply_cycle_is_broken_not_dropped() {
        let forest = build_forest(set_of(vec![
            message(1, Some(2), "2025/01/01 00:00:00 +0000"),
            message(2, Some(1), "2025/01/02 00:00:00 +0000"),
        ]));
        // Lowest id becomes the root; the other attaches beneath it.
        assert_eq!(forest.roots.len(), 1);
        assert_eq!(forest.roots[0].id, RecordId(1));
        assert_eq!(forest.roots[0].children[0].id, RecordId(2));
        assert_eq!(forest.missing_parents, 1);
    }

    #[test]
    fn test_build_is_idempotent() {
        let set = set_of(vec![
            message(5, None, "2025/01/05 00:00:00 +0000"),
            message(1, None, "2025/01/01 00:00:00 +0000"),
            message(2, Some(1), "2025/01/02 00:00:00 +0000"),
            message(3, Some(1), "2025/01/02 00:00:00 +0000"),
            message(9, Some(404), ""),
        ]);

        let shape = |forest: &Forest| -> String {
            fn walk(out: &mut String, m: &Message) {
                out.push_str(&format!("{}(", m.id));
                for c in &m.children {
                    walk(out, c);
                }
                out.push(')');
            }
            let mut out = String::new();
            for root in &forest.roots {
                walk(&mut out, root);
            }
            out
        };

        let first = build_forest(set.clone());
        let second = build_forest(set);
        assert_eq!(shape(&first), shape(&second));
        assert_eq!(first.missing_parents, second.missing_parents);
    }

    #[test]
    fn test_created_at_ties_break_on_id() {
        let forest = build_forest(set_of(vec![
            message(1, None, "2025/01/01 00:00:00 +0000"),
            message(3, Some(1), "2025/01/02 00:00:00 +0000"),
            message(2, Some(1), "2025/01/02 00:00:00 +0000"),
        ]));
        let child_ids: Vec<u64> = forest.roots[0].children.iter().map(|m| m.id.0).collect();
        assert_eq!(child_ids, vec![2, 3]);
    }
}
