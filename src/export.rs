//! Tree export.
//!
//! One traversal, several consumers: a lazy depth-first walker over a reply
//! forest feeds both the plain-text document serializer here and any
//! interactive renderer consuming the in-memory `ViewNode` tree.

use crate::hierarchy::Forest;
use crate::identity::IdentityMap;
use crate::records::{parse_feed_timestamp, Message, RecordId};
use crate::render::{body_text, display_date};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lazy pre-order traversal yielding `(message, depth, parent)`.
/// Restartable: call [`Forest::walk`] again for a fresh pass.
pub struct TreeWalk<'a> {
    stack: Vec<Frame<'a>>,
}

struct Frame<'a> {
    iter: std::slice::Iter<'a, Message>,
    parent: Option<&'a Message>,
}

impl<'a> Iterator for TreeWalk<'a> {
    type Item = (&'a Message, usize, Option<&'a Message>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            match frame.iter.next() {
                Some(message) => {
                    let parent = frame.parent;
                    let depth = self.stack.len() - 1;
                    self.stack.push(Frame {
                        iter: message.children.iter(),
                        parent: Some(message),
                    });
                    return Some((message, depth, parent));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl Forest {
    pub fn walk(&self) -> TreeWalk<'_> {
        TreeWalk {
            stack: vec![Frame {
                iter: self.roots.iter(),
                parent: None,
            }],
        }
    }

    /// Total messages across all threads.
    pub fn message_count(&self) -> usize {
        self.walk().count()
    }
}

/// Node shape consumed by the interactive viewer: resolved author, both
/// machine-readable and display timestamps, flattened body text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewNode {
    pub id: RecordId,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub created_at_display: String,
    pub body: String,
    pub reply_count: usize,
    pub children: Vec<ViewNode>,
}

/// Build the in-memory UI tree for a forest.
pub fn build_view_tree(forest: &Forest, identities: &IdentityMap) -> Vec<ViewNode> {
    forest
        .roots
        .iter()
        .map(|root| view_node(root, identities))
        .collect()
}

fn view_node(message: &Message, identities: &IdentityMap) -> ViewNode {
    ViewNode {
        id: message.id,
        author: identities.display_sender(message.sender_id),
        created_at: message.created_at.as_deref().and_then(parse_feed_timestamp),
        created_at_display: display_date(message),
        body: body_text(message),
        reply_count: message.children.len(),
        children: message
            .children
            .iter()
            .map(|child| view_node(child, identities))
            .collect(),
    }
}

/// Serialize a forest to a flat text document: a header block followed by
/// one numbered section per message, replies numbered beneath their parent
/// (`1`, `1.1`, `1.1.1`, ...).
pub fn export_text(
    forest: &Forest,
    identities: &IdentityMap,
    scope_name: &str,
    scope_id: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let rule = "=".repeat(68);
    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!("Archive of {scope_name} (id {scope_id})\n"));
    out.push_str(&format!(
        "Generated on: {}\n",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format!(
        "Threads: {} | Messages: {} | Unresolved parents: {}\n",
        forest.roots.len(),
        forest.message_count(),
        forest.missing_parents
    ));
    out.push_str(&rule);
    out.push('\n');

    let mut counters: Vec<usize> = Vec::new();
    for (message, depth, _) in forest.walk() {
        counters.truncate(depth + 1);
        if counters.len() == depth + 1 {
            counters[depth] += 1;
        } else {
            counters.push(1);
        }
        let label = counters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");

        out.push('\n');
        out.push_str(&format!(
            "[{label}] {} | {} | message {}\n",
            identities.display_sender(message.sender_id),
            display_date(message),
            message.id
        ));
        out.push_str(&body_text(message));
        out.push('\n');
    }
    out
}
