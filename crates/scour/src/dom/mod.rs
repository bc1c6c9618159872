// ABOUTME: Tree mutation helpers over scraper::Html and ego_tree NodeIds.
// ABOUTME: Covers node construction, attribute edits, and the three removal moves.

pub mod serialize;

use ego_tree::NodeId;
use scraper::node::Text;
use scraper::{Html, Node};

use crate::config::OutputFormat;
use serialize::{escape_attr, render_node};

/// Parses `html` and copies its top-level nodes into `doc` as children of
/// `parent`, returning their handles in document order.
pub fn import_fragment(doc: &mut Html, parent: NodeId, html: &str) -> Vec<NodeId> {
    let snippet = Html::parse_fragment(html);
    let Some(root) = fragment_root(&snippet) else {
        return Vec::new();
    };
    let mut added = Vec::new();
    for id in child_ids(&snippet, root) {
        if let Some(copied) = copy_subtree(doc, &snippet, id) {
            if let Some(mut target) = doc.tree.get_mut(parent) {
                target.append_id(copied);
            }
            added.push(copied);
        }
    }
    added
}

fn copy_subtree(doc: &mut Html, src: &Html, id: NodeId) -> Option<NodeId> {
    let node = src.tree.get(id)?;
    let copied = doc.tree.orphan(node.value().clone()).id();
    for child in child_ids(src, id) {
        if let Some(child_copy) = copy_subtree(doc, src, child) {
            if let Some(mut target) = doc.tree.get_mut(copied) {
                target.append_id(child_copy);
            }
        }
    }
    Some(copied)
}

/// The synthetic `<html>` element wrapping a parsed fragment's content.
pub fn fragment_root(doc: &Html) -> Option<NodeId> {
    doc.tree
        .root()
        .children()
        .find(|child| child.value().is_element())
        .map(|child| child.id())
}

/// Child handles of `id`, in document order.
pub fn child_ids(doc: &Html, id: NodeId) -> Vec<NodeId> {
    doc.tree
        .get(id)
        .map(|node| node.children().map(|child| child.id()).collect())
        .unwrap_or_default()
}

/// Creates a detached text node.
pub fn orphan_text(doc: &mut Html, text: &str) -> NodeId {
    doc.tree
        .orphan(Node::Text(Text { text: text.into() }))
        .id()
}

/// Creates a detached, empty element with the given tag name.
pub fn create_element(doc: &mut Html, name: &str) -> Option<NodeId> {
    let snippet = format!("<{name}></{name}>");
    let root = doc.tree.root().id();
    let created = import_fragment(doc, root, &snippet);
    let id = created.into_iter().next()?;
    detach(doc, id);
    Some(id)
}

/// Sets one attribute on an element, inserting or overwriting.
///
/// The qualified name is produced by parsing a donor snippet so the attribute
/// is interned exactly as the parser would intern it.
pub fn set_attr(doc: &mut Html, id: NodeId, name: &str, value: &str) {
    let donor = Html::parse_fragment(&format!("<div {}=\"{}\"></div>", name, escape_attr(value)));
    let Some(donor_root) = fragment_root(&donor) else {
        return;
    };
    let Some(donor_el) = donor
        .tree
        .get(donor_root)
        .and_then(|root| root.children().find(|child| child.value().is_element()))
    else {
        return;
    };
    let Some(src) = donor_el.value().as_element() else {
        return;
    };
    if let Some(mut node) = doc.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            for (k, v) in src.attrs.iter() {
                match el.attrs.iter_mut().find(|(name, _)| name == k) {
                    Some(slot) => slot.1 = v.clone(),
                    None => el.attrs.push((k.clone(), v.clone())),
                }
            }
        }
    }
}

/// Drops every attribute from an element.
pub fn clear_attrs(doc: &mut Html, id: NodeId) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            el.attrs.clear();
        }
    }
}

/// Keeps only the attributes for which `keep` returns true. The callback sees
/// the lowercased local name and the current value.
pub fn retain_attrs<F>(doc: &mut Html, id: NodeId, mut keep: F)
where
    F: FnMut(&str, &str) -> bool,
{
    if let Some(mut node) = doc.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            el.attrs.retain(|(k, v)| keep(&k.local.to_lowercase(), &**v));
        }
    }
}

/// Returns true if `id` resolves to an element node.
pub fn is_element(doc: &Html, id: NodeId) -> bool {
    doc.tree
        .get(id)
        .map(|node| node.value().is_element())
        .unwrap_or(false)
}

/// Lowercased tag name, or None for non-elements and dangling handles.
pub fn element_name(doc: &Html, id: NodeId) -> Option<String> {
    doc.tree
        .get(id)?
        .value()
        .as_element()
        .map(|el| el.name().to_lowercase())
}

/// Returns true if the node is still reachable from the tree root.
pub fn is_attached(doc: &Html, id: NodeId) -> bool {
    doc.tree
        .get(id)
        .map(|node| node.parent().is_some() || id == doc.tree.root().id())
        .unwrap_or(false)
}

/// Detaches the node and its subtree from its parent.
pub fn detach(doc: &mut Html, id: NodeId) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        node.detach();
    }
}

/// Replaces the element with its own children, in place. Returns false when
/// the node has no parent to receive them.
pub fn strip_element(doc: &mut Html, id: NodeId) -> bool {
    if doc.tree.get(id).and_then(|node| node.parent()).is_none() {
        return false;
    }
    for child in child_ids(doc, id) {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.insert_id_before(child);
        }
    }
    detach(doc, id);
    true
}

/// Replaces the element with the escaped text of its own markup while keeping
/// its children live in the tree. Returns false when the node has no parent.
///
/// The serialized markup is split around the children at the closing tag
/// boundary when one is present, so the children end up between the literal
/// open and close tag text.
pub fn escape_element(doc: &mut Html, id: NodeId, mode: OutputFormat) -> bool {
    if doc.tree.get(id).and_then(|node| node.parent()).is_none() {
        return false;
    }
    let Some(name) = element_name(doc, id) else {
        return false;
    };
    let children = child_ids(doc, id);
    for &child in &children {
        detach(doc, child);
    }
    let rendered = render_node(doc, id, mode);
    // "</name>" is name.len() + 3 bytes.
    let close_len = name.len() + 3;
    if rendered.contains("><") && rendered.len() > close_len {
        let (open, close) = rendered.split_at(rendered.len() - close_len);
        let open = open.to_string();
        let close = close.to_string();
        insert_text_before(doc, id, &open);
        for &child in &children {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.insert_id_before(child);
            }
        }
        insert_text_before(doc, id, &close);
    } else {
        insert_text_before(doc, id, &rendered);
        for &child in &children {
            if let Some(mut node) = doc.tree.get_mut(id) {
                node.insert_id_before(child);
            }
        }
    }
    detach(doc, id);
    true
}

/// Inserts a new text node as the previous sibling of `id`.
pub fn insert_text_before(doc: &mut Html, id: NodeId, text: &str) {
    if let Some(mut node) = doc.tree.get_mut(id) {
        node.insert_before(Node::Text(Text { text: text.into() }));
    }
}

/// Puts `replacement` in `original`'s tree position and detaches `original`.
/// A detached original leaves the replacement detached too.
pub fn replace_node(doc: &mut Html, original: NodeId, replacement: NodeId) {
    if doc
        .tree
        .get(original)
        .and_then(|node| node.parent())
        .is_some()
    {
        if let Some(mut node) = doc.tree.get_mut(original) {
            node.insert_id_before(replacement);
        }
    }
    detach(doc, original);
}
