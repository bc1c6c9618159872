// ABOUTME: The sanitization decision engine: mutation-aware traversal, transformer
// ABOUTME: pipeline, allow-list evaluation, attribute and protocol filtering, removal.

use std::collections::HashSet;

use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};

use crate::config::{Config, Protocol, ALL_ELEMENTS};
use crate::dom::{self, serialize};
use crate::error::Error;
use crate::transform::{TransformEnv, TransformResult};

/// Matches a scheme prefix in an attribute value, including colons smuggled in
/// as decimal or hex character references. Values are lowercased before the
/// match, so the pattern only needs the lowercase alphabet.
static PROTOCOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9+\-.&;#\s]*?)(?::|&#0*58|&#x0*3a)").unwrap());

/// State scoped to one top-level clean call. Trust granted by transformers
/// lives here and never leaks into the next call.
#[derive(Debug, Default)]
struct CleanPass {
    trusted: HashSet<NodeId>,
}

/// Where a visited node ended up after its decision.
#[derive(Debug, Clone, Copy)]
struct Disposition {
    /// The working node: the original or its final replacement.
    node: NodeId,
    /// False when the working node left the tree.
    attached: bool,
}

/// Position captured before a node is visited, used to find the successor
/// when the visit detaches the node.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    prev: Option<NodeId>,
    parent: Option<NodeId>,
    next: Option<NodeId>,
}

/// Accumulated transformer pipeline state for one element.
#[derive(Debug)]
struct PipelineOutput {
    attr_whitelist: Vec<String>,
    whitelist: bool,
    node: NodeId,
}

enum Action {
    Element,
    Cdata(String),
    Remove,
    Keep,
}

/// An allow-list sanitizer bound to one policy.
///
/// The sanitizer itself is immutable and shareable; each clean call carries
/// its own pass state.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    config: Config,
}

impl Sanitizer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Sanitizes an HTML fragment and returns the cleaned markup.
    pub fn clean(&self, html: &str) -> Result<String, Error> {
        self.encoding()?;
        let mut doc = Html::parse_fragment(html);
        let Some(root) = dom::fragment_root(&doc) else {
            return Ok(String::new());
        };
        let mut pass = CleanPass::default();
        let root = self.traverse(&mut doc, &mut pass, root, false)?;
        Ok(serialize::render_children(&doc, root, self.config.output))
    }

    /// Sanitizes `html` in place. Returns `Ok(false)` when the input was
    /// already clean and nothing changed.
    pub fn clean_in_place(&self, html: &mut String) -> Result<bool, Error> {
        let cleaned = self.clean(html)?;
        if cleaned == *html {
            return Ok(false);
        }
        *html = cleaned;
        Ok(true)
    }

    /// Sanitizes a fragment and encodes the result with the policy's
    /// `output_encoding`. Characters outside the target encoding become
    /// numeric character references.
    pub fn clean_bytes(&self, html: &str) -> Result<Vec<u8>, Error> {
        let encoding = self.encoding()?;
        let cleaned = self.clean(html)?;
        let (bytes, _, _) = encoding.encode(&cleaned);
        Ok(bytes.into_owned())
    }

    /// Sanitizes the subtree rooted at `node` inside an existing document,
    /// including the root node itself. Returns the handle of the working
    /// root, which may be detached when the root itself was rejected.
    pub fn clean_node(&self, doc: &mut Html, node: NodeId) -> Result<NodeId, Error> {
        if doc.tree.get(node).is_none() {
            return Err(Error::InvalidInput(
                "node handle does not resolve in this document".to_string(),
            ));
        }
        let mut pass = CleanPass::default();
        self.traverse(doc, &mut pass, node, true)
    }

    fn encoding(&self) -> Result<&'static encoding_rs::Encoding, Error> {
        encoding_rs::Encoding::for_label(self.config.output_encoding.as_bytes()).ok_or_else(|| {
            Error::Config(format!(
                "unknown output encoding label: {}",
                self.config.output_encoding
            ))
        })
    }

    /// Single pre-order pass over the subtree under `root`. Visits nodes the
    /// pipeline splices in, skips subtrees that leave the tree, and returns
    /// the working root.
    fn traverse(
        &self,
        doc: &mut Html,
        pass: &mut CleanPass,
        start: NodeId,
        include_root: bool,
    ) -> Result<NodeId, Error> {
        let mut root = start;
        let mut outcome = start;
        // When the root itself is removed, the walk continues over whatever
        // was spliced into its position, stopping at its old next sibling.
        let mut limit: Option<NodeId> = None;
        let mut current = if include_root {
            Some(root)
        } else {
            doc.tree.get(root).and_then(|n| n.first_child()).map(|n| n.id())
        };

        while let Some(id) = current {
            if Some(id) == limit {
                break;
            }
            let Some(node) = doc.tree.get(id) else {
                break;
            };
            let anchor = Anchor {
                prev: node.prev_sibling().map(|n| n.id()),
                parent: node.parent().map(|n| n.id()),
                next: node.next_sibling().map(|n| n.id()),
            };
            let action = match node.value() {
                Node::Element(_) => Action::Element,
                // The HTML parser surfaces CDATA sections as bogus comments;
                // those become character data, the rest follow comment policy.
                Node::Comment(comment) => {
                    if let Some(inner) = (**comment).strip_prefix("[CDATA[") {
                        let inner = inner.strip_suffix("]]").unwrap_or(inner);
                        Action::Cdata(inner.to_string())
                    } else if self.config.allow_comments {
                        Action::Keep
                    } else {
                        Action::Remove
                    }
                }
                Node::Doctype(_) | Node::ProcessingInstruction(_) => Action::Remove,
                _ => Action::Keep,
            };

            let disp = match action {
                Action::Element => self.clean_element(doc, pass, id)?,
                Action::Cdata(text) => {
                    let replacement = dom::orphan_text(doc, &text);
                    dom::replace_node(doc, id, replacement);
                    let attached = dom::is_attached(doc, replacement);
                    Disposition {
                        node: replacement,
                        attached,
                    }
                }
                Action::Remove => {
                    dom::detach(doc, id);
                    Disposition {
                        node: id,
                        attached: false,
                    }
                }
                Action::Keep => Disposition {
                    node: id,
                    attached: true,
                },
            };

            if id == root {
                outcome = disp.node;
                if !disp.attached {
                    let Some(parent) = anchor.parent else {
                        // A parentless root cannot leave the tree through its
                        // handle; its children are still sanitized in place.
                        root = disp.node;
                        current = doc
                            .tree
                            .get(root)
                            .and_then(|n| n.first_child())
                            .map(|n| n.id());
                        continue;
                    };
                    root = parent;
                    limit = anchor.next;
                    current = match anchor.prev {
                        Some(prev) => doc
                            .tree
                            .get(prev)
                            .and_then(|n| n.next_sibling())
                            .map(|n| n.id()),
                        None => doc
                            .tree
                            .get(parent)
                            .and_then(|n| n.first_child())
                            .map(|n| n.id()),
                    };
                    continue;
                }
                if disp.node != root {
                    root = disp.node;
                }
            }
            current = next_position(doc, disp, anchor, root);
        }

        Ok(outcome)
    }

    /// Runs the pipeline and the allow-list decision for one element.
    fn clean_element(
        &self,
        doc: &mut Html,
        pass: &mut CleanPass,
        id: NodeId,
    ) -> Result<Disposition, Error> {
        let output = self.transform_element(doc, pass, id)?;
        let node = output.node;

        // Trusted nodes keep their name and attributes untouched.
        if pass.trusted.contains(&node) {
            return Ok(Disposition {
                node,
                attached: dom::is_attached(doc, node),
            });
        }

        let Some(name) = dom::element_name(doc, node) else {
            return Ok(Disposition {
                node,
                attached: dom::is_attached(doc, node),
            });
        };

        if output.whitelist || self.config.elements.contains(&name) {
            self.filter_attributes(doc, node, &name, &output.attr_whitelist);
            self.force_attributes(doc, node, &name);
            Ok(Disposition {
                node,
                attached: dom::is_attached(doc, node),
            })
        } else {
            self.remove_element(doc, node, &name);
            Ok(Disposition {
                node,
                attached: false,
            })
        }
    }

    /// Runs every transformer against the element, threading replacements
    /// through the pipeline and splicing the final replacement into the
    /// original's position.
    fn transform_element(
        &self,
        doc: &mut Html,
        pass: &mut CleanPass,
        id: NodeId,
    ) -> Result<PipelineOutput, Error> {
        let mut output = PipelineOutput {
            attr_whitelist: Vec::new(),
            whitelist: false,
            node: id,
        };
        if self.config.transformers.is_empty() {
            return Ok(output);
        }

        let transformers = self.config.transformers.clone();
        for transformer in &transformers {
            let Some(node_name) = dom::element_name(doc, output.node) else {
                break;
            };
            let result = {
                let mut env = TransformEnv {
                    config: &self.config,
                    doc: &mut *doc,
                    node: output.node,
                    node_name,
                    trusted: &pass.trusted,
                };
                transformer.evaluate(&mut env)?
            };
            if let Some(result) = result {
                merge_result(doc, result, &mut output, pass)?;
            }
        }

        if output.node != id {
            dom::replace_node(doc, id, output.node);
        }
        Ok(output)
    }

    /// Drops attributes the policy does not allow for this element and
    /// applies per-attribute protocol rules.
    fn filter_attributes(&self, doc: &mut Html, id: NodeId, name: &str, extra: &[String]) {
        let mut allowed: HashSet<String> = extra.iter().map(|s| s.to_lowercase()).collect();
        if let Some(per_element) = self.config.attributes.get(name) {
            allowed.extend(per_element.iter().cloned());
        }
        if let Some(wildcard) = self.config.attributes.get(ALL_ELEMENTS) {
            allowed.extend(wildcard.iter().cloned());
        }

        if allowed.is_empty() {
            dom::clear_attrs(doc, id);
            return;
        }

        let rules = self.config.protocols.get(name);
        dom::retain_attrs(doc, id, |attr, value| {
            if !allowed.contains(attr) {
                return false;
            }
            match rules.and_then(|r| r.get(attr)) {
                Some(protocols) => protocol_allowed(value, protocols),
                None => true,
            }
        });
    }

    /// Writes the policy's forced attributes, overwriting survivors.
    fn force_attributes(&self, doc: &mut Html, id: NodeId, name: &str) {
        if let Some(forced) = self.config.add_attributes.get(name) {
            for (key, value) in forced {
                dom::set_attr(doc, id, key, value);
            }
        }
    }

    /// Applies the configured removal strategy to a rejected element. An
    /// element with no parent cannot splice survivors and is pruned outright.
    fn remove_element(&self, doc: &mut Html, id: NodeId, name: &str) {
        if self.config.escape_only {
            if !dom::escape_element(doc, id, self.config.output) {
                dom::detach(doc, id);
            }
            return;
        }
        if self.config.remove_contents.matches(name) {
            dom::detach(doc, id);
            return;
        }
        if !dom::strip_element(doc, id) {
            dom::detach(doc, id);
        }
    }
}

/// Folds one transformer's result into the pipeline state, enforcing the
/// handle contracts.
fn merge_result(
    doc: &Html,
    result: TransformResult,
    output: &mut PipelineOutput,
    pass: &mut CleanPass,
) -> Result<(), Error> {
    for node in result.whitelist_nodes {
        if doc.tree.get(node).is_none() {
            return Err(Error::TransformerContract(
                "whitelisted node handle does not resolve".to_string(),
            ));
        }
        pass.trusted.insert(node);
    }

    output
        .attr_whitelist
        .extend(result.attr_whitelist.into_iter().map(|s| s.to_lowercase()));
    // The keep flag accumulates with OR; a later no-op never resets it.
    output.whitelist |= result.whitelist;

    if let Some(node) = result.node {
        if !dom::is_element(doc, node) {
            return Err(Error::TransformerContract(
                "replacement handle is not a live element node".to_string(),
            ));
        }
        output.node = node;
    }
    Ok(())
}

/// Computes the next node of the pre-order walk. A detached node's successor
/// comes from its captured anchor, which also picks up any survivors spliced
/// into its old position.
fn next_position(doc: &Html, disp: Disposition, anchor: Anchor, root: NodeId) -> Option<NodeId> {
    if disp.attached {
        let node = doc.tree.get(disp.node)?;
        if let Some(child) = node.first_child() {
            return Some(child.id());
        }
        if disp.node == root {
            return None;
        }
        return ascend(doc, disp.node, root);
    }

    if let Some(prev) = anchor.prev {
        if let Some(sibling) = doc.tree.get(prev).and_then(|n| n.next_sibling()) {
            return Some(sibling.id());
        }
        return ascend(doc, prev, root);
    }
    let parent = anchor.parent?;
    if let Some(child) = doc.tree.get(parent).and_then(|n| n.first_child()) {
        return Some(child.id());
    }
    if parent == root {
        return None;
    }
    ascend(doc, parent, root)
}

/// Walks up from `from` to the nearest ancestor sibling, never crossing `root`.
fn ascend(doc: &Html, from: NodeId, root: NodeId) -> Option<NodeId> {
    let mut cursor = from;
    loop {
        if cursor == root {
            return None;
        }
        let node = doc.tree.get(cursor)?;
        if let Some(sibling) = node.next_sibling() {
            return Some(sibling.id());
        }
        cursor = node.parent()?.id();
    }
}

/// Checks an attribute value against the allowed protocol set. A value with
/// no scheme prefix needs the relative marker.
fn protocol_allowed(value: &str, allowed: &HashSet<Protocol>) -> bool {
    let value = value.to_lowercase();
    match PROTOCOL_RE.captures(&value) {
        Some(caps) => allowed.contains(&Protocol::Scheme(caps[1].to_string())),
        None => allowed.contains(&Protocol::Relative),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(list: &[&str]) -> HashSet<Protocol> {
        list.iter().map(|s| Protocol::from(*s)).collect()
    }

    #[test]
    fn test_protocol_allowed_plain_scheme() {
        let rules = allowed(&["http", "https", "relative"]);
        assert!(protocol_allowed("https://example.com/", &rules));
        assert!(protocol_allowed("HTTP://EXAMPLE.COM/", &rules));
        assert!(!protocol_allowed("javascript:alert(1)", &rules));
    }

    #[test]
    fn test_protocol_allowed_relative() {
        let rules = allowed(&["https", "relative"]);
        assert!(protocol_allowed("/foo/bar", &rules));
        assert!(protocol_allowed("foo.html", &rules));

        let no_relative = allowed(&["https"]);
        assert!(!protocol_allowed("/foo/bar", &no_relative));
    }

    #[test]
    fn test_protocol_allowed_character_reference_colons() {
        let rules = allowed(&["http", "relative"]);
        assert!(!protocol_allowed("javascript&#58;alert(1)", &rules));
        assert!(!protocol_allowed("javascript&#0058;alert(1)", &rules));
        assert!(!protocol_allowed("javascript&#x3a;alert(1)", &rules));
        assert!(!protocol_allowed("javascript&#x003A;alert(1)", &rules));
    }

    #[test]
    fn test_protocol_allowed_smuggled_scheme_name() {
        // The entity-laced scheme never equals a plain allowed scheme name.
        let rules = allowed(&["javascript"]);
        assert!(!protocol_allowed("java&#115;cript:alert(1)", &rules));
        assert!(protocol_allowed("javascript:alert(1)", &rules));
    }

    #[test]
    fn test_protocol_allowed_leading_whitespace_kept_in_scheme() {
        let rules = allowed(&["http"]);
        assert!(!protocol_allowed(" http://example.com/", &rules));
    }

    #[test]
    fn test_empty_rule_set_rejects_everything() {
        let rules = HashSet::new();
        assert!(!protocol_allowed("https://example.com/", &rules));
        assert!(!protocol_allowed("/relative", &rules));
    }
}
