// ABOUTME: Transformer pipeline types: the Transform trait, the per-invocation
// ABOUTME: environment, and the accumulated result contract shared with the engine.

use std::collections::HashSet;
use std::sync::Arc;

use ego_tree::NodeId;
use scraper::Html;

use crate::config::Config;
use crate::error::Error;

/// Outcome of a single transformer invocation.
///
/// `Default` is the identity result; combine it with struct update syntax to
/// set only the fields a transformer cares about.
#[derive(Debug, Default)]
pub struct TransformResult {
    /// Extra attribute names allowed on the current element. Contributions
    /// accumulate across the pipeline and are never reset by a later no-op.
    pub attr_whitelist: Vec<String>,
    /// Keep the current element even if its name is not allow-listed.
    /// Sticky once set; the element still goes through attribute filtering.
    pub whitelist: bool,
    /// Replacement handle. Subsequent transformers and the decision engine
    /// operate on the replacement, and it takes the original's tree position
    /// once the pipeline finishes. Must resolve to a live element node.
    pub node: Option<NodeId>,
    /// Node identities granted full trust for the remainder of this clean
    /// call. Trusted nodes bypass attribute filtering entirely.
    pub whitelist_nodes: Vec<NodeId>,
}

/// Environment handed to each transformer invocation.
pub struct TransformEnv<'a> {
    /// The active policy.
    pub config: &'a Config,
    /// The document under sanitization. Transformers may mutate it, including
    /// creating detached nodes to return as replacements.
    pub doc: &'a mut Html,
    /// Handle of the element under consideration. When an earlier transformer
    /// in the same invocation returned a replacement, this is the replacement.
    pub node: NodeId,
    /// Lowercased name of the element under consideration.
    pub node_name: String,
    /// Read view of the nodes granted full trust so far during this call.
    pub trusted: &'a HashSet<NodeId>,
}

/// A pluggable policy hook run for every element before the allow-list decision.
///
/// Returning `Ok(None)` is the no-op: nothing about the element or the
/// accumulated pipeline result changes.
pub trait Transform: Send + Sync {
    fn evaluate(&self, env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error>;
}

/// Wraps a plain function or closure as a shareable transformer.
pub fn transform_fn<F>(f: F) -> Arc<dyn Transform>
where
    F: Fn(&mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnTransform(f))
}

struct FnTransform<F>(F);

impl<F> Transform for FnTransform<F>
where
    F: Fn(&mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> + Send + Sync,
{
    fn evaluate(&self, env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        (self.0)(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_result_is_identity() {
        let result = TransformResult::default();
        assert!(result.attr_whitelist.is_empty());
        assert!(!result.whitelist);
        assert!(result.node.is_none());
        assert!(result.whitelist_nodes.is_empty());
    }
}
