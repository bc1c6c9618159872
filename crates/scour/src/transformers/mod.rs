// ABOUTME: Built-in transformers shipped with the crate.
// ABOUTME: Escape neutralizes non-allow-listed elements to literal text per element.

use crate::dom;
use crate::error::Error;
use crate::transform::{Transform, TransformEnv, TransformResult};

/// Transformer that escapes every element the policy does not allow, instead
/// of leaving it to the configured removal strategy.
///
/// Allowed and trusted elements pass through untouched. Everything else is
/// replaced by the literal text of its own markup, with its children kept
/// live in the tree for the rest of the pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct Escape;

impl Transform for Escape {
    fn evaluate(&self, env: &mut TransformEnv<'_>) -> Result<Option<TransformResult>, Error> {
        if env.config.elements.contains(&env.node_name) || env.trusted.contains(&env.node) {
            return Ok(None);
        }
        let output = env.config.output;
        if !dom::escape_element(env.doc, env.node, output) {
            dom::detach(env.doc, env.node);
        }
        Ok(None)
    }
}
