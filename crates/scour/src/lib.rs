// ABOUTME: Allow-list HTML sanitizer built on a real HTML5 parse tree.
// ABOUTME: Policy model, transformer pipeline, and a single-pass decision engine.

//! Allow-list HTML sanitization.
//!
//! Input is parsed as an HTML fragment, walked once in document order, and
//! re-serialized. Every element is judged against the active [`Config`]:
//! allowed elements keep only allow-listed attributes (with per-attribute
//! URI scheme checks), rejected elements are stripped, pruned, or escaped
//! per the policy. Transformers hook into the walk to adjust decisions
//! per element.
//!
//! ```
//! use scour::{Config, Sanitizer};
//!
//! let sanitizer = Sanitizer::new(Config::restricted());
//! let clean = sanitizer
//!     .clean("<b id=\"x\">Hello</b><div>world</div>")
//!     .unwrap();
//! assert_eq!(clean, "<b>Hello</b>world");
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod sanitizer;
pub mod transform;
pub mod transformers;

pub use config::{Config, ConfigBuilder, OutputFormat, Protocol, RemoveContents, ALL_ELEMENTS};
pub use error::Error;
pub use sanitizer::Sanitizer;
pub use transform::{transform_fn, Transform, TransformEnv, TransformResult};

// Tree handles in the public API come from these crates.
pub use ego_tree::NodeId;
pub use scraper::Html;

/// One-shot convenience wrapper around [`Sanitizer::clean`].
pub fn clean(html: &str, config: Config) -> Result<String, Error> {
    Sanitizer::new(config).clean(html)
}
