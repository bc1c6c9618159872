// ABOUTME: Policy model for the sanitizer: allowed elements, attributes, protocol rules,
// ABOUTME: forced attributes, removal policy, output mode, and the preset configurations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::transform::Transform;

/// Wildcard key in [`Config::attributes`] whose entries apply to every element.
pub const ALL_ELEMENTS: &str = "all";

/// The output serialization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Xhtml,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputFormat::Html => "html",
            OutputFormat::Xhtml => "xhtml",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "html" => Ok(OutputFormat::Html),
            "xhtml" => Ok(OutputFormat::Xhtml),
            other => Err(Error::Config(format!("unsupported output format: {}", other))),
        }
    }
}

/// A single allowed URI scheme, or the marker admitting schemeless (relative) values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Protocol {
    Scheme(String),
    Relative,
}

impl Protocol {
    /// Builds a scheme entry, lowercased for comparison against parsed values.
    pub fn scheme(s: &str) -> Self {
        Protocol::Scheme(s.to_lowercase())
    }
}

impl From<&str> for Protocol {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("relative") {
            Protocol::Relative
        } else {
            Protocol::scheme(s)
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Scheme(s) => write!(f, "{}", s),
            Protocol::Relative => write!(f, "relative"),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Protocol::Scheme(s) => serializer.serialize_str(s),
            Protocol::Relative => serializer.serialize_str("relative"),
        }
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Protocol::from(s.as_str()))
    }
}

/// Which rejected elements lose their entire subtree instead of being stripped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemoveContents {
    /// No element is pruned; rejected elements are stripped, keeping children.
    #[default]
    None,
    /// Every rejected element is pruned together with its subtree.
    All,
    /// Only the named elements are pruned.
    Elements(HashSet<String>),
}

impl RemoveContents {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            RemoveContents::None => false,
            RemoveContents::All => true,
            RemoveContents::Elements(set) => set.contains(name),
        }
    }
}

impl Serialize for RemoveContents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RemoveContents::None => serializer.serialize_bool(false),
            RemoveContents::All => serializer.serialize_bool(true),
            RemoveContents::Elements(set) => set.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RemoveContents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Elements(HashSet<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => RemoveContents::All,
            Raw::Flag(false) => RemoveContents::None,
            Raw::Elements(set) => RemoveContents::Elements(set),
        })
    }
}

/// Immutable per-sanitizer policy.
///
/// Start from [`Config::default`] or one of the presets and adjust through
/// [`ConfigBuilder`] or struct update syntax. The data fields round-trip
/// through serde so policies can be loaded from JSON; the transformer list is
/// code, not data, and is skipped.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Allowed element names, lowercase.
    pub elements: HashSet<String>,
    /// Allowed attribute names per element, plus the [`ALL_ELEMENTS`] wildcard entry.
    pub attributes: HashMap<String, HashSet<String>>,
    /// Allowed URI schemes per element and attribute.
    pub protocols: HashMap<String, HashMap<String, HashSet<Protocol>>>,
    /// Attributes forced onto kept elements, overwriting existing values.
    pub add_attributes: HashMap<String, BTreeMap<String, String>>,
    /// Rejected elements whose subtree is pruned rather than stripped.
    pub remove_contents: RemoveContents,
    /// Keep comment nodes instead of removing them.
    pub allow_comments: bool,
    /// Neutralize every rejected element to literal text instead of stripping it.
    pub escape_only: bool,
    /// Serialization mode for output and for escape-mode tag rendering.
    pub output: OutputFormat,
    /// Encoding label applied by byte-producing entry points.
    pub output_encoding: String,
    /// Ordered transformer pipeline, run per element before the allow-list decision.
    #[serde(skip)]
    pub transformers: Vec<Arc<dyn Transform>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            elements: HashSet::new(),
            attributes: HashMap::new(),
            protocols: HashMap::new(),
            add_attributes: HashMap::new(),
            remove_contents: RemoveContents::None,
            allow_comments: false,
            escape_only: false,
            output: OutputFormat::Html,
            output_encoding: "utf-8".to_string(),
            transformers: Vec::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("elements", &self.elements)
            .field("attributes", &self.attributes)
            .field("protocols", &self.protocols)
            .field("add_attributes", &self.add_attributes)
            .field("remove_contents", &self.remove_contents)
            .field("allow_comments", &self.allow_comments)
            .field("escape_only", &self.escape_only)
            .field("output", &self.output)
            .field("output_encoding", &self.output_encoding)
            .field("transformers", &self.transformers.len())
            .finish()
    }
}

fn set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn schemes(list: &[&str]) -> HashSet<Protocol> {
    list.iter().map(|s| Protocol::from(*s)).collect()
}

impl Config {
    /// Conservative preset: a handful of inline formatting elements, no attributes.
    pub fn restricted() -> Self {
        Self {
            elements: set(&["b", "em", "i", "strong", "u"]),
            ..Self::default()
        }
    }

    /// Preset for simple user-generated markup: basic formatting, lists, and links.
    pub fn basic() -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("a".to_string(), set(&["href"]));
        attributes.insert("abbr".to_string(), set(&["title"]));
        attributes.insert("blockquote".to_string(), set(&["cite"]));
        attributes.insert("dfn".to_string(), set(&["title"]));
        attributes.insert("q".to_string(), set(&["cite"]));
        attributes.insert("time".to_string(), set(&["datetime", "pubdate"]));

        let mut protocols: HashMap<String, HashMap<String, HashSet<Protocol>>> = HashMap::new();
        protocols.insert(
            "a".to_string(),
            [(
                "href".to_string(),
                schemes(&["ftp", "http", "https", "mailto", "relative"]),
            )]
            .into_iter()
            .collect(),
        );
        protocols.insert(
            "blockquote".to_string(),
            [("cite".to_string(), schemes(&["http", "https", "relative"]))]
                .into_iter()
                .collect(),
        );
        protocols.insert(
            "q".to_string(),
            [("cite".to_string(), schemes(&["http", "https", "relative"]))]
                .into_iter()
                .collect(),
        );

        let mut add_attributes = HashMap::new();
        add_attributes.insert(
            "a".to_string(),
            [("rel".to_string(), "nofollow".to_string())]
                .into_iter()
                .collect::<BTreeMap<_, _>>(),
        );

        Self {
            elements: set(&[
                "a", "abbr", "b", "blockquote", "br", "cite", "code", "dd", "dfn", "dl", "dt",
                "em", "i", "kbd", "li", "mark", "ol", "p", "pre", "q", "s", "samp", "small",
                "strike", "strong", "sub", "sup", "time", "u", "ul", "var",
            ]),
            attributes,
            protocols,
            add_attributes,
            ..Self::default()
        }
    }

    /// Permissive preset: document structure, tables, and images on top of
    /// [`Config::basic`], without the forced `rel="nofollow"`.
    pub fn relaxed() -> Self {
        let mut config = Self::basic();
        config.add_attributes.clear();

        for el in [
            "bdo",
            "caption",
            "col",
            "colgroup",
            "del",
            "figcaption",
            "figure",
            "h1",
            "h2",
            "h3",
            "h4",
            "h5",
            "h6",
            "hgroup",
            "img",
            "ins",
            "rp",
            "rt",
            "ruby",
            "table",
            "tbody",
            "td",
            "tfoot",
            "th",
            "thead",
            "tr",
            "wbr",
        ] {
            config.elements.insert(el.to_string());
        }

        config
            .attributes
            .insert(ALL_ELEMENTS.to_string(), set(&["dir", "lang", "title"]));
        config
            .attributes
            .insert("col".to_string(), set(&["span", "width"]));
        config
            .attributes
            .insert("colgroup".to_string(), set(&["span", "width"]));
        config
            .attributes
            .insert("del".to_string(), set(&["cite", "datetime"]));
        config
            .attributes
            .insert("img".to_string(), set(&["align", "alt", "height", "src", "width"]));
        config
            .attributes
            .insert("ins".to_string(), set(&["cite", "datetime"]));
        config
            .attributes
            .insert("ol".to_string(), set(&["reversed", "start", "type"]));
        config
            .attributes
            .insert("table".to_string(), set(&["summary", "width"]));
        config.attributes.insert(
            "td".to_string(),
            set(&["abbr", "axis", "colspan", "rowspan", "width"]),
        );
        config.attributes.insert(
            "th".to_string(),
            set(&["abbr", "axis", "colspan", "rowspan", "scope", "width"]),
        );
        config
            .attributes
            .insert("ul".to_string(), set(&["type"]));

        config.protocols.insert(
            "del".to_string(),
            [("cite".to_string(), schemes(&["http", "https", "relative"]))]
                .into_iter()
                .collect(),
        );
        config.protocols.insert(
            "img".to_string(),
            [("src".to_string(), schemes(&["http", "https", "relative"]))]
                .into_iter()
                .collect(),
        );
        config.protocols.insert(
            "ins".to_string(),
            [("cite".to_string(), schemes(&["http", "https", "relative"]))]
                .into_iter()
                .collect(),
        );

        config
    }

    /// Create a builder seeded with the default (deny-everything) policy.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for constructing [`Config`] values with a fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder seeded with [`Config::default`].
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create a builder seeded with an existing policy, typically a preset.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Allow an element.
    pub fn element(mut self, name: &str) -> Self {
        self.config.elements.insert(name.to_lowercase());
        self
    }

    /// Allow several elements.
    pub fn elements<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.config.elements.insert(name.as_ref().to_lowercase());
        }
        self
    }

    /// Allow attributes on an element, or on every element via [`ALL_ELEMENTS`].
    pub fn attributes<I, S>(mut self, element: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self
            .config
            .attributes
            .entry(element.to_lowercase())
            .or_default();
        for name in names {
            entry.insert(name.as_ref().to_lowercase());
        }
        self
    }

    /// Restrict an attribute's URI schemes on an element.
    pub fn protocols<I, P>(mut self, element: &str, attribute: &str, allowed: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Protocol>,
    {
        let entry = self
            .config
            .protocols
            .entry(element.to_lowercase())
            .or_default()
            .entry(attribute.to_lowercase())
            .or_default();
        for protocol in allowed {
            entry.insert(protocol.into());
        }
        self
    }

    /// Force an attribute onto every kept instance of an element.
    pub fn add_attribute(mut self, element: &str, key: &str, value: &str) -> Self {
        self.config
            .add_attributes
            .entry(element.to_lowercase())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Set the subtree-removal policy for rejected elements.
    pub fn remove_contents(mut self, policy: RemoveContents) -> Self {
        self.config.remove_contents = policy;
        self
    }

    /// Keep comment nodes.
    pub fn allow_comments(mut self, allow: bool) -> Self {
        self.config.allow_comments = allow;
        self
    }

    /// Neutralize rejected elements to literal text instead of stripping them.
    pub fn escape_only(mut self, escape: bool) -> Self {
        self.config.escape_only = escape;
        self
    }

    /// Set the output serialization mode.
    pub fn output(mut self, output: OutputFormat) -> Self {
        self.config.output = output;
        self
    }

    /// Set the encoding label used by byte-producing entry points.
    pub fn output_encoding(mut self, label: impl Into<String>) -> Self {
        self.config.output_encoding = label.into();
        self
    }

    /// Append a transformer to the pipeline.
    pub fn transformer(mut self, transformer: Arc<dyn Transform>) -> Self {
        self.config.transformers.push(transformer);
        self
    }

    /// Build the final policy.
    pub fn build(self) -> Config {
        self.config
    }
}
