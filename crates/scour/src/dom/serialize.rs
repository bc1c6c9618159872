// ABOUTME: Fragment serializer for sanitized trees, with HTML and XHTML output modes.
// ABOUTME: Escapes text and attribute values; void elements render without closing tags.

use ego_tree::NodeId;
use scraper::{Html, Node};

use crate::config::OutputFormat;

/// Renders every child of `id`, in order.
pub fn render_children(doc: &Html, id: NodeId, mode: OutputFormat) -> String {
    let mut out = String::new();
    if let Some(node) = doc.tree.get(id) {
        for child in node.children() {
            write_node(doc, child.id(), mode, &mut out);
        }
    }
    out
}

/// Renders the node itself, including its children.
pub fn render_node(doc: &Html, id: NodeId, mode: OutputFormat) -> String {
    let mut out = String::new();
    write_node(doc, id, mode, &mut out);
    out
}

fn write_node(doc: &Html, id: NodeId, mode: OutputFormat, out: &mut String) {
    let Some(node) = doc.tree.get(id) else {
        return;
    };
    match node.value() {
        Node::Text(text) => out.push_str(&escape_text(&**text)),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(&**comment);
            out.push_str("-->");
        }
        Node::Element(el) => {
            let name = el.name();
            out.push('<');
            out.push_str(name);
            for (k, v) in el.attrs() {
                out.push(' ');
                out.push_str(k);
                out.push_str("=\"");
                out.push_str(&escape_attr(v));
                out.push('"');
            }
            if is_void_element(name) {
                match mode {
                    OutputFormat::Html => out.push('>'),
                    OutputFormat::Xhtml => out.push_str(" />"),
                }
                return;
            }
            out.push('>');
            for child in node.children() {
                write_node(doc, child.id(), mode, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        Node::Document | Node::Fragment => {
            for child in node.children() {
                write_node(doc, child.id(), mode, out);
            }
        }
        _ => {}
    }
}

/// Escape text content. Quotes stay literal; they are only significant inside
/// attribute values.
pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Escape an attribute value.
pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Check if tag is a void element, which never carries children or a closing tag.
pub fn is_void_element(tag: &str) -> bool {
    matches!(
        tag.to_lowercase().as_str(),
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::fragment_root;

    fn render(html: &str, mode: OutputFormat) -> String {
        let doc = Html::parse_fragment(html);
        let root = fragment_root(&doc).unwrap();
        render_children(&doc, root, mode)
    }

    #[test]
    fn test_escape_text_leaves_quotes() {
        assert_eq!(escape_text("a < b & \"c\""), "a &lt; b &amp; \"c\"");
    }

    #[test]
    fn test_escape_attr_escapes_quotes() {
        assert_eq!(escape_attr("a \"b\" & c"), "a &quot;b&quot; &amp; c");
    }

    #[test]
    fn test_render_text_is_escaped() {
        assert_eq!(render("a &amp; b", OutputFormat::Html), "a &amp; b");
    }

    #[test]
    fn test_render_element_with_attribute() {
        assert_eq!(
            render("<b id=\"x\">hi</b>", OutputFormat::Html),
            "<b id=\"x\">hi</b>"
        );
    }

    #[test]
    fn test_render_void_element_modes() {
        assert_eq!(render("a<br>b", OutputFormat::Html), "a<br>b");
        assert_eq!(render("a<br>b", OutputFormat::Xhtml), "a<br />b");
    }

    #[test]
    fn test_render_comment() {
        assert_eq!(render("a<!--note-->b", OutputFormat::Html), "a<!--note-->b");
    }

    #[test]
    fn test_empty_non_void_gets_closing_tag() {
        assert_eq!(render("<div></div>", OutputFormat::Xhtml), "<div></div>");
    }
}
