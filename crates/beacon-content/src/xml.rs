//! Small helpers over roxmltree plus a writer that re-serialises a parsed
//! subtree as a standalone document.

use std::borrow::Cow;
use std::fmt::Write as _;

use roxmltree::Node;

const XML_PREFIX: &str = "xml";

pub fn escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Appends `<name>text</name>`.
pub fn push_element(out: &mut String, name: &str, text: &str) {
    let _ = write!(out, "<{name}>{}</{name}>", escape(text));
}

/// Drops a leading `<?xml ... ?>` declaration, if any.
pub fn strip_declaration(doc: &str) -> &str {
    let trimmed = doc.trim_start();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

/// Case-insensitive local-name comparison.
pub fn is(node: Node<'_, '_>, local: &str) -> bool {
    node.is_element() && node.tag_name().name().eq_ignore_ascii_case(local)
}

pub fn child<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|c| is(*c, local))
}

pub fn children<'a, 'i>(node: Node<'a, 'i>, local: &'a str) -> impl Iterator<Item = Node<'a, 'i>> + 'a {
    node.children().filter(move |c| is(*c, local))
}

/// Concatenated, trimmed text of a node. Empty text is `None`.
pub fn text(node: Node<'_, '_>) -> Option<String> {
    let joined: String = node
        .descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn child_text(node: Node<'_, '_>, local: &str) -> Option<String> {
    child(node, local).and_then(text)
}

/// Follows a chain of child element names.
pub fn path<'a, 'i>(node: Node<'a, 'i>, locals: &[&str]) -> Option<Node<'a, 'i>> {
    locals.iter().try_fold(node, |current, local| child(current, local))
}

/// Serialises `node` and its descendants. Namespace declarations inherited
/// from outside the subtree are written on its root element so the output
/// stands alone.
///
/// `rewrite` may replace the content of any element with new text.
pub fn write_subtree<F>(node: Node<'_, '_>, out: &mut String, rewrite: &F)
where
    F: Fn(Node<'_, '_>) -> Option<String>,
{
    write_element(node, None, out, rewrite);
}

pub fn subtree_to_string(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    write_subtree(node, &mut out, &|_| None);
    out
}

fn write_element<F>(node: Node<'_, '_>, parent: Option<Node<'_, '_>>, out: &mut String, rewrite: &F)
where
    F: Fn(Node<'_, '_>) -> Option<String>,
{
    let tag = node.tag_name();
    let name = qualified(node, tag.namespace(), tag.name());

    out.push('<');
    out.push_str(&name);

    for ns in node.namespaces() {
        if ns.name() == Some(XML_PREFIX) {
            continue;
        }
        let inherited = parent.is_some_and(|p| {
            p.namespaces().any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        match ns.name() {
            Some(prefix) => {
                let _ = write!(out, " xmlns:{prefix}=\"{}\"", escape(ns.uri()));
            }
            None => {
                let _ = write!(out, " xmlns=\"{}\"", escape(ns.uri()));
            }
        }
    }
    if tag.namespace().is_none() && node.namespaces().any(|ns| ns.name().is_none()) {
        out.push_str(" xmlns=\"\"");
    }

    for attr in node.attributes() {
        let attr_name = match attr.namespace() {
            Some(uri) => match prefix_for(node, uri) {
                Some(prefix) => format!("{prefix}:{}", attr.name()),
                None => attr.name().to_string(),
            },
            None => attr.name().to_string(),
        };
        let _ = write!(out, " {attr_name}=\"{}\"", escape(attr.value()));
    }

    if let Some(replacement) = rewrite(node) {
        let _ = write!(out, ">{}</{name}>", escape(&replacement));
        return;
    }

    if !node.has_children() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for c in node.children() {
        if c.is_element() {
            write_element(c, Some(node), out, rewrite);
        } else if c.is_text() {
            out.push_str(&escape(c.text().unwrap_or_default()));
        }
    }
    let _ = write!(out, "</{name}>");
}

fn qualified(node: Node<'_, '_>, namespace: Option<&str>, local: &str) -> String {
    let Some(uri) = namespace else {
        return local.to_string();
    };
    if node.namespaces().any(|ns| ns.name().is_none() && ns.uri() == uri) {
        return local.to_string();
    }
    match prefix_for(node, uri) {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn prefix_for<'i>(node: Node<'_, 'i>, uri: &str) -> Option<&'i str> {
    node.namespaces()
        .filter(|ns| ns.uri() == uri)
        .find_map(|ns| ns.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert!(matches!(escape("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn strips_declaration() {
        assert_eq!(strip_declaration("<?xml version=\"1.0\"?>\n<a/>"), "<a/>");
        assert_eq!(strip_declaration("  <a/>"), "<a/>");
    }

    #[test]
    fn subtree_carries_inherited_namespaces() {
        let doc = Document::parse(
            r#"<root xmlns:p="urn:p" xmlns="urn:d"><wrap><p:item a="1">x &amp; y<p:leaf/></p:item></wrap></root>"#,
        )
        .unwrap();
        let item = doc.descendants().find(|n| n.tag_name().name() == "item").unwrap();
        let rendered = subtree_to_string(item);

        let reparsed = Document::parse(&rendered).unwrap();
        let root = reparsed.root_element();
        assert_eq!(root.tag_name().namespace(), Some("urn:p"));
        assert_eq!(root.attribute("a"), Some("1"));
        assert_eq!(text(root).as_deref(), Some("x & y"));
        assert_eq!(root.first_element_child().unwrap().tag_name().namespace(), Some("urn:p"));
    }

    #[test]
    fn rewrite_replaces_element_text() {
        let doc = Document::parse("<a><b>old</b><c>keep</c></a>").unwrap();
        let mut out = String::new();
        write_subtree(doc.root_element(), &mut out, &|n| is(n, "b").then(|| "new".to_string()));
        assert_eq!(out, "<a><b>new</b><c>keep</c></a>");
    }

    #[test]
    fn path_is_case_insensitive() {
        let doc = Document::parse("<a><B><c>v</c></B></a>").unwrap();
        let found = path(doc.root_element(), &["b", "C"]).unwrap();
        assert_eq!(text(found).as_deref(), Some("v"));
    }
}
