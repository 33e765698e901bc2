//! Arena-backed XML element tree.
//!
//! # Responsibilities
//! - Parse a configuration document into an ordered node arena
//! - Hand out opaque [`NodeId`] handles instead of node references
//! - Serialize the tree back deterministically
//!
//! # Design Decisions
//! - Nodes are never freed; removal detaches a node from its parent
//! - Handles index into the arena, so a handle from another document panics
//!   the same way an out-of-range `Vec` index does
//! - Whitespace-only text is dropped on parse and re-created by the writer
//! - A lone text child is kept verbatim; text mixed with elements is
//!   re-indented

use std::borrow::Cow;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::server_config::{ServerConfigError, ServerConfigResult};

const INDENT: &str = "  ";
const DECLARATION: &str = "<?xml version='1.0' encoding='utf-8'?>\n";

/// Opaque handle to a node of a [`Document`].
///
/// Only meaningful for the document that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
    Instruction(String),
    DocType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
}

/// Where a new node goes when no sibling of the same kind exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Insert as the first child of the parent.
    First,
    /// Append as the last child of the parent.
    Last,
}

/// An ordered XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    /// Document-level nodes (comments, doctype, the root element) in order.
    top: Vec<NodeId>,
    root: NodeId,
}

impl Document {
    /// Parse a document from raw bytes.
    pub fn parse(bytes: &[u8]) -> ServerConfigResult<Self> {
        let mut reader = Reader::from_reader(bytes);

        let mut nodes: Vec<Node> = Vec::new();
        let mut top: Vec<NodeId> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root: Option<NodeId> = None;

        loop {
            let event = reader.read_event()?;
            let (kind, opens) = match event {
                Event::Start(start) => (NodeKind::Element(element_from(&start)?), true),
                Event::Empty(start) => (NodeKind::Element(element_from(&start)?), false),
                Event::End(_) => {
                    stack.pop();
                    continue;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(quick_xml::Error::from)?;
                    if text.trim().is_empty() || stack.is_empty() {
                        continue;
                    }
                    (NodeKind::Text(text.into_owned()), false)
                }
                Event::CData(data) => (NodeKind::CData(lossy(&data)), false),
                Event::Comment(comment) => (NodeKind::Comment(lossy(&comment)), false),
                Event::PI(instruction) => (NodeKind::Instruction(lossy(&instruction)), false),
                Event::DocType(doctype) => (NodeKind::DocType(lossy(&doctype)), false),
                Event::Decl(_) => continue,
                Event::Eof => {
                    if let Some(open) = stack.last() {
                        let name = match &nodes[open.0].kind {
                            NodeKind::Element(el) => el.name.clone(),
                            _ => String::new(),
                        };
                        return Err(ServerConfigError::InvalidState(format!(
                            "document ends inside unclosed element <{name}>"
                        )));
                    }
                    break;
                }
            };

            let is_element = matches!(kind, NodeKind::Element(_));
            let id = NodeId(nodes.len());
            let parent = stack.last().copied();
            nodes.push(Node { kind, parent });

            match parent {
                Some(parent) => {
                    if let NodeKind::Element(el) = &mut nodes[parent.0].kind {
                        el.children.push(id);
                    }
                }
                None => {
                    if is_element {
                        if root.is_some() {
                            return Err(ServerConfigError::InvalidState(
                                "document has more than one root element".to_string(),
                            ));
                        }
                        root = Some(id);
                    }
                    top.push(id);
                }
            }

            if opens {
                stack.push(id);
            }
        }

        let root = root.ok_or_else(|| {
            ServerConfigError::InvalidState("document has no root element".to_string())
        })?;

        Ok(Self { nodes, top, root })
    }

    /// Handle of the root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Tag name of an element node, `None` for text, comments and the like.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.name.as_str())
    }

    /// Value of an attribute on an element node.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All attributes of an element node in document order.
    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        self.element(id).map(|el| el.attributes.as_slice()).unwrap_or(&[])
    }

    /// Set an attribute, replacing an existing value in place.
    ///
    /// Does nothing on non-element nodes.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(el) = self.element_mut(id) {
            match el.attributes.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => el.attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Option<String> {
        let el = self.element_mut(id)?;
        let index = el.attributes.iter().position(|(key, _)| key == name)?;
        Some(el.attributes.remove(index).1)
    }

    /// Children of a node (empty for non-elements).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.element(id).map(|el| el.children.as_slice()).unwrap_or(&[])
    }

    /// Child elements with the given tag name, in document order.
    pub fn child_elements(&self, id: NodeId, tag: &str) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|child| self.tag_name(*child) == Some(tag))
            .collect()
    }

    /// Text content of an element whose only child is text.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.children(id) {
            [only] => match &self.nodes[only.0].kind {
                NodeKind::Text(text) | NodeKind::CData(text) => Some(text.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Allocate a new, detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: NodeKind::Element(Element {
                name: name.to_string(),
                attributes: Vec::new(),
                children: Vec::new(),
            }),
            parent: None,
        });
        id
    }

    /// Insert `child` directly after the last child of `parent` tagged `tag`.
    ///
    /// Falls back to `placement` when `parent` has no such child.
    pub fn insert_after_last(
        &mut self,
        parent: NodeId,
        tag: &str,
        child: NodeId,
        placement: Placement,
    ) {
        let siblings = self.children(parent);
        let index = match siblings.iter().rposition(|s| self.tag_name(*s) == Some(tag)) {
            Some(last) => last + 1,
            None => match placement {
                Placement::First => 0,
                Placement::Last => siblings.len(),
            },
        };
        self.insert_child(parent, index, child);
    }

    /// Insert a detached node at `index` among `parent`'s children.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        if let Some(el) = self.element_mut(parent) {
            let index = index.min(el.children.len());
            el.children.insert(index, child);
            self.nodes[child.0].parent = Some(parent);
        }
    }

    /// Unlink a node from its parent. The handle stays valid but detached.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            if let Some(el) = self.element_mut(parent) {
                el.children.retain(|child| *child != id);
            }
        }
    }

    /// Serialize the document, including an XML declaration.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::from(DECLARATION);
        for id in &self.top {
            self.write_node(*id, 0, &mut out);
        }
        out.into_bytes()
    }

    fn write_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let indent = INDENT.repeat(depth);
        out.push_str(&indent);

        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (key, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }

                if el.children.is_empty() {
                    out.push_str("/>\n");
                    return;
                }

                if let Some(text) = self.inline_text(el) {
                    out.push('>');
                    out.push_str(&text);
                    out.push_str("</");
                    out.push_str(&el.name);
                    out.push_str(">\n");
                    return;
                }

                out.push_str(">\n");
                for child in &el.children {
                    self.write_node(*child, depth + 1, out);
                }
                out.push_str(&indent);
                out.push_str("</");
                out.push_str(&el.name);
                out.push_str(">\n");
            }
            NodeKind::Text(text) => {
                out.push_str(&escape(text.trim()));
                out.push('\n');
            }
            NodeKind::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->\n");
            }
            NodeKind::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>\n");
            }
            NodeKind::Instruction(instruction) => {
                out.push_str("<?");
                out.push_str(instruction);
                out.push_str("?>\n");
            }
            NodeKind::DocType(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.trim());
                out.push_str(">\n");
            }
        }
    }

    /// A lone text or CDATA child is written on the element's own line.
    fn inline_text<'a>(&'a self, el: &'a Element) -> Option<Cow<'a, str>> {
        match el.children.as_slice() {
            [only] => match &self.nodes[only.0].kind {
                NodeKind::Text(text) => Some(escape(text.as_str())),
                NodeKind::CData(data) => Some(Cow::Owned(format!("<![CDATA[{}]]>", data))),
                _ => None,
            },
            _ => None,
        }
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].kind {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> ServerConfigResult<Element> {
    let name = lossy(start.name().as_ref());
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = lossy(attribute.key.as_ref());
        let value = attribute
            .unescape_value()
            .map_err(quick_xml::Error::from)?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- top comment -->
<Server port="8005" shutdown="SHUTDOWN">
    <Listener className="A"/>
    <Service name="Catalina">
        <Connector port="8080"/>
        <Engine name="Catalina" defaultHost="localhost">
            <Valve pattern="a &amp; b"><![CDATA[raw <data>]]></Valve>
            <Note>hello &lt;world&gt;</Note>
        </Engine>
    </Service>
</Server>
"#;

    fn outline(doc: &Document, id: NodeId, out: &mut Vec<String>) {
        match doc.tag_name(id) {
            Some(tag) => {
                out.push(format!("<{} {:?}", tag, doc.attributes(id)));
                for child in doc.children(id) {
                    outline(doc, *child, out);
                }
                out.push(format!("</{}", tag));
            }
            None => out.push(format!("{:?}", doc.nodes[id.0].kind)),
        }
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let saved = doc.to_bytes();
        let reparsed = Document::parse(&saved).unwrap();

        let mut before = Vec::new();
        let mut after = Vec::new();
        outline(&doc, doc.root(), &mut before);
        outline(&reparsed, reparsed.root(), &mut after);
        assert_eq!(before, after);

        // Writing is deterministic.
        assert_eq!(saved, reparsed.to_bytes());
    }

    #[test]
    fn test_escaping_survives_round_trip() {
        let doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let text = String::from_utf8(doc.to_bytes()).unwrap();
        assert!(text.contains("pattern=\"a &amp; b\""));
        assert!(text.contains("<Note>hello &lt;world&gt;</Note>"));
        assert!(text.contains("<![CDATA[raw <data>]]>"));
        assert!(text.contains("<!-- top comment -->"));
    }

    #[test]
    fn test_attribute_edits() {
        let mut doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let root = doc.root();
        assert_eq!(doc.attribute(root, "port"), Some("8005"));

        doc.set_attribute(root, "port", "-1");
        doc.set_attribute(root, "address", "localhost");
        assert_eq!(doc.attribute(root, "port"), Some("-1"));
        // Replacing keeps the original position.
        assert_eq!(doc.attributes(root)[0].0, "port");
        assert_eq!(doc.attributes(root)[2].0, "address");

        assert_eq!(doc.remove_attribute(root, "address"), Some("localhost".to_string()));
        assert_eq!(doc.attribute(root, "address"), None);
    }

    #[test]
    fn test_insert_after_last_and_detach() {
        let mut doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let root = doc.root();

        let listener = doc.create_element("Listener");
        doc.insert_after_last(root, "Listener", listener, Placement::First);
        let children = doc.children(root).to_vec();
        assert_eq!(children[1], listener);
        assert!(doc.is_attached(listener));

        doc.detach(listener);
        assert!(!doc.is_attached(listener));
        assert_eq!(doc.child_elements(root, "Listener").len(), 1);
    }

    #[test]
    fn test_rejects_missing_root() {
        let err = Document::parse(b"<!-- nothing -->").unwrap_err();
        assert!(matches!(err, ServerConfigError::InvalidState(_)));
    }

    #[test]
    fn test_rejects_malformed_xml() {
        let err = Document::parse(b"<Server><Service></Server>").unwrap_err();
        assert!(matches!(err, ServerConfigError::Xml(_)));
    }

    #[test]
    fn test_rejects_truncated_document() {
        let err = Document::parse(br#"<Server port="8005"><Service name="Catalina"><Connector port="8080"/>"#)
            .unwrap_err();
        match err {
            ServerConfigError::InvalidState(message) => assert!(message.contains("<Service>"), "got {message}"),
            other => panic!("expected invalid state, got {other:?}"),
        }
    }

    #[test]
    fn test_text_content_keeps_surrounding_spaces() {
        let doc = Document::parse(b"<Server>\n  <Env>  padded value  </Env>\n</Server>").unwrap();
        let env = doc.child_elements(doc.root(), "Env")[0];
        assert_eq!(doc.text(env), Some("  padded value  "));

        let saved = doc.to_bytes();
        assert!(String::from_utf8(saved.clone()).unwrap().contains("<Env>  padded value  </Env>"));

        let reparsed = Document::parse(&saved).unwrap();
        let env = reparsed.child_elements(reparsed.root(), "Env")[0];
        assert_eq!(reparsed.text(env), Some("  padded value  "));
    }
}
