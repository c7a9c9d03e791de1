use std::borrow::Cow;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use tracing::debug;

pub type NodeId = usize;

/// The synthetic node every top-level element hangs off.
pub const DOCUMENT: NodeId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Name),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    /// Resolved namespace URI, if the prefix (or a default namespace) was bound.
    pub namespace: Option<String>,
    /// Raw qualified name as written, used to pair end tags.
    pub qname: String,
    pub local: String,
}

#[derive(Debug, Clone)]
pub enum Child {
    Element(NodeId),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<Child>,
}

/// Arena tree of one XML document. Node ids follow document order.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parse leniently: mismatched or stray end tags are tolerated, unknown
    /// entities read as a space, and a malformed fragment is skipped so the rest
    /// of the document is still read. Returns `None` only when no element at all
    /// could be read.
    pub fn parse(bytes: &[u8]) -> Option<Document> {
        let mut reader = NsReader::from_reader(bytes);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        let mut doc = Document {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        };
        let mut stack: Vec<NodeId> = vec![DOCUMENT];
        let mut buf = Vec::new();
        let mut last_error_at = None;

        loop {
            let parent = *stack.last().unwrap_or(&DOCUMENT);
            let mut failure = None;
            match reader.read_resolved_event_into(&mut buf) {
                Ok((ns, Event::Start(e))) => {
                    let id = doc.push_element(element_name(&ns, &e), parent);
                    stack.push(id);
                }
                Ok((ns, Event::Empty(e))) => {
                    doc.push_element(element_name(&ns, &e), parent);
                }
                Ok((_, Event::End(e))) => {
                    let qname = lossy(e.name().as_ref()).into_owned();
                    // Close up to the nearest open element with this name; ignore strays.
                    if let Some(pos) = stack
                        .iter()
                        .rposition(|&id| id != DOCUMENT && doc.qname(id) == Some(qname.as_str()))
                    {
                        stack.truncate(pos);
                    }
                }
                Ok((_, Event::Text(e))) => {
                    if parent != DOCUMENT {
                        let text = match e.unescape_with(|entity| {
                            resolve_predefined_entity(entity).or(Some(" "))
                        }) {
                            Ok(t) => t.into_owned(),
                            Err(_) => lossy(&e).into_owned(),
                        };
                        doc.push_text(parent, text);
                    }
                }
                Ok((_, Event::CData(e))) => {
                    if parent != DOCUMENT {
                        doc.push_text(parent, lossy(&e).into_owned());
                    }
                }
                Ok((_, Event::Eof)) => break,
                Ok(_) => {}
                Err(err) => failure = Some(err),
            }
            buf.clear();

            if let Some(err) = failure {
                // The reader resumes after the bad markup; stop if it made no progress.
                let pos = reader.buffer_position();
                if last_error_at == Some(pos) {
                    debug!("XML reader stuck at byte {}, keeping tree: {}", pos, err);
                    break;
                }
                debug!("Skipping malformed XML at byte {}: {}", pos, err);
                last_error_at = Some(pos);
            }
        }

        if doc.nodes.len() > 1 {
            Some(doc)
        } else {
            None
        }
    }

    fn push_element(&mut self, name: Name, parent: NodeId) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Element(name),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(Child::Element(id));
        id
    }

    fn push_text(&mut self, parent: NodeId, text: String) {
        if text.is_empty() {
            return;
        }
        // Adjacent text and entity fragments merge into one text child.
        if let Some(Child::Text(prev)) = self.nodes[parent].children.last_mut() {
            prev.push_str(&text);
        } else {
            self.nodes[parent].children.push(Child::Text(text));
        }
    }

    pub fn name(&self, id: NodeId) -> Option<&Name> {
        match &self.nodes[id].kind {
            NodeKind::Element(name) => Some(name),
            NodeKind::Document => None,
        }
    }

    fn qname(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(|n| n.qname.as_str())
    }

    /// True if `id` is an element with the given namespace URI and local name.
    /// `None` matches only elements without any namespace.
    pub fn is_element(&self, id: NodeId, namespace: Option<&str>, local: &str) -> bool {
        self.name(id)
            .is_some_and(|n| n.local == local && n.namespace.as_deref() == namespace)
    }

    /// All elements strictly below `id`, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending: Vec<NodeId> = self.child_elements(id).rev().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.child_elements(next).rev());
        }
        out
    }

    pub fn child_elements(&self, id: NodeId) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.nodes[id].children.iter().filter_map(|c| match c {
            Child::Element(child) => Some(*child),
            Child::Text(_) => None,
        })
    }

    pub fn has_ancestor(&self, id: NodeId, namespace: Option<&str>, local: &str) -> bool {
        let mut current = self.nodes[id].parent;
        while let Some(p) = current {
            if self.is_element(p, namespace, local) {
                return true;
            }
            current = self.nodes[p].parent;
        }
        false
    }

    /// Concatenation of every text node below `id`, untrimmed.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in &self.nodes[id].children {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Element(c) => self.collect_text(*c, out),
            }
        }
    }
}

fn element_name(ns: &ResolveResult, e: &BytesStart) -> Name {
    let namespace = match ns {
        ResolveResult::Bound(uri) => Some(lossy(uri.as_ref()).into_owned()),
        _ => None,
    };
    Name {
        namespace,
        qname: lossy(e.name().as_ref()).into_owned(),
        local: lossy(e.local_name().as_ref()).into_owned(),
    }
}

fn lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}
