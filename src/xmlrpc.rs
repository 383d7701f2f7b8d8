// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! The sliver of XML-RPC the RSS-Cloud flow needs.
//!
//! Documents are read into a plain element/text tree and callers walk it by
//! position. Only three documents are ever written: a one-argument
//! `methodCall`, a boolean success response, and a fault.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Fault code sent for every rejected request.
pub const FAULT_CODE: i32 = 4;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("Could not parse XML: {0}")]
    Syntax(String),

    #[error("Could not parse XML: document has no root element")]
    NoRoot,

    #[error("Could not parse XML: unexpected closing tag")]
    Unbalanced,
}

impl From<quick_xml::Error> for XmlError {
    fn from(e: quick_xml::Error) -> Self {
        XmlError::Syntax(e.to_string())
    }
}

/// A node in a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Local name, without any namespace prefix.
    pub name: String,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
        }
    }

    /// Child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// First child element called `name`.
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Follow a `/`-separated path of element names, collecting every match.
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        let mut current = vec![self];
        for step in path.split('/') {
            current = current
                .into_iter()
                .flat_map(|e| e.child_elements().filter(move |c| c.name == step))
                .collect();
        }
        current
    }

    /// The first significant child: an element, or text that is not just
    /// whitespace.
    pub fn first_child(&self) -> Option<&Node> {
        self.children.iter().find(|n| match n {
            Node::Element(_) => true,
            Node::Text(t) => !t.trim().is_empty(),
        })
    }

    /// All text directly under this element.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

/// Parse a document into its root element.
pub fn parse(input: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(input);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
                stack.push(Element::new(name));
            }
            Event::Empty(empty) => {
                let name = String::from_utf8_lossy(empty.local_name().as_ref()).into_owned();
                attach(&mut stack, &mut root, Node::Element(Element::new(name)))?;
            }
            Event::End(_) => {
                let done = stack.pop().ok_or(XmlError::Unbalanced)?;
                attach(&mut stack, &mut root, Node::Element(done))?;
            }
            Event::Text(text) => {
                let text = text.unescape()?.into_owned();
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, text);
                }
            }
            Event::CData(cdata) => {
                let text = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Syntax("unclosed element".to_string()));
    }
    root.ok_or(XmlError::NoRoot)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, node: Node) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => match node {
            Node::Element(e) if root.is_none() => *root = Some(e),
            _ => return Err(XmlError::Syntax("more than one root element".to_string())),
        },
    }
    Ok(())
}

/// Adjacent text and CDATA runs form one text node.
fn push_text(parent: &mut Element, text: String) {
    if let Some(Node::Text(prev)) = parent.children.last_mut() {
        prev.push_str(&text);
    } else {
        parent.children.push(Node::Text(text));
    }
}

/// A `methodCall` with a single string argument.
pub fn method_call(method: &str, arg: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n\
         <methodCall>\n\
         <methodName>{}</methodName>\n\
         <params>\n\
         <param>\n\
         <value>{}</value>\n\
         </param>\n\
         </params>\n\
         </methodCall>",
        escape(method),
        escape(arg)
    )
}

/// A `methodResponse` carrying `true`.
pub fn success_response() -> String {
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
     <methodResponse>\n\
     <params>\n\
     <param>\n\
     <value><boolean>1</boolean></value>\n\
     </param>\n\
     </params>\n\
     </methodResponse>"
        .to_string()
}

/// A `methodResponse` fault with `FAULT_CODE` and `message`.
pub fn fault_response(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <methodResponse>\n\
         <fault>\n\
         <value>\n\
         <struct>\n\
         <member>\n\
         <name>faultCode</name>\n\
         <value><int>{}</int></value>\n\
         </member>\n\
         <member>\n\
         <name>faultString</name>\n\
         <value><string>{}</string></value>\n\
         </member>\n\
         </struct>\n\
         </value>\n\
         </fault>\n\
         </methodResponse>",
        FAULT_CODE,
        escape(message)
    )
}
