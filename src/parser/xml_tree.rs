//! Generic XML tree with local-name matching.
//!
//! The project descriptors embed arbitrary namespace prefixes in their tag
//! and attribute names, so all matching is done on the local (unqualified)
//! name. The tree is built once with a quick-xml event loop and traversed
//! by recursive descent; node order is never relied upon.

use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::SiteError;

/// One element of a parsed XML document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse the root element of an XML file.
    pub fn parse_file(path: &Path) -> Result<XmlNode, SiteError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parse the root element of an XML document held in memory.
    pub fn parse_str(content: &str) -> Result<XmlNode, SiteError> {
        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => stack.push(Self::from_start(e)?),
                Event::Empty(ref e) => {
                    let node = Self::from_start(e)?;
                    Self::attach(&mut stack, &mut root, node);
                }
                Event::End(_) => {
                    let node = stack.pop().ok_or_else(|| {
                        SiteError::invalid_descriptor("unbalanced closing tag in descriptor")
                    })?;
                    Self::attach(&mut stack, &mut root, node);
                }
                Event::Text(ref t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(SiteError::invalid_descriptor(
                "descriptor ended with unclosed elements",
            ));
        }
        root.ok_or_else(|| SiteError::invalid_descriptor("descriptor has no root element"))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlNode, SiteError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
            let value = attribute.unescape_value()?.to_string();
            attributes.push((key, value));
        }
        Ok(XmlNode {
            name,
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    fn attach(stack: &mut Vec<XmlNode>, root: &mut Option<XmlNode>, node: XmlNode) {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        } else if root.is_none() {
            *root = Some(node);
        }
    }

    /// The tag name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// The tag name as written, prefix included.
    pub fn qualified_name(&self) -> &str {
        &self.name
    }

    /// Concatenated text content of this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Child elements in document order.
    pub fn children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First child whose local name matches.
    pub fn child(&self, local: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local_name() == local)
    }

    /// All children whose local name matches.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.local_name() == local)
    }

    /// Attribute value looked up by local name.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local_part(key) == local)
            .map(|(_, value)| value.as_str())
    }

    /// The numeric value of a unit-carrying scalar element.
    ///
    /// The descriptor serializes physical quantities with the magnitude in a
    /// `Value` attribute next to a unit attribute; older exports carry the
    /// magnitude as the second attribute without a recognizable name.
    pub fn scalar_value(&self) -> Option<f64> {
        self.attribute("Value")
            .or_else(|| self.attributes.get(1).map(|(_, value)| value.as_str()))
            .and_then(|value| value.parse().ok())
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name_strips_prefix() {
        let root = XmlNode::parse_str(
            r#"<a:Root xmlns:a="urn:x"><a:Child b:type="TileLayer" xmlns:b="urn:y">7</a:Child></a:Root>"#,
        )
        .unwrap();
        assert_eq!(root.local_name(), "Root");
        assert_eq!(root.qualified_name(), "a:Root");

        let child = root.child("Child").unwrap();
        assert_eq!(child.text(), "7");
        assert_eq!(child.attribute("type"), Some("TileLayer"));
    }

    #[test]
    fn test_scalar_value_prefers_value_attribute() {
        let root =
            XmlNode::parse_str(r#"<root><hfw unit="m" Value="0.25"/></root>"#).unwrap();
        assert_eq!(root.child("hfw").unwrap().scalar_value(), Some(0.25));
    }

    #[test]
    fn test_scalar_value_falls_back_to_second_attribute() {
        let root =
            XmlNode::parse_str(r#"<root><hfw unit="m" magnitude="0.5"/></root>"#).unwrap();
        assert_eq!(root.child("hfw").unwrap().scalar_value(), Some(0.5));
    }

    #[test]
    fn test_unbalanced_document_is_rejected() {
        assert!(matches!(
            XmlNode::parse_str("<root><open></root>"),
            Err(SiteError::Xml(_) | SiteError::InvalidDescriptor { .. })
        ));
    }
}
