//! Minimal XML element tree
//!
//! Every document and wire message in the crate is a small XML tree, so
//! one reader/writer pair handles them all. Reading materializes the
//! whole element; documents here are bounded (results, settings, single
//! wire messages), not streamed.

#![allow(dead_code)]

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::errors::XmlError;

/// One XML element: name, attributes, text content and child elements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn add_child(&mut self, child: XmlNode) {
        self.children.push(child);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn require_attr(&self, key: &str) -> Result<&str, XmlError> {
        self.attr(key).ok_or_else(|| {
            XmlError::malformed(format!("<{}> is missing the {} attribute", self.name, key))
        })
    }

    pub fn find_child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn require_child(&self, name: &str) -> Result<&XmlNode, XmlError> {
        self.find_child(name).ok_or_else(|| {
            XmlError::malformed(format!("<{}> is missing a <{}> child", self.name, name))
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parse a complete document into its single root element.
    pub fn parse(input: &str) -> Result<XmlNode, XmlError> {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    stack.push(Self::from_start(&start)?);
                }
                Event::Empty(start) => {
                    let node = Self::from_start(&start)?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| XmlError::malformed("unexpected closing tag"))?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        top.text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if !stack.is_empty() {
            return Err(XmlError::malformed("unterminated element"));
        }
        root.ok_or_else(|| XmlError::malformed("document has no root element"))
    }

    fn from_start(start: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
        let mut node = XmlNode::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attributes.push((key, value));
        }
        Ok(node)
    }

    fn attach(
        stack: &mut Vec<XmlNode>,
        root: &mut Option<XmlNode>,
        node: XmlNode,
    ) -> Result<(), XmlError> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
            Ok(())
        } else if root.is_none() {
            *root = Some(node);
            Ok(())
        } else {
            Err(XmlError::malformed("document has multiple root elements"))
        }
    }

    fn write_into<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<(), XmlError> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        if self.children.is_empty() && self.text.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        if !self.text.is_empty() {
            writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Indented document with an XML declaration, for files.
    pub fn to_document(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.write_into(&mut writer)?;
        let mut text = Self::into_string(writer.into_inner())?;
        text.push('\n');
        Ok(text)
    }

    /// Single-line form without a declaration, for wire messages.
    pub fn to_compact(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new(Vec::new());
        self.write_into(&mut writer)?;
        Self::into_string(writer.into_inner())
    }

    fn into_string(bytes: Vec<u8>) -> Result<String, XmlError> {
        String::from_utf8(bytes).map_err(|_| XmlError::malformed("non-utf8 writer output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested() {
        let doc = r#"<Outer Name="a"><Inner Value="1"/><Inner Value="2">text</Inner></Outer>"#;
        let node = XmlNode::parse(doc).unwrap();
        assert_eq!(node.name, "Outer");
        assert_eq!(node.attr("Name"), Some("a"));
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].text, "text");
        assert_eq!(node.children_named("Inner").count(), 2);
    }

    #[test]
    fn test_escaped_attributes_round_trip() {
        let node = XmlNode::new("Entry").with_attr("Text", r#"a < b && "c""#);
        let compact = node.to_compact().unwrap();
        let back = XmlNode::parse(&compact).unwrap();
        assert_eq!(back.attr("Text"), Some(r#"a < b && "c""#));
    }

    #[test]
    fn test_escaped_text_round_trip() {
        let node = XmlNode::new("Entry").with_text("1 < 2 & 3 > 2");
        let back = XmlNode::parse(&node.to_compact().unwrap()).unwrap();
        assert_eq!(back.text, "1 < 2 & 3 > 2");
    }

    #[test]
    fn test_document_round_trip() {
        let node = XmlNode::new("Settings")
            .with_child(XmlNode::new("Setting").with_attr("Key", "LogLevel"))
            .with_child(XmlNode::new("Setting").with_attr("Key", "DisableTimeouts"));
        let doc = node.to_document().unwrap();
        assert!(doc.starts_with("<?xml"));
        let back = XmlNode::parse(&doc).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_rejects_multiple_roots() {
        assert!(XmlNode::parse("<A/><B/>").is_err());
    }

    #[test]
    fn test_rejects_empty_document() {
        assert!(XmlNode::parse("  ").is_err());
    }

    #[test]
    fn test_missing_attr_is_error() {
        let node = XmlNode::parse("<A/>").unwrap();
        assert!(node.require_attr("Name").is_err());
        assert!(node.require_child("B").is_err());
    }
}
