use crate::{ImporterError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::str::FromStr;

/// Element of a parsed vendor document. Names are local names, so `ns3:Watts` and `Watts`
/// look the same to the parsers.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn find(&self, path: &[&str]) -> Option<&XmlElement> {
        path.iter()
            .try_fold(self, |element, name| element.child(name))
    }

    /// Trimmed text at `path`, `None` when missing or blank.
    pub fn text_of(&self, path: &[&str]) -> Option<&str> {
        self.find(path)
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn parse_at<T: FromStr>(&self, path: &[&str]) -> Option<T> {
        self.text_of(path).and_then(|t| t.parse().ok())
    }

    /// Attribute lookup by local name, ignoring case.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn attr_parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.attr(name).and_then(|v| v.parse().ok())
    }

    /// All elements named `name` below this one, in document order.
    pub fn descendants<'a>(&'a self, name: &str) -> Vec<&'a XmlElement> {
        let mut found = Vec::new();
        collect_descendants(self, name, &mut found);
        found
    }
}

fn collect_descendants<'a>(element: &'a XmlElement, name: &str, found: &mut Vec<&'a XmlElement>) {
    for child in &element.children {
        if child.name == name {
            found.push(child);
        }
        collect_descendants(child, name, found);
    }
}

pub fn parse_document(content: &[u8]) -> Result<XmlElement> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(ImporterError::parse("Empty file"));
    }

    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(4096);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ImporterError::parse(format!(
                "Malformed XML at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) => stack.push(element_from(e)?),
            Event::Empty(ref e) => {
                let element = element_from(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ImporterError::parse("Unbalanced closing tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(ref e) => {
                if let Some(current) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|e| ImporterError::parse(format!("Invalid text content: {}", e)))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(ref e) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(ImporterError::parse("Unexpected end of document"));
    }

    root.ok_or_else(|| ImporterError::parse("No XML root element found"))
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        ..XmlElement::default()
    };

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ImporterError::parse(format!("Invalid attribute: {}", e)))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ImporterError::parse(format!("Invalid attribute value: {}", e)))?;
        element.attributes.push((key, value.into_owned()));
    }

    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(ImporterError::parse("Multiple root elements"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_names_and_lookup() {
        let doc = parse_document(
            br#"<?xml version="1.0"?>
            <root xmlns:ns3="http://example.com/ext">
              <Point id="1"><ns3:Watts>180</ns3:Watts></Point>
              <Point ID="2"><Watts>190</Watts><Note><![CDATA[a < b]]></Note></Point>
            </root>"#,
        )
        .unwrap();

        assert_eq!(doc.name, "root");
        let points: Vec<_> = doc.children("Point").collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].parse_at::<u32>(&["Watts"]), Some(180));
        assert_eq!(points[1].parse_at::<u32>(&["Watts"]), Some(190));
        assert_eq!(points[1].attr("id"), Some("2"));
        assert_eq!(points[1].text_of(&["Note"]), Some("a < b"));
        assert_eq!(doc.descendants("Watts").len(), 2);
    }

    #[test]
    fn test_rejects_empty_and_malformed_input() {
        assert!(parse_document(b"").is_err());
        assert!(parse_document(b"   \n").is_err());
        assert!(parse_document(b"<a><b></a>").is_err());
        assert!(parse_document(b"<a><b>").is_err());
        assert!(parse_document(b"just some text").is_err());
    }
}
