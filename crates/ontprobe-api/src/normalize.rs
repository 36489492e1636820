// ── Instance markup normalizer ──
//
// Flattens the nested `<X><Instance><ParaName/><ParaValue/>…</Instance></X>`
// encoding into ordinary mappings and lists. Pure and allocation-only:
// no I/O, no vendor knowledge beyond the tag conventions below.

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::Error;
use crate::record::{ErrorBlock, NormalizedRecord, Value};

pub const XML_ROOT_START: &str = "<ajax_response_xml_root";
pub const XML_ROOT_END: &str = "</ajax_response_xml_root>";

const INSTANCE: &str = "Instance";
const PARA_NAME: &str = "ParaName";
const PARA_VALUE: &str = "ParaValue";

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name)
            .map(|c| c.text.trim().to_owned())
            .filter(|t| !t.is_empty())
    }
}

/// Cut the block from the first `start` marker through the last `end`
/// marker, inclusive.
pub fn slice_between_markers<'a>(body: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = body.find(start)?;
    let to = body.rfind(end)? + end.len();
    (to > from).then(|| &body[from..to])
}

/// Extract the response root block from a full HTTP body.
pub fn extract_xml_root(body: &str) -> Result<&str, Error> {
    slice_between_markers(body, XML_ROOT_START, XML_ROOT_END).ok_or_else(|| {
        Error::MarkerNotFound {
            marker: XML_ROOT_START.to_owned(),
        }
    })
}

/// Normalize one markup document into a [`NormalizedRecord`].
pub fn normalize(markup: &str) -> Result<NormalizedRecord, Error> {
    let root = parse_tree(markup)?;
    let mut record = NormalizedRecord {
        sections: IndexMap::new(),
        error: ErrorBlock {
            param: root.child_text("IF_ERRORPARAM"),
            kind: root.child_text("IF_ERRORTYPE"),
            message: root.child_text("IF_ERRORSTR"),
            id: root.child_text("IF_ERRORID"),
        },
    };

    for child in &root.children {
        if child.name.starts_with("IF_") || child.child(INSTANCE).is_none() {
            continue;
        }

        let instances: Vec<Value> = child
            .children
            .iter()
            .filter(|c| c.name == INSTANCE)
            .map(instance_map)
            .filter(|m| !m.is_empty())
            .map(Value::Map)
            .collect();

        let value = match instances.len() {
            0 => continue,
            1 => instances.into_iter().next(),
            _ => Some(Value::List(instances)),
        };
        if let Some(value) = value {
            record.sections.insert(logical_name(&child.name), value);
        }
    }

    Ok(record)
}

/// `OBJ_<name>_ID` → `<name>`, `ID_<name>` → `<name>`, else unchanged.
pub fn logical_name(tag: &str) -> String {
    if let Some(inner) = tag
        .strip_prefix("OBJ_")
        .and_then(|rest| rest.strip_suffix("_ID"))
    {
        if !inner.is_empty() {
            return inner.to_owned();
        }
    }
    if let Some(inner) = tag.strip_prefix("ID_") {
        if !inner.is_empty() {
            return inner.to_owned();
        }
    }
    tag.to_owned()
}

fn instance_map(instance: &Element) -> IndexMap<String, Value> {
    instance
        .children
        .chunks_exact(2)
        .filter(|pair| pair[0].name == PARA_NAME && pair[1].name == PARA_VALUE)
        .map(|pair| (pair[0].text.trim().to_owned(), Value::scalar(&pair[1].text)))
        .collect()
}

fn parse_tree(markup: &str) -> Result<Element, Error> {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| Error::Xml {
            message: format!("at byte {}: {e}", reader.buffer_position()),
        })?;
        match event {
            Event::Start(e) => {
                stack.push(Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..Element::default()
                });
            }
            Event::Empty(e) => {
                let element = Element {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    ..Element::default()
                };
                attach(&mut stack, &mut root, element);
            }
            Event::Text(t) => {
                let text = t.unescape().map_err(|e| Error::Xml {
                    message: e.to_string(),
                })?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(done) = stack.pop() else {
                    return Err(Error::Xml {
                        message: "unbalanced closing tag".into(),
                    });
                };
                attach(&mut stack, &mut root, done);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(Error::Xml {
            message: format!("unclosed element <{}>", open.name),
        });
    }
    root.ok_or_else(|| Error::Xml {
        message: "document has no root element".into(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}
