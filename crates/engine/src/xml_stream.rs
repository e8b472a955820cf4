//! Incremental pull parsing of the prompt service's streamed XML-like
//! output. The planner and per-scene scriptwriter deltas arrive as
//! arbitrary text fragments that do not align with tag boundaries, so a
//! parser that assumes one complete document per chunk will choke the
//! first time a tag is split across two deltas. This module instead
//! buffers incoming text and re-parses the buffered tail on every push,
//! keeping whatever trails off mid-tag for the next push.

use quick_xml::events::Event;
use quick_xml::Reader;

/// One parsed XML event, detached from the buffer that produced it so
/// callers can hold it past the next `push`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    Start { name: String, attrs: Vec<(String, String)> },
    End { name: String },
    /// A self-closing tag (`<sound/>`), treated as Start immediately
    /// followed by End by callers that care about element bodies.
    Empty { name: String, attrs: Vec<(String, String)> },
    Text(String),
}

/// Feeds a growable text buffer to `quick-xml` and drains whatever
/// events can be parsed so far. Never assumes the buffer holds a
/// complete, well-formed document.
#[derive(Default)]
pub struct IncrementalXmlReader {
    pending: String,
}

impl IncrementalXmlReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) {
        self.pending.push_str(chunk);
    }

    /// True if there is buffered text that hasn't produced an event yet
    /// (a genuinely malformed tail, not just "waiting for more bytes",
    /// is indistinguishable here by design — see `reset`).
    pub fn has_pending(&self) -> bool {
        !self.pending.trim().is_empty()
    }

    /// Drop all buffered text. Used when the planner reports an error
    /// mid-scene and parsing must restart from the next element rather
    /// than retrying a tail that will never become valid.
    pub fn reset(&mut self) {
        self.pending.clear();
    }

    /// Parse as many complete events as the buffered text currently
    /// allows, leaving any trailing partial tag or text buffered.
    pub fn drain_events(&mut self) -> Vec<XmlEvent> {
        let mut reader = Reader::from_str(&self.pending);
        reader.config_mut().trim_text(true);

        let mut events = Vec::new();
        let mut consumed = 0usize;

        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(event) => {
                    if let Some(owned) = owned_event(&event) {
                        events.push(owned);
                    }
                    consumed = reader.buffer_position() as usize;
                }
                // Incomplete or malformed tail: stop here and wait for
                // more bytes rather than treating this as a hard error.
                Err(_) => break,
            }
        }

        if consumed > 0 {
            self.pending.drain(..consumed);
        }
        events
    }
}

fn owned_event(event: &Event<'_>) -> Option<XmlEvent> {
    match event {
        Event::Start(e) => Some(XmlEvent::Start {
            name: tag_name(e.name().as_ref()),
            attrs: attrs_of(e),
        }),
        Event::End(e) => Some(XmlEvent::End {
            name: tag_name(e.name().as_ref()),
        }),
        Event::Empty(e) => Some(XmlEvent::Empty {
            name: tag_name(e.name().as_ref()),
            attrs: attrs_of(e),
        }),
        Event::Text(t) => {
            let text = t.unescape().ok()?.into_owned();
            if text.trim().is_empty() {
                None
            } else {
                Some(XmlEvent::Text(text))
            }
        }
        _ => None,
    }
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attrs_of(e: &quick_xml::events::BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .filter_map(|a| a.ok())
        .filter_map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a.unescape_value().ok()?.into_owned();
            Some((key, value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_element_yields_start_text_end() {
        let mut reader = IncrementalXmlReader::new();
        reader.push("<scene location=\"lab\" time=\"night\">hi</scene>");
        let events = reader.drain_events();
        assert_eq!(
            events,
            vec![
                XmlEvent::Start {
                    name: "scene".into(),
                    attrs: vec![
                        ("location".into(), "lab".into()),
                        ("time".into(), "night".into())
                    ]
                },
                XmlEvent::Text("hi".into()),
                XmlEvent::End { name: "scene".into() },
            ]
        );
        assert!(!reader.has_pending());
    }

    #[test]
    fn tag_split_across_two_pushes_waits_for_the_rest() {
        let mut reader = IncrementalXmlReader::new();
        reader.push("<scene loc");
        assert!(reader.drain_events().is_empty());
        assert!(reader.has_pending());

        reader.push("ation=\"lab\" time=\"night\">");
        let events = reader.drain_events();
        assert_eq!(
            events,
            vec![XmlEvent::Start {
                name: "scene".into(),
                attrs: vec![
                    ("location".into(), "lab".into()),
                    ("time".into(), "night".into())
                ]
            }]
        );
    }

    #[test]
    fn self_closing_tag_is_empty_event() {
        let mut reader = IncrementalXmlReader::new();
        reader.push("<sound/>");
        assert_eq!(
            reader.drain_events(),
            vec![XmlEvent::Empty { name: "sound".into(), attrs: vec![] }]
        );
    }

    #[test]
    fn reset_discards_buffered_malformed_tail() {
        let mut reader = IncrementalXmlReader::new();
        reader.push("<scene><<<broken");
        reader.reset();
        assert!(!reader.has_pending());
    }
}
