use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;

/// Key whose value becomes element text instead of an attribute
/// (`<lyrics artist="...">words</lyrics>`).
const TEXT_KEY: &str = "value";

/// Renders a JSON payload as Subsonic-convention XML: scalars become
/// attributes, objects become child elements, arrays repeat the element
/// per item. The same structs therefore serve both response formats.
pub fn render_document(root: &str, value: &Value) -> String {
    let mut writer = Writer::new(Vec::new());
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));
    write_element(&mut writer, root, value);
    String::from_utf8(writer.into_inner()).unwrap_or_default()
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) {
    let object = match value {
        Value::Object(map) => map,
        // A bare scalar renders as element text.
        other => {
            if other.is_null() {
                let _ = writer.write_event(Event::Empty(BytesStart::new(name)));
                return;
            }
            let _ = writer.write_event(Event::Start(BytesStart::new(name)));
            let _ = writer.write_event(Event::Text(BytesText::new(&scalar_text(other))));
            let _ = writer.write_event(Event::End(BytesEnd::new(name)));
            return;
        }
    };

    let mut elem = BytesStart::new(name);
    let mut text: Option<String> = None;
    let mut children: Vec<(&String, &Value)> = Vec::new();

    for (key, field) in object {
        match field {
            Value::Null => {}
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                if key == TEXT_KEY {
                    text = Some(scalar_text(field));
                } else {
                    elem.push_attribute((key.as_str(), scalar_text(field).as_str()));
                }
            }
            Value::Array(_) | Value::Object(_) => children.push((key, field)),
        }
    }

    if text.is_none() && children.is_empty() {
        let _ = writer.write_event(Event::Empty(elem));
        return;
    }

    let _ = writer.write_event(Event::Start(elem));
    if let Some(text) = text {
        let _ = writer.write_event(Event::Text(BytesText::new(&text)));
    }
    for (key, child) in children {
        match child {
            Value::Array(items) => {
                for item in items {
                    write_element(writer, key, item);
                }
            }
            other => write_element(writer, key, other),
        }
    }
    let _ = writer.write_event(Event::End(BytesEnd::new(name)));
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_become_attributes() {
        let xml = render_document(
            "subsonic-response",
            &json!({"status": "ok", "version": "1.16.1"}),
        );
        assert!(xml.contains("<subsonic-response status=\"ok\" version=\"1.16.1\"/>"));
    }

    #[test]
    fn arrays_repeat_child_elements() {
        let xml = render_document(
            "musicFolders",
            &json!({"musicFolder": [{"id": 1, "name": "Music"}, {"id": 2, "name": "More"}]}),
        );
        assert!(xml.contains("<musicFolder id=\"1\" name=\"Music\"/>"));
        assert!(xml.contains("<musicFolder id=\"2\" name=\"More\"/>"));
    }

    #[test]
    fn value_key_becomes_text() {
        let xml = render_document("lyrics", &json!({"artist": "A", "value": "la la"}));
        assert!(xml.contains("<lyrics artist=\"A\">la la</lyrics>"));
    }

    #[test]
    fn nested_objects_become_elements() {
        let xml = render_document(
            "subsonic-response",
            &json!({"status": "failed", "error": {"code": 40, "message": "bad"}}),
        );
        assert!(xml.contains("<error code=\"40\" message=\"bad\"/>"));
    }

    #[test]
    fn nulls_are_omitted() {
        let xml = render_document("child", &json!({"id": "x", "parent": null}));
        assert!(xml.contains("<child id=\"x\"/>"));
    }
}
