use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use super::node::{Bounds, Node};
use crate::error::EngineError;

/// Decode common XML/HTML entities in an attribute value.
/// Handles: &amp; &lt; &gt; &quot; &apos; &nbsp; &#NNN; (decimal) &#xHHH; (hex)
fn decode_entities(s: &str) -> String {
    let mut result = s.to_string();

    // Named entities
    result = result.replace("&lt;", "<");
    result = result.replace("&gt;", ">");
    result = result.replace("&quot;", "\"");
    result = result.replace("&apos;", "'");
    result = result.replace("&nbsp;", " ");

    // Numeric entities (decimal): &#NNN;
    let decimal_re = Regex::new(r"&#(\d+);").unwrap();
    result = decimal_re
        .replace_all(&result, |caps: &regex::Captures| {
            if let Ok(code) = caps[1].parse::<u32>() {
                if let Some(c) = char::from_u32(code) {
                    return c.to_string();
                }
            }
            caps[0].to_string()
        })
        .to_string();

    // Numeric entities (hex): &#xHHH;
    let hex_re = Regex::new(r"&#x([0-9A-Fa-f]+);").unwrap();
    result = hex_re
        .replace_all(&result, |caps: &regex::Captures| {
            if let Ok(code) = u32::from_str_radix(&caps[1], 16) {
                if let Some(c) = char::from_u32(code) {
                    return c.to_string();
                }
            }
            caps[0].to_string()
        })
        .to_string();

    // &amp; last so freshly produced ampersands are not re-decoded
    result.replace("&amp;", "&")
}

/// Escape bare `&` characters that do not start a well-formed entity.
///
/// Device dumps occasionally embed raw ampersands in text attributes, which
/// makes the document ill-formed. This is the single corrective rewrite the
/// parser is allowed before giving up.
fn escape_bare_ampersands(xml: &str) -> String {
    let entity = Regex::new(r"^(amp|lt|gt|quot|apos|nbsp|#\d+|#x[0-9A-Fa-f]+);").unwrap();
    let mut out = String::with_capacity(xml.len() + 16);
    for (i, ch) in xml.char_indices() {
        if ch == '&' && !entity.is_match(&xml[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(ch);
        }
    }
    out
}

/// Replace every non-word character with `_`, clipped to 20 chars.
fn sanitize(s: &str) -> String {
    let re = Regex::new(r"\W").unwrap();
    re.replace_all(s, "_").chars().take(20).collect()
}

/// Derive a human-friendly name for a node's structural path.
///
/// Stable identifiers are preferred over volatile text so paths stay
/// comparable across captures of visually similar screens: resource key
/// tail, then sanitized text, then sanitized accessibility label, then the
/// bare class name.
fn derived_name(node: &Node) -> String {
    if !node.resource_key.is_empty() {
        return node
            .resource_key
            .rsplit('/')
            .next()
            .unwrap_or(&node.resource_key)
            .to_string();
    }
    if !node.text.is_empty() {
        return sanitize(&node.text);
    }
    if !node.accessibility_label.is_empty() {
        return sanitize(&node.accessibility_label);
    }
    node.short_kind().to_string()
}

fn bool_attr(value: &str) -> bool {
    value == "true"
}

fn node_from_attrs(e: &BytesStart, id: usize, depth: usize) -> Node {
    let mut node = Node {
        id,
        depth,
        enabled: true,
        visible: true,
        ..Default::default()
    };

    for attr in e.attributes().filter_map(|a| a.ok()) {
        let key = String::from_utf8_lossy(attr.key.as_ref());
        let value = String::from_utf8_lossy(&attr.value);

        match key.as_ref() {
            "class" => node.kind = value.to_string(),
            "resource-id" => node.resource_key = value.to_string(),
            "text" => node.text = decode_entities(&value),
            "content-desc" => node.accessibility_label = decode_entities(&value),
            "bounds" => node.bounds = Bounds::parse(&value),
            "clickable" => node.clickable = bool_attr(&value),
            "long-clickable" => node.long_clickable = bool_attr(&value),
            "checkable" => node.checkable = bool_attr(&value),
            "checked" => node.checked = bool_attr(&value),
            "scrollable" => node.scrollable = bool_attr(&value),
            "editable" => node.editable = bool_attr(&value),
            "enabled" => node.enabled = bool_attr(&value),
            "focused" => node.focused = bool_attr(&value),
            "visible-to-user" => node.visible = bool_attr(&value),
            _ => {}
        }
    }

    if node.kind.is_empty() {
        node.kind = "node".to_string();
    }
    // Edit boxes do not always declare the editable attribute
    if node.kind.contains("EditText") {
        node.editable = true;
    }

    node
}

/// Parse a raw hierarchy dump into a typed element tree.
///
/// The parser attempts exactly one corrective rewrite (escaping bare `&`)
/// before failing with `MalformedHierarchy`. More aggressive repairs would
/// mask deeper structural corruption.
pub fn parse(xml: &str) -> Result<Node, EngineError> {
    match parse_once(xml) {
        Ok(root) => Ok(root),
        Err(first) => {
            let repaired = escape_bare_ampersands(xml);
            if repaired == xml {
                return Err(first);
            }
            log::debug!("hierarchy dump ill-formed, retrying with escaped ampersands");
            parse_once(&repaired)
        }
    }
}

fn parse_once(xml: &str) -> Result<Node, EngineError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;
    let mut next_id = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"node" => {
                let mut node = node_from_attrs(e, next_id, stack.len());
                next_id += 1;
                assign_path(&mut node, stack.last());
                stack.push(node);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"node" => {
                let mut node = node_from_attrs(e, next_id, stack.len());
                next_id += 1;
                assign_path(&mut node, stack.last());
                attach(node, &mut stack, &mut root);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"node" => {
                let mut node = match stack.pop() {
                    Some(n) => n,
                    None => {
                        return Err(EngineError::MalformedHierarchy(
                            "unbalanced node element".to_string(),
                        ))
                    }
                };
                node.child_count = node.children.len();
                attach(node, &mut stack, &mut root);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EngineError::MalformedHierarchy(format!(
                    "XML error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(EngineError::MalformedHierarchy(
            "truncated dump: unclosed node elements".to_string(),
        ));
    }

    root.ok_or_else(|| EngineError::MalformedHierarchy("no node elements in dump".to_string()))
}

fn assign_path(node: &mut Node, parent: Option<&Node>) {
    let name = derived_name(node);
    match parent {
        Some(p) => node.path = format!("{}/{}[{}]", p.path, name, p.children.len()),
        None => node.path = format!("/{}[0]", name),
    }
}

fn attach(node: Node, stack: &mut Vec<Node>, root: &mut Option<Node>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            } else {
                log::debug!("ignoring extra top-level node '{}'", node.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node class="android.widget.FrameLayout" bounds="[0,0][1080,1920]">
    <node class="android.widget.LinearLayout" resource-id="com.android.settings:id/main" bounds="[0,0][1080,1920]" clickable="false">
      <node class="android.widget.TextView" text="WLAN" bounds="[48,300][400,380]" clickable="false"/>
      <node class="android.widget.Switch" resource-id="com.android.settings:id/switch_widget" bounds="[900,300][1060,380]" clickable="true" checkable="true" checked="false"/>
      <node class="android.widget.EditText" resource-id="com.android.settings:id/search" text="" bounds="[48,100][1032,200]" clickable="true"/>
    </node>
  </node>
</hierarchy>"#;

    fn flatten(root: &Node) -> Vec<&Node> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            let n = out[i];
            out.extend(n.children.iter());
            i += 1;
        }
        out
    }

    #[test]
    fn test_parse_builds_tree() {
        let root = parse(SETTINGS_DUMP).unwrap();
        assert_eq!(root.short_kind(), "FrameLayout");
        assert_eq!(root.depth, 0);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.child_count, 1);

        let layout = &root.children[0];
        assert_eq!(layout.children.len(), 3);
        assert_eq!(layout.depth, 1);

        let wlan = &layout.children[0];
        assert_eq!(wlan.text, "WLAN");
        assert_eq!(wlan.bounds.center(), (224, 340));
    }

    #[test]
    fn test_ids_are_document_order() {
        let root = parse(SETTINGS_DUMP).unwrap();
        let nodes = flatten(&root);
        let mut ids: Vec<usize> = nodes.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (0..nodes.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_path_derivation_prefers_resource_key() {
        let root = parse(SETTINGS_DUMP).unwrap();
        let layout = &root.children[0];
        assert_eq!(layout.path, "/FrameLayout[0]/main[0]");
        // text-derived name for the label, resource-key tail for the switch
        assert_eq!(layout.children[0].path, "/FrameLayout[0]/main[0]/WLAN[0]");
        assert_eq!(
            layout.children[1].path,
            "/FrameLayout[0]/main[0]/switch_widget[1]"
        );
    }

    #[test]
    fn test_sibling_paths_unique() {
        let xml = r#"<hierarchy><node class="a.b.L" bounds="[0,0][10,10]">
            <node class="a.b.TextView" text="Item" bounds="[0,0][5,5]"/>
            <node class="a.b.TextView" text="Item" bounds="[0,5][5,10]"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        assert_ne!(root.children[0].path, root.children[1].path);
    }

    #[test]
    fn test_empty_attrs_still_named() {
        let root = parse(r#"<hierarchy><node/></hierarchy>"#).unwrap();
        assert_eq!(root.kind, "node");
        assert!(!root.path.is_empty());
        assert!(root.bounds.is_zero());
        assert!(root.enabled);
    }

    #[test]
    fn test_edittext_implies_editable() {
        let root = parse(SETTINGS_DUMP).unwrap();
        let search = &root.children[0].children[2];
        assert_eq!(search.short_kind(), "EditText");
        assert!(search.editable);
    }

    #[test]
    fn test_entity_decoding() {
        let xml = r#"<hierarchy><node class="a.TextView" text="Devices &amp; Groups&#10;2 on" content-desc="&#x41;B" bounds="[0,0][10,10]"/></hierarchy>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.text, "Devices & Groups\n2 on");
        assert_eq!(root.accessibility_label, "AB");
    }

    #[test]
    fn test_structural_corruption_survives_repair_and_fails() {
        // escaping ampersands cannot fix a mismatched close tag
        let err = parse("<hierarchy><node class=\"a\"><node/></hierarchy>").unwrap_err();
        assert!(matches!(err, EngineError::MalformedHierarchy(_)));
    }

    #[test]
    fn test_raw_ampersand_in_text_attribute() {
        let xml = r#"<hierarchy><node class="a.TextView" text="M&Ms" bounds="[0,0][10,10]"/></hierarchy>"#;
        let root = parse(xml).unwrap();
        assert_eq!(root.text, "M&Ms");
    }

    #[test]
    fn test_unparseable_input_is_malformed() {
        assert!(matches!(
            parse("not xml at all"),
            Err(EngineError::MalformedHierarchy(_))
        ));
        assert!(matches!(
            parse("<hierarchy></hierarchy>"),
            Err(EngineError::MalformedHierarchy(_))
        ));
    }

    #[test]
    fn test_escape_bare_ampersands_leaves_entities_alone() {
        assert_eq!(
            escape_bare_ampersands("a & b &amp; c &#10; d"),
            "a &amp; b &amp; c &#10; d"
        );
    }

    #[test]
    fn test_malformed_bounds_do_not_abort_parse() {
        let xml = r#"<hierarchy><node class="a.View" bounds="[oops"/></hierarchy>"#;
        let root = parse(xml).unwrap();
        assert!(root.bounds.is_zero());
    }
}
