//! Symbolic target resolution over one captured snapshot.
//!
//! The resolver never scrolls and never touches the device; scroll-assisted
//! retry is the dispatcher's job. This keeps resolution pure and testable
//! without live hardware.

use crate::hierarchy::{Index, Node};

/// How many ancestor levels promotion will climb looking for a clickable
/// container.
const MAX_PROMOTION_LEVELS: usize = 5;

/// Which mapping(s) a query is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Layered: exact text / resource key / accessibility label, then fuzzy.
    Auto,
    Text,
    ResourceKey,
    AccessibilityLabel,
    Kind,
}

/// How the returned node was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Direct,
    Fuzzy,
}

/// A successful resolution. A miss is simply `None`: not finding an element
/// is an expected outcome, not an error.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub node: &'a Node,
    pub matched: MatchKind,
    /// True when a non-clickable match was substituted with its nearest
    /// clickable ancestor.
    pub promoted: bool,
}

/// Resolve a query string to a concrete, preferably interactable node.
///
/// First match wins throughout; duplicated labels are not reported as
/// ambiguous. Document order makes the outcome deterministic.
pub fn resolve<'a>(query: &str, strategy: Strategy, index: &Index<'a>) -> Option<Resolution<'a>> {
    let hit = match strategy {
        Strategy::Auto => resolve_auto(query, index),
        Strategy::Text => {
            field_exact(query, index, |n| n.text.as_str()).or_else(|| field_fuzzy(query, index, |n| n.text.as_str()))
        }
        Strategy::ResourceKey => resource_key_exact(query, index)
            .or_else(|| field_fuzzy(query, index, |n| n.resource_key.as_str())),
        Strategy::AccessibilityLabel => field_exact(query, index, |n| n.accessibility_label.as_str())
            .or_else(|| field_fuzzy(query, index, |n| n.accessibility_label.as_str())),
        Strategy::Kind => kind_match(query, index),
    };

    hit.map(|(slot, matched)| promote(slot, matched, index))
}

fn resolve_auto(query: &str, index: &Index) -> Option<(usize, MatchKind)> {
    // Stage 1: exact, text before resource key before accessibility label
    if let Some(hit) = field_exact(query, index, |n| n.text.as_str()) {
        return Some(hit);
    }
    if let Some(hit) = resource_key_exact(query, index) {
        return Some(hit);
    }
    if let Some(hit) = field_exact(query, index, |n| n.accessibility_label.as_str()) {
        return Some(hit);
    }

    // Stage 2: case-insensitive containment, same field order
    field_fuzzy(query, index, |n| n.text.as_str())
        .or_else(|| field_fuzzy(query, index, |n| n.resource_key.as_str()))
        .or_else(|| field_fuzzy(query, index, |n| n.accessibility_label.as_str()))
}

/// First document-order slot satisfying the predicate.
fn position_by(index: &Index, pred: impl Fn(&Node) -> bool) -> Option<usize> {
    index.nodes.iter().position(|n| pred(n))
}

fn field_exact(
    query: &str,
    index: &Index,
    field: impl Fn(&Node) -> &str,
) -> Option<(usize, MatchKind)> {
    position_by(index, |n| !field(n).is_empty() && field(n) == query)
        .map(|slot| (slot, MatchKind::Direct))
}

/// Exact resource-key match, or a bare key against the `pkg:id/key` tail.
fn resource_key_exact(query: &str, index: &Index) -> Option<(usize, MatchKind)> {
    let tail = format!("/{}", query);
    position_by(index, |n| {
        !n.resource_key.is_empty() && (n.resource_key == query || n.resource_key.ends_with(&tail))
    })
    .map(|slot| (slot, MatchKind::Direct))
}

fn field_fuzzy(
    query: &str,
    index: &Index,
    field: impl Fn(&Node) -> &str,
) -> Option<(usize, MatchKind)> {
    let needle = query.to_lowercase();
    position_by(index, |n| {
        !field(n).is_empty() && field(n).to_lowercase().contains(&needle)
    })
    .map(|slot| (slot, MatchKind::Fuzzy))
}

fn kind_match(query: &str, index: &Index) -> Option<(usize, MatchKind)> {
    if let Some(slots) = index.by_kind.get(query) {
        return slots.first().map(|&slot| (slot, MatchKind::Direct));
    }
    field_fuzzy(query, index, |n| n.kind.as_str())
}

/// Walk up the owning chain looking for the nearest clickable ancestor so
/// the dispatcher always clicks an interactable target rather than a label.
/// If none is found within the bound, the original match is kept.
fn promote<'a>(slot: usize, matched: MatchKind, index: &Index<'a>) -> Resolution<'a> {
    let node = index.node(slot);
    if node.clickable {
        return Resolution {
            node,
            matched,
            promoted: false,
        };
    }

    let mut current = slot;
    for _ in 0..MAX_PROMOTION_LEVELS {
        match index.parent_of(current) {
            Some(parent) => {
                current = parent;
                if index.node(current).clickable {
                    return Resolution {
                        node: index.node(current),
                        matched,
                        promoted: true,
                    };
                }
            }
            None => break,
        }
    }

    Resolution {
        node,
        matched,
        promoted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::parse;

    fn resolve_one<'a>(query: &str, index: &Index<'a>) -> Resolution<'a> {
        resolve(query, Strategy::Auto, index).expect("expected a match")
    }

    #[test]
    fn test_text_precedes_resource_key() {
        // one node with text="WLAN", another with resourceKey ending /WLAN
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="a.View" resource-id="com.android.settings:id/WLAN" bounds="[0,0][50,50]" clickable="true"/>
            <node class="a.TextView" text="WLAN" bounds="[0,50][50,100]" clickable="true"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve_one("WLAN", &index);
        assert_eq!(res.node.text, "WLAN");
        assert_eq!(res.matched, MatchKind::Direct);
    }

    #[test]
    fn test_bare_resource_key_matches_tail() {
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="a.Switch" resource-id="com.android.settings:id/switch_widget" bounds="[0,0][50,50]" clickable="true"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve_one("switch_widget", &index);
        assert_eq!(res.node.short_kind(), "Switch");
    }

    #[test]
    fn test_fuzzy_containment_is_case_insensitive() {
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="a.TextView" text="Wi-Fi preferences" bounds="[0,0][50,50]" clickable="true"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve_one("wi-fi", &index);
        assert_eq!(res.matched, MatchKind::Fuzzy);
        assert_eq!(res.node.text, "Wi-Fi preferences");
    }

    #[test]
    fn test_ancestor_promotion_three_levels() {
        let xml = r#"<hierarchy><node class="a.Frame" bounds="[0,0][1080,1920]">
            <node class="a.Row" bounds="[0,0][1080,200]" clickable="true">
              <node class="a.L1" bounds="[0,0][1080,200]">
                <node class="a.L2" bounds="[0,0][540,200]">
                  <node class="a.TextView" text="Wi-Fi" bounds="[0,0][300,200]"/>
                </node>
              </node>
            </node>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve_one("Wi-Fi", &index);
        assert!(res.promoted);
        assert!(res.node.clickable);
        assert_eq!(res.node.short_kind(), "Row");
    }

    #[test]
    fn test_promotion_bounded_at_five_levels() {
        // clickable ancestor is six levels up, so the leaf is returned as-is
        let xml = r#"<hierarchy><node class="a.Top" bounds="[0,0][10,10]" clickable="true">
            <node class="a.D1" bounds="[0,0][10,10]"><node class="a.D2" bounds="[0,0][10,10]">
            <node class="a.D3" bounds="[0,0][10,10]"><node class="a.D4" bounds="[0,0][10,10]">
            <node class="a.D5" bounds="[0,0][10,10]">
              <node class="a.TextView" text="Deep" bounds="[0,0][10,10]"/>
            </node></node></node></node></node>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve_one("Deep", &index);
        assert!(!res.promoted);
        assert_eq!(res.node.text, "Deep");
    }

    #[test]
    fn test_not_found() {
        let root =
            parse(r#"<hierarchy><node class="a.View" bounds="[0,0][10,10]"/></hierarchy>"#).unwrap();
        let index = Index::build(&root);
        assert!(resolve("Nothing here", Strategy::Auto, &index).is_none());
    }

    #[test]
    fn test_first_match_wins_for_duplicates() {
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="a.Button" text="OK" bounds="[0,0][50,50]" clickable="true"/>
            <node class="a.Button" text="OK" bounds="[0,50][50,100]" clickable="true"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve_one("OK", &index);
        assert_eq!(res.node.bounds.center(), (25, 25));
    }

    #[test]
    fn test_kind_strategy() {
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="android.widget.EditText" bounds="[0,0][50,50]" clickable="true"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        let res = resolve("EditText", Strategy::Kind, &index).unwrap();
        assert_eq!(res.node.short_kind(), "EditText");
    }

    #[test]
    fn test_explicit_strategy_ignores_other_fields() {
        let xml = r#"<hierarchy><node class="a.L" bounds="[0,0][100,100]">
            <node class="a.TextView" text="Bluetooth" bounds="[0,0][50,50]" clickable="true"/>
        </node></hierarchy>"#;
        let root = parse(xml).unwrap();
        let index = Index::build(&root);

        assert!(resolve("Bluetooth", Strategy::ResourceKey, &index).is_none());
        assert!(resolve("Bluetooth", Strategy::Text, &index).is_some());
    }
}
