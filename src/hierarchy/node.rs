use regex::Regex;
use serde::Serialize;

/// Axis-aligned element rectangle in screen pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    /// Get the center point of the bounds
    pub fn center(&self) -> (i32, i32) {
        let x = (self.left + self.right) / 2;
        let y = (self.top + self.bottom) / 2;
        (x, y)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_zero(&self) -> bool {
        *self == Bounds::default()
    }

    /// Parse bounds from the dump notation "[x1,y1][x2,y2]".
    ///
    /// Anything that does not match the notation, or that describes a
    /// negative or crossed rectangle, yields the zero rectangle. Malformed
    /// geometry must never abort a capture.
    pub fn parse(s: &str) -> Bounds {
        let re = Regex::new(r"^\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]$").unwrap();
        let caps = match re.captures(s.trim()) {
            Some(c) => c,
            None => return Bounds::default(),
        };

        let coord = |i: usize| caps[i].parse::<i32>().ok();
        match (coord(1), coord(2), coord(3), coord(4)) {
            (Some(left), Some(top), Some(right), Some(bottom))
                if left >= 0 && top >= 0 && right >= left && bottom >= top =>
            {
                Bounds {
                    left,
                    top,
                    right,
                    bottom,
                }
            }
            _ => Bounds::default(),
        }
    }
}

/// One element of a captured UI hierarchy.
///
/// A `Node` exclusively owns its subtree; no parent back-references are
/// stored. `id` is assigned in document order at parse time and doubles as
/// the node's slot in the capture's [`Index`](super::Index).
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub id: usize,
    /// Element class, e.g. "android.widget.TextView"
    pub kind: String,
    pub resource_key: String,
    pub text: String,
    pub accessibility_label: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub long_clickable: bool,
    pub checkable: bool,
    pub checked: bool,
    pub scrollable: bool,
    pub editable: bool,
    pub visible: bool,
    pub enabled: bool,
    pub focused: bool,
    /// Structural path from root, ordinal-indexed. Stable only within one
    /// capture.
    pub path: String,
    pub depth: usize,
    pub child_count: usize,
    pub children: Vec<Node>,
}

impl Node {
    /// Class name without its package prefix ("TextView" for
    /// "android.widget.TextView").
    pub fn short_kind(&self) -> &str {
        self.kind.rsplit('.').next().unwrap_or(&self.kind)
    }

    /// Whether the element supports at least one interaction.
    pub fn is_interactive(&self) -> bool {
        self.clickable || self.long_clickable || self.checkable || self.scrollable || self.editable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_bounds() {
        let b = Bounds::parse("[0,96][1080,1920]");
        assert_eq!(
            b,
            Bounds {
                left: 0,
                top: 96,
                right: 1080,
                bottom: 1920
            }
        );
        assert_eq!(b.center(), (540, 1008));
        assert_eq!(b.width(), 1080);
        assert_eq!(b.height(), 1824);
    }

    #[test]
    fn test_malformed_bounds_coerce_to_zero() {
        assert!(Bounds::parse("").is_zero());
        assert!(Bounds::parse("garbage").is_zero());
        assert!(Bounds::parse("[0,0][100]").is_zero());
        // crossed rectangle
        assert!(Bounds::parse("[100,100][50,200]").is_zero());
        // negative coordinates
        assert!(Bounds::parse("[-10,0][100,200]").is_zero());
    }

    #[test]
    fn test_short_kind() {
        let node = Node {
            kind: "android.widget.Switch".into(),
            ..Default::default()
        };
        assert_eq!(node.short_kind(), "Switch");

        let bare = Node {
            kind: "node".into(),
            ..Default::default()
        };
        assert_eq!(bare.short_kind(), "node");
    }

    #[test]
    fn test_is_interactive() {
        let mut node = Node::default();
        assert!(!node.is_interactive());
        node.scrollable = true;
        assert!(node.is_interactive());
    }
}
