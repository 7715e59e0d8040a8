//! View-hierarchy snapshot model
//!
//! A hierarchy is a tree of accessibility nodes captured from the device.
//! Selector filters operate on flattened snapshots of this tree; matched
//! nodes are promoted to [`UiElement`]s with parsed bounds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single accessibility node.
///
/// Free-form attributes (`text`, `id`, `bounds`, `hintText`,
/// `accessibilityText`) live in the attribute map; interaction flags are
/// tri-state because not every platform reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    #[serde(default)]
    pub attributes: HashMap<String, String>,

    #[serde(default)]
    pub children: Vec<TreeNode>,

    #[serde(default)]
    pub clickable: Option<bool>,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub focused: Option<bool>,

    #[serde(default)]
    pub checked: Option<bool>,

    #[serde(default)]
    pub selected: Option<bool>,
}

impl TreeNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Parse the node's bounds from the `bounds` attribute (`x,y,width,height`).
    pub fn bounds(&self) -> Option<Bounds> {
        let raw = self.attr("bounds")?;
        let parts: Vec<i64> = raw
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<Vec<_>>>()?;
        if parts.len() != 4 {
            return None;
        }
        Some(Bounds {
            x: parts[0],
            y: parts[1],
            width: parts[2],
            height: parts[3],
        })
    }

    /// Pre-order traversal of this node's proper descendants.
    pub fn descendants(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        for child in &self.children {
            out.push(child);
            out.extend(child.descendants());
        }
        out
    }

    /// Whether `other` occurs among this node's proper descendants.
    pub fn has_descendant(&self, other: &TreeNode) -> bool {
        self.children
            .iter()
            .any(|c| c == other || c.has_descendant(other))
    }
}

/// Snapshot of the full screen tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ViewHierarchy {
    pub root: TreeNode,
}

impl ViewHierarchy {
    pub fn new(root: TreeNode) -> Self {
        Self { root }
    }

    /// All nodes in document (pre-order) order, root included.
    pub fn flatten(&self) -> Vec<TreeNode> {
        let mut out = vec![self.root.clone()];
        out.extend(self.root.descendants().into_iter().cloned());
        out
    }
}

/// Pixel-grid rectangle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Bounds {
    pub fn center(&self) -> (i64, i64) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Fraction of this rectangle that lies inside the screen grid, in 0..=1.
    pub fn visibility_percentage(&self, screen_width: i64, screen_height: i64) -> f64 {
        let area = self.width * self.height;
        if area <= 0 {
            return 0.0;
        }
        let left = self.x.max(0);
        let top = self.y.max(0);
        let right = (self.x + self.width).min(screen_width);
        let bottom = (self.y + self.height).min(screen_height);
        let visible_w = (right - left).max(0);
        let visible_h = (bottom - top).max(0);
        (visible_w * visible_h) as f64 / area as f64
    }
}

/// A matched element: the node plus its parsed bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct UiElement {
    pub node: TreeNode,
    pub bounds: Bounds,
}

impl UiElement {
    pub fn from_node(node: TreeNode) -> Self {
        let bounds = node.bounds().unwrap_or_default();
        Self { node, bounds }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_with_bounds(bounds: &str) -> TreeNode {
        TreeNode {
            attributes: HashMap::from([("bounds".to_string(), bounds.to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn test_bounds_parsing() {
        let node = node_with_bounds("10,20,100,50");
        assert_eq!(
            node.bounds(),
            Some(Bounds {
                x: 10,
                y: 20,
                width: 100,
                height: 50
            })
        );
        assert_eq!(node_with_bounds("10,20").bounds(), None);
        assert_eq!(node_with_bounds("a,b,c,d").bounds(), None);
    }

    #[test]
    fn test_visibility_percentage() {
        let fully = Bounds {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        };
        assert_eq!(fully.visibility_percentage(1080, 1920), 1.0);

        let half_off = Bounds {
            x: 0,
            y: 1870,
            width: 100,
            height: 100,
        };
        assert!((half_off.visibility_percentage(1080, 1920) - 0.5).abs() < 1e-9);

        let off_screen = Bounds {
            x: 0,
            y: 2000,
            width: 100,
            height: 100,
        };
        assert_eq!(off_screen.visibility_percentage(1080, 1920), 0.0);
    }

    #[test]
    fn test_descendant_lookup() {
        let leaf = TreeNode {
            attributes: HashMap::from([("text".to_string(), "leaf".to_string())]),
            ..Default::default()
        };
        let parent = TreeNode {
            children: vec![leaf.clone()],
            ..Default::default()
        };
        assert!(parent.has_descendant(&leaf));
        assert!(!leaf.has_descendant(&parent));
    }
}
