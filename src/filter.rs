//! Compiles an [`ElementSelector`] into a composite predicate over
//! view-hierarchy nodes plus a human-readable description.
//!
//! Every present constraint contributes one filter and one description
//! fragment; filters are AND-combined by intersecting their results over
//! the flattened hierarchy. The final choice applies the `index` selector
//! in document order, or prefers the first clickable candidate.

use regex::{Regex, RegexBuilder};

use crate::commands::{ElementSelector, ElementTrait};
use crate::driver::hierarchy::{TreeNode, ViewHierarchy};
use crate::errors::{OrchestraError, OrchestraResult};

type Filter = Box<dyn Fn(&[TreeNode]) -> Vec<TreeNode> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Position {
    Below,
    Above,
    LeftOf,
    RightOf,
}

impl Position {
    fn label(&self) -> &'static str {
        match self {
            Position::Below => "below",
            Position::Above => "above",
            Position::LeftOf => "left of",
            Position::RightOf => "right of",
        }
    }
}

/// A selector compiled into executable form.
pub struct CompiledSelector {
    descriptions: Vec<String>,
    filters: Vec<Filter>,
    index: Option<i32>,
}

impl CompiledSelector {
    /// Description fragments joined in the order the constraints were added.
    pub fn description(&self) -> String {
        if self.descriptions.is_empty() {
            "any element".to_string()
        } else {
            self.descriptions.join(", ")
        }
    }

    /// Run the filter chain over a hierarchy snapshot.
    pub fn match_in(&self, hierarchy: &ViewHierarchy) -> Option<TreeNode> {
        let nodes = hierarchy.flatten();
        let candidates = self.candidates(&nodes);
        match self.index {
            Some(i) if i >= 0 => candidates.into_iter().nth(i as usize),
            Some(_) => None,
            None => candidates
                .iter()
                .find(|n| n.clickable == Some(true))
                .cloned()
                .or_else(|| candidates.into_iter().next()),
        }
    }

    /// Matching nodes in document order, before index selection.
    fn candidates(&self, nodes: &[TreeNode]) -> Vec<TreeNode> {
        if self.filters.is_empty() {
            return nodes.to_vec();
        }
        let mut result: Option<Vec<TreeNode>> = None;
        for filter in &self.filters {
            let matched = filter(nodes);
            result = Some(match result {
                None => matched,
                Some(prev) => prev.into_iter().filter(|n| matched.contains(n)).collect(),
            });
        }
        result.unwrap_or_default()
    }
}

/// Compile a selector into `(description, filter)` form.
pub fn compile(selector: &ElementSelector) -> OrchestraResult<CompiledSelector> {
    let mut descriptions = Vec::new();
    let mut filters: Vec<Filter> = Vec::new();

    if let Some(pattern) = &selector.text_regex {
        let re = compile_regex(pattern)?;
        descriptions.push(format!("text matching regex: {}", pattern));
        filters.push(Box::new(move |nodes| {
            deepest_matching(matching_attr(nodes, "text", &re))
        }));
    }

    if let Some(pattern) = &selector.id_regex {
        let re = compile_regex(pattern)?;
        descriptions.push(format!("id matching regex: {}", pattern));
        filters.push(Box::new(move |nodes| {
            deepest_matching(matching_attr(nodes, "id", &re))
        }));
    }

    if let Some(spec) = &selector.size {
        let (width, height) = (spec.width, spec.height);
        let tolerance = spec.tolerance.unwrap_or(0);
        descriptions.push(format!("size: {}x{}(±{})", width, height, tolerance));
        filters.push(Box::new(move |nodes| {
            nodes
                .iter()
                .filter(|n| match n.bounds() {
                    Some(b) => {
                        (b.width - width).abs() <= tolerance
                            && (b.height - height).abs() <= tolerance
                    }
                    None => false,
                })
                .cloned()
                .collect()
        }));
    }

    let positional = [
        (&selector.below, Position::Below),
        (&selector.above, Position::Above),
        (&selector.left_of, Position::LeftOf),
        (&selector.right_of, Position::RightOf),
    ];
    for (sub, position) in positional {
        if let Some(sub) = sub {
            let anchor = compile(sub)?;
            descriptions.push(format!("{}: ({})", position.label(), anchor.description()));
            filters.push(positional_filter(anchor, position));
        }
    }

    if let Some(child) = &selector.contains_child {
        let sub = compile(child)?;
        descriptions.push(format!("contains child: ({})", sub.description()));
        filters.push(Box::new(move |nodes| {
            nodes
                .iter()
                .filter(|n| !sub.candidates(&n.children).is_empty())
                .cloned()
                .collect()
        }));
    }

    if let Some(descendants) = &selector.contains_descendants {
        let subs = descendants
            .iter()
            .map(compile)
            .collect::<OrchestraResult<Vec<_>>>()?;
        let joined = subs
            .iter()
            .map(|s| format!("({})", s.description()))
            .collect::<Vec<_>>()
            .join("; ");
        descriptions.push(format!("contains descendants: [{}]", joined));
        filters.push(Box::new(move |nodes| {
            nodes
                .iter()
                .filter(|n| {
                    let descendants: Vec<TreeNode> =
                        n.descendants().into_iter().cloned().collect();
                    subs.iter().all(|s| !s.candidates(&descendants).is_empty())
                })
                .cloned()
                .collect()
        }));
    }

    if let Some(traits) = &selector.traits {
        for element_trait in traits.clone() {
            descriptions.push(format!("trait: {:?}", element_trait));
            filters.push(trait_filter(element_trait));
        }
    }

    let attribute_flags: [(&str, Option<bool>, fn(&TreeNode) -> Option<bool>); 4] = [
        ("enabled", selector.enabled, |n| n.enabled),
        ("selected", selector.selected, |n| n.selected),
        ("checked", selector.checked, |n| n.checked),
        ("focused", selector.focused, |n| n.focused),
    ];
    for (name, expected, accessor) in attribute_flags {
        if let Some(expected) = expected {
            descriptions.push(format!("{}: {}", name, expected));
            filters.push(Box::new(move |nodes| {
                nodes
                    .iter()
                    .filter(|n| accessor(n) == Some(expected))
                    .cloned()
                    .collect()
            }));
        }
    }

    if let Some(index) = selector.index {
        descriptions.push(format!("index: {}", index));
    }

    Ok(CompiledSelector {
        descriptions,
        filters,
        index: selector.index,
    })
}

/// Regex options applied to every textRegex/idRegex: case-insensitive,
/// dot-matches-newline, multiline.
pub fn compile_regex(pattern: &str) -> OrchestraResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .multi_line(true)
        .build()
        .map_err(|e| OrchestraError::InvalidCommand {
            reason: format!("invalid regex \"{}\": {}", pattern, e),
        })
}

fn matching_attr(nodes: &[TreeNode], key: &str, re: &Regex) -> Vec<TreeNode> {
    nodes
        .iter()
        .filter(|n| n.attr(key).map(|v| re.is_match(v)).unwrap_or(false))
        .cloned()
        .collect()
}

/// Keep only nodes without a matching proper descendant.
fn deepest_matching(matches: Vec<TreeNode>) -> Vec<TreeNode> {
    matches
        .iter()
        .filter(|n| !matches.iter().any(|m| *n != m && n.has_descendant(m)))
        .cloned()
        .collect()
}

fn positional_filter(anchor: CompiledSelector, position: Position) -> Filter {
    Box::new(move |nodes| {
        let anchors = anchor.candidates(nodes);
        let Some(anchor_node) = anchors.first() else {
            return Vec::new();
        };
        let Some(anchor_bounds) = anchor_node.bounds() else {
            return Vec::new();
        };
        let (acx, acy) = anchor_bounds.center();

        let mut matched: Vec<(i64, TreeNode)> = nodes
            .iter()
            .filter(|n| *n != anchor_node)
            .filter_map(|n| {
                let (cx, cy) = n.bounds()?.center();
                let keep = match position {
                    Position::Below => cy > acy,
                    Position::Above => cy < acy,
                    Position::LeftOf => cx < acx,
                    Position::RightOf => cx > acx,
                };
                if keep {
                    let distance = (cx - acx).pow(2) + (cy - acy).pow(2);
                    Some((distance, n.clone()))
                } else {
                    None
                }
            })
            .collect();
        matched.sort_by_key(|(distance, _)| *distance);
        matched.into_iter().map(|(_, n)| n).collect()
    })
}

fn trait_filter(element_trait: ElementTrait) -> Filter {
    match element_trait {
        ElementTrait::Text => Box::new(|nodes| {
            nodes
                .iter()
                .filter(|n| n.attr("text").map(|t| !t.is_empty()).unwrap_or(false))
                .cloned()
                .collect()
        }),
        ElementTrait::Square => Box::new(|nodes| {
            nodes
                .iter()
                .filter(|n| match n.bounds() {
                    Some(b) if b.width > 0 && b.height > 0 => {
                        let ratio = b.width as f64 / b.height as f64;
                        (0.9..=1.1).contains(&ratio)
                    }
                    _ => false,
                })
                .cloned()
                .collect()
        }),
        ElementTrait::LongText => Box::new(|nodes| {
            nodes
                .iter()
                .filter(|n| n.attr("text").map(|t| t.len() > 200).unwrap_or(false))
                .cloned()
                .collect()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn node(text: &str, bounds: &str) -> TreeNode {
        TreeNode {
            attributes: HashMap::from([
                ("text".to_string(), text.to_string()),
                ("bounds".to_string(), bounds.to_string()),
            ]),
            ..Default::default()
        }
    }

    fn screen(children: Vec<TreeNode>) -> ViewHierarchy {
        ViewHierarchy::new(TreeNode {
            children,
            ..Default::default()
        })
    }

    #[test]
    fn test_text_regex_is_case_insensitive() {
        let hierarchy = screen(vec![node("LOGIN", "0,0,100,40")]);
        let compiled = compile(&ElementSelector::text("login")).unwrap();
        assert!(compiled.match_in(&hierarchy).is_some());
    }

    #[test]
    fn test_text_regex_dot_matches_newline() {
        let hierarchy = screen(vec![node("first\nsecond", "0,0,100,40")]);
        let compiled = compile(&ElementSelector::text("first.second")).unwrap();
        assert!(compiled.match_in(&hierarchy).is_some());

        let anchored = compile(&ElementSelector::text("^second$")).unwrap();
        assert!(anchored.match_in(&hierarchy).is_some());
    }

    #[test]
    fn test_deepest_matching_element_wins() {
        let child = node("Login", "10,10,80,20");
        let mut parent = node("Login", "0,0,100,40");
        parent.children = vec![child.clone()];
        let hierarchy = screen(vec![parent]);

        let compiled = compile(&ElementSelector::text("Login")).unwrap();
        assert_eq!(compiled.match_in(&hierarchy), Some(child));
    }

    #[test]
    fn test_index_selection_in_document_order() {
        let first = node("item", "0,0,100,20");
        let second = node("item", "0,30,100,20");
        let hierarchy = screen(vec![first.clone(), second.clone()]);

        let mut selector = ElementSelector::text("item");
        selector.index = Some(1);
        let compiled = compile(&selector).unwrap();
        assert_eq!(compiled.match_in(&hierarchy), Some(second));

        selector.index = Some(5);
        assert_eq!(compile(&selector).unwrap().match_in(&hierarchy), None);
    }

    #[test]
    fn test_clickable_candidate_preferred() {
        let label = node("Save", "0,0,100,20");
        let mut button = node("Save", "0,30,100,20");
        button.clickable = Some(true);
        let hierarchy = screen(vec![label, button.clone()]);

        let compiled = compile(&ElementSelector::text("Save")).unwrap();
        assert_eq!(compiled.match_in(&hierarchy), Some(button));
    }

    #[test]
    fn test_below_filter_excludes_elements_on_the_wrong_side() {
        let anchor = node("Username", "0,100,100,20");
        let near = node("field", "0,130,100,20");
        let far = node("field", "0,400,100,20");
        let above = node("field", "0,10,100,20");
        let hierarchy = screen(vec![anchor, far, near.clone(), above]);

        // Combined with textRegex, index selection follows document order.
        let mut selector = ElementSelector {
            text_regex: Some("field".to_string()),
            below: Some(Box::new(ElementSelector::text("Username"))),
            ..Default::default()
        };
        selector.index = Some(1);
        assert_eq!(compile(&selector).unwrap().match_in(&hierarchy), Some(near.clone()));
        selector.index = Some(2);
        assert_eq!(compile(&selector).unwrap().match_in(&hierarchy), None);
    }

    #[test]
    fn test_positional_only_selector_prefers_nearest() {
        let anchor = node("Username", "0,100,100,20");
        let near = node("near", "0,130,100,20");
        let far = node("far", "0,400,100,20");
        let hierarchy = screen(vec![anchor, far, near.clone()]);

        let selector = ElementSelector {
            below: Some(Box::new(ElementSelector::text("Username"))),
            ..Default::default()
        };
        assert_eq!(compile(&selector).unwrap().match_in(&hierarchy), Some(near));
    }

    #[test]
    fn test_contains_child() {
        let child = node("price", "0,0,40,20");
        let mut row = node("", "0,0,200,40");
        row.children = vec![child];
        let bare = node("", "0,50,200,40");
        let hierarchy = screen(vec![row.clone(), bare]);

        let selector = ElementSelector {
            contains_child: Some(Box::new(ElementSelector::text("price"))),
            ..Default::default()
        };
        let compiled = compile(&selector).unwrap();
        assert_eq!(compiled.match_in(&hierarchy), Some(row));
    }

    #[test]
    fn test_size_filter_with_tolerance() {
        let target = node("", "0,0,102,50");
        let hierarchy = screen(vec![node("", "0,0,300,50"), target.clone()]);

        let selector = ElementSelector {
            size: Some(crate::commands::SizeSpec {
                width: 100,
                height: 50,
                tolerance: Some(5),
            }),
            ..Default::default()
        };
        let compiled = compile(&selector).unwrap();
        assert_eq!(compiled.match_in(&hierarchy), Some(target));
    }

    #[test]
    fn test_attribute_flag_filter_is_strict() {
        let mut enabled = node("go", "0,0,10,10");
        enabled.enabled = Some(true);
        let unreported = node("go", "0,20,10,10");
        let hierarchy = screen(vec![unreported, enabled.clone()]);

        let selector = ElementSelector {
            text_regex: Some("go".to_string()),
            enabled: Some(true),
            ..Default::default()
        };
        assert_eq!(compile(&selector).unwrap().match_in(&hierarchy), Some(enabled));
    }

    #[test]
    fn test_description_accumulates_in_order() {
        let selector = ElementSelector {
            text_regex: Some("Login".to_string()),
            enabled: Some(true),
            index: Some(2),
            ..Default::default()
        };
        let compiled = compile(&selector).unwrap();
        assert_eq!(
            compiled.description(),
            "text matching regex: Login, enabled: true, index: 2"
        );
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        assert!(compile(&ElementSelector::text("a(")).is_err());
    }
}
