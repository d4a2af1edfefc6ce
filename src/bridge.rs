//! Wire codecs for linked lists and binary trees.
//!
//! Test cases carry lists as value arrays and trees as level-order arrays
//! with null gaps. Candidate code receives real node objects built by the
//! sandbox prelude; this module is the Rust mirror of that encoding, used
//! to canonicalize expected outputs before comparison.

use std::collections::VecDeque;

use serde_json::Value;
use thiserror::Error;

use crate::problem::ParamType;

/// Node cap for both directions of the codec (cycle and memory guard)
pub const MAX_NODES: usize = 10_000;

#[derive(Debug, Error, PartialEq)]
pub enum BridgeError {
    #[error("linked list exceeds {} nodes", MAX_NODES)]
    ListTooLong,
    #[error("binary tree exceeds {} nodes", MAX_NODES)]
    TreeTooLarge,
    #[error("expected an array encoding for {0}")]
    NotAnArray(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListNode {
    pub val: Value,
    pub next: Option<Box<ListNode>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub val: Value,
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
}

/// Build a linked list from its wire array. Empty input is the empty list.
pub fn list_from_wire(values: &[Value]) -> Result<Option<Box<ListNode>>, BridgeError> {
    if values.len() > MAX_NODES {
        return Err(BridgeError::ListTooLong);
    }
    let mut head = None;
    for value in values.iter().rev() {
        head = Some(Box::new(ListNode {
            val: value.clone(),
            next: head,
        }));
    }
    Ok(head)
}

/// Walk a list back into its wire array.
pub fn list_to_wire(mut node: Option<&ListNode>) -> Result<Vec<Value>, BridgeError> {
    let mut out = Vec::new();
    while let Some(n) = node {
        if out.len() >= MAX_NODES {
            return Err(BridgeError::ListTooLong);
        }
        out.push(n.val.clone());
        node = n.next.as_deref();
    }
    Ok(out)
}

/// Build a binary tree from its level-order wire array. A null (or absent)
/// entry is a missing child; entries after the array is exhausted are
/// simply absent children. Junk past the last reachable slot is ignored.
pub fn tree_from_wire(values: &[Value]) -> Result<Option<Box<TreeNode>>, BridgeError> {
    if values.is_empty() || values[0].is_null() {
        return Ok(None);
    }

    // Arena of (val, left, right) with child indices, linked level by level.
    let mut nodes: Vec<(Value, Option<usize>, Option<usize>)> =
        vec![(values[0].clone(), None, None)];
    let mut queue = VecDeque::from([0usize]);
    let mut i = 1;

    while i < values.len() {
        let Some(parent) = queue.pop_front() else {
            break;
        };
        for child in 0..2 {
            if i >= values.len() {
                break;
            }
            let value = &values[i];
            i += 1;
            if value.is_null() {
                continue;
            }
            if nodes.len() >= MAX_NODES {
                return Err(BridgeError::TreeTooLarge);
            }
            nodes.push((value.clone(), None, None));
            let idx = nodes.len() - 1;
            if child == 0 {
                nodes[parent].1 = Some(idx);
            } else {
                nodes[parent].2 = Some(idx);
            }
            queue.push_back(idx);
        }
    }

    Ok(Some(materialize(&nodes, 0)))
}

fn materialize(nodes: &[(Value, Option<usize>, Option<usize>)], idx: usize) -> Box<TreeNode> {
    Box::new(TreeNode {
        val: nodes[idx].0.clone(),
        left: nodes[idx].1.map(|i| materialize(nodes, i)),
        right: nodes[idx].2.map(|i| materialize(nodes, i)),
    })
}

/// Walk a tree back into its level-order wire array, trailing nulls
/// stripped so the encoding is canonical.
pub fn tree_to_wire(root: Option<&TreeNode>) -> Result<Vec<Value>, BridgeError> {
    let Some(root) = root else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    let mut seen = 0usize;
    let mut queue: VecDeque<Option<&TreeNode>> = VecDeque::from([Some(root)]);

    while let Some(slot) = queue.pop_front() {
        match slot {
            None => out.push(Value::Null),
            Some(node) => {
                seen += 1;
                if seen > MAX_NODES {
                    return Err(BridgeError::TreeTooLarge);
                }
                out.push(node.val.clone());
                queue.push_back(node.left.as_deref());
                queue.push_back(node.right.as_deref());
            }
        }
    }

    while out.last().is_some_and(|v| v.is_null()) {
        out.pop();
    }
    Ok(out)
}

/// Canonicalize a wire value according to its declared type.
///
/// Node encodings round-trip through the codec, so a tree written with
/// redundant trailing nulls compares equal to the canonical form the
/// sandbox produces. Null stands in for the empty structure. Plain values
/// come back unchanged.
pub fn normalize_wire(value: &Value, ty: &ParamType) -> Result<Value, BridgeError> {
    match ty {
        ParamType::ListNode => {
            let head = list_from_wire(as_wire_array(value, "ListNode")?)?;
            Ok(Value::Array(list_to_wire(head.as_deref())?))
        }
        ParamType::TreeNode => {
            let root = tree_from_wire(as_wire_array(value, "TreeNode")?)?;
            Ok(Value::Array(tree_to_wire(root.as_deref())?))
        }
        _ => Ok(value.clone()),
    }
}

fn as_wire_array<'a>(value: &'a Value, ty: &'static str) -> Result<&'a [Value], BridgeError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(&[]),
        _ => Err(BridgeError::NotAnArray(ty)),
    }
}
