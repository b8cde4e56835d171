//! Approximate sorting of an unbounded stream in bounded memory.
//!
//! [`Sort`] keeps a window of recent messages in a [`SortWindow`] and, once
//! the window is full, emits its smallest message for every message that
//! arrives. Messages displaced by more than the window size relative to
//! their neighbours can still come out of order; a larger window trades
//! memory for accuracy.
//!
//! The window is a plain binary search tree with cached pointers to its
//! smallest and largest nodes. It is not rebalanced, so already sorted or
//! reverse sorted input degrades insertion to linear time in the window
//! size.

use crate::channel::{ErrorOutlet, Inlet, Outlet};
use crate::config::SortConfig;
use crate::error::{PipelineError, Result};
use crate::message::Message;
use crate::stage::Transformer;
use std::cmp::Ordering;

type NodeId = usize;

#[derive(Debug)]
struct Node<T> {
    value: Option<T>,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
}

/// Unbalanced BST with O(1) access to both extremes.
///
/// Nodes live in an arena and refer to each other by index; freed slots are
/// reused. Equal values are kept in insertion order.
#[derive(Debug)]
pub struct SortWindow<T, F> {
    nodes: Vec<Node<T>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    leftmost: Option<NodeId>,
    rightmost: Option<NodeId>,
    len: usize,
    compare: F,
}

impl<T, F> SortWindow<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    pub fn new(compare: F) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leftmost: None,
            rightmost: None,
            len: 0,
            compare,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T> {
        &mut self.nodes[id]
    }

    fn alloc(&mut self, value: T, parent: Option<NodeId>) -> NodeId {
        let node = Node {
            value: Some(value),
            left: None,
            right: None,
            parent,
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn value(&self, id: NodeId) -> Option<&T> {
        self.node(id).value.as_ref()
    }

    pub fn insert(&mut self, value: T) {
        let Some(mut cur) = self.root else {
            let id = self.alloc(value, None);
            self.root = Some(id);
            self.leftmost = Some(id);
            self.rightmost = Some(id);
            self.len = 1;
            return;
        };

        loop {
            let goes_left = self
                .value(cur)
                .is_some_and(|existing| (self.compare)(&value, existing) == Ordering::Less);
            let next = if goes_left {
                self.node(cur).left
            } else {
                self.node(cur).right
            };
            match next {
                Some(child) => cur = child,
                None => {
                    let id = self.alloc(value, Some(cur));
                    if goes_left {
                        self.node_mut(cur).left = Some(id);
                        if self.leftmost == Some(cur) {
                            self.leftmost = Some(id);
                        }
                    } else {
                        self.node_mut(cur).right = Some(id);
                        if self.rightmost == Some(cur) {
                            self.rightmost = Some(id);
                        }
                    }
                    self.len += 1;
                    return;
                }
            }
        }
    }

    pub fn min(&self) -> Option<&T> {
        self.leftmost.and_then(|id| self.value(id))
    }

    pub fn max(&self) -> Option<&T> {
        self.rightmost.and_then(|id| self.value(id))
    }

    fn leftmost_from(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.node(id).left {
            id = left;
        }
        id
    }

    /// Remove and return the smallest value
    pub fn pop_min(&mut self) -> Option<T> {
        let id = self.leftmost?;
        let (parent, right) = {
            let node = self.node(id);
            (node.parent, node.right)
        };

        // the leftmost node has no left child, so its right subtree takes its place
        match parent {
            Some(p) => self.node_mut(p).left = right,
            None => self.root = right,
        }
        if let Some(r) = right {
            self.node_mut(r).parent = parent;
        }

        self.leftmost = match (right, parent) {
            (Some(r), _) => Some(self.leftmost_from(r)),
            (None, p) => p,
        };
        if self.rightmost == Some(id) {
            self.rightmost = parent;
        }

        self.len -= 1;
        self.free.push(id);
        let node = self.node_mut(id);
        node.left = None;
        node.right = None;
        node.parent = None;
        node.value.take()
    }
}

type CompareFn = dyn Fn(&Message, &Message) -> Ordering + Send + Sync;

/// Bounded-window sorting stage
pub struct Sort {
    window: usize,
    compare: Box<CompareFn>,
}

impl Sort {
    /// Sort within a window of `window` messages
    pub fn new<F>(window: usize, compare: F) -> Result<Self>
    where
        F: Fn(&Message, &Message) -> Ordering + Send + Sync + 'static,
    {
        if window == 0 {
            return Err(PipelineError::InvalidConfig(
                "sort window must hold at least one message".into(),
            ));
        }
        Ok(Self {
            window,
            compare: Box::new(compare),
        })
    }

    pub fn from_config<F>(config: &SortConfig, compare: F) -> Result<Self>
    where
        F: Fn(&Message, &Message) -> Ordering + Send + Sync + 'static,
    {
        config.validate()?;
        Self::new(config.window, compare)
    }
}

impl Transformer for Sort {
    fn transform(&self, input: &Inlet, out: &Outlet, _errs: &ErrorOutlet) {
        let mut window = SortWindow::new(|a: &Message, b: &Message| (self.compare)(a, b));

        for msg in input.iter() {
            window.insert(msg);
            if window.len() >= self.window {
                if let Some(next) = window.pop_min() {
                    if out.send(next).is_err() {
                        return;
                    }
                }
            }
        }

        while let Some(next) = window.pop_min() {
            if out.send(next).is_err() {
                return;
            }
        }
    }

    fn name(&self) -> &str {
        "sort"
    }
}
