//! Persistent vector: a 32-way bit-partitioned trie with path copying.
//!
//! Element `i` lives in the leaf reached by taking 5-bit digits of `i`
//! from the most significant level down. `push_back` and `set` copy only
//! the nodes on one root-to-leaf path, O(log32 n).

use std::fmt;
use std::rc::Rc;

const BITS: usize = 5;
const WIDTH: usize = 1 << BITS;
const MASK: usize = WIDTH - 1;

enum Node<T> {
    Branch(Vec<Rc<Node<T>>>),
    Leaf(Vec<T>),
}

pub struct PersistentVector<T> {
    root: Rc<Node<T>>,
    len: usize,
    /// Bit shift of the root level. Zero when the root is a leaf.
    shift: usize,
}

impl<T> PersistentVector<T> {
    pub fn new() -> Self {
        Self {
            root: Rc::new(Node::Leaf(Vec::new())),
            len: 0,
            shift: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.leaf_for(index).get(index & MASK)
    }

    pub fn iter(&self) -> VectorIter<'_, T> {
        VectorIter {
            vector: self,
            index: 0,
            leaf: &[],
        }
    }

    /// Returns true if both vectors share the same root node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.root, &other.root)
    }

    fn leaf_for(&self, index: usize) -> &[T] {
        let mut node = &*self.root;
        let mut level = self.shift;
        loop {
            match node {
                Node::Branch(children) => match children.get((index >> level) & MASK) {
                    Some(child) => {
                        node = child;
                        level -= BITS;
                    }
                    None => return &[],
                },
                Node::Leaf(items) => return items,
            }
        }
    }
}

impl<T: Clone> PersistentVector<T> {
    /// Returns a new vector with `value` appended.
    pub fn push_back(&self, value: T) -> Self {
        if self.len == WIDTH << self.shift {
            let root = Node::Branch(vec![self.root.clone(), new_path(self.shift, value)]);
            return Self {
                root: Rc::new(root),
                len: self.len + 1,
                shift: self.shift + BITS,
            };
        }
        Self {
            root: push_into(&self.root, self.shift, self.len, value),
            len: self.len + 1,
            shift: self.shift,
        }
    }

    /// Returns a new vector with element `index` replaced, or `None` if
    /// `index` is out of bounds.
    pub fn set(&self, index: usize, value: T) -> Option<Self> {
        if index >= self.len {
            return None;
        }
        Some(Self {
            root: set_in(&self.root, self.shift, index, value),
            len: self.len,
            shift: self.shift,
        })
    }

    /// Returns a new vector holding the elements of `self` then `other`.
    pub fn concat(&self, other: &Self) -> Self {
        other
            .iter()
            .fold(self.clone(), |acc, item| acc.push_back(item.clone()))
    }
}

fn new_path<T>(level: usize, value: T) -> Rc<Node<T>> {
    if level == 0 {
        Rc::new(Node::Leaf(vec![value]))
    } else {
        Rc::new(Node::Branch(vec![new_path(level - BITS, value)]))
    }
}

fn push_into<T: Clone>(node: &Node<T>, level: usize, index: usize, value: T) -> Rc<Node<T>> {
    match node {
        Node::Leaf(items) => {
            let mut items = items.clone();
            items.push(value);
            Rc::new(Node::Leaf(items))
        }
        Node::Branch(children) => {
            let slot = (index >> level) & MASK;
            let mut children = children.clone();
            match children.get(slot) {
                Some(child) => {
                    let replaced = push_into(child, level - BITS, index, value);
                    children[slot] = replaced;
                }
                None => children.push(new_path(level - BITS, value)),
            }
            Rc::new(Node::Branch(children))
        }
    }
}

fn set_in<T: Clone>(node: &Node<T>, level: usize, index: usize, value: T) -> Rc<Node<T>> {
    match node {
        Node::Leaf(items) => {
            let mut items = items.clone();
            items[index & MASK] = value;
            Rc::new(Node::Leaf(items))
        }
        Node::Branch(children) => {
            let slot = (index >> level) & MASK;
            let mut children = children.clone();
            children[slot] = set_in(&children[slot], level - BITS, index, value);
            Rc::new(Node::Branch(children))
        }
    }
}

/// In-order iterator. Caches the current leaf so each step is O(1)
/// except at leaf boundaries.
pub struct VectorIter<'a, T> {
    vector: &'a PersistentVector<T>,
    index: usize,
    leaf: &'a [T],
}

impl<'a, T> Iterator for VectorIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.index >= self.vector.len {
            return None;
        }
        if self.index & MASK == 0 {
            self.leaf = self.vector.leaf_for(self.index);
        }
        let item = self.leaf.get(self.index & MASK);
        self.index += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len - self.index;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for VectorIter<'_, T> {}

impl<'a, T> IntoIterator for &'a PersistentVector<T> {
    type Item = &'a T;
    type IntoIter = VectorIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> Clone for PersistentVector<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
            shift: self.shift,
        }
    }
}

impl<T> Default for PersistentVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for PersistentVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |acc, item| acc.push_back(item))
    }
}

impl<T: PartialEq> PartialEq for PersistentVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistentVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
