//! Persistent ordered map from string keys: an AVL tree with path copying.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

type Link<V> = Option<Rc<MapNode<V>>>;

struct MapNode<V> {
    key: Rc<str>,
    value: V,
    left: Link<V>,
    right: Link<V>,
    height: u8,
}

pub struct PersistentMap<V> {
    root: Link<V>,
    len: usize,
}

fn height<V>(link: &Link<V>) -> u8 {
    link.as_ref().map_or(0, |node| node.height)
}

fn make<V>(key: Rc<str>, value: V, left: Link<V>, right: Link<V>) -> Rc<MapNode<V>> {
    let height = 1 + height(&left).max(height(&right));
    Rc::new(MapNode {
        key,
        value,
        left,
        right,
        height,
    })
}

/// Rebuilds a node whose subtrees differ in height by at most two.
fn balance<V: Clone>(key: Rc<str>, value: V, left: Link<V>, right: Link<V>) -> Rc<MapNode<V>> {
    let (hl, hr) = (height(&left), height(&right));
    if hl > hr + 1 {
        if let Some(l) = &left {
            if height(&l.left) >= height(&l.right) {
                let lifted = make(key, value, l.right.clone(), right);
                return make(l.key.clone(), l.value.clone(), l.left.clone(), Some(lifted));
            }
            if let Some(lr) = &l.right {
                let lower = make(l.key.clone(), l.value.clone(), l.left.clone(), lr.left.clone());
                let upper = make(key, value, lr.right.clone(), right);
                return make(lr.key.clone(), lr.value.clone(), Some(lower), Some(upper));
            }
        }
    } else if hr > hl + 1 {
        if let Some(r) = &right {
            if height(&r.right) >= height(&r.left) {
                let lifted = make(key, value, left, r.left.clone());
                return make(r.key.clone(), r.value.clone(), Some(lifted), r.right.clone());
            }
            if let Some(rl) = &r.left {
                let lower = make(key, value, left, rl.left.clone());
                let upper = make(r.key.clone(), r.value.clone(), rl.right.clone(), r.right.clone());
                return make(rl.key.clone(), rl.value.clone(), Some(lower), Some(upper));
            }
        }
    }
    make(key, value, left, right)
}

fn insert_at<V: Clone>(link: &Link<V>, key: Rc<str>, value: V, added: &mut bool) -> Rc<MapNode<V>> {
    let Some(node) = link else {
        *added = true;
        return make(key, value, None, None);
    };
    match (*key).cmp(&*node.key) {
        Ordering::Less => {
            let left = insert_at(&node.left, key, value, added);
            balance(node.key.clone(), node.value.clone(), Some(left), node.right.clone())
        }
        Ordering::Greater => {
            let right = insert_at(&node.right, key, value, added);
            balance(node.key.clone(), node.value.clone(), node.left.clone(), Some(right))
        }
        Ordering::Equal => make(node.key.clone(), value, node.left.clone(), node.right.clone()),
    }
}

fn remove_min<V: Clone>(node: &MapNode<V>) -> (Rc<str>, V, Link<V>) {
    match &node.left {
        None => (node.key.clone(), node.value.clone(), node.right.clone()),
        Some(left) => {
            let (key, value, rest) = remove_min(left);
            let rebuilt = balance(node.key.clone(), node.value.clone(), rest, node.right.clone());
            (key, value, Some(rebuilt))
        }
    }
}

fn remove_at<V: Clone>(link: &Link<V>, key: &str, removed: &mut bool) -> Link<V> {
    let node = link.as_ref()?;
    match key.cmp(&*node.key) {
        Ordering::Less => {
            let left = remove_at(&node.left, key, removed);
            Some(balance(node.key.clone(), node.value.clone(), left, node.right.clone()))
        }
        Ordering::Greater => {
            let right = remove_at(&node.right, key, removed);
            Some(balance(node.key.clone(), node.value.clone(), node.left.clone(), right))
        }
        Ordering::Equal => {
            *removed = true;
            match (&node.left, &node.right) {
                (None, right) => right.clone(),
                (left, None) => left.clone(),
                (left, Some(right)) => {
                    let (key, value, rest) = remove_min(right);
                    Some(balance(key, value, left.clone(), rest))
                }
            }
        }
    }
}

impl<V> PersistentMap<V> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        let mut link = &self.root;
        while let Some(node) = link {
            match key.cmp(&*node.key) {
                Ordering::Less => link = &node.left,
                Ordering::Greater => link = &node.right,
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> MapIter<'_, V> {
        let mut iter = MapIter {
            stack: Vec::new(),
            remaining: self.len,
        };
        iter.descend(&self.root);
        iter
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }
}

impl<V: Clone> PersistentMap<V> {
    /// Returns a new map with `key` bound to `value`.
    pub fn insert(&self, key: impl Into<Rc<str>>, value: V) -> Self {
        let mut added = false;
        let root = insert_at(&self.root, key.into(), value, &mut added);
        Self {
            root: Some(root),
            len: self.len + usize::from(added),
        }
    }

    /// Returns a new map without `key`. Absent keys yield an equal map.
    pub fn remove(&self, key: &str) -> Self {
        let mut removed = false;
        let root = remove_at(&self.root, key, &mut removed);
        if !removed {
            return self.clone();
        }
        Self {
            root,
            len: self.len - 1,
        }
    }
}

pub struct MapIter<'a, V> {
    stack: Vec<&'a MapNode<V>>,
    remaining: usize,
}

impl<'a, V> MapIter<'a, V> {
    fn descend(&mut self, mut link: &'a Link<V>) {
        while let Some(node) = link {
            self.stack.push(node);
            link = &node.left;
        }
    }
}

impl<'a, V> Iterator for MapIter<'a, V> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.descend(&node.right);
        self.remaining -= 1;
        Some((&*node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for MapIter<'_, V> {}

impl<V> Clone for PersistentMap<V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<V> Default for PersistentMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<Rc<str>>, V: Clone> FromIterator<(K, V)> for PersistentMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |acc, (k, v)| acc.insert(k, v))
    }
}

impl<V: PartialEq> PartialEq for PersistentMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<V: fmt::Debug> fmt::Debug for PersistentMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
