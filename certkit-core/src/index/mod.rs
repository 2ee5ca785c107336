//! Balanced ordered index keyed by 31-bit integers.
//!
//! [`BalancedIndex`] is a red-black tree whose nodes live in an arena and link
//! to each other through [`NodeId`] slots. Slot 0 is the shared NIL sentinel:
//! it is always black, never holds a value and terminates every leaf path.
//!
//! Each node stores its key and color in a single `u32` word. Bit 31 is the
//! color flag (set = black) and bits 0..31 are the key, so keys are limited
//! to 31 bits and are masked with [`KEY_MASK`] on the way in.
//!
//! Keys are not unique. Placement compares keys only; a key equal to an
//! existing node's key descends to the right. Rebalancing rotations can later
//! move such a node so that it is only reachable through the left edge of
//! another node with the same key, so callers resolving collisions must probe
//! both sides of equal-key nodes.

use crate::error::{StatusError, StatusResult};


/// Color flag stored in the top bit of a node word.
const COLOR_BIT: u32 = 1 << 31;

/// Mask selecting the key bits of a node word.
pub const KEY_MASK: u32 = !COLOR_BIT;

/// Handle to a node slot inside a [`BalancedIndex`].
///
/// Handles stay valid until the node they name is deleted. Deleting other
/// nodes never relocates a node to a different slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

const NIL: NodeId = NodeId(0);

/// Node color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// Red node.
    Red,
    /// Black node.
    Black,
}

struct Node<V> {
    word: u32,
    parent: NodeId,
    left: NodeId,
    right: NodeId,
    value: Option<V>,
}

impl<V> Node<V> {
    const fn sentinel() -> Self {
        Self {
            word: COLOR_BIT,
            parent: NIL,
            left: NIL,
            right: NIL,
            value: None,
        }
    }

    const fn key(&self) -> u32 {
        self.word & KEY_MASK
    }

    const fn color(&self) -> Color {
        if self.word & COLOR_BIT == 0 {
            Color::Red
        } else {
            Color::Black
        }
    }

    const fn set_color(&mut self, color: Color) {
        match color {
            Color::Red => self.word &= KEY_MASK,
            Color::Black => self.word |= COLOR_BIT,
        }
    }
}

/// Red-black tree with non-unique 31-bit keys.
pub struct BalancedIndex<V> {
    nodes: Vec<Node<V>>,
    free: Vec<NodeId>,
    root: NodeId,
    len: usize,
}

impl<V> BalancedIndex<V> {
    /// Creates an empty index holding only the NIL sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::sentinel()],
            free: Vec::new(),
            root: NIL,
            len: 0,
        }
    }

    /// Number of values stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the index holds no values.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the root node, if any.
    #[must_use]
    pub const fn root(&self) -> Option<NodeId> {
        Self::some(self.root)
    }

    /// Key of a live node.
    #[must_use]
    pub fn key(&self, id: NodeId) -> Option<u32> {
        self.live(id).map(Node::key)
    }

    /// Color of a live node.
    #[must_use]
    pub fn color(&self, id: NodeId) -> Option<Color> {
        self.live(id).map(Node::color)
    }

    /// Value held by a live node.
    #[must_use]
    pub fn value(&self, id: NodeId) -> Option<&V> {
        self.live(id).and_then(|node| node.value.as_ref())
    }

    /// Mutable access to the value held by a live node.
    ///
    /// The key is not reachable through this handle, so the tree order cannot
    /// be disturbed by the caller.
    pub fn value_mut(&mut self, id: NodeId) -> Option<&mut V> {
        self.nodes
            .get_mut(id.0 as usize)
            .filter(|_| id != NIL)
            .and_then(|node| node.value.as_mut())
    }

    /// Left child of a live node.
    #[must_use]
    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.live(id).and_then(|node| Self::some(node.left))
    }

    /// Right child of a live node.
    #[must_use]
    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.live(id).and_then(|node| Self::some(node.right))
    }

    /// Parent of a live node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.live(id).and_then(|node| Self::some(node.parent))
    }

    /// Inserts `value` under `key` and returns the new node's handle.
    ///
    /// Bit 31 of `key` is ignored. Equal keys descend to the right.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::AllocationFailed`] if node storage cannot grow.
    /// The tree is untouched in that case.
    pub fn insert(&mut self, key: u32, value: V) -> StatusResult<NodeId> {
        let key = key & KEY_MASK;
        let z = self.allocate(key, value)?;

        let mut y = NIL;
        let mut x = self.root;
        while x != NIL {
            y = x;
            x = if key < self.n(x).key() {
                self.n(x).left
            } else {
                self.n(x).right
            };
        }

        self.n_mut(z).parent = y;
        if y == NIL {
            self.root = z;
        } else if key < self.n(y).key() {
            self.n_mut(y).left = z;
        } else {
            self.n_mut(y).right = z;
        }

        self.insert_fixup(z);
        self.len += 1;
        Ok(z)
    }

    /// Removes a node and returns its value.
    ///
    /// Returns `None` if `id` does not name a live node.
    pub fn delete(&mut self, id: NodeId) -> Option<V> {
        self.live(id)?;
        let z = id;

        let mut y = z;
        let mut y_original_color = self.n(y).color();
        let x;

        if self.n(z).left == NIL {
            x = self.n(z).right;
            self.transplant(z, x);
        } else if self.n(z).right == NIL {
            x = self.n(z).left;
            self.transplant(z, x);
        } else {
            y = self.minimum(self.n(z).right);
            y_original_color = self.n(y).color();
            x = self.n(y).right;
            if self.n(y).parent == z {
                self.n_mut(x).parent = y;
            } else {
                self.transplant(y, x);
                let z_right = self.n(z).right;
                self.n_mut(y).right = z_right;
                self.n_mut(z_right).parent = y;
            }
            self.transplant(z, y);
            let z_left = self.n(z).left;
            self.n_mut(y).left = z_left;
            self.n_mut(z_left).parent = y;
            let z_color = self.n(z).color();
            self.n_mut(y).set_color(z_color);
        }

        if y_original_color == Color::Black {
            self.delete_fixup(x);
        }
        self.n_mut(NIL).parent = NIL;

        self.len -= 1;
        self.release(z)
    }

    /// Returns a node whose key equals `key`.
    ///
    /// Under key collisions this is the equal-key node closest to the root;
    /// every other node with the same key lies in its subtree.
    #[must_use]
    pub fn find_exact(&self, key: u32) -> Option<NodeId> {
        let key = key & KEY_MASK;
        let mut x = self.root;
        while x != NIL {
            let node = self.n(x);
            if key == node.key() {
                return Some(x);
            }
            x = if key < node.key() { node.left } else { node.right };
        }
        None
    }

    /// Visits every value in key order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `visitor`.
    pub fn in_order_traverse<E, F>(&self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(u32, &V) -> Result<(), E>,
    {
        for (key, value) in self {
            visitor(key, value)?;
        }
        Ok(())
    }

    /// Iterates `(key, value)` pairs in key order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, V> {
        let next = if self.root == NIL {
            NIL
        } else {
            self.minimum(self.root)
        };
        Iter {
            index: self,
            next,
            remaining: self.len,
        }
    }

    /// Reserves node storage for at least `additional` more inserts.
    ///
    /// After a successful reservation the next `additional` calls to
    /// [`insert`](Self::insert) cannot fail.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::AllocationFailed`] if the storage cannot grow
    /// or the slot count would leave the `u32` handle range. The index is
    /// unchanged in that case.
    pub fn try_reserve(&mut self, additional: usize) -> StatusResult<()> {
        let needed = additional.saturating_sub(self.free.len());
        let slots = self
            .nodes
            .len()
            .checked_add(needed)
            .ok_or(StatusError::AllocationFailed)?;
        u32::try_from(slots).map_err(|_| StatusError::AllocationFailed)?;
        self.nodes
            .try_reserve(needed)
            .map_err(|_| StatusError::AllocationFailed)?;
        self.free
            .try_reserve(needed)
            .map_err(|_| StatusError::AllocationFailed)?;
        Ok(())
    }

    /// Empties the index, handing every value to `free`.
    ///
    /// The index is reset to its freshly constructed state.
    pub fn destroy_all<F>(&mut self, mut free: F)
    where
        F: FnMut(V),
    {
        for node in self.nodes.drain(1..) {
            if let Some(value) = node.value {
                free(value);
            }
        }
        self.nodes[0] = Node::sentinel();
        self.free.clear();
        self.root = NIL;
        self.len = 0;
    }

    // ── slot management ─────────────────────────────────────────────────

    fn allocate(&mut self, key: u32, value: V) -> StatusResult<NodeId> {
        self.try_reserve(1)?;
        let node = Node {
            word: key & KEY_MASK,
            parent: NIL,
            left: NIL,
            right: NIL,
            value: Some(value),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0 as usize] = node;
            return Ok(id);
        }
        let slot = u32::try_from(self.nodes.len()).map_err(|_| StatusError::AllocationFailed)?;
        self.nodes.push(node);
        Ok(NodeId(slot))
    }

    fn release(&mut self, id: NodeId) -> Option<V> {
        let node = &mut self.nodes[id.0 as usize];
        let value = node.value.take();
        node.parent = NIL;
        node.left = NIL;
        node.right = NIL;
        node.word = COLOR_BIT;
        self.free.push(id);
        value
    }

    fn live(&self, id: NodeId) -> Option<&Node<V>> {
        if id == NIL {
            return None;
        }
        self.nodes
            .get(id.0 as usize)
            .filter(|node| node.value.is_some())
    }

    const fn some(id: NodeId) -> Option<NodeId> {
        if id.0 == NIL.0 {
            None
        } else {
            Some(id)
        }
    }

    fn n(&self, id: NodeId) -> &Node<V> {
        &self.nodes[id.0 as usize]
    }

    fn n_mut(&mut self, id: NodeId) -> &mut Node<V> {
        &mut self.nodes[id.0 as usize]
    }

    // ── structural helpers ──────────────────────────────────────────────

    fn minimum(&self, mut x: NodeId) -> NodeId {
        while self.n(x).left != NIL {
            x = self.n(x).left;
        }
        x
    }

    fn successor(&self, mut x: NodeId) -> NodeId {
        if self.n(x).right != NIL {
            return self.minimum(self.n(x).right);
        }
        let mut y = self.n(x).parent;
        while y != NIL && x == self.n(y).right {
            x = y;
            y = self.n(y).parent;
        }
        y
    }

    fn rotate_left(&mut self, x: NodeId) {
        let y = self.n(x).right;
        let y_left = self.n(y).left;
        self.n_mut(x).right = y_left;
        if y_left != NIL {
            self.n_mut(y_left).parent = x;
        }
        let x_parent = self.n(x).parent;
        self.n_mut(y).parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if x == self.n(x_parent).left {
            self.n_mut(x_parent).left = y;
        } else {
            self.n_mut(x_parent).right = y;
        }
        self.n_mut(y).left = x;
        self.n_mut(x).parent = y;
    }

    fn rotate_right(&mut self, x: NodeId) {
        let y = self.n(x).left;
        let y_right = self.n(y).right;
        self.n_mut(x).left = y_right;
        if y_right != NIL {
            self.n_mut(y_right).parent = x;
        }
        let x_parent = self.n(x).parent;
        self.n_mut(y).parent = x_parent;
        if x_parent == NIL {
            self.root = y;
        } else if x == self.n(x_parent).right {
            self.n_mut(x_parent).right = y;
        } else {
            self.n_mut(x_parent).left = y;
        }
        self.n_mut(y).right = x;
        self.n_mut(x).parent = y;
    }

    fn transplant(&mut self, u: NodeId, v: NodeId) {
        let u_parent = self.n(u).parent;
        if u_parent == NIL {
            self.root = v;
        } else if u == self.n(u_parent).left {
            self.n_mut(u_parent).left = v;
        } else {
            self.n_mut(u_parent).right = v;
        }
        self.n_mut(v).parent = u_parent;
    }

    fn insert_fixup(&mut self, mut z: NodeId) {
        while self.n(self.n(z).parent).color() == Color::Red {
            let parent = self.n(z).parent;
            let grandparent = self.n(parent).parent;
            if parent == self.n(grandparent).left {
                let uncle = self.n(grandparent).right;
                if self.n(uncle).color() == Color::Red {
                    self.n_mut(parent).set_color(Color::Black);
                    self.n_mut(uncle).set_color(Color::Black);
                    self.n_mut(grandparent).set_color(Color::Red);
                    z = grandparent;
                } else {
                    if z == self.n(parent).right {
                        z = parent;
                        self.rotate_left(z);
                    }
                    let parent = self.n(z).parent;
                    let grandparent = self.n(parent).parent;
                    self.n_mut(parent).set_color(Color::Black);
                    self.n_mut(grandparent).set_color(Color::Red);
                    self.rotate_right(grandparent);
                }
            } else {
                let uncle = self.n(grandparent).left;
                if self.n(uncle).color() == Color::Red {
                    self.n_mut(parent).set_color(Color::Black);
                    self.n_mut(uncle).set_color(Color::Black);
                    self.n_mut(grandparent).set_color(Color::Red);
                    z = grandparent;
                } else {
                    if z == self.n(parent).left {
                        z = parent;
                        self.rotate_right(z);
                    }
                    let parent = self.n(z).parent;
                    let grandparent = self.n(parent).parent;
                    self.n_mut(parent).set_color(Color::Black);
                    self.n_mut(grandparent).set_color(Color::Red);
                    self.rotate_left(grandparent);
                }
            }
        }
        let root = self.root;
        self.n_mut(root).set_color(Color::Black);
    }

    fn delete_fixup(&mut self, mut x: NodeId) {
        while x != self.root && self.n(x).color() == Color::Black {
            let parent = self.n(x).parent;
            if x == self.n(parent).left {
                let mut w = self.n(parent).right;
                if self.n(w).color() == Color::Red {
                    self.n_mut(w).set_color(Color::Black);
                    self.n_mut(parent).set_color(Color::Red);
                    self.rotate_left(parent);
                    w = self.n(self.n(x).parent).right;
                }
                if self.n(self.n(w).left).color() == Color::Black
                    && self.n(self.n(w).right).color() == Color::Black
                {
                    self.n_mut(w).set_color(Color::Red);
                    x = self.n(x).parent;
                } else {
                    if self.n(self.n(w).right).color() == Color::Black {
                        let w_left = self.n(w).left;
                        self.n_mut(w_left).set_color(Color::Black);
                        self.n_mut(w).set_color(Color::Red);
                        self.rotate_right(w);
                        w = self.n(self.n(x).parent).right;
                    }
                    let parent = self.n(x).parent;
                    let parent_color = self.n(parent).color();
                    self.n_mut(w).set_color(parent_color);
                    self.n_mut(parent).set_color(Color::Black);
                    let w_right = self.n(w).right;
                    self.n_mut(w_right).set_color(Color::Black);
                    self.rotate_left(parent);
                    x = self.root;
                }
            } else {
                let mut w = self.n(parent).left;
                if self.n(w).color() == Color::Red {
                    self.n_mut(w).set_color(Color::Black);
                    self.n_mut(parent).set_color(Color::Red);
                    self.rotate_right(parent);
                    w = self.n(self.n(x).parent).left;
                }
                if self.n(self.n(w).right).color() == Color::Black
                    && self.n(self.n(w).left).color() == Color::Black
                {
                    self.n_mut(w).set_color(Color::Red);
                    x = self.n(x).parent;
                } else {
                    if self.n(self.n(w).left).color() == Color::Black {
                        let w_right = self.n(w).right;
                        self.n_mut(w_right).set_color(Color::Black);
                        self.n_mut(w).set_color(Color::Red);
                        self.rotate_left(w);
                        w = self.n(self.n(x).parent).left;
                    }
                    let parent = self.n(x).parent;
                    let parent_color = self.n(parent).color();
                    self.n_mut(w).set_color(parent_color);
                    self.n_mut(parent).set_color(Color::Black);
                    let w_left = self.n(w).left;
                    self.n_mut(w_left).set_color(Color::Black);
                    self.rotate_right(parent);
                    x = self.root;
                }
            }
        }
        self.n_mut(x).set_color(Color::Black);
    }
}

impl<V> Default for BalancedIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for BalancedIndex<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalancedIndex")
            .field("len", &self.len)
            .field("slots", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl<'a, V> IntoIterator for &'a BalancedIndex<V> {
    type Item = (u32, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// In-order iterator over a [`BalancedIndex`].
pub struct Iter<'a, V> {
    index: &'a BalancedIndex<V>,
    next: NodeId,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u32, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let current = self.next;
        self.next = self.index.successor(current);
        self.remaining = self.remaining.saturating_sub(1);
        let node = self.index.n(current);
        node.value.as_ref().map(|value| (node.key(), value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}
