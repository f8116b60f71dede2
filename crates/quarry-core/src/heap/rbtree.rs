//! Red-black index of free blocks, keyed on block size.
//!
//! Nodes are arena indices; link fields live in each free block's
//! metadata and colour is an explicit field. Equal keys descend right on
//! insertion, so duplicates are legal and a subtree may contain keys
//! equal to its root on either side after rotations. Unlinking operates
//! directly on a known node, the intrusive way: no search is needed to
//! delete, and the fixup tracks the spliced child's parent explicitly
//! because nil children are `None` rather than a sentinel node.

use super::TreeHeap;
use super::block::{BlockState, Color, RbNode};

impl TreeHeap {
    /// Best-fit descent: exact match wins immediately; otherwise the
    /// smallest block seen that still satisfies the request.
    pub(super) fn best_fit(&self, need: usize) -> Option<u32> {
        let mut best = None;
        let mut cur = self.root;
        while let Some(i) = cur {
            let size = self.block(i).size;
            if need == size {
                return Some(i);
            }
            if need < size {
                best = Some(i);
                cur = self.rb(i).left;
            } else {
                cur = self.rb(i).right;
            }
        }
        best
    }

    /// Inserts a detached free block into the index and rebalances.
    pub(super) fn tree_insert(&mut self, i: u32) {
        let key = self.block(i).size;
        let mut parent = None;
        let mut cur = self.root;
        while let Some(c) = cur {
            parent = Some(c);
            cur = if key < self.block(c).size {
                self.rb(c).left
            } else {
                self.rb(c).right
            };
        }
        {
            let node = self.rb_mut(i);
            node.parent = parent;
            node.left = None;
            node.right = None;
            node.color = Color::Red;
        }
        match parent {
            None => self.root = Some(i),
            Some(p) => {
                if key < self.block(p).size {
                    self.rb_mut(p).left = Some(i);
                } else {
                    self.rb_mut(p).right = Some(i);
                }
            }
        }
        self.insert_fixup(i);
    }

    /// Removes a known node from the index and rebalances.
    pub(super) fn tree_unlink(&mut self, z: u32) {
        let (z_left, z_right, z_color) = {
            let n = self.rb(z);
            (n.left, n.right, n.color)
        };
        let mut removed_color = z_color;
        let x: Option<u32>;
        let x_parent: Option<u32>;

        match (z_left, z_right) {
            (None, _) => {
                x = z_right;
                x_parent = self.rb(z).parent;
                self.transplant(z, z_right);
            }
            (_, None) => {
                x = z_left;
                x_parent = self.rb(z).parent;
                self.transplant(z, z_left);
            }
            (Some(_), Some(zr)) => {
                // two children: splice the in-order successor into z's
                // structural position, then rebalance from where the
                // successor used to hang
                let y = self.minimum(zr);
                removed_color = self.rb(y).color;
                let y_right = self.rb(y).right;
                x = y_right;
                if self.rb(y).parent == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = self.rb(y).parent;
                    self.transplant(y, y_right);
                    self.rb_mut(y).right = z_right;
                    if let Some(r) = z_right {
                        self.rb_mut(r).parent = Some(y);
                    }
                }
                self.transplant(z, Some(y));
                self.rb_mut(y).left = z_left;
                if let Some(l) = z_left {
                    self.rb_mut(l).parent = Some(y);
                }
                self.rb_mut(y).color = z_color;
            }
        }

        if removed_color == Color::Black {
            self.delete_fixup(x, x_parent);
        }

        let node = self.rb_mut(z);
        *node = RbNode::detached();
    }

    fn insert_fixup(&mut self, mut z: u32) {
        loop {
            let Some(p) = self.rb(z).parent else { break };
            if self.rb(p).color == Color::Black {
                break;
            }
            let Some(g) = self.rb(p).parent else { break };
            if self.rb(g).left == Some(p) {
                let uncle = self.rb(g).right;
                if self.is_red(uncle) {
                    self.rb_mut(p).color = Color::Black;
                    if let Some(u) = uncle {
                        self.rb_mut(u).color = Color::Black;
                    }
                    self.rb_mut(g).color = Color::Red;
                    z = g;
                } else {
                    if self.rb(p).right == Some(z) {
                        z = p;
                        self.rotate_left(z);
                    }
                    let Some(p) = self.rb(z).parent else { break };
                    let Some(g) = self.rb(p).parent else { break };
                    self.rb_mut(p).color = Color::Black;
                    self.rb_mut(g).color = Color::Red;
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.rb(g).left;
                if self.is_red(uncle) {
                    self.rb_mut(p).color = Color::Black;
                    if let Some(u) = uncle {
                        self.rb_mut(u).color = Color::Black;
                    }
                    self.rb_mut(g).color = Color::Red;
                    z = g;
                } else {
                    if self.rb(p).left == Some(z) {
                        z = p;
                        self.rotate_right(z);
                    }
                    let Some(p) = self.rb(z).parent else { break };
                    let Some(g) = self.rb(p).parent else { break };
                    self.rb_mut(p).color = Color::Black;
                    self.rb_mut(g).color = Color::Red;
                    self.rotate_left(g);
                }
            }
        }
        if let Some(r) = self.root {
            self.rb_mut(r).color = Color::Black;
        }
    }

    fn delete_fixup(&mut self, mut x: Option<u32>, mut x_parent: Option<u32>) {
        while x != self.root && !self.is_red(x) {
            let Some(p) = x_parent else { break };
            if self.rb(p).left == x {
                let Some(mut w) = self.rb(p).right else { break };
                if self.rb(w).color == Color::Red {
                    self.rb_mut(w).color = Color::Black;
                    self.rb_mut(p).color = Color::Red;
                    self.rotate_left(p);
                    let Some(nw) = self.rb(p).right else { break };
                    w = nw;
                }
                let left_red = self.is_red(self.rb(w).left);
                let right_red = self.is_red(self.rb(w).right);
                if !left_red && !right_red {
                    self.rb_mut(w).color = Color::Red;
                    x = Some(p);
                    x_parent = self.rb(p).parent;
                } else {
                    if !right_red {
                        if let Some(l) = self.rb(w).left {
                            self.rb_mut(l).color = Color::Black;
                        }
                        self.rb_mut(w).color = Color::Red;
                        self.rotate_right(w);
                        let Some(nw) = self.rb(p).right else { break };
                        w = nw;
                    }
                    self.rb_mut(w).color = self.rb(p).color;
                    self.rb_mut(p).color = Color::Black;
                    if let Some(r) = self.rb(w).right {
                        self.rb_mut(r).color = Color::Black;
                    }
                    self.rotate_left(p);
                    x = self.root;
                    x_parent = None;
                }
            } else {
                let Some(mut w) = self.rb(p).left else { break };
                if self.rb(w).color == Color::Red {
                    self.rb_mut(w).color = Color::Black;
                    self.rb_mut(p).color = Color::Red;
                    self.rotate_right(p);
                    let Some(nw) = self.rb(p).left else { break };
                    w = nw;
                }
                let left_red = self.is_red(self.rb(w).left);
                let right_red = self.is_red(self.rb(w).right);
                if !left_red && !right_red {
                    self.rb_mut(w).color = Color::Red;
                    x = Some(p);
                    x_parent = self.rb(p).parent;
                } else {
                    if !left_red {
                        if let Some(r) = self.rb(w).right {
                            self.rb_mut(r).color = Color::Black;
                        }
                        self.rb_mut(w).color = Color::Red;
                        self.rotate_left(w);
                        let Some(nw) = self.rb(p).left else { break };
                        w = nw;
                    }
                    self.rb_mut(w).color = self.rb(p).color;
                    self.rb_mut(p).color = Color::Black;
                    if let Some(l) = self.rb(w).left {
                        self.rb_mut(l).color = Color::Black;
                    }
                    self.rotate_right(p);
                    x = self.root;
                    x_parent = None;
                }
            }
        }
        if let Some(xi) = x {
            self.rb_mut(xi).color = Color::Black;
        }
    }

    /// Replaces the subtree rooted at `u` with the one rooted at `v`.
    fn transplant(&mut self, u: u32, v: Option<u32>) {
        let up = self.rb(u).parent;
        match up {
            None => self.root = v,
            Some(p) => {
                if self.rb(p).left == Some(u) {
                    self.rb_mut(p).left = v;
                } else {
                    self.rb_mut(p).right = v;
                }
            }
        }
        if let Some(v) = v {
            self.rb_mut(v).parent = up;
        }
    }

    fn rotate_left(&mut self, x: u32) {
        let Some(y) = self.rb(x).right else { return };
        let y_left = self.rb(y).left;
        self.rb_mut(x).right = y_left;
        if let Some(yl) = y_left {
            self.rb_mut(yl).parent = Some(x);
        }
        let x_parent = self.rb(x).parent;
        self.rb_mut(y).parent = x_parent;
        match x_parent {
            None => self.root = Some(y),
            Some(p) => {
                if self.rb(p).left == Some(x) {
                    self.rb_mut(p).left = Some(y);
                } else {
                    self.rb_mut(p).right = Some(y);
                }
            }
        }
        self.rb_mut(y).left = Some(x);
        self.rb_mut(x).parent = Some(y);
    }

    fn rotate_right(&mut self, x: u32) {
        let Some(y) = self.rb(x).left else { return };
        let y_right = self.rb(y).right;
        self.rb_mut(x).left = y_right;
        if let Some(yr) = y_right {
            self.rb_mut(yr).parent = Some(x);
        }
        let x_parent = self.rb(x).parent;
        self.rb_mut(y).parent = x_parent;
        match x_parent {
            None => self.root = Some(y),
            Some(p) => {
                if self.rb(p).left == Some(x) {
                    self.rb_mut(p).left = Some(y);
                } else {
                    self.rb_mut(p).right = Some(y);
                }
            }
        }
        self.rb_mut(y).right = Some(x);
        self.rb_mut(x).parent = Some(y);
    }

    fn minimum(&self, mut i: u32) -> u32 {
        while let Some(l) = self.rb(i).left {
            i = l;
        }
        i
    }

    fn is_red(&self, i: Option<u32>) -> bool {
        i.is_some_and(|i| self.rb(i).color == Color::Red)
    }

    pub(super) fn rb(&self, i: u32) -> &RbNode {
        match &self.block(i).state {
            BlockState::Free(node) => node,
            BlockState::Used => unreachable!("live block {i} in the free index"),
        }
    }

    pub(super) fn rb_mut(&mut self, i: u32) -> &mut RbNode {
        match &mut self.block_mut(i).state {
            BlockState::Free(node) => node,
            BlockState::Used => unreachable!("live block {i} in the free index"),
        }
    }
}
