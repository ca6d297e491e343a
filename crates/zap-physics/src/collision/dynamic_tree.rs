//! Dynamic AABB tree.
//!
//! A binary bounding-volume hierarchy whose leaves hold fattened AABBs so
//! that small motions do not require a tree update. Nodes are pooled in a
//! `Vec` with a free list; the tree is kept balanced with AVL-style
//! rotations on insertion and removal.

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::common::math::cross_sv;
use crate::common::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

pub const NULL_NODE: usize = usize::MAX;

/// Index of a leaf in the tree.
pub type ProxyId = usize;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fattened AABB.
    aabb: Aabb,
    user_data: Option<T>,
    /// Parent for allocated nodes, next free node otherwise.
    parent_or_next: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    root: usize,
    nodes: Vec<TreeNode<T>>,
    free_list: usize,
    insertion_count: u32,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            root: NULL_NODE,
            nodes: Vec::with_capacity(16),
            free_list: NULL_NODE,
            insertion_count: 0,
        }
    }

    fn allocate_node(&mut self) -> usize {
        if self.free_list == NULL_NODE {
            self.nodes.push(TreeNode {
                aabb: Aabb::default(),
                user_data: None,
                parent_or_next: NULL_NODE,
                child1: NULL_NODE,
                child2: NULL_NODE,
                height: 0,
            });
            return self.nodes.len() - 1;
        }

        let id = self.free_list;
        let node = &mut self.nodes[id];
        self.free_list = node.parent_or_next;
        node.parent_or_next = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.user_data = None;
        id
    }

    fn free_node(&mut self, id: usize) {
        let node = &mut self.nodes[id];
        node.parent_or_next = self.free_list;
        node.height = -1;
        node.user_data = None;
        self.free_list = id;
    }

    /// Insert a leaf for `aabb`, fattened by the AABB extension.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> ProxyId {
        let id = self.allocate_node();
        let node = &mut self.nodes[id];
        node.aabb = aabb.fattened(AABB_EXTENSION);
        node.user_data = Some(user_data);
        node.height = 0;

        self.insert_leaf(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        debug_assert!(self.nodes[id].is_leaf());
        self.remove_leaf(id);
        self.free_node(id);
    }

    /// Re-fit a proxy that moved. Returns `false` when the new AABB is still
    /// inside the fat one and nothing changed. Otherwise the leaf is
    /// re-inserted with its fat AABB extended along `displacement`.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: &Aabb, displacement: Vec2) -> bool {
        debug_assert!(self.nodes[id].is_leaf());

        if self.nodes[id].aabb.contains(aabb) {
            return false;
        }

        self.remove_leaf(id);

        let mut b = aabb.fattened(AABB_EXTENSION);

        // Predict motion.
        let d = AABB_MULTIPLIER * displacement;
        if d.x < 0.0 {
            b.lower.x += d.x;
        } else {
            b.upper.x += d.x;
        }
        if d.y < 0.0 {
            b.lower.y += d.y;
        } else {
            b.upper.y += d.y;
        }

        self.nodes[id].aabb = b;
        self.insert_leaf(id);
        true
    }

    /// User data of a leaf. Panics on internal or freed nodes, which would
    /// be a broken proxy id.
    pub fn user_data(&self, id: ProxyId) -> T {
        match self.nodes[id].user_data {
            Some(data) => data,
            None => panic!("proxy {} has no user data", id),
        }
    }

    pub fn fat_aabb(&self, id: ProxyId) -> &Aabb {
        &self.nodes[id].aabb
    }

    /// Visit every leaf whose fat AABB overlaps `aabb`. The callback returns
    /// `false` to stop the query.
    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[id];
            if node.aabb.overlaps(aabb) {
                if node.is_leaf() {
                    if !callback(id) {
                        return;
                    }
                } else {
                    stack.push(node.child1);
                    stack.push(node.child2);
                }
            }
        }
    }

    /// Cast a ray against the leaves. The callback returns the new max
    /// fraction: `0` terminates, a negative value ignores the proxy, and a
    /// positive value clips the ray.
    pub fn ray_cast<F: FnMut(&RayCastInput, ProxyId) -> f32>(
        &self,
        input: &RayCastInput,
        mut callback: F,
    ) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize_or_zero();

        // Separating axis for the segment.
        let v = cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;

        let mut segment_aabb = Aabb::from_points(p1, p1 + max_fraction * (p2 - p1));

        let mut stack = Vec::with_capacity(64);
        stack.push(self.root);

        while let Some(id) = stack.pop() {
            if id == NULL_NODE {
                continue;
            }

            let node = &self.nodes[id];
            if !node.aabb.overlaps(&segment_aabb) {
                continue;
            }

            // |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };

                let value = callback(&sub_input, id);
                if value == 0.0 {
                    // The client terminated the ray cast.
                    return;
                }

                if value > 0.0 {
                    max_fraction = value;
                    segment_aabb = Aabb::from_points(p1, p1 + max_fraction * (p2 - p1));
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    fn insert_leaf(&mut self, leaf: usize) {
        self.insertion_count += 1;

        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent_or_next = NULL_NODE;
            return;
        }

        // Find the best sibling by the surface area heuristic.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let child1 = node.child1;
            let child2 = node.child2;

            let area = node.aabb.perimeter();
            let combined_area = node.aabb.combine(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the leaf.
            let cost = 2.0 * combined_area;

            // Minimum cost of pushing the leaf further down.
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let child_node = &self.nodes[child];
                let aabb = leaf_aabb.combine(&child_node.aabb);
                if child_node.is_leaf() {
                    aabb.perimeter() + inheritance_cost
                } else {
                    aabb.perimeter() - child_node.aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // New parent for the sibling and the leaf.
        let old_parent = self.nodes[sibling].parent_or_next;
        let new_parent = self.allocate_node();
        {
            let sibling_aabb = self.nodes[sibling].aabb;
            let sibling_height = self.nodes[sibling].height;
            let node = &mut self.nodes[new_parent];
            node.parent_or_next = old_parent;
            node.user_data = None;
            node.aabb = leaf_aabb.combine(&sibling_aabb);
            node.height = sibling_height + 1;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.nodes[sibling].parent_or_next = new_parent;
        self.nodes[leaf].parent_or_next = new_parent;

        if old_parent != NULL_NODE {
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            self.root = new_parent;
        }

        // Walk back up fixing heights and AABBs.
        let parent = self.nodes[leaf].parent_or_next;
        self.refit_ancestors(parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent_or_next;
        let grand_parent = self.nodes[parent].parent_or_next;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy the parent and connect the sibling to the grandparent.
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent_or_next = grand_parent;
            self.free_node(parent);

            self.refit_ancestors(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent_or_next = NULL_NODE;
            self.free_node(parent);
        }
    }

    fn refit_ancestors(&mut self, start: usize) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            let aabb = self.nodes[child1].aabb.combine(&self.nodes[child2].aabb);
            let height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);

            let node = &mut self.nodes[index];
            node.aabb = aabb;
            node.height = height;
            index = node.parent_or_next;
        }
    }

    /// Rotate the subtree at `i_a` if it is imbalanced. Returns the new
    /// subtree root.
    fn balance(&mut self, i_a: usize) -> usize {
        let a = &self.nodes[i_a];
        if a.is_leaf() || a.height < 2 {
            return i_a;
        }

        let i_b = a.child1;
        let i_c = a.child2;
        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        if balance > 1 {
            self.rotate_up(i_a, i_c, i_b, true)
        } else if balance < -1 {
            self.rotate_up(i_a, i_b, i_c, false)
        } else {
            i_a
        }
    }

    /// Promote the taller child `i_up` of `i_a`. `i_other` is the sibling
    /// that stays under `i_a`; `up_is_child2` says which slot `i_up` came from.
    fn rotate_up(&mut self, i_a: usize, i_up: usize, i_other: usize, up_is_child2: bool) -> usize {
        let i_f = self.nodes[i_up].child1;
        let i_g = self.nodes[i_up].child2;

        // Swap A and the promoted child.
        let a_parent = self.nodes[i_a].parent_or_next;
        self.nodes[i_up].child1 = i_a;
        self.nodes[i_up].parent_or_next = a_parent;
        self.nodes[i_a].parent_or_next = i_up;

        // A's old parent now points at the promoted child.
        if a_parent != NULL_NODE {
            if self.nodes[a_parent].child1 == i_a {
                self.nodes[a_parent].child1 = i_up;
            } else {
                self.nodes[a_parent].child2 = i_up;
            }
        } else {
            self.root = i_up;
        }

        // The taller grandchild stays with the promoted node; the shorter
        // one moves under A in the slot the promoted node vacated.
        let (keep, give) = if self.nodes[i_f].height > self.nodes[i_g].height {
            (i_f, i_g)
        } else {
            (i_g, i_f)
        };

        self.nodes[i_up].child2 = keep;
        if up_is_child2 {
            self.nodes[i_a].child2 = give;
        } else {
            self.nodes[i_a].child1 = give;
        }
        self.nodes[give].parent_or_next = i_a;

        let a_aabb = self.nodes[i_other].aabb.combine(&self.nodes[give].aabb);
        let a_height = 1 + self.nodes[i_other].height.max(self.nodes[give].height);
        self.nodes[i_a].aabb = a_aabb;
        self.nodes[i_a].height = a_height;

        let up_aabb = a_aabb.combine(&self.nodes[keep].aabb);
        let up_height = 1 + a_height.max(self.nodes[keep].height);
        self.nodes[i_up].aabb = up_aabb;
        self.nodes[i_up].height = up_height;

        i_up
    }

    /// Height of the tree; 0 for an empty or single-leaf tree.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    /// Largest height difference between two siblings.
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    /// Sum of node perimeters over the root perimeter.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_area = self.nodes[self.root].aabb.perimeter();
        let total_area: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();
        total_area / root_area
    }

    /// Translate every node so `new_origin` becomes the origin.
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for node in self.nodes.iter_mut() {
            node.aabb.lower -= new_origin;
            node.aabb.upper -= new_origin;
        }
    }

    /// Check parent links, heights and AABB containment. Debug aid.
    pub fn validate(&self) -> bool {
        if self.root == NULL_NODE {
            return true;
        }
        if self.nodes[self.root].parent_or_next != NULL_NODE {
            return false;
        }
        self.validate_node(self.root)
    }

    fn validate_node(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        if node.is_leaf() {
            return node.child2 == NULL_NODE && node.height == 0 && node.user_data.is_some();
        }

        let (c1, c2) = (node.child1, node.child2);
        let (n1, n2) = (&self.nodes[c1], &self.nodes[c2]);
        let height_ok = node.height == 1 + n1.height.max(n2.height);
        let parents_ok = n1.parent_or_next == index && n2.parent_or_next == index;
        let aabb_ok = node.aabb.contains(&n1.aabb) && node.aabb.contains(&n2.aabb);

        height_ok && parents_ok && aabb_ok && self.validate_node(c1) && self.validate_node(c2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x - 0.5, y - 0.5), Vec2::new(x + 0.5, y + 0.5))
    }

    #[test]
    fn query_finds_overlapping_leaves() {
        let mut tree = DynamicTree::new();
        for i in 0..20 {
            tree.create_proxy(&square(i as f32 * 2.0, 0.0), i);
        }
        assert!(tree.validate());

        let mut found = Vec::new();
        tree.query(&square(10.0, 0.0), |id| {
            found.push(tree.user_data(id));
            true
        });
        found.sort();
        assert_eq!(found, vec![5]);
    }

    #[test]
    fn tree_stays_balanced() {
        let mut tree = DynamicTree::new();
        for i in 0..256 {
            tree.create_proxy(&square(i as f32 * 1.5, 0.0), i);
        }
        assert!(tree.validate());
        // Sorted insertion would degenerate to a list without rotations.
        assert!(tree.height() < 32, "height {}", tree.height());
        assert!(tree.max_balance() < tree.height());
        assert!(tree.area_ratio() >= 1.0);
    }

    #[test]
    fn small_moves_keep_fat_aabb() {
        let mut tree = DynamicTree::new();
        let id = tree.create_proxy(&square(0.0, 0.0), 7u32);
        let moved = tree.move_proxy(id, &square(0.05, 0.0), Vec2::new(0.05, 0.0));
        assert!(!moved);

        let moved = tree.move_proxy(id, &square(3.0, 0.0), Vec2::new(3.0, 0.0));
        assert!(moved);
        let fat = tree.fat_aabb(id);
        // Displacement prediction stretches the box forward.
        assert!(fat.upper.x >= 3.5 + AABB_EXTENSION + AABB_MULTIPLIER * 3.0 - 1e-4);
        assert!(tree.validate());
    }

    #[test]
    fn destroy_reuses_nodes() {
        let mut tree = DynamicTree::new();
        let ids: Vec<_> = (0..8).map(|i| tree.create_proxy(&square(i as f32, 0.0), i)).collect();
        for id in &ids[..4] {
            tree.destroy_proxy(*id);
        }
        assert!(tree.validate());
        let reused = tree.create_proxy(&square(100.0, 0.0), 99);
        assert!(reused < 16);
        assert_eq!(tree.user_data(reused), 99);
    }

    #[test]
    fn ray_cast_clips_to_nearest() {
        let mut tree = DynamicTree::new();
        for i in 0..5 {
            tree.create_proxy(&square(i as f32 * 3.0, 0.0), i);
        }
        let input = RayCastInput {
            p1: Vec2::new(-5.0, 0.0),
            p2: Vec2::new(20.0, 0.0),
            max_fraction: 1.0,
        };
        let mut nearest = None;
        tree.ray_cast(&input, |sub, id| {
            let aabb = tree.fat_aabb(id);
            match aabb.ray_cast(sub) {
                Some(hit) => {
                    nearest = Some(tree.user_data(id));
                    hit.fraction
                }
                None => -1.0,
            }
        });
        assert_eq!(nearest, Some(0));
    }

    #[test]
    fn shift_origin_moves_boxes() {
        let mut tree = DynamicTree::new();
        let id = tree.create_proxy(&square(10.0, 10.0), 1);
        tree.shift_origin(Vec2::new(10.0, 10.0));
        let c = tree.fat_aabb(id).center();
        assert!(c.length() < 1e-5);
    }
}
