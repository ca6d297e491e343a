//! Broad phase: finds candidate pairs of proxies whose fat AABBs overlap.
//!
//! Only proxies that moved since the last update are queried against the
//! tree, so the cost of `update_pairs` scales with motion rather than with
//! the number of proxies.

use glam::Vec2;

use crate::collision::aabb::{Aabb, RayCastInput};
use crate::collision::dynamic_tree::{DynamicTree, ProxyId, NULL_NODE};

#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    proxy_count: usize,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            proxy_count: 0,
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
        }
    }

    /// Add a proxy; it is paired on the next `update_pairs`.
    pub fn create_proxy(&mut self, aabb: &Aabb, user_data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        self.unbuffer_move(id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(id);
    }

    /// Update a proxy's AABB. Only re-pairs when it left its fat AABB.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: &Aabb, displacement: Vec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.buffer_move(id);
        }
    }

    /// Force a proxy to be re-paired on the next update.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.buffer_move(id);
    }

    pub fn fat_aabb(&self, id: ProxyId) -> &Aabb {
        self.tree.fat_aabb(id)
    }

    pub fn user_data(&self, id: ProxyId) -> T {
        self.tree.user_data(id)
    }

    /// Fat AABB overlap of two proxies.
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(self.tree.fat_aabb(b))
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Report every new overlapping pair exactly once, then clear the move
    /// buffer.
    pub fn update_pairs<F: FnMut(T, T)>(&mut self, mut callback: F) {
        self.pair_buffer.clear();

        for &query_id in &self.move_buffer {
            if query_id == NULL_NODE {
                continue;
            }

            let fat_aabb = *self.tree.fat_aabb(query_id);
            let pairs = &mut self.pair_buffer;
            self.tree.query(&fat_aabb, |proxy_id| {
                // A proxy cannot form a pair with itself.
                if proxy_id != query_id {
                    pairs.push((proxy_id.min(query_id), proxy_id.max(query_id)));
                }
                true
            });
        }

        self.move_buffer.clear();

        // Sort so duplicates are adjacent.
        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            callback(self.tree.user_data(a), self.tree.user_data(b));
        }
    }

    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &Aabb, callback: F) {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast<F: FnMut(&RayCastInput, ProxyId) -> f32>(&self, input: &RayCastInput, callback: F) {
        self.tree.ray_cast(input, callback);
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    pub fn tree_quality(&self) -> f32 {
        self.tree.area_ratio()
    }

    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
    }

    fn buffer_move(&mut self, id: ProxyId) {
        self.move_buffer.push(id);
    }

    fn unbuffer_move(&mut self, id: ProxyId) {
        for entry in self.move_buffer.iter_mut().filter(|e| **e == id) {
            *entry = NULL_NODE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x - 0.5, y - 0.5), Vec2::new(x + 0.5, y + 0.5))
    }

    #[test]
    fn pairs_are_reported_once() {
        let mut bp = BroadPhase::new();
        bp.create_proxy(&square(0.0, 0.0), 'a');
        bp.create_proxy(&square(0.5, 0.0), 'b');
        bp.create_proxy(&square(10.0, 0.0), 'c');

        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a.min(b), a.max(b))));
        assert_eq!(pairs, vec![('a', 'b')]);

        // No motion: nothing new.
        pairs.clear();
        bp.update_pairs(|a, b| pairs.push((a, b)));
        assert!(pairs.is_empty());
    }

    #[test]
    fn moved_proxy_finds_new_partner() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&square(0.0, 0.0), 1);
        let b = bp.create_proxy(&square(5.0, 0.0), 2);
        bp.update_pairs(|_, _| {});

        bp.move_proxy(a, &square(4.5, 0.0), Vec2::new(4.5, 0.0));
        let mut pairs = Vec::new();
        bp.update_pairs(|x, y| pairs.push((x.min(y), x.max(y))));
        assert_eq!(pairs, vec![(1, 2)]);
        assert!(bp.test_overlap(a, b));
    }

    #[test]
    fn destroyed_proxy_is_not_paired() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(&square(0.0, 0.0), 1);
        bp.create_proxy(&square(0.2, 0.0), 2);
        bp.destroy_proxy(a);
        let mut count = 0;
        bp.update_pairs(|_, _| count += 1);
        assert_eq!(count, 0);
        assert_eq!(bp.proxy_count(), 1);
    }
}
