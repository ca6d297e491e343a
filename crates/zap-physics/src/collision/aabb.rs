use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub lower: Vec2,
    pub upper: Vec2,
}

/// Ray segment `p1 + t * (p2 - p1)` for `t` in `[0, max_fraction]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastInput {
    pub p1: Vec2,
    pub p2: Vec2,
    pub max_fraction: f32,
}

/// Hit fraction along the ray and the surface normal at the hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastOutput {
    pub normal: Vec2,
    pub fraction: f32,
}

impl Aabb {
    pub fn new(lower: Vec2, upper: Vec2) -> Self {
        Self { lower, upper }
    }

    /// Box spanning the two points in any order.
    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    pub fn is_valid(&self) -> bool {
        let d = self.upper - self.lower;
        d.x >= 0.0 && d.y >= 0.0 && self.lower.is_finite() && self.upper.is_finite()
    }

    pub fn center(&self) -> Vec2 {
        0.5 * (self.lower + self.upper)
    }

    /// Half-widths.
    pub fn extents(&self) -> Vec2 {
        0.5 * (self.upper - self.lower)
    }

    pub fn perimeter(&self) -> f32 {
        let w = self.upper.x - self.lower.x;
        let h = self.upper.y - self.lower.y;
        2.0 * (w + h)
    }

    /// Smallest box enclosing both.
    pub fn combine(&self, other: &Aabb) -> Aabb {
        Aabb {
            lower: self.lower.min(other.lower),
            upper: self.upper.max(other.upper),
        }
    }

    /// Grow uniformly by `r` on every side.
    pub fn fattened(&self, r: f32) -> Aabb {
        let r = Vec2::splat(r);
        Aabb {
            lower: self.lower - r,
            upper: self.upper + r,
        }
    }

    /// Returns true when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Aabb) -> bool {
        self.lower.x <= other.lower.x
            && self.lower.y <= other.lower.y
            && other.upper.x <= self.upper.x
            && other.upper.y <= self.upper.y
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        let d1 = other.lower - self.upper;
        let d2 = self.lower - other.upper;
        !(d1.x > 0.0 || d1.y > 0.0 || d2.x > 0.0 || d2.y > 0.0)
    }

    /// Slab test. Rays starting inside the box do not hit.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let mut tmin = -f32::MAX;
        let mut tmax = f32::MAX;

        let p = input.p1;
        let d = input.p2 - input.p1;
        let abs_d = d.abs();
        let mut normal = Vec2::ZERO;

        for i in 0..2 {
            if abs_d[i] < f32::EPSILON {
                // Parallel to this slab.
                if p[i] < self.lower[i] || self.upper[i] < p[i] {
                    return None;
                }
            } else {
                let inv_d = 1.0 / d[i];
                let mut t1 = (self.lower[i] - p[i]) * inv_d;
                let mut t2 = (self.upper[i] - p[i]) * inv_d;

                let mut s = -1.0;
                if t1 > t2 {
                    std::mem::swap(&mut t1, &mut t2);
                    s = 1.0;
                }

                if t1 > tmin {
                    normal = Vec2::ZERO;
                    normal[i] = s;
                    tmin = t1;
                }

                tmax = tmax.min(t2);
                if tmin > tmax {
                    return None;
                }
            }
        }

        if tmin < 0.0 || input.max_fraction < tmin {
            return None;
        }

        Some(RayCastOutput {
            normal,
            fraction: tmin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec2::new(-1.0, -1.0), Vec2::new(1.0, 1.0))
    }

    #[test]
    fn overlap_and_containment() {
        let a = unit_box();
        let b = Aabb::new(Vec2::new(0.5, 0.5), Vec2::new(2.0, 2.0));
        let c = Aabb::new(Vec2::new(3.0, 3.0), Vec2::new(4.0, 4.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.combine(&c).contains(&b));
        assert!(!a.contains(&b));
    }

    #[test]
    fn touching_edges_overlap() {
        let a = unit_box();
        let b = Aabb::new(Vec2::new(1.0, -1.0), Vec2::new(2.0, 1.0));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn perimeter_of_rectangle() {
        let a = Aabb::new(Vec2::ZERO, Vec2::new(2.0, 3.0));
        assert!((a.perimeter() - 10.0).abs() < 1e-6);
        assert!(a.is_valid());
    }

    #[test]
    fn ray_hits_left_face() {
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 1.0,
        };
        let hit = unit_box().ray_cast(&input).expect("ray should hit");
        assert!((hit.fraction - 1.0 / 3.0).abs() < 1e-5, "fraction {}", hit.fraction);
        assert_eq!(hit.normal, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn ray_misses_when_too_short() {
        let input = RayCastInput {
            p1: Vec2::new(-3.0, 0.0),
            p2: Vec2::new(3.0, 0.0),
            max_fraction: 0.2,
        };
        assert!(unit_box().ray_cast(&input).is_none());
    }
}
