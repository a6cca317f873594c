//! Precomputed spiral ranks of the columns around the viewer.

use cgmath::Vector2;

/// Rank of every column offset within a square window, nearest rings first.
///
/// Rank 0 is the viewer column. Each Chebyshev ring `i` starts with its four axis points
/// (`+x`, `-z`, `-x`, `+z`), continues with the side points at increasing offset from
/// the axes and ends with the four corners.
#[derive(Debug, Clone)]
pub struct GenerationOrder {
    radius: i32,
    width: usize,
    ranks: Vec<usize>,
}

impl GenerationOrder {
    /// Builds the table for a window of `radius` columns around the center.
    pub fn new(radius: i32) -> Self {
        let radius = radius.max(0);
        let width = (2 * radius + 1) as usize;
        let mut spiral = Vec::with_capacity(width * width);
        spiral.push((0, 0));
        for i in 1..=radius {
            spiral.extend([(i, 0), (0, -i), (-i, 0), (0, i)]);
            for j in 1..i {
                spiral.extend([
                    (i, j),
                    (i, -j),
                    (j, -i),
                    (-j, -i),
                    (-i, -j),
                    (-i, j),
                    (-j, i),
                    (j, i),
                ]);
            }
            spiral.extend([(i, i), (i, -i), (-i, -i), (-i, i)]);
        }

        let mut order = GenerationOrder {
            radius,
            width,
            ranks: vec![0; width * width],
        };
        for (rank, (dx, dz)) in spiral.into_iter().enumerate() {
            let slot = order.slot(dx, dz);
            order.ranks[slot] = rank;
        }
        order
    }

    #[inline]
    fn slot(&self, dx: i32, dz: i32) -> usize {
        (dx + self.radius) as usize + (dz + self.radius) as usize * self.width
    }

    /// Window radius.
    pub fn radius(&self) -> i32 {
        self.radius
    }

    /// Number of columns in the window.
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// Always false; the center column is always ranked.
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// Rank of a column offset, `None` outside the window.
    pub fn rank(&self, offset: Vector2<i32>) -> Option<usize> {
        if offset.x.abs() > self.radius || offset.y.abs() > self.radius {
            return None;
        }
        Some(self.ranks[self.slot(offset.x, offset.y)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_are_a_permutation() {
        let order = GenerationOrder::new(3);
        let mut ranks: Vec<usize> = (-3..=3)
            .flat_map(|z| (-3..=3).map(move |x| Vector2::new(x, z)))
            .filter_map(|offset| order.rank(offset))
            .collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (0..49).collect::<Vec<_>>());
    }

    #[test]
    fn inner_rings_come_first() {
        let order = GenerationOrder::new(4);
        for z in -4i32..=4 {
            for x in -4i32..=4 {
                let ring = x.abs().max(z.abs());
                let rank = order.rank(Vector2::new(x, z)).unwrap();
                let inner = ((2 * ring - 1).max(0) as usize).pow(2);
                let outer = ((2 * ring + 1) as usize).pow(2);
                assert!((inner..outer).contains(&rank), "({x}, {z}) rank {rank}");
            }
        }
    }

    #[test]
    fn first_ring_layout() {
        let order = GenerationOrder::new(1);
        let rank = |x, z| order.rank(Vector2::new(x, z)).unwrap();
        assert_eq!(rank(0, 0), 0);
        assert_eq!(rank(1, 0), 1);
        assert_eq!(rank(0, -1), 2);
        assert_eq!(rank(-1, 0), 3);
        assert_eq!(rank(0, 1), 4);
        assert_eq!(rank(1, 1), 5);
        assert_eq!(rank(-1, 1), 8);
        assert_eq!(order.rank(Vector2::new(2, 0)), None);
    }
}
