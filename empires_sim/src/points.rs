// Ordered point buffer used for unit movement plans.
//
// A `Points` is an append-only (until cleared) sequence of points. Paths are
// built in cell space by `path_straight` and converted to grid points by the
// unit when an order is issued. Most paths are short, so the buffer keeps up
// to eight points inline before spilling to the heap.

use empires_protocol::Point;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Points {
    points: SmallVec<[Point; 8]>,
}

impl Points {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, point: Point) {
        self.points.push(point);
    }

    /// Append every point of `other`, in order.
    pub fn cat(&mut self, other: &Points) {
        self.points.extend_from_slice(&other.points);
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    pub fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Point> + '_ {
        self.points.iter().copied()
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.points
    }

    /// Every cell on the straight line from `a` to `b`, both ends included
    /// (Bresenham).
    pub fn path_straight(a: Point, b: Point) -> Points {
        let mut path = Points::new();
        let dx = (b.x - a.x).abs();
        let dy = -(b.y - a.y).abs();
        let sx = if a.x < b.x { 1 } else { -1 };
        let sy = if a.y < b.y { 1 } else { -1 };
        let mut err = dx + dy;
        let mut p = a;
        loop {
            path.append(p);
            if p == b {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                p.x += sx;
            }
            if e2 <= dx {
                err += dx;
                p.y += sy;
            }
        }
        path
    }
}

impl FromIterator<Point> for Points {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_path_includes_both_ends() {
        let path = Points::path_straight(Point::new(0, 0), Point::new(3, 0));
        let cells: Vec<Point> = path.iter().collect();
        assert_eq!(
            cells,
            vec![
                Point::new(0, 0),
                Point::new(1, 0),
                Point::new(2, 0),
                Point::new(3, 0)
            ]
        );
    }

    #[test]
    fn straight_path_to_self_is_one_point() {
        let path = Points::path_straight(Point::new(5, 5), Point::new(5, 5));
        assert_eq!(path.len(), 1);
        assert_eq!(path.last(), Some(Point::new(5, 5)));
    }

    #[test]
    fn diagonal_path_steps_diagonally() {
        let path = Points::path_straight(Point::new(4, 4), Point::new(1, 1));
        let cells: Vec<Point> = path.iter().collect();
        assert_eq!(
            cells,
            vec![
                Point::new(4, 4),
                Point::new(3, 3),
                Point::new(2, 2),
                Point::new(1, 1)
            ]
        );
    }

    #[test]
    fn steep_path_is_connected() {
        let path = Points::path_straight(Point::new(0, 0), Point::new(2, 7));
        assert_eq!(path.len(), 8);
        for pair in path.as_slice().windows(2) {
            let step = pair[1] - pair[0];
            assert!(step.x.abs() <= 1 && step.y.abs() <= 1);
        }
        assert_eq!(path.last(), Some(Point::new(2, 7)));
    }

    #[test]
    fn cat_and_reverse() {
        let mut a: Points = [Point::new(1, 1), Point::new(2, 2)].into_iter().collect();
        let b: Points = [Point::new(3, 3)].into_iter().collect();
        a.cat(&b);
        a.reverse();
        assert_eq!(a.get(0), Some(Point::new(3, 3)));
        assert_eq!(a.last(), Some(Point::new(1, 1)));
        assert_eq!(a.len(), 3);
        a.clear();
        assert!(a.is_empty());
    }
}
