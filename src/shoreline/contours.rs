use std::collections::{HashMap, VecDeque};

use crate::models::Contour;
use crate::raster::ScalarField;

/// A crossing point identified by the grid edge it lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeKey {
    /// Between `(r, c)` and `(r, c + 1)`.
    Horizontal(usize, usize),
    /// Between `(r, c)` and `(r + 1, c)`.
    Vertical(usize, usize),
}

fn crossing(a: f64, b: f64, level: f64) -> f64 {
    if (b - a).abs() < f64::EPSILON {
        0.5
    } else {
        (level - a) / (b - a)
    }
}

/// Iso-lines of `field` at `level` by marching squares, in `(row, col)` coordinates.
///
/// Squares touching a missing cell produce no segments, so contours stop at
/// the edge of valid data. Closed contours repeat their first point at the end.
pub fn find_contours(field: &ScalarField, level: f64) -> Vec<Contour> {
    let (h, w) = (field.height(), field.width());
    if h < 2 || w < 2 {
        return Vec::new();
    }

    let mut points: HashMap<EdgeKey, (f64, f64)> = HashMap::new();
    let mut segments: Vec<(EdgeKey, EdgeKey)> = Vec::new();

    for r in 0..h - 1 {
        for c in 0..w - 1 {
            let (Some(ul), Some(ur), Some(ll), Some(lr)) = (
                field.get(r, c),
                field.get(r, c + 1),
                field.get(r + 1, c),
                field.get(r + 1, c + 1),
            ) else {
                continue;
            };

            let case = (ul > level) as u8
                | ((ur > level) as u8) << 1
                | ((ll > level) as u8) << 2
                | ((lr > level) as u8) << 3;
            if case == 0 || case == 15 {
                continue;
            }

            let top = EdgeKey::Horizontal(r, c);
            let bottom = EdgeKey::Horizontal(r + 1, c);
            let left = EdgeKey::Vertical(r, c);
            let right = EdgeKey::Vertical(r, c + 1);
            let mut locate = |key: EdgeKey| {
                points.entry(key).or_insert_with(|| match key {
                    EdgeKey::Horizontal(..) if key == top => {
                        (r as f64, c as f64 + crossing(ul, ur, level))
                    }
                    EdgeKey::Horizontal(..) => {
                        ((r + 1) as f64, c as f64 + crossing(ll, lr, level))
                    }
                    EdgeKey::Vertical(..) if key == left => {
                        (r as f64 + crossing(ul, ll, level), c as f64)
                    }
                    EdgeKey::Vertical(..) => {
                        (r as f64 + crossing(ur, lr, level), (c + 1) as f64)
                    }
                });
            };

            let centre_high = (ul + ur + ll + lr) / 4.0 > level;
            let pairs: &[(EdgeKey, EdgeKey)] = match case {
                1 | 14 => &[(top, left)],
                2 | 13 => &[(top, right)],
                3 | 12 => &[(left, right)],
                4 | 11 => &[(left, bottom)],
                5 | 10 => &[(top, bottom)],
                7 | 8 => &[(right, bottom)],
                // Saddles: ur and ll high
                6 if centre_high => &[(top, left), (right, bottom)],
                6 => &[(top, right), (left, bottom)],
                // Saddles: ul and lr high
                9 if centre_high => &[(top, right), (left, bottom)],
                _ => &[(top, left), (right, bottom)],
            };
            for &(a, b) in pairs {
                locate(a);
                locate(b);
                segments.push((a, b));
            }
        }
    }

    chain(&segments, &points)
}

/// Join segments that share crossing points into polylines.
fn chain(segments: &[(EdgeKey, EdgeKey)], points: &HashMap<EdgeKey, (f64, f64)>) -> Vec<Contour> {
    let mut incident: HashMap<EdgeKey, Vec<usize>> = HashMap::new();
    for (i, (a, b)) in segments.iter().enumerate() {
        incident.entry(*a).or_default().push(i);
        incident.entry(*b).or_default().push(i);
    }

    let mut used = vec![false; segments.len()];
    let next_from = |key: EdgeKey, used: &mut Vec<bool>| -> Option<EdgeKey> {
        let i = *incident.get(&key)?.iter().find(|&&i| !used[i])?;
        used[i] = true;
        let (a, b) = segments[i];
        Some(if a == key { b } else { a })
    };

    let mut contours = Vec::new();
    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut path: VecDeque<EdgeKey> = VecDeque::from([a, b]);

        let mut tail = b;
        while let Some(k) = next_from(tail, &mut used) {
            path.push_back(k);
            tail = k;
        }
        let mut head = a;
        while let Some(k) = next_from(head, &mut used) {
            path.push_front(k);
            head = k;
        }

        let line = path.iter().filter_map(|k| points.get(k).copied()).collect();
        contours.push(Contour { points: line });
    }
    contours
}

/// The contour with the most vertices; the first one wins a tie.
pub fn longest(contours: Vec<Contour>) -> Option<Contour> {
    let mut best: Option<Contour> = None;
    for c in contours {
        if best.as_ref().is_none_or(|b| c.len() > b.len()) {
            best = Some(c);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_edge_gives_one_open_line() {
        // Left half 0, right half 10: the level-5 line sits at col 2.5
        let field = ScalarField::from_fn(6, 5, |_, c| Some(if c < 3 { 0.0 } else { 10.0 }));
        let contours = find_contours(&field, 5.0);
        assert_eq!(contours.len(), 1);
        let line = &contours[0];
        assert_eq!(line.len(), 5);
        assert!(!line.is_closed());
        assert!(line.points.iter().all(|&(_, c)| (c - 2.5).abs() < 1e-12));
    }

    #[test]
    fn isolated_peak_gives_closed_ring() {
        let field = ScalarField::from_fn(5, 5, |r, c| Some(if r == 2 && c == 2 { 1.0 } else { 0.0 }));
        let contours = find_contours(&field, 0.5);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].is_closed());
        assert_eq!(contours[0].len(), 5);
    }

    #[test]
    fn missing_cells_break_contours() {
        let field = ScalarField::from_fn(6, 5, |r, c| {
            if r == 2 {
                None
            } else {
                Some(if c < 3 { 0.0 } else { 10.0 })
            }
        });
        let contours = find_contours(&field, 5.0);
        assert_eq!(contours.len(), 2);
        let best = longest(contours).unwrap();
        assert_eq!(best.len(), 2);
    }
}
