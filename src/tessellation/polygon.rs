//! Polygon fill triangulation
//!
//! Convex rings decompose into a triangle fan without allocating earcut
//! state; everything else goes through earcut. Failure to triangulate is not
//! an error: the caller simply renders the boundary stroke without a fill.

/// Triangulates the area of a closed exterior ring.
///
/// `ring` must be closed (first vertex repeated at the end) and carry at
/// least four vertices; otherwise, or when triangulation fails or produces
/// no triangles, returns `None` and the fill is skipped.
pub fn triangulate_fill(ring: &[[f64; 3]]) -> Option<Vec<u32>> {
    if ring.len() < 4 {
        return None;
    }
    let first = ring.first()?;
    let last = ring.last()?;
    if first[0] != last[0] || first[1] != last[1] {
        return None;
    }

    // drop the duplicated closing vertex for triangulation
    let n = ring.len() - 1;
    if n < 3 {
        return None;
    }

    if is_convex(&ring[..n]) {
        let mut indices = Vec::with_capacity((n - 2) * 3);
        for i in 1..n as u32 - 1 {
            indices.push(0);
            indices.push(i);
            indices.push(i + 1);
        }
        return Some(indices);
    }

    let mut flat: Vec<f64> = Vec::with_capacity(n * 2);
    for p in &ring[..n] {
        flat.push(p[0]);
        flat.push(p[1]);
    }
    let indices = earcutr::earcut(&flat, &vec![], 2).unwrap_or_default();
    if indices.is_empty() {
        return None;
    }
    Some(indices.into_iter().map(|i| i as u32).collect())
}

/// True when every turn along the ring has the same orientation. Collinear
/// vertices are tolerated; a ring with turns in both directions is not.
fn is_convex(ring: &[[f64; 3]]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let a = &ring[i];
        let b = &ring[(i + 1) % n];
        let c = &ring[(i + 2) % n];
        let cross = (b[0] - a[0]) * (c[1] - b[1]) - (b[1] - a[1]) * (c[0] - b[0]);
        if cross.abs() < 1e-12 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[[f64; 2]]) -> Vec<[f64; 3]> {
        points.iter().map(|p| [p[0], p[1], 0.0]).collect()
    }

    #[test]
    fn test_convex_square_fans() {
        let r = ring(&[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0], [0.0, 0.0]]);
        let idx = triangulate_fill(&r).unwrap();
        assert_eq!(idx, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_concave_ring_triangulates() {
        // arrowhead; the notch at (2, 1) makes it concave
        let r = ring(&[
            [0.0, 0.0],
            [4.0, 0.0],
            [2.0, 1.0],
            [2.0, 4.0],
            [0.0, 0.0],
        ]);
        let idx = triangulate_fill(&r).unwrap();
        assert_eq!(idx.len() % 3, 0);
        assert!(!idx.is_empty());
    }

    #[test]
    fn test_too_few_vertices_skips_fill() {
        let r = ring(&[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]);
        assert!(triangulate_fill(&r).is_none());
    }

    #[test]
    fn test_open_ring_skips_fill() {
        let r = ring(&[[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]]);
        assert!(triangulate_fill(&r).is_none());
    }

    #[test]
    fn test_collinear_ring_has_no_fill() {
        let r = ring(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 0.0]]);
        assert!(triangulate_fill(&r).is_none());
    }
}
