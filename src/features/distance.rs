//! Exact Euclidean distance transform.
//!
//! Separable lower-envelope algorithm (Felzenszwalb & Huttenlocher): squared
//! distances are propagated one axis at a time, then square-rooted. Distances are
//! in voxel units.

use ndarray::{Array3, Axis};

/// Distance from each `true` voxel to the nearest `false` voxel; `false` voxels map to 0.
///
/// Returns `None` when the grid has no `false` voxel to measure against.
pub fn euclidean_distance_transform(mask: &Array3<bool>) -> Option<Array3<f64>> {
    if mask.is_empty() || mask.iter().all(|&m| m) {
        return None;
    }

    let mut dist = mask.mapv(|m| if m { f64::INFINITY } else { 0.0 });

    for axis in (0..3).rev() {
        let n = dist.len_of(Axis(axis));
        let mut line = vec![0.0; n];
        let mut out = vec![0.0; n];
        let mut sites = vec![0usize; n];
        let mut bounds = vec![0.0; n + 1];

        for mut lane in dist.lanes_mut(Axis(axis)) {
            for (dst, &src) in line.iter_mut().zip(lane.iter()) {
                *dst = src;
            }
            squared_edt_1d(&line, &mut out, &mut sites, &mut bounds);
            for (dst, &src) in lane.iter_mut().zip(out.iter()) {
                *dst = src;
            }
        }
    }

    dist.mapv_inplace(f64::sqrt);
    Some(dist)
}

/// One-dimensional squared distance transform of sampled function `f`.
///
/// Infinite samples are not parabola sites; a line without any finite sample stays infinite.
fn squared_edt_1d(f: &[f64], out: &mut [f64], sites: &mut [usize], bounds: &mut [f64]) {
    let mut finite = f.iter().enumerate().filter(|(_, v)| v.is_finite());
    let Some((first, _)) = finite.next() else {
        out.fill(f64::INFINITY);
        return;
    };

    let intersect = |q: usize, p: usize| -> f64 {
        let (qf, pf) = (q as f64, p as f64);
        ((f[q] + qf * qf) - (f[p] + pf * pf)) / (2.0 * qf - 2.0 * pf)
    };

    let mut k = 0;
    sites[0] = first;
    bounds[0] = f64::NEG_INFINITY;
    bounds[1] = f64::INFINITY;

    for (q, _) in finite {
        let mut s = intersect(q, sites[k]);
        while s <= bounds[k] {
            k -= 1;
            s = intersect(q, sites[k]);
        }
        k += 1;
        sites[k] = q;
        bounds[k] = s;
        bounds[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, slot) in out.iter_mut().enumerate() {
        while bounds[k + 1] < q as f64 {
            k += 1;
        }
        let d = q as f64 - sites[k] as f64;
        *slot = d * d + f[sites[k]];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn brute_force(mask: &Array3<bool>) -> Array3<f64> {
        let background: Vec<(usize, usize, usize)> = mask
            .indexed_iter()
            .filter(|(_, &m)| !m)
            .map(|(idx, _)| idx)
            .collect();
        Array3::from_shape_fn(mask.dim(), |(i, j, k)| {
            if !mask[[i, j, k]] {
                return 0.0;
            }
            background
                .iter()
                .map(|&(a, b, c)| {
                    let d = [i as f64 - a as f64, j as f64 - b as f64, k as f64 - c as f64];
                    (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
                })
                .fold(f64::INFINITY, f64::min)
        })
    }

    #[test]
    fn test_single_line() {
        let mut mask = Array3::from_elem((1, 1, 7), true);
        mask[[0, 0, 0]] = false;
        mask[[0, 0, 6]] = false;
        let dt = euclidean_distance_transform(&mask).unwrap();
        let got: Vec<f64> = dt.iter().copied().collect();
        assert_eq!(got, vec![0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_matches_brute_force() {
        let mask = Array3::from_shape_fn((6, 7, 5), |(i, j, k)| {
            let (di, dj, dk) = (i as f64 - 2.5, j as f64 - 3.0, k as f64 - 2.0);
            di * di + dj * dj + dk * dk < 9.0 && (i + j * 3 + k) % 11 != 0
        });
        let dt = euclidean_distance_transform(&mask).unwrap();
        let expected = brute_force(&mask);
        for (a, b) in dt.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_all_foreground_is_unavailable() {
        let mask = Array3::from_elem((3, 3, 3), true);
        assert!(euclidean_distance_transform(&mask).is_none());
    }

    #[test]
    fn test_all_background_is_zero() {
        let mask = Array3::from_elem((2, 3, 4), false);
        let dt = euclidean_distance_transform(&mask).unwrap();
        assert!(dt.iter().all(|&d| d == 0.0));
    }
}
