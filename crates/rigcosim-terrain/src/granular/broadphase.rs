use rigcosim_core::Aabb;

/// Sweep-and-prune on X. Returns overlapping pairs `(i, j)` with `i < j`, sorted.
pub fn pairs_sap(aabbs: &[Aabb]) -> Vec<(usize, usize)> {
    #[derive(Copy, Clone)]
    struct Elem { min: f64, max: f64, idx: usize }

    // non-finite boxes never pair
    let mut elems: Vec<Elem> = Vec::with_capacity(aabbs.len());
    for (i, a) in aabbs.iter().enumerate() {
        let mut mn = a.min.x;
        let mut mx = a.max.x;
        if !mn.is_finite() || !mx.is_finite() { continue; }
        if mn > mx { core::mem::swap(&mut mn, &mut mx); }
        elems.push(Elem { min: mn, max: mx, idx: i });
    }

    elems.sort_by(|a, b| a.min.total_cmp(&b.min).then(a.idx.cmp(&b.idx)));

    let mut active: Vec<Elem> = Vec::new();
    let mut out: Vec<(usize, usize)> = Vec::new();

    for e in elems {
        active.retain(|a| a.max >= e.min);
        for a in &active {
            let (i, k) = if a.idx < e.idx { (a.idx, e.idx) } else { (e.idx, a.idx) };
            if aabbs[i].overlaps(&aabbs[k]) { out.push((i, k)); }
        }
        active.push(e);
    }

    out.sort_unstable();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcosim_core::Vec3;

    #[test]
    fn finds_exactly_the_overlaps() {
        let boxes = [
            Aabb::from_sphere(Vec3::new(0.0, 0.0, 0.0), 0.5),
            Aabb::from_sphere(Vec3::new(0.9, 0.0, 0.0), 0.5),
            Aabb::from_sphere(Vec3::new(0.9, 2.0, 0.0), 0.5),
            Aabb::from_sphere(Vec3::new(5.0, 0.0, 0.0), 0.5),
            Aabb::new(Vec3::splat(f64::NAN), Vec3::splat(f64::NAN)),
            Aabb::from_sphere(Vec3::new(-0.2, 0.1, 0.3), 0.1),
        ];
        assert_eq!(pairs_sap(&boxes), vec![(0, 1), (0, 5)]);
    }

    #[test]
    fn matches_brute_force() {
        let mut rng = rigcosim_core::XorShift64::new(5);
        let boxes: Vec<Aabb> = (0..200)
            .map(|_| Aabb::from_sphere(Vec3::new(rng.range(0.0, 2.0), rng.range(0.0, 1.0), rng.range(0.0, 1.0)), 0.05))
            .collect();
        let mut brute = Vec::new();
        for i in 0..boxes.len() {
            for j in i + 1..boxes.len() {
                if boxes[i].overlaps(&boxes[j]) { brute.push((i, j)); }
            }
        }
        assert_eq!(pairs_sap(&boxes), brute);
    }
}
