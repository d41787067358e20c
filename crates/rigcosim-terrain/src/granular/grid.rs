use rigcosim_core::{Scalar, Vec3};

/// Uniform hash-free cell grid built by sorting `(cell, index)` keys.
/// Neighbor visits are ordered by cell then by index, independent of thread count.
#[derive(Clone, Debug, Default)]
pub struct CellGrid {
    cell: Scalar,
    entries: Vec<(u64, u32)>,
}

const BIAS: i64 = 1 << 20;

#[inline]
fn pack(c: [i64; 3]) -> u64 {
    let f = |v: i64| ((v + BIAS) as u64) & 0x1F_FFFF;
    (f(c[2]) << 42) | (f(c[1]) << 21) | f(c[0])
}

#[inline]
fn cell_index(p: Vec3, cell: Scalar) -> [i64; 3] {
    let q = p / cell;
    [q.x.floor() as i64, q.y.floor() as i64, q.z.floor() as i64]
}

impl CellGrid {
    pub fn new(cell: Scalar) -> Self { Self { cell, entries: Vec::new() } }

    #[inline] pub fn cell_size(&self) -> Scalar { self.cell }

    #[inline]
    pub fn cell_of(&self, p: Vec3) -> [i64; 3] { cell_index(p, self.cell) }

    pub fn rebuild(&mut self, points: &[Vec3]) {
        let cell = self.cell;
        self.entries.clear();
        self.entries.extend(points.iter().enumerate().map(|(i, p)| (pack(cell_index(*p, cell)), i as u32)));
        self.entries.sort_unstable();
    }

    /// Insert `id` into every cell overlapped by the box `[lo, hi]`.
    pub fn insert_box(&mut self, lo: Vec3, hi: Vec3, id: u32) {
        let (a, b) = (self.cell_of(lo), self.cell_of(hi));
        for z in a[2]..=b[2] {
            for y in a[1]..=b[1] {
                for x in a[0]..=b[0] { self.entries.push((pack([x, y, z]), id)); }
            }
        }
    }

    pub fn clear(&mut self) { self.entries.clear(); }
    pub fn sort(&mut self) { self.entries.sort_unstable(); }

    /// Ids stored in the cell containing `p`.
    pub fn cell_ids(&self, p: Vec3) -> impl Iterator<Item = u32> + '_ {
        self.ids_in(pack(self.cell_of(p)))
    }

    fn ids_in(&self, key: u64) -> impl Iterator<Item = u32> + '_ {
        let start = self.entries.partition_point(|e| e.0 < key);
        self.entries[start..].iter().take_while(move |e| e.0 == key).map(|e| e.1)
    }

    /// Visit the ids stored in the 27 cells around `p`.
    pub fn for_each_near(&self, p: Vec3, mut f: impl FnMut(u32)) {
        let c = self.cell_of(p);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    for id in self.ids_in(pack([c[0] + dx, c[1] + dy, c[2] + dz])) { f(id); }
                }
            }
        }
    }
}
