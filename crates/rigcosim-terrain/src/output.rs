use std::path::Path;

use rigcosim_core::{CosimResult, Vec3};
pub use rigcosim_core::output::{frame_path, CsvWriter};

/// Dump the loaded tire vertices: index, position and terrain force.
pub fn write_vertex_forces(dir: &Path, frame: u64, vpos: &[Vec3], forces: &[Vec3]) -> CosimResult<()> {
    let mut w = CsvWriter::create(&frame_path(dir, "contacts", frame), "vertex,x,y,z,fx,fy,fz")?;
    for (i, (p, f)) in vpos.iter().zip(forces).enumerate() {
        if *f == Vec3::ZERO { continue; }
        w.row(&[i as f64, p.x, p.y, p.z, f.x, f.y, f.z])?;
    }
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_frames() {
        let dir = tempfile::tempdir().unwrap();
        assert!(frame_path(dir.path(), "particles", 7).ends_with("particles_00007.csv"));
        write_vertex_forces(
            dir.path(), 3,
            &[Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0)],
            &[Vec3::ZERO, Vec3::new(0.0, 0.0, 12.5)],
        ).unwrap();
        let text = std::fs::read_to_string(frame_path(dir.path(), "contacts", 3)).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "vertex,x,y,z,fx,fy,fz");
        assert!(lines[1].starts_with("1.000000e0,1.000000e0,2.000000e0"), "{}", lines[1]);
        assert!(lines[1].ends_with("1.250000e1"));
    }
}
