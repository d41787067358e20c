use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::{CosimResult, IoContext};

/// `<dir>/<stem>_<frame:05>.csv`
pub fn frame_path(dir: &Path, stem: &str, frame: u64) -> PathBuf {
    dir.join(format!("{stem}_{frame:05}.csv"))
}

/// Comma-separated numeric table, values in scientific notation with 7 significant digits.
pub struct CsvWriter {
    out: BufWriter<File>,
    path: PathBuf,
}

impl CsvWriter {
    pub fn create(path: &Path, header: &str) -> CosimResult<Self> {
        let file = File::create(path).io_context(|| format!("create {}", path.display()))?;
        let mut w = Self { out: BufWriter::new(file), path: path.to_path_buf() };
        writeln!(w.out, "{header}").io_context(|| format!("write {}", path.display()))?;
        Ok(w)
    }

    pub fn row(&mut self, values: &[f64]) -> CosimResult<()> {
        let mut first = true;
        for v in values {
            if !first {
                self.out.write_all(b",").io_context(|| format!("write {}", self.path.display()))?;
            }
            write!(self.out, "{v:.6e}").io_context(|| format!("write {}", self.path.display()))?;
            first = false;
        }
        writeln!(self.out).io_context(|| format!("write {}", self.path.display()))
    }

    pub fn finish(mut self) -> CosimResult<()> {
        self.out.flush().io_context(|| format!("flush {}", self.path.display()))
    }
}
