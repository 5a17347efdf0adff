//! Rewritten module texts, one file per compiled script, plus `modules.json`.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::model::ProcessedHost;

pub fn emit(processed: &ProcessedHost, out_dir: &Path) -> io::Result<()> {
    texts(processed, &out_dir.join("modules"))?;
    manifest(processed, out_dir)
}

fn texts(processed: &ProcessedHost, dir: &Path) -> io::Result<()> {
    for module in &processed.modules {
        let Some(text) = &module.text else {
            continue;
        };
        let path = dir.join(&module.filename);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
    }
    Ok(())
}

fn manifest(processed: &ProcessedHost, out_dir: &Path) -> io::Result<()> {
    let file = File::create(out_dir.join("modules.json"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &processed.modules)?;
    writeln!(writer)?;
    writer.flush()
}
