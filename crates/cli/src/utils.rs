use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Install the log subscriber. `RUST_LOG` wins over the default level.
pub fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second call (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Write `(name, body)` records as FASTA.
pub fn write_fasta(path: &Path, records: &[(String, String)]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for (name, body) in records {
        writeln!(out, ">{name}")?;
        writeln!(out, "{body}")?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
