//! `stave --init`: write a starter stavefile (spec.md §6 "External
//! Interfaces").

use color_eyre::Result;
use color_eyre::eyre::bail;
use tracing::{info, instrument};

const STARTER_TEMPLATE: &str = r#"// stave:target-file

/// Says hello.
pub fn hello() {
    println!("Hello, stave!");
}
"#;

#[instrument(skip(source_dir))]
pub fn exec(source_dir: &std::path::Path) -> Result<()> {
    let path = source_dir.join("stavefile.rs");
    if path.exists() {
        bail!("{} already exists; remove it before running --init", path.display());
    }
    std::fs::write(&path, STARTER_TEMPLATE)?;
    info!(path = %path.display(), "wrote starter stavefile");
    println!("wrote {}", path.display());
    Ok(())
}
