//! Render command.

use super::Project;
use anyhow::Result;
use pipecraft_config::DocumentKind;

/// Print the rendered document.
pub fn run(project: &Project, kind: DocumentKind) -> Result<()> {
    let rendered = project.render(kind)?;
    println!("{}", rendered);
    Ok(())
}
