//! Validate command.

use super::Project;
use anyhow::Result;
use pipecraft_config::Manifest;

/// Report the project configuration and its import search roots.
pub fn run(project: &Project) -> Result<()> {
    let manifest_path = project.settings.manifest_path(project.root());
    let manifest = Manifest::load(&manifest_path)?;

    println!("Configuration: {}", project.config_path.display());
    match &project.settings.backend {
        Some(backend) => println!("Backend: {}", backend.url),
        None => println!("Backend: (none)"),
    }
    match manifest {
        Some(manifest) => println!(
            "Manifest: {} ({} dependencies, {} layout)",
            manifest_path.display(),
            manifest.dependencies.len(),
            if manifest.legacy_imports { "legacy" } else { "host-grouped" }
        ),
        None => println!("Manifest: (none)"),
    }

    println!("Search roots (highest priority first):");
    for root in project.resolver.roots().by_priority() {
        println!("  {}", root.display());
    }

    println!("Configuration is valid");
    Ok(())
}
