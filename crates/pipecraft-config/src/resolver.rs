//! Import resolution for templates.
//!
//! An import is looked up next to the importing file first, then in each
//! search root from the most recently added to the first. Every probed path
//! is remembered in an [`ImportCache`] so a fragment shared by many stages is
//! read once per render.
//!
//! The cache belongs to a single render. [`Resolver::session`] hands out a
//! fresh one; resolvers themselves hold no mutable state and can be shared.

use crate::project::ProjectSettings;
use crate::{ConfigError, ConfigResult, Manifest, search_roots};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read access to template sources.
pub trait SourceFs {
    /// Read a whole file. `ErrorKind::NotFound` and `ErrorKind::IsADirectory`
    /// mean there is no file at the path; any other error is a real failure.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

impl<T: SourceFs + ?Sized> SourceFs for &T {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        (**self).read(path)
    }
}

/// The local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl SourceFs for LocalFs {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        if path.is_dir() {
            return Err(io::Error::new(io::ErrorKind::IsADirectory, "is a directory"));
        }
        std::fs::read(path)
    }
}

/// Search roots in registration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRoots(Vec<PathBuf>);

impl SearchRoots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, root: PathBuf) {
        self.0.push(root);
    }

    pub fn as_slice(&self) -> &[PathBuf] {
        &self.0
    }

    /// Roots in the order they are tried: last registered first.
    pub fn by_priority(&self) -> impl Iterator<Item = &PathBuf> {
        self.0.iter().rev()
    }
}

impl From<Vec<PathBuf>> for SearchRoots {
    fn from(roots: Vec<PathBuf>) -> Self {
        Self(roots)
    }
}

/// Probe results for one render, keyed by candidate path. `None` records a
/// path that does not exist.
#[derive(Debug, Default)]
pub struct ImportCache {
    entries: HashMap<PathBuf, Option<Vec<u8>>>,
}

impl ImportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A successfully resolved import.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// Anything that can satisfy imports during a render.
pub trait Importer {
    fn import(&mut self, from: &Path, name: &str) -> ConfigResult<Resolved>;
}

/// Locates imported files across the configured search roots.
#[derive(Debug, Clone)]
pub struct Resolver<F = LocalFs> {
    roots: SearchRoots,
    fs: F,
}

impl Resolver<LocalFs> {
    pub fn new(roots: SearchRoots) -> Self {
        Self { roots, fs: LocalFs }
    }

    /// Build the resolver for a project: read its dependency manifest and
    /// derive the search roots from it.
    pub fn for_project(project_root: &Path, settings: &ProjectSettings) -> ConfigResult<Self> {
        let manifest = Manifest::load(&settings.manifest_path(project_root))?;
        let roots = search_roots(project_root, &settings.library_dir, manifest.as_ref());
        info!(
            project = %project_root.display(),
            roots = roots.as_slice().len(),
            "Configured import resolver"
        );
        Ok(Self::new(roots))
    }
}

impl<F: SourceFs> Resolver<F> {
    pub fn with_fs(roots: SearchRoots, fs: F) -> Self {
        Self { roots, fs }
    }

    pub fn roots(&self) -> &SearchRoots {
        &self.roots
    }

    /// Start a render: the returned session owns a fresh cache.
    pub fn session(&self) -> ImportSession<'_, F> {
        ImportSession {
            resolver: self,
            cache: ImportCache::new(),
        }
    }

    /// Resolve `name` as imported from the file `from`.
    pub fn resolve(
        &self,
        cache: &mut ImportCache,
        from: &Path,
        name: &str,
    ) -> ConfigResult<Resolved> {
        let imported = Path::new(name);

        if imported.is_absolute() {
            return self
                .probe(cache, imported.to_path_buf())?
                .ok_or_else(|| not_found(from, name));
        }

        let dir = from.parent().unwrap_or(Path::new(""));
        if let Some(found) = self.probe(cache, dir.join(imported))? {
            return Ok(found);
        }

        for root in self.roots.by_priority() {
            if let Some(found) = self.probe(cache, root.join(imported))? {
                return Ok(found);
            }
        }

        Err(not_found(from, name))
    }

    fn probe(&self, cache: &mut ImportCache, candidate: PathBuf) -> ConfigResult<Option<Resolved>> {
        if let Some(entry) = cache.entries.get(&candidate) {
            return Ok(entry.as_ref().map(|content| Resolved {
                path: candidate.clone(),
                content: content.clone(),
            }));
        }

        let content = match self.fs.read(&candidate) {
            Ok(content) => Some(content),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::IsADirectory) => {
                None
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: candidate,
                    source: e,
                });
            }
        };

        debug!(path = %candidate.display(), exists = content.is_some(), "Probed import candidate");
        let resolved = content.as_ref().map(|content| Resolved {
            path: candidate.clone(),
            content: content.clone(),
        });
        cache.entries.insert(candidate, content);
        Ok(resolved)
    }
}

fn not_found(from: &Path, name: &str) -> ConfigError {
    ConfigError::ImportNotFound {
        import: name.to_string(),
        from: from.to_path_buf(),
    }
}

/// One render's view of a resolver.
pub struct ImportSession<'r, F = LocalFs> {
    resolver: &'r Resolver<F>,
    cache: ImportCache,
}

impl<F: SourceFs> ImportSession<'_, F> {
    pub fn cache(&self) -> &ImportCache {
        &self.cache
    }
}

impl<F: SourceFs> Importer for ImportSession<'_, F> {
    fn import(&mut self, from: &Path, name: &str) -> ConfigResult<Resolved> {
        self.resolver.resolve(&mut self.cache, from, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    /// In-memory filesystem counting reads per path.
    #[derive(Default)]
    struct CountingFs {
        files: HashMap<PathBuf, Vec<u8>>,
        reads: RefCell<HashMap<PathBuf, usize>>,
        broken: Option<PathBuf>,
    }

    impl CountingFs {
        fn with_file(mut self, path: &str, content: &str) -> Self {
            self.files.insert(PathBuf::from(path), content.as_bytes().to_vec());
            self
        }

        fn reads_of(&self, path: &str) -> usize {
            self.reads
                .borrow()
                .get(Path::new(path))
                .copied()
                .unwrap_or(0)
        }

        fn total_reads(&self) -> usize {
            self.reads.borrow().values().sum()
        }
    }

    impl SourceFs for CountingFs {
        fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            *self.reads.borrow_mut().entry(path.to_path_buf()).or_default() += 1;
            if self.broken.as_deref() == Some(path) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
            }
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "missing"))
        }
    }

    fn roots(paths: &[&str]) -> SearchRoots {
        paths.iter().map(PathBuf::from).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_directory_relative_import_wins() {
        let fs = CountingFs::default()
            .with_file("/p/stages/common.json", "local")
            .with_file("/lib/common.json", "library");
        let resolver = Resolver::with_fs(roots(&["/lib"]), &fs);

        let mut cache = ImportCache::new();
        let found = resolver
            .resolve(&mut cache, Path::new("/p/stages/deploy.json"), "common.json")
            .unwrap();

        assert_eq!(found.path, PathBuf::from("/p/stages/common.json"));
        assert_eq!(found.content, b"local");
        assert_eq!(fs.reads_of("/lib/common.json"), 0);
    }

    #[test]
    fn test_last_registered_root_is_tried_first() {
        let fs = CountingFs::default()
            .with_file("/first/lib.json", "first")
            .with_file("/second/lib.json", "second");
        let resolver = Resolver::with_fs(roots(&["/first", "/second"]), &fs);

        let mut cache = ImportCache::new();
        let found = resolver
            .resolve(&mut cache, Path::new("/p/main.json"), "lib.json")
            .unwrap();

        assert_eq!(found.path, PathBuf::from("/second/lib.json"));
        assert_eq!(fs.reads_of("/first/lib.json"), 0);
    }

    #[test]
    fn test_falls_back_through_roots() {
        let fs = CountingFs::default().with_file("/first/lib.json", "first");
        let resolver = Resolver::with_fs(roots(&["/first", "/second"]), &fs);

        let mut cache = ImportCache::new();
        let found = resolver
            .resolve(&mut cache, Path::new("/p/main.json"), "lib.json")
            .unwrap();

        assert_eq!(found.path, PathBuf::from("/first/lib.json"));
        assert_eq!(fs.reads_of("/p/lib.json"), 1);
        assert_eq!(fs.reads_of("/second/lib.json"), 1);
    }

    #[test]
    fn test_repeated_import_reads_once() {
        let fs = CountingFs::default().with_file("/lib/shared.json", "{}");
        let resolver = Resolver::with_fs(roots(&["/lib"]), &fs);
        let mut session = resolver.session();

        for from in ["/p/a.json", "/p/b.json", "/p/c.json"] {
            session.import(Path::new(from), "shared.json").unwrap();
        }

        assert_eq!(fs.reads_of("/lib/shared.json"), 1);
        // The negative probe next to the importers is cached too.
        assert_eq!(fs.reads_of("/p/shared.json"), 1);
        assert_eq!(session.cache().len(), 2);
    }

    #[test]
    fn test_each_session_has_its_own_cache() {
        let fs = CountingFs::default().with_file("/lib/shared.json", "{}");
        let resolver = Resolver::with_fs(roots(&["/lib"]), &fs);

        resolver
            .session()
            .import(Path::new("/p/a.json"), "shared.json")
            .unwrap();
        resolver
            .session()
            .import(Path::new("/p/a.json"), "shared.json")
            .unwrap();

        assert_eq!(fs.reads_of("/lib/shared.json"), 2);
    }

    #[test]
    fn test_absolute_import_bypasses_roots() {
        let fs = CountingFs::default()
            .with_file("/abs/x.json", "abs")
            .with_file("/lib/abs/x.json", "lib");
        let resolver = Resolver::with_fs(roots(&["/lib"]), &fs);

        let mut cache = ImportCache::new();
        let found = resolver
            .resolve(&mut cache, Path::new("/p/main.json"), "/abs/x.json")
            .unwrap();

        assert_eq!(found.content, b"abs");
        assert_eq!(fs.total_reads(), 1);
    }

    #[test]
    fn test_not_found_names_the_import() {
        let fs = CountingFs::default();
        let resolver = Resolver::with_fs(roots(&["/lib"]), &fs);

        let mut cache = ImportCache::new();
        let err = resolver
            .resolve(&mut cache, Path::new("/p/main.json"), "missing.json")
            .unwrap_err();

        match &err {
            ConfigError::ImportNotFound { import, from } => {
                assert_eq!(import, "missing.json");
                assert_eq!(from, Path::new("/p/main.json"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_read_errors_propagate_and_are_not_cached() {
        let fs = CountingFs {
            broken: Some(PathBuf::from("/p/locked.json")),
            ..CountingFs::default()
        };
        let resolver = Resolver::with_fs(roots(&["/lib"]), &fs);

        let mut cache = ImportCache::new();
        for _ in 0..2 {
            let err = resolver
                .resolve(&mut cache, Path::new("/p/main.json"), "locked.json")
                .unwrap_err();
            assert!(matches!(err, ConfigError::Read { .. }));
        }

        assert_eq!(fs.reads_of("/p/locked.json"), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_directory_candidate_falls_through_to_next_root() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        fs::create_dir_all(base.join("override/lib/stage.json")).unwrap();
        fs::create_dir_all(base.join("vendor/lib")).unwrap();
        fs::write(base.join("vendor/lib/stage.json"), "{}").unwrap();

        // "override" is registered last, so it is probed first.
        let resolver = Resolver::new(SearchRoots::from(vec![
            base.join("vendor"),
            base.join("override"),
        ]));

        let found = resolver
            .session()
            .import(&base.join("project/pipeline.json"), "lib/stage.json")
            .unwrap();
        assert_eq!(found.path, base.join("vendor/lib/stage.json"));
    }

    #[test]
    fn test_for_project_reads_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("jsonnetfile.json"),
            r#"{"dependencies": [{"source": {"git": {"remote": "https://github.com/org/lib"}}}], "legacyImports": false}"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("vendor/github.com/org/lib")).unwrap();
        fs::write(root.join("vendor/github.com/org/lib/stage.json"), "{}").unwrap();

        let resolver = Resolver::for_project(root, &ProjectSettings::default()).unwrap();
        assert_eq!(
            resolver.roots().as_slice(),
            &[root.to_path_buf(), root.join("vendor/github.com/org")]
        );

        let found = resolver
            .session()
            .import(&root.join("pipeline.json"), "lib/stage.json")
            .unwrap();
        assert_eq!(found.path, root.join("vendor/github.com/org/lib/stage.json"));
    }
}
