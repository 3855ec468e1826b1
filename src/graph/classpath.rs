use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Index of compiled classes available on the classpath.
///
/// Directories are walked for `.class` files; archives are recorded but not
/// opened, so names they would provide stay unplaced.
#[derive(Debug, Default, Clone)]
pub struct ClasspathResolver {
    /// Binary names (`a.b.Outer$Inner`)
    classes: HashSet<String>,
    /// Package names that own at least one indexed class
    packages: HashSet<String>,
    archives: Vec<PathBuf>,
}

impl ClasspathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[PathBuf]) -> Self {
        let mut resolver = Self::new();
        for entry in entries {
            resolver.add_entry(entry);
        }
        debug!(
            "Classpath: {} classes, {} archives",
            resolver.classes.len(),
            resolver.archives.len()
        );
        resolver
    }

    pub fn add_entry(&mut self, entry: &Path) {
        if entry.is_dir() {
            self.index_directory(entry);
        } else if entry
            .extension()
            .map(|e| e == "jar" || e == "zip")
            .unwrap_or(false)
        {
            self.archives.push(entry.to_path_buf());
        }
    }

    fn index_directory(&mut self, root: &Path) {
        let walker = walkdir::WalkDir::new(root).into_iter().filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') || e.depth() == 0
        });

        for entry in walker.flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().map(|e| e != "class").unwrap_or(true) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let binary = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(".");
            self.add_class(&binary);
        }
    }

    /// Register a binary class name directly
    pub fn add_class(&mut self, binary: &str) {
        if let Some((package, _)) = binary.rsplit_once('.') {
            self.packages.insert(package.to_string());
        }
        self.classes.insert(binary.to_string());
    }

    /// Look up a dotted name, trying each split between package and nested
    /// type names (`a.Outer.Inner` is tried as `a.Outer$Inner` too)
    pub fn lookup(&self, dotted: &str) -> Option<String> {
        if self.classes.contains(dotted) {
            return Some(dotted.to_string());
        }
        let mut candidate = dotted.to_string();
        while let Some(pos) = candidate.rfind('.') {
            candidate.replace_range(pos..pos + 1, "$");
            if self.classes.contains(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    pub fn has_package(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn has_archives(&self) -> bool {
        !self.archives.is_empty()
    }

    pub fn archives(&self) -> &[PathBuf] {
        &self.archives
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}
