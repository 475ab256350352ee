//! One module per subcommand
//!
//! Handlers return the complete text to write to stdout. Errors are left to
//! `main`, which turns them into the family's exit code.

pub mod descriptor;
pub mod find;
pub mod list;
pub mod origin;
pub mod project;

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::{Path, PathBuf};

    /// A virtual environment readable without an interpreter
    ///
    /// Returns the site-packages directory.
    pub fn fake_venv(root: &Path) -> PathBuf {
        fs::write(root.join("pyvenv.cfg"), "version = 3.12.1\n").unwrap();
        let site = root.join("lib").join("python3.12").join("site-packages");
        fs::create_dir_all(&site).unwrap();
        site
    }

    pub fn install(site: &Path, dist: &str, entry_points: &str, modules: &[(&str, &str)]) {
        let dist_info = site.join(format!("{}-1.0.dist-info", dist));
        fs::create_dir_all(&dist_info).unwrap();
        fs::write(dist_info.join("METADATA"), format!("Name: {}\n", dist)).unwrap();
        fs::write(dist_info.join("entry_points.txt"), entry_points).unwrap();
        for (relative, source) in modules {
            let path = site.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, source).unwrap();
        }
    }
}
