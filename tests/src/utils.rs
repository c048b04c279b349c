use camino::{Utf8Path, Utf8PathBuf};
use memsync::{store::DEFAULT_STORE_FILE, LocalStore};

pub fn temp_path(prefix: Option<&str>, ext: Option<&str>) -> Utf8PathBuf {
    use rand::{distributions::Alphanumeric, Rng};

    let mut filename = String::new();
    if let Some(prefix) = prefix {
        filename.push_str(prefix);
        filename.push('-');
    }
    let rnd: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    filename.push_str(&rnd);
    if let Some(ext) = ext {
        filename.push('.');
        filename.push_str(ext);
    }
    let mut p = std::env::temp_dir();
    p.push(filename);
    p.try_into().unwrap()
}

/// Temporary directory removed on drop
pub struct TempDir {
    path: Utf8PathBuf,
}

impl TempDir {
    pub fn new() -> Self {
        let path = temp_path(Some("memsync"), None);
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Initializes a store in this directory
    pub async fn store(&self) -> LocalStore {
        LocalStore::initialize(self.path.join(DEFAULT_STORE_FILE))
            .await
            .unwrap()
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
