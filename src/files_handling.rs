
use crate::error::Result;

use std::fs;
use std::path::{Path, PathBuf};

/// Something that can be rebuilt from a file written by `SaveFile`.
pub trait ReadFile: Sized {
    fn read_file(path: &Path) -> Result<Self>;
}

/// Something that can persist itself at a path.
pub trait SaveFile {
    fn save_file(&self, path: &Path) -> Result<()>;
}

pub fn read_input<R: ReadFile>(path: &Path) -> Result<R> {
    R::read_file(path)
}

pub fn save_output<S: SaveFile + ?Sized>(path: &Path, item: &S) -> Result<()> {

    // create output folder
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    item.save_file(path)
}

/// `<path>.<suffix>`, keeping whatever extension `path` already has.
pub fn companion(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}


#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn companion_appends_to_the_full_name() {
        assert_eq!(companion(Path::new("model/word2vec"), "vectors.npy"), PathBuf::from("model/word2vec.vectors.npy"));
        assert_eq!(companion(Path::new("model/w2v.bin"), "syn1neg.npy"), PathBuf::from("model/w2v.bin.syn1neg.npy"));
    }

    struct Note(String);

    impl SaveFile for Note {
        fn save_file(&self, path: &Path) -> Result<()> {
            fs::write(path, &self.0)?;
            Ok(())
        }
    }

    impl ReadFile for Note {
        fn read_file(path: &Path) -> Result<Self> {
            Ok(Note(fs::read_to_string(path)?))
        }
    }

    #[test]
    fn save_output_creates_missing_directories() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model").join("nested").join("note");

        save_output(&path, &Note("hello".into())).unwrap();
        let note: Note = read_input(&path).unwrap();
        assert_eq!(note.0, "hello");
    }
}
