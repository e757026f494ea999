
use crate::error::{PipelineError, Result};

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub type Document = Vec<String>;

pub type Documents<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// A collection of tokenized documents that can be walked front to back.
///
/// Every call to `documents` starts a fresh pass and yields each document
/// once, in corpus order. Trainers call it once per pass they need.
pub trait Corpus {
    fn documents(&self) -> Result<Documents<'_>>;
}

impl<C: Corpus + ?Sized> Corpus for Box<C> {
    fn documents(&self) -> Result<Documents<'_>> {
        (**self).documents()
    }
}

/// A cache file with one document per line, tokens separated by spaces.
#[derive(Clone, Debug)]
pub struct LineCorpus {
    path: PathBuf,
    max_tokens: usize,
}

impl LineCorpus {

    pub fn new(path: impl Into<PathBuf>, max_tokens: usize) -> Self {
        Self { path: path.into(), max_tokens }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // documents longer than max_tokens keep only their leading tokens
    fn parse_line(line: &str, max_tokens: usize) -> Document {
        line.split_whitespace().take(max_tokens).map(str::to_owned).collect()
    }
}

impl Corpus for LineCorpus {
    fn documents(&self) -> Result<Documents<'_>> {
        let lines = BufReader::new(File::open(&self.path)?).lines();
        let max_tokens = self.max_tokens;
        Ok(Box::new(lines.map(move |line| -> Result<Document> {
            Ok(LineCorpus::parse_line(&line?, max_tokens))
        })))
    }
}

/// Documents held in memory.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryCorpus {
    documents: Vec<Document>,
}

impl MemoryCorpus {

    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Splits every line on whitespace.
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        Self::new(lines.iter().map(|l| l.as_ref().split_whitespace().map(str::to_owned).collect()).collect())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl Corpus for MemoryCorpus {
    fn documents(&self) -> Result<Documents<'_>> {
        Ok(Box::new(self.documents.iter().cloned().map(Ok::<Document, PipelineError>)))
    }
}

/// Streams documents into a cache file.
///
/// Each document is flushed as soon as it is written, so the file holds every
/// document seen so far even when the process dies mid-extraction.
pub struct CacheWriter {
    writer: BufWriter<File>,
    written: usize,
}

impl CacheWriter {

    pub fn create(path: &Path) -> Result<CacheWriter> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(CacheWriter { writer: BufWriter::new(File::create(path)?), written: 0 })
    }

    pub fn write_document(&mut self, document: &[String]) -> Result<()> {
        self.writer.write_all(document.join(" ").as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Consumes one pass of `corpus` into a cache file at `path`.
pub fn write_cache(corpus: &dyn Corpus, path: &Path) -> Result<usize> {

    let mut writer = CacheWriter::create(path)?;
    for document in corpus.documents()? {
        writer.write_document(&document?)?;
        if writer.written() % 10_000 == 0 {
            info!("cached {} documents to {}", writer.written(), path.display());
        }
    }
    writer.finish()
}


#[cfg(test)]
mod tests {

    use super::*;

    fn collect(corpus: &dyn Corpus) -> Vec<Document> {
        corpus.documents().unwrap().map(|d| d.unwrap()).collect()
    }

    #[test]
    fn cache_round_trip_keeps_documents_and_order() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("cache.txt");

        let corpus = MemoryCorpus::from_lines(&[
            "anarchism is a political philosophy",
            "autism is a developmental disorder",
            "albedo measures reflection",
        ]);
        assert_eq!(write_cache(&corpus, &path).unwrap(), 3);

        let loaded = LineCorpus::new(&path, 100_000);
        assert_eq!(collect(&loaded), collect(&corpus));
    }

    #[test]
    fn cache_file_uses_single_spaces_and_one_line_per_document() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");

        write_cache(&MemoryCorpus::from_lines(&["a  b\tc", "d"]), &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a b c\nd\n");
    }

    #[test]
    fn long_documents_are_truncated_to_the_ceiling() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");
        fs::write(&path, "one two three four five\nsix seven\n").unwrap();

        let documents = collect(&LineCorpus::new(&path, 3));
        assert_eq!(documents[0], vec!["one", "two", "three"]);
        assert_eq!(documents[1], vec!["six", "seven"]);
    }

    #[test]
    fn every_pass_starts_from_the_first_document() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");
        fs::write(&path, "x y\nz\n").unwrap();

        let corpus = LineCorpus::new(&path, 10);
        assert_eq!(collect(&corpus), collect(&corpus));
    }

    #[test]
    fn written_documents_survive_before_finish() {

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.txt");

        let mut writer = CacheWriter::create(&path).unwrap();
        writer.write_document(&["first".to_string(), "doc".to_string()]).unwrap();
        writer.write_document(&["second".to_string()]).unwrap();

        // the writer is still open, yet both lines are on disk
        assert_eq!(fs::read_to_string(&path).unwrap(), "first doc\nsecond\n");
        assert_eq!(writer.finish().unwrap(), 2);
    }

    #[test]
    fn missing_cache_file_is_an_io_error() {

        let dir = tempfile::tempdir().unwrap();
        let corpus = LineCorpus::new(dir.path().join("nope.txt"), 10);
        assert!(corpus.documents().is_err());
    }
}
