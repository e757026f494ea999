
use crate::error::{PipelineError, Result};
use crate::files_handling::{companion, ReadFile, SaveFile};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array2, ArrayView1, Axis};
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

const FORMAT: &str = "wiki_embeddings/word2vec/1";
const VECTORS: &str = "vectors.npy";
const SYN1NEG: &str = "syn1neg.npy";

/// Training parameters kept with the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub vector_size: usize,
    pub window: usize,
    pub min_count: u64,
    pub skip_gram: bool,
    pub negative: usize,
    pub epochs: usize,
    pub alpha: f32,
    pub min_alpha: f32,
    pub sample: f32,
}

/// Words ordered by descending corpus frequency, ties broken alphabetically.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    words: Vec<String>,
    counts: Vec<u64>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Vocabulary {

    pub fn from_counts(token2count: HashMap<String, u64>, min_count: u64, max_size: Option<usize>) -> Vocabulary {

        let mut entries: Vec<(String, u64)> = token2count
            .into_iter()
            .filter(|(_, count)| *count >= min_count)
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(max_size) = max_size {
            entries.truncate(max_size);
        }

        let (words, counts) = entries.into_iter().unzip();
        Vocabulary::from_parts(words, counts)
    }

    pub fn from_parts(words: Vec<String>, counts: Vec<u64>) -> Vocabulary {
        let mut vocabulary = Vocabulary { words, counts, index: HashMap::new() };
        vocabulary.rebuild_index();
        vocabulary
    }

    fn rebuild_index(&mut self) {
        self.index = self.words.iter().enumerate().map(|(i, w)| (w.to_owned(), i)).collect();
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn index_of(&self, word: &str) -> Option<usize> {
        self.index.get(word).copied()
    }

    pub fn word(&self, i: usize) -> Option<&str> {
        self.words.get(i).map(String::as_str)
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// A trained word2vec model: vocabulary, word vectors and the negative
/// sampling output weights.
#[derive(Clone, Debug)]
pub struct Word2Vec {
    settings: ModelSettings,
    vocabulary: Vocabulary,
    vectors: Array2<f32>,
    syn1neg: Array2<f32>,
}

fn check_shapes(vocabulary: &Vocabulary, settings: &ModelSettings, vectors: &Array2<f32>, syn1neg: &Array2<f32>) -> std::result::Result<(), String> {
    let expected = (vocabulary.len(), settings.vector_size);
    if vectors.dim() != expected {
        return Err(format!("vectors have shape {:?}, expected {:?}", vectors.dim(), expected));
    }
    if syn1neg.dim() != expected {
        return Err(format!("output weights have shape {:?}, expected {:?}", syn1neg.dim(), expected));
    }
    Ok(())
}

impl Word2Vec {

    pub fn new(settings: ModelSettings, vocabulary: Vocabulary, vectors: Array2<f32>, syn1neg: Array2<f32>) -> Result<Word2Vec> {
        check_shapes(&vocabulary, &settings, &vectors, &syn1neg).map_err(PipelineError::Training)?;
        Ok(Word2Vec { settings, vocabulary, vectors, syn1neg })
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn vectors(&self) -> &Array2<f32> {
        &self.vectors
    }

    pub fn vector_size(&self) -> usize {
        self.settings.vector_size
    }

    pub fn contains(&self, word: &str) -> bool {
        self.vocabulary.index_of(word).is_some()
    }

    pub fn vector(&self, word: &str) -> Option<ArrayView1<'_, f32>> {
        self.vocabulary.index_of(word).map(|i| self.vectors.index_axis(Axis(0), i))
    }
}

impl Display for Word2Vec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Word2Vec(vocab={}, vector_size={}, alpha={})", self.vocabulary.len(), self.settings.vector_size, self.settings.alpha)
    }
}

#[derive(Serialize)]
struct HeaderRef<'a> {
    format: &'a str,
    settings: &'a ModelSettings,
    vocabulary: &'a Vocabulary,
}

#[derive(Deserialize)]
struct Header {
    format: String,
    settings: ModelSettings,
    vocabulary: Vocabulary,
}

impl SaveFile for Word2Vec {
    fn save_file(&self, path: &Path) -> Result<()> {

        let fail = |e: &dyn Display| PipelineError::model_save(path, e);

        write_npy(companion(path, VECTORS), &self.vectors).map_err(|e| fail(&e))?;
        write_npy(companion(path, SYN1NEG), &self.syn1neg).map_err(|e| fail(&e))?;

        // header goes last, its presence marks a complete model
        let header = HeaderRef { format: FORMAT, settings: &self.settings, vocabulary: &self.vocabulary };
        let f = BufWriter::new(File::create(path).map_err(|e| fail(&e))?);
        let mut writer = GzEncoder::new(f, Compression::default());
        bincode::serialize_into(&mut writer, &header).map_err(|e| fail(&e))?;
        writer.finish().and_then(|mut f| f.flush()).map_err(|e| fail(&e))?;
        Ok(())
    }
}

impl ReadFile for Word2Vec {
    fn read_file(path: &Path) -> Result<Self> {

        let fail = |e: &dyn Display| PipelineError::model_load(path, e);

        let f = BufReader::new(File::open(path).map_err(|e| fail(&e))?);
        let header: Header = bincode::deserialize_from(GzDecoder::new(f)).map_err(|e| fail(&e))?;
        if header.format != FORMAT {
            return Err(fail(&format!("unknown model format `{}`", header.format)));
        }

        let vectors: Array2<f32> = read_npy(companion(path, VECTORS)).map_err(|e| fail(&e))?;
        let syn1neg: Array2<f32> = read_npy(companion(path, SYN1NEG)).map_err(|e| fail(&e))?;

        let mut vocabulary = header.vocabulary;
        vocabulary.rebuild_index();
        check_shapes(&vocabulary, &header.settings, &vectors, &syn1neg).map_err(|e| fail(&e))?;

        Ok(Word2Vec { settings: header.settings, vocabulary, vectors, syn1neg })
    }
}
