
use crate::config::Hyperparameters;
use crate::corpus::Corpus;
use crate::error::{PipelineError, Result};
use crate::model::{ModelSettings, Vocabulary, Word2Vec};

use ndarray::prelude::*;
use ndarray::Array;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::time::Instant;
use tracing::{info, warn};

const KNOWN_HYPERPARAMETERS: [&str; 15] = [
    "size", "vector_size", "window", "min_count", "sg", "negative", "alpha", "min_alpha",
    "iter", "epochs", "sample", "seed", "workers", "batch_words", "max_vocab_size",
];

// sigmoid is flat beyond this, as in the reference word2vec
const MAX_EXP: f32 = 6.0;

/// Builds an embedding model out of a corpus.
pub trait Trainer {
    type Model;
    fn train(&self, corpus: &dyn Corpus, hyperparameters: &Hyperparameters) -> Result<Self::Model>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct Word2VecParams {
    pub vector_size: usize,
    pub window: usize,
    pub min_count: u64,
    pub skip_gram: bool,
    pub negative: usize,
    pub alpha: f32,
    pub min_alpha: f32,
    pub epochs: usize,
    pub sample: f32,
    pub seed: u64,
    pub batch_words: usize,
    pub max_vocab_size: Option<usize>,
    pub workers: Option<usize>,
}

impl Word2VecParams {

    pub fn from_hyperparameters(h: &Hyperparameters) -> Result<Word2VecParams> {

        for name in h.names().filter(|name| !KNOWN_HYPERPARAMETERS.contains(name)) {
            warn!("ignoring unsupported word2vec hyperparameter `{}`", name);
        }

        let params = Word2VecParams {
            vector_size: h.usize_or(&["vector_size", "size"], 100)?,
            window: h.usize_or(&["window"], 5)?,
            min_count: h.usize_or(&["min_count"], 5)? as u64,
            skip_gram: h.flag_or(&["sg"], false)?,
            negative: h.usize_or(&["negative"], 5)?,
            alpha: h.f32_or(&["alpha"], 0.025)?,
            min_alpha: h.f32_or(&["min_alpha"], 0.0001)?,
            epochs: h.usize_or(&["epochs", "iter"], 5)?,
            sample: h.f32_or(&["sample"], 0.001)?,
            seed: h.usize_or(&["seed"], 1)? as u64,
            batch_words: h.usize_or(&["batch_words"], 10_000)?,
            max_vocab_size: h.optional_usize(&["max_vocab_size"])?,
            workers: h.optional_usize(&["workers"])?,
        };

        if params.vector_size == 0 {
            return Err(PipelineError::hyperparameter("vector_size", "must be positive"));
        }
        if params.window == 0 {
            return Err(PipelineError::hyperparameter("window", "must be positive"));
        }
        if params.negative == 0 {
            return Err(PipelineError::hyperparameter("negative", "must be positive, hierarchical softmax is not supported"));
        }
        if params.batch_words == 0 {
            return Err(PipelineError::hyperparameter("batch_words", "must be positive"));
        }
        Ok(params)
    }

    fn settings(&self) -> ModelSettings {
        ModelSettings {
            vector_size: self.vector_size,
            window: self.window,
            min_count: self.min_count,
            skip_gram: self.skip_gram,
            negative: self.negative,
            epochs: self.epochs,
            alpha: self.alpha,
            min_alpha: self.min_alpha,
            sample: self.sample,
        }
    }
}

/// Word2vec with negative sampling, skip-gram or CBOW.
///
/// Each batch of documents is split over a rayon pool; workers compute their
/// updates against the weights as they were at the start of the batch and the
/// merged updates are applied once the batch is done.
#[derive(Clone, Debug)]
pub struct Word2VecTrainer {
    workers: usize,
}

impl Word2VecTrainer {

    /// `workers` is a hint, capped at the number of processors.
    pub fn new(workers: usize) -> Self {
        Self { workers: workers.clamp(1, num_cpus::get().max(1)) }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

impl Trainer for Word2VecTrainer {
    type Model = Word2Vec;

    fn train(&self, corpus: &dyn Corpus, hyperparameters: &Hyperparameters) -> Result<Word2Vec> {

        let params = Word2VecParams::from_hyperparameters(hyperparameters)?;
        let workers = params.workers.map_or(self.workers, |w| w.clamp(1, self.workers));
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| PipelineError::Training(e.to_string()))?;

        let timer = Instant::now();
        let vocabulary = scan_vocabulary(corpus, &params)?;
        if vocabulary.is_empty() {
            return Err(PipelineError::Training(format!(
                "no word occurs at least {} times, the vocabulary is empty", params.min_count
            )));
        }
        info!("built vocabulary of {} words in {} seconds", vocabulary.len(), timer.elapsed().as_secs());

        let mut state = TrainingState::new(&vocabulary, &params);
        state.train(corpus, &vocabulary, &params, &pool)?;

        let TrainingState { syn0, syn1neg, .. } = state;
        Word2Vec::new(params.settings(), vocabulary, syn0, syn1neg)
    }
}

fn scan_vocabulary(corpus: &dyn Corpus, params: &Word2VecParams) -> Result<Vocabulary> {

    // accumulate occurrences of words - how many times each token appears in the corpus
    let mut token2count: HashMap<String, u64> = HashMap::new();
    let mut documents = 0usize;
    for document in corpus.documents()? {
        for token in document? {
            *token2count.entry(token).or_insert(0) += 1;
        }
        documents += 1;
        if documents % 10_000 == 0 {
            info!("vocabulary scan at document #{}, {} word types", documents, token2count.len());
        }
    }

    let types = token2count.len();
    let vocabulary = Vocabulary::from_counts(token2count, params.min_count, params.max_vocab_size);
    info!("using {} words with min_count={} out of {} types in {} documents", vocabulary.len(), params.min_count, types, documents);
    Ok(vocabulary)
}

/// Draws negative samples proportionally to count^0.75.
struct NegativeTable {
    cumulative: Vec<f64>,
}

impl NegativeTable {

    fn new(counts: &[u64]) -> Self {
        let mut total = 0.0;
        let cumulative = counts
            .iter()
            .map(|c| {
                total += (*c as f64).powf(0.75);
                total
            })
            .collect();
        Self { cumulative }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        let total = self.cumulative.last().copied().unwrap_or(0.0);
        let x = rng.gen::<f64>() * total;
        self.cumulative.partition_point(|c| *c <= x).min(self.cumulative.len() - 1)
    }
}

/// Probability of keeping each vocabulary word when downsampling frequent words.
fn keep_probabilities(vocabulary: &Vocabulary, sample: f32) -> Vec<f32> {

    if sample <= 0.0 {
        return vec![1.0; vocabulary.len()];
    }
    let threshold = sample as f64 * vocabulary.total_count() as f64;
    vocabulary
        .counts()
        .iter()
        .map(|c| {
            let c = *c as f64;
            (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0) as f32
        })
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    if x >= MAX_EXP {
        1.0
    } else if x <= -MAX_EXP {
        0.0
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

/// Row updates collected by one worker.
#[derive(Default)]
struct Deltas {
    syn0: HashMap<usize, Array1<f32>>,
    syn1neg: HashMap<usize, Array1<f32>>,
}

fn accumulate(rows: &mut HashMap<usize, Array1<f32>>, i: usize, delta: ArrayView1<f32>) {
    match rows.get_mut(&i) {
        Some(row) => row.add_assign(&delta),
        None => {
            rows.insert(i, delta.to_owned());
        }
    }
}

impl Deltas {

    fn merge(mut self, other: Deltas) -> Deltas {
        for (i, delta) in other.syn0 {
            accumulate(&mut self.syn0, i, delta.view());
        }
        for (i, delta) in other.syn1neg {
            accumulate(&mut self.syn1neg, i, delta.view());
        }
        self
    }
}

/// What a worker needs to know about the current batch.
struct BatchContext<'a> {
    params: &'a Word2VecParams,
    table: &'a NegativeTable,
    keep: &'a [f32],
    alpha: f32,
}

struct TrainingState {
    syn0: Array2<f32>,
    syn1neg: Array2<f32>,
}

impl TrainingState {

    fn new(vocabulary: &Vocabulary, params: &Word2VecParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let shape = (vocabulary.len(), params.vector_size);
        Self {
            syn0: Array::random_using(shape, Uniform::new(-0.5f32, 0.5), &mut rng) / params.vector_size as f32,
            syn1neg: Array2::zeros(shape),
        }
    }

    fn train(&mut self, corpus: &dyn Corpus, vocabulary: &Vocabulary, params: &Word2VecParams, pool: &rayon::ThreadPool) -> Result<()> {

        let table = NegativeTable::new(vocabulary.counts());
        let keep = keep_probabilities(vocabulary, params.sample);

        // learning rate decays linearly over every word of every epoch
        let expected_words = (vocabulary.total_count() as f64 * params.epochs as f64).max(1.0);
        let mut processed_words = 0u64;
        let mut batch_number = 0u64;

        for epoch in 0..params.epochs {

            let timer = Instant::now();
            let mut epoch_words = 0u64;
            let mut batch: Vec<Vec<usize>> = Vec::new();
            let mut batch_words = 0usize;

            let mut documents = corpus.documents()?.peekable();
            while let Some(document) = documents.next() {

                let indices: Vec<usize> = document?.iter().filter_map(|t| vocabulary.index_of(t)).collect();
                batch_words += indices.len();
                batch.push(indices);

                if batch_words >= params.batch_words || documents.peek().is_none() {

                    let progress = processed_words as f64 / expected_words;
                    let alpha = (params.alpha - (params.alpha - params.min_alpha) * progress as f32).max(params.min_alpha);
                    let context = BatchContext { params, table: &table, keep: &keep, alpha };

                    let seed = params.seed.wrapping_add(batch_number.wrapping_mul(0x9E37_79B9_7F4A_7C15));
                    let deltas = pool.install(|| self.batch_deltas(&batch, &context, seed));
                    self.apply(deltas);

                    processed_words += batch_words as u64;
                    epoch_words += batch_words as u64;
                    batch_number += 1;
                    batch.clear();
                    batch_words = 0;
                }
            }

            info!("finished epoch {}, {} effective words, took {} seconds", epoch, epoch_words, timer.elapsed().as_secs());
        }

        Ok(())
    }

    fn batch_deltas(&self, batch: &[Vec<usize>], context: &BatchContext, seed: u64) -> Deltas {
        batch
            .par_iter()
            .enumerate()
            .map(|(i, sentence)| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let kept: Vec<usize> = sentence
                    .iter()
                    .copied()
                    .filter(|w| context.keep[*w] >= 1.0 || context.keep[*w] > rng.gen::<f32>())
                    .collect();
                self.sentence_deltas(&kept, context, &mut rng)
            })
            .reduce(Deltas::default, Deltas::merge)
    }

    fn sentence_deltas(&self, sentence: &[usize], context: &BatchContext, rng: &mut StdRng) -> Deltas {

        let mut deltas = Deltas::default();
        let window = context.params.window;
        let dim = context.params.vector_size;

        for (pos, &word) in sentence.iter().enumerate() {

            // shrink the window at random, nearby words weigh more
            let reduced = window - rng.gen_range(0..window);
            let start = pos.saturating_sub(reduced);
            let end = (pos + reduced + 1).min(sentence.len());
            let neighbors: Vec<usize> = (start..end).filter(|c| *c != pos).map(|c| sentence[c]).collect();
            if neighbors.is_empty() {
                continue;
            }

            if context.params.skip_gram {
                for &neighbor in &neighbors {
                    let h = self.syn0.row(neighbor);
                    let mut neu1e = Array1::zeros(dim);
                    self.negative_sampling(h, word, context, rng, &mut neu1e, &mut deltas);
                    accumulate(&mut deltas.syn0, neighbor, neu1e.view());
                }
            } else {
                let mut h: Array1<f32> = Array1::zeros(dim);
                for &neighbor in &neighbors {
                    h.add_assign(&self.syn0.row(neighbor));
                }
                h /= neighbors.len() as f32;

                let mut neu1e = Array1::zeros(dim);
                self.negative_sampling(h.view(), word, context, rng, &mut neu1e, &mut deltas);
                neu1e /= neighbors.len() as f32;
                for &neighbor in &neighbors {
                    accumulate(&mut deltas.syn0, neighbor, neu1e.view());
                }
            }
        }

        deltas
    }

    // one positive target and `negative` sampled noise words
    fn negative_sampling(
        &self,
        h: ArrayView1<f32>,
        target: usize,
        context: &BatchContext,
        rng: &mut StdRng,
        neu1e: &mut Array1<f32>,
        deltas: &mut Deltas,
    ) {
        for d in 0..=context.params.negative {
            let (output, label) = if d == 0 {
                (target, 1.0)
            } else {
                let noise = context.table.sample(rng);
                if noise == target {
                    continue;
                }
                (noise, 0.0)
            };

            let out = self.syn1neg.row(output);
            let g = (label - sigmoid(h.dot(&out))) * context.alpha;
            neu1e.scaled_add(g, &out);
            accumulate(&mut deltas.syn1neg, output, (&h * g).view());
        }
    }

    fn apply(&mut self, deltas: Deltas) {
        for (i, delta) in deltas.syn0 {
            self.syn0.slice_mut(s![i, ..]).add_assign(&delta);
        }
        for (i, delta) in deltas.syn1neg {
            self.syn1neg.slice_mut(s![i, ..]).add_assign(&delta);
        }
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::corpus::MemoryCorpus;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn hyperparameters(value: serde_json::Value) -> Hyperparameters {
        match value {
            serde_json::Value::Object(map) => Hyperparameters::new(map),
            _ => panic!("hyperparameters must be an object"),
        }
    }

    fn toy_corpus() -> MemoryCorpus {
        let mut lines = Vec::new();
        for _ in 0..40 {
            lines.push("the cat chased the mouse across the kitchen floor");
            lines.push("the dog chased the cat across the garden");
            lines.push("a mouse is a small rodent that eats cheese");
        }
        MemoryCorpus::from_lines(&lines)
    }

    #[test]
    fn gensim_names_and_aliases_are_understood() {

        let params = Word2VecParams::from_hyperparameters(&hyperparameters(json!({
            "size": 32, "window": 3, "min_count": 2, "sg": 1, "iter": 7, "workers": 2, "hs": 0
        }))).unwrap();

        assert_eq!(params.vector_size, 32);
        assert_eq!(params.window, 3);
        assert_eq!(params.min_count, 2);
        assert!(params.skip_gram);
        assert_eq!(params.epochs, 7);
        assert_eq!(params.workers, Some(2));
        assert_eq!(params.negative, 5);
        assert_eq!(params.max_vocab_size, None);
    }

    #[test]
    fn invalid_values_are_rejected() {

        let zero = Word2VecParams::from_hyperparameters(&hyperparameters(json!({"vector_size": 0})));
        assert!(matches!(zero, Err(PipelineError::Hyperparameter { .. })));

        let text = Word2VecParams::from_hyperparameters(&hyperparameters(json!({"alpha": "fast"})));
        assert!(matches!(text, Err(PipelineError::Hyperparameter { .. })));

        let no_negative = Word2VecParams::from_hyperparameters(&hyperparameters(json!({"negative": 0})));
        assert!(matches!(no_negative, Err(PipelineError::Hyperparameter { .. })));
    }

    #[test]
    fn trains_vectors_for_frequent_words() {

        let trainer = Word2VecTrainer::new(2);
        let model = trainer.train(&toy_corpus(), &hyperparameters(json!({
            "vector_size": 16, "min_count": 41, "epochs": 3, "batch_words": 200
        }))).unwrap();

        // words repeated within a line pass min_count, the others do not
        assert_eq!(model.vector_size(), 16);
        assert_eq!(model.vocabulary().word(0), Some("the"));
        assert!(model.contains("mouse"));
        assert!(model.contains("a"));
        assert!(!model.contains("cheese"));
        assert!(!model.contains("kitchen"));
        assert!(model.vectors().iter().all(|v| v.is_finite()));
        assert_eq!(model.vectors().dim(), (model.vocabulary().len(), 16));
    }

    #[test]
    fn cbow_and_skip_gram_both_move_the_vectors() {

        for sg in [0, 1] {
            let h = hyperparameters(json!({"vector_size": 8, "min_count": 1, "epochs": 1, "sg": sg, "seed": 7, "batch_words": 50}));
            let params = Word2VecParams::from_hyperparameters(&h).unwrap();
            let vocabulary = scan_vocabulary(&toy_corpus(), &params).unwrap();

            let initial = TrainingState::new(&vocabulary, &params).syn0;
            let model = Word2VecTrainer::new(1).train(&toy_corpus(), &h).unwrap();
            assert_ne!(model.vectors(), &initial, "sg={} left the vectors untouched", sg);
        }
    }

    #[test]
    fn empty_vocabulary_is_a_training_error() {

        let trainer = Word2VecTrainer::new(1);
        let result = trainer.train(&MemoryCorpus::from_lines(&["one two three"]), &hyperparameters(json!({"min_count": 5})));
        assert!(matches!(result, Err(PipelineError::Training(_))));
    }

    #[test]
    fn worker_hint_is_capped_by_processor_count() {
        assert_eq!(Word2VecTrainer::new(0).workers(), 1);
        assert!(Word2VecTrainer::new(100_000).workers() <= num_cpus::get().max(1));
    }

    #[test]
    fn negative_samples_follow_frequency() {

        let table = NegativeTable::new(&[1000, 1]);
        let mut rng = StdRng::seed_from_u64(3);
        let frequent = (0..1000).filter(|_| table.sample(&mut rng) == 0).count();
        assert!(frequent > 900);
    }

    #[test]
    fn rare_words_are_never_downsampled() {

        let vocabulary = Vocabulary::from_parts(vec!["the".into(), "rare".into()], vec![1_000_000, 1]);
        let keep = keep_probabilities(&vocabulary, 0.001);
        assert!(keep[0] < 0.1);
        assert_eq!(keep[1], 1.0);
    }
}
