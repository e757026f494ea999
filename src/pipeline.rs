
use crate::config::{Config, Hyperparameters};
use crate::corpus::{write_cache, Corpus, LineCorpus};
use crate::error::{PipelineError, Result};
use crate::files_handling::{read_input, save_output, ReadFile, SaveFile};
use crate::settings::Settings;
use crate::train::{Trainer, Word2VecTrainer};
use crate::wiki::{Extractor, WikiExtractor};

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Where the corpus of a run comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorpusPlan {
    LoadCache(PathBuf),
    Extract,
}

/// A cache is used only when its path is non-empty and names an existing file.
pub fn plan_corpus(cache: Option<&Path>) -> CorpusPlan {
    match cache {
        Some(path) if !path.as_os_str().is_empty() && path.is_file() => CorpusPlan::LoadCache(path.to_path_buf()),
        _ => CorpusPlan::Extract,
    }
}

/// Resolves a glob pattern to its lexicographically last match.
pub fn resolve_dump(pattern: &str) -> Result<PathBuf> {

    let mut matches: Vec<PathBuf> = glob::glob(pattern)?.filter_map(|entry| entry.ok()).collect();
    matches.sort();
    debug!("dump pattern {} matched {} files", pattern, matches.len());

    matches.pop().ok_or_else(|| PipelineError::DumpNotFound(pattern.to_owned()))
}

/// Produces the corpus for training, either from a previous cache or by
/// extracting the dump while writing a fresh cache.
pub fn resolve_corpus<E: Extractor + ?Sized>(settings: &Settings, extractor: &E) -> Result<Box<dyn Corpus>> {

    match plan_corpus(settings.cache.as_deref()) {
        CorpusPlan::LoadCache(path) => {
            info!("loading corpus from cache {}", path.display());
            Ok(Box::new(LineCorpus::new(path, settings.max_document_tokens)))
        }
        CorpusPlan::Extract => {
            if let Some(cache) = &settings.cache {
                info!("cache {} is not usable, extracting the dump", cache.display());
            }

            let dump = resolve_dump(&settings.dump_pattern)?;
            info!("extracting corpus from {}", dump.display());
            let corpus = extractor.extract(&dump)?;

            let timer = Instant::now();
            let written = write_cache(corpus.as_ref(), &settings.cache_output)?;
            info!("cached {} documents to {}, took {} seconds", written, settings.cache_output.display(), timer.elapsed().as_secs());

            Ok(corpus)
        }
    }
}

/// Where the model of a run comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelPlan {
    Load(PathBuf),
    Train,
}

pub fn plan_model(model_input: Option<&Path>) -> ModelPlan {
    match model_input {
        Some(path) if path.exists() => ModelPlan::Load(path.to_path_buf()),
        _ => ModelPlan::Train,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelOrigin {
    Loaded,
    Trained,
}

#[derive(Debug)]
pub struct ResolvedModel<M> {
    pub model: M,
    pub origin: ModelOrigin,
}

/// Loads the model at `model_input` when it exists. Otherwise trains a new
/// one and always saves it to `model_output`.
pub fn resolve_model<T>(
    model_input: Option<&Path>,
    model_output: &Path,
    corpus: &dyn Corpus,
    hyperparameters: &Hyperparameters,
    trainer: &T,
) -> Result<ResolvedModel<T::Model>>
where
    T: Trainer + ?Sized,
    T::Model: ReadFile + SaveFile,
{
    match plan_model(model_input) {
        ModelPlan::Load(path) => {
            info!("loading word vector model from {}", path.display());
            let model = read_input::<T::Model>(&path)?;
            Ok(ResolvedModel { model, origin: ModelOrigin::Loaded })
        }
        ModelPlan::Train => {
            if let Some(path) = model_input {
                info!("model {} does not exist, training a new one", path.display());
            }

            let timer = Instant::now();
            info!("starting training part...");
            let model = trainer.train(corpus, hyperparameters)?;
            info!("finished training, took {} seconds", timer.elapsed().as_secs());

            save_output(model_output, &model)?;
            info!("saved word vector model to {}", model_output.display());
            Ok(ResolvedModel { model, origin: ModelOrigin::Trained })
        }
    }
}

/// What a completed run hands to its caller.
#[derive(Debug)]
pub struct Outcome<M> {
    pub config: Config,
    pub model: ResolvedModel<M>,
}

/// Runs configuration, corpus and model stages one after the other.
pub struct Pipeline<E = WikiExtractor, T = Word2VecTrainer> {
    settings: Settings,
    extractor: E,
    trainer: T,
}

impl Pipeline {

    pub fn new(settings: Settings) -> Pipeline {
        let trainer = Word2VecTrainer::new(settings.workers);
        Pipeline { settings, extractor: WikiExtractor::default(), trainer }
    }
}

impl<E, T> Pipeline<E, T>
where
    E: Extractor,
    T: Trainer,
    T::Model: ReadFile + SaveFile,
{
    pub fn with_parts(settings: Settings, extractor: E, trainer: T) -> Self {
        Pipeline { settings, extractor, trainer }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn run(&self) -> Result<Outcome<T::Model>> {

        info!("entering program...");
        let timer = Instant::now();

        info!("loading configuration from {}", self.settings.config.display());
        let config = Config::load(&self.settings.config)?;
        info!("{}", config);

        let corpus = resolve_corpus(&self.settings, &self.extractor)?;

        let model = resolve_model(
            self.settings.model_input.as_deref(),
            &self.settings.model_output,
            corpus.as_ref(),
            config.hyperparameters(),
            &self.trainer,
        )?;

        info!("run finished in {} seconds", timer.elapsed().as_secs());
        Ok(Outcome { config, model })
    }
}
