use clap::Parser;
use std::path::{Path, PathBuf};

pub const CACHE_DIR: &str = "out";
pub const MODEL_DIR: &str = "model";
pub const CONFIG_DIR: &str = "config";

/// Command line flags of the training run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "wiki_embeddings",
    version,
    about = "Train word embeddings over a Wikipedia dump and probe their similarities",
)]
pub struct Args {
    /// Location of the Wikipedia dump file (glob pattern, the last match is used)
    #[arg(short = 'w', long, default_value = "dumps/enwiki-*-pages-articles.xml.bz2")]
    pub wiki_dump_file: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip the corpus creation and use a dumped cache file (base directory: out/)
    #[arg(short = 'c', long)]
    pub use_cache: Option<String>,

    /// File name for the cache output (base directory: out/)
    #[arg(short = 'o', long, default_value = "cache.txt")]
    pub cache_output: String,

    /// File name for the saved word vector model (base directory: model/)
    #[arg(short = 'O', long, default_value = "word2vec")]
    pub word_vector_output: String,

    /// File name of word vectors to load instead of training (base directory: model/)
    #[arg(short = 'm', long)]
    pub word_vector_model: Option<String>,

    /// Configuration file to use (base directory: config/)
    #[arg(short = 'C', long, default_value = "default")]
    pub config: String,

    /// Cached documents longer than this are truncated when loaded
    #[arg(long, default_value_t = 100_000)]
    pub max_document_tokens: usize,

    /// Word whose nearest neighbors are printed after the run
    #[arg(long, default_value = "mouse")]
    pub probe_word: String,

    /// Number of neighbors printed per probe
    #[arg(short = 'k', long, default_value_t = 10)]
    pub top_k: usize,
}

/// Everything a run needs, resolved once from the command line and passed
/// explicitly to each stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub dump_pattern: String,
    pub verbose: bool,
    pub cache: Option<PathBuf>,
    pub cache_output: PathBuf,
    pub model_input: Option<PathBuf>,
    pub model_output: PathBuf,
    pub config: PathBuf,
    pub max_document_tokens: usize,
    pub probe_word: String,
    pub top_k: usize,
    pub workers: usize,
}

/// Places `name` under `base` unless it already lives there.
pub fn within(base: &str, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.starts_with(base) {
        path.to_path_buf()
    } else {
        Path::new(base).join(path)
    }
}

fn optional_within(base: &str, name: Option<String>) -> Option<PathBuf> {
    name.filter(|n| !n.is_empty()).map(|n| within(base, &n))
}

impl From<Args> for Settings {
    fn from(args: Args) -> Self {
        Settings {
            dump_pattern: args.wiki_dump_file,
            verbose: args.verbose,
            cache: optional_within(CACHE_DIR, args.use_cache),
            cache_output: within(CACHE_DIR, &args.cache_output),
            model_input: optional_within(MODEL_DIR, args.word_vector_model),
            model_output: within(MODEL_DIR, &args.word_vector_output),
            config: within(CONFIG_DIR, &args.config),
            max_document_tokens: args.max_document_tokens,
            probe_word: args.probe_word,
            top_k: args.top_k,
            workers: num_cpus::get(),
        }
    }
}


#[cfg(test)]
mod tests {

    use super::*;

    fn settings(argv: &[&str]) -> Settings {
        let mut full = vec!["wiki_embeddings"];
        full.extend_from_slice(argv);
        Settings::from(Args::parse_from(full))
    }

    #[test]
    fn defaults_match_the_documented_layout() {

        let s = settings(&[]);
        assert_eq!(s.dump_pattern, "dumps/enwiki-*-pages-articles.xml.bz2");
        assert_eq!(s.cache, None);
        assert_eq!(s.cache_output, PathBuf::from("out/cache.txt"));
        assert_eq!(s.model_input, None);
        assert_eq!(s.model_output, PathBuf::from("model/word2vec"));
        assert_eq!(s.config, PathBuf::from("config/default"));
        assert_eq!(s.max_document_tokens, 100_000);
        assert!(!s.verbose);
        assert!(s.workers >= 1);
    }

    #[test]
    fn base_directories_are_not_doubled() {

        let s = settings(&["-c", "out/enwiki.txt", "-m", "small", "-C", "config/topics.json", "-v"]);
        assert_eq!(s.cache, Some(PathBuf::from("out/enwiki.txt")));
        assert_eq!(s.model_input, Some(PathBuf::from("model/small")));
        assert_eq!(s.config, PathBuf::from("config/topics.json"));
        assert!(s.verbose);
    }

    #[test]
    fn empty_cache_name_means_no_cache() {

        let s = settings(&["--use-cache", ""]);
        assert_eq!(s.cache, None);
    }
}
