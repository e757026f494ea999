
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use wiki_embeddings::files_handling::read_input;
use wiki_embeddings::{Config, Similarity, Word2Vec};

// checks on trained vectors, treated as a separate binary so it can be run
// without going through the training pipeline

#[derive(Parser, Debug)]
#[command(name = "probe", about = "Query a saved word vector model")]
struct Cli {
    /// Saved word vector model
    #[arg(short = 'm', long, default_value = "model/word2vec")]
    model: PathBuf,

    /// Number of answers printed per query
    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Each line holds a quartet `a b c d`: a is to b as c is to d
    Analogies { input: PathBuf },
    /// Each line holds one word
    Similar { input: PathBuf },
    /// Topic cohesion for every topic in a configuration file
    Topics { config: PathBuf },
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let f = File::open(path).with_context(|| format!("could not open input file {}", path.display()))?;
    let mut lines = Vec::new();
    for line in BufReader::new(f).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn run_analogies(inputs: &[String], k: usize, similarity: &Similarity) -> Result<()> {

    // a is to b as c is to ? translates to b - a + c : ?
    for input in inputs {

        let words: Vec<&str> = input.split_whitespace().collect();
        let [a, b, c, target] = words[..] else {
            bail!("expected four words per line, got `{}`", input);
        };

        let Some(analogies) = similarity.analogy([a, b, c], k) else {
            println!("skipping '{}', a word is not in the vocabulary\n", input);
            continue;
        };

        let mut found_target = false;
        for (i, (analogy, score)) in analogies.iter().enumerate() {
            println!("{} : {} - {} + {} ? {} = {}", i, b, a, c, analogy, score);
            if analogy == target {
                found_target = true;
                println!("found target '{}' analogy in place {}", target, 1 + i);
            }
        }

        if !found_target {
            println!("target '{}' was not found within the first {} analogies", target, k);
        }
        println!();
    }
    Ok(())
}

fn run_similarity(inputs: &[String], k: usize, similarity: &Similarity) {

    for token in inputs.iter().map(|t| t.trim()) {

        println!("searching {} most similar words to {}", k, token);
        match similarity.most_similar(token, k) {
            Some(neighbors) => {
                for (i, (similar_token, score)) in neighbors.iter().enumerate() {
                    println!("{} : {} ? {} = {}", i, token, similar_token, score);
                }
            }
            None => println!("'{}' is not in the vocabulary", token),
        }
        println!();
    }
}

fn run_topics(config: &Config, similarity: &Similarity) {

    for topic in config.topics() {
        match similarity.topic_cohesion(topic) {
            Some(cohesion) => println!("{} : {:.4}", topic.name, cohesion),
            None => println!("{} : fewer than two words in the vocabulary", topic.name),
        }
    }

    let overlapping = config.index().overlapping_words();
    if !overlapping.is_empty() {
        let words: Vec<&str> = overlapping.iter().map(String::as_str).collect();
        println!("words shared between topics: {}", words.join(", "));
    }
}

fn main() -> Result<()> {

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let model: Word2Vec = read_input(&cli.model)?;
    println!("{}", model);
    let similarity = Similarity::new(&model);

    match &cli.command {
        Command::Analogies { input } => run_analogies(&read_lines(input)?, cli.top_k, &similarity)?,
        Command::Similar { input } => run_similarity(&read_lines(input)?, cli.top_k, &similarity),
        Command::Topics { config } => run_topics(&Config::load(config)?, &similarity),
    }
    Ok(())
}
