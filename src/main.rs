use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use wiki_embeddings::pipeline::ModelOrigin;
use wiki_embeddings::similarity::print_report;
use wiki_embeddings::{Args, Pipeline, Settings};

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {

    let settings = Settings::from(Args::parse());
    init_logging(settings.verbose);

    let outcome = Pipeline::new(settings.clone()).run()?;
    if outcome.model.origin == ModelOrigin::Trained {
        println!("saved word vectors to {}", settings.model_output.display());
    }

    print_report(&outcome.model.model, &outcome.config, &settings.probe_word, settings.top_k);
    Ok(())
}
