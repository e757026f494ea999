pub mod config;
pub mod corpus;
pub mod error;
pub mod files_handling;
pub mod model;
pub mod pipeline;
pub mod settings;
pub mod similarity;
pub mod train;
pub mod wiki;

pub use config::{Config, Topic, WordIndex};
pub use error::{PipelineError, Result};
pub use model::Word2Vec;
pub use pipeline::Pipeline;
pub use settings::{Args, Settings};
pub use similarity::Similarity;
