
use crate::error::{PipelineError, Result};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Embedding hyperparameters, kept exactly as they appear under `word2vec`
/// in the configuration file. Only the trainer gives the values meaning.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(Map<String, Value>);

impl Hyperparameters {

    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // first alias that is present wins
    fn lookup<'a>(&'a self, names: &[&'a str]) -> Option<(&'a str, &'a Value)> {
        names.iter().find_map(|name| self.0.get(*name).map(|value| (*name, value)))
    }

    pub fn usize_or(&self, names: &[&str], default: usize) -> Result<usize> {
        match self.lookup(names) {
            Some((name, value)) => value
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| PipelineError::hyperparameter(name, format!("expected a non-negative integer, got {}", value))),
            None => Ok(default),
        }
    }

    pub fn f32_or(&self, names: &[&str], default: f32) -> Result<f32> {
        match self.lookup(names) {
            Some((name, value)) => value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| PipelineError::hyperparameter(name, format!("expected a number, got {}", value))),
            None => Ok(default),
        }
    }

    /// Accepts JSON booleans as well as the 0/1 integers gensim configs use.
    pub fn flag_or(&self, names: &[&str], default: bool) -> Result<bool> {
        match self.lookup(names) {
            Some((_, Value::Bool(flag))) => Ok(*flag),
            Some((name, value)) => match value.as_u64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(PipelineError::hyperparameter(name, format!("expected true/false or 0/1, got {}", value))),
            },
            None => Ok(default),
        }
    }

    pub fn optional_usize(&self, names: &[&str]) -> Result<Option<usize>> {
        match self.lookup(names) {
            Some((_, Value::Null)) | None => Ok(None),
            Some(_) => self.usize_or(names, 0).map(Some),
        }
    }
}

/// A named group of words used for similarity probing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub words: Vec<String>,
}

/// Which topics own which words.
///
/// Every topic word lands in exactly one partition: words owned by a single
/// topic are non-overlapping (mapped to that topic), words owned by two or
/// more distinct topics are overlapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WordIndex {
    owners: BTreeMap<String, Vec<String>>,
    non_overlapping: BTreeMap<String, String>,
    overlapping: BTreeSet<String>,
}

impl WordIndex {

    pub fn build(topics: &[Topic]) -> WordIndex {

        // owners are recorded in topic order, once per topic
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for topic in topics {
            for word in &topic.words {
                let names = owners.entry(word.to_owned()).or_default();
                if !names.contains(&topic.name) {
                    names.push(topic.name.to_owned());
                }
            }
        }

        let mut non_overlapping = BTreeMap::new();
        let mut overlapping = BTreeSet::new();
        for (word, names) in &owners {
            if names.len() > 1 {
                overlapping.insert(word.to_owned());
            } else if let Some(first) = names.first() {
                non_overlapping.insert(word.to_owned(), first.to_owned());
            }
        }

        WordIndex { owners, non_overlapping, overlapping }
    }

    /// Topic names owning `word`, in the order the topics were declared.
    pub fn owners(&self, word: &str) -> Option<&[String]> {
        self.owners.get(word).map(Vec::as_slice)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(String::as_str)
    }

    pub fn non_overlapping_words(&self) -> &BTreeMap<String, String> {
        &self.non_overlapping
    }

    pub fn overlapping_words(&self) -> &BTreeSet<String> {
        &self.overlapping
    }

    pub fn is_overlapping(&self, word: &str) -> bool {
        self.overlapping.contains(word)
    }
}

#[derive(Deserialize)]
struct RawConfig {
    word2vec: Hyperparameters,
    topics: Vec<Topic>,
}

#[derive(Clone, Debug)]
pub struct Config {
    hyperparameters: Hyperparameters,
    topics: Vec<Topic>,
    index: WordIndex,
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.topics.iter().map(|t| t.name.as_str()).collect();
        write!(f, "using configuration:
        word2vec: {}
        topics: {}
        non-overlapping words: {}
        overlapping words: {}",
        serde_json::Value::Object(self.hyperparameters.0.clone()), names.join(", "),
        self.index.non_overlapping.len(), self.index.overlapping.len())
    }
}

impl Config {

    pub fn load(path: &Path) -> Result<Config> {

        if !path.is_file() {
            return Err(PipelineError::ConfigNotFound(path.to_path_buf()));
        }

        let f = BufReader::new(File::open(path)?);
        Config::from_reader(f).map_err(|source| PipelineError::ConfigParse { path: path.to_path_buf(), source })
    }

    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Config, serde_json::Error> {
        let raw: RawConfig = serde_json::from_reader(reader)?;
        Ok(Config::new(raw.word2vec, raw.topics))
    }

    pub fn new(hyperparameters: Hyperparameters, topics: Vec<Topic>) -> Config {
        let index = WordIndex::build(&topics);
        Config { hyperparameters, topics, index }
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Looks up a topic by name, `None` when no topic has that name.
    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.name == name)
    }

    pub fn index(&self) -> &WordIndex {
        &self.index
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use std::collections::BTreeSet;
    use std::fs;

    const ANIMALS_AND_TECH: &str = r#"{
        "word2vec": {"size": 50, "window": 3, "sg": 1},
        "topics": [
            {"name": "animals", "words": ["cat", "dog", "mouse"]},
            {"name": "computers", "words": ["keyboard", "mouse", "screen"]},
            {"name": "home", "words": ["screen", "sofa", "cat"]}
        ]
    }"#;

    fn topic(name: &str, words: &[&str]) -> Topic {
        Topic { name: name.to_owned(), words: words.iter().map(|w| w.to_string()).collect() }
    }

    #[test]
    fn partitions_words_by_owner_count() {

        let config = Config::from_reader(ANIMALS_AND_TECH.as_bytes()).unwrap();
        let index = config.index();

        let overlapping: Vec<&str> = index.overlapping_words().iter().map(String::as_str).collect();
        assert_eq!(overlapping, vec!["cat", "mouse", "screen"]);

        let non_overlapping = index.non_overlapping_words();
        assert_eq!(non_overlapping.get("dog").map(String::as_str), Some("animals"));
        assert_eq!(non_overlapping.get("keyboard").map(String::as_str), Some("computers"));
        assert_eq!(non_overlapping.get("sofa").map(String::as_str), Some("home"));
        assert_eq!(non_overlapping.len(), 3);

        assert_eq!(index.owners("mouse").unwrap(), &["animals".to_string(), "computers".to_string()]);
    }

    #[test]
    fn partitions_are_disjoint_and_cover_every_word() {

        let config = Config::from_reader(ANIMALS_AND_TECH.as_bytes()).unwrap();
        let index = config.index();

        let all: BTreeSet<String> = config.topics().iter().flat_map(|t| t.words.iter().cloned()).collect();
        let non_overlapping: BTreeSet<String> = index.non_overlapping_words().keys().cloned().collect();

        assert!(non_overlapping.is_disjoint(index.overlapping_words()));
        let union: BTreeSet<String> = non_overlapping.union(index.overlapping_words()).cloned().collect();
        assert_eq!(union, all);
    }

    #[test]
    fn overlapping_membership_does_not_depend_on_topic_order() {

        let a = topic("a", &["x", "y"]);
        let b = topic("b", &["y", "z"]);
        let c = topic("c", &["z", "w"]);

        let forward = WordIndex::build(&[a.clone(), b.clone(), c.clone()]);
        let backward = WordIndex::build(&[c, b, a]);
        assert_eq!(forward.overlapping_words(), backward.overlapping_words());
    }

    #[test]
    fn repeated_word_inside_one_topic_is_not_overlapping() {

        let index = WordIndex::build(&[topic("colors", &["red", "red", "blue"])]);
        assert!(index.overlapping_words().is_empty());
        assert_eq!(index.non_overlapping_words().get("red").map(String::as_str), Some("colors"));
    }

    #[test]
    fn topic_lookup_returns_none_for_unknown_name() {

        let config = Config::from_reader(ANIMALS_AND_TECH.as_bytes()).unwrap();
        assert_eq!(config.topic("computers").unwrap().words.len(), 3);
        assert!(config.topic("politics").is_none());
    }

    #[test]
    fn hyperparameters_are_passed_through() {

        let config = Config::from_reader(ANIMALS_AND_TECH.as_bytes()).unwrap();
        let params = config.hyperparameters();
        assert_eq!(params.usize_or(&["vector_size", "size"], 100).unwrap(), 50);
        assert_eq!(params.usize_or(&["min_count"], 5).unwrap(), 5);
        assert!(params.flag_or(&["sg"], false).unwrap());
        assert_eq!(params.names().count(), 3);
    }

    #[test]
    fn wrong_hyperparameter_type_is_rejected() {

        let config = Config::from_reader(r#"{"word2vec": {"window": "wide"}, "topics": []}"#.as_bytes()).unwrap();
        match config.hyperparameters().usize_or(&["window"], 5) {
            Err(PipelineError::Hyperparameter { name, .. }) => assert_eq!(name, "window"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_config_not_found() {

        let dir = tempfile::tempdir().unwrap();
        match Config::load(&dir.path().join("absent.json")) {
            Err(PipelineError::ConfigNotFound(path)) => assert!(path.ends_with("absent.json")),
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn malformed_or_incomplete_json_is_a_parse_error() {

        let dir = tempfile::tempdir().unwrap();

        let broken = dir.path().join("broken");
        fs::write(&broken, "{\"word2vec\": {").unwrap();
        assert!(matches!(Config::load(&broken), Err(PipelineError::ConfigParse { .. })));

        let no_topics = dir.path().join("no_topics");
        fs::write(&no_topics, "{\"word2vec\": {}}").unwrap();
        assert!(matches!(Config::load(&no_topics), Err(PipelineError::ConfigParse { .. })));
    }
}
