
use crate::config::{Config, Topic};
use crate::model::Word2Vec;

use ndarray::prelude::*;
use std::collections::HashSet;

/// Cosine similarity queries over a model's vectors.
pub struct Similarity<'m> {
    model: &'m Word2Vec,
    w: Array2<f32>,
}

impl<'m> Similarity<'m> {

    pub fn new(model: &'m Word2Vec) -> Similarity<'m> {

        // normalize w so each row has l2 norm 1, zero rows stay zero
        let mut w = model.vectors().clone();
        for mut row in w.axis_iter_mut(Axis(0)) {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|a| a / norm);
            }
        }

        Self { model, w }
    }

    pub fn unit_vector(&self, word: &str) -> Option<ArrayView1<'_, f32>> {
        self.model.vocabulary().index_of(word).map(|i| self.w.row(i))
    }

    pub fn similarity(&self, a: &str, b: &str) -> Option<f32> {
        Some(self.unit_vector(a)?.dot(&self.unit_vector(b)?))
    }

    /// The `k` words closest to `vec`, best first, skipping `exclude`.
    pub fn find_k_most_similar(&self, vec: &Array1<f32>, k: usize, exclude: &[&str]) -> Vec<(String, f32)> {

        let excluded: HashSet<usize> = exclude.iter().filter_map(|w| self.model.vocabulary().index_of(w)).collect();

        // multiply all vectors by the query vector
        let scores = self.w.dot(vec);
        let mut indexed_scores: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| !excluded.contains(i))
            .collect();

        // sort by most similar in descending order
        indexed_scores.sort_by(|(_, s), (_, t)| t.total_cmp(s));

        indexed_scores
            .into_iter()
            .take(k)
            .filter_map(|(i, score)| self.model.vocabulary().word(i).map(|w| (w.to_owned(), score)))
            .collect()
    }

    /// Nearest neighbors of `word`, `None` when the word is out of vocabulary.
    pub fn most_similar(&self, word: &str, k: usize) -> Option<Vec<(String, f32)>> {
        let vec = self.unit_vector(word)?.to_owned();
        Some(self.find_k_most_similar(&vec, k, &[word]))
    }

    /// a is to b as c is to ?, answered with b - a + c.
    pub fn analogy(&self, inputs: [&str; 3], k: usize) -> Option<Vec<(String, f32)>> {
        let [a, b, c] = inputs;
        let mut query = &self.unit_vector(b)? - &self.unit_vector(a)? + &self.unit_vector(c)?;
        let norm = query.dot(&query).sqrt();
        if norm > 0.0 {
            query /= norm;
        }
        Some(self.find_k_most_similar(&query, k, &inputs))
    }

    /// Mean pairwise cosine similarity of the topic words the model knows.
    pub fn topic_cohesion(&self, topic: &Topic) -> Option<f32> {

        let known: Vec<ArrayView1<f32>> = topic.words.iter().filter_map(|w| self.unit_vector(w)).collect();
        if known.len() < 2 {
            return None;
        }

        let mut total = 0.0;
        let mut pairs = 0usize;
        for i in 0..known.len() {
            for j in (i + 1)..known.len() {
                total += known[i].dot(&known[j]);
                pairs += 1;
            }
        }
        Some(total / pairs as f32)
    }
}

/// Prints the run summary: the model, the probe word's neighbors and the
/// cohesion of every configured topic.
pub fn print_report(model: &Word2Vec, config: &Config, probe_word: &str, k: usize) {

    println!("{}", model);
    let similarity = Similarity::new(model);

    match similarity.most_similar(probe_word, k) {
        Some(neighbors) => {
            println!("{} most similar words to '{}':", k, probe_word);
            for (i, (word, score)) in neighbors.iter().enumerate() {
                println!("{} : {} ? {} = {}", i, probe_word, word, score);
            }
        }
        None => println!("'{}' is not in the vocabulary", probe_word),
    }

    for topic in config.topics() {
        match similarity.topic_cohesion(topic) {
            Some(cohesion) => println!("topic '{}' cohesion: {:.4}", topic.name, cohesion),
            None => println!("topic '{}' has fewer than two words in the vocabulary", topic.name),
        }
    }
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::model::tests::toy_model;

    fn animals_and_tools() -> Word2Vec {
        toy_model(&[
            ("cat", [1.0, 0.1]),
            ("dog", [0.9, 0.2]),
            ("mouse", [0.8, 0.3]),
            ("hammer", [-0.1, 1.0]),
            ("wrench", [-0.2, 0.9]),
            ("void", [0.0, 0.0]),
        ])
    }

    fn topic(name: &str, words: &[&str]) -> Topic {
        Topic { name: name.into(), words: words.iter().map(|w| w.to_string()).collect() }
    }

    #[test]
    fn most_similar_excludes_the_query_word() {

        let model = animals_and_tools();
        let similarity = Similarity::new(&model);

        let neighbors = similarity.most_similar("cat", 2).unwrap();
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].0, "dog");
        assert_eq!(neighbors[1].0, "mouse");
        assert!(neighbors[0].1 >= neighbors[1].1);

        assert!(similarity.most_similar("unicorn", 3).is_none());
    }

    #[test]
    fn analogy_skips_its_inputs() {

        let model = toy_model(&[
            ("man", [1.0, 0.0]),
            ("woman", [1.0, 1.0]),
            ("king", [3.0, 0.2]),
            ("queen", [3.0, 2.8]),
            ("apple", [-1.0, 0.1]),
        ]);
        let similarity = Similarity::new(&model);

        let answers = similarity.analogy(["man", "woman", "king"], 1).unwrap();
        assert_eq!(answers[0].0, "queen");
        assert!(similarity.analogy(["man", "woman", "prince"], 1).is_none());
    }

    #[test]
    fn cohesive_topics_score_higher() {

        let model = animals_and_tools();
        let similarity = Similarity::new(&model);

        let animals = similarity.topic_cohesion(&topic("animals", &["cat", "dog", "mouse"])).unwrap();
        let mixed = similarity.topic_cohesion(&topic("mixed", &["cat", "hammer", "unknown"])).unwrap();
        assert!(animals > mixed);

        assert!(similarity.topic_cohesion(&topic("lonely", &["cat", "unknown"])).is_none());
    }

    #[test]
    fn zero_vectors_do_not_poison_scores() {

        let model = animals_and_tools();
        let similarity = Similarity::new(&model);
        assert_eq!(similarity.similarity("void", "cat"), Some(0.0));
        let neighbors = similarity.most_similar("hammer", 5).unwrap();
        assert!(neighbors.iter().all(|(_, score)| score.is_finite()));
    }
}
