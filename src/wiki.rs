//! Streaming extraction of articles from a MediaWiki XML dump.
//!
//! The dump is read line by line (plain, gzip or multi-stream bzip2), pages
//! outside the article namespace and redirects are dropped, wiki markup is
//! stripped and the remaining text is split into lower-cased word tokens.
//! Pages are cleaned in parallel chunks; documents come out in dump order.

use crate::corpus::{Corpus, Document, Documents};
use crate::error::{PipelineError, Result};

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use rayon::prelude::*;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IGNORED_NAMESPACES: [&str; 13] = [
    "Wikipedia", "Category", "File", "Portal", "Template", "MediaWiki", "User",
    "Help", "Book", "Draft", "WikiProject", "Special", "Talk",
];

// link targets with these prefixes are media or categories, never prose
const LINK_NAMESPACES: [&str; 4] = ["file", "image", "category", "media"];

const PAGES_PER_CHUNK: usize = 256;
const MAX_NESTING: usize = 10;

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionOptions {
    pub min_article_tokens: usize,
    pub token_min_len: usize,
    pub token_max_len: usize,
    pub lowercase: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self { min_article_tokens: 50, token_min_len: 2, token_max_len: 15, lowercase: true }
    }
}

/// One `<page>` element as found in the dump, text still XML-escaped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawPage {
    pub title: String,
    pub namespace: String,
    pub redirect: bool,
    pub text: String,
}

impl RawPage {

    pub fn is_article(&self) -> bool {

        let main_namespace = self.namespace.is_empty() || self.namespace == "0";
        let redirect = self.redirect || self.text
            .trim_start()
            .get(..9)
            .map_or(false, |head| head.eq_ignore_ascii_case("#redirect"));
        let ignored_title = self.title
            .split_once(':')
            .map_or(false, |(prefix, _)| IGNORED_NAMESPACES.contains(&prefix));

        main_namespace && !redirect && !ignored_title
    }
}

fn element_text<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    line.strip_prefix('<')?
        .strip_prefix(tag)?
        .strip_prefix('>')?
        .strip_suffix('>')?
        .strip_suffix(tag)?
        .strip_suffix("</")
}

// start of a `<text ...>` element in the line, if any
fn text_start(line: &str) -> Option<usize> {
    let at = line.find("<text")?;
    match line[at + 5..].chars().next() {
        Some(' ') | Some('>') | Some('/') => Some(at),
        _ => None,
    }
}

/// Iterates over the `<page>` elements of a dump.
pub struct Pages<R: BufRead> {
    lines: Lines<R>,
}

impl<R: BufRead> Pages<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines() }
    }
}

impl<R: BufRead> Iterator for Pages<R> {
    type Item = Result<RawPage>;

    fn next(&mut self) -> Option<Self::Item> {

        let mut page: Option<RawPage> = None;
        let mut in_text = false;

        for line in self.lines.by_ref() {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };

            if in_text {
                if let Some(p) = page.as_mut() {
                    match line.find("</text>") {
                        Some(end) => {
                            p.text.push_str(&line[..end]);
                            in_text = false;
                        }
                        None => {
                            p.text.push_str(&line);
                            p.text.push('\n');
                        }
                    }
                }
                continue;
            }

            let trimmed = line.trim();
            if trimmed == "<page>" {
                page = Some(RawPage::default());
                continue;
            }
            if trimmed == "</page>" {
                match page.take() {
                    Some(done) => return Some(Ok(done)),
                    None => continue,
                }
            }
            let Some(p) = page.as_mut() else { continue };

            if let Some(title) = element_text(trimmed, "title") {
                p.title = title.to_owned();
            } else if let Some(ns) = element_text(trimmed, "ns") {
                p.namespace = ns.to_owned();
            } else if trimmed.starts_with("<redirect") {
                p.redirect = true;
            } else if let Some(at) = text_start(trimmed) {
                let element = &trimmed[at..];
                let Some(gt) = element.find('>') else { continue };
                if element[..gt].ends_with('/') {
                    continue;
                }
                let rest = &element[gt + 1..];
                match rest.find("</text>") {
                    Some(end) => p.text.push_str(&rest[..end]),
                    None => {
                        p.text.push_str(rest);
                        p.text.push('\n');
                        in_text = true;
                    }
                }
            }
        }

        None
    }
}

/// Compiled patterns for stripping wiki markup.
pub struct Markup {
    entity: Regex,
    comment: Regex,
    reference: Regex,
    template: Regex,
    table: Regex,
    link: Regex,
    external: Regex,
    tag: Regex,
    quotes: Regex,
    token: Regex,
}

// applies `re` until the text stops changing, innermost matches first
fn remove_nested(re: &Regex, mut text: String) -> String {
    for _ in 0..MAX_NESTING {
        let replaced = match re.replace_all(&text, "") {
            Cow::Borrowed(_) => break,
            Cow::Owned(replaced) => replaced,
        };
        text = replaced;
    }
    text
}

fn is_namespaced_link(target: &str) -> bool {
    match target.split_once(':') {
        Some((prefix, _)) => {
            let prefix = prefix.trim().to_lowercase();
            let interwiki = (2..=3).contains(&prefix.len()) && prefix.chars().all(|c| c.is_ascii_lowercase());
            interwiki || LINK_NAMESPACES.contains(&prefix.as_str())
        }
        None => false,
    }
}

impl Markup {

    pub fn new() -> Result<Markup> {
        Ok(Markup {
            entity: Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);")?,
            comment: Regex::new(r"(?s)<!--.*?-->")?,
            reference: Regex::new(r"(?s)<ref[^>]*?/>|<ref[^>]*>.*?</ref>")?,
            template: Regex::new(r"\{\{[^{}]*\}\}")?,
            table: Regex::new(r"(?s)\{\|.*?\|\}")?,
            link: Regex::new(r"\[\[([^\[\]|]*)(?:\|([^\[\]]*))?\]\]")?,
            external: Regex::new(r"\[(?:https?|ftp)://[^\s\]]*\s*([^\]]*)\]")?,
            tag: Regex::new(r"<[^>]*>")?,
            quotes: Regex::new(r"'{2,}")?,
            token: Regex::new(r"\p{L}+")?,
        })
    }

    pub fn decode_entities<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.entity.replace_all(text, |caps: &Captures| {
            let name = &caps[1];
            let decoded = match name {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" | "ndash" | "mdash" => Some(' '),
                _ => {
                    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        name.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok())
                    };
                    code.and_then(char::from_u32)
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
    }

    fn resolve_links(&self, mut text: String) -> String {
        for _ in 0..MAX_NESTING {
            let replaced = match self.link.replace_all(&text, |caps: &Captures| {
                let target = caps.get(1).map_or("", |m| m.as_str());
                if is_namespaced_link(target) {
                    String::new()
                } else {
                    caps.get(2).map_or(target, |m| m.as_str()).to_string()
                }
            }) {
                Cow::Borrowed(_) => break,
                Cow::Owned(replaced) => replaced,
            };
            text = replaced;
        }
        text
    }

    /// Strips markup from escaped page text, leaving readable prose.
    pub fn clean(&self, escaped: &str) -> String {

        let text = self.decode_entities(escaped).into_owned();
        let text = self.comment.replace_all(&text, "").into_owned();
        let text = self.reference.replace_all(&text, "").into_owned();
        let text = remove_nested(&self.template, text);
        let text = remove_nested(&self.table, text);
        let text = self.resolve_links(text);
        let text = self.external.replace_all(&text, "$1").into_owned();
        let text = self.tag.replace_all(&text, " ").into_owned();
        let text = self.decode_entities(&text).into_owned();
        self.quotes.replace_all(&text, "").into_owned()
    }

    pub fn tokenize(&self, text: &str, options: &ExtractionOptions) -> Document {
        self.token
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|token| {
                let n = token.chars().count();
                n >= options.token_min_len && n <= options.token_max_len
            })
            .map(|token| if options.lowercase { token.to_lowercase() } else { token.to_owned() })
            .collect()
    }
}

/// Opens a dump, decompressing by file extension.
pub fn open_dump(path: &Path) -> Result<Box<dyn BufRead>> {

    let f = BufReader::new(File::open(path)?);
    let reader: Box<dyn BufRead> = match path.extension().and_then(|e| e.to_str()) {
        Some("bz2") => Box::new(BufReader::new(MultiBzDecoder::new(f))),
        Some("gz") => Box::new(BufReader::new(MultiGzDecoder::new(f))),
        _ => Box::new(f),
    };
    Ok(reader)
}

/// Articles of a dump as a corpus. Every pass re-reads the dump.
pub struct WikiCorpus {
    path: PathBuf,
    markup: Markup,
    options: ExtractionOptions,
}

impl WikiCorpus {

    pub fn open(path: &Path, options: ExtractionOptions) -> Result<WikiCorpus> {
        Ok(WikiCorpus { path: path.to_path_buf(), markup: Markup::new()?, options })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The token list of an article page, `None` for pages that are skipped.
    pub fn process_page(&self, page: &RawPage) -> Option<Document> {
        if !page.is_article() {
            return None;
        }
        let tokens = self.markup.tokenize(&self.markup.clean(&page.text), &self.options);
        (tokens.len() >= self.options.min_article_tokens).then_some(tokens)
    }
}

impl Corpus for WikiCorpus {
    fn documents(&self) -> Result<Documents<'_>> {
        let pages = Pages::new(open_dump(&self.path)?);
        Ok(Box::new(Articles {
            pages,
            corpus: self,
            ready: VecDeque::new(),
            failure: None,
            exhausted: false,
            pages_seen: 0,
            articles_kept: 0,
        }))
    }
}

struct Articles<'a> {
    pages: Pages<Box<dyn BufRead>>,
    corpus: &'a WikiCorpus,
    ready: VecDeque<Document>,
    failure: Option<PipelineError>,
    exhausted: bool,
    pages_seen: usize,
    articles_kept: usize,
}

impl Articles<'_> {

    fn fill(&mut self) {

        let mut chunk: Vec<RawPage> = Vec::with_capacity(PAGES_PER_CHUNK);
        while chunk.len() < PAGES_PER_CHUNK {
            match self.pages.next() {
                Some(Ok(page)) => chunk.push(page),
                Some(Err(e)) => {
                    self.failure = Some(e);
                    break;
                }
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        let corpus = self.corpus;
        let documents: Vec<Option<Document>> = chunk.par_iter().map(|page| corpus.process_page(page)).collect();

        let before = self.ready.len();
        self.ready.extend(documents.into_iter().flatten());
        self.pages_seen += chunk.len();
        self.articles_kept += self.ready.len() - before;
        debug!("scanned {} pages, kept {} articles", self.pages_seen, self.articles_kept);

        if self.exhausted {
            info!(
                "finished iterating over {}: kept {} articles out of {} pages",
                corpus.path.display(), self.articles_kept, self.pages_seen
            );
        }
    }
}

impl Iterator for Articles<'_> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(document) = self.ready.pop_front() {
                return Some(Ok(document));
            }
            if let Some(e) = self.failure.take() {
                self.exhausted = true;
                return Some(Err(e));
            }
            if self.exhausted {
                return None;
            }
            self.fill();
        }
    }
}

/// Turns a located dump into a corpus.
pub trait Extractor {
    fn extract(&self, dump: &Path) -> Result<Box<dyn Corpus>>;
}

#[derive(Clone, Debug, Default)]
pub struct WikiExtractor {
    options: ExtractionOptions,
}

impl WikiExtractor {
    pub fn new(options: ExtractionOptions) -> Self {
        Self { options }
    }
}

impl Extractor for WikiExtractor {
    fn extract(&self, dump: &Path) -> Result<Box<dyn Corpus>> {
        Ok(Box::new(WikiCorpus::open(dump, self.options.clone())?))
    }
}
