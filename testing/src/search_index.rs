//! In-memory search engine.
//!
//! Evaluates [`SearchQuery`] clauses against stored documents with the usual
//! full-text semantics:
//! - text fields are tokenized on non-alphanumeric characters and matched
//!   case-insensitively; every query token must be present
//! - atoms match exactly
//! - numbers compare numerically and dates compare at day granularity
//! - a clause on a field the document lacks does not match (so its negation
//!   does)

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a test panic

use conference_central_core::Operator;
use conference_central_core::search::{
    Clause, Document, FieldValue, Operand, SearchEngine, SearchError, SearchFuture, SearchIndex,
    SearchQuery,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory search engine holding any number of named indexes.
#[derive(Clone, Debug, Default)]
pub struct InMemorySearchEngine {
    indexes: Arc<RwLock<HashMap<String, Arc<InMemorySearchIndex>>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySearchEngine {
    /// Create an engine with no indexes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every index operation fail with [`SearchError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The concrete index called `name`, created if needed.
    #[must_use]
    pub fn index(&self, name: &str) -> Arc<InMemorySearchIndex> {
        let mut indexes = self.indexes.write().unwrap();
        Arc::clone(indexes.entry(name.to_string()).or_insert_with(|| {
            Arc::new(InMemorySearchIndex {
                name: name.to_string(),
                documents: RwLock::new(BTreeMap::new()),
                unavailable: Arc::clone(&self.unavailable),
            })
        }))
    }
}

impl SearchEngine for InMemorySearchEngine {
    fn open(&self, name: &str) -> Result<Arc<dyn SearchIndex>, SearchError> {
        let index: Arc<dyn SearchIndex> = self.index(name);
        Ok(index)
    }
}

/// One in-memory index.
#[derive(Debug)]
pub struct InMemorySearchIndex {
    name: String,
    documents: RwLock<BTreeMap<String, Document>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemorySearchIndex {
    /// Stored document by id, bypassing availability checks.
    #[must_use]
    pub fn document(&self, doc_id: &str) -> Option<Document> {
        self.documents.read().unwrap().get(doc_id).cloned()
    }

    /// Store a document directly, bypassing availability checks.
    pub fn insert(&self, doc_id: impl Into<String>, document: Document) {
        self.documents
            .write()
            .unwrap()
            .insert(doc_id.into(), document);
    }

    /// Number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), SearchError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchError::Unavailable(format!(
                "index {} offline",
                self.name
            )));
        }
        Ok(())
    }
}

impl SearchIndex for InMemorySearchIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn put(&self, doc_id: String, document: Document) -> SearchFuture<'_, ()> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.check_available()?;
            if doc_id.is_empty() {
                return Err(SearchError::InvalidDocument("empty document id".into()));
            }
            self.insert(doc_id, document);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, doc_id: &'a str) -> SearchFuture<'a, ()> {
        Box::pin(async move {
            self.check_available()?;
            self.documents.write().unwrap().remove(doc_id);
            Ok(())
        })
    }

    fn search<'a>(&'a self, query: &'a SearchQuery) -> SearchFuture<'a, Vec<(String, Document)>> {
        Box::pin(async move {
            self.check_available()?;
            let documents = self.documents.read().unwrap();
            Ok(documents
                .iter()
                .filter(|(_, doc)| query.clauses.iter().all(|clause| clause_matches(clause, doc)))
                .map(|(id, doc)| (id.clone(), doc.clone()))
                .collect())
        })
    }

    fn list(&self) -> SearchFuture<'_, Vec<(String, Document)>> {
        Box::pin(async move {
            self.check_available()?;
            let documents = self.documents.read().unwrap();
            Ok(documents
                .iter()
                .map(|(id, doc)| (id.clone(), doc.clone()))
                .collect())
        })
    }
}

fn clause_matches(clause: &Clause, document: &Document) -> bool {
    let positive = document
        .get(&clause.field)
        .is_some_and(|value| value_matches(value, clause.operator, &clause.operand));
    positive != clause.negated
}

fn value_matches(value: &FieldValue, operator: Operator, operand: &Operand) -> bool {
    match (value, operand) {
        (FieldValue::Text(text) | FieldValue::Atom(text), Operand::Tokens(tokens)) => {
            let present = tokenize(text);
            let found = tokens
                .iter()
                .all(|token| present.contains(&token.to_lowercase()));
            if operator == Operator::Ne { !found } else { found }
        }
        (FieldValue::Atom(atom), Operand::Atom(expected)) => {
            operator.accepts(atom.as_str().cmp(expected.as_str()))
        }
        (FieldValue::Number(n), Operand::Number(expected)) => operator.accepts(n.cmp(expected)),
        (FieldValue::Date(date), Operand::Date(expected)) => {
            operator.accepts(date.date_naive().cmp(expected))
        }
        _ => false,
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
