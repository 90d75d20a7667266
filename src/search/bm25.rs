use anyhow::{Context, Result};
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexWriter, ReloadPolicy};

use crate::llm::rerank::sigmoid;
use crate::models::Document;

/// BM25 lexical index built on tantivy.
///
/// Only document ids travel out of the index; hits are resolved back to the
/// document store by id, so the reranker can never see a candidate the
/// store cannot resolve.
pub struct Bm25Index {
    index: Index,
    f_id: Field,
    f_researcher_name: Field,
    f_title: Field,
    f_content: Field,
}

/// A lexical hit: document id plus a BM25 score. When `scale` was
/// requested the score is mapped into [0,1] at this boundary; otherwise it
/// is the raw BM25 value and must not be compared with other stages.
#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub id: String,
    pub score: f32,
}

impl Bm25Index {
    /// Create or open a BM25 index at the given directory.
    pub fn open_or_create(index_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_dir)?;

        let mut schema_builder = Schema::builder();
        let f_id = schema_builder.add_text_field("id", STRING | STORED);
        let f_researcher_name = schema_builder.add_text_field("researcher_name", TEXT);
        let f_title = schema_builder.add_text_field("title", TEXT);
        let f_content = schema_builder.add_text_field("content", TEXT);
        let schema = schema_builder.build();

        let index = if index_dir.join("meta.json").exists() {
            Index::open_in_dir(index_dir).context("Failed to open existing tantivy index")?
        } else {
            Index::create_in_dir(index_dir, schema).context("Failed to create tantivy index")?
        };

        Ok(Self {
            index,
            f_id,
            f_researcher_name,
            f_title,
            f_content,
        })
    }

    /// Index a batch of documents.
    pub fn index_documents(&self, documents: &[Document]) -> Result<()> {
        let mut writer: IndexWriter = self
            .index
            .writer(50_000_000)
            .context("Failed to create index writer")?;

        for document in documents {
            writer.add_document(doc!(
                self.f_id => document.id.clone(),
                self.f_researcher_name => document.researcher_name().unwrap_or_default(),
                self.f_title => document.title().unwrap_or_default(),
                self.f_content => document.content.clone(),
            ))?;
        }

        writer.commit().context("Failed to commit index")?;
        Ok(())
    }

    /// Search the index and return scored hits, best first.
    ///
    /// With `scale` set, raw BM25 scores are squashed into [0,1] with
    /// `sigmoid(score / 8)`, monotonic, so ordering is unaffected.
    pub fn search(&self, query_str: &str, top_k: usize, scale: bool) -> Result<Vec<Bm25Hit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .context("Failed to create reader")?;

        let searcher = reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.f_content, self.f_title, self.f_researcher_name],
        );
        // Free-text questions contain characters tantivy's query syntax
        // assigns meaning to; fall back to a lenient parse.
        let (query, _errors) = query_parser.parse_query_lenient(query_str);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(top_k))
            .context("Search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let stored: TantivyDocument = searcher
                .doc(doc_address)
                .context("Failed to retrieve document")?;

            let id = stored
                .get_first(self.f_id)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                continue;
            }

            let score = if scale { sigmoid(score / 8.0) } else { score };
            hits.push(Bm25Hit { id, score });
        }

        Ok(hits)
    }
}
