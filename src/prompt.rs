//! Prompt assembly: one fixed template embedding the retrieved documents
//! and the user's question.

use std::fmt::Write;

use crate::error::ChatError;
use crate::models::Document;

const TEMPLATE_HEADER: &str = "\
Given the following context, answer the question at the end.
Do not make up facts. Do not use lists. When referring to research
mention the researchers names from the context. The name of the researcher will be given
first, followed by an abstract of the relevant research. The question will follow the context.
Reference the index numbers in the context when replying.

Context:
";

/// Render the RAG prompt. The question is a required variable: absent or
/// blank input fails loudly rather than producing a question-less prompt.
/// A document without the attribution field still renders, content-only.
pub fn build_prompt(question: Option<&str>, documents: &[Document]) -> Result<String, ChatError> {
    let question = match question {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(ChatError::MissingRequiredVariable("question")),
    };

    let mut prompt = String::from(TEMPLATE_HEADER);
    for doc in documents {
        match doc.researcher_name() {
            Some(name) => {
                writeln!(prompt, "    Researcher: {}. Research: {}", name, doc.content)
                    .unwrap();
            }
            None => {
                writeln!(prompt, "    Research: {}", doc.content)
                    .unwrap();
            }
        }
    }

    write!(prompt, "\nQuestion: {question}").unwrap();
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, name: Option<&str>, content: &str) -> Document {
        let mut d = Document::new(id, content);
        if let Some(n) = name {
            d = d.with_meta("researcher_name", n);
        }
        d
    }

    #[test]
    fn test_question_appears_verbatim() {
        let prompt = build_prompt(Some("What is lichen?"), &[]).unwrap();
        assert!(prompt.ends_with("Question: What is lichen?"));
    }

    #[test]
    fn test_documents_render_with_attribution() {
        let docs = vec![
            doc("A", Some("P. Berck"), "Lichen grows on rocks."),
            doc("B", Some("A. Katz"), "Cats sleep a lot."),
        ];
        let prompt = build_prompt(Some("q"), &docs).unwrap();
        assert!(prompt.contains("Researcher: P. Berck. Research: Lichen grows on rocks."));
        assert!(prompt.contains("Researcher: A. Katz. Research: Cats sleep a lot."));
    }

    #[test]
    fn test_every_content_appears_verbatim() {
        let docs = vec![
            doc("A", Some("X"), "alpha content"),
            doc("B", None, "beta content"),
            doc("C", Some("Y"), "gamma content"),
        ];
        let prompt = build_prompt(Some("q"), &docs).unwrap();
        for d in &docs {
            assert!(prompt.contains(&d.content));
        }
    }

    #[test]
    fn test_missing_attribution_falls_back_to_content_only() {
        let docs = vec![doc("A", None, "Anonymous research text.")];
        let prompt = build_prompt(Some("q"), &docs).unwrap();
        assert!(prompt.contains("Research: Anonymous research text."));
        assert!(!prompt.contains("Researcher:"));
    }

    #[test]
    fn test_missing_question_is_an_error() {
        let err = build_prompt(None, &[]).unwrap_err();
        assert!(matches!(err, ChatError::MissingRequiredVariable("question")));
    }

    #[test]
    fn test_blank_question_is_an_error() {
        assert!(build_prompt(Some("   "), &[]).is_err());
    }

    #[test]
    fn test_instructions_present() {
        let prompt = build_prompt(Some("q"), &[]).unwrap();
        assert!(prompt.contains("Do not make up facts."));
        assert!(prompt.contains("Do not use lists."));
    }
}
