//! Chat prompts for document question answering.
//!
//! Every prompt lives here so the wording can change without touching the
//! request plumbing in [`crate::pipeline::ocr`].

use crate::pipeline::markdown_tables::ExtractedTable;

/// System prompt for questions about an uploaded, OCR'd document whose
/// tables were replaced by `[TABLE_n]` tokens.
pub const OCR_CHAT_SYSTEM_PROMPT: &str = "You are an expert consultant helping with document \
analysis. Use the document content to answer user questions as accurately as possible. If the \
document doesn't contain information needed to answer the question, be honest about it. When \
referring to tables, use the table numbers provided.";

/// System prompt for questions about caller-supplied document text.
pub const DOCUMENT_CHAT_SYSTEM_PROMPT: &str = "You are an expert consultant helping with \
document analysis. Use the document content to answer user questions as accurately as possible. \
If the document doesn't contain information needed to answer the question, be honest about it.";

/// Build the user turn: document text, the question, then a one-line
/// summary per spliced table (numbered from 1, listing its headers).
pub fn document_prompt(document_text: &str, question: &str, tables: &[ExtractedTable]) -> String {
    let mut prompt = format!("Document Content:\n\n{document_text}\n\nUser Question: {question}");
    if !tables.is_empty() {
        prompt.push_str("\n\nThis document contains the following tables:\n");
        for (i, table) in tables.iter().enumerate() {
            prompt.push_str(&format!("Table {}: {}\n", i + 1, table.headers.join(", ")));
        }
    }
    prompt
}
