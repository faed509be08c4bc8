use crate::config::TaggingConfig;

pub const EXCERPT_CHARS: usize = 3000;

/// First [`EXCERPT_CHARS`] characters of the OCR text.
pub fn excerpt(content: &str) -> &str {
    match content.char_indices().nth(EXCERPT_CHARS) {
        Some((index, _)) => &content[..index],
        None => content,
    }
}

fn name_list(names: &[&str]) -> String {
    if names.is_empty() {
        "None".to_string()
    } else {
        serde_json::to_string_pretty(names).unwrap_or_else(|_| names.join(", "))
    }
}

pub fn correspondent(content: &str, known: &[&str]) -> String {
    format!(
        "Analyze this document and identify the correspondent (the sender or issuing organization).

Available Correspondents:
{known}

Document Content (first {EXCERPT_CHARS} chars):
{excerpt}

Return a JSON object with:
- correspondent: The correspondent name (choose from the available list if it matches, otherwise suggest a new name)
- confidence: Confidence score 0.0-1.0
- reasoning: Brief explanation of the choice

IMPORTANT:
- If the document matches an existing correspondent, use that exact name
- Use the organization or person name, not an address or department
",
        known = name_list(known),
        excerpt = excerpt(content),
    )
}

pub fn document_type(content: &str, known: &[&str]) -> String {
    format!(
        "Analyze this document and classify its type.

Available Document Types:
{known}

Document Content (first {EXCERPT_CHARS} chars):
{excerpt}

Return a JSON object with:
- document_type: The classified type (choose from the available list if it matches, otherwise suggest a new type)
- confidence: Confidence score 0.0-1.0
- reasoning: Brief explanation of the classification

Common document types include: Invoice, Receipt, Bill, Letter, Contract, Statement, Report, Form.

IMPORTANT:
- If the document matches an existing type, use that exact name
- Be specific but not too granular (\"Invoice\", not \"Electric Company Invoice\")
",
        known = name_list(known),
        excerpt = excerpt(content),
    )
}

pub fn tags(
    content: &str,
    document_type: Option<&str>,
    available: &[&str],
    rules: &TaggingConfig,
) -> String {
    let excluded: Vec<&str> = rules.excluded_tags.iter().map(String::as_str).collect();
    let excluded = if excluded.is_empty() {
        "None".to_string()
    } else {
        serde_json::to_string(&excluded).unwrap_or_else(|_| excluded.join(", "))
    };

    format!(
        "Analyze this document and suggest relevant tags.

Document Type: {document_type}

Available Tags:
{available}

Tag Rules:
- Minimum tags: {min}
- Maximum tags: {max}
- Confidence threshold: {threshold}
- Excluded tags: {excluded}

Document Content (first {EXCERPT_CHARS} chars):
{excerpt}

Return a JSON object with:
- tags: Array of tag names (choose from the available list or suggest new ones)
- confidences: Array of confidence scores (0.0-1.0), one per tag
- reasoning: Brief explanation of the tag selection

IMPORTANT:
- Suggest between {min} and {max} tags
- Prefer existing tags when applicable
- Only suggest tags with confidence >= {threshold}
",
        document_type = document_type.unwrap_or("Unknown"),
        available = name_list(available),
        min = rules.min_tags,
        max = rules.max_tags,
        threshold = rules.confidence_threshold,
        excerpt = excerpt(content),
    )
}

pub fn date(content: &str) -> String {
    format!(
        "Analyze this document and extract the most relevant date.

Document Content (first {EXCERPT_CHARS} chars):
{excerpt}

Date Priority:
1. Invoice date / Bill date (for invoices and bills)
2. Letter date / Document date (for correspondence)
3. Event date / Transaction date
4. Creation date (last resort)

Return a JSON object with:
- document_date: The date in YYYY-MM-DD format
- confidence: Confidence score 0.0-1.0
- date_type: Kind of date (for example \"invoice_date\", \"letter_date\", \"event_date\")
- reasoning: Brief explanation of which date was chosen

IMPORTANT:
- Return the date in YYYY-MM-DD format
- If several dates exist, follow the priority order above
",
        excerpt = excerpt(content),
    )
}

pub fn title(
    content: &str,
    document_type: Option<&str>,
    correspondent: Option<&str>,
    max_length: usize,
) -> String {
    let mut context = Vec::new();
    if let Some(document_type) = document_type {
        context.push(format!("Document Type: {document_type}"));
    }
    if let Some(correspondent) = correspondent {
        context.push(format!("Correspondent: {correspondent}"));
    }

    format!(
        "Analyze this document and generate a concise, descriptive title.

{context}

Document Content (first {EXCERPT_CHARS} chars):
{excerpt}

Return a JSON object with:
- title: A concise, descriptive title (maximum {max_length} characters)
- confidence: Confidence score 0.0-1.0
- reasoning: Brief explanation of the title choice

Title Guidelines:
- Be specific: include the subject, purpose or period
- Avoid generic titles like \"Document\" or \"Letter\"
- Do not include file extensions or special characters
- Examples: \"Monthly Electric Bill January 2024\", \"Employment Contract - John Doe\"
",
        context = context.join("\n"),
        excerpt = excerpt(content),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_respects_char_boundaries() {
        let content = "é".repeat(EXCERPT_CHARS + 10);
        assert_eq!(excerpt(&content).chars().count(), EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn empty_reference_lists_render_as_none() {
        let prompt = correspondent("text", &[]);
        assert!(prompt.contains("Available Correspondents:\nNone"));
    }

    #[test]
    fn tag_prompt_lists_rules() {
        let rules = TaggingConfig {
            excluded_tags: vec!["inbox".into()],
            ..TaggingConfig::default()
        };
        let prompt = tags("text", Some("Invoice"), &["finance"], &rules);
        assert!(prompt.contains("Document Type: Invoice"));
        assert!(prompt.contains("Maximum tags: 10"));
        assert!(prompt.contains("[\"inbox\"]"));
    }
}
