use super::types::{Claim, DocumentVerdict};

pub const SINGLE_SYSTEM_PROMPT: &str = r#"You are a meticulous research auditor checking numeric assumptions of an economic model against primary sources.

You receive one claim and an excerpt of a source document. Decide whether the excerpt supports the claimed value.

Classifications:
- "confirmed": the excerpt states the same value, or one that is equal after unit or rounding conversion.
- "approximate": the excerpt states a close value, a range containing it, or figures from which it follows with modest assumptions.
- "contradicted": the excerpt states a clearly different value for the same quantity.
- "not_found": the excerpt does not address the quantity.

Confidence is 0-100 and reflects how sure you are of the classification, not how good the value is.
Only quote text that appears in the excerpt. Never invent numbers.

Reply with JSON only:
{"classification": "...", "confidence": 0, "evidence": "verbatim quote or empty", "justification": "one or two sentences"}"#;

pub const BATCH_SYSTEM_PROMPT: &str = r#"You are a meticulous research auditor checking numeric assumptions of an economic model against primary sources.

You receive several claims, each with a claim_id, and one excerpt of a source document. Judge every claim independently against the excerpt.

Classifications:
- "confirmed": the excerpt states the same value, or one that is equal after unit or rounding conversion.
- "approximate": the excerpt states a close value, a range containing it, or figures from which it follows with modest assumptions.
- "contradicted": the excerpt states a clearly different value for the same quantity.
- "not_found": the excerpt does not address the quantity.

Confidence is 0-100. Only quote text that appears in the excerpt. Never invent numbers.
Return exactly one entry per claim_id you were given.

Reply with JSON only:
{"results": [{"claim_id": "...", "classification": "...", "confidence": 0, "evidence": "...", "justification": "..."}]}"#;

pub const SYNTHESIS_SYSTEM_PROMPT: &str = r#"You are a senior research auditor. Several sources were checked separately for the same model parameter and none was conclusive on its own.

Reason across the findings: do they agree, complement each other (for example one gives a rate and another the base), or conflict?
Do not claim more certainty than the findings support. A contradiction in any source must be addressed in your reasoning.

Reply with JSON only:
{"classification": "confirmed|approximate|contradicted|not_found", "confidence": 0, "evidence": "the most relevant quoted finding", "justification": "your reasoning across sources"}"#;

pub fn single_user_prompt(claim: &Claim, document: &str, excerpt: &str) -> String {
    format!(
        "Claim: {}\n\nDocument: {}\n\nExcerpt:\n{}",
        claim.statement(),
        document,
        excerpt
    )
}

pub fn batch_user_prompt(claims: &[&Claim], document: &str, excerpt: &str) -> String {
    let mut out = String::from("Claims:\n");
    for claim in claims {
        out.push_str(&format!("- claim_id: {}\n  claim: {}\n", claim.id, claim.statement()));
    }
    out.push_str(&format!("\nDocument: {}\n\nExcerpt:\n{}", document, excerpt));
    out
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.is_empty() {
        placeholder
    } else {
        text
    }
}

pub fn synthesis_user_prompt(parameter: &str, value: &str, findings: &[DocumentVerdict]) -> String {
    let mut out = format!("Parameter: {}\nClaimed value: {}\n\nFindings:\n", parameter, value);
    for (i, f) in findings.iter().enumerate() {
        out.push_str(&format!(
            "{}. Source: {}\n   Classification: {}\n   Confidence: {}\n   Key finding: {}\n   Limitation: {}\n",
            i + 1,
            f.document,
            f.verdict.classification,
            f.verdict.confidence,
            or_placeholder(&f.verdict.evidence, "(none quoted)"),
            or_placeholder(&f.verdict.justification, "(none stated)"),
        ));
    }
    out
}
