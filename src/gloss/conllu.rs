use anyhow::{Result, anyhow};

use super::{AnnotatedToken, Annotator, DependencyRelation, PartOfSpeech};

const COLUMN_COUNT: usize = 10;
const COL_ID: usize = 0;
const COL_FORM: usize = 1;
const COL_LEMMA: usize = 2;
const COL_UPOS: usize = 3;
const COL_DEPREL: usize = 7;

/// Reads pre-annotated CoNLL-U text as produced by an external parser
/// (spaCy, UDPipe, Stanza).
#[derive(Clone, Debug, Default)]
pub struct ConlluAnnotator;

impl ConlluAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Every sentence block in the input.
    pub fn annotate_all(&self, text: &str) -> Result<Vec<Vec<AnnotatedToken>>> {
        let mut sentences = Vec::new();
        let mut current = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                if !current.is_empty() {
                    sentences.push(std::mem::take(&mut current));
                }
                continue;
            }
            if line.starts_with('#') {
                continue;
            }
            if let Some(token) = parse_token_line(line, current.len())
                .map_err(|err| anyhow!("line {}: {err}", line_no + 1))?
            {
                current.push(token);
            }
        }
        if !current.is_empty() {
            sentences.push(current);
        }

        Ok(sentences)
    }
}

impl Annotator for ConlluAnnotator {
    fn annotate(&self, text: &str) -> Result<Vec<AnnotatedToken>> {
        Ok(self
            .annotate_all(text)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }
}

fn parse_token_line(line: &str, position: usize) -> Result<Option<AnnotatedToken>> {
    let columns: Vec<&str> = line.split('\t').collect();
    if columns.len() != COLUMN_COUNT {
        return Err(anyhow!(
            "expected {COLUMN_COUNT} tab-separated columns, got {}",
            columns.len()
        ));
    }

    let id = columns[COL_ID];
    // Multiword ranges ("3-4") and empty nodes ("5.1") are not surface tokens.
    if id.contains('-') || id.contains('.') {
        return Ok(None);
    }
    id.parse::<usize>()
        .map_err(|_| anyhow!("invalid token id '{id}'"))?;

    let lemma = match columns[COL_LEMMA] {
        "_" | "" => columns[COL_FORM],
        lemma => lemma,
    };

    Ok(Some(AnnotatedToken::new(
        lemma,
        PartOfSpeech::parse(columns[COL_UPOS]),
        DependencyRelation::parse(columns[COL_DEPREL]),
        position,
    )))
}
