//! Reorders an annotated English sentence into a sign-language gloss.
//!
//! The ordering is a fixed heuristic: main verb first, then objects and
//! modifiers in their original order, then the subject, then any question
//! word. Auxiliaries, determiners, adpositions and punctuation are dropped.

pub mod conllu;
pub mod translator;

use std::fmt;

pub use conllu::ConlluAnnotator;
pub use translator::{
    FileTranslationLog, MemoryTranslationLog, Translation, TranslationLog, Translator,
};

const QUESTION_WORDS: &[&str] = &["WHAT", "WHERE", "WHEN", "WHY", "HOW", "WHO"];

/// Turns raw text into annotated tokens.
pub trait Annotator: Send + Sync {
    fn annotate(&self, text: &str) -> anyhow::Result<Vec<AnnotatedToken>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartOfSpeech {
    Auxiliary,
    Determiner,
    Adposition,
    Punctuation,
    Noun,
    ProperNoun,
    Pronoun,
    Verb,
    Adjective,
    Adverb,
    Other(String),
}

impl PartOfSpeech {
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "AUX" => PartOfSpeech::Auxiliary,
            "DET" => PartOfSpeech::Determiner,
            "ADP" => PartOfSpeech::Adposition,
            "PUNCT" => PartOfSpeech::Punctuation,
            "NOUN" => PartOfSpeech::Noun,
            "PROPN" => PartOfSpeech::ProperNoun,
            "PRON" => PartOfSpeech::Pronoun,
            "VERB" => PartOfSpeech::Verb,
            "ADJ" => PartOfSpeech::Adjective,
            "ADV" => PartOfSpeech::Adverb,
            other => PartOfSpeech::Other(other.to_string()),
        }
    }

    /// Function words that carry no sign of their own.
    pub fn is_dropped(&self) -> bool {
        matches!(
            self,
            PartOfSpeech::Auxiliary
                | PartOfSpeech::Determiner
                | PartOfSpeech::Adposition
                | PartOfSpeech::Punctuation
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DependencyRelation {
    NominalSubject,
    PassiveNominalSubject,
    Root,
    DirectObject,
    Attribute,
    Preposition,
    PrepositionalObject,
    Other(String),
}

impl DependencyRelation {
    /// Accepts spaCy labels (`nsubjpass`, `dobj`, `ROOT`) and UD v2 labels
    /// (`nsubj:pass`, `obj`, `root`).
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "nsubj" => DependencyRelation::NominalSubject,
            "nsubjpass" | "nsubj:pass" => DependencyRelation::PassiveNominalSubject,
            "root" => DependencyRelation::Root,
            "dobj" | "obj" => DependencyRelation::DirectObject,
            "attr" => DependencyRelation::Attribute,
            "prep" => DependencyRelation::Preposition,
            "pobj" => DependencyRelation::PrepositionalObject,
            other => DependencyRelation::Other(other.to_string()),
        }
    }

    fn is_subject(&self) -> bool {
        matches!(
            self,
            DependencyRelation::NominalSubject | DependencyRelation::PassiveNominalSubject
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedToken {
    /// Canonical uppercase lemma.
    pub lemma: String,
    pub pos: PartOfSpeech,
    pub dep: DependencyRelation,
    pub position: usize,
}

impl AnnotatedToken {
    pub fn new(lemma: &str, pos: PartOfSpeech, dep: DependencyRelation, position: usize) -> Self {
        Self {
            lemma: lemma.trim().to_uppercase(),
            pos,
            dep,
            position,
        }
    }

    /// Convenience constructor from raw tag strings.
    pub fn from_tags(lemma: &str, pos: &str, dep: &str, position: usize) -> Self {
        Self::new(
            lemma,
            PartOfSpeech::parse(pos),
            DependencyRelation::parse(dep),
            position,
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlossSequence {
    tokens: Vec<String>,
}

impl GlossSequence {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for GlossSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

#[derive(Default)]
struct Slots<'a> {
    wh: Option<&'a str>,
    subject: Option<&'a str>,
    verb: Option<&'a str>,
    objects: Vec<&'a str>,
}

pub fn reorder(tokens: &[AnnotatedToken]) -> GlossSequence {
    let mut slots = Slots::default();

    // Single-slot buckets keep the last match.
    for token in tokens {
        let lemma = token.lemma.as_str();
        if token.pos.is_dropped() {
            continue;
        }
        if QUESTION_WORDS.contains(&lemma) {
            slots.wh = Some(lemma);
        } else if token.dep.is_subject() {
            slots.subject = Some(lemma);
        } else if token.dep == DependencyRelation::Root {
            slots.verb = Some(lemma);
        } else {
            // Objects, attributes, prepositional phrases and everything else
            // keep their sentence order.
            slots.objects.push(lemma);
        }
    }

    let tokens = slots
        .verb
        .into_iter()
        .chain(slots.objects)
        .chain(slots.subject)
        .chain(slots.wh)
        .map(str::to_string)
        .collect();

    GlossSequence { tokens }
}
