//! Phonemizer registry
//!
//! Tracks name their phonemizer by a string key. The registry maps keys to
//! factories, is filled at startup, and is looked up by exact match. An
//! unknown key is not an error: the binding is simply left unset.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Turns a lyric into phoneme symbols
pub trait Phonemizer: Send {
    fn phonemize(&self, lyric: &str) -> Vec<String>;
}

/// Creates phonemizer instances for one registry key
pub trait PhonemizerFactory: Send + Sync {
    /// Registry key
    fn id(&self) -> &'static str;

    fn display_name(&self) -> &'static str;

    fn create(&self) -> Box<dyn Phonemizer>;
}

#[derive(Clone, Default)]
pub struct PhonemizerRegistry {
    factories: BTreeMap<String, Arc<dyn PhonemizerFactory>>,
}

impl PhonemizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in phonemizers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DefaultPhonemizerFactory));
        registry.register(Arc::new(SyllablePhonemizerFactory));
        registry.register(Arc::new(VowelPhonemizerFactory));
        registry
    }

    /// Add a factory; a later registration under the same key replaces the
    /// earlier one
    pub fn register(&mut self, factory: Arc<dyn PhonemizerFactory>) {
        let id = factory.id().to_string();
        if self.factories.insert(id.clone(), factory).is_some() {
            tracing::warn!(phonemizer = %id, "Phonemizer registered twice, replacing");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// New phonemizer instance for `id`, `None` when the key is unknown
    pub fn create(&self, id: &str) -> Option<Box<dyn Phonemizer>> {
        self.factories.get(id).map(|f| f.create())
    }

    /// Registered factories in key order
    pub fn factories(&self) -> impl Iterator<Item = &dyn PhonemizerFactory> {
        self.factories.values().map(|f| f.as_ref())
    }
}

impl std::fmt::Debug for PhonemizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhonemizerRegistry")
            .field("ids", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lyric passed through as a single phoneme
pub struct DefaultPhonemizer;

impl Phonemizer for DefaultPhonemizer {
    fn phonemize(&self, lyric: &str) -> Vec<String> {
        let lyric = lyric.trim();
        if lyric.is_empty() {
            Vec::new()
        } else {
            vec![lyric.to_string()]
        }
    }
}

pub struct DefaultPhonemizerFactory;

impl PhonemizerFactory for DefaultPhonemizerFactory {
    fn id(&self) -> &'static str {
        "DefaultPhonemizer"
    }

    fn display_name(&self) -> &'static str {
        "Default (lyric as phoneme)"
    }

    fn create(&self) -> Box<dyn Phonemizer> {
        Box::new(DefaultPhonemizer)
    }
}

/// Splits a lyric into syllables on whitespace and hyphens
pub struct SyllablePhonemizer;

impl Phonemizer for SyllablePhonemizer {
    fn phonemize(&self, lyric: &str) -> Vec<String> {
        lyric
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub struct SyllablePhonemizerFactory;

impl PhonemizerFactory for SyllablePhonemizerFactory {
    fn id(&self) -> &'static str {
        "SyllablePhonemizer"
    }

    fn display_name(&self) -> &'static str {
        "Syllable splitter"
    }

    fn create(&self) -> Box<dyn Phonemizer> {
        Box::new(SyllablePhonemizer)
    }
}

/// Leading consonant cluster, vowel run, then whatever follows
pub struct VowelPhonemizer;

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}

impl Phonemizer for VowelPhonemizer {
    fn phonemize(&self, lyric: &str) -> Vec<String> {
        let lyric = lyric.trim().to_lowercase();
        let onset_end = lyric.find(is_vowel).unwrap_or(lyric.len());
        let (onset, rest) = lyric.split_at(onset_end);
        let nucleus_end = rest.find(|c: char| !is_vowel(c)).unwrap_or(rest.len());
        let (nucleus, coda) = rest.split_at(nucleus_end);

        [onset, nucleus, coda]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub struct VowelPhonemizerFactory;

impl PhonemizerFactory for VowelPhonemizerFactory {
    fn id(&self) -> &'static str {
        "VowelPhonemizer"
    }

    fn display_name(&self) -> &'static str {
        "Onset / vowel / coda"
    }

    fn create(&self) -> Box<dyn Phonemizer> {
        Box::new(VowelPhonemizer)
    }
}
