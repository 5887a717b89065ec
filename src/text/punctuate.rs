//! Punctuation restoration for raw decoder output.
//!
//! Two interchangeable strategies: a cheap rule set that is always
//! available, and an optional model-backed restorer that is loaded lazily
//! and falls back to the rules whenever it is unavailable or fails.

use crate::error::Result;

/// French interrogative openers that turn a bare utterance into a question.
const QUESTION_WORDS: &[&str] = &[
    "comment", "quoi", "qui", "où", "quand", "pourquoi", "quel", "quelle", "quels", "quelles",
    "combien", "est-ce",
];

/// Discourse connectors that take a comma when they open a sentence.
const LIAISON_WORDS: &[&str] = &[
    "mais",
    "donc",
    "alors",
    "ensuite",
    "puis",
    "enfin",
    "cependant",
    "toutefois",
    "néanmoins",
    "pourtant",
];

/// A text punctuation strategy.
pub trait Punctuator: Send {
    /// Punctuate one finalized utterance.
    fn punctuate(&mut self, text: &str) -> String;

    /// Name for logging/diagnostics.
    fn name(&self) -> &'static str;
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Rule-based punctuation, always available.
///
/// Applies two independent rules in order: a comma after a sentence-initial
/// liaison word, then a terminal mark chosen by the (comma-stripped) first
/// word when the text does not already end in `.`, `!`, or `?`. French
/// typography puts a space before the question mark.
#[derive(Debug, Clone, Copy, Default)]
pub struct RulePunctuator;

impl RulePunctuator {
    pub fn new() -> Self {
        Self
    }

    fn apply(&self, text: &str) -> String {
        let text = text.trim();
        if text.is_empty() {
            return String::new();
        }

        let mut text = capitalize_first(text);

        let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        if words.len() > 1 && LIAISON_WORDS.contains(&words[0].to_lowercase().as_str()) {
            text = format!("{}, {}", words[0], words[1..].join(" "));
        }

        if !text.ends_with(['.', '!', '?']) {
            let first_word = words[0].to_lowercase();
            let first_word = first_word.trim_end_matches(',');
            if QUESTION_WORDS.contains(&first_word) {
                text.push_str(" ?");
            } else {
                text.push('.');
            }
        }

        text
    }
}

impl Punctuator for RulePunctuator {
    fn punctuate(&mut self, text: &str) -> String {
        self.apply(text)
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

/// External punctuation-restoration capability (a language model).
pub trait PunctuationModel: Send {
    /// Restore punctuation. Any error makes the caller fall back to rules.
    fn restore(&mut self, text: &str) -> Result<String>;

    fn name(&self) -> &'static str {
        "model"
    }
}

/// Lifecycle of the optional punctuation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    /// A loader is registered but has not run yet.
    Uninitialized,
    /// The loader is running.
    Loading,
    /// The model loaded and is serving requests.
    Ready,
    /// No loader, or the loader failed; rules serve every request.
    Unavailable,
}

type ModelLoader = Box<dyn FnOnce() -> Result<Box<dyn PunctuationModel>> + Send>;

/// Model-backed punctuator with an explicit lifecycle and rule fallback.
///
/// The loader runs on the first `punctuate` call, never at construction, so
/// a slow model load cannot stall the first pipeline cycles. Model output
/// gets its first letter capitalized; model failure degrades silently to
/// the rule strategy (logged once).
pub struct SmartPunctuator {
    loader: Option<ModelLoader>,
    model: Option<Box<dyn PunctuationModel>>,
    state: ModelState,
    rules: RulePunctuator,
    warned: bool,
}

impl SmartPunctuator {
    /// Rule-only punctuator; the model is permanently unavailable.
    pub fn rule_only() -> Self {
        Self {
            loader: None,
            model: None,
            state: ModelState::Unavailable,
            rules: RulePunctuator::new(),
            warned: false,
        }
    }

    /// Punctuator that will load a model on first use.
    pub fn with_loader(loader: ModelLoader) -> Self {
        Self {
            loader: Some(loader),
            model: None,
            state: ModelState::Uninitialized,
            rules: RulePunctuator::new(),
            warned: false,
        }
    }

    /// Current model lifecycle state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    fn ensure_model(&mut self) {
        if self.state != ModelState::Uninitialized {
            return;
        }
        let Some(loader) = self.loader.take() else {
            self.state = ModelState::Unavailable;
            return;
        };

        self.state = ModelState::Loading;
        match loader() {
            Ok(model) => {
                self.model = Some(model);
                self.state = ModelState::Ready;
            }
            Err(e) => {
                eprintln!("ecoute: punctuation model unavailable, using rules: {e}");
                self.state = ModelState::Unavailable;
            }
        }
    }
}

impl Punctuator for SmartPunctuator {
    fn punctuate(&mut self, text: &str) -> String {
        if text.trim().is_empty() {
            return String::new();
        }

        self.ensure_model();

        if self.state == ModelState::Ready
            && let Some(model) = self.model.as_mut()
        {
            match model.restore(text) {
                Ok(restored) => return capitalize_first(&restored),
                Err(e) => {
                    if !self.warned {
                        self.warned = true;
                        eprintln!("ecoute: punctuation model failed, using rules: {e}");
                    }
                }
            }
        }

        self.rules.punctuate(text)
    }

    fn name(&self) -> &'static str {
        "smart"
    }
}
