//! External service clients
//!
//! Wraps the model-completion service behind the [`Classifier`] trait so the
//! runner can be exercised without a network.

pub mod classifier;

pub use classifier::{Classifier, ClassifierConfig, OllamaClassifier, Verdict};
