//! Morphological oracle and agreement constraints.
//!
//! The dictionary is loaded once and shared read-only; constraints are
//! derived per request from the words around the gap.

pub mod agreement;
pub mod dictionary;
pub mod oracle;
pub mod tag;

pub use agreement::{AgreementConstraint, AgreementRule, ConstraintSet, Side};
pub use dictionary::{Dictionary, DictionaryError, MorphAnalysis};
pub use oracle::MorphOracle;
pub use tag::{Case, Category, FeatureValue, Gender, Number, Person, Pos, Tag, TagError, Tense};
