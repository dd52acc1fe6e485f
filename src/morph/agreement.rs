//! Agreement constraints derived from the words around a gap.
//!
//! Rules look at the nearest complete words (up to two before the gap, one
//! after it). A rule yields one constraint per category it governs; the
//! allowed values are the union over every reading of the source word with
//! the triggering part of speech, so ambiguity is resolved only when a
//! candidate is checked.

use std::collections::BTreeSet;
use std::fmt;

use super::dictionary::MorphAnalysis;
use super::oracle::MorphOracle;
use super::tag::{Case, Category, FeatureValue, Person, Pos};

const NOMINAL_AGREEMENT: [Category; 3] = [Category::Case, Category::Number, Category::Gender];
const VERBAL_AGREEMENT: [Category; 2] = [Category::Person, Category::Number];

/// Which side of the gap a constraint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

/// The grammatical relation behind a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgreementRule {
    /// Adposition governs the case of what follows.
    Government,
    /// Preceding modifier agrees with its head.
    ModifierHead,
    /// Following noun imposes its features on its modifier.
    HeadModifier,
    /// Nominative subject agrees with its verb.
    SubjectVerb,
    /// Finite verb agrees with its subject.
    VerbSubject,
    /// Coordinated verbs share tense.
    Coordination,
}

impl fmt::Display for AgreementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Government => "government",
            Self::ModifierHead => "modifier-head",
            Self::HeadModifier => "head-modifier",
            Self::SubjectVerb => "subject-verb",
            Self::VerbSubject => "verb-subject",
            Self::Coordination => "coordination",
        };
        f.write_str(name)
    }
}

/// "The checked analysis carries `category` with a value in `allowed`."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgreementConstraint {
    pub category: Category,
    pub allowed: BTreeSet<FeatureValue>,
    pub side: Side,
    pub rule: AgreementRule,
    /// Surface word the constraint was derived from.
    pub source: String,
}

impl AgreementConstraint {
    /// Underspecified analyses do not satisfy a constraint. Nouns count as
    /// third person.
    pub fn satisfied_by(&self, analysis: &MorphAnalysis) -> bool {
        contributed(analysis, self.category).map_or(false, |v| self.allowed.contains(&v))
    }
}

/// Constraints for one request, computed once and shared by every candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: Vec<AgreementConstraint>,
}

impl ConstraintSet {
    pub fn new(constraints: Vec<AgreementConstraint>) -> Self {
        Self { constraints }
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgreementConstraint> {
        self.constraints.iter()
    }

    pub fn has_side(&self, side: Side) -> bool {
        self.constraints.iter().any(|c| c.side == side)
    }

    /// Most constraints of `side` any single analysis satisfies.
    pub fn best_satisfied(&self, side: Side, analyses: &[MorphAnalysis]) -> usize {
        analyses
            .iter()
            .map(|a| {
                self.constraints
                    .iter()
                    .filter(|c| c.side == side && c.satisfied_by(a))
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    /// Derive constraints from the words around the gap. `preceding` holds
    /// up to two words in text order, the last one adjacent to the gap.
    pub fn derive(oracle: &MorphOracle, preceding: &[&str], following: Option<&str>) -> Self {
        let mut constraints = Vec::new();

        if let Some((&prev, rest)) = preceding.split_last() {
            let readings = oracle.analyze(prev);

            let adpositions = with_pos(readings, &[Pos::Adposition]);
            push(
                &mut constraints,
                prev,
                Side::Left,
                AgreementRule::Government,
                &adpositions,
                Category::Case,
            );

            let modifiers = with_pos(readings, &[Pos::Adjective, Pos::Determiner, Pos::Numeral]);
            for category in NOMINAL_AGREEMENT {
                push(
                    &mut constraints,
                    prev,
                    Side::Left,
                    AgreementRule::ModifierHead,
                    &modifiers,
                    category,
                );
            }

            let subjects: Vec<&MorphAnalysis> =
                with_pos(readings, &[Pos::Noun, Pos::ProperNoun, Pos::Pronoun])
                    .into_iter()
                    .filter(|a| a.tag.case == Some(Case::Nominative))
                    .collect();
            for category in VERBAL_AGREEMENT {
                push(
                    &mut constraints,
                    prev,
                    Side::Left,
                    AgreementRule::SubjectVerb,
                    &subjects,
                    category,
                );
            }

            let conjunction = !with_pos(readings, &[Pos::Conjunction]).is_empty();
            if let (true, Some(&verb)) = (conjunction, rest.last()) {
                let verbs: Vec<&MorphAnalysis> =
                    with_pos(oracle.analyze(verb), &[Pos::Verb, Pos::Auxiliary])
                        .into_iter()
                        .filter(|a| a.tag.tense.is_some())
                        .collect();
                push(
                    &mut constraints,
                    verb,
                    Side::Left,
                    AgreementRule::Coordination,
                    &verbs,
                    Category::Tense,
                );
            }
        }

        if let Some(next) = following {
            let readings = oracle.analyze(next);

            let heads = with_pos(readings, &[Pos::Noun, Pos::ProperNoun]);
            for category in NOMINAL_AGREEMENT {
                push(
                    &mut constraints,
                    next,
                    Side::Right,
                    AgreementRule::HeadModifier,
                    &heads,
                    category,
                );
            }

            let finite: Vec<&MorphAnalysis> = with_pos(readings, &[Pos::Verb, Pos::Auxiliary])
                .into_iter()
                .filter(|a| a.tag.person.is_some() || a.tag.number.is_some())
                .collect();
            for category in VERBAL_AGREEMENT {
                push(
                    &mut constraints,
                    next,
                    Side::Right,
                    AgreementRule::VerbSubject,
                    &finite,
                    category,
                );
            }
        }

        Self::new(constraints)
    }
}

fn with_pos<'a>(readings: &'a [MorphAnalysis], pos: &[Pos]) -> Vec<&'a MorphAnalysis> {
    readings.iter().filter(|a| a.tag.has_pos(pos)).collect()
}

/// Value a reading contributes to `category`. Nouns are implicitly third
/// person when they do not mark person.
fn contributed(analysis: &MorphAnalysis, category: Category) -> Option<FeatureValue> {
    analysis.tag.value(category).or_else(|| {
        let implicit_third = category == Category::Person
            && analysis.tag.has_pos(&[Pos::Noun, Pos::ProperNoun]);
        implicit_third.then_some(FeatureValue::Person(Person::Third))
    })
}

fn push(
    out: &mut Vec<AgreementConstraint>,
    source: &str,
    side: Side,
    rule: AgreementRule,
    readings: &[&MorphAnalysis],
    category: Category,
) {
    let allowed: BTreeSet<FeatureValue> =
        readings.iter().filter_map(|a| contributed(a, category)).collect();
    if allowed.is_empty() {
        return;
    }
    out.push(AgreementConstraint { category, allowed, side, rule, source: source.to_string() });
}
