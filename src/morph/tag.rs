//! Fixed morphological tag schema and its UniMorph feature encoding.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("empty feature list")]
    Empty,

    #[error("conflicting {feature} values {first} and {second}")]
    Conflict {
        feature: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

macro_rules! feature_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal $(| $alias:literal)*),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// UniMorph feature code.
            pub fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code $(| $alias)* => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.code())
            }
        }
    };
}

feature_enum!(
    /// Part of speech.
    Pos {
        Noun => "N",
        ProperNoun => "PROPN",
        Pronoun => "PRO",
        Verb => "V",
        Auxiliary => "AUX",
        Adjective => "ADJ",
        Determiner => "DET",
        Adposition => "ADP",
        Adverb => "ADV",
        Numeral => "NUM",
        Conjunction => "CONJ",
        Particle => "PART",
    }
);

feature_enum!(
    Case {
        Nominative => "NOM",
        Accusative => "ACC",
        Genitive => "GEN",
        Dative => "DAT",
        Instrumental => "INS",
        Locative => "LOC" | "ESS",
        Vocative => "VOC",
        Ablative => "ABL",
    }
);

feature_enum!(
    Number {
        Singular => "SG",
        Plural => "PL",
        Dual => "DU",
    }
);

feature_enum!(
    Gender {
        Masculine => "MASC",
        Feminine => "FEM",
        Neuter => "NEUT",
    }
);

feature_enum!(
    Person {
        First => "1",
        Second => "2",
        Third => "3",
    }
);

feature_enum!(
    Tense {
        Past => "PST",
        Present => "PRS",
        Future => "FUT",
    }
);

/// Agreement categories a constraint can range over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Case,
    Number,
    Gender,
    Person,
    Tense,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Case => "case",
            Self::Number => "number",
            Self::Gender => "gender",
            Self::Person => "person",
            Self::Tense => "tense",
        };
        f.write_str(name)
    }
}

/// A value of one agreement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureValue {
    Case(Case),
    Number(Number),
    Gender(Gender),
    Person(Person),
    Tense(Tense),
}

impl FeatureValue {
    pub fn category(self) -> Category {
        match self {
            Self::Case(_) => Category::Case,
            Self::Number(_) => Category::Number,
            Self::Gender(_) => Category::Gender,
            Self::Person(_) => Category::Person,
            Self::Tense(_) => Category::Tense,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::Case(v) => v.code(),
            Self::Number(v) => v.code(),
            Self::Gender(v) => v.code(),
            Self::Person(v) => v.code(),
            Self::Tense(v) => v.code(),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Morphological tag. Every field is optional; absent means the form does
/// not mark that category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tag {
    pub pos: Option<Pos>,
    pub case: Option<Case>,
    pub number: Option<Number>,
    pub gender: Option<Gender>,
    pub person: Option<Person>,
    pub tense: Option<Tense>,
}

impl Tag {
    /// Parse a `;`-separated UniMorph feature list. Unknown features are
    /// ignored; two values for one category are an error.
    pub fn parse(features: &str) -> Result<Self, TagError> {
        let mut tag = Tag::default();
        let mut seen = false;
        for feature in features.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            seen = true;
            if let Some(v) = Pos::from_code(feature) {
                set(&mut tag.pos, v, "part of speech", Pos::code)?;
            } else if let Some(v) = Case::from_code(feature) {
                set(&mut tag.case, v, "case", Case::code)?;
            } else if let Some(v) = Number::from_code(feature) {
                set(&mut tag.number, v, "number", Number::code)?;
            } else if let Some(v) = Gender::from_code(feature) {
                set(&mut tag.gender, v, "gender", Gender::code)?;
            } else if let Some(v) = Person::from_code(feature) {
                set(&mut tag.person, v, "person", Person::code)?;
            } else if let Some(v) = Tense::from_code(feature) {
                set(&mut tag.tense, v, "tense", Tense::code)?;
            }
        }
        if !seen {
            return Err(TagError::Empty);
        }
        Ok(tag)
    }

    /// Value of one agreement category, if marked.
    pub fn value(&self, category: Category) -> Option<FeatureValue> {
        match category {
            Category::Case => self.case.map(FeatureValue::Case),
            Category::Number => self.number.map(FeatureValue::Number),
            Category::Gender => self.gender.map(FeatureValue::Gender),
            Category::Person => self.person.map(FeatureValue::Person),
            Category::Tense => self.tense.map(FeatureValue::Tense),
        }
    }

    /// True when every field set in `requested` has the same value here.
    pub fn carries(&self, requested: &Tag) -> bool {
        fn matches<T: PartialEq>(have: Option<T>, want: Option<T>) -> bool {
            want.map_or(true, |w| have == Some(w))
        }
        matches(self.pos, requested.pos)
            && matches(self.case, requested.case)
            && matches(self.number, requested.number)
            && matches(self.gender, requested.gender)
            && matches(self.person, requested.person)
            && matches(self.tense, requested.tense)
    }

    pub fn has_pos(&self, wanted: &[Pos]) -> bool {
        self.pos.map_or(false, |p| wanted.contains(&p))
    }
}

fn set<T: Copy + PartialEq>(
    slot: &mut Option<T>,
    value: T,
    feature: &'static str,
    code: fn(T) -> &'static str,
) -> Result<(), TagError> {
    match *slot {
        Some(existing) if existing != value => Err(TagError::Conflict {
            feature,
            first: code(existing),
            second: code(value),
        }),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes = [
            self.pos.map(Pos::code),
            self.case.map(Case::code),
            self.number.map(Number::code),
            self.gender.map(Gender::code),
            self.person.map(Person::code),
            self.tense.map(Tense::code),
        ];
        let joined: Vec<&str> = codes.into_iter().flatten().collect();
        f.write_str(&joined.join(";"))
    }
}
