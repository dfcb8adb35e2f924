use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseOptionError;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SessionId);

impl SessionId {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    #[default]
    Scifi,
    Xianxia,
    Postapoc,
    Fantasy,
    Urban,
    Mystery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLength {
    #[default]
    Short,
    Medium,
    Long,
}

/// Display metadata for one genre choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenreOption {
    pub genre: Genre,
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

/// Display metadata and word target for one length choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthOption {
    pub length: TargetLength,
    pub id: &'static str,
    pub label: &'static str,
    pub short_label: &'static str,
    pub target_words: u32,
}

pub const GENRE_OPTIONS: [GenreOption; 6] = [
    GenreOption {
        genre: Genre::Scifi,
        id: "scifi",
        label: "科幻题材",
        description: "星际、未来、赛博朋克",
    },
    GenreOption {
        genre: Genre::Xianxia,
        id: "xianxia",
        label: "修仙题材",
        description: "修真、飞升、法宝",
    },
    GenreOption {
        genre: Genre::Postapoc,
        id: "postapoc",
        label: "末世题材",
        description: "废土、丧尸、生存",
    },
    GenreOption {
        genre: Genre::Fantasy,
        id: "fantasy",
        label: "奇幻魔法",
        description: "剑与魔法、异世界",
    },
    GenreOption {
        genre: Genre::Urban,
        id: "urban",
        label: "现代都市",
        description: "职场、恋爱、日常",
    },
    GenreOption {
        genre: Genre::Mystery,
        id: "mystery",
        label: "悬疑推理",
        description: "探案、惊悚、解谜",
    },
];

pub const LENGTH_OPTIONS: [LengthOption; 3] = [
    LengthOption {
        length: TargetLength::Short,
        id: "short",
        label: "短篇 (~5000字)",
        short_label: "短篇",
        target_words: 5000,
    },
    LengthOption {
        length: TargetLength::Medium,
        id: "medium",
        label: "中篇 (~20000字)",
        short_label: "中篇",
        target_words: 20000,
    },
    LengthOption {
        length: TargetLength::Long,
        id: "long",
        label: "长篇 (~50000字)",
        short_label: "长篇",
        target_words: 50000,
    },
];

impl Genre {
    pub const ALL: [Genre; 6] = [
        Genre::Scifi,
        Genre::Xianxia,
        Genre::Postapoc,
        Genre::Fantasy,
        Genre::Urban,
        Genre::Mystery,
    ];

    // Table order matches declaration order, so the discriminant indexes it.
    pub fn option(self) -> &'static GenreOption {
        &GENRE_OPTIONS[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.option().id
    }

    pub fn label(self) -> &'static str {
        self.option().label
    }

    pub fn description(self) -> &'static str {
        self.option().description
    }
}

impl TargetLength {
    pub const ALL: [TargetLength; 3] = [TargetLength::Short, TargetLength::Medium, TargetLength::Long];

    pub fn option(self) -> &'static LengthOption {
        &LENGTH_OPTIONS[self as usize]
    }

    pub fn id(self) -> &'static str {
        self.option().id
    }

    pub fn label(self) -> &'static str {
        self.option().label
    }

    pub fn short_label(self) -> &'static str {
        self.option().short_label
    }

    pub fn target_words(self) -> u32 {
        self.option().target_words
    }
}

impl FromStr for Genre {
    type Err = ParseOptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let id = raw.trim();
        GENRE_OPTIONS
            .iter()
            .find(|option| option.id.eq_ignore_ascii_case(id))
            .map(|option| option.genre)
            .ok_or_else(|| ParseOptionError::UnknownGenre(id.to_string()))
    }
}

impl FromStr for TargetLength {
    type Err = ParseOptionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let id = raw.trim();
        LENGTH_OPTIONS
            .iter()
            .find(|option| option.id.eq_ignore_ascii_case(id))
            .map(|option| option.length)
            .ok_or_else(|| ParseOptionError::UnknownLength(id.to_string()))
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl fmt::Display for TargetLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// User-editable form values. Edits never reach a request that is already in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInput {
    pub outline: String,
    pub genre: Genre,
    pub target_length: TargetLength,
}

impl FormInput {
    pub fn new(outline: impl Into<String>, genre: Genre, target_length: TargetLength) -> Self {
        Self {
            outline: outline.into(),
            genre,
            target_length,
        }
    }

    pub fn has_outline(&self) -> bool {
        !self.outline.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_tables_line_up_with_enum_order() {
        for genre in Genre::ALL {
            assert_eq!(genre.option().genre, genre);
        }
        for length in TargetLength::ALL {
            assert_eq!(length.option().length, length);
        }
    }

    #[test]
    fn length_targets_match_published_word_counts() {
        let targets: Vec<u32> = TargetLength::ALL
            .iter()
            .map(|length| length.target_words())
            .collect();
        assert_eq!(targets, vec![5000, 20000, 50000]);
        assert_eq!(TargetLength::Medium.short_label(), "中篇");
    }

    #[test]
    fn parses_known_ids_and_rejects_unknown_ones() {
        assert_eq!("scifi".parse::<Genre>().expect("genre"), Genre::Scifi);
        assert_eq!(" Mystery ".parse::<Genre>().expect("genre"), Genre::Mystery);
        assert_eq!("long".parse::<TargetLength>().expect("length"), TargetLength::Long);

        let err = "romance".parse::<Genre>().expect_err("unknown genre");
        assert_eq!(err, ParseOptionError::UnknownGenre("romance".to_string()));
        assert!("epic".parse::<TargetLength>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for genre in Genre::ALL {
            assert_eq!(genre.to_string().parse::<Genre>().expect("genre"), genre);
        }
    }

    #[test]
    fn whitespace_outline_is_not_an_outline() {
        let form = FormInput::new(" \n\t ", Genre::Urban, TargetLength::Short);
        assert!(!form.has_outline());
        assert!(FormInput::new("雨夜", Genre::Urban, TargetLength::Short).has_outline());
    }
}
