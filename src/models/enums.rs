use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(PaperStatus {
    Uploaded => "UPLOADED",
    Extracting => "EXTRACTING",
    Extracted => "EXTRACTED",
    Ingested => "INGESTED",
    Failed => "FAILED",
});

str_enum!(BlockSource {
    Native => "NATIVE",
    Ocr => "OCR",
    Failed => "FAILED",
});

str_enum!(QuestionType {
    Mcq => "MCQ",
    Short => "SHORT",
    Long => "LONG",
    Numeric => "NUMERIC",
});

str_enum!(Difficulty {
    Easy => "EASY",
    Medium => "MEDIUM",
    Hard => "HARD",
});

str_enum!(SessionStatus {
    Running => "RUNNING",
    Submitted => "SUBMITTED",
    Expired => "EXPIRED",
});

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}
