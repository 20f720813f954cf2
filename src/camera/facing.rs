use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which way a camera points relative to the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    Front,
    #[default]
    Back,
    Unknown,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FacingMode::Front => "front",
            FacingMode::Back => "back",
            FacingMode::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" | "user" => Ok(FacingMode::Front),
            "back" | "environment" => Ok(FacingMode::Back),
            "unknown" => Ok(FacingMode::Unknown),
            other => Err(format!("Unknown facing mode '{}'", other)),
        }
    }
}

/// Device label fragments meaning "rear camera" across common locales
const BACK_KEYWORDS: &[&str] = &[
    "rear",
    "back",
    "environment",
    "rück",
    "arrière",
    "trasera",
    "trás",
    "traseira",
    "posteriore",
    "后面",
    "後面",
    "背面",
    "后置",
    "後置",
    "背置",
    "задней",
    "задняя",
    "الخلفية",
    "후",
    "arka",
    "achterzijde",
    "หลัง",
    "baksidan",
    "bagside",
    "sau",
    "bak",
    "tylny",
    "takakamera",
    "belakang",
    "אחורית",
    "πίσω",
    "zadní",
    "पीछे",
    "zadnja",
    "hátsó",
];

/// Device label fragments meaning "selfie camera"
const FRONT_KEYWORDS: &[&str] = &[
    "front",
    "user",
    "face",
    "selfie",
    "vorder",
    "avant",
    "frontal",
    "delantera",
    "anteriore",
    "前面",
    "前置",
    "передней",
    "фронтальная",
    "الأمامية",
    "전면",
    "ön",
    "voorzijde",
    "หน้า",
    "framsidan",
    "forside",
    "trước",
    "przedni",
    "etukamera",
    "depan",
    "קדמית",
    "μπροστά",
    "přední",
    "सामने",
    "prednja",
    "elülső",
];

/// Guess facing from a device label. Labels are the only hint available
/// before a stream is opened; the stream's own settings win once known.
pub fn facing_from_label(label: &str) -> FacingMode {
    let label = label.to_lowercase();
    if BACK_KEYWORDS.iter().any(|k| label.contains(k)) {
        FacingMode::Back
    } else if FRONT_KEYWORDS.iter().any(|k| label.contains(k)) {
        FacingMode::Front
    } else {
        FacingMode::Unknown
    }
}

/// iOS exposes a virtual "Back Dual Wide Camera" that switches lenses
/// automatically for close-up focus.
pub fn is_dual_wide(label: &str) -> bool {
    label.to_lowercase().contains("dual wide")
}
