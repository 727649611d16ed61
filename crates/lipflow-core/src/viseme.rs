//! Viseme alphabet
//!
//! A viseme is a visually distinguishable mouth shape covering one or more
//! speech sounds. The alphabet here is the closed set the classifier can
//! emit: one silence state, five vowel shapes and six consonant shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A mouth-shape category.
///
/// Exactly one label is "current" at any time; the classifier owns that
/// notion. Vowel variants are named after their canonical sound, consonant
/// variants after their place of articulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VisemeLabel {
    /// Mouth at rest, no speech energy
    Silence,
    /// Open back vowel ("father")
    Aa,
    /// Mid front vowel ("bed")
    E,
    /// Close front vowel ("see")
    I,
    /// Back rounded vowel ("go")
    O,
    /// Close back rounded vowel ("boot")
    U,
    /// Bilabial stop, lips closed (p, b, m)
    Pp,
    /// Labiodental fricative (f, v)
    Ff,
    /// Dental fricative (th)
    Th,
    /// Alveolar consonant (t, d, n, l)
    Dd,
    /// Velar consonant (k, g)
    Kk,
    /// Sibilant / postalveolar (sh, ch, j, s)
    Ch,
}

impl VisemeLabel {
    /// All labels, silence first.
    pub const ALL: [VisemeLabel; 12] = [
        VisemeLabel::Silence,
        VisemeLabel::Aa,
        VisemeLabel::E,
        VisemeLabel::I,
        VisemeLabel::O,
        VisemeLabel::U,
        VisemeLabel::Pp,
        VisemeLabel::Ff,
        VisemeLabel::Th,
        VisemeLabel::Dd,
        VisemeLabel::Kk,
        VisemeLabel::Ch,
    ];

    /// Conventional ARKit/Oculus morph-target name for this label.
    ///
    /// Rendering consumers drive the blend shape of this name with the
    /// classified intensity. Purely a string mapping; no rendering types
    /// are involved.
    pub fn morph_target(&self) -> &'static str {
        match self {
            VisemeLabel::Silence => "viseme_sil",
            VisemeLabel::Aa => "viseme_aa",
            VisemeLabel::E => "viseme_E",
            VisemeLabel::I => "viseme_ih",
            VisemeLabel::O => "viseme_oh",
            VisemeLabel::U => "viseme_ou",
            VisemeLabel::Pp => "viseme_PP",
            VisemeLabel::Ff => "viseme_FF",
            VisemeLabel::Th => "viseme_TH",
            VisemeLabel::Dd => "viseme_DD",
            VisemeLabel::Kk => "viseme_kk",
            VisemeLabel::Ch => "viseme_CH",
        }
    }

    /// True for the five vowel shapes.
    pub fn is_vowel(&self) -> bool {
        matches!(
            self,
            VisemeLabel::Aa | VisemeLabel::E | VisemeLabel::I | VisemeLabel::O | VisemeLabel::U
        )
    }

    /// Short lowercase name used in logs and debug output.
    pub fn short_name(&self) -> &'static str {
        match self {
            VisemeLabel::Silence => "sil",
            VisemeLabel::Aa => "aa",
            VisemeLabel::E => "E",
            VisemeLabel::I => "I",
            VisemeLabel::O => "O",
            VisemeLabel::U => "U",
            VisemeLabel::Pp => "PP",
            VisemeLabel::Ff => "FF",
            VisemeLabel::Th => "TH",
            VisemeLabel::Dd => "DD",
            VisemeLabel::Kk => "kk",
            VisemeLabel::Ch => "CH",
        }
    }
}

impl Default for VisemeLabel {
    fn default() -> Self {
        VisemeLabel::Silence
    }
}

impl fmt::Display for VisemeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}
