//! Musical key naming
//!
//! Keys are a pitch class (0 = C .. 11 = B) plus a mode. Names use sharps.

use std::fmt;
use std::str::FromStr;

/// Pitch class names, sharps only
pub const PITCH_CLASS_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Major or minor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Musical key with root note and mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MusicalKey {
    /// Root note as semitone offset from C (0=C, 1=C#, 2=D, ..., 11=B)
    root: u8,
    mode: Mode,
}

impl MusicalKey {
    pub const fn new(root: u8, mode: Mode) -> Self {
        Self { root: root % 12, mode }
    }

    pub const fn major(root: u8) -> Self {
        Self::new(root, Mode::Major)
    }

    pub const fn minor(root: u8) -> Self {
        Self::new(root, Mode::Minor)
    }

    pub fn root(&self) -> u8 {
        self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_minor(&self) -> bool {
        self.mode == Mode::Minor
    }

    /// Name of the root pitch class ("C", "F#", ...)
    pub fn root_name(&self) -> &'static str {
        PITCH_CLASS_NAMES[self.root as usize]
    }

    /// Parse "Am", "C#m", "F", "Bb", "A minor", "Eb major"
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let mut chars = s.chars().peekable();

        let base_root = match chars.next()?.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return None,
        };

        let root = match chars.peek() {
            Some('#') => {
                chars.next();
                (base_root + 1) % 12
            }
            Some('b') => {
                chars.next();
                (base_root + 11) % 12
            }
            _ => base_root,
        };

        let suffix = chars.collect::<String>().trim().to_lowercase();
        let mode = match suffix.as_str() {
            "" | "maj" | "major" => Mode::Major,
            "m" | "min" | "minor" => Mode::Minor,
            _ => return None,
        };

        Some(Self::new(root, mode))
    }

    /// Relative major/minor (shares the same notes)
    pub fn relative(&self) -> Self {
        match self.mode {
            Mode::Minor => Self::major(self.root + 3),
            Mode::Major => Self::minor(self.root + 9),
        }
    }

    /// Camelot wheel position (1-12) and letter (A = minor, B = major)
    pub fn camelot(&self) -> (u8, char) {
        const CAMELOT_MAJOR: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];
        const CAMELOT_MINOR: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

        match self.mode {
            Mode::Major => (CAMELOT_MAJOR[self.root as usize], 'B'),
            Mode::Minor => (CAMELOT_MINOR[self.root as usize], 'A'),
        }
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root_name(), self.mode)
    }
}

impl FromStr for MusicalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("not a musical key: {:?}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keys() {
        assert_eq!(MusicalKey::parse("C"), Some(MusicalKey::major(0)));
        assert_eq!(MusicalKey::parse("F#"), Some(MusicalKey::major(6)));
        assert_eq!(MusicalKey::parse("Bb"), Some(MusicalKey::major(10)));
        assert_eq!(MusicalKey::parse("Am"), Some(MusicalKey::minor(9)));
        assert_eq!(MusicalKey::parse("C#m"), Some(MusicalKey::minor(1)));
        assert_eq!(MusicalKey::parse("A minor"), Some(MusicalKey::minor(9)));
        assert_eq!(MusicalKey::parse("eb major"), Some(MusicalKey::major(3)));
        assert_eq!(MusicalKey::parse("H"), None);
        assert_eq!(MusicalKey::parse("Cx"), None);
        assert_eq!(MusicalKey::parse(""), None);
    }

    #[test]
    fn test_display_round_trips() {
        for root in 0..12 {
            for key in [MusicalKey::major(root), MusicalKey::minor(root)] {
                assert_eq!(key.to_string().parse::<MusicalKey>(), Ok(key));
            }
        }
        assert_eq!(MusicalKey::minor(9).to_string(), "A minor");
    }

    #[test]
    fn test_relative_keys() {
        assert_eq!(MusicalKey::minor(9).relative(), MusicalKey::major(0));
        assert_eq!(MusicalKey::major(7).relative(), MusicalKey::minor(4));
    }

    #[test]
    fn test_camelot() {
        assert_eq!(MusicalKey::major(0).camelot(), (8, 'B'));
        assert_eq!(MusicalKey::minor(9).camelot(), (8, 'A'));
        assert_eq!(MusicalKey::minor(8).camelot(), (1, 'A'));
    }
}
