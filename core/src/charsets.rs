//! Character classification.
//!
//! Every character fed to the context tracker falls into one of four classes.
//! Classification is plain set membership; each set is configurable and
//! ships with defaults suited to Latin-script text.

use ahash::AHashSet;

/// Moves the cursor one character to the left (Ctrl-B).
pub const CURSOR_LEFT: char = '\u{2}';
/// Moves the cursor one character to the right (Ctrl-F).
pub const CURSOR_RIGHT: char = '\u{6}';
/// Removes the character before the cursor.
pub const BACKSPACE: char = '\u{8}';
/// Removes the character before the cursor (DEL as sent by most terminals).
pub const DELETE: char = '\u{7f}';

pub const DEFAULT_BLANKSPACE_CHARS: &str = " \u{c}\n\r\t\u{b}";
pub const DEFAULT_SEPARATOR_CHARS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Class of a single input character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    /// Part of a token.
    Word,
    /// Whitespace; terminates the current token.
    Blankspace,
    /// Punctuation; terminates the current token.
    Separator,
    /// Non-printable input such as cursor movement.
    Control,
}

impl CharClass {
    /// Whether a character of this class ends the token being typed and
    /// triggers a context change.
    pub fn is_boundary(self) -> bool {
        matches!(self, CharClass::Blankspace | CharClass::Separator)
    }
}

/// The four character sets as configured, in string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSets {
    pub word: String,
    pub separator: String,
    pub blankspace: String,
    pub control: String,
}

impl Default for CharSets {
    fn default() -> Self {
        Self {
            word: default_word_chars(),
            separator: DEFAULT_SEPARATOR_CHARS.to_string(),
            blankspace: DEFAULT_BLANKSPACE_CHARS.to_string(),
            control: default_control_chars(),
        }
    }
}

/// ASCII letters and digits plus the Latin-1 letters.
pub fn default_word_chars() -> String {
    ('a'..='z')
        .chain('A'..='Z')
        .chain('0'..='9')
        .chain('\u{c0}'..='\u{ff}')
        .filter(|c| *c != '\u{d7}' && *c != '\u{f7}')
        .collect()
}

/// ASCII control codes that are not blankspace, plus DEL.
pub fn default_control_chars() -> String {
    ('\u{0}'..='\u{1f}')
        .chain(std::iter::once(DELETE))
        .filter(|c| !DEFAULT_BLANKSPACE_CHARS.contains(*c))
        .collect()
}

/// O(1) set-membership classifier.
#[derive(Debug, Clone)]
pub struct CharClassifier {
    word: AHashSet<char>,
    separator: AHashSet<char>,
    blankspace: AHashSet<char>,
    control: AHashSet<char>,
}

impl CharClassifier {
    pub fn new(sets: &CharSets) -> Self {
        Self {
            word: sets.word.chars().collect(),
            separator: sets.separator.chars().collect(),
            blankspace: sets.blankspace.chars().collect(),
            control: sets.control.chars().collect(),
        }
    }

    /// Classify `c`.
    ///
    /// Sets are consulted in the order word, separator, blankspace, control.
    /// A character that belongs to none of them is a control marker.
    pub fn classify(&self, c: char) -> CharClass {
        if self.word.contains(&c) {
            CharClass::Word
        } else if self.separator.contains(&c) {
            CharClass::Separator
        } else if self.blankspace.contains(&c) {
            CharClass::Blankspace
        } else {
            CharClass::Control
        }
    }

    pub fn is_word(&self, c: char) -> bool {
        self.classify(c) == CharClass::Word
    }

    /// Whether `c` is explicitly listed in the control set.
    pub fn is_listed_control(&self, c: char) -> bool {
        self.control.contains(&c)
    }
}

impl Default for CharClassifier {
    fn default() -> Self {
        Self::new(&CharSets::default())
    }
}
