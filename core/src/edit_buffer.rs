//! Edit buffer split at the cursor.
//!
//! The buffer stores everything the user has entered as two character
//! sequences: `past` runs from the oldest retained character up to the
//! cursor, `future` holds characters that sit after the cursor because the
//! user moved back into text already typed. `past + future` is always the
//! full edited text (minus whatever was evicted from the front of `past`).

use std::collections::VecDeque;

/// Cursor-split text buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditBuffer {
    past: VecDeque<char>,
    future: VecDeque<char>,
}

impl EditBuffer {
    /// Create a new empty edit buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text before the cursor.
    pub fn past(&self) -> String {
        self.past.iter().collect()
    }

    /// Text after the cursor.
    pub fn future(&self) -> String {
        self.future.iter().collect()
    }

    /// Characters before the cursor, oldest first.
    pub fn past_chars(&self) -> &VecDeque<char> {
        &self.past
    }

    /// Number of characters before the cursor.
    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    /// Append a character at the cursor.
    pub fn push(&mut self, ch: char) {
        self.past.push_back(ch);
    }

    /// Remove the character before the cursor.
    /// Returns the removed character, if any.
    pub fn delete_before(&mut self) -> Option<char> {
        self.past.pop_back()
    }

    /// Move the cursor one character to the left.
    /// Returns true if the cursor moved.
    pub fn move_left(&mut self) -> bool {
        match self.past.pop_back() {
            Some(ch) => {
                self.future.push_front(ch);
                true
            }
            None => false,
        }
    }

    /// Move the cursor one character to the right.
    /// Returns true if the cursor moved.
    pub fn move_right(&mut self) -> bool {
        match self.future.pop_front() {
            Some(ch) => {
                self.past.push_back(ch);
                true
            }
            None => false,
        }
    }

    /// Drop the `count` oldest characters of `past`.
    pub fn evict_front(&mut self, count: usize) {
        let count = count.min(self.past.len());
        self.past.drain(..count);
    }

    /// Clear both halves.
    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }
}
