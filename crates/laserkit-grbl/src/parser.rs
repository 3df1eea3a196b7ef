//! G-code block tokenizer
//!
//! Splits one comment-stripped line into letter-coded fields, each
//! carrying an ordered list of numeric arguments. Repeated codes on one
//! line accumulate and are consumed left-to-right; a field with no
//! remaining values disappears from the active set.

use std::collections::{BTreeMap, VecDeque};

/// Strip parenthetical and `;` comments from a line
///
/// An unclosed parenthesis swallows the rest of the line.
pub fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0u32;
    for c in line.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            ';' if depth == 0 => break,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Fixed-point identity for a G/M word: `G28.1` keys as `281`
///
/// Matching on these integers avoids float equality on codes like 28.1
/// and 30.1.
pub fn code_key(value: f64) -> i32 {
    (value * 10.0).round() as i32
}

/// One tokenized g-code block
///
/// A bare letter with no number records a missing value, which the
/// emulator treats per code (usually zero or an error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeLine {
    fields: BTreeMap<char, VecDeque<Option<f64>>>,
}

impl CodeLine {
    /// Tokenize a comment-stripped line
    ///
    /// Letters are lowercased; each letter takes the number immediately
    /// following it (`[+-]?digits[.digits]`). Anything that is neither a
    /// letter nor part of a number is skipped.
    pub fn parse(line: &str) -> CodeLine {
        let mut fields: BTreeMap<char, VecDeque<Option<f64>>> = BTreeMap::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if !c.is_ascii_alphabetic() {
                continue;
            }
            let letter = c.to_ascii_lowercase();
            let mut number = String::new();
            if let Some(&sign) = chars.peek() {
                if sign == '+' || sign == '-' {
                    number.push(sign);
                    chars.next();
                }
            }
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    number.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = if number.is_empty() {
                None
            } else {
                number.parse::<f64>().ok()
            };
            fields.entry(letter).or_default().push_back(value);
        }
        CodeLine { fields }
    }

    /// Whether the letter has any unconsumed values
    pub fn has(&self, letter: char) -> bool {
        self.fields.contains_key(&letter)
    }

    /// Consume the next value for a letter, left-to-right
    ///
    /// Outer `None` means the letter is absent; inner `None` means a
    /// bare letter with no number. Consuming the last value deletes
    /// the field.
    pub fn take(&mut self, letter: char) -> Option<Option<f64>> {
        let values = self.fields.get_mut(&letter)?;
        let value = values.pop_front();
        if values.is_empty() {
            self.fields.remove(&letter);
        }
        value
    }

    /// Whether every field has been consumed
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
