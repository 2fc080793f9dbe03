use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::collections::HashMap;

/// Vowels, with the plain ones listed twice to double their odds
pub const VOWELS: &[char] = &[
    'A', 'A', 'E', 'E', 'I', 'I', 'O', 'O', 'U', 'U', 'Ä', 'Ö', 'Ü', 'Y',
];
pub const CONSONANTS: &[char] = &[
    'B', 'C', 'D', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'V', 'W',
    'X', 'Z',
];
/// Placeholder for a gap between words (non-breaking space)
pub const SPACE: char = '\u{00a0}';

pub const NUM_VOWELS: usize = 4;
pub const NUM_CONSONANTS: usize = 6;
pub const NUM_SPACES: usize = 2;
pub const POOL_SIZE: usize = NUM_VOWELS + NUM_CONSONANTS + NUM_SPACES;

/// No symbol may be drawn more often than this within one pool
pub const MAX_REPEATS: usize = 2;
const MAX_DRAW_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordCheck {
    Valid,
    Empty,
    TooLong,
    InvalidLetter(char),
}

/// The shuffled symbols a player may compose their word from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LetterPool {
    symbols: Vec<char>,
}

impl LetterPool {
    /// Draws a fresh pool: vowels, consonants and two spaces, shuffled
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut symbols = Vec::with_capacity(POOL_SIZE);
        draw_into(&mut symbols, VOWELS, NUM_VOWELS, rng);
        draw_into(&mut symbols, CONSONANTS, NUM_CONSONANTS, rng);
        symbols.extend(std::iter::repeat(SPACE).take(NUM_SPACES));
        symbols.shuffle(rng);
        Self { symbols }
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// Checks that `word` only uses symbols of this pool, each no more often
    /// than the pool holds it
    pub fn check(&self, word: &str) -> WordCheck {
        if word.is_empty() {
            return WordCheck::Empty;
        }
        if word.chars().count() > self.symbols.len() {
            return WordCheck::TooLong;
        }

        let mut available = counts(&self.symbols);
        for symbol in word.chars() {
            match available.get_mut(&symbol) {
                Some(left) if *left > 0 => *left -= 1,
                _ => return WordCheck::InvalidLetter(symbol),
            }
        }
        WordCheck::Valid
    }
}

impl std::fmt::Display for LetterPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.symbols.iter().try_for_each(|c| write!(f, "{c}"))
    }
}

impl From<&str> for LetterPool {
    fn from(letters: &str) -> Self {
        Self {
            symbols: letters.chars().collect(),
        }
    }
}

/// Appends `count` symbols from `alphabet`, redrawing whenever a symbol is
/// already at `MAX_REPEATS`. After `MAX_DRAW_ATTEMPTS` redraws the pick is
/// made among the symbols still allowed.
fn draw_into<R: Rng + ?Sized>(symbols: &mut Vec<char>, alphabet: &[char], count: usize, rng: &mut R) {
    for _ in 0..count {
        let mut picked = None;
        for _ in 0..MAX_DRAW_ATTEMPTS {
            let candidate = alphabet[rng.random_range(0..alphabet.len())];
            if times_used(candidate, symbols) < MAX_REPEATS {
                picked = Some(candidate);
                break;
            }
        }

        let symbol = match picked {
            Some(symbol) => symbol,
            None => {
                let allowed: Vec<char> = alphabet
                    .iter()
                    .copied()
                    .filter(|c| times_used(*c, symbols) < MAX_REPEATS)
                    .collect();
                match allowed.choose(rng) {
                    Some(symbol) => *symbol,
                    None => break,
                }
            }
        };
        symbols.push(symbol);
    }
}

fn times_used(symbol: char, symbols: &[char]) -> usize {
    symbols.iter().filter(|s| **s == symbol).count()
}

fn counts(symbols: &[char]) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for symbol in symbols {
        *counts.entry(*symbol).or_insert(0) += 1;
    }
    counts
}
