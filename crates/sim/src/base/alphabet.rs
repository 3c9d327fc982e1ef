use crate::errors::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Allele index into an [`Alphabet`].
pub type Allele = u8;

/// Shared, immutable allele alphabet.
///
/// The order of the symbols fixes the allele indices used everywhere else:
/// fitness vectors, rate matrices and sequences are all indexed by position
/// in this alphabet. Cloning is cheap, every clone shares the same storage.
#[derive(Debug, Clone)]
pub struct Alphabet {
    /// Character representation of alleles
    chars: Arc<[char]>,
    /// Mapping from char to index for fast lookup
    char_to_index: Arc<HashMap<char, Allele>>,
}

impl Alphabet {
    /// Create an alphabet from a string of distinct symbols.
    ///
    /// # Errors
    /// Fails if there are fewer than two symbols, more than 256, or a
    /// symbol repeats.
    pub fn new(symbols: &str) -> Result<Self, ConfigError> {
        let chars: Vec<char> = symbols.chars().collect();
        if chars.len() < 2 {
            return Err(ConfigError::InvalidParameter(format!(
                "alphabet '{symbols}' must contain at least two symbols"
            )));
        }
        if chars.len() > usize::from(Allele::MAX) + 1 {
            return Err(ConfigError::InvalidParameter(format!(
                "alphabet has {} symbols, at most 256 are supported",
                chars.len()
            )));
        }

        let mut char_to_index = HashMap::with_capacity(chars.len());
        for (i, &c) in chars.iter().enumerate() {
            if char_to_index.insert(c, i as Allele).is_some() {
                return Err(ConfigError::InvalidParameter(format!(
                    "alphabet symbol '{c}' appears more than once"
                )));
            }
        }

        Ok(Self {
            chars: chars.into(),
            char_to_index: Arc::new(char_to_index),
        })
    }

    /// Standard DNA alphabet (A, C, G, T)
    pub fn dna() -> Self {
        Self::from_valid(&['A', 'C', 'G', 'T'])
    }

    /// Binary alphabet (0, 1)
    pub fn binary() -> Self {
        Self::from_valid(&['0', '1'])
    }

    fn from_valid(chars: &[char]) -> Self {
        let char_to_index = chars
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as Allele))
            .collect();
        Self {
            chars: chars.into(),
            char_to_index: Arc::new(char_to_index),
        }
    }

    /// Number of alleles.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Always false for a constructed alphabet.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Get character by allele index
    #[inline]
    pub fn get_char(&self, index: Allele) -> Option<char> {
        self.chars.get(index as usize).copied()
    }

    /// Get allele index by character
    #[inline]
    pub fn get_index(&self, c: char) -> Option<Allele> {
        self.char_to_index.get(&c).copied()
    }

    /// All symbols in index order.
    #[inline]
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Encode a string of symbols into allele indices.
    ///
    /// Returns the first offending character on failure.
    pub fn encode(&self, text: &str) -> Result<Vec<Allele>, char> {
        text.chars()
            .map(|c| self.get_index(c).ok_or(c))
            .collect()
    }

    /// Decode allele indices back into symbols.
    ///
    /// Indices outside the alphabet are rendered as `?`.
    pub fn decode(&self, alleles: &[Allele]) -> String {
        alleles
            .iter()
            .map(|&a| self.get_char(a).unwrap_or('?'))
            .collect()
    }
}

impl PartialEq for Alphabet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.chars, &other.chars) || self.chars == other.chars
    }
}

impl Eq for Alphabet {}

impl fmt::Display for Alphabet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.chars.iter() {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}
