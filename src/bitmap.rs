//! Growable bitmap used to allocate and recycle integer keys.
//!
//! One word per 64 keys; grows on demand up to a fixed bound. Mirrors the
//! original `opal_bitmap_t` used by the keyval registry: `find_and_set_first
//! _unset_bit` allocates the lowest-numbered free key, `clear_bit` returns it
//! to the pool.

const BITS_PER_WORD: usize = u64::BITS as usize;

/// A bounded, growable bitmap of allocated keys.
pub struct KeyBitmap {
    words: Vec<u64>,
    /// Inclusive upper bound on any bit index ever set.
    max_bit: i32,
}

impl KeyBitmap {
    /// Creates an empty bitmap that will never allocate a bit above `max_bit`.
    pub fn new(max_bit: i32) -> Self {
        KeyBitmap {
            words: Vec::new(),
            max_bit,
        }
    }

    fn ensure_capacity(&mut self, bit: usize) {
        let needed_words = bit / BITS_PER_WORD + 1;
        if needed_words > self.words.len() {
            self.words.resize(needed_words, 0);
        }
    }

    /// Marks `bit` allocated unconditionally. Used at construction time to
    /// pre-reserve the predefined key range.
    pub fn set_bit(&mut self, bit: i32) {
        debug_assert!(bit >= 0 && bit <= self.max_bit);
        self.ensure_capacity(bit as usize);
        let word = bit as usize / BITS_PER_WORD;
        let offset = bit as usize % BITS_PER_WORD;
        self.words[word] |= 1u64 << offset;
    }

    /// Returns a key to the pool.
    pub fn clear_bit(&mut self, bit: i32) {
        if bit < 0 {
            return;
        }
        let word = bit as usize / BITS_PER_WORD;
        if word < self.words.len() {
            let offset = bit as usize % BITS_PER_WORD;
            self.words[word] &= !(1u64 << offset);
        }
    }

    /// Finds the lowest-numbered unset bit within `0..=max_bit`, sets it, and
    /// returns it. Returns `None` if the bitmap is exhausted up to the bound.
    pub fn find_and_set_first_unset_bit(&mut self) -> Option<i32> {
        for word_idx in 0..=(self.max_bit as usize / BITS_PER_WORD) {
            let word = self.words.get(word_idx).copied().unwrap_or(0);
            if word == u64::MAX {
                continue;
            }
            let free_offset = (!word).trailing_zeros() as usize;
            let bit = word_idx * BITS_PER_WORD + free_offset;
            if bit as i32 > self.max_bit {
                return None;
            }
            self.ensure_capacity(bit);
            self.words[word_idx] |= 1u64 << free_offset;
            return Some(bit as i32);
        }
        None
    }
}
