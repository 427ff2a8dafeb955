use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use voucher_core::{BatchId, Code, ALPHABET};

/// Draws random candidate codes from [`ALPHABET`].
///
/// Every symbol is sampled independently and uniformly. The generator is
/// statistically uniform only; it is not meant to make codes unguessable.
/// Nothing here deduplicates: repeated candidates are the store's problem.
#[derive(Debug, Clone)]
pub struct RandomDraw<R = StdRng> {
    rng: R,
}

impl RandomDraw<StdRng> {
    /// Seeds a fresh generator from operating system entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl<R: Rng> RandomDraw<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Draws a single code of `length` symbols.
    pub fn draw(&mut self, length: usize) -> Code {
        let code: String = (0..length)
            .map(|_| ALPHABET[self.rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        Code::new_unchecked(code)
    }

    /// Lazily draws `count` codes of `length` symbols.
    ///
    /// The iterator borrows the generator, so its state keeps advancing
    /// across successive calls.
    pub fn candidates(&mut self, length: usize, count: usize) -> Candidates<'_, R> {
        Candidates {
            draw: self,
            length,
            remaining: count,
        }
    }

    pub fn batch_id(&mut self) -> BatchId {
        BatchId::new(self.rng.random())
    }
}

/// Iterator returned by [`RandomDraw::candidates`].
pub struct Candidates<'a, R> {
    draw: &'a mut RandomDraw<R>,
    length: usize,
    remaining: usize,
}

impl<R: Rng> Iterator for Candidates<'_, R> {
    type Item = Code;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.draw.draw(self.length))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Rng> ExactSizeIterator for Candidates<'_, R> {}
