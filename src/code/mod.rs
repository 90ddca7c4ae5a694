use rand::Rng;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const DEFAULT_CODE_LENGTH: usize = 5;

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// -----------------------------------------------------------------------------
// ----- Code Generator --------------------------------------------------------

/// Uniformly random uppercase code of `len` letters.
///
/// Codes are short and guessable; they identify a session, they do not
/// authorize anything. Uniqueness is left to whoever stores the code.
pub fn generate(len: usize) -> String {
    let mut rng = rand::rng();

    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
