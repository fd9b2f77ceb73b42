use rand::Rng;

/// Characters eligible for room codes. Ambiguous glyphs (`0`/`O`, `1`/`I`)
/// are excluded so a code can be read aloud or retyped from a screenshot.
pub const CODE_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Default room code length. 32^6 ≈ 1 billion codes, so random draws
/// collide with live rooms essentially never.
pub const CODE_LENGTH: usize = 6;

/// Draw a random room code from `alphabet`.
///
/// Uniqueness against live rooms is the caller's job (redraw on
/// collision); this function only samples the code space.
pub fn generate_room_code(alphabet: &str, length: usize) -> String {
    let chars: Vec<char> = alphabet.chars().collect();
    let mut rng = rand::rng();
    (0..length)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect()
}

/// Check that a code has the expected length and draws only from `alphabet`.
pub fn is_valid_room_code(code: &str, alphabet: &str, length: usize) -> bool {
    code.chars().count() == length && code.chars().all(|c| alphabet.contains(c))
}
