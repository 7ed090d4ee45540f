use rand::RngCore;

/// Alphabet for temporary passwords.
///
/// Visually ambiguous characters (`0`, `O`, `I`, `1`, `l`, `i`, `o`) are
/// excluded so a password read over the phone survives the trip.
pub const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// Length of every generated temporary password.
pub const TEMP_PASSWORD_LEN: usize = 12;

/// Generate a temporary one-time password.
///
/// Draws [`TEMP_PASSWORD_LEN`] bytes from the thread-local CSPRNG and maps
/// each into [`PASSWORD_ALPHABET`] by modulo. 256 is not a multiple of the
/// alphabet size, so the distribution leans slightly toward the front of
/// the alphabet; accepted for a single-use credential.
pub fn generate_temp_password() -> String {
    let mut bytes = [0u8; TEMP_PASSWORD_LEN];
    rand::rng().fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| PASSWORD_ALPHABET[*b as usize % PASSWORD_ALPHABET.len()] as char)
        .collect()
}
