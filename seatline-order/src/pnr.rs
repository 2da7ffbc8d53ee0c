use rand::Rng;

/// Crockford base32: no I, L, O or U.
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
pub const PNR_LEN: usize = 10;

pub fn generate_pnr() -> String {
    generate_with(&mut rand::thread_rng())
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..PNR_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_pnr_shape() {
        let pnr = generate_pnr();
        assert_eq!(pnr.len(), PNR_LEN);
        assert!(pnr.bytes().all(|b| ALPHABET.contains(&b)));
        assert!(!pnr.contains(['I', 'L', 'O', 'U']));
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = generate_with(&mut StdRng::seed_from_u64(7));
        let b = generate_with(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }
}
