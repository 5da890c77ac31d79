//! Incremental CRC64-ECMA with checksum combination.
//!
//! TOS integrity-checks uploads with CRC-64 in the XZ parameterization
//! (ECMA-182 polynomial, reflected, init and xor-out all ones). The digest
//! itself comes from `crc64fast`; this module adds the piece the transfer
//! manager needs on top: [`combine`], which merges two independently
//! computed checksums into the checksum of the concatenated data without
//! touching the bytes again. That is what lets per-part CRCs collapse into
//! a whole-object CRC while parts upload in parallel.

/// The ECMA-182 polynomial, bit-reflected to match the reflected algorithm.
const POLY_REFLECTED: u64 = 0xC96C_5795_D787_0F42;

/// Running CRC64-ECMA checksum.
///
/// Feeding data in one chunk or many produces the same result.
///
/// # Examples
///
/// ```
/// use tos_core::crc64::Crc64;
///
/// let mut whole = Crc64::new();
/// whole.update(b"hello world");
///
/// let mut split = Crc64::new();
/// split.update(b"hello ");
/// split.update(b"world");
///
/// assert_eq!(whole.finalize(), split.finalize());
/// ```
pub struct Crc64 {
    digest: crc64fast::Digest,
    len: u64,
}

impl Default for Crc64 {
    fn default() -> Self {
        Self {
            digest: crc64fast::Digest::new(),
            len: 0,
        }
    }
}

impl std::fmt::Debug for Crc64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc64")
            .field("crc", &self.finalize())
            .field("len", &self.len)
            .finish()
    }
}

impl Crc64 {
    /// Create an empty checksum state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a byte range into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.digest.write(data);
        self.len += data.len() as u64;
    }

    /// Current checksum value. Does not consume the state; more data may
    /// still be fed afterwards.
    #[must_use]
    pub fn finalize(&self) -> u64 {
        self.digest.sum64()
    }

    /// Number of bytes folded in so far.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether any bytes have been folded in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Compute the checksum of `data` in one shot.
    #[must_use]
    pub fn checksum(data: &[u8]) -> u64 {
        let mut crc = Self::new();
        crc.update(data);
        crc.finalize()
    }
}

/// Merge two finalized CRC64 values into the CRC64 of the concatenation.
///
/// `crc_a` covers some byte sequence `A`, `crc_b` covers `B` of length
/// `len_b`; the result equals the checksum of `A ++ B`. Uses the GF(2)
/// matrix-shift construction (the same scheme zlib uses for
/// `crc32_combine`), so no payload bytes are needed.
///
/// # Examples
///
/// ```
/// use tos_core::crc64::{Crc64, combine};
///
/// let data = b"the quick brown fox";
/// let (a, b) = data.split_at(7);
/// let merged = combine(Crc64::checksum(a), Crc64::checksum(b), b.len() as u64);
/// assert_eq!(merged, Crc64::checksum(data));
/// ```
#[must_use]
pub fn combine(crc_a: u64, crc_b: u64, len_b: u64) -> u64 {
    if len_b == 0 {
        return crc_a;
    }

    // odd starts as the operator that advances the CRC register by one bit.
    let mut odd = [0u64; 64];
    odd[0] = POLY_REFLECTED;
    let mut row = 1u64;
    for entry in odd.iter_mut().skip(1) {
        *entry = row;
        row <<= 1;
    }

    let mut even = [0u64; 64];
    gf2_matrix_square(&mut even, &odd); // two bits
    gf2_matrix_square(&mut odd, &even); // four bits

    // Advance crc_a over len_b zero bytes by repeated squaring, one matrix
    // application per set bit of len_b.
    let mut crc = crc_a;
    let mut len = len_b;
    loop {
        gf2_matrix_square(&mut even, &odd);
        if len & 1 != 0 {
            crc = gf2_matrix_times(&even, crc);
        }
        len >>= 1;
        if len == 0 {
            break;
        }

        gf2_matrix_square(&mut odd, &even);
        if len & 1 != 0 {
            crc = gf2_matrix_times(&odd, crc);
        }
        len >>= 1;
        if len == 0 {
            break;
        }
    }

    crc ^ crc_b
}

/// Fold a sequence of `(crc, len)` pairs into one checksum, in order.
///
/// Returns 0 for an empty sequence (the CRC64 of zero bytes).
#[must_use]
pub fn combine_all<I>(parts: I) -> u64
where
    I: IntoIterator<Item = (u64, u64)>,
{
    let mut iter = parts.into_iter();
    let Some((mut crc, _)) = iter.next() else {
        return 0;
    };
    for (part_crc, part_len) in iter {
        crc = combine(crc, part_crc, part_len);
    }
    crc
}

fn gf2_matrix_times(mat: &[u64; 64], mut vec: u64) -> u64 {
    let mut sum = 0;
    let mut idx = 0;
    while vec != 0 {
        if vec & 1 != 0 {
            sum ^= mat[idx];
        }
        vec >>= 1;
        idx += 1;
    }
    sum
}

fn gf2_matrix_square(square: &mut [u64; 64], mat: &[u64; 64]) {
    for n in 0..64 {
        square[n] = gf2_matrix_times(mat, mat[n]);
    }
}
