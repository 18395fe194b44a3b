//! Byte-shuffle filter.
//!
//! Groups byte `k` of every scalar together so that slowly varying numeric
//! data turns into long runs the codec can exploit. A trailing remainder
//! shorter than one scalar is copied through untouched.

pub fn shuffle(typesize: usize, src: &[u8]) -> Vec<u8> {
    if typesize <= 1 {
        return src.to_vec();
    }
    let n = src.len() / typesize;
    let body = n * typesize;
    let mut out = vec![0u8; src.len()];
    for (i, item) in src[..body].chunks_exact(typesize).enumerate() {
        for (b, byte) in item.iter().enumerate() {
            out[b * n + i] = *byte;
        }
    }
    out[body..].copy_from_slice(&src[body..]);
    out
}

pub fn unshuffle(typesize: usize, src: &[u8]) -> Vec<u8> {
    if typesize <= 1 {
        return src.to_vec();
    }
    let n = src.len() / typesize;
    let body = n * typesize;
    let mut out = vec![0u8; src.len()];
    for (i, item) in out[..body].chunks_exact_mut(typesize).enumerate() {
        for (b, byte) in item.iter_mut().enumerate() {
            *byte = src[b * n + i];
        }
    }
    out[body..].copy_from_slice(&src[body..]);
    out
}
