/// Property tests over random contents and chunk layouts.
use std::sync::Arc;

use carray_codecs::{Lz4Codec, ZstdCodec};
use carray_core::{ArrayOptions, CArray, CParams, Value};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn opts(chunklen: usize, clevel: u8, lz4: bool) -> ArrayOptions {
    let base = if lz4 {
        ArrayOptions::new(Arc::new(Lz4Codec))
    } else {
        ArrayOptions::new(Arc::new(ZstdCodec))
    };
    base.chunklen(chunklen)
        .cparams(CParams::new(clevel, clevel % 2 == 1).unwrap())
}

/// Every stored chunk holds exactly `chunklen` items and the leftover holds
/// fewer.
fn check_layout(c: &CArray) -> Result<(), TestCaseError> {
    for (i, chunk) in c.store().chunks().iter().enumerate() {
        prop_assert_eq!(chunk.nitems(), c.chunklen(), "chunk {}", i);
    }
    prop_assert!(c.leftover_len() < c.chunklen());
    prop_assert_eq!(c.nchunks() * c.chunklen() + c.leftover_len(), c.len());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn content_survives_any_chunk_layout(
        values in prop::collection::vec(any::<i32>(), 0..600),
        chunklen in 1..80usize,
        clevel in 0..=9u8,
        lz4 in any::<bool>(),
    ) {
        let c = CArray::from_slice(&values, &opts(chunklen, clevel, lz4)).unwrap();
        prop_assert_eq!(c.len(), values.len());
        check_layout(&c)?;
        prop_assert_eq!(c.to_vec::<i32>().unwrap(), values);
    }

    #[test]
    fn appends_in_pieces_equal_one_append(
        values in prop::collection::vec(any::<f64>().prop_filter("finite", |v| v.is_finite()), 1..400),
        cuts in prop::collection::vec(0..400usize, 0..6),
        chunklen in 1..50usize,
    ) {
        let o = opts(chunklen, 5, false);
        let mut c = CArray::from_slice::<f64>(&[], &o).unwrap();
        let mut bounds: Vec<usize> = cuts.into_iter().map(|k| k % values.len()).collect();
        bounds.push(0);
        bounds.push(values.len());
        bounds.sort_unstable();
        for w in bounds.windows(2) {
            c.append_slice(&values[w[0]..w[1]]).unwrap();
        }
        prop_assert_eq!(c.len(), values.len());
        check_layout(&c)?;
        prop_assert_eq!(c.to_vec::<f64>().unwrap(), values);
    }

    #[test]
    fn slices_match_vec_slicing(
        values in prop::collection::vec(any::<i16>(), 0..300),
        start in 0..320usize,
        stop in 0..320usize,
        step in 1..9usize,
        chunklen in 1..40usize,
    ) {
        let c = CArray::from_slice(&values, &opts(chunklen, 3, true)).unwrap();
        match c.slice(start, stop, step) {
            Ok(got) => {
                let stop = stop.min(values.len()).max(start);
                let want: Vec<i16> = values[start..stop].iter().step_by(step).copied().collect();
                prop_assert_eq!(got.to_vec::<i16>().unwrap(), want);
            }
            Err(e) => {
                prop_assert!(start > values.len());
                prop_assert_eq!(e.code(), "INVALID_ARGUMENT");
            }
        }
    }

    #[test]
    fn filter_picks_exactly_the_true_positions(
        pairs in prop::collection::vec((any::<u16>(), any::<bool>()), 0..500),
        chunklen in 1..64usize,
        mask_chunklen in 1..64usize,
    ) {
        let (values, flags): (Vec<u16>, Vec<bool>) = pairs.into_iter().unzip();
        let c = CArray::from_slice(&values, &opts(chunklen, 1, false)).unwrap();
        let mask = CArray::from_slice(&flags, &opts(mask_chunklen, 1, true)).unwrap();

        let picked: Vec<Value> = c.filter(&mask).unwrap().map(Result::unwrap).collect();
        let want: Vec<Value> = values
            .iter()
            .zip(&flags)
            .filter(|(_, f)| **f)
            .map(|(v, _)| Value::UInt16(*v))
            .collect();
        prop_assert_eq!(picked, want);

        let idx: Vec<usize> = mask.wheretrue().unwrap().map(Result::unwrap).collect();
        let want_idx: Vec<usize> = flags.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect();
        prop_assert_eq!(idx, want_idx);
    }

    #[test]
    fn truncate_then_regrow(
        values in prop::collection::vec(any::<i64>(), 1..300),
        keep in 0..300usize,
        chunklen in 1..32usize,
    ) {
        let keep = keep % (values.len() + 1);
        let mut c = CArray::from_slice(&values, &opts(chunklen, 5, false)).unwrap();
        c.truncate(keep).unwrap();
        prop_assert_eq!(c.len(), keep);
        check_layout(&c)?;
        prop_assert_eq!(c.to_vec::<i64>().unwrap(), values[..keep].to_vec());
        c.append_slice(&values[keep..]).unwrap();
        check_layout(&c)?;
        prop_assert_eq!(c.to_vec::<i64>().unwrap(), values);
    }
}
