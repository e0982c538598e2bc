//! One compare-exchange pass of the network.
//!
//! Every element computes its own output from the previous buffer only. Both
//! members of a pair reach the same decision, so the pair is exchanged without
//! any element writing outside its own slot.

use rayon::prelude::*;

use crate::grid::PassDescriptor;

/// Output for slot `index` after `pass`, read from `read`.
pub fn exchange_value(read: &[f32], index: u32, pass: PassDescriptor) -> f32 {
    let pairing = pass.pairing(index);
    let a = read[index as usize];
    let b = read[pairing.partner as usize];
    if (a > b) == pairing.ascending { b } else { a }
}

/// Writes the whole of `write` from `read`. The two slices must be distinct
/// buffers of equal length.
pub fn run_pass(read: &[f32], write: &mut [f32], pass: PassDescriptor) {
    debug_assert_eq!(read.len(), write.len());
    write.par_iter_mut().enumerate().for_each(|(i, out)| {
        *out = exchange_value(read, i as u32, pass);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(b: u32, s: u32) -> PassDescriptor {
        PassDescriptor::new(b, s).unwrap()
    }

    #[test]
    fn test_pair_ascending() {
        let read = [5.0, 3.0];
        let mut write = [0.0; 2];
        run_pass(&read, &mut write, pass(0, 0));
        assert_eq!(write, [3.0, 5.0]);
    }

    #[test]
    fn test_pair_descending_block() {
        // indices 2,3 sort descending at level 0
        let read = [1.0, 2.0, 3.0, 4.0];
        let mut write = [0.0; 4];
        run_pass(&read, &mut write, pass(0, 0));
        assert_eq!(write, [1.0, 2.0, 4.0, 3.0]);
    }

    #[test]
    fn test_ties_keep_values() {
        let read = [2.0, 2.0, 2.0, 2.0];
        let mut write = [0.0; 4];
        run_pass(&read, &mut write, pass(1, 0));
        assert_eq!(write, read);
    }

    #[test]
    fn test_reads_only_previous_buffer() {
        let read = [4.0, 3.0, 2.0, 1.0];
        let mut write = [f32::NAN; 4];
        run_pass(&read, &mut write, pass(1, 0));
        assert_eq!(write, [2.0, 1.0, 4.0, 3.0]);
    }

    #[test]
    fn test_exchange_value_matches_pair() {
        let read = [0.9, 0.1, 0.5, 0.7];
        let p = pass(1, 0);
        assert_eq!(exchange_value(&read, 0, p), 0.5);
        assert_eq!(exchange_value(&read, 2, p), 0.9);
        assert_eq!(exchange_value(&read, 1, p), 0.1);
        assert_eq!(exchange_value(&read, 3, p), 0.7);
    }
}
