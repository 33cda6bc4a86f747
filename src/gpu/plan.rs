// ============================================================================
// PASS PLAN — which texture each pass reads and writes
// ============================================================================
//
// Planning happens after resolution and compilation, over runnable layers
// only.  The ping-pong index therefore advances only on passes that execute,
// and a skipped layer can never leave the result stranded in an offscreen
// target or make a later pass read a target nobody wrote.

/// A texture a pass can read from or write to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The uploaded source image.
    Source,
    /// One of the two pooled offscreen targets.
    Target(usize),
    /// The visible surface.
    Surface,
}

/// Where the last pass of a chain should land.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainEnd {
    Surface,
    /// Leave the result in a pooled target (split view composites first,
    /// then blits the two halves onto the surface).
    Offscreen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedPass {
    /// Index into the runnable-layer list.
    pub layer: usize,
    pub input: Slot,
    pub output: Slot,
}

/// Ordered passes for `runnable` executing layers.
pub fn plan_passes(runnable: usize, end: ChainEnd) -> Vec<PlannedPass> {
    (0..runnable)
        .map(|i| {
            let input = if i == 0 { Slot::Source } else { Slot::Target((i - 1) % 2) };
            let last = i + 1 == runnable;
            let output = if last && end == ChainEnd::Surface {
                Slot::Surface
            } else {
                Slot::Target(i % 2)
            };
            PlannedPass { layer: i, input, output }
        })
        .collect()
}

/// Slot holding the chain result once all passes ran (`Source` when empty).
pub fn final_slot(passes: &[PlannedPass]) -> Slot {
    passes.last().map(|p| p.output).unwrap_or(Slot::Source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_chain_has_no_passes() {
        assert!(plan_passes(0, ChainEnd::Surface).is_empty());
        assert_eq!(final_slot(&[]), Slot::Source);
    }

    #[test]
    fn single_pass_goes_straight_to_surface() {
        let p = plan_passes(1, ChainEnd::Surface);
        assert_eq!(p, vec![PlannedPass { layer: 0, input: Slot::Source, output: Slot::Surface }]);
    }

    #[test]
    fn targets_alternate() {
        let p = plan_passes(4, ChainEnd::Surface);
        let io: Vec<_> = p.iter().map(|p| (p.input, p.output)).collect();
        assert_eq!(
            io,
            vec![
                (Slot::Source, Slot::Target(0)),
                (Slot::Target(0), Slot::Target(1)),
                (Slot::Target(1), Slot::Target(0)),
                (Slot::Target(0), Slot::Surface),
            ]
        );
    }

    #[test]
    fn offscreen_chain_ends_in_a_target() {
        let p = plan_passes(3, ChainEnd::Offscreen);
        assert_eq!(final_slot(&p), Slot::Target(0));
        let p = plan_passes(2, ChainEnd::Offscreen);
        assert_eq!(final_slot(&p), Slot::Target(1));
    }

    proptest! {
        #[test]
        fn passes_never_read_what_they_write(n in 0usize..64, offscreen in any::<bool>()) {
            let end = if offscreen { ChainEnd::Offscreen } else { ChainEnd::Surface };
            let passes = plan_passes(n, end);
            prop_assert_eq!(passes.len(), n);
            for (i, p) in passes.iter().enumerate() {
                prop_assert_ne!(p.input, p.output);
                prop_assert_ne!(p.input, Slot::Surface);
                if i > 0 {
                    // Each pass reads exactly what the previous pass wrote.
                    prop_assert_eq!(p.input, passes[i - 1].output);
                }
                if p.output == Slot::Surface {
                    prop_assert_eq!(i + 1, n);
                }
            }
            if n > 0 {
                let expected_surface = end == ChainEnd::Surface;
                prop_assert_eq!(final_slot(&passes) == Slot::Surface, expected_surface);
            }
        }
    }
}
