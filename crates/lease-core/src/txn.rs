//! All-or-nothing execution.

/// Runs `op` against a working copy of `state` and commits it only if `op`
/// succeeds.
///
/// Any error leaves `state` exactly as it was before the call, including
/// mutations `op` made before failing.
///
/// The working copy is a full `Clone` of `state`, so each call costs time
/// and memory proportional to the size of `state`. For a ledger that
/// includes every history that only grows, such as the set of consumed
/// attestation digests.
pub fn atomically<S, T, E>(state: &mut S, op: impl FnOnce(&mut S) -> Result<T, E>) -> Result<T, E>
where
    S: Clone,
{
    let mut working = state.clone();
    let out = op(&mut working)?;
    *state = working;
    Ok(out)
}
