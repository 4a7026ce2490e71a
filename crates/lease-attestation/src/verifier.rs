//! Signer recovery and authorization.

use lease_core::{Digest, Principal, RecoverableSignature, SIGNATURE_LEN, VerifierRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AttestationError, Result};
use crate::replay::UsedMessageSet;
use crate::report::{AttestationDomain, UsageReport};

/// Whether `valid` signatures out of a `verifiers`-strong set reach the
/// two-thirds supermajority (`valid * 3 >= verifiers * 2`).
#[must_use]
pub const fn meets_quorum(valid: usize, verifiers: usize) -> bool {
    valid.saturating_mul(3) >= verifiers.saturating_mul(2)
}

/// Capacity in which a single signer was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerRole {
    /// The app's delegated operator.
    Operator,
    /// The app's owner.
    Owner,
    /// The app's legacy verifier, active in the verifier registry.
    Verifier,
}

/// Principals allowed to attest usage for one app.
///
/// An empty `verifiers` list selects single-signer mode; otherwise the
/// quorum of `verifiers` decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignerSet<'a> {
    /// App owner.
    pub owner: Principal,
    /// App operator.
    pub operator: Option<Principal>,
    /// Single verifier accepted in single-signer mode.
    pub legacy_verifier: Option<Principal>,
    /// Quorum verifier set.
    pub verifiers: &'a [Principal],
}

impl SignerSet<'static> {
    /// A single-signer set.
    #[must_use]
    pub const fn single(
        owner: Principal,
        operator: Option<Principal>,
        legacy_verifier: Option<Principal>,
    ) -> Self {
        Self {
            owner,
            operator,
            legacy_verifier,
            verifiers: &[],
        }
    }
}

impl<'a> SignerSet<'a> {
    /// A quorum set over `verifiers`.
    #[must_use]
    pub const fn quorum(owner: Principal, verifiers: &'a [Principal]) -> Self {
        Self {
            owner,
            operator: None,
            legacy_verifier: None,
            verifiers,
        }
    }

    /// Whether verification uses the quorum.
    #[must_use]
    pub const fn is_quorum(&self) -> bool {
        !self.verifiers.is_empty()
    }
}

/// How an attestation was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// One authorized signer.
    Single {
        /// Recovered signer.
        signer: Principal,
        /// Why the signer was accepted.
        role: SignerRole,
    },
    /// A supermajority of the verifier set.
    Quorum {
        /// Signatures counted toward the threshold.
        valid: usize,
        /// Size of the verifier set.
        verifiers: usize,
    },
}

impl Verdict {
    /// The recovered signer in single-signer mode.
    #[must_use]
    pub const fn signer(&self) -> Option<Principal> {
        match self {
            Self::Single { signer, .. } => Some(*signer),
            Self::Quorum { .. } => None,
        }
    }

    /// The signer when it was accepted as a verifier; it earns the verifier fee.
    #[must_use]
    pub const fn fee_verifier(&self) -> Option<Principal> {
        match self {
            Self::Single {
                signer,
                role: SignerRole::Verifier,
            } => Some(*signer),
            _ => None,
        }
    }
}

/// An accepted attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Consumed digest.
    pub digest: Digest,
    /// How it was accepted.
    pub verdict: Verdict,
}

/// Checks `signatures` over `digest` against `signers`, without touching
/// replay state.
///
/// # Errors
///
/// Returns an error if the payload is malformed, the single signer is not
/// authorized, or the quorum is not met.
pub fn verify<R: VerifierRegistry + ?Sized>(
    digest: &Digest,
    signatures: &[u8],
    signers: &SignerSet<'_>,
    registry: &R,
) -> Result<Verdict> {
    if signers.is_quorum() {
        verify_quorum(digest, signatures, signers.verifiers, registry)
    } else {
        verify_single(digest, signatures, signers, registry)
    }
}

fn verify_single<R: VerifierRegistry + ?Sized>(
    digest: &Digest,
    signatures: &[u8],
    signers: &SignerSet<'_>,
    registry: &R,
) -> Result<Verdict> {
    if signatures.len() != SIGNATURE_LEN {
        return Err(AttestationError::MalformedPayload {
            len: signatures.len(),
        });
    }
    let signer = RecoverableSignature::from_slice(signatures)?.recover(digest)?;

    let role = if signers.operator == Some(signer) {
        SignerRole::Operator
    } else if signer == signers.owner {
        SignerRole::Owner
    } else if signers.legacy_verifier == Some(signer) && registry.is_active(&signer) {
        SignerRole::Verifier
    } else {
        return Err(AttestationError::UnauthorizedSigner(signer));
    };
    Ok(Verdict::Single { signer, role })
}

// Repeated signers are counted once per occurrence.
fn verify_quorum<R: VerifierRegistry + ?Sized>(
    digest: &Digest,
    signatures: &[u8],
    verifiers: &[Principal],
    registry: &R,
) -> Result<Verdict> {
    if signatures.is_empty() || signatures.len() % SIGNATURE_LEN != 0 {
        return Err(AttestationError::MalformedPayload {
            len: signatures.len(),
        });
    }

    let mut valid = 0usize;
    for chunk in signatures.chunks_exact(SIGNATURE_LEN) {
        let recovered = RecoverableSignature::from_slice(chunk).and_then(|s| s.recover(digest));
        match recovered {
            Ok(signer) if verifiers.contains(&signer) && registry.is_active(&signer) => {
                valid += 1;
            }
            Ok(signer) => debug!(%signer, "ignoring signature from non-verifier"),
            Err(e) => debug!(error = %e, "ignoring unrecoverable signature"),
        }
    }

    if meets_quorum(valid, verifiers.len()) {
        Ok(Verdict::Quorum {
            valid,
            verifiers: verifiers.len(),
        })
    } else {
        Err(AttestationError::QuorumNotMet {
            valid,
            verifiers: verifiers.len(),
        })
    }
}

/// Verifies usage attestations for one deployment and remembers every
/// digest it has accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationVerifier {
    domain: AttestationDomain,
    used: UsedMessageSet,
}

impl AttestationVerifier {
    /// Creates a verifier with no consumed digests.
    #[must_use]
    pub fn new(domain: AttestationDomain) -> Self {
        Self {
            domain,
            used: UsedMessageSet::new(),
        }
    }

    /// The domain digests are bound to.
    #[must_use]
    pub const fn domain(&self) -> &AttestationDomain {
        &self.domain
    }

    /// Digest of `report` in this domain.
    #[must_use]
    pub fn digest(&self, report: &UsageReport) -> Digest {
        report.digest(&self.domain)
    }

    /// Whether `digest` has been consumed.
    #[must_use]
    pub fn is_consumed(&self, digest: &Digest) -> bool {
        self.used.contains(digest)
    }

    /// Consumed digests.
    #[must_use]
    pub const fn used(&self) -> &UsedMessageSet {
        &self.used
    }

    /// Checks `report` against replay and its signers without consuming it.
    ///
    /// Callers that must validate more before committing pair this with
    /// [`AttestationVerifier::commit`].
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Replay`] for a consumed digest, or the
    /// verification error.
    pub fn check<R: VerifierRegistry + ?Sized>(
        &self,
        report: &UsageReport,
        signatures: &[u8],
        signers: &SignerSet<'_>,
        registry: &R,
    ) -> Result<Attestation> {
        let digest = self.digest(report);
        self.used.check(&digest)?;
        let verdict = verify(&digest, signatures, signers, registry)?;
        Ok(Attestation { digest, verdict })
    }

    /// Consumes the digest of a checked attestation.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Replay`] if the digest was consumed in the
    /// meantime.
    pub fn commit(&mut self, attestation: &Attestation) -> Result<()> {
        self.used.consume(attestation.digest)?;
        info!(
            digest = %attestation.digest,
            signer = ?attestation.verdict.signer(),
            "attestation accepted"
        );
        Ok(())
    }

    /// Verifies `report` and consumes its digest.
    ///
    /// The replay check happens before any signature is recovered.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Replay`] for a consumed digest, or the
    /// verification error.
    pub fn attest<R: VerifierRegistry + ?Sized>(
        &mut self,
        report: &UsageReport,
        signatures: &[u8],
        signers: &SignerSet<'_>,
        registry: &R,
    ) -> Result<Attestation> {
        let attestation = self.check(report, signatures, signers, registry)?;
        self.commit(&attestation)?;
        Ok(attestation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::SignedUsageReport;
    use lease_core::{AppId, ErrorKind, ProviderId, VerifierRoster, Wallet};
    use proptest::prelude::*;
    use test_case::test_case;

    fn report(timestamp: u64) -> UsageReport {
        UsageReport::new(ProviderId::new(1), AppId::new(1), "12D3KooWpeer")
            .with_cpu(500)
            .with_duration(60)
            .with_timestamp(timestamp)
    }

    fn signed(wallets: &[&Wallet]) -> SignedUsageReport {
        SignedUsageReport::sign(report(1), &AttestationDomain::default(), wallets).unwrap()
    }

    struct Quorum {
        wallets: Vec<Wallet>,
        principals: Vec<Principal>,
        roster: VerifierRoster,
    }

    fn quorum(n: usize) -> Quorum {
        let wallets: Vec<Wallet> = (0..n).map(|_| Wallet::new()).collect();
        let principals: Vec<Principal> = wallets.iter().map(Wallet::principal).collect();
        let mut roster = VerifierRoster::new();
        for p in &principals {
            roster.activate(*p);
        }
        Quorum {
            wallets,
            principals,
            roster,
        }
    }

    // =========================================================================
    // Single-signer mode
    // =========================================================================

    #[test]
    fn operator_and_owner_are_accepted() {
        let owner = Wallet::new();
        let operator = Wallet::new();
        let signers = SignerSet::single(owner.principal(), Some(operator.principal()), None);
        let roster = VerifierRoster::new();

        let s = signed(&[&operator]);
        let digest = s.report.digest(&AttestationDomain::default());
        let verdict = verify(&digest, &s.signatures, &signers, &roster).unwrap();
        assert_eq!(verdict.signer(), Some(operator.principal()));
        assert_eq!(verdict.fee_verifier(), None);

        let s = signed(&[&owner]);
        let verdict = verify(&digest, &s.signatures, &signers, &roster).unwrap();
        assert!(matches!(verdict, Verdict::Single { role: SignerRole::Owner, .. }));
    }

    #[test]
    fn legacy_verifier_must_be_active() {
        let owner = Wallet::new();
        let verifier = Wallet::new();
        let signers = SignerSet::single(owner.principal(), None, Some(verifier.principal()));
        let mut roster = VerifierRoster::new();
        let s = signed(&[&verifier]);
        let digest = s.report.digest(&AttestationDomain::default());

        let err = verify(&digest, &s.signatures, &signers, &roster).unwrap_err();
        assert!(matches!(err, AttestationError::UnauthorizedSigner(_)));

        roster.activate(verifier.principal());
        let verdict = verify(&digest, &s.signatures, &signers, &roster).unwrap();
        assert_eq!(verdict.fee_verifier(), Some(verifier.principal()));
    }

    #[test]
    fn stranger_is_rejected() {
        let owner = Wallet::new();
        let stranger = Wallet::new();
        let signers = SignerSet::single(owner.principal(), None, None);
        let s = signed(&[&stranger]);
        let digest = s.report.digest(&AttestationDomain::default());
        let err = verify(&digest, &s.signatures, &signers, &VerifierRoster::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn signature_over_other_report_recovers_someone_else() {
        let owner = Wallet::new();
        let signers = SignerSet::single(owner.principal(), None, None);
        let s = signed(&[&owner]);
        let other = report(2).digest(&AttestationDomain::default());
        assert!(verify(&other, &s.signatures, &signers, &VerifierRoster::new()).is_err());
    }

    #[test_case(0; "empty")]
    #[test_case(64; "short")]
    #[test_case(130; "two signatures")]
    fn single_mode_needs_exactly_one_signature(len: usize) {
        let signers = SignerSet::single(Principal::ZERO, None, None);
        let err = verify(&Digest::from_bytes([1; 32]), &vec![0u8; len], &signers, &VerifierRoster::new())
            .unwrap_err();
        assert!(matches!(err, AttestationError::MalformedPayload { len: l } if l == len));
    }

    // =========================================================================
    // Quorum mode
    // =========================================================================

    #[test]
    fn two_of_three_meets_quorum() {
        let q = quorum(3);
        let signers = SignerSet::quorum(Principal::ZERO, &q.principals);
        let s = signed(&[&q.wallets[0], &q.wallets[2]]);
        let digest = s.report.digest(&AttestationDomain::default());
        let verdict = verify(&digest, &s.signatures, &signers, &q.roster).unwrap();
        assert_eq!(verdict, Verdict::Quorum { valid: 2, verifiers: 3 });
        assert_eq!(verdict.fee_verifier(), None);
    }

    #[test]
    fn one_of_three_fails() {
        let q = quorum(3);
        let signers = SignerSet::quorum(Principal::ZERO, &q.principals);
        let s = signed(&[&q.wallets[1]]);
        let digest = s.report.digest(&AttestationDomain::default());
        let err = verify(&digest, &s.signatures, &signers, &q.roster).unwrap_err();
        assert!(matches!(err, AttestationError::QuorumNotMet { valid: 1, verifiers: 3 }));
    }

    #[test]
    fn repeated_signer_counts_twice() {
        // one verifier submitting its signature twice reaches 2 of 3
        let q = quorum(3);
        let signers = SignerSet::quorum(Principal::ZERO, &q.principals);
        let s = signed(&[&q.wallets[0], &q.wallets[0]]);
        let digest = s.report.digest(&AttestationDomain::default());
        let verdict = verify(&digest, &s.signatures, &signers, &q.roster).unwrap();
        assert_eq!(verdict, Verdict::Quorum { valid: 2, verifiers: 3 });
    }

    #[test]
    fn inactive_and_unlisted_signers_do_not_count() {
        let mut q = quorum(3);
        q.roster.deactivate(&q.principals[1]);
        let outsider = Wallet::new();
        let signers = SignerSet::quorum(Principal::ZERO, &q.principals);
        let s = signed(&[&q.wallets[0], &q.wallets[1], &outsider]);
        let digest = s.report.digest(&AttestationDomain::default());
        let err = verify(&digest, &s.signatures, &signers, &q.roster).unwrap_err();
        assert!(matches!(err, AttestationError::QuorumNotMet { valid: 1, .. }));
    }

    #[test]
    fn garbage_chunks_are_skipped() {
        let q = quorum(3);
        let signers = SignerSet::quorum(Principal::ZERO, &q.principals);
        let mut s = signed(&[&q.wallets[0], &q.wallets[1]]);
        s.signatures.extend_from_slice(&[0xff; SIGNATURE_LEN]);
        let digest = s.report.digest(&AttestationDomain::default());
        let verdict = verify(&digest, &s.signatures, &signers, &q.roster).unwrap();
        assert_eq!(verdict, Verdict::Quorum { valid: 2, verifiers: 3 });
    }

    #[test]
    fn ragged_quorum_payload_is_malformed() {
        let q = quorum(3);
        let signers = SignerSet::quorum(Principal::ZERO, &q.principals);
        let err = verify(&Digest::from_bytes([0; 32]), &[0u8; 100], &signers, &q.roster).unwrap_err();
        assert!(matches!(err, AttestationError::MalformedPayload { len: 100 }));
    }

    #[test_case(0, 1, false; "none of one")]
    #[test_case(1, 1, true; "one of one")]
    #[test_case(1, 2, false; "one of two")]
    #[test_case(2, 3, true; "two of three")]
    #[test_case(2, 4, false; "two of four")]
    #[test_case(3, 4, true; "three of four")]
    #[test_case(4, 6, true; "four of six")]
    fn quorum_table(valid: usize, verifiers: usize, expected: bool) {
        assert_eq!(meets_quorum(valid, verifiers), expected);
    }

    proptest! {
        #[test]
        fn quorum_is_ceil_two_thirds(valid in 0usize..1_000, verifiers in 1usize..1_000) {
            let needed = (2 * verifiers).div_ceil(3);
            prop_assert_eq!(meets_quorum(valid, verifiers), valid >= needed);
        }
    }

    // =========================================================================
    // Replay protection
    // =========================================================================

    #[test]
    fn attest_consumes_digest_once() {
        let owner = Wallet::new();
        let signers = SignerSet::single(owner.principal(), None, None);
        let roster = VerifierRoster::new();
        let mut verifier = AttestationVerifier::new(AttestationDomain::default());
        let s = signed(&[&owner]);

        let attestation = verifier.attest(&s.report, &s.signatures, &signers, &roster).unwrap();
        assert!(verifier.is_consumed(&attestation.digest));

        let err = verifier
            .attest(&s.report, &s.signatures, &signers, &roster)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Replay);
        assert_eq!(verifier.used().len(), 1);
    }

    #[test]
    fn rejected_attestation_is_not_consumed() {
        let owner = Wallet::new();
        let stranger = Wallet::new();
        let signers = SignerSet::single(owner.principal(), None, None);
        let roster = VerifierRoster::new();
        let mut verifier = AttestationVerifier::new(AttestationDomain::default());

        let forged = signed(&[&stranger]);
        assert!(verifier.attest(&forged.report, &forged.signatures, &signers, &roster).is_err());
        assert!(verifier.used().is_empty());

        let genuine = signed(&[&owner]);
        assert!(verifier.attest(&genuine.report, &genuine.signatures, &signers, &roster).is_ok());
    }

    #[test]
    fn check_leaves_digest_unconsumed_until_commit() {
        let owner = Wallet::new();
        let signers = SignerSet::single(owner.principal(), None, None);
        let roster = VerifierRoster::new();
        let mut verifier = AttestationVerifier::new(AttestationDomain::default());
        let s = signed(&[&owner]);

        let attestation = verifier.check(&s.report, &s.signatures, &signers, &roster).unwrap();
        assert!(!verifier.is_consumed(&attestation.digest));
        verifier.commit(&attestation).unwrap();
        assert!(verifier.is_consumed(&attestation.digest));

        let err = verifier.commit(&attestation).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Replay);
    }
}
