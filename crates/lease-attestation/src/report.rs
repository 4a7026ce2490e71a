//! Usage reports and their domain-separated digests.

use lease_core::{AppId, CoreError, Digest, Principal, ProviderId, Wallet};
use serde::{Deserialize, Serialize};

/// Key-derivation context for the domain separator.
const DOMAIN_CONTEXT: &str = "lease-network 2024 attestation domain";

/// Key-derivation context for usage report digests.
const REPORT_CONTEXT: &str = "lease-network 2024 usage report";

/// Deployment a signature is valid for.
///
/// Signatures made for one domain never verify in another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationDomain {
    /// Human-readable deployment name.
    pub name: String,
    /// Protocol version.
    pub version: String,
    /// Network the deployment lives on.
    pub chain_id: u64,
    /// Address of the settlement deployment.
    pub verifying_contract: Principal,
}

impl Default for AttestationDomain {
    fn default() -> Self {
        Self {
            name: "LeaseNetwork".to_string(),
            version: "1".to_string(),
            chain_id: 1,
            verifying_contract: Principal::ZERO,
        }
    }
}

impl AttestationDomain {
    /// Hash binding every field of the domain.
    #[must_use]
    pub fn separator(&self) -> Digest {
        let mut hasher = blake3::Hasher::new_derive_key(DOMAIN_CONTEXT);
        write_str(&mut hasher, &self.name);
        write_str(&mut hasher, &self.version);
        hasher.update(&self.chain_id.to_be_bytes());
        hasher.update(self.verifying_contract.as_slice());
        hasher.finalize().into()
    }
}

/// Resource consumption of one provider node on behalf of one app.
///
/// Counters are absolute values for the reported interval, not deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Provider being credited.
    pub provider: ProviderId,
    /// App being charged.
    pub app: AppId,
    /// Node that did the work.
    pub peer_id: String,
    /// CPU cores.
    pub used_cpu: u64,
    /// GPU units.
    pub used_gpu: u64,
    /// Memory.
    pub used_memory: u64,
    /// Storage.
    pub used_storage: u64,
    /// Bytes uploaded.
    pub used_upload_bytes: u64,
    /// Bytes downloaded.
    pub used_download_bytes: u64,
    /// Interval length in seconds.
    pub duration: u64,
    /// Signer-asserted report time; makes otherwise equal reports distinct.
    pub timestamp: u64,
}

impl UsageReport {
    /// An empty report for `peer_id`.
    #[must_use]
    pub fn new(provider: ProviderId, app: AppId, peer_id: impl Into<String>) -> Self {
        Self {
            provider,
            app,
            peer_id: peer_id.into(),
            used_cpu: 0,
            used_gpu: 0,
            used_memory: 0,
            used_storage: 0,
            used_upload_bytes: 0,
            used_download_bytes: 0,
            duration: 0,
            timestamp: 0,
        }
    }

    /// Sets CPU usage.
    #[must_use]
    pub const fn with_cpu(mut self, used: u64) -> Self {
        self.used_cpu = used;
        self
    }

    /// Sets GPU usage.
    #[must_use]
    pub const fn with_gpu(mut self, used: u64) -> Self {
        self.used_gpu = used;
        self
    }

    /// Sets memory usage.
    #[must_use]
    pub const fn with_memory(mut self, used: u64) -> Self {
        self.used_memory = used;
        self
    }

    /// Sets storage usage.
    #[must_use]
    pub const fn with_storage(mut self, used: u64) -> Self {
        self.used_storage = used;
        self
    }

    /// Sets bandwidth usage.
    #[must_use]
    pub const fn with_bandwidth(mut self, upload: u64, download: u64) -> Self {
        self.used_upload_bytes = upload;
        self.used_download_bytes = download;
        self
    }

    /// Sets the interval length.
    #[must_use]
    pub const fn with_duration(mut self, secs: u64) -> Self {
        self.duration = secs;
        self
    }

    /// Sets the report time.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The digest signers sign for `domain`.
    ///
    /// Fixed-width big-endian fields in declaration order, with the peer id
    /// length-prefixed, under the domain separator.
    #[must_use]
    pub fn digest(&self, domain: &AttestationDomain) -> Digest {
        let mut hasher = blake3::Hasher::new_derive_key(REPORT_CONTEXT);
        hasher.update(domain.separator().as_bytes());
        hasher.update(&self.provider.get().to_be_bytes());
        hasher.update(&self.app.get().to_be_bytes());
        write_str(&mut hasher, &self.peer_id);
        for field in [
            self.used_cpu,
            self.used_gpu,
            self.used_memory,
            self.used_storage,
            self.used_upload_bytes,
            self.used_download_bytes,
            self.duration,
            self.timestamp,
        ] {
            hasher.update(&field.to_be_bytes());
        }
        hasher.finalize().into()
    }
}

fn write_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_be_bytes());
    hasher.update(s.as_bytes());
}

/// A usage report with its concatenated signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUsageReport {
    /// The report.
    pub report: UsageReport,
    /// One or more 65-byte signatures, back to back.
    pub signatures: Vec<u8>,
}

impl SignedUsageReport {
    /// Signs `report` for `domain` with every wallet, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if any wallet fails to sign.
    pub fn sign(
        report: UsageReport,
        domain: &AttestationDomain,
        wallets: &[&Wallet],
    ) -> Result<Self, CoreError> {
        let digest = report.digest(domain);
        let mut signatures = Vec::with_capacity(wallets.len() * lease_core::SIGNATURE_LEN);
        for wallet in wallets {
            signatures.extend_from_slice(wallet.sign_digest(&digest)?.as_bytes());
        }
        Ok(Self { report, signatures })
    }
}
