//! Trust root checks
//!
//! Validates the CA bundle used for `verify-full` connections before any
//! connection is attempted, so a broken bundle surfaces as a configuration
//! error instead of an opaque TLS handshake failure.

use anyhow::{bail, Context, Result};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::X509;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Certificates expiring within this window are logged as warnings.
pub const EXPIRY_WARNING_SECS: u64 = 30 * 86400;

/// Summary of a validated CA bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRoot {
    pub certificates: usize,
    pub expiring_soon: usize,
}

/// Parse the PEM bundle at `path` and check that it can still anchor a chain.
///
/// Fails if the file is missing, holds no certificates, or every certificate
/// in it has already expired.
pub fn validate_trust_root(path: &Path) -> Result<TrustRoot> {
    let pem = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let certs = X509::stack_from_pem(&pem)
        .with_context(|| format!("Failed to parse {} as PEM", path.display()))?;

    if certs.is_empty() {
        bail!("{} contains no certificates", path.display());
    }

    let mut expired = 0;
    let mut expiring_soon = 0;
    for cert in &certs {
        if cert_expires_within(cert, 0)? {
            expired += 1;
        } else if cert_expires_within(cert, EXPIRY_WARNING_SECS)? {
            expiring_soon += 1;
            warn!(
                subject = ?cert.subject_name(),
                "Trust root certificate expires within 30 days"
            );
        }
    }

    if expired == certs.len() {
        bail!("every certificate in {} has expired", path.display());
    }

    info!(
        path = %path.display(),
        certificates = certs.len(),
        expired,
        "Trust root loaded"
    );

    Ok(TrustRoot {
        certificates: certs.len(),
        expiring_soon,
    })
}

/// Check if a certificate will expire within the given seconds
pub fn cert_expires_within(cert: &X509, seconds: u64) -> Result<bool> {
    Ok(seconds_until(cert.not_after())? < seconds as i64)
}

fn seconds_until(not_after: &Asn1TimeRef) -> Result<i64> {
    let now = Asn1Time::days_from_now(0).context("Failed to get current time")?;
    // diff returns `compare - self`
    let diff = now
        .diff(not_after)
        .context("Failed to compute time difference")?;
    Ok(diff.days as i64 * 86400 + diff.secs as i64)
}
