// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client certificate and private key loading.
//!
//! Files may be PEM (`-----BEGIN CERTIFICATE-----` armor around base64) or
//! raw DER. Either way the loaded form is DER.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::debug;

use crate::error::AuthenticationError;

const CERTIFICATE_LABELS: &[&str] = &["CERTIFICATE"];
const PRIVATE_KEY_LABELS: &[&str] = &["PRIVATE KEY", "RSA PRIVATE KEY", "EC PRIVATE KEY"];

/// ASN.1 SEQUENCE tag; every DER certificate and key starts with it.
const DER_SEQUENCE: u8 = 0x30;

// =============================================================================
// ClientCertificate
// =============================================================================

/// A loaded certificate and private key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCertificate {
    /// Certificate file path.
    pub certificate_path: PathBuf,

    /// Private key file path.
    pub private_key_path: PathBuf,

    /// Certificate in DER form.
    pub certificate_der: Vec<u8>,

    /// Private key in DER form.
    pub private_key_der: Vec<u8>,
}

impl ClientCertificate {
    /// Reads and validates both files.
    pub async fn load(
        certificate_path: impl AsRef<Path>,
        private_key_path: impl AsRef<Path>,
    ) -> Result<Self, AuthenticationError> {
        let certificate_path = certificate_path.as_ref();
        let private_key_path = private_key_path.as_ref();

        let certificate_der = load_der("certificate", certificate_path, CERTIFICATE_LABELS).await?;
        let private_key_der = load_der("private key", private_key_path, PRIVATE_KEY_LABELS).await?;

        debug!(
            certificate = %certificate_path.display(),
            private_key = %private_key_path.display(),
            certificate_bytes = certificate_der.len(),
            "Loaded client certificate"
        );

        Ok(Self {
            certificate_path: certificate_path.to_path_buf(),
            private_key_path: private_key_path.to_path_buf(),
            certificate_der,
            private_key_der,
        })
    }
}

impl std::fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("certificate_path", &self.certificate_path)
            .field("private_key_path", &self.private_key_path)
            .field("certificate_der", &format_args!("<{} bytes>", self.certificate_der.len()))
            .field("private_key_der", &"<redacted>")
            .finish()
    }
}

async fn load_der(what: &'static str, path: &Path, labels: &[&str]) -> Result<Vec<u8>, AuthenticationError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AuthenticationError::unreadable(what, path, e))?;
    decode_pem_or_der(&bytes, labels).map_err(|reason| AuthenticationError::malformed(what, path, reason))
}

// =============================================================================
// Decoding
// =============================================================================

/// Decodes PEM with one of `labels`, or accepts DER as is.
pub fn decode_pem_or_der(bytes: &[u8], labels: &[&str]) -> Result<Vec<u8>, String> {
    if bytes.is_empty() {
        return Err("file is empty".to_string());
    }

    let looks_like_pem = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| bytes[start..].starts_with(b"-----BEGIN "))
        .unwrap_or(false);

    if looks_like_pem {
        let text = std::str::from_utf8(bytes).map_err(|_| "PEM file is not valid UTF-8".to_string())?;
        return decode_pem(text, labels);
    }

    if bytes[0] != DER_SEQUENCE || bytes.len() < 2 {
        return Err("neither PEM nor DER".to_string());
    }
    Ok(bytes.to_vec())
}

fn decode_pem(text: &str, labels: &[&str]) -> Result<Vec<u8>, String> {
    let mut lines = text.lines().map(str::trim);

    let label = loop {
        let line = lines
            .next()
            .ok_or_else(|| format!("no PEM block labelled {}", labels.join(" or ")))?;
        let found = line
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.strip_suffix("-----"))
            .filter(|label| labels.contains(label));
        if let Some(label) = found {
            break label;
        }
    };

    let end_marker = format!("-----END {}-----", label);
    let mut body = String::new();
    for line in lines.by_ref() {
        if line == end_marker {
            let der = BASE64
                .decode(body.as_bytes())
                .map_err(|e| format!("invalid base64 in PEM body: {}", e))?;
            if der.first() != Some(&DER_SEQUENCE) {
                return Err("PEM body is not DER".to_string());
            }
            return Ok(der);
        }
        body.push_str(line);
    }

    Err(format!("missing '{}'", end_marker))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DER: &[u8] = &[0x30, 0x03, 0x02, 0x01, 0x05];

    fn pem(label: &str, der: &[u8]) -> String {
        format!(
            "-----BEGIN {label}-----\n{}\n-----END {label}-----\n",
            BASE64.encode(der)
        )
    }

    #[test]
    fn test_decode_pem() {
        let text = pem("CERTIFICATE", DER);
        assert_eq!(decode_pem_or_der(text.as_bytes(), CERTIFICATE_LABELS).unwrap(), DER);

        let key = pem("RSA PRIVATE KEY", DER);
        assert_eq!(decode_pem_or_der(key.as_bytes(), PRIVATE_KEY_LABELS).unwrap(), DER);
    }

    #[test]
    fn test_decode_der() {
        assert_eq!(decode_pem_or_der(DER, CERTIFICATE_LABELS).unwrap(), DER);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_pem_or_der(b"", CERTIFICATE_LABELS).is_err());
        assert!(decode_pem_or_der(b"hello world", CERTIFICATE_LABELS).is_err());

        let wrong_label = pem("PRIVATE KEY", DER);
        assert!(decode_pem_or_der(wrong_label.as_bytes(), CERTIFICATE_LABELS).is_err());

        let truncated = "-----BEGIN CERTIFICATE-----\nMAMCAQU=\n";
        assert!(decode_pem_or_der(truncated.as_bytes(), CERTIFICATE_LABELS)
            .unwrap_err()
            .contains("missing"));

        let bad_body = "-----BEGIN CERTIFICATE-----\n!!!\n-----END CERTIFICATE-----\n";
        assert!(decode_pem_or_der(bad_body.as_bytes(), CERTIFICATE_LABELS).is_err());
    }

    #[tokio::test]
    async fn test_load_pair() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.der");
        std::fs::File::create(&cert_path)
            .unwrap()
            .write_all(pem("CERTIFICATE", DER).as_bytes())
            .unwrap();
        std::fs::write(&key_path, DER).unwrap();

        let loaded = ClientCertificate::load(&cert_path, &key_path).await.unwrap();
        assert_eq!(loaded.certificate_der, DER);
        assert_eq!(loaded.private_key_der, DER);
        assert!(!format!("{:?}", loaded).contains("48, 3"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientCertificate::load(dir.path().join("nope.pem"), dir.path().join("nope.key"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthenticationError::Unreadable { what: "certificate", .. }));
    }

    #[tokio::test]
    async fn test_load_malformed_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.der");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, DER).unwrap();
        std::fs::write(&key_path, "not a key").unwrap();

        let err = ClientCertificate::load(&cert_path, &key_path).await.unwrap_err();
        assert!(matches!(err, AuthenticationError::Malformed { what: "private key", .. }));
    }
}
