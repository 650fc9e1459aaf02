//! BundleCodec: multi-key transfer. Derives a passphrase, AEAD-encrypts a
//! self-describing frame of certificates (and, for own-keys, their secret
//! material), and chunks the result into ordered QR-sized parts. Reverses
//! the whole pipeline on import.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use rand::RngCore;

use crate::crypto;
use crate::error::{KeyringError, Result};
use crate::fingerprint::Fingerprint;
use crate::service::KeyringService;

const FRAME_VERSION: u8 = 1;
const ENVELOPE_VERSION: u8 = 1;
const QR_CHUNK_SIZE: usize = 200;
const KCPGP_PREFIX: &str = "KCPGP:";
const KCPGP_PASS_PREFIX: &str = "KCPGP-PASS:";

/// Argon2id parameters fixed per envelope version (memory cost in KiB,
/// iterations, parallelism).
fn argon2_params() -> Params {
    Params::new(19_456, 2, 1, Some(32)).expect("static Argon2id params are valid")
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params());
    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|_| KeyringError::BadPassphrase)?;
    Ok(key)
}

/// Nine four-digit groups, hyphen-separated. Each digit is drawn by
/// rejection sampling from a byte source so no digit is more likely than
/// any other (rejecting values `>= 250`, the largest multiple of 10 below
/// 256, rather than taking a biased `% 10` of the full range).
pub fn generate_passphrase() -> String {
    let mut rng = OsRng;
    (0..9)
        .map(|_| {
            (0..4)
                .map(|_| uniform_digit(&mut rng).to_string())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

fn uniform_digit(rng: &mut impl RngCore) -> u8 {
    loop {
        let mut byte = [0u8; 1];
        rng.fill_bytes(&mut byte);
        if byte[0] < 250 {
            return byte[0] % 10;
        }
    }
}

fn is_valid_passphrase_shape(passphrase: &str) -> bool {
    let groups: Vec<&str> = passphrase.split('-').collect();
    groups.len() == 9 && groups.iter().all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_digit()))
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let bytes = buf
        .get(*pos..*pos + 4)
        .ok_or(KeyringError::CorruptFraming)?;
    *pos += 4;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// One selected key: its certificate, and — when it's an own-key being
/// shared with secret material — the secret bytes too.
struct BundleEntry {
    certificate_bytes: Vec<u8>,
    secret_material: Option<Vec<u8>>,
}

fn build_frame(entries: &[BundleEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    out.push(FRAME_VERSION);
    write_u32(&mut out, entries.len() as u32);
    for entry in entries {
        match &entry.secret_material {
            None => {
                out.push(0);
                write_u32(&mut out, entry.certificate_bytes.len() as u32);
                out.extend_from_slice(&entry.certificate_bytes);
            }
            Some(secret) => {
                out.push(1);
                write_u32(&mut out, entry.certificate_bytes.len() as u32);
                out.extend_from_slice(&entry.certificate_bytes);
                write_u32(&mut out, secret.len() as u32);
                out.extend_from_slice(secret);
            }
        }
    }
    out
}

fn parse_frame(frame: &[u8]) -> Result<Vec<BundleEntry>> {
    let version = *frame.first().ok_or(KeyringError::CorruptFraming)?;
    if version != FRAME_VERSION {
        return Err(KeyringError::UnsupportedVersion);
    }
    let mut pos = 1;
    let count = read_u32(frame, &mut pos)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = *frame.get(pos).ok_or(KeyringError::CorruptFraming)?;
        pos += 1;
        let cert_len = read_u32(frame, &mut pos)? as usize;
        let certificate_bytes = frame
            .get(pos..pos + cert_len)
            .ok_or(KeyringError::CorruptFraming)?
            .to_vec();
        pos += cert_len;
        let secret_material = match kind {
            0 => None,
            1 => {
                let secret_len = read_u32(frame, &mut pos)? as usize;
                let secret = frame
                    .get(pos..pos + secret_len)
                    .ok_or(KeyringError::CorruptFraming)?
                    .to_vec();
                pos += secret_len;
                Some(secret)
            }
            _ => return Err(KeyringError::CorruptFraming),
        };
        entries.push(BundleEntry {
            certificate_bytes,
            secret_material,
        });
    }
    Ok(entries)
}

fn encrypt_envelope(frame: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let key = derive_key(passphrase, &nonce)?;
    let cipher = Aes256Gcm::new_from_slice(&key).expect("key is exactly 32 bytes");
    let ciphertext = cipher
        .encrypt(&nonce, frame)
        .map_err(|_| KeyringError::MalformedCiphertext)?;

    let mut envelope = Vec::with_capacity(1 + nonce.len() + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

fn decrypt_envelope(envelope: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    if envelope.len() < 1 + 12 {
        return Err(KeyringError::TruncatedBundle);
    }
    let version = envelope[0];
    if version != ENVELOPE_VERSION {
        return Err(KeyringError::UnsupportedVersion);
    }
    let nonce_bytes = &envelope[1..13];
    let ciphertext = &envelope[13..];
    let key = derive_key(passphrase, nonce_bytes)?;
    let cipher = Aes256Gcm::new_from_slice(&key).expect("key is exactly 32 bytes");
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| KeyringError::BadPassphrase)
}

fn chunk_armored(armored: &str) -> Vec<String> {
    let bytes = armored.as_bytes();
    let total = bytes.len().div_ceil(QR_CHUNK_SIZE).max(1);
    (0..total)
        .map(|i| {
            let start = i * QR_CHUNK_SIZE;
            let end = (start + QR_CHUNK_SIZE).min(armored.len());
            format!("{KCPGP_PREFIX}{}/{}:{}", i + 1, total, &armored[start..end])
        })
        .collect()
}

pub struct ExportedBundle {
    pub passphrase: String,
    pub qr_parts: Vec<String>,
    pub passphrase_part: String,
    pub file_blob: Vec<u8>,
}

/// Selected public certs and, for each selected own-key, its secret
/// material, inside the versioned framed container.
pub fn export_bundle(
    service: &KeyringService,
    fingerprints: &[Fingerprint],
) -> Result<ExportedBundle> {
    let mut entries = Vec::with_capacity(fingerprints.len());
    for fp in fingerprints {
        let record = service.get_key(fp)?.ok_or(KeyringError::NotFound)?;
        if record.is_own_key {
            let secret = service.export(fp, true)?;
            entries.push(BundleEntry {
                certificate_bytes: record.certificate_bytes,
                secret_material: Some(secret),
            });
        } else {
            entries.push(BundleEntry {
                certificate_bytes: record.certificate_bytes,
                secret_material: None,
            });
        }
    }

    let frame = build_frame(&entries);
    let passphrase = generate_passphrase();
    let envelope = encrypt_envelope(&frame, &passphrase)?;
    let armored = base64::engine::general_purpose::STANDARD.encode(&envelope);

    Ok(ExportedBundle {
        qr_parts: chunk_armored(&armored),
        passphrase_part: format!("{KCPGP_PASS_PREFIX}{passphrase}"),
        passphrase,
        file_blob: envelope,
    })
}

pub struct ImportResult {
    pub imported_count: usize,
    pub skipped_count: usize,
    pub imported: Vec<Fingerprint>,
}

/// Decrypts a fully-reassembled envelope with the user-entered passphrase
/// and offers each entry to `KeyringService::import`.
pub fn import_bundle(
    service: &KeyringService,
    envelope: &[u8],
    passphrase: &str,
) -> Result<ImportResult> {
    let frame = decrypt_envelope(envelope, passphrase)?;
    let entries = parse_frame(&frame)?;

    let mut imported = Vec::new();
    let mut skipped_count = 0;
    for entry in entries {
        let blob = entry.secret_material.unwrap_or(entry.certificate_bytes);
        let cert = crypto::parse_cert(&blob)?;
        let fp = Fingerprint::try_from(cert.fingerprint())?;
        let already_known = service.get_key(&fp)?.is_some();
        let record = service.import(&blob)?;
        if already_known {
            skipped_count += 1;
        } else {
            imported.push(record.fingerprint);
        }
    }

    Ok(ImportResult {
        imported_count: imported.len(),
        skipped_count,
        imported,
    })
}

fn parse_part(part: &str) -> Result<(u32, u32, &str)> {
    let rest = part.strip_prefix(KCPGP_PREFIX).ok_or(KeyringError::CorruptFraming)?;
    let (header, data) = rest.split_once(':').ok_or(KeyringError::CorruptFraming)?;
    let (n_str, total_str) = header.split_once('/').ok_or(KeyringError::CorruptFraming)?;
    let n: u32 = n_str.parse().map_err(|_| KeyringError::CorruptFraming)?;
    let total: u32 = total_str.parse().map_err(|_| KeyringError::CorruptFraming)?;
    if n == 0 || n > total {
        return Err(KeyringError::CorruptFraming);
    }
    Ok((n, total, data))
}

/// Receives QR payloads in arbitrary order, keyed by `n`, until `total`
/// distinct parts have been seen. A part whose `total` disagrees with an
/// earlier part aborts the scan.
#[derive(Default)]
pub struct BundleAssembler {
    total: Option<u32>,
    parts: HashMap<u32, String>,
}

impl BundleAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-adding a previously-seen part number is a no-op.
    pub fn add_part(&mut self, part: &str) -> Result<()> {
        let (n, total, data) = parse_part(part)?;
        match self.total {
            Some(expected) if expected != total => return Err(KeyringError::InconsistentBundle),
            Some(_) => {}
            None => self.total = Some(total),
        }
        self.parts.insert(n, data.to_string());
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.total
            .map(|total| self.parts.len() as u32 == total)
            .unwrap_or(false)
    }

    /// Reassembles the armored envelope and decodes it to binary. Order of
    /// `add_part` calls does not affect the result.
    pub fn assemble(&self) -> Result<Vec<u8>> {
        let total = self.total.ok_or(KeyringError::TruncatedBundle)?;
        let mut armored = String::new();
        for n in 1..=total {
            let part = self.parts.get(&n).ok_or(KeyringError::TruncatedBundle)?;
            armored.push_str(part);
        }
        base64::engine::general_purpose::STANDARD
            .decode(armored)
            .map_err(|_| KeyringError::CorruptFraming)
    }
}

pub fn parse_passphrase_part(part: &str) -> Option<&str> {
    part.strip_prefix(KCPGP_PASS_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    #[test]
    fn generated_passphrase_has_expected_shape() {
        for _ in 0..50 {
            let p = generate_passphrase();
            assert!(is_valid_passphrase_shape(&p), "bad shape: {p}");
        }
    }

    #[test]
    fn chunking_and_reassembly_round_trips_s5() {
        let armored = "a".repeat(QR_CHUNK_SIZE * 3 + 17);
        let parts = chunk_armored(&armored);
        assert!(parts.len() > 1);

        let mut forward = BundleAssembler::new();
        for p in &parts {
            forward.add_part(p).unwrap();
        }
        let mut reverse = BundleAssembler::new();
        for p in parts.iter().rev() {
            reverse.add_part(p).unwrap();
        }
        assert_eq!(forward.assemble().unwrap(), reverse.assemble().unwrap());
    }

    #[test]
    fn inconsistent_total_aborts_the_scan_s6() {
        let mut assembler = BundleAssembler::new();
        assembler.add_part("KCPGP:1/5:aaaa").unwrap();
        let err = assembler.add_part("KCPGP:2/7:bbbb").unwrap_err();
        assert!(matches!(err, KeyringError::InconsistentBundle));
    }

    #[test]
    fn duplicate_parts_are_idempotent() {
        let mut assembler = BundleAssembler::new();
        assembler.add_part("KCPGP:1/2:aaaa").unwrap();
        assembler.add_part("KCPGP:1/2:aaaa").unwrap();
        assembler.add_part("KCPGP:2/2:bbbb").unwrap();
        assert!(assembler.is_complete());
    }

    #[test]
    fn malformed_part_is_rejected() {
        assert!(parse_part("not-a-bundle-part").is_err());
        assert!(parse_part("KCPGP:0/5:data").is_err());
        assert!(parse_part("KCPGP:6/5:data").is_err());
    }

    fn service() -> (KeyringService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (KeyringService::new(CoreConfig::ephemeral(dir.path())).unwrap(), dir)
    }

    #[test]
    fn export_import_bundle_round_trip_s4() {
        let (service, _dir) = service();
        let alice = service.generate("Alice", "alice@example.com", None).unwrap();
        let bob = service.generate("Bob", "bob@example.com", None).unwrap();
        let carol = service.generate("Carol", "carol@example.com", None).unwrap();
        let contact = crate::crypto::generate_keypair("Dana", "dana@example.com", None).unwrap();
        let contact_record = service
            .import(&contact.certificate_bytes)
            .unwrap();

        let selection = vec![
            alice.fingerprint.clone(),
            bob.fingerprint.clone(),
            carol.fingerprint.clone(),
            contact_record.fingerprint.clone(),
        ];
        let exported = export_bundle(&service, &selection).unwrap();
        assert!(is_valid_passphrase_shape(&exported.passphrase));

        for fp in &selection {
            service.delete(fp).unwrap();
        }
        assert!(service.list_keys().unwrap().is_empty());

        let result = import_bundle(&service, &exported.file_blob, &exported.passphrase).unwrap();
        assert_eq!(result.imported_count, 4);
        assert_eq!(result.skipped_count, 0);

        assert!(service.get_key(&alice.fingerprint).unwrap().unwrap().is_own_key);
        assert!(!service
            .get_key(&contact_record.fingerprint)
            .unwrap()
            .unwrap()
            .is_own_key);
    }

    #[test]
    fn wrong_passphrase_fails_without_revealing_plaintext() {
        let (service, _dir) = service();
        let alice = service.generate("Alice", "alice@example.com", None).unwrap();
        let exported = export_bundle(&service, &[alice.fingerprint]).unwrap();

        let err = import_bundle(&service, &exported.file_blob, "0000-0000-0000-0000-0000-0000-0000-0000-0000")
            .unwrap_err();
        assert!(matches!(err, KeyringError::BadPassphrase));
    }

    #[test]
    fn reimporting_known_fingerprint_counts_as_skipped() {
        let (service, _dir) = service();
        let alice = service.generate("Alice", "alice@example.com", None).unwrap();
        let exported = export_bundle(&service, &[alice.fingerprint.clone()]).unwrap();

        let result = import_bundle(&service, &exported.file_blob, &exported.passphrase).unwrap();
        assert_eq!(result.imported_count, 0);
        assert_eq!(result.skipped_count, 1);
    }
}
