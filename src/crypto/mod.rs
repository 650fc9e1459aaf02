//! CryptoEngine: stateless OpenPGP primitives over byte sequences and
//! certificates. No I/O, no globals, no hidden caches — every function
//! here is pure given its arguments.

use std::io::Write;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use sequoia_openpgp as openpgp;

use openpgp::cert::prelude::*;
use openpgp::crypto::{Password, SessionKey};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageLayer, MessageStructure, VerificationHelper,
    VerifierBuilder,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{Armorer, Encryptor, LiteralWriter, Message, Recipient, Signer as StreamSigner};
use openpgp::serialize::Marshal;
use openpgp::types::{KeyFlags, RevocationStatus, SymmetricAlgorithm};

use crate::error::{KeyringError, Result};
use crate::fingerprint::Fingerprint;
use crate::types::UserId;

const VALIDITY_PERIOD: StdDuration = StdDuration::from_secs(2 * 365 * 24 * 3600);

fn policy() -> StandardPolicy<'static> {
    StandardPolicy::new()
}

fn armor_headers(include_armor_metadata: bool) -> Vec<(String, String)> {
    if include_armor_metadata {
        vec![("Comment".to_string(), "keyring-core".to_string())]
    } else {
        Vec::new()
    }
}

#[derive(Debug, Clone)]
pub struct SubkeyInfo {
    pub fingerprint: Fingerprint,
    pub can_sign: bool,
    pub can_certify: bool,
    pub can_transport_encrypt: bool,
    pub can_storage_encrypt: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub fingerprint: Fingerprint,
    pub user_ids: Vec<UserId>,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_secret_key: bool,
    pub subkeys: Vec<SubkeyInfo>,
}

#[derive(Debug, Clone)]
pub struct SignerInfo {
    pub fingerprint: Fingerprint,
    pub verified: bool,
}

#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub valid: bool,
    pub signer_fingerprint: Option<Fingerprint>,
    pub verified_at: Option<DateTime<Utc>>,
}

pub struct GeneratedKey {
    pub certificate_bytes: Vec<u8>,
    pub secret_material: Vec<u8>,
    pub revocation_cert: Vec<u8>,
    pub fingerprint: Fingerprint,
}

fn system_time_to_utc(t: std::time::SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

/// Ed25519 primary signing key bound to an X25519 encryption subkey,
/// certified with a two-year default expiration. Produces a revocation
/// certificate as a byproduct.
pub fn generate_keypair(
    name: &str,
    email: &str,
    passphrase: Option<&str>,
) -> Result<GeneratedKey> {
    let userid = match (name.is_empty(), email.is_empty()) {
        (false, false) => format!("{} <{}>", name, email),
        (false, true) => name.to_string(),
        (true, false) => format!("<{}>", email),
        (true, true) => String::new(),
    };

    let mut builder = CertBuilder::new()
        .set_cipher_suite(CipherSuite::Cv25519)
        .set_validity_period(VALIDITY_PERIOD)
        .add_signing_subkey()
        .add_subkey(
            KeyFlags::empty()
                .set_transport_encryption()
                .set_storage_encryption(),
            None,
            None,
        );
    if !userid.is_empty() {
        builder = builder.add_userid(userid.as_str());
    }
    if let Some(pw) = passphrase {
        builder = builder.set_password(Some(Password::from(pw)));
    }

    let (cert, revocation) = builder
        .generate()
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;

    let fingerprint = Fingerprint::try_from(cert.fingerprint())?;

    let mut certificate_bytes = Vec::new();
    {
        let mut writer = openpgp::armor::Writer::new(
            &mut certificate_bytes,
            openpgp::armor::Kind::PublicKey,
        )
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
        cert.serialize(&mut writer)
            .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
        writer
            .finalize()
            .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    }

    let mut secret_material = Vec::new();
    {
        let mut writer = openpgp::armor::Writer::new(
            &mut secret_material,
            openpgp::armor::Kind::SecretKey,
        )
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
        cert.as_tsk()
            .serialize(&mut writer)
            .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
        writer
            .finalize()
            .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    }

    let mut revocation_cert = Vec::new();
    {
        let mut writer = openpgp::armor::Writer::new(
            &mut revocation_cert,
            openpgp::armor::Kind::Signature,
        )
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
        openpgp::Packet::from(revocation)
            .serialize(&mut writer)
            .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
        writer
            .finalize()
            .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    }

    Ok(GeneratedKey {
        certificate_bytes,
        secret_material,
        revocation_cert,
        fingerprint,
    })
}

/// Parses an armored or binary certificate.
pub fn parse_cert(bytes: &[u8]) -> Result<openpgp::Cert> {
    openpgp::Cert::from_bytes(bytes)
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))
}

/// Armored public-only form of `cert`, discarding any secret key material.
pub fn export_public(cert: &openpgp::Cert) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut writer = openpgp::armor::Writer::new(&mut buf, openpgp::armor::Kind::PublicKey)
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    cert.serialize(&mut writer)
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    writer
        .finalize()
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    Ok(buf)
}

fn encryption_capable_recipients<'a>(
    p: &'a StandardPolicy<'a>,
    cert: &'a openpgp::Cert,
) -> Vec<Recipient<'a>> {
    if !matches!(
        cert.revocation_status(p, None),
        RevocationStatus::NotAsFarAsWeKnow
    ) {
        return Vec::new();
    }
    cert.keys()
        .with_policy(p, None)
        .alive()
        .revoked(false)
        .supported()
        .filter(|ka| {
            ka.key_flags()
                .map(|f| f.for_storage_encryption() || f.for_transport_encryption())
                .unwrap_or(false)
        })
        .map(|ka| Recipient::from(ka))
        .collect()
}

/// AES-256 AEAD per RFC 9580, compression disabled. Fails with
/// `NoRecipients` on an empty list, `RecipientUnusable` if none of the
/// supplied certs has a usable, non-revoked, non-expired encryption subkey.
pub fn encrypt(
    plaintext: &[u8],
    recipient_certs: &[openpgp::Cert],
    include_armor_metadata: bool,
) -> Result<Vec<u8>> {
    if recipient_certs.is_empty() {
        return Err(KeyringError::NoRecipients);
    }
    let p = policy();
    let mut recipients = Vec::new();
    for cert in recipient_certs {
        recipients.extend(encryption_capable_recipients(&p, cert));
    }
    if recipients.is_empty() {
        return Err(KeyringError::RecipientUnusable);
    }

    let mut sink = Vec::new();
    {
        let message = Message::new(&mut sink);
        let message = Armorer::new(message)
            .kind(openpgp::armor::Kind::Message)
            .headers(armor_headers(include_armor_metadata))
            .build()
            .map_err(|_| KeyringError::MalformedCiphertext)?;
        let message = Encryptor::for_recipients(message, recipients)
            .symmetric_algo(SymmetricAlgorithm::AES256)
            .build()
            .map_err(|_| KeyringError::RecipientUnusable)?;
        let mut message = LiteralWriter::new(message)
            .build()
            .map_err(|_| KeyringError::MalformedCiphertext)?;
        message
            .write_all(plaintext)
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        message
            .finalize()
            .map_err(|_| KeyringError::MalformedCiphertext)?;
    }
    Ok(sink)
}

struct DecryptHelper<'a> {
    tsk: &'a openpgp::Cert,
    passphrase: Option<&'a str>,
    policy: &'a StandardPolicy<'a>,
    signer_info: Vec<SignerInfo>,
    passphrase_was_needed: std::rc::Rc<std::cell::Cell<bool>>,
    passphrase_was_wrong: std::rc::Rc<std::cell::Cell<bool>>,
}

impl<'a> VerificationHelper for DecryptHelper<'a> {
    fn get_certs(&mut self, _ids: &[openpgp::KeyHandle]) -> openpgp::Result<Vec<openpgp::Cert>> {
        // The engine is handed only the recipient's own secret material, not
        // the signer's certificate, so signatures here can be attributed
        // but never cryptographically verified. `verify()` is the operation
        // that does verification against caller-supplied candidate certs.
        Ok(Vec::new())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    let issuer = match &result {
                        Ok(sig) => sig.sig.get_issuers().into_iter().next(),
                        Err(e) => e.sig.get_issuers().into_iter().next(),
                    };
                    if let Some(handle) = issuer {
                        if let openpgp::KeyHandle::Fingerprint(fp) = handle {
                            if let Ok(fp) = Fingerprint::try_from(fp) {
                                self.signer_info.push(SignerInfo {
                                    fingerprint: fp,
                                    verified: false,
                                });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> DecryptionHelper for DecryptHelper<'a> {
    fn decrypt(
        &mut self,
        pkesks: &[openpgp::packet::PKESK],
        skesks: &[openpgp::packet::SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: impl FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<openpgp::Fingerprint>> {
        let candidates: Vec<_> = self
            .tsk
            .keys()
            .with_policy(self.policy, None)
            .secret()
            .for_transport_encryption()
            .chain(
                self.tsk
                    .keys()
                    .with_policy(self.policy, None)
                    .secret()
                    .for_storage_encryption(),
            )
            .collect();

        for ka in &candidates {
            let key = ka.key().clone();
            let keypair = if key.secret().is_encrypted() {
                self.passphrase_was_needed.set(true);
                let Some(pw) = self.passphrase else {
                    continue;
                };
                match key.decrypt_secret(&Password::from(pw)) {
                    Ok(k) => k,
                    Err(_) => {
                        self.passphrase_was_wrong.set(true);
                        continue;
                    }
                }
            } else {
                key
            }
            .into_keypair()?;
            let mut keypair = keypair;

            for pkesk in pkesks {
                if let Some((algo, sk)) = pkesk.decrypt(&mut keypair, sym_algo) {
                    if decrypt(algo, &sk) {
                        return Ok(Some(ka.fingerprint()));
                    }
                }
            }
        }

        for skesk in skesks {
            if let Some(pw) = self.passphrase {
                if let Some((algo, sk)) = skesk.decrypt(&Password::from(pw)).ok() {
                    if decrypt(algo, &sk) {
                        return Ok(None);
                    }
                }
            }
        }

        Err(openpgp::Error::MissingSessionKey(
            "no candidate key could decrypt this message".into(),
        )
        .into())
    }
}

/// Tries each candidate secret key in insertion order, returning the first
/// success; `None` against a protected key yields `PassphraseRequired`, not
/// `BadPassphrase`.
pub fn decrypt(
    armored_ciphertext: &[u8],
    secret_material: &openpgp::Cert,
    passphrase: Option<&str>,
) -> Result<(Vec<u8>, Vec<SignerInfo>)> {
    let p = policy();
    let passphrase_was_needed = std::rc::Rc::new(std::cell::Cell::new(false));
    let passphrase_was_wrong = std::rc::Rc::new(std::cell::Cell::new(false));
    let helper = DecryptHelper {
        tsk: secret_material,
        passphrase,
        policy: &p,
        signer_info: Vec::new(),
        passphrase_was_needed: passphrase_was_needed.clone(),
        passphrase_was_wrong: passphrase_was_wrong.clone(),
    };

    let decryptor = DecryptorBuilder::from_bytes(armored_ciphertext)
        .map_err(|_| KeyringError::MalformedCiphertext)?;
    let mut decryptor = match decryptor.with_policy(&p, None, helper) {
        Ok(d) => d,
        Err(e) => {
            if passphrase.is_none() && passphrase_was_needed.get() {
                return Err(KeyringError::PassphraseRequired);
            }
            if passphrase.is_some() && passphrase_was_wrong.get() {
                return Err(KeyringError::BadPassphrase);
            }
            return classify_decrypt_error(e);
        }
    };

    let mut plaintext = Vec::new();
    std::io::copy(&mut decryptor, &mut plaintext)
        .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
    let helper = decryptor.into_helper();
    Ok((plaintext, helper.signer_info))
}

fn classify_decrypt_error<T>(e: anyhow::Error) -> Result<T> {
    let msg = e.to_string();
    if msg.contains("session key") || msg.contains("no candidate key") {
        Err(KeyringError::WrongKey)
    } else if msg.contains("decrypt") {
        Err(KeyringError::BadPassphrase)
    } else {
        Err(KeyringError::MalformedCiphertext)
    }
}

/// Produces an armored, detached-free signed message (the data wrapped in
/// a one-pass-signature + literal packet, matching `sign`/`verify`'s
/// counterpart operation below).
pub fn sign(
    data: &[u8],
    secret_material: &openpgp::Cert,
    passphrase: Option<&str>,
) -> Result<Vec<u8>> {
    let p = policy();
    let signing_key = secret_material
        .keys()
        .with_policy(&p, None)
        .alive()
        .revoked(false)
        .for_signing()
        .secret()
        .next()
        .ok_or(KeyringError::RecipientUnusable)?;

    let key = signing_key.key().clone();
    let keypair = if key.secret().is_encrypted() {
        let pw = passphrase.ok_or(KeyringError::PassphraseRequired)?;
        key.decrypt_secret(&Password::from(pw))
            .map_err(|_| KeyringError::BadPassphrase)?
    } else {
        key
    }
    .into_keypair()
    .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;

    let mut sink = Vec::new();
    {
        let message = Message::new(&mut sink);
        let message = Armorer::new(message)
            .kind(openpgp::armor::Kind::Message)
            .build()
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        let message = StreamSigner::new(message, keypair)
            .build()
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        let mut message = LiteralWriter::new(message)
            .build()
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        message
            .write_all(data)
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
        message
            .finalize()
            .map_err(|e| KeyringError::BackendUnavailable(Some(anyhow::Error::new(e))))?;
    }
    Ok(sink)
}

struct VerifyHelper<'a> {
    candidates: &'a [openpgp::Cert],
    result: Option<(Fingerprint, bool)>,
}

impl<'a> VerificationHelper for VerifyHelper<'a> {
    fn get_certs(&mut self, ids: &[openpgp::KeyHandle]) -> openpgp::Result<Vec<openpgp::Cert>> {
        Ok(self
            .candidates
            .iter()
            .filter(|c| ids.iter().any(|id| c.key_handle().aliases(id)))
            .cloned()
            .collect())
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                for result in results {
                    match result {
                        Ok(good) => {
                            if let Some(openpgp::KeyHandle::Fingerprint(fp)) =
                                good.sig.get_issuers().into_iter().next()
                            {
                                if let Ok(fp) = Fingerprint::try_from(fp) {
                                    self.result = Some((fp, true));
                                }
                            }
                        }
                        Err(e) => {
                            if let Some(openpgp::KeyHandle::Fingerprint(fp)) =
                                e.sig.get_issuers().into_iter().next()
                            {
                                if let Ok(fp) = Fingerprint::try_from(fp) {
                                    self.result.get_or_insert((fp, false));
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a> DecryptionHelper for VerifyHelper<'a> {
    fn decrypt(
        &mut self,
        _pkesks: &[openpgp::packet::PKESK],
        _skesks: &[openpgp::packet::SKESK],
        _sym_algo: Option<SymmetricAlgorithm>,
        _decrypt: impl FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    ) -> openpgp::Result<Option<openpgp::Fingerprint>> {
        Ok(None)
    }
}

/// The caller supplies candidates; the engine tries each. Only
/// primary-key fingerprints are returned as signer identity.
pub fn verify(signed_blob: &[u8], candidate_certs: &[openpgp::Cert]) -> Result<VerifyResult> {
    let p = policy();
    let helper = VerifyHelper {
        candidates: candidate_certs,
        result: None,
    };
    let mut verifier = VerifierBuilder::from_bytes(signed_blob)
        .map_err(|_| KeyringError::MalformedCiphertext)?
        .with_policy(&p, None, helper)
        .map_err(|_| KeyringError::Tampered)?;

    let mut sink = Vec::new();
    std::io::copy(&mut verifier, &mut sink)
        .map_err(|_| KeyringError::Tampered)?;

    let helper = verifier.into_helper();
    match helper.result {
        Some((fp, valid)) => Ok(VerifyResult {
            valid,
            signer_fingerprint: Some(fp),
            verified_at: if valid { Some(Utc::now()) } else { None },
        }),
        None => Ok(VerifyResult {
            valid: false,
            signer_fingerprint: None,
            verified_at: None,
        }),
    }
}

/// Parsing only; no side effects.
pub fn inspect(cert: &openpgp::Cert) -> Result<CertInfo> {
    let p = policy();
    let fingerprint = Fingerprint::try_from(cert.fingerprint())?;

    let user_ids = cert
        .userids()
        .map(|ua| {
            let userid = ua.userid();
            let name = userid
                .name()
                .ok()
                .flatten()
                .filter(|s: &String| !s.is_empty());
            let email = userid
                .email()
                .ok()
                .flatten()
                .filter(|s: &String| !s.is_empty());
            UserId { name, email }
        })
        .collect();

    let primary = cert
        .primary_key()
        .with_policy(&p, None)
        .map_err(|e| KeyringError::MalformedCertificate(Some(anyhow::Error::new(e))))?;
    let created_at = system_time_to_utc(primary.creation_time());
    let expires_at = primary
        .key_expiration_time()
        .map(system_time_to_utc);
    let algorithm = format!("{:?}", primary.key().pk_algo());
    let has_secret_key = cert.is_tsk();

    let mut subkeys = Vec::new();
    for ka in cert.keys().subkeys().with_policy(&p, None) {
        let flags = ka.key_flags().unwrap_or_else(KeyFlags::empty);
        subkeys.push(SubkeyInfo {
            fingerprint: Fingerprint::try_from(ka.key().fingerprint())?,
            can_sign: flags.for_signing(),
            can_certify: flags.for_certification(),
            can_transport_encrypt: flags.for_transport_encryption(),
            can_storage_encrypt: flags.for_storage_encryption(),
            created_at: system_time_to_utc(ka.creation_time()),
            expires_at: ka.key_expiration_time().map(system_time_to_utc),
            revoked: matches!(ka.revocation_status(), RevocationStatus::Revoked(_)),
        });
    }

    Ok(CertInfo {
        fingerprint,
        user_ids,
        algorithm,
        created_at,
        expires_at,
        has_secret_key,
        subkeys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_then_inspect_round_trips_fingerprint() {
        let generated = generate_keypair("Alice", "alice@example.com", None).unwrap();
        let cert = parse_cert(&generated.certificate_bytes).unwrap();
        let info = inspect(&cert).unwrap();
        assert_eq!(info.fingerprint, generated.fingerprint);
        assert!(!info.has_secret_key);
        assert!(info.user_ids.iter().any(|u| u.email.as_deref() == Some("alice@example.com")));
    }

    #[test]
    fn secret_material_parses_as_tsk() {
        let generated = generate_keypair("Bob", "bob@example.com", None).unwrap();
        let tsk = parse_cert(&generated.secret_material).unwrap();
        assert!(tsk.is_tsk());
    }

    #[test]
    fn encrypt_with_no_recipients_fails() {
        let err = encrypt(b"hello", &[], false).unwrap_err();
        assert!(matches!(err, KeyringError::NoRecipients));
    }

    #[test]
    fn encrypt_decrypt_round_trip_s1() {
        let generated = generate_keypair("Alice", "alice@example.com", None).unwrap();
        let cert = parse_cert(&generated.certificate_bytes).unwrap();
        let tsk = parse_cert(&generated.secret_material).unwrap();

        let ciphertext = encrypt(b"hello", &[cert], false).unwrap();
        let (plaintext, signers) = decrypt(&ciphertext, &tsk, None).unwrap();
        assert_eq!(plaintext, b"hello");
        assert!(signers.is_empty());
    }

    #[test]
    fn decrypt_without_passphrase_on_protected_key_requires_it() {
        let generated = generate_keypair("Carol", "carol@example.com", Some("pw-123")).unwrap();
        let cert = parse_cert(&generated.certificate_bytes).unwrap();
        let tsk = parse_cert(&generated.secret_material).unwrap();
        let ciphertext = encrypt(b"secret", &[cert], false).unwrap();

        let err = decrypt(&ciphertext, &tsk, None).unwrap_err();
        assert!(matches!(err, KeyringError::PassphraseRequired));

        let err = decrypt(&ciphertext, &tsk, Some("wrong")).unwrap_err();
        assert!(matches!(err, KeyringError::BadPassphrase));

        let ok = decrypt(&ciphertext, &tsk, Some("pw-123")).unwrap();
        assert_eq!(ok.0, b"secret");
    }

    #[test]
    fn sign_then_verify_succeeds_against_own_cert() {
        let generated = generate_keypair("Dana", "dana@example.com", None).unwrap();
        let cert = parse_cert(&generated.certificate_bytes).unwrap();
        let tsk = parse_cert(&generated.secret_material).unwrap();

        let signed = sign(b"attest", &tsk, None).unwrap();
        let result = verify(&signed, &[cert]).unwrap();
        assert!(result.valid);
        assert_eq!(result.signer_fingerprint, Some(generated.fingerprint));
    }

    #[test]
    fn verify_against_wrong_cert_reports_unverified_signer() {
        let signer = generate_keypair("Eve", "eve@example.com", None).unwrap();
        let bystander = generate_keypair("Mallory", "mallory@example.com", None).unwrap();
        let signer_tsk = parse_cert(&signer.secret_material).unwrap();
        let bystander_cert = parse_cert(&bystander.certificate_bytes).unwrap();

        let signed = sign(b"attest", &signer_tsk, None).unwrap();
        let result = verify(&signed, &[bystander_cert]).unwrap();
        assert!(!result.valid);
    }
}
