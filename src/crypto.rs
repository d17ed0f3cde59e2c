// Relaymux Crypto — event signing (secp256k1 Schnorr / BIP-340), NIP-04
// encrypted DMs (ECDH + AES-256-CBC), and pubkey derivation.
//
// The core only *verifies* events arriving from relays (see crate::event);
// this module's signer is used exclusively by the admin `/relay/test`
// endpoint to build a throwaway encrypted DM that exercises the crypto
// wiring end to end.

use serde_json::{json, Value};

use crate::atoms::error::{RelayError, RelayResult};

/// Create and sign a Nostr event with arbitrary kind and tags.
pub fn sign_event(
    secret_key: &[u8],
    pubkey_hex: &str,
    kind: u64,
    tags: &Value,
    content: &str,
    created_at: i64,
) -> RelayResult<Value> {
    use k256::schnorr::SigningKey;
    use sha2::{Digest, Sha256};

    let serialized = json!([0, pubkey_hex, created_at, kind, tags, content]);
    let serialized_bytes = serde_json::to_vec(&serialized)?;

    let mut hasher = Sha256::new();
    hasher.update(&serialized_bytes);
    let id_bytes = hasher.finalize();
    let id_hex = hex::encode(id_bytes);

    let signing_key = SigningKey::from_bytes(secret_key).map_err(|e| RelayError::Crypto(e.to_string()))?;
    let aux_rand: [u8; 32] = rand::random();
    let sig = signing_key.sign_raw(&id_bytes, &aux_rand).map_err(|e| RelayError::Crypto(e.to_string()))?;
    let sig_hex = hex::encode(sig.to_bytes());

    Ok(json!({
        "id": id_hex,
        "pubkey": pubkey_hex,
        "created_at": created_at,
        "kind": kind,
        "tags": tags,
        "content": content,
        "sig": sig_hex,
    }))
}

/// Build a kind-4 encrypted DM event (NIP-04).
pub fn build_dm_event(
    secret_key: &[u8],
    pubkey_hex: &str,
    receiver_pk_hex: &str,
    plaintext: &str,
    created_at: i64,
) -> RelayResult<Value> {
    let ciphertext = nip04_encrypt(secret_key, receiver_pk_hex, plaintext)?;
    let tags = json!([["p", receiver_pk_hex]]);
    sign_event(secret_key, pubkey_hex, 4, &tags, &ciphertext, created_at)
}

fn compute_shared_secret(secret_key: &[u8], pubkey_hex: &str) -> RelayResult<[u8; 32]> {
    let sk = k256::SecretKey::from_slice(secret_key).map_err(|e| RelayError::Crypto(e.to_string()))?;

    let pk_bytes = hex::decode(pubkey_hex).map_err(|e| RelayError::Crypto(e.to_string()))?;
    if pk_bytes.len() != 32 {
        return Err(RelayError::Crypto(format!("invalid pubkey length: {} (expected 32)", pk_bytes.len())));
    }
    let mut sec1 = Vec::with_capacity(33);
    sec1.push(0x02);
    sec1.extend_from_slice(&pk_bytes);
    let pk = k256::PublicKey::from_sec1_bytes(&sec1).map_err(|e| RelayError::Crypto(e.to_string()))?;

    use k256::elliptic_curve::ecdh::diffie_hellman;
    let shared = diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
    let mut out = [0u8; 32];
    out.copy_from_slice(shared.raw_secret_bytes().as_slice());
    Ok(out)
}

/// NIP-04 encrypt: AES-256-CBC with an ECDH shared key.
pub fn nip04_encrypt(secret_key: &[u8], receiver_pk_hex: &str, plaintext: &str) -> RelayResult<String> {
    use base64::Engine;
    use cbc::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};

    let shared = compute_shared_secret(secret_key, receiver_pk_hex)?;
    let iv: [u8; 16] = rand::random();

    let pt = plaintext.as_bytes();
    let mut buf = vec![0u8; pt.len() + 16];
    buf[..pt.len()].copy_from_slice(pt);

    let ciphertext = cbc::Encryptor::<aes::Aes256>::new_from_slices(&shared, &iv)
        .map_err(|e| RelayError::Crypto(e.to_string()))?
        .encrypt_padded_mut::<Pkcs7>(&mut buf, pt.len())
        .map_err(|e| RelayError::Crypto(e.to_string()))?;

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(format!("{}?iv={}", b64.encode(ciphertext), b64.encode(iv)))
}

/// NIP-04 decrypt: AES-256-CBC with an ECDH shared key.
pub fn nip04_decrypt(secret_key: &[u8], sender_pk_hex: &str, content: &str) -> RelayResult<String> {
    use base64::Engine;
    use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};

    let parts: Vec<&str> = content.split("?iv=").collect();
    if parts.len() != 2 {
        return Err(RelayError::Crypto("invalid NIP-04 format (expected base64?iv=base64)".into()));
    }

    let b64 = base64::engine::general_purpose::STANDARD;
    let mut ciphertext = b64.decode(parts[0].trim()).map_err(|e| RelayError::Crypto(e.to_string()))?;
    let iv = b64.decode(parts[1].trim()).map_err(|e| RelayError::Crypto(e.to_string()))?;
    if iv.len() != 16 {
        return Err(RelayError::Crypto(format!("invalid IV length: {} (expected 16)", iv.len())));
    }

    let shared = compute_shared_secret(secret_key, sender_pk_hex)?;

    let plaintext = cbc::Decryptor::<aes::Aes256>::new_from_slices(&shared, &iv)
        .map_err(|e| RelayError::Crypto(e.to_string()))?
        .decrypt_padded_mut::<Pkcs7>(&mut ciphertext)
        .map_err(|e| RelayError::Crypto(e.to_string()))?;

    String::from_utf8(plaintext.to_vec()).map_err(|e| RelayError::Crypto(e.to_string()))
}

/// Decrypt a private websocket id: `ws_id` is base64url(nonce(12) ||
/// ciphertext+tag), AES-256-GCM under the server's configured key.
/// Returns the decrypted plaintext so the caller can compare it against
/// the expected literal `"relay"`.
pub fn decrypt_private_ws_id(key: &[u8], ws_id: &str) -> RelayResult<String> {
    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};
    use base64::Engine;

    let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(ws_id)
        .map_err(|e| RelayError::Crypto(format!("invalid ws id encoding: {e}")))?;
    if raw.len() < 12 {
        return Err(RelayError::Crypto("ws id too short to contain a nonce".into()));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(12);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| RelayError::Crypto(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| RelayError::Crypto("private ws id decryption failed".into()))?;
    String::from_utf8(plaintext).map_err(|e| RelayError::Crypto(e.to_string()))
}

/// Generate a fresh random secp256k1 secret key, hex-encoded. Used by the
/// `/relay/test` admin endpoint when the caller doesn't supply one.
pub fn generate_secret_key() -> Vec<u8> {
    k256::SecretKey::random(&mut rand::rngs::OsRng).to_bytes().to_vec()
}

/// secp256k1 pubkey derivation (BIP-340 x-only): skip the 0x02/0x03
/// prefix byte of the compressed point, keep the 32-byte x-coordinate.
pub fn derive_pubkey(secret_key: &[u8]) -> RelayResult<Vec<u8>> {
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    let sk = k256::SecretKey::from_slice(secret_key).map_err(|e| RelayError::Crypto(e.to_string()))?;
    let pk = sk.public_key();
    let point = pk.to_encoded_point(true);
    let compressed = point.as_bytes();
    if compressed.len() != 33 {
        return Err(RelayError::Crypto("unexpected compressed pubkey length".into()));
    }
    Ok(compressed[1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret_key() -> Vec<u8> {
        hex::decode("e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35").unwrap()
    }

    #[test]
    fn private_ws_id_roundtrips_through_gcm() {
        use aes_gcm::aead::{Aead, KeyInit};
        use aes_gcm::{Aes256Gcm, Nonce};
        use base64::Engine;

        let key = [7u8; 32];
        let cipher = Aes256Gcm::new_from_slice(&key).unwrap();
        let nonce_bytes = [1u8; 12];
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, b"relay".as_slice()).unwrap();

        let mut raw = nonce_bytes.to_vec();
        raw.extend_from_slice(&ciphertext);
        let ws_id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);

        let decrypted = decrypt_private_ws_id(&key, &ws_id).unwrap();
        assert_eq!(decrypted, "relay");
    }

    #[test]
    fn private_ws_id_with_wrong_key_errors() {
        use aes_gcm::aead::{Aead, KeyInit};
        use aes_gcm::{Aes256Gcm, Nonce};
        use base64::Engine;

        let key = [7u8; 32];
        let cipher = Aes256Gcm::new_from_slice(&key).unwrap();
        let nonce_bytes = [1u8; 12];
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher.encrypt(nonce, b"relay".as_slice()).unwrap();
        let mut raw = nonce_bytes.to_vec();
        raw.extend_from_slice(&ciphertext);
        let ws_id = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(raw);

        assert!(decrypt_private_ws_id(&[9u8; 32], &ws_id).is_err());
    }

    #[test]
    fn derive_pubkey_produces_32_bytes() {
        let sk = test_secret_key();
        let pk = derive_pubkey(&sk).unwrap();
        assert_eq!(pk.len(), 32);
    }

    #[test]
    fn sign_event_produces_valid_fields() {
        let sk = test_secret_key();
        let pk = derive_pubkey(&sk).unwrap();
        let pk_hex = hex::encode(&pk);
        let event = sign_event(&sk, &pk_hex, 1, &json!([]), "hello nostr", 1_700_000_000).unwrap();
        assert_eq!(event["id"].as_str().unwrap().len(), 64);
        assert_eq!(event["sig"].as_str().unwrap().len(), 128);
        assert_eq!(event["kind"].as_u64().unwrap(), 1);
    }

    #[test]
    fn nip04_encrypt_decrypt_roundtrip() {
        let sk1 = hex::decode("e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35").unwrap();
        let sk2 = hex::decode("0b1c4c1a5e0c3d5e7f9a1b3c5d7e9f0a2b4c6d8e0f1a3b5c7d9e1f0a2b4c6d8e").unwrap();
        let pk1 = derive_pubkey(&sk1).unwrap();
        let pk2 = derive_pubkey(&sk2).unwrap();
        let pk1_hex = hex::encode(&pk1);
        let pk2_hex = hex::encode(&pk2);

        let plaintext = "Hello, this is a secret message!";
        let encrypted = nip04_encrypt(&sk1, &pk2_hex, plaintext).unwrap();
        assert!(encrypted.contains("?iv="));

        let decrypted = nip04_decrypt(&sk2, &pk1_hex, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn nip04_invalid_format_errors() {
        let sk = test_secret_key();
        let result = nip04_decrypt(&sk, &"00".repeat(32), "no-iv-separator");
        assert!(result.is_err());
    }

    #[test]
    fn build_dm_event_is_kind_4_with_p_tag() {
        let sk1 = test_secret_key();
        let pk1 = hex::encode(derive_pubkey(&sk1).unwrap());
        let sk2 = hex::decode("0b1c4c1a5e0c3d5e7f9a1b3c5d7e9f0a2b4c6d8e0f1a3b5c7d9e1f0a2b4c6d8e").unwrap();
        let pk2 = hex::encode(derive_pubkey(&sk2).unwrap());

        let event = build_dm_event(&sk1, &pk1, &pk2, "hi", 1_700_000_000).unwrap();
        assert_eq!(event["kind"].as_u64().unwrap(), 4);
        assert_eq!(event["tags"][0][0].as_str().unwrap(), "p");
        assert_eq!(event["tags"][0][1].as_str().unwrap(), pk2);
    }
}
