//! Symmetric encryption for tokens and credentials at rest.
//!
//! Current envelopes use AES-256-CBC with PKCS#7 padding, a fresh random IV per value, and a
//! key derived from the static secret with SHA-256. The ciphertext segment carries an
//! HMAC-SHA256 tag over `iv || ciphertext`, so any altered byte is rejected before decryption:
//!
//! ```text
//! v2:<base64 iv>.<base64 ciphertext || tag>
//! ```
//!
//! Values written before the versioned format are plain `base64(iv || ciphertext)` under the
//! raw legacy secret, occasionally base64-encoded twice. They still decode, but only when the
//! plaintext has the 64-hex token shape.
//!
//! Decoding never fails loudly: anything malformed, tampered, or encrypted under an unknown key
//! comes back as an empty string, which callers treat as "no value stored".

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};
// self
use crate::{_prelude::*, auth::TokenSecret};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Prefix marking the current envelope version.
pub const ENVELOPE_V2_PREFIX: &str = "v2:";
/// Length of a well-formed remote API token.
pub const TOKEN_LEN: usize = 64;

const IV_LEN: usize = 16;
const BLOCK_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 32;
const MAC_KEY_CONTEXT: &[u8] = b"booking-session/v2-mac";

/// Returns `true` when `value` has the remote API token shape (64 hex characters).
pub fn is_token_shaped(value: &str) -> bool {
	value.len() == TOKEN_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Encrypts and decrypts short secrets for storage.
pub trait Codec
where
	Self: Send + Sync,
{
	/// Encrypts `plaintext` into the current envelope format.
	fn encrypt(&self, plaintext: &str) -> String;

	/// Decrypts any supported envelope, returning an empty string when nothing usable decodes.
	fn decrypt(&self, envelope: &str) -> String;
}

/// Secrets the codec derives its keys from.
#[derive(Clone)]
pub struct CodecKeys {
	secret: TokenSecret,
	legacy_secret: TokenSecret,
}
impl CodecKeys {
	/// Creates a key set from the current static secret and the legacy raw secret.
	pub fn new(secret: impl Into<String>, legacy_secret: impl Into<String>) -> Self {
		Self {
			secret: TokenSecret::new(secret.into()),
			legacy_secret: TokenSecret::new(legacy_secret.into()),
		}
	}
}
impl Debug for CodecKeys {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CodecKeys")
			.field("secret", &self.secret)
			.field("legacy_secret", &self.legacy_secret)
			.finish()
	}
}

/// AES-256-CBC [`Codec`] with versioned envelopes and legacy fallbacks.
#[derive(Clone)]
pub struct AesCbcCodec {
	current: [u8; KEY_LEN],
	legacy: [u8; KEY_LEN],
}
impl AesCbcCodec {
	/// Builds the codec from the provided secrets.
	pub fn new(keys: CodecKeys) -> Self {
		Self {
			current: derive_key(keys.secret.expose()),
			legacy: raw_key(keys.legacy_secret.expose()),
		}
	}

	fn decrypt_v2(&self, body: &str) -> Option<String> {
		let (iv, ciphertext) = body.split_once('.')?;
		let iv = STANDARD.decode(iv).ok()?;
		let sealed = STANDARD.decode(ciphertext).ok()?;

		// Values written while keys rotated used the raw legacy secret.
		open_v2(&self.current, &iv, &sealed).or_else(|| open_v2(&self.legacy, &iv, &sealed))
	}

	fn decrypt_legacy(&self, envelope: &str) -> Option<String> {
		let once = STANDARD.decode(envelope.trim()).ok()?;

		self.open_legacy(&once).or_else(|| {
			let twice = STANDARD.decode(&once).ok()?;

			self.open_legacy(&twice)
		})
	}

	fn open_legacy(&self, payload: &[u8]) -> Option<String> {
		if payload.len() < IV_LEN + BLOCK_LEN {
			return None;
		}

		let (iv, ciphertext) = payload.split_at(IV_LEN);

		open(&self.legacy, iv, ciphertext).filter(|plaintext| is_token_shaped(plaintext))
	}
}
impl Codec for AesCbcCodec {
	fn encrypt(&self, plaintext: &str) -> String {
		let iv: [u8; IV_LEN] = rand::random();
		let sealed = seal_v2(&self.current, &iv, plaintext);

		format!("{ENVELOPE_V2_PREFIX}{}.{}", STANDARD.encode(iv), STANDARD.encode(sealed))
	}

	fn decrypt(&self, envelope: &str) -> String {
		if envelope.is_empty() {
			return String::new();
		}

		let plaintext = match envelope.strip_prefix(ENVELOPE_V2_PREFIX) {
			Some(body) => self.decrypt_v2(body),
			None => self.decrypt_legacy(envelope),
		};

		plaintext.unwrap_or_default()
	}
}
impl Debug for AesCbcCodec {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("AesCbcCodec(..)")
	}
}

fn seal_v2(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &str) -> Vec<u8> {
	let mut sealed = Aes256CbcEnc::new(&(*key).into(), &(*iv).into())
		.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
	let tag = v2_mac(key, iv, &sealed).finalize().into_bytes();

	sealed.extend_from_slice(&tag);

	sealed
}

fn open_v2(key: &[u8; KEY_LEN], iv: &[u8], sealed: &[u8]) -> Option<String> {
	let body_len = sealed.len().checked_sub(TAG_LEN)?;
	let (ciphertext, tag) = sealed.split_at(body_len);

	v2_mac(key, iv, ciphertext).verify_slice(tag).ok()?;

	open(key, iv, ciphertext)
}

fn v2_mac(key: &[u8; KEY_LEN], iv: &[u8], ciphertext: &[u8]) -> HmacSha256 {
	// SHA-512 output matches the SHA-256 block size, which is the HMAC key length.
	let mac_key = Sha512::new().chain_update(MAC_KEY_CONTEXT).chain_update(key).finalize();
	let mut mac = <HmacSha256 as Mac>::new(&mac_key);

	mac.update(iv);
	mac.update(ciphertext);

	mac
}

fn open(key: &[u8; KEY_LEN], iv: &[u8], ciphertext: &[u8]) -> Option<String> {
	if iv.len() != IV_LEN || ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
		return None;
	}

	let plaintext = Aes256CbcDec::new_from_slices(key, iv)
		.ok()?
		.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
		.ok()?;

	String::from_utf8(plaintext).ok().filter(|value| !value.is_empty())
}

fn derive_key(secret: &str) -> [u8; KEY_LEN] {
	let digest = Sha256::digest(secret.as_bytes());
	let mut key = [0; KEY_LEN];

	key.copy_from_slice(&digest);

	key
}

// Short secrets are zero-padded and long ones truncated, the way OpenSSL treats raw keys.
fn raw_key(secret: &str) -> [u8; KEY_LEN] {
	let mut key = [0; KEY_LEN];
	let len = secret.len().min(KEY_LEN);

	key[..len].copy_from_slice(&secret.as_bytes()[..len]);

	key
}
