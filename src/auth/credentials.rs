//! Account credentials kept for automatic re-authentication.

// self
use crate::{
	_prelude::*,
	auth::{Codec, TokenSecret},
	store::{KvStore, StoreError},
};

const CREDENTIALS_KEY: &str = "auth:credentials";

/// Company login, user login, and password for password-based authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
	/// Company login identifying the remote account.
	pub company: String,
	/// User login within the company.
	pub login: String,
	/// Plaintext password; encrypted whenever it is persisted.
	pub password: TokenSecret,
}
impl AccountCredentials {
	/// Creates a credential set.
	pub fn new(
		company: impl Into<String>,
		login: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self {
			company: company.into(),
			login: login.into(),
			password: TokenSecret::new(password.into()),
		}
	}
}
impl Debug for AccountCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccountCredentials")
			.field("company", &self.company)
			.field("login", &self.login)
			.field("password", &self.password)
			.finish()
	}
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
	company: String,
	login: String,
	password: String,
}

/// Persists [`AccountCredentials`] with the password encrypted by a [`Codec`].
#[derive(Clone)]
pub struct CredentialStore {
	store: Arc<dyn KvStore>,
	codec: Arc<dyn Codec>,
}
impl CredentialStore {
	/// Creates a credential store.
	pub fn new(store: Arc<dyn KvStore>, codec: Arc<dyn Codec>) -> Self {
		Self { store, codec }
	}

	/// Saves credentials, encrypting the password.
	pub async fn save(&self, credentials: &AccountCredentials) -> Result<(), StoreError> {
		let stored = StoredCredentials {
			company: credentials.company.clone(),
			login: credentials.login.clone(),
			password: self.codec.encrypt(credentials.password.expose()),
		};

		self.store.save(CREDENTIALS_KEY, &stored, None).await
	}

	/// Loads credentials; `None` when no company login is stored.
	///
	/// An undecodable password comes back empty, which the remote API will reject.
	pub async fn load(&self) -> Result<Option<AccountCredentials>, StoreError> {
		let stored: Option<StoredCredentials> = self.store.load(CREDENTIALS_KEY).await?;

		Ok(stored.filter(|stored| !stored.company.is_empty()).map(|stored| AccountCredentials {
			password: TokenSecret::new(self.codec.decrypt(&stored.password)),
			company: stored.company,
			login: stored.login,
		}))
	}

	/// Returns the stored company login, if any.
	pub async fn company(&self) -> Result<Option<String>, StoreError> {
		Ok(self.load().await?.map(|credentials| credentials.company))
	}

	/// Forgets the stored credentials.
	pub async fn clear(&self) -> Result<(), StoreError> {
		self.store.delete(CREDENTIALS_KEY).await
	}
}
impl Debug for CredentialStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CredentialStore(..)")
	}
}
