//! Token kinds understood by the remote API.

// self
use crate::_prelude::*;

/// Audience a stored token pair belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
	/// Company-scoped administrative token; the only kind that supports live refresh.
	Admin,
	/// Public booking-widget token.
	Public,
	/// End-user (client) token.
	User,
}
impl TokenKind {
	/// All kinds, in storage order.
	pub const ALL: [TokenKind; 3] = [TokenKind::Admin, TokenKind::Public, TokenKind::User];

	/// Returns a stable label used in storage keys, spans, and logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenKind::Admin => "admin",
			TokenKind::Public => "public",
			TokenKind::User => "user",
		}
	}

	/// Classifies an endpoint path: `admin/*` is company-scoped, anything else is public.
	pub fn for_path(path: &str) -> Self {
		let trimmed = path.trim_start_matches('/');

		if trimmed == "admin" || trimmed.starts_with("admin/") {
			TokenKind::Admin
		} else {
			TokenKind::Public
		}
	}

	/// Whether the remote API offers a refresh-token exchange for this kind.
	pub const fn supports_refresh(self) -> bool {
		matches!(self, TokenKind::Admin)
	}
}
impl Display for TokenKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for TokenKind {
	type Err = UnknownTokenKind;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"admin" => Ok(TokenKind::Admin),
			"public" => Ok(TokenKind::Public),
			"user" => Ok(TokenKind::User),
			other => Err(UnknownTokenKind(other.to_owned())),
		}
	}
}

/// Error returned when parsing an unknown token kind label.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unknown token kind `{0}`.")]
pub struct UnknownTokenKind(pub String);
