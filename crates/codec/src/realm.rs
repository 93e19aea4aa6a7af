use std::str::FromStr;

/// The two qualified-username conventions carried on the wire.
///
/// `Email` writes `account@realm` and splits at the last `@`; `Slash`
/// writes `realm/account` and splits at the first `/`.  A username
/// with no separator belongs to the empty realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum RealmFormat {
    #[default]
    Email,
    Slash,
}

impl FromStr for RealmFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "email" => Self::Email,
            "slash" => Self::Slash,
            _ => return Err(format!("unknown realm format: {value}")),
        })
    }
}

/// Splits a qualified username into `(realm, account)`.
///
/// # Test
///
/// ```
/// use radius_codec::realm::{RealmFormat, split_username};
///
/// assert_eq!(split_username("jeff@r1", RealmFormat::Email), ("r1", "jeff"));
/// assert_eq!(split_username("jeff", RealmFormat::Email), ("", "jeff"));
/// assert_eq!(split_username("r1/jeff", RealmFormat::Slash), ("r1", "jeff"));
/// ```
pub fn split_username(username: &str, format: RealmFormat) -> (&str, &str) {
    match format {
        RealmFormat::Email => match username.rsplit_once('@') {
            Some((account, realm)) => (realm, account),
            None => ("", username),
        },
        RealmFormat::Slash => match username.split_once('/') {
            Some((realm, account)) => (realm, account),
            None => ("", username),
        },
    }
}

/// Builds the qualified username for `(realm, account)`; the empty
/// realm yields the bare account.
pub fn join_username(realm: &str, account: &str, format: RealmFormat) -> String {
    if realm.is_empty() {
        return account.to_string();
    }

    match format {
        RealmFormat::Email => format!("{account}@{realm}"),
        RealmFormat::Slash => format!("{realm}/{account}"),
    }
}
