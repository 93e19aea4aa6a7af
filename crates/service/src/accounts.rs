use ahash::{HashMap, HashMapExt};
use parking_lot::RwLock;

/// In-memory credential table keyed by `(realm, account)`.
///
/// Both key components are matched case-insensitively; passwords are
/// compared verbatim.
pub struct AccountStore {
    accounts: RwLock<HashMap<(String, String), String>>,
}

impl Default for AccountStore {
    fn default() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }
}

impl AccountStore {
    pub fn insert(&self, realm: &str, account: &str, password: &str) {
        self.accounts
            .write()
            .insert(key(realm, account), password.to_string());
    }

    /// Loads accounts from `realm;account;password` lines.
    ///
    /// Blank lines and lines starting with `//` are ignored, fields
    /// are trimmed, and later lines win over earlier ones.  Returns
    /// the number of accounts read.
    ///
    /// # Test
    ///
    /// ```
    /// use radius_service::accounts::AccountStore;
    ///
    /// let store = AccountStore::default();
    /// let count = store.load_from_text(
    ///     r#"
    ///     // test accounts
    ///     r1;jeff;foo
    ///     r2 ; jane ; bar
    ///     "#,
    /// );
    ///
    /// assert_eq!(count, 2);
    /// assert!(store.check("R1", "Jeff", "foo"));
    /// assert!(store.check("r2", "jane", "bar"));
    /// ```
    pub fn load_from_text(&self, text: &str) -> usize {
        let mut count = 0;
        let mut accounts = self.accounts.write();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            let mut fields = line.splitn(3, ';').map(str::trim);
            let (Some(realm), Some(account), Some(password)) =
                (fields.next(), fields.next(), fields.next())
            else {
                log::warn!("malformed account line skipped: {:?}", line);
                continue;
            };

            accounts.insert(key(realm, account), password.to_string());
            count += 1;
        }

        count
    }

    pub fn lookup(&self, realm: &str, account: &str) -> Option<String> {
        self.accounts.read().get(&key(realm, account)).cloned()
    }

    pub fn check(&self, realm: &str, account: &str, password: &str) -> bool {
        self.lookup(realm, account).as_deref() == Some(password)
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(realm: &str, account: &str) -> (String, String) {
    (realm.to_lowercase(), account.to_lowercase())
}
