use std::sync::Arc;

use async_trait::async_trait;

use service::{
    ServiceHandler,
    accounts::AccountStore,
    events::{EntryKind, LogEntry},
};

/// Credential validation and event logging for the stand-alone
/// server binary.
///
/// Credentials come from the in-memory account store loaded at
/// startup; every structured event is forwarded to the log facade at
/// a level matching its severity.
#[derive(Clone)]
pub struct Observer {
    accounts: Arc<AccountStore>,
}

impl Observer {
    pub fn new(accounts: Arc<AccountStore>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl ServiceHandler for Observer {
    async fn authenticate(&self, realm: &str, account: &str, password: &str) -> bool {
        self.accounts.check(realm, account, password)
    }

    fn on_event(&self, entry: &LogEntry) {
        match entry.kind {
            EntryKind::Authentication => log::info!(
                "auth: success={}, realm={:?}, account={:?}, nas={}, detail={:?}",
                entry.success,
                entry.realm,
                entry.account,
                entry.nas,
                entry.detail
            ),
            EntryKind::UnknownNas => {
                log::warn!("unknown nas dropped: nas={}, detail={:?}", entry.nas, entry.detail)
            }
            EntryKind::MalformedPacket => {
                log::warn!("malformed packet dropped: nas={}, detail={:?}", entry.nas, entry.detail)
            }
            EntryKind::Internal => {
                log::error!("internal fault: nas={}, detail={:?}", entry.nas, entry.detail)
            }
        }
    }
}
