//! Streaming search cursor.

use ldap3::{parse_refs, SearchEntry, SearchStream};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cursor::Cursor;
use crate::error::{result_code, DirError, DirResult};
use crate::traits::ReferralMode;
use crate::types::SearchResult;

use super::connection::Connection;
use super::entry_to_result;
use super::referral::ReferralOrigin;

type Stream = SearchStream<'static, String, Vec<String>>;

/// Pulls entries from an `ldap3` search stream one at a time.
///
/// In throw mode continuation references are collected while streaming and
/// surfaced as a referral once the entries are exhausted; otherwise they are
/// skipped.
pub(crate) struct LdapSearchCursor {
    connection: Arc<Connection>,
    stream: Option<Stream>,
    /// DN the search ran against; result names are relative to it.
    base: String,
    origin: ReferralOrigin,
    peeked: Option<SearchResult>,
    references: Vec<String>,
    returned: usize,
}

impl LdapSearchCursor {
    pub(crate) fn new(
        connection: Arc<Connection>,
        stream: Stream,
        base: String,
        origin: ReferralOrigin,
    ) -> Self {
        Self {
            connection,
            stream: Some(stream),
            base,
            origin,
            peeked: None,
            references: Vec::new(),
            returned: 0,
        }
    }

    fn fetch(&mut self) -> DirResult<Option<SearchResult>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        loop {
            match self.connection.block_on(stream.next()) {
                Ok(Some(entry)) if entry.is_ref() => {
                    if self.origin.mode == ReferralMode::Throw {
                        self.references.extend(parse_refs(entry.0));
                    }
                }
                Ok(Some(entry)) if entry.is_intermediate() => {}
                Ok(Some(entry)) => {
                    self.returned += 1;
                    return Ok(Some(entry_to_result(SearchEntry::construct(entry), &self.base)));
                }
                Ok(None) => return self.finish(),
                Err(e) => {
                    self.stream = None;
                    return Err(e.into());
                }
            }
        }
    }

    fn finish(&mut self) -> DirResult<Option<SearchResult>> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(None);
        };
        let result = self.connection.block_on(stream.finish());
        debug!(
            base = %self.base,
            rc = result.rc,
            entries = self.returned,
            references = self.references.len(),
            "LDAP search finished"
        );

        match result.rc {
            result_code::SUCCESS if self.references.is_empty() => Ok(None),
            result_code::SUCCESS => Err(self
                .origin
                .error(std::mem::take(&mut self.references), &self.base)),
            result_code::REFERRAL => Err(self.origin.error(result.refs, &self.base)),
            _ => Err(DirError::from_ldap_result(&result, &self.base)),
        }
    }
}

impl Cursor<SearchResult> for LdapSearchCursor {
    fn has_more(&mut self) -> DirResult<bool> {
        if self.peeked.is_none() {
            self.peeked = self.fetch()?;
        }
        Ok(self.peeked.is_some())
    }

    fn next_entry(&mut self) -> DirResult<Option<SearchResult>> {
        if let Some(result) = self.peeked.take() {
            return Ok(Some(result));
        }
        self.fetch()
    }

    fn close(&mut self) -> DirResult<()> {
        self.peeked = None;
        if let Some(mut stream) = self.stream.take() {
            let handle = stream.ldap_handle();
            let msgid = handle.last_id();
            let mut ldap = handle.clone();
            if let Err(e) = self.connection.block_on(ldap.abandon(msgid)) {
                warn!(base = %self.base, error = %e, "Failed to abandon LDAP search");
            }
        }
        Ok(())
    }
}
