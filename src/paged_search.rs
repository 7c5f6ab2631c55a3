//! Paged Search Driver (C5).
//!
//! Drives a simple-paged-results search loop rooted at a change record's DN,
//! feeding each discovered entry DN to a per-entry handler — the bulk-modify
//! path's inner dispatch (`spec.md` §4.5). Tracks which DNs have already been
//! handled within one `(record, filter)` pair so a page retried after a
//! connection replacement can never present the same entry twice
//! (`spec.md` §8 property 3).
//!
//! The search itself runs on a cloned handle to the pool's active connection
//! (`ldap3::Ldap` is a cheap, shareable handle onto one underlying socket, not
//! an owner of it) so that the handler can keep issuing modify requests
//! through the pool's own handle while entries are still streaming in,
//! matching the single-connection, sequential-callback model of `spec.md` §5.

use std::collections::HashSet;

use async_trait::async_trait;
use ldap3::controls::{PagedResults, RawControl};
use ldap3::{Scope, SearchEntry};

use crate::connection::ConnectionPool;
use crate::error::Result;
use crate::result_model::{OperationOutcome, ResultCode};

pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// What the per-entry handler wants the driver to do after handling one DN.
pub enum HandlerSignal {
    Continue,
    Stop,
}

#[async_trait]
pub trait EntryHandler {
    async fn handle(&mut self, pool: &mut ConnectionPool, dn: &str) -> Result<HandlerSignal>;
}

pub struct PagedSearchOutcome {
    /// The search protocol's own final result; `SUCCESS` unless the search
    /// itself (as opposed to an inner modify it fed) failed.
    pub final_result: OperationOutcome,
    pub entries_processed: u64,
    /// Set when the handler asked the driver to stop after a fatal inner
    /// failure, distinct from a search-level failure.
    pub stopped_by_handler: bool,
}

pub struct PagedSearchDriver {
    page_size: i32,
}

impl PagedSearchDriver {
    pub fn new(page_size: Option<i32>) -> PagedSearchDriver {
        PagedSearchDriver {
            page_size: page_size.unwrap_or(100),
        }
    }

    pub async fn run<H: EntryHandler + Send>(
        &self,
        pool: &mut ConnectionPool,
        base_dn: &str,
        filter: &str,
        extra_controls: Vec<RawControl>,
        handler: &mut H,
    ) -> Result<PagedSearchOutcome> {
        let mut cookie: Vec<u8> = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();
        let mut entries_processed: u64 = 0;
        let mut retried_this_page = false;

        loop {
            let mut controls = extra_controls.clone();
            controls.push(
                PagedResults {
                    size: self.page_size,
                    cookie: cookie.clone(),
                }
                .into(),
            );

            match self
                .run_one_page(pool, base_dn, filter, controls, &mut processed, &mut entries_processed, handler)
                .await?
            {
                PageOutcome::Page { next_cookie: Some(next) } => {
                    cookie = next;
                    retried_this_page = false;
                }
                PageOutcome::Page { next_cookie: None } => {
                    return Ok(PagedSearchOutcome {
                        final_result: OperationOutcome::synthetic(ResultCode::SUCCESS, ""),
                        entries_processed,
                        stopped_by_handler: false,
                    })
                }
                PageOutcome::StoppedByHandler => {
                    return Ok(PagedSearchOutcome {
                        final_result: OperationOutcome::synthetic(ResultCode::SUCCESS, ""),
                        entries_processed,
                        stopped_by_handler: true,
                    })
                }
                PageOutcome::SearchFailed(outcome) => {
                    return Ok(PagedSearchOutcome {
                        final_result: outcome,
                        entries_processed,
                        stopped_by_handler: false,
                    })
                }
                PageOutcome::ConnectionFailed => {
                    if retried_this_page || !pool.retry_enabled() {
                        return Ok(PagedSearchOutcome {
                            final_result: OperationOutcome::synthetic(
                                ResultCode::LOCAL_ERROR,
                                "search connection failed and could not be replaced",
                            ),
                            entries_processed,
                            stopped_by_handler: false,
                        });
                    }
                    pool.replace_defunct().await?;
                    retried_this_page = true;
                }
            }
        }
    }

    async fn run_one_page<H: EntryHandler + Send>(
        &self,
        pool: &mut ConnectionPool,
        base_dn: &str,
        filter: &str,
        controls: Vec<RawControl>,
        processed: &mut HashSet<String>,
        entries_processed: &mut u64,
        handler: &mut H,
    ) -> Result<PageOutcome> {
        // Search on a cloned handle so `pool` stays free for the handler's
        // own modify dispatch per entry (`spec.md` §4.5 step 1/2, §5).
        let mut search_handle = pool.raw_handle().clone();
        let mut search = match search_handle
            .with_controls(controls)
            .streaming_search(base_dn, Scope::Subtree, filter, vec!["1.1"])
            .await
        {
            Ok(s) => s,
            Err(e) if is_connection_error(&e) => return Ok(PageOutcome::ConnectionFailed),
            Err(e) => return Err(e.into()),
        };

        loop {
            match search.next().await {
                Ok(Some(entry)) => {
                    let se = SearchEntry::construct(entry);
                    if !processed.insert(se.dn.clone()) {
                        continue;
                    }
                    *entries_processed += 1;
                    match handler.handle(pool, &se.dn).await? {
                        HandlerSignal::Continue => {}
                        HandlerSignal::Stop => return Ok(PageOutcome::StoppedByHandler),
                    }
                }
                Ok(None) => break,
                Err(e) if is_connection_error(&e) => return Ok(PageOutcome::ConnectionFailed),
                Err(e) => return Err(e.into()),
            }
        }

        let wire = search.result().await?;
        let outcome = OperationOutcome::from_wire(-1, wire);
        if !outcome.is_success() {
            return if outcome.result_code.is_connection_usable() {
                Ok(PageOutcome::SearchFailed(outcome))
            } else {
                Ok(PageOutcome::ConnectionFailed)
            };
        }

        match outcome.get_response_control(PAGED_RESULTS_OID) {
            None => Err(crate::error::ToolError::MissingControl("simple paged results")),
            Some(raw) => {
                let pr: PagedResults = ldap3::controls::parse_control(raw.val.as_deref().unwrap_or(&[]));
                if pr.cookie.is_empty() {
                    Ok(PageOutcome::Page { next_cookie: None })
                } else {
                    Ok(PageOutcome::Page {
                        next_cookie: Some(pr.cookie),
                    })
                }
            }
        }
    }
}

enum PageOutcome {
    Page { next_cookie: Option<Vec<u8>> },
    StoppedByHandler,
    SearchFailed(OperationOutcome),
    ConnectionFailed,
}

fn is_connection_error(err: &ldap3::LdapError) -> bool {
    matches!(err, ldap3::LdapError::Io { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_search_outcome_tracks_stop_reason_separately() {
        let stopped = PagedSearchOutcome {
            final_result: OperationOutcome::synthetic(ResultCode::SUCCESS, ""),
            entries_processed: 2,
            stopped_by_handler: true,
        };
        assert!(stopped.final_result.is_success());
        assert!(stopped.stopped_by_handler);
    }
}
