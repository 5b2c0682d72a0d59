//! Search operations. A [`SearchOperation`] carries the request (base, scope, filter,
//! requested attributes and directives), its limits, and the entries returned so far.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::prelude::*;

/// Which of the real and virtual values a request wants to see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualAttributeDirectives {
    pub real_only: bool,
    pub virtual_only: bool,
}

impl VirtualAttributeDirectives {
    pub fn real_only() -> Self {
        VirtualAttributeDirectives {
            real_only: true,
            virtual_only: false,
        }
    }

    pub fn virtual_only() -> Self {
        VirtualAttributeDirectives {
            real_only: false,
            virtual_only: true,
        }
    }
}

/// The attributes a search returns, from the requested attribute list of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelection {
    all_user: bool,
    all_operational: bool,
    names: BTreeSet<Attribute>,
}

impl Default for AttributeSelection {
    fn default() -> Self {
        AttributeSelection {
            all_user: true,
            all_operational: false,
            names: BTreeSet::new(),
        }
    }
}

impl AttributeSelection {
    /// No attributes at all, as requested by `1.1`.
    pub fn none() -> Self {
        AttributeSelection {
            all_user: false,
            all_operational: false,
            names: BTreeSet::new(),
        }
    }

    pub fn from_requested<S: AsRef<str>>(requested: &[S]) -> Self {
        if requested.is_empty() {
            return AttributeSelection::default();
        }
        let mut sel = AttributeSelection::none();
        for r in requested {
            match r.as_ref().trim() {
                LDAP_ALL_USER_ATTRIBUTES => sel.all_user = true,
                LDAP_ALL_OPERATIONAL_ATTRIBUTES => sel.all_operational = true,
                LDAP_NO_ATTRIBUTES => {}
                name => {
                    sel.names.insert(Attribute::from_str(name));
                }
            }
        }
        sel
    }

    pub fn includes(&self, attr: &Attribute) -> bool {
        if self.names.contains(attr) {
            return true;
        }
        if attr.is_operational() {
            self.all_operational
        } else {
            self.all_user
        }
    }
}

/// Lets the requestor abandon a running search. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SearchOperation {
    base: Dn,
    scope: SearchScope,
    filter: Filter,
    attributes: AttributeSelection,
    directives: VirtualAttributeDirectives,
    size_limit: usize,
    time_limit: Option<Duration>,
    started: Instant,
    cancel: CancellationToken,
    entries: Vec<Entry>,
}

impl SearchOperation {
    pub fn new(base: Dn, scope: SearchScope, filter: Filter) -> Self {
        SearchOperation {
            base,
            scope,
            filter,
            attributes: AttributeSelection::default(),
            directives: VirtualAttributeDirectives::default(),
            size_limit: 0,
            time_limit: None,
            started: Instant::now(),
            cancel: CancellationToken::default(),
            entries: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeSelection) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_directives(mut self, directives: VirtualAttributeDirectives) -> Self {
        self.directives = directives;
        self
    }

    /// Zero means unlimited.
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = Some(time_limit);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn base(&self) -> &Dn {
        &self.base
    }

    pub fn scope(&self) -> SearchScope {
        self.scope
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn attributes(&self) -> &AttributeSelection {
        &self.attributes
    }

    pub fn directives(&self) -> VirtualAttributeDirectives {
        self.directives
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    /// The entries returned so far. These remain available when the search fails on a
    /// limit.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }

    /// Combine the limits of the request with those of the server, the tighter of each
    /// winning, and start the clock.
    pub(crate) fn apply_limits(&mut self, limits: &Limits) {
        self.size_limit = match (self.size_limit, limits.search_max_results) {
            (0, server) => server,
            (request, 0) => request,
            (request, server) => request.min(server),
        };
        self.time_limit = match (self.time_limit, limits.search_time_limit) {
            (Some(r), Some(s)) => Some(r.min(s)),
            (r, s) => r.or(s),
        };
        self.started = Instant::now();
    }

    /// Called between candidates. Fails once the search was cancelled or ran out of time.
    pub fn check_limits(&self) -> Result<(), OperationError> {
        if self.cancel.is_cancelled() {
            request_info!(base = %self.base, "search cancelled");
            return Err(OperationError::Cancelled);
        }
        if let Some(limit) = self.time_limit {
            if self.started.elapsed() >= limit {
                request_warn!(base = %self.base, ?limit, "search time limit exceeded");
                return Err(OperationError::TimeLimitExceeded);
            }
        }
        Ok(())
    }

    /// Add a matched entry to the results, reduced to the requested attributes. Fails
    /// without adding it when the size limit is already reached.
    pub fn return_entry(&mut self, mut entry: Entry) -> Result<(), OperationError> {
        if self.size_limit > 0 && self.entries.len() >= self.size_limit {
            request_warn!(base = %self.base, limit = self.size_limit, "search size limit exceeded");
            return Err(OperationError::SizeLimitExceeded);
        }
        let attributes = &self.attributes;
        entry.retain_attributes(|a| attributes.includes(a));
        self.entries.push(entry);
        Ok(())
    }
}
