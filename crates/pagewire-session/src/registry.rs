//! The session registry: tracks every live page and its members.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. It is owned by a single
//! task (the relay hub) and every mutation runs to completion before the
//! next event is looked at, which is what makes membership updates atomic
//! with respect to each other. Callers on other tasks go through the hub's
//! command channel.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use pagewire_expiry::ExpiryScheduler;
use pagewire_protocol::{ConnectionId, PageId};

use crate::{PageSession, SessionError};

/// Result of a successful [`SessionRegistry::join_page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The page's shared state at the moment of joining.
    pub shared_state: String,
    /// The page the connection was moved out of, if it was in another one.
    pub previous_page: Option<PageId>,
}

/// Owns every [`PageSession`].
///
/// ## Lifecycle
///
/// ```text
/// create_page() ──→ join_page() ──→ update_shared_state() ──→ leave_page()
///       │                                                        │
///       └────────── (ttl elapses) ──→ expire() ◄─────────────────┘
///                                       │
///                                       ▼
///                             page + memberships gone
/// ```
///
/// Pages are kept in creation order so the page list every client sees is
/// stable. A connection is in at most one page; `page_of` is the reverse
/// index that enforces it.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    pages: IndexMap<PageId, PageSession>,
    page_of: HashMap<ConnectionId, PageId>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `page_id` and starts its expiry timer.
    ///
    /// Idempotent: an existing page is left untouched (its timer is not
    /// restarted). Returns `true` if a new page was created.
    pub fn create_page(
        &mut self,
        page_id: PageId,
        scheduler: &mut ExpiryScheduler<PageId>,
    ) -> bool {
        if self.pages.contains_key(&page_id) {
            tracing::debug!(%page_id, "page already exists");
            return false;
        }

        let timer = scheduler.schedule(page_id.clone());
        tracing::info!(
            %page_id,
            ttl_ms = scheduler.ttl().as_millis() as u64,
            "page created"
        );
        self.pages.insert(page_id, PageSession::new(timer));
        true
    }

    /// Adds `conn` to `page_id` and returns the page's shared state.
    ///
    /// A connection already in a different page is moved out of it first.
    /// Joining the page it is already in changes nothing.
    ///
    /// # Errors
    /// [`SessionError::InvalidSession`] if the page does not exist. The
    /// connection is then not added anywhere.
    pub fn join_page(
        &mut self,
        page_id: &PageId,
        conn: &ConnectionId,
    ) -> Result<JoinOutcome, SessionError> {
        if !self.pages.contains_key(page_id) {
            return Err(SessionError::InvalidSession(page_id.clone()));
        }

        let previous_page = match self.page_of.get(conn) {
            Some(current) if current != page_id => {
                let current = current.clone();
                if let Some(old) = self.pages.get_mut(&current) {
                    old.members.remove(conn);
                }
                tracing::info!(%conn, from = %current, to = %page_id, "connection moved pages");
                Some(current)
            }
            _ => None,
        };

        let page = self
            .pages
            .get_mut(page_id)
            .ok_or_else(|| SessionError::InvalidSession(page_id.clone()))?;
        page.members.insert(conn.clone());
        self.page_of.insert(conn.clone(), page_id.clone());

        tracing::info!(
            %page_id,
            %conn,
            members = page.members.len(),
            "connection joined page"
        );

        Ok(JoinOutcome {
            shared_state: page.shared_state.clone(),
            previous_page,
        })
    }

    /// Removes `conn` from whichever page it is in.
    ///
    /// Returns the page it left, or `None` if it was in no page.
    pub fn leave_page(&mut self, conn: &ConnectionId) -> Option<PageId> {
        let page_id = self.page_of.remove(conn)?;
        if let Some(page) = self.pages.get_mut(&page_id) {
            page.members.remove(conn);
            tracing::info!(
                %page_id,
                %conn,
                members = page.members.len(),
                "connection left page"
            );
        }
        Some(page_id)
    }

    /// Replaces the page's shared state (last write wins).
    ///
    /// Returns `false` and does nothing if the page is unknown.
    pub fn update_shared_state(
        &mut self,
        page_id: &PageId,
        message: String,
    ) -> bool {
        match self.pages.get_mut(page_id) {
            Some(page) => {
                page.shared_state = message;
                true
            }
            None => false,
        }
    }

    /// Restarts the page's timer. Used by the idle-timeout policy.
    ///
    /// The previous timer is dropped (and so aborted). Returns `false` if
    /// the page is unknown.
    pub fn touch(
        &mut self,
        page_id: &PageId,
        scheduler: &mut ExpiryScheduler<PageId>,
    ) -> bool {
        match self.pages.get_mut(page_id) {
            Some(page) => {
                page.timer = scheduler.schedule(page_id.clone());
                true
            }
            None => false,
        }
    }

    /// Removes the page if `generation` is its live timer generation.
    ///
    /// Returns the connections that were in the page, whose memberships
    /// are gone too. Returns `None` for a stale generation or a page that
    /// no longer exists.
    pub fn expire(
        &mut self,
        page_id: &PageId,
        generation: u64,
    ) -> Option<HashSet<ConnectionId>> {
        match self.pages.get(page_id) {
            Some(page) if page.generation() == generation => {}
            Some(_) => {
                tracing::debug!(%page_id, generation, "ignoring stale expiry");
                return None;
            }
            None => return None,
        }

        let PageSession { members, .. } = self.pages.shift_remove(page_id)?;
        for conn in &members {
            self.page_of.remove(conn);
        }
        tracing::info!(
            %page_id,
            evicted = members.len(),
            pages = ?self.list_pages(),
            "page expired"
        );
        Some(members)
    }

    /// All page ids, in creation order.
    pub fn list_pages(&self) -> Vec<PageId> {
        self.pages.keys().cloned().collect()
    }

    /// Looks up a page record.
    pub fn get(&self, page_id: &PageId) -> Option<&PageSession> {
        self.pages.get(page_id)
    }

    /// Members of a page, or `None` if the page is unknown.
    pub fn members(&self, page_id: &PageId) -> Option<&HashSet<ConnectionId>> {
        self.pages.get(page_id).map(PageSession::members)
    }

    /// Shared state of a page, or `None` if the page is unknown.
    pub fn shared_state(&self, page_id: &PageId) -> Option<&str> {
        self.pages.get(page_id).map(PageSession::shared_state)
    }

    /// The page `conn` is currently in.
    pub fn page_of(&self, conn: &ConnectionId) -> Option<&PageId> {
        self.page_of.get(conn)
    }

    /// Returns `true` if the page exists.
    pub fn contains(&self, page_id: &PageId) -> bool {
        self.pages.contains_key(page_id)
    }

    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Returns `true` if there are no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionRegistry`.
    //!
    //! Creating a page spawns its timer, so every test runs on a Tokio
    //! runtime with the clock paused. Nothing here waits on time; expiry
    //! is driven by calling `expire` with the generation of the timer.

    use pagewire_expiry::ExpiryConfig;

    use super::*;

    fn scheduler() -> ExpiryScheduler<PageId> {
        ExpiryScheduler::new(ExpiryConfig::default())
    }

    fn page(id: &str) -> PageId {
        PageId::new(id)
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn generation_of(reg: &SessionRegistry, id: &str) -> u64 {
        reg.get(&page(id)).expect("page exists").generation()
    }

    // =====================================================================
    // create_page()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_create_page_new_page_starts_empty() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();

        assert!(reg.create_page(page("P1"), &mut s));

        assert!(reg.contains(&page("P1")));
        assert!(reg.members(&page("P1")).unwrap().is_empty());
        assert_eq!(reg.shared_state(&page("P1")), Some(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_page_is_idempotent() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        let generation = generation_of(&reg, "P1");
        reg.join_page(&page("P1"), &conn("c1")).unwrap();

        assert!(!reg.create_page(page("P1"), &mut s));
        assert!(!reg.create_page(page("P1"), &mut s));

        assert_eq!(reg.len(), 1);
        // Members and timer survive the repeated create.
        assert!(reg.members(&page("P1")).unwrap().contains(&conn("c1")));
        assert_eq!(generation_of(&reg, "P1"), generation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_pages_keeps_creation_order() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        for id in ["zeta", "alpha", "mid"] {
            reg.create_page(page(id), &mut s);
        }

        assert_eq!(
            reg.list_pages(),
            vec![page("zeta"), page("alpha"), page("mid")]
        );
    }

    // =====================================================================
    // join_page()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_join_page_unknown_page_is_invalid_session() {
        let mut reg = SessionRegistry::new();

        let result = reg.join_page(&page("nope"), &conn("c1"));

        assert_eq!(result, Err(SessionError::InvalidSession(page("nope"))));
        assert_eq!(reg.page_of(&conn("c1")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_page_adds_member_and_returns_shared_state() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        reg.update_shared_state(&page("P1"), "draft v2".into());

        let outcome = reg.join_page(&page("P1"), &conn("c1")).unwrap();

        assert_eq!(outcome.shared_state, "draft v2");
        assert_eq!(outcome.previous_page, None);
        assert!(reg.members(&page("P1")).unwrap().contains(&conn("c1")));
        assert_eq!(reg.page_of(&conn("c1")), Some(&page("P1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_page_same_page_twice_keeps_one_membership() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);

        reg.join_page(&page("P1"), &conn("c1")).unwrap();
        let outcome = reg.join_page(&page("P1"), &conn("c1")).unwrap();

        assert_eq!(outcome.previous_page, None);
        assert_eq!(reg.members(&page("P1")).unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_page_moves_connection_out_of_previous_page() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        reg.create_page(page("P2"), &mut s);
        reg.join_page(&page("P1"), &conn("c1")).unwrap();

        let outcome = reg.join_page(&page("P2"), &conn("c1")).unwrap();

        assert_eq!(outcome.previous_page, Some(page("P1")));
        assert!(!reg.members(&page("P1")).unwrap().contains(&conn("c1")));
        assert!(reg.members(&page("P2")).unwrap().contains(&conn("c1")));
        assert_eq!(reg.page_of(&conn("c1")), Some(&page("P2")));
    }

    // =====================================================================
    // leave_page()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_leave_page_removes_membership_everywhere() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        reg.join_page(&page("P1"), &conn("c1")).unwrap();
        reg.join_page(&page("P1"), &conn("c2")).unwrap();

        assert_eq!(reg.leave_page(&conn("c1")), Some(page("P1")));

        let members = reg.members(&page("P1")).unwrap();
        assert!(!members.contains(&conn("c1")));
        assert!(members.contains(&conn("c2")));
        assert_eq!(reg.page_of(&conn("c1")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_page_last_member_keeps_page() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        reg.join_page(&page("P1"), &conn("c1")).unwrap();

        reg.leave_page(&conn("c1"));

        assert!(reg.contains(&page("P1")), "empty pages are not removed");
        assert!(reg.members(&page("P1")).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_page_unjoined_connection_is_noop() {
        let mut reg = SessionRegistry::new();
        assert_eq!(reg.leave_page(&conn("ghost")), None);
    }

    // =====================================================================
    // update_shared_state()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_update_shared_state_last_write_wins() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);

        assert!(reg.update_shared_state(&page("P1"), "one".into()));
        assert!(reg.update_shared_state(&page("P1"), "two".into()));

        assert_eq!(reg.shared_state(&page("P1")), Some("two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_shared_state_unknown_page_is_noop() {
        let mut reg = SessionRegistry::new();

        assert!(!reg.update_shared_state(&page("nope"), "x".into()));
        assert!(reg.is_empty(), "no page is created as a side effect");
    }

    // =====================================================================
    // expire() / touch()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_expire_removes_page_and_returns_members() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        reg.create_page(page("P2"), &mut s);
        reg.join_page(&page("P1"), &conn("c1")).unwrap();
        reg.join_page(&page("P1"), &conn("c2")).unwrap();
        let generation = generation_of(&reg, "P1");

        let evicted = reg.expire(&page("P1"), generation).unwrap();

        assert_eq!(evicted, HashSet::from([conn("c1"), conn("c2")]));
        assert!(!reg.contains(&page("P1")));
        assert_eq!(reg.page_of(&conn("c1")), None);
        assert_eq!(reg.list_pages(), vec![page("P2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_then_join_is_invalid_session() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        let generation = generation_of(&reg, "P1");
        reg.expire(&page("P1"), generation);

        let result = reg.join_page(&page("P1"), &conn("c3"));
        assert!(matches!(result, Err(SessionError::InvalidSession(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_stale_generation_is_ignored() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        let old = generation_of(&reg, "P1");

        assert!(reg.touch(&page("P1"), &mut s));
        assert_ne!(generation_of(&reg, "P1"), old);

        assert_eq!(reg.expire(&page("P1"), old), None);
        assert!(reg.contains(&page("P1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_unknown_page_returns_none() {
        let mut reg = SessionRegistry::new();
        assert_eq!(reg.expire(&page("nope"), 1), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreate_after_expiry_starts_fresh() {
        let mut s = scheduler();
        let mut reg = SessionRegistry::new();
        reg.create_page(page("P1"), &mut s);
        reg.update_shared_state(&page("P1"), "old".into());
        let generation = generation_of(&reg, "P1");
        reg.expire(&page("P1"), generation);

        assert!(reg.create_page(page("P1"), &mut s));

        assert_eq!(reg.shared_state(&page("P1")), Some(""));
        assert!(reg.members(&page("P1")).unwrap().is_empty());
    }
}
