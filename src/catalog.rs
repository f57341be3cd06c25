//! Public and owner catalog browsing: query state, debounced search,
//! stale-response suppression and shop lookup.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::SahliClient;
use crate::types::{ListParams, PublicQuery, Shop};
use crate::utils::urlencoded;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(400);
pub const OWNER_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);
pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const PAGE_SIZES: &[u32] = &[12, 24, 48];

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogQuery {
    page: u32,
    page_size: u32,
    search: String,
    subcategory: Option<String>,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl CatalogQuery {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            search: String::new(),
            subcategory: None,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn subcategory(&self) -> Option<&str> {
        self.subcategory.as_deref()
    }

    pub fn set_search(&mut self, search: &str) {
        self.search = search.trim().to_string();
        self.page = 1;
    }

    pub fn set_subcategory(&mut self, id: Option<&str>) {
        self.subcategory = id.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        self.page = 1;
    }

    pub fn set_page_size(&mut self, size: u32) {
        self.page_size = size.max(1);
        self.page = 1;
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    pub fn total_pages(&self, total: u64) -> u32 {
        let size = u64::from(self.page_size);
        let pages = total.div_ceil(size).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Returns false when already on the last page.
    pub fn next_page(&mut self, total: u64) -> bool {
        if self.page >= self.total_pages(total) {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if self.page <= 1 {
            return false;
        }
        self.page -= 1;
        true
    }

    pub fn public_query(&self) -> PublicQuery {
        PublicQuery {
            page: self.page,
            limit: self.page_size,
            q: (!self.search.is_empty()).then(|| self.search.clone()),
            subcategory_id: self.subcategory.clone(),
            ..PublicQuery::default()
        }
    }

    pub fn list_params(&self) -> ListParams {
        ListParams {
            page: self.page,
            limit: self.page_size,
            search: (!self.search.is_empty()).then(|| self.search.clone()),
        }
    }
}

/// Forwards the latest pushed value once no newer value has arrived for
/// `window`. Closing the input flushes a pending value.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn spawn(window: Duration) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, mut input) = mpsc::unbounded_channel::<T>();
        let (out, output) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut pending: Option<T> = None;
            loop {
                match pending.take() {
                    None => match input.recv().await {
                        Some(v) => pending = Some(v),
                        None => break,
                    },
                    Some(v) => {
                        tokio::select! {
                            next = input.recv() => match next {
                                Some(newer) => pending = Some(newer),
                                None => {
                                    let _ = out.send(v);
                                    break;
                                }
                            },
                            _ = tokio::time::sleep(window) => {
                                if out.send(v).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
        });
        (Self { tx }, output)
    }

    /// False once the debouncer task has stopped.
    pub fn push(&self, value: T) -> bool {
        self.tx.send(value).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Generation counter: only the most recently started request may apply
/// its result.
#[derive(Debug, Clone, Default)]
pub struct LatestOnly {
    generation: Arc<AtomicU64>,
}

impl LatestOnly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }
}

#[derive(Debug)]
pub enum ShopLookup {
    Found(Shop),
    NotFound,
    Failed(String),
}

pub async fn lookup_shop(client: &SahliClient, shop_id: &str) -> ShopLookup {
    match client.get_shop(shop_id).await {
        Ok(Some(shop)) => ShopLookup::Found(shop),
        Ok(None) => ShopLookup::NotFound,
        Err(e) => {
            let msg = e.to_string();
            if e.status() == Some(404) || msg.to_lowercase().contains("not found") {
                ShopLookup::NotFound
            } else {
                tracing::debug!(shop = shop_id, error = %msg, "shop lookup failed");
                ShopLookup::Failed(msg)
            }
        }
    }
}

/// One line of input in the interactive catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseCommand {
    Search(String),
    Next,
    Prev,
    PageSize(u32),
    Page(u32),
    Subcategory(Option<String>),
    Quit,
}

pub fn parse_browse_command(line: &str) -> Result<BrowseCommand, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(BrowseCommand::Search(line.to_string()));
    };
    let (cmd, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (rest, ""),
    };
    match cmd {
        "q" | "quit" => Ok(BrowseCommand::Quit),
        "n" | "next" => Ok(BrowseCommand::Next),
        "p" | "prev" => Ok(BrowseCommand::Prev),
        "size" => arg
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(BrowseCommand::PageSize)
            .ok_or_else(|| format!("Usage: :size N (one of {:?})", PAGE_SIZES)),
        "page" => arg
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(BrowseCommand::Page)
            .ok_or_else(|| "Usage: :page N".to_string()),
        "sub" => match arg {
            "" => Err("Usage: :sub ID|all".to_string()),
            "all" => Ok(BrowseCommand::Subcategory(None)),
            id => Ok(BrowseCommand::Subcategory(Some(id.to_string()))),
        },
        other => Err(format!("Unknown command ':{}'", other)),
    }
}

pub fn shareable_link(storefront: &str, shop_id: &str) -> String {
    format!("{}/shop/{}", storefront.trim_end_matches('/'), urlencoded(shop_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::transport::fake::ScriptedTransport;
    use serde_json::json;
    use tokio::time::Instant;

    #[test]
    fn filter_changes_reset_page() {
        let mut q = CatalogQuery::new(12);
        q.set_page(4);
        q.set_search("  mug ");
        assert_eq!((q.page(), q.search()), (1, "mug"));

        q.set_page(3);
        q.set_subcategory(Some("shirts"));
        assert_eq!(q.page(), 1);

        q.set_page(3);
        q.set_page_size(48);
        assert_eq!(q.page(), 1);

        q.set_page(0);
        assert_eq!(q.page(), 1);
    }

    #[test]
    fn paging_respects_bounds() {
        let mut q = CatalogQuery::new(10);
        assert_eq!(q.total_pages(0), 1);
        assert_eq!(q.total_pages(10), 1);
        assert_eq!(q.total_pages(11), 2);
        assert!(!q.prev_page());
        assert!(q.next_page(25));
        assert!(q.next_page(25));
        assert!(!q.next_page(25));
        assert_eq!(q.page(), 3);
    }

    #[test]
    fn queries_omit_blank_search() {
        let mut q = CatalogQuery::new(24);
        assert_eq!(q.public_query().q, None);
        q.set_search("lamp");
        q.set_subcategory(Some("lights"));
        let public = q.public_query();
        assert_eq!(public.q.as_deref(), Some("lamp"));
        assert_eq!(public.subcategory_id.as_deref(), Some("lights"));
        assert_eq!(public.limit, 24);
        assert_eq!(q.list_params().search.as_deref(), Some("lamp"));
        q.set_subcategory(None);
        assert_eq!(q.public_query().subcategory_id, None);
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_emits_only_after_quiet_window() {
        let (debouncer, mut out) = Debouncer::spawn(SEARCH_DEBOUNCE);
        let start = Instant::now();
        debouncer.push("m");
        tokio::time::sleep(Duration::from_millis(150)).await;
        debouncer.push("mu");
        tokio::time::sleep(Duration::from_millis(150)).await;
        debouncer.push("mug");

        assert_eq!(out.recv().await, Some("mug"));
        assert!(start.elapsed() >= Duration::from_millis(700));
        assert!(out.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_flushes_on_close() {
        let (debouncer, mut out) = Debouncer::spawn(OWNER_SEARCH_DEBOUNCE);
        debouncer.push(1);
        debouncer.push(2);
        drop(debouncer);
        assert_eq!(out.recv().await, Some(2));
        assert_eq!(out.recv().await, None);
    }

    #[test]
    fn only_latest_ticket_is_current() {
        let latest = LatestOnly::new();
        let first = latest.begin();
        assert!(latest.is_current(first));
        let second = latest.begin();
        assert!(!latest.is_current(first));
        assert!(latest.is_current(second));
    }

    fn client(transport: &Arc<ScriptedTransport>) -> SahliClient {
        SahliClient::new(transport.clone(), Arc::new(MemorySessionStore::with_pair("a", "r")))
    }

    #[tokio::test]
    async fn lookup_distinguishes_missing_from_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.reply(200, json!({"success": true, "data": {"_id": "s1", "name": "Acme"}}));
        transport.reply(200, json!({"success": true, "data": null}));
        transport.reply(400, json!({"success": false, "message": "Shop Not Found"}));
        transport.reply(500, json!({"success": false, "message": "Internal error"}));
        let client = client(&transport);

        assert!(matches!(lookup_shop(&client, "s1").await, ShopLookup::Found(s) if s.name == "Acme"));
        assert!(matches!(lookup_shop(&client, "s2").await, ShopLookup::NotFound));
        assert!(matches!(lookup_shop(&client, "s3").await, ShopLookup::NotFound));
        assert!(matches!(lookup_shop(&client, "s4").await, ShopLookup::Failed(m) if m == "Internal error"));
    }

    #[test]
    fn browse_commands() {
        assert_eq!(parse_browse_command("  red mug "), Ok(BrowseCommand::Search("red mug".into())));
        assert_eq!(parse_browse_command(""), Ok(BrowseCommand::Search(String::new())));
        assert_eq!(parse_browse_command(":n"), Ok(BrowseCommand::Next));
        assert_eq!(parse_browse_command(":p"), Ok(BrowseCommand::Prev));
        assert_eq!(parse_browse_command(":size 24"), Ok(BrowseCommand::PageSize(24)));
        assert!(parse_browse_command(":size 0").is_err());
        assert_eq!(parse_browse_command(":page 3"), Ok(BrowseCommand::Page(3)));
        assert!(parse_browse_command(":page x").is_err());
        assert_eq!(parse_browse_command(":sub all"), Ok(BrowseCommand::Subcategory(None)));
        assert_eq!(
            parse_browse_command(":sub shirts"),
            Ok(BrowseCommand::Subcategory(Some("shirts".into())))
        );
        assert!(parse_browse_command(":sub").is_err());
        assert_eq!(parse_browse_command(":q"), Ok(BrowseCommand::Quit));
        assert!(parse_browse_command(":zoom").is_err());
    }

    #[test]
    fn link_uses_storefront_base() {
        assert_eq!(
            shareable_link("https://shop.example/", "64f0a1"),
            "https://shop.example/shop/64f0a1"
        );
    }
}
