mod api;
mod auth;
mod catalog;
mod cli;
mod config;
mod error;
mod field_errors;
mod images;
mod product_form;
mod schema;
mod session;
mod shop_form;
mod transport;
mod types;
mod utils;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, ProductCommands, ShopCommands};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use api::SahliClient;
use catalog::{BrowseCommand, CatalogQuery, Debouncer, LatestOnly, ShopLookup, Ticket};
use error::ApiError;
use images::{ImageFile, PreviewPool};
use product_form::{CoreField, ProductForm};
use session::FileSessionStore;
use shop_form::ShopDraft;
use transport::ReqwestTransport;
use types::{ListParams, Page, Product};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_client() -> Result<SahliClient> {
    let session = FileSessionStore::new(config::credentials_path()?);
    let transport = ReqwestTransport::new(config::api_base_url());
    Ok(SahliClient::new(Arc::new(transport), Arc::new(session)))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let client = build_client()?;

    match cli.command {
        Commands::Login { email, password } => auth::login(&client, &email, &password).await,
        Commands::Register {
            name,
            email,
            password,
        } => auth::register(&client, &name, &email, &password).await,
        Commands::Verify { pending_id, code } => auth::verify(&client, &pending_id, &code).await,
        Commands::Logout => auth::logout(&client),
        Commands::Whoami => auth::whoami(&client).await,
        Commands::Categories => cmd_categories(&client).await,
        Commands::Shops {
            search,
            page,
            limit,
        } => cmd_shops(&client, ListParams { page, limit, search }).await,
        Commands::Shop { action } => match action {
            ShopCommands::Create {
                name,
                address,
                description,
                color,
                logo,
            } => cmd_shop_create(&client, name, address, description, color, logo).await,
            ShopCommands::Show { id } => cmd_shop_show(&client, &id).await,
            ShopCommands::Link { id, open } => cmd_shop_link(&id, open),
        },
        Commands::Products {
            shop,
            search,
            page,
            limit,
        } => cmd_products(&client, &shop, ListParams { page, limit, search }).await,
        Commands::Product { action } => match action {
            ProductCommands::Create {
                shop,
                category,
                subcategory,
                title,
                price,
                stock,
                description,
                attrs,
                images,
            } => {
                cmd_product_create(
                    &client,
                    NewProductArgs {
                        shop,
                        category,
                        subcategory,
                        title,
                        price,
                        stock,
                        description,
                        attrs,
                        images,
                    },
                )
                .await
            }
        },
        Commands::Browse { shop, limit, mine } => cmd_browse(client, shop, limit, mine).await,
    }
}

async fn cmd_categories(client: &SahliClient) -> Result<()> {
    let categories = client.list_categories().await?;
    if categories.is_empty() {
        println!("No categories available.");
        return Ok(());
    }
    for cat in &categories {
        println!("{}  [{}]", cat.name, cat.id);
        for sub in &cat.subcategories {
            println!("  {}  [{}]", sub.name, sub.id);
            for field in &sub.fields {
                let mut line = format!(
                    "    --attr {}=<{}>  {}",
                    field.key,
                    field.kind.name(),
                    field.label
                );
                if field.required {
                    line.push_str(" (required)");
                }
                if let schema::FieldKind::Select { options } = &field.kind {
                    line.push_str(&format!("  one of: {}", options.join(", ")));
                }
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn print_shops(page: &Page<types::Shop>) {
    if page.items.is_empty() {
        println!("No shops yet. Run `sahli shop create` to open one.");
        return;
    }
    for shop in &page.items {
        let products = shop
            .product_count
            .map(|n| format!("{} product{}", n, if n == 1 { "" } else { "s" }))
            .unwrap_or_default();
        println!("{:<28} [{}]  {}", utils::truncate_str(&shop.name, 28), shop.id, products);
        if let Some(address) = shop.address.as_deref().filter(|a| !a.is_empty()) {
            println!("  {}", utils::truncate_str(address, 60));
        }
    }
    println!();
    println!(
        "Page {} · {} shop{} total",
        page.page,
        page.total,
        if page.total == 1 { "" } else { "s" }
    );
}

async fn cmd_shops(client: &SahliClient, params: ListParams) -> Result<()> {
    let page = client.my_shops(&params).await?;
    print_shops(&page);
    Ok(())
}

async fn cmd_shop_create(
    client: &SahliClient,
    name: String,
    address: String,
    description: Option<String>,
    color: Option<String>,
    logo: Option<PathBuf>,
) -> Result<()> {
    let mut draft = ShopDraft::new(PreviewPool::new());
    draft.name = name;
    draft.address = address;
    draft.description = description.unwrap_or_default();
    if let Some(color) = color {
        draft.theme_color = color;
    }
    if let Some(path) = logo {
        draft.set_logo(ImageFile::read(&path)?).map_err(|msg| anyhow!(msg))?;
        if let Some(logo) = draft.logo() {
            println!("Logo: {} ({})", logo.file.name, utils::format_bytes(logo.file.size()));
            tracing::debug!(preview = logo.preview.id(), "staged logo");
        }
    }

    match draft.submit(client).await {
        Ok(shop) => {
            println!("Created shop {} [{}]", shop.name, shop.id);
            println!("  Link: {}", catalog::shareable_link(&config::storefront_url(), &shop.id));
            println!();
            match client.my_shops(&ListParams::default()).await {
                Ok(page) => print_shops(&page),
                Err(e) => tracing::warn!(error = %e, "could not list shops after create"),
            }
            Ok(())
        }
        Err(_) => {
            let mut report = String::from("Could not create shop");
            if !draft.errors().is_empty() {
                report.push_str(":\n");
                report.push_str(&auth::describe_field_errors(draft.errors()));
            } else if let Some(general) = draft.general_error() {
                report.push_str(": ");
                report.push_str(general);
            }
            Err(anyhow!(report))
        }
    }
}

async fn cmd_shop_show(client: &SahliClient, shop_id: &str) -> Result<()> {
    let shop = match catalog::lookup_shop(client, shop_id).await {
        ShopLookup::Found(shop) => shop,
        ShopLookup::NotFound => {
            println!("Shop not found. It may have been removed or the link is wrong.");
            return Ok(());
        }
        ShopLookup::Failed(msg) => {
            return Err(anyhow!("Failed to load shop: {}. Try again.", msg));
        }
    };

    println!("{}", shop.name);
    if let Some(address) = shop.address.as_deref().filter(|a| !a.is_empty()) {
        println!("  {}", address);
    }
    if let Some(desc) = shop.description.as_deref().filter(|d| !d.is_empty()) {
        println!("  {}", utils::truncate_str(desc, 120));
    }
    if let Some(color) = &shop.theme_color {
        println!("  Theme: {}", color);
    }
    if let Some(url) = shop.image.as_ref().and_then(|i| i.url.as_deref()) {
        println!("  Logo:  {}", url);
    }

    match client.shop_subcategories(shop_id).await {
        Ok(subs) if !subs.is_empty() => {
            let names: Vec<_> = subs.iter().map(|s| format!("{} [{}]", s.name, s.id)).collect();
            println!("  Sells: {}", names.join(", "));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not load shop subcategories"),
    }
    println!("  Link:  {}", catalog::shareable_link(&config::storefront_url(), &shop.id));
    Ok(())
}

fn cmd_shop_link(shop_id: &str, open: bool) -> Result<()> {
    let link = catalog::shareable_link(&config::storefront_url(), shop_id);
    println!("{}", link);
    if open {
        open::that(&link).with_context(|| format!("Failed to open {}", link))?;
    }
    Ok(())
}

fn print_products(page: &Page<Product>, query: Option<&CatalogQuery>) {
    if page.items.is_empty() {
        println!("No products found.");
    }
    for p in &page.items {
        let stock = p.stock.map(|s| format!("  stock {}", s)).unwrap_or_default();
        let category = p
            .category
            .as_ref()
            .map(|c| format!("  [{}]", c.display()))
            .unwrap_or_default();
        let images = match p.images.len() {
            0 => String::new(),
            1 => "  1 image".to_string(),
            n => format!("  {} images", n),
        };
        println!(
            "{:<32} {:>10}{}{}{}",
            utils::truncate_str(&p.title, 32),
            utils::format_price(p.price),
            stock,
            category,
            images
        );
        if let Some(desc) = p.description.as_deref().filter(|d| !d.trim().is_empty()) {
            println!("  {}", utils::truncate_str(desc.trim(), 70));
        }
    }
    match query {
        Some(q) => println!(
            "Page {}/{} · {} per page · {} product{}{}",
            q.page(),
            q.total_pages(page.total),
            q.page_size(),
            page.total,
            if page.total == 1 { "" } else { "s" },
            q.subcategory().map(|s| format!(" in [{}]", s)).unwrap_or_default()
        ),
        None => println!(
            "Page {} · {} product{}",
            page.page,
            page.total,
            if page.total == 1 { "" } else { "s" }
        ),
    }
}

async fn cmd_products(client: &SahliClient, shop_id: &str, params: ListParams) -> Result<()> {
    let page = client.shop_products(shop_id, &params).await?;
    print_products(&page, None);
    Ok(())
}

struct NewProductArgs {
    shop: String,
    category: String,
    subcategory: String,
    title: String,
    price: String,
    stock: Option<String>,
    description: Option<String>,
    attrs: Vec<String>,
    images: Vec<PathBuf>,
}

async fn cmd_product_create(client: &SahliClient, args: NewProductArgs) -> Result<()> {
    let categories = client.list_categories().await?;
    let pool = PreviewPool::new();
    let mut form = ProductForm::new(categories, pool.clone());

    // Step 1
    if let Err(msg) = form.select_category(&args.category) {
        let known: Vec<_> = form
            .categories()
            .iter()
            .map(|c| format!("{} [{}]", c.name, c.id))
            .collect();
        return Err(anyhow!("{}. Available: {}", msg, known.join(", ")));
    }
    form.select_subcategory(&args.subcategory).map_err(|m| anyhow!(m))?;
    if !form.advance() {
        return Err(anyhow!(product_form::CATEGORY_REQUIRED));
    }
    if let Some(label) = form.selection_label() {
        println!("Category: {}", label);
    }

    // Step 2
    form.set_core(CoreField::Title, args.title);
    form.set_core(CoreField::Price, args.price);
    form.set_core(CoreField::Stock, args.stock.unwrap_or_default());
    form.set_core(CoreField::Description, args.description.unwrap_or_default());
    for raw in &args.attrs {
        let (key, value) = utils::parse_key_value(raw).map_err(|m| anyhow!(m))?;
        form.set_attribute_input(&key, &value).map_err(|m| anyhow!(m))?;
    }
    let mut files = Vec::with_capacity(args.images.len());
    for path in &args.images {
        files.push(ImageFile::read(path)?);
    }
    let requested = files.len();
    let staged = form.stage_images(files);
    if let Some(msg) = form.errors().get("images") {
        return Err(anyhow!(msg.to_string()));
    }
    if staged < requested {
        eprintln!(
            "Only the first {} image{} were kept (limit {}).",
            staged,
            if staged == 1 { "" } else { "s" },
            images::MAX_IMAGES
        );
    }
    for name in form.drop_duplicate_images() {
        eprintln!("Skipping duplicate image {}", name);
    }
    for img in form.images.images() {
        tracing::debug!(file = %img.file.name, preview = img.preview.id(), "staged image");
    }
    println!("{} image{} staged", form.images.len(), if form.images.len() == 1 { "" } else { "s" });

    let result = form
        .submit(client, &args.shop, |p| {
            println!("Uploading images... {}/{}", p.completed, p.total);
        })
        .await;
    match result {
        Ok(product) => {
            println!(
                "Created product {} [{}] at {}",
                product.title,
                product.id,
                utils::format_price(product.price)
            );
            tracing::debug!(previews = pool.live(), "product form finished");
            Ok(())
        }
        Err(_) => {
            let mut lines = Vec::new();
            if !form.errors().is_empty() {
                lines.push(auth::describe_field_errors(form.errors()));
            }
            if form.has_attribute_errors() {
                let fixes: Vec<_> = form
                    .fields()
                    .iter()
                    .filter(|f| form.attribute_error(&f.key).is_some())
                    .map(|f| format!("--attr {}=<{}>", f.key, f.kind.name()))
                    .collect();
                lines.push(format!("  Fix with: {}", fixes.join(" ")));
            }
            if let Some(general) = form.general_error() {
                lines.push(format!("  {}", general));
            }
            Err(anyhow!("Could not create product:\n{}", lines.join("\n")))
        }
    }
}

type PageResult = (Ticket, Result<Page<Product>, ApiError>);

struct Browser {
    client: Arc<SahliClient>,
    shop_id: String,
    mine: bool,
    latest: LatestOnly,
    tx: mpsc::UnboundedSender<PageResult>,
}

impl Browser {
    /// Start loading the page for `query`. Only the newest fetch may render.
    fn fetch(&self, query: &CatalogQuery) {
        let ticket = self.latest.begin();
        let client = Arc::clone(&self.client);
        let shop_id = self.shop_id.clone();
        let mine = self.mine;
        let public = query.public_query();
        let owner = query.list_params();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = if mine {
                client.shop_products(&shop_id, &owner).await
            } else {
                client.public_products(&shop_id, &public).await
            };
            let _ = tx.send((ticket, result));
        });
    }
}

async fn cmd_browse(client: SahliClient, shop_id: String, limit: u32, mine: bool) -> Result<()> {
    let client = Arc::new(client);
    let shop = match catalog::lookup_shop(&client, &shop_id).await {
        ShopLookup::Found(shop) => shop,
        ShopLookup::NotFound => {
            println!("Shop not found.");
            return Ok(());
        }
        ShopLookup::Failed(msg) => return Err(anyhow!("Failed to load shop: {}", msg)),
    };
    println!("{}", shop.name);
    if let Ok(subs) = client.shop_subcategories(&shop_id).await {
        if !subs.is_empty() {
            let names: Vec<_> = subs.iter().map(|s| format!("{} [{}]", s.name, s.id)).collect();
            println!("Subcategories: {}", names.join(", "));
        }
    }
    println!("Type to search. :n next, :p previous, :page N, :size N, :sub ID|all, :q quit");

    let mut query = CatalogQuery::new(limit);
    let window = if mine {
        catalog::OWNER_SEARCH_DEBOUNCE
    } else {
        catalog::SEARCH_DEBOUNCE
    };
    let (debouncer, mut searches) = Debouncer::spawn(window);
    let (tx, mut results) = mpsc::unbounded_channel::<PageResult>();
    let browser = Browser {
        client,
        shop_id,
        mine,
        latest: LatestOnly::new(),
        tx,
    };
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut total: u64 = 0;

    browser.fetch(&query);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match catalog::parse_browse_command(&line) {
                    Ok(BrowseCommand::Quit) => break,
                    Ok(BrowseCommand::Search(term)) => {
                        debouncer.push(term);
                    }
                    Ok(BrowseCommand::Next) => {
                        if query.next_page(total) {
                            browser.fetch(&query);
                        } else {
                            println!("Already on the last page.");
                        }
                    }
                    Ok(BrowseCommand::Prev) => {
                        if query.prev_page() {
                            browser.fetch(&query);
                        } else {
                            println!("Already on the first page.");
                        }
                    }
                    Ok(BrowseCommand::PageSize(n)) => {
                        query.set_page_size(n);
                        browser.fetch(&query);
                    }
                    Ok(BrowseCommand::Page(n)) => {
                        query.set_page(n.min(query.total_pages(total)));
                        browser.fetch(&query);
                    }
                    Ok(BrowseCommand::Subcategory(_)) if mine => {
                        eprintln!("Subcategory filters apply to the public catalog only.");
                    }
                    Ok(BrowseCommand::Subcategory(id)) => {
                        query.set_subcategory(id.as_deref());
                        browser.fetch(&query);
                    }
                    Err(msg) => eprintln!("{}", msg),
                }
            }
            Some(term) = searches.recv() => {
                if term != query.search() {
                    query.set_search(&term);
                    browser.fetch(&query);
                }
            }
            Some((ticket, result)) = results.recv() => {
                if !browser.latest.is_current(ticket) {
                    tracing::debug!("discarded stale catalog page");
                    continue;
                }
                match result {
                    Ok(page) => {
                        total = page.total;
                        println!();
                        print_products(&page, Some(&query));
                    }
                    Err(e) => eprintln!("Failed to load products: {}", e),
                }
            }
        }
    }
    Ok(())
}
