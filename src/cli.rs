//! Command-line front end
//!
//! Each subcommand runs against a freshly initialized `CatalogClient` and
//! prints either the visible page, the outcome of the operation or the
//! failure message recorded for it.

use crate::catalog::{
    FetchOutcome, FilterCriteria, MutationOutcome, MutationResult, OperationKind, Product,
    ProductDraft, RefreshStatus,
};
use crate::client::CatalogClient;
use crate::core::config::{Config, ConfigArgs};
use crate::core::error::CatalogError;
use crate::session::{Credentials, Registration};
use anyhow::{anyhow, bail, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

#[derive(Debug, Parser)]
#[command(name = "catalog-sync", version, about = "Product catalog client")]
pub struct Cli {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and remember the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account (does not log in)
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Forget the remembered session
    Logout,

    /// Show the current session
    Whoami,

    /// List products
    List(PageArgs),

    /// List products matching a filter
    Filter {
        /// Name substring
        #[arg(long)]
        name: Option<String>,
        /// Creation date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        created_date: Option<String>,
        /// Minimum stock
        #[arg(long)]
        stock: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Create a product
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        stock: u32,
        #[arg(long, default_value = "")]
        description: String,
        /// Image path or URL; repeat for several images
        #[arg(long = "image")]
        images: Vec<String>,
    },

    /// Edit a product; omitted fields keep their current value
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<Decimal>,
        #[arg(long)]
        stock: Option<u32>,
        #[arg(long)]
        description: Option<String>,
        /// Replace the image list; repeat for several images
        #[arg(long = "image")]
        images: Vec<String>,
    },

    /// Delete a product
    Delete { id: String },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Args)]
pub struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    #[arg(long)]
    pub page_size: Option<usize>,
}

/// Run one command to completion
pub async fn run(command: Command, config: &Config) -> Result<()> {
    let client = CatalogClient::from_config(config)?;
    client.init().await?;

    let result = execute(&client, config, command).await;
    client.teardown().await;
    result
}

async fn execute(client: &CatalogClient, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let session = client
                .login(Credentials::new(email, password))
                .await
                .map_err(report)?;
            println!("Logged in as {} <{}>", session.username, session.email);
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            let receipt = client
                .register(Registration::new(username, email, password))
                .await
                .map_err(report)?;
            println!("{}", receipt.message);
            println!("Run `catalog-sync login` to sign in.");
        }
        Command::Logout => {
            client.logout().await.map_err(report)?;
            println!("Logged out");
        }
        Command::Whoami => match client.session() {
            Some(session) => println!("{} <{}>", session.username, session.email),
            None => println!("Not logged in"),
        },
        Command::List(page) => {
            let outcome = client.load_products().await;
            settle_fetch(client, OperationKind::FetchList, outcome)?;
            show_page(client, &page).await?;
        }
        Command::Filter {
            name,
            created_date,
            stock,
            page,
        } => {
            let criteria = FilterCriteria::from_form(
                name.as_deref().unwrap_or_default(),
                created_date.as_deref().unwrap_or_default(),
                stock.as_deref().unwrap_or_default(),
            )
            .map_err(report)?;
            let outcome = client.apply_filter(criteria).await;
            settle_fetch(client, OperationKind::FilteredFetch, outcome)?;
            show_page(client, &page).await?;
        }
        Command::Create {
            name,
            price,
            stock,
            description,
            images,
        } => {
            let draft = ProductDraft::new(name, price, stock)
                .with_description(description)
                .with_images(images);
            let outcome = client.create_product(draft).await;
            settle_mutation(client, OperationKind::Create, outcome)?;
        }
        Command::Edit {
            id,
            name,
            price,
            stock,
            description,
            images,
        } => {
            let outcome = client.load_products().await;
            settle_fetch(client, OperationKind::FetchList, outcome)?;
            let current = client
                .product(&id)
                .await
                .ok_or_else(|| anyhow!("No product with id {}", id))?;

            let mut draft = ProductDraft::from_product(&current);
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(price) = price {
                draft.price = price;
            }
            if let Some(stock) = stock {
                draft.stock = stock;
            }
            if let Some(description) = description {
                draft.description = description;
            }
            if !images.is_empty() {
                draft.images = images;
            }

            let outcome = client.edit_product(&id, draft).await;
            settle_mutation(client, OperationKind::Edit, outcome)?;
        }
        Command::Delete { id } => {
            let outcome = client.delete_product(&id).await;
            settle_mutation(client, OperationKind::Delete, outcome)?;
        }
        Command::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

fn report(err: CatalogError) -> anyhow::Error {
    anyhow!(err.user_message())
}

/// Prefer the notice recorded by the lifecycle over the raw error
fn settled_error(client: &CatalogClient, kind: OperationKind, err: CatalogError) -> anyhow::Error {
    match err {
        CatalogError::ConcurrencyRejection(_) => anyhow!("A {} request is already in progress", kind),
        err => match client.take_notice(kind) {
            Some(notice) => anyhow!(notice),
            None => report(err),
        },
    }
}

fn settle_fetch(
    client: &CatalogClient,
    kind: OperationKind,
    outcome: crate::core::error::Result<FetchOutcome>,
) -> Result<()> {
    match outcome {
        Ok(FetchOutcome::Applied { .. }) => Ok(()),
        Ok(FetchOutcome::Superseded) => bail!("The product list changed while loading; try again"),
        Err(e) => Err(settled_error(client, kind, e)),
    }
}

fn settle_mutation(
    client: &CatalogClient,
    kind: OperationKind,
    outcome: crate::core::error::Result<MutationOutcome>,
) -> Result<()> {
    let outcome = outcome.map_err(|e| settled_error(client, kind, e))?;

    match &outcome.result {
        MutationResult::Created(product) => {
            println!("Created {} ({})", product.name, product.id)
        }
        MutationResult::Updated(product) => {
            println!("Updated {} ({})", product.name, product.id)
        }
        MutationResult::Deleted(ack) => {
            println!("{}", ack.message.as_deref().unwrap_or("Deleted"))
        }
    }

    match outcome.refresh {
        RefreshStatus::Applied | RefreshStatus::Superseded => {}
        RefreshStatus::Failed(message) => {
            eprintln!("warning: could not refresh the product list: {}", message)
        }
    }
    Ok(())
}

async fn show_page(client: &CatalogClient, page: &PageArgs) -> Result<()> {
    if let Some(size) = page.page_size {
        client.set_page_size(size).await.map_err(report)?;
    }
    if page.page == 0 {
        bail!("Pages are numbered from 1");
    }
    let cursor = client.set_page(page.page - 1).await;

    let products = client.visible_products().await;
    if products.is_empty() {
        println!("No products");
        return Ok(());
    }

    println!("{:<26} {:<32} {:>10} {:>6}  IMAGE", "ID", "NAME", "PRICE", "STOCK");
    for product in &products {
        print_row(client, product);
    }
    println!(
        "\nPage {} of {} ({} per page)",
        cursor.page_index + 1,
        client.page_count().await,
        cursor.page_size
    );
    Ok(())
}

fn print_row(client: &CatalogClient, product: &Product) {
    println!(
        "{:<26} {:<32} {:>10} {:>6}  {}",
        product.id,
        truncate(&product.name, 32),
        product.display_price(),
        product.stock,
        client.image_url(product)
    );
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
