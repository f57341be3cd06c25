use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sahli", about = "CLI for Sahli storefronts: shops, products and catalogs", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account (a verification code is emailed)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Confirm a pending registration with the emailed code
    Verify {
        /// Pending registration ID printed by `sahli register`
        #[arg(long)]
        pending_id: String,
        #[arg(long)]
        code: String,
    },

    /// Forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List categories, subcategories and their product fields
    Categories,

    /// List your shops
    Shops {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Shop management
    Shop {
        #[command(subcommand)]
        action: ShopCommands,
    },

    /// List a shop's products (owner view)
    Products {
        /// Shop ID
        #[arg(long)]
        shop: String,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Product management
    Product {
        #[command(subcommand)]
        action: ProductCommands,
    },

    /// Browse a shop's catalog interactively
    Browse {
        /// Shop ID
        shop: String,
        /// Products per page
        #[arg(long, default_value = "12")]
        limit: u32,
        /// Browse your own listing (seller view) instead of the public catalog
        #[arg(long)]
        mine: bool,
    },
}

#[derive(Subcommand)]
pub enum ShopCommands {
    /// Create a new shop
    Create {
        #[arg(long)]
        name: String,
        /// Street, city, country
        #[arg(long)]
        address: String,
        #[arg(long)]
        description: Option<String>,
        /// Theme color as hex (default: #8CCDAD)
        #[arg(long)]
        color: Option<String>,
        /// Logo image (JPG, PNG, WEBP or GIF, under 5MB)
        #[arg(long)]
        logo: Option<PathBuf>,
    },
    /// Show a shop's public page
    Show {
        /// Shop ID
        id: String,
    },
    /// Print the shareable storefront link
    Link {
        /// Shop ID
        id: String,
        /// Open the link in a browser
        #[arg(long)]
        open: bool,
    },
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Create a product in one of your shops
    Create {
        /// Shop ID
        #[arg(long)]
        shop: String,
        /// Category ID (see `sahli categories`)
        #[arg(long)]
        category: String,
        /// Subcategory ID
        #[arg(long)]
        subcategory: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        price: String,
        #[arg(long)]
        stock: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Subcategory field value, repeatable (e.g. --attr size=M)
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
        /// Product image, repeatable (up to 6)
        #[arg(long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,
    },
}
